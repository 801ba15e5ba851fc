use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::domain::{
    AddressId, Applicant, ApplicantEdit, ApplicantId, ApplicantSubmission, ApplicantWithAddress,
    RegisteredApplicant, StoredImage,
};
use super::images::{ImageStore, ImageStoreError};
use super::repository::{
    AddressLookup, ApplicantRepository, ApplicantTransaction, RepositoryError,
};
use super::validation::{IntakeGuard, ValidationError};

/// Counter of uploads left without a referencing applicant after a rollback.
pub const ORPHANED_IMAGES_METRIC: &str = "applicant_orphaned_images_total";

/// Service composing the intake guard, repository, and image store.
pub struct ApplicantService<R, I> {
    guard: IntakeGuard,
    repository: Arc<R>,
    images: Arc<I>,
    address_lookup: AddressLookup,
}

impl<R, I> ApplicantService<R, I>
where
    R: ApplicantRepository + 'static,
    I: ImageStore + 'static,
{
    pub fn new(repository: Arc<R>, images: Arc<I>) -> Self {
        Self {
            guard: IntakeGuard,
            repository,
            images,
            address_lookup: AddressLookup::default(),
        }
    }

    pub fn with_address_lookup(mut self, address_lookup: AddressLookup) -> Self {
        self.address_lookup = address_lookup;
        self
    }

    pub fn address_lookup(&self) -> AddressLookup {
        self.address_lookup
    }

    /// Every stored applicant in storage order.
    pub async fn list(&self) -> Result<Vec<Applicant>, ApplicantServiceError> {
        let applicants = self.repository.list().await?;
        tracing::debug!(count = applicants.len(), "listed applicants");
        Ok(applicants)
    }

    /// Upload the photo, then create the applicant, its address, and its form
    /// in one transaction.
    ///
    /// The upload happens before the transaction opens and is never undone: a
    /// storage failure after it leaves the image orphaned on the host.
    pub async fn register(
        &self,
        submission: ApplicantSubmission,
        photo: &Path,
    ) -> Result<RegisteredApplicant, ApplicantServiceError> {
        self.guard.check_submission(&submission)?;

        let stored = self.images.upload(photo).await?;

        let result = match self.repository.begin().await {
            Ok(mut tx) => {
                let outcome = insert_records(tx.as_mut(), submission, &stored).await;
                settle(tx, outcome).await
            }
            Err(err) => Err(err.into()),
        };

        match result {
            Ok(registered) => {
                info!(
                    applicant_id = %registered.applicant.id,
                    public_id = %registered.photo.public_id,
                    "applicant registered"
                );
                Ok(registered)
            }
            Err(err) => {
                record_orphan(&stored, &err);
                Err(err)
            }
        }
    }

    /// Apply partial updates to an applicant and its address atomically.
    pub async fn edit(
        &self,
        edit: ApplicantEdit,
    ) -> Result<ApplicantWithAddress, ApplicantServiceError> {
        self.guard.check_edit(&edit)?;

        let mut tx = self.repository.begin().await?;
        let outcome = self.apply_edit(tx.as_mut(), &edit).await;
        let updated = settle(tx, outcome).await?;

        info!(applicant_id = %updated.applicant.id, "applicant updated");
        Ok(updated)
    }

    async fn apply_edit(
        &self,
        tx: &mut dyn ApplicantTransaction,
        edit: &ApplicantEdit,
    ) -> Result<ApplicantWithAddress, ApplicantServiceError> {
        let mut applicant = tx
            .fetch_applicant(edit.id)
            .await?
            .ok_or(ApplicantServiceError::ApplicantNotFound(edit.id))?;

        let address = match self.address_lookup {
            AddressLookup::PrimaryKey => tx.fetch_address(AddressId(applicant.id.0)).await?,
            AddressLookup::Applicant => tx.address_for(applicant.id).await?,
        };
        let mut address = address.ok_or(ApplicantServiceError::AddressNotFound(applicant.id))?;

        edit.applicant.apply(&mut applicant);
        edit.address.apply(&mut address);

        let applicant = tx.update_applicant(&applicant).await?;
        let address = tx.update_address(&address).await?;
        Ok(ApplicantWithAddress { applicant, address })
    }

    /// Fetch an applicant together with the address referencing it.
    pub async fn get(&self, id: ApplicantId) -> Result<ApplicantWithAddress, ApplicantServiceError> {
        let applicant = self
            .repository
            .fetch(id)
            .await?
            .ok_or(ApplicantServiceError::ApplicantNotFound(id))?;
        let address = self
            .repository
            .address_for(applicant.id)
            .await?
            .ok_or(ApplicantServiceError::AddressNotFound(applicant.id))?;
        Ok(ApplicantWithAddress { applicant, address })
    }
}

async fn insert_records(
    tx: &mut dyn ApplicantTransaction,
    submission: ApplicantSubmission,
    photo: &StoredImage,
) -> Result<RegisteredApplicant, ApplicantServiceError> {
    let ApplicantSubmission {
        applicant,
        address,
        form,
    } = submission;

    let applicant = tx
        .insert_applicant(applicant, Some(photo.secure_url.clone()))
        .await?;
    let address = tx.insert_address(applicant.id, address).await?;
    let form = tx.insert_form(applicant.id, form).await?;

    Ok(RegisteredApplicant {
        applicant,
        address,
        form,
        photo: photo.clone(),
    })
}

/// Commit on success, roll back on failure. A failed rollback is logged and the
/// original error wins; the dropped transaction is discarded either way.
async fn settle<T>(
    tx: Box<dyn ApplicantTransaction>,
    outcome: Result<T, ApplicantServiceError>,
) -> Result<T, ApplicantServiceError> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "transaction rollback failed");
            }
            Err(err)
        }
    }
}

fn record_orphan(stored: &StoredImage, err: &ApplicantServiceError) {
    metrics::counter!(ORPHANED_IMAGES_METRIC).increment(1);
    warn!(
        public_id = %stored.public_id,
        secure_url = %stored.secure_url,
        error = %err,
        "registration rolled back after upload; image orphaned"
    );
}

/// Closed classification of service failures carried to the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    /// Stored state contradicts an invariant, e.g. an applicant without address.
    Conflict,
    Infrastructure,
}

impl ErrorKind {
    pub const fn label(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Infrastructure => "infrastructure",
        }
    }
}

/// Error raised by the applicant service.
#[derive(Debug, thiserror::Error)]
pub enum ApplicantServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("applicant {0} does not exist")]
    ApplicantNotFound(ApplicantId),
    #[error("address error: no address for applicant {0}")]
    AddressNotFound(ApplicantId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    ImageStore(#[from] ImageStoreError),
}

impl ApplicantServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApplicantServiceError::Validation(_) => ErrorKind::Validation,
            ApplicantServiceError::ApplicantNotFound(_) => ErrorKind::NotFound,
            ApplicantServiceError::AddressNotFound(_) => ErrorKind::Conflict,
            ApplicantServiceError::Repository(_) | ApplicantServiceError::ImageStore(_) => {
                ErrorKind::Infrastructure
            }
        }
    }
}
