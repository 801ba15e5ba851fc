use async_trait::async_trait;

use super::domain::{
    Address, AddressId, Applicant, ApplicantId, Form, NewAddress, NewApplicant, NewForm,
};

/// Storage abstraction so the service module can be exercised in isolation.
///
/// Reads outside a transaction go through the repository directly; every write
/// goes through an [`ApplicantTransaction`] obtained from [`ApplicantRepository::begin`].
#[async_trait]
pub trait ApplicantRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Applicant>, RepositoryError>;
    async fn fetch(&self, id: ApplicantId) -> Result<Option<Applicant>, RepositoryError>;
    /// Address whose foreign key references `applicant`.
    async fn address_for(&self, applicant: ApplicantId)
        -> Result<Option<Address>, RepositoryError>;
    async fn begin(&self) -> Result<Box<dyn ApplicantTransaction>, RepositoryError>;
}

/// Unit of work scoped to a single request.
///
/// Nothing written through the handle is visible to other readers before
/// [`commit`](ApplicantTransaction::commit). Dropping the handle without
/// committing discards every write.
#[async_trait]
pub trait ApplicantTransaction: Send {
    async fn fetch_applicant(&mut self, id: ApplicantId)
        -> Result<Option<Applicant>, RepositoryError>;
    async fn fetch_address(&mut self, id: AddressId) -> Result<Option<Address>, RepositoryError>;
    async fn address_for(&mut self, applicant: ApplicantId)
        -> Result<Option<Address>, RepositoryError>;
    async fn insert_applicant(
        &mut self,
        applicant: NewApplicant,
        photo_url: Option<String>,
    ) -> Result<Applicant, RepositoryError>;
    async fn insert_address(
        &mut self,
        applicant: ApplicantId,
        address: NewAddress,
    ) -> Result<Address, RepositoryError>;
    async fn insert_form(
        &mut self,
        applicant: ApplicantId,
        form: NewForm,
    ) -> Result<Form, RepositoryError>;
    async fn update_applicant(&mut self, applicant: &Applicant)
        -> Result<Applicant, RepositoryError>;
    async fn update_address(&mut self, address: &Address) -> Result<Address, RepositoryError>;
    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;
    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("record not found: {resource} {id}")]
    Missing { resource: &'static str, id: i32 },
    #[error("stored row is invalid: {0}")]
    InvalidRow(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// How the edit workflow locates the address it updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressLookup {
    /// Address primary key equal to the applicant id. Holds only while both
    /// sequences advance together, which registration guarantees for new rows.
    #[default]
    PrimaryKey,
    /// Address whose foreign key references the applicant.
    Applicant,
}

impl AddressLookup {
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "primary_key" | "pk" => Some(Self::PrimaryKey),
            "applicant" | "foreign_key" | "fk" => Some(Self::Applicant),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            AddressLookup::PrimaryKey => "primary_key",
            AddressLookup::Applicant => "applicant",
        }
    }
}
