use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::workflows::applicants::domain::{
    Address, AddressId, Applicant, ApplicantId, ApplicantSubmission, Form, HousingStatus,
    NewAddress, NewApplicant, NewForm,
};
use crate::workflows::applicants::images::MemoryImageStore;
use crate::workflows::applicants::memory::MemoryApplicantStore;
use crate::workflows::applicants::repository::{
    ApplicantRepository, ApplicantTransaction, RepositoryError,
};
use crate::workflows::applicants::service::ApplicantService;
use crate::workflows::applicants::applicant_router;

pub(super) const BOUNDARY: &str = "intake-test-boundary";
pub(super) const PHOTO_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nnot-really-a-png";

pub(super) fn new_applicant() -> NewApplicant {
    NewApplicant {
        first_name: "María".to_string(),
        last_name: "Hernández".to_string(),
        second_last_name: Some("López".to_string()),
        birth_date: NaiveDate::from_ymd_opt(1988, 4, 12).expect("valid date"),
        phone: "55 1234 5678".to_string(),
        email: Some("maria@example.mx".to_string()),
    }
}

pub(super) fn new_address() -> NewAddress {
    NewAddress {
        street: "Avenida Juárez".to_string(),
        exterior_number: "120".to_string(),
        interior_number: Some("4B".to_string()),
        neighborhood: "Centro".to_string(),
        municipality: "Cuauhtémoc".to_string(),
        state: "CDMX".to_string(),
        postal_code: "06000".to_string(),
    }
}

pub(super) fn new_form() -> NewForm {
    NewForm {
        household_size: 4,
        monthly_income: 12_500,
        housing_status: HousingStatus::Rented,
        has_dependents: true,
        notes: None,
    }
}

pub(super) fn submission() -> ApplicantSubmission {
    ApplicantSubmission {
        applicant: new_applicant(),
        address: new_address(),
        form: new_form(),
    }
}

pub(super) fn submission_json() -> Value {
    serde_json::to_value(submission()).expect("submission serializes")
}

pub(super) fn build_service() -> (
    ApplicantService<MemoryApplicantStore, MemoryImageStore>,
    Arc<MemoryApplicantStore>,
    Arc<MemoryImageStore>,
) {
    let repository = Arc::new(MemoryApplicantStore::new());
    let images = Arc::new(MemoryImageStore::new());
    let service = ApplicantService::new(repository.clone(), images.clone());
    (service, repository, images)
}

pub(super) fn router_with_service<R, I>(service: ApplicantService<R, I>) -> axum::Router
where
    R: ApplicantRepository + 'static,
    I: crate::workflows::applicants::ImageStore + 'static,
{
    applicant_router(Arc::new(service), 1024 * 1024)
}

/// Temporary photo on disk, as the create handler stages it.
pub(super) async fn photo_file() -> tempfile::NamedTempFile {
    let file = tempfile::Builder::new()
        .prefix("applicant-test-")
        .suffix(".png")
        .tempfile()
        .expect("temp file");
    tokio::fs::write(file.path(), PHOTO_BYTES)
        .await
        .expect("write photo");
    file
}

/// Register through the service and return the committed records.
pub(super) async fn register(
    service: &ApplicantService<MemoryApplicantStore, MemoryImageStore>,
) -> (Applicant, Address, Form) {
    let photo = photo_file().await;
    let registered = service
        .register(submission(), photo.path())
        .await
        .expect("registration succeeds");
    (registered.applicant, registered.address, registered.form)
}

/// One part of a hand-built multipart body.
pub(super) enum Part<'a> {
    Data(&'a str),
    Photo {
        file_name: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
    Other(&'a str, &'a str),
}

pub(super) fn photo_part() -> Part<'static> {
    Part::Photo {
        file_name: "retrato.png",
        content_type: "image/png",
        bytes: PHOTO_BYTES,
    }
}

pub(super) fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Data(text) => {
                body.extend_from_slice(b"Content-Disposition: form-data; name=\"data\"\r\n\r\n");
                body.extend_from_slice(text.as_bytes());
            }
            Part::Photo {
                file_name,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"fotoSolicitante\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
            Part::Other(name, text) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(text.as_bytes());
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub(super) fn create_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::post("/api/v1/applicants")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .expect("request builds")
}

pub(super) fn json_request(method: &str, uri: &str, payload: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request builds")
}

pub(super) fn edit_payload(id: i32) -> Value {
    json!({
        "id": id,
        "reqSolicitante": { "phone": "55 8765 4321" },
        "reqDomicilio": { "street": "Calle Madero" },
    })
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn assert_generic_error(payload: &Value, kind: &str) {
    assert_eq!(payload.get("msg"), Some(&json!("Hubo un error")));
    assert_eq!(payload.get("kind"), Some(&json!(kind)));
}

/// Repository wrapper whose transactions fail chosen operations after
/// delegating the rest to the in-memory store.
#[derive(Clone, Default)]
pub(super) struct FlakyStore {
    pub(super) inner: MemoryApplicantStore,
    pub(super) fail_form: Arc<AtomicBool>,
    pub(super) fail_address_update: Arc<AtomicBool>,
    pub(super) fail_begin: Arc<AtomicBool>,
}

impl FlakyStore {
    pub(super) fn failing_form() -> Self {
        let store = Self::default();
        store.fail_form.store(true, Ordering::SeqCst);
        store
    }

    pub(super) fn failing_address_update() -> Self {
        let store = Self::default();
        store.fail_address_update.store(true, Ordering::SeqCst);
        store
    }

    pub(super) fn failing_begin() -> Self {
        let store = Self::default();
        store.fail_begin.store(true, Ordering::SeqCst);
        store
    }
}

#[async_trait]
impl ApplicantRepository for FlakyStore {
    async fn list(&self) -> Result<Vec<Applicant>, RepositoryError> {
        if self.fail_begin.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("store offline".to_string()));
        }
        self.inner.list().await
    }

    async fn fetch(&self, id: ApplicantId) -> Result<Option<Applicant>, RepositoryError> {
        self.inner.fetch(id).await
    }

    async fn address_for(
        &self,
        applicant: ApplicantId,
    ) -> Result<Option<Address>, RepositoryError> {
        self.inner.address_for(applicant).await
    }

    async fn begin(&self) -> Result<Box<dyn ApplicantTransaction>, RepositoryError> {
        if self.fail_begin.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("store offline".to_string()));
        }
        Ok(Box::new(FlakyTransaction {
            inner: self.inner.begin().await?,
            fail_form: self.fail_form.load(Ordering::SeqCst),
            fail_address_update: self.fail_address_update.load(Ordering::SeqCst),
        }))
    }
}

struct FlakyTransaction {
    inner: Box<dyn ApplicantTransaction>,
    fail_form: bool,
    fail_address_update: bool,
}

#[async_trait]
impl ApplicantTransaction for FlakyTransaction {
    async fn fetch_applicant(
        &mut self,
        id: ApplicantId,
    ) -> Result<Option<Applicant>, RepositoryError> {
        self.inner.fetch_applicant(id).await
    }

    async fn fetch_address(&mut self, id: AddressId) -> Result<Option<Address>, RepositoryError> {
        self.inner.fetch_address(id).await
    }

    async fn address_for(
        &mut self,
        applicant: ApplicantId,
    ) -> Result<Option<Address>, RepositoryError> {
        self.inner.address_for(applicant).await
    }

    async fn insert_applicant(
        &mut self,
        applicant: NewApplicant,
        photo_url: Option<String>,
    ) -> Result<Applicant, RepositoryError> {
        self.inner.insert_applicant(applicant, photo_url).await
    }

    async fn insert_address(
        &mut self,
        applicant: ApplicantId,
        address: NewAddress,
    ) -> Result<Address, RepositoryError> {
        self.inner.insert_address(applicant, address).await
    }

    async fn insert_form(
        &mut self,
        applicant: ApplicantId,
        form: NewForm,
    ) -> Result<Form, RepositoryError> {
        if self.fail_form {
            return Err(RepositoryError::Unavailable("form table locked".to_string()));
        }
        self.inner.insert_form(applicant, form).await
    }

    async fn update_applicant(
        &mut self,
        applicant: &Applicant,
    ) -> Result<Applicant, RepositoryError> {
        self.inner.update_applicant(applicant).await
    }

    async fn update_address(&mut self, address: &Address) -> Result<Address, RepositoryError> {
        if self.fail_address_update {
            return Err(RepositoryError::Unavailable("address table locked".to_string()));
        }
        self.inner.update_address(address).await
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        self.inner.rollback().await
    }
}
