use std::path::Path as FsPath;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        multipart::{Multipart, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{error, warn};

use super::domain::{ApplicantEdit, ApplicantLookup, ApplicantSubmission};
use super::images::{ImageStore, ImageStoreError};
use super::repository::ApplicantRepository;
use super::service::{ApplicantService, ApplicantServiceError, ErrorKind};
use super::validation::ValidationError;

/// Multipart part carrying the JSON `{solicitante, domicilio, formulario}` payload.
pub const DATA_FIELD: &str = "data";
/// Multipart part carrying the applicant photo.
pub const PHOTO_FIELD: &str = "fotoSolicitante";

const GENERIC_MESSAGE: &str = "Hubo un error";

/// Router builder exposing the applicant endpoints.
///
/// `max_body_bytes` bounds every request body, including the photo upload.
pub fn applicant_router<R, I>(
    service: Arc<ApplicantService<R, I>>,
    max_body_bytes: usize,
) -> Router
where
    R: ApplicantRepository + 'static,
    I: ImageStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/applicants",
            get(list_handler::<R, I>)
                .post(create_handler::<R, I>)
                .put(edit_handler::<R, I>),
        )
        .route("/api/v1/applicants/lookup", post(lookup_handler::<R, I>))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(service)
}

pub(crate) async fn list_handler<R, I>(
    State(service): State<Arc<ApplicantService<R, I>>>,
) -> Response
where
    R: ApplicantRepository + 'static,
    I: ImageStore + 'static,
{
    match service.list().await {
        Ok(applicants) => Json(json!({ "solicitante": applicants })).into_response(),
        Err(err) => failure("list", StatusCode::INTERNAL_SERVER_ERROR, &err),
    }
}

pub(crate) async fn create_handler<R, I>(
    State(service): State<Arc<ApplicantService<R, I>>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response
where
    R: ApplicantRepository + 'static,
    I: ImageStore + 'static,
{
    let registration = match multipart {
        Ok(multipart) => read_registration(multipart).await,
        Err(rejection) => Err(ValidationError::MalformedPayload(rejection.body_text())),
    };
    let (submission, photo) = match registration {
        Ok(parts) => parts,
        Err(err) => return failure("create", StatusCode::NOT_FOUND, &err.into()),
    };

    let staged = match stage_photo(&photo).await {
        Ok(file) => file,
        Err(err) => {
            return failure(
                "create",
                StatusCode::INTERNAL_SERVER_ERROR,
                &ImageStoreError::Io(err).into(),
            )
        }
    };

    match service.register(submission, staged.path()).await {
        Ok(registered) => Json(json!({ "resultados": registered })).into_response(),
        Err(err) => {
            let status = match err.kind() {
                ErrorKind::Validation => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            failure("create", status, &err)
        }
    }
}

pub(crate) async fn edit_handler<R, I>(
    State(service): State<Arc<ApplicantService<R, I>>>,
    payload: Result<Json<ApplicantEdit>, JsonRejection>,
) -> Response
where
    R: ApplicantRepository + 'static,
    I: ImageStore + 'static,
{
    let edit = match payload {
        Ok(Json(edit)) => edit,
        Err(rejection) => return malformed("edit", rejection),
    };

    // Lookups inside the edit transaction collapse to 500 like any storage failure.
    match service.edit(edit).await {
        Ok(updated) => Json(json!({ "resultado": updated })).into_response(),
        Err(err) => {
            let status = match err.kind() {
                ErrorKind::Validation => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            failure("edit", status, &err)
        }
    }
}

pub(crate) async fn lookup_handler<R, I>(
    State(service): State<Arc<ApplicantService<R, I>>>,
    payload: Result<Json<ApplicantLookup>, JsonRejection>,
) -> Response
where
    R: ApplicantRepository + 'static,
    I: ImageStore + 'static,
{
    let lookup = match payload {
        Ok(Json(lookup)) => lookup,
        Err(rejection) => return malformed("get", rejection),
    };

    match service.get(lookup.id).await {
        Ok(found) => Json(found).into_response(),
        Err(err) => {
            let status = match err.kind() {
                ErrorKind::Validation | ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict | ErrorKind::Infrastructure => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            failure("get", status, &err)
        }
    }
}

/// Photo part as received, before it is staged on disk.
#[derive(Debug)]
pub(crate) struct PhotoUpload {
    pub(crate) file_name: Option<String>,
    pub(crate) content_type: Option<String>,
    pub(crate) bytes: Bytes,
}

impl PhotoUpload {
    /// Extension for the staged file, from the client file name or the content type.
    fn extension(&self) -> Option<String> {
        let from_name = self
            .file_name
            .as_deref()
            .and_then(|name| FsPath::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(str::to_owned);
        let from_type = self
            .content_type
            .as_deref()
            .and_then(|raw| raw.parse::<mime::Mime>().ok())
            .filter(|mime| mime.type_() == mime::IMAGE)
            .map(|mime| mime.subtype().as_str().to_owned());

        from_name
            .or(from_type)
            .map(|ext| ext.to_ascii_lowercase())
            .filter(|ext| {
                !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric())
            })
    }
}

/// Collect the multipart parts and validate their shape. Nothing is written
/// anywhere until both the photo and the payload pass.
pub(crate) async fn read_registration(
    mut multipart: Multipart,
) -> Result<(ApplicantSubmission, PhotoUpload), ValidationError> {
    let mut data = None;
    let mut photos = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ValidationError::MalformedPayload(err.body_text()))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(DATA_FIELD) => {
                if data.is_some() {
                    return Err(ValidationError::MalformedPayload(format!(
                        "part `{DATA_FIELD}` sent more than once"
                    )));
                }
                let text = field
                    .text()
                    .await
                    .map_err(|err| ValidationError::MalformedPayload(err.body_text()))?;
                data = Some(text);
            }
            Some(PHOTO_FIELD) => {
                let file_name = field.file_name().map(str::to_owned);
                let content_type = field.content_type().map(str::to_owned);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| ValidationError::MalformedPayload(err.body_text()))?;
                photos.push(PhotoUpload {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            other => {
                return Err(ValidationError::MalformedPayload(format!(
                    "unexpected part `{}`",
                    other.unwrap_or_default()
                )))
            }
        }
    }

    let photo = match photos.len() {
        0 => return Err(ValidationError::MissingPhoto),
        1 => photos.remove(0),
        count => return Err(ValidationError::MultiplePhotos { count }),
    };
    check_photo(&photo)?;

    let data = data.ok_or(ValidationError::MissingPayload)?;
    let submission = serde_json::from_str::<ApplicantSubmission>(&data)
        .map_err(|err| ValidationError::MalformedPayload(err.to_string()))?;

    Ok((submission, photo))
}

fn check_photo(photo: &PhotoUpload) -> Result<(), ValidationError> {
    if photo.bytes.is_empty() {
        return Err(ValidationError::EmptyPhoto);
    }

    if let Some(content_type) = &photo.content_type {
        let accepted = content_type
            .parse::<mime::Mime>()
            .map(|mime| {
                mime.type_() == mime::IMAGE || mime.essence_str() == mime::APPLICATION_OCTET_STREAM
            })
            .unwrap_or(false);
        if !accepted {
            return Err(ValidationError::UnsupportedPhotoType {
                content_type: content_type.clone(),
            });
        }
    }

    Ok(())
}

/// Write the photo to a temporary file removed when the handle drops.
async fn stage_photo(photo: &PhotoUpload) -> std::io::Result<tempfile::NamedTempFile> {
    let suffix = photo
        .extension()
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    let file = tempfile::Builder::new()
        .prefix("applicant-photo-")
        .suffix(&suffix)
        .tempfile()?;
    tokio::fs::write(file.path(), &photo.bytes).await?;
    Ok(file)
}

fn malformed(operation: &'static str, rejection: JsonRejection) -> Response {
    let err = ValidationError::MalformedPayload(rejection.body_text());
    failure(operation, StatusCode::NOT_FOUND, &err.into())
}

fn failure(operation: &'static str, status: StatusCode, err: &ApplicantServiceError) -> Response {
    let kind = err.kind();
    match kind {
        ErrorKind::Infrastructure | ErrorKind::Conflict => {
            error!(operation, kind = kind.label(), error = %err, "applicant request failed")
        }
        ErrorKind::Validation | ErrorKind::NotFound => {
            warn!(operation, kind = kind.label(), error = %err, "applicant request rejected")
        }
    }

    let payload = json!({
        "msg": GENERIC_MESSAGE,
        "kind": kind,
    });
    (status, Json(payload)).into_response()
}
