use super::common::*;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use std::sync::Arc;

use crate::workflows::applicants::domain::{
    AddressId, AddressPatch, ApplicantEdit, ApplicantId, ApplicantPatch,
};
use crate::workflows::applicants::images::MemoryImageStore;
use crate::workflows::applicants::memory::MemoryApplicantStore;
use crate::workflows::applicants::repository::{
    AddressLookup, ApplicantRepository, ApplicantTransaction,
};
use crate::workflows::applicants::service::{
    ApplicantService, ApplicantServiceError, ErrorKind, ORPHANED_IMAGES_METRIC,
};
use crate::workflows::applicants::validation::ValidationError;

fn phone_edit(id: ApplicantId) -> ApplicantEdit {
    ApplicantEdit {
        id,
        applicant: ApplicantPatch {
            phone: Some("55 8765 4321".to_string()),
            ..ApplicantPatch::default()
        },
        address: AddressPatch {
            street: Some("Calle Madero".to_string()),
            ..AddressPatch::default()
        },
    }
}

#[tokio::test]
async fn register_creates_linked_records_and_uploads_once() {
    let (service, repository, images) = build_service();

    let photo = photo_file().await;
    let registered = service
        .register(submission(), photo.path())
        .await
        .expect("registration succeeds");

    assert_eq!(registered.address.applicant_id, registered.applicant.id);
    assert_eq!(registered.form.applicant_id, registered.applicant.id);
    assert_eq!(
        registered.applicant.photo_url.as_deref(),
        Some(registered.photo.secure_url.as_str())
    );
    assert_eq!(registered.photo.bytes, PHOTO_BYTES.len() as u64);
    assert_eq!(registered.photo.format.as_deref(), Some("png"));

    assert_eq!(images.uploads().len(), 1);
    assert_eq!(repository.applicant_count().await, 1);
    assert_eq!(repository.address_count().await, 1);
    assert_eq!(repository.forms_for(registered.applicant.id).await.len(), 1);
}

#[tokio::test]
async fn invalid_submission_has_no_side_effects() {
    let (service, repository, images) = build_service();
    let mut submission = submission();
    submission.address.postal_code = "1".to_string();

    let photo = photo_file().await;
    let err = service
        .register(submission, photo.path())
        .await
        .expect_err("validation fails");

    assert!(matches!(
        err,
        ApplicantServiceError::Validation(ValidationError::InvalidField { field: "postalCode", .. })
    ));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(images.uploads().is_empty(), "nothing uploaded");
    assert_eq!(repository.applicant_count().await, 0);
}

#[tokio::test]
async fn upload_failure_writes_nothing() {
    let (service, repository, images) = build_service();
    images.set_offline(true);

    let photo = photo_file().await;
    let err = service
        .register(submission(), photo.path())
        .await
        .expect_err("upload fails");

    assert_eq!(err.kind(), ErrorKind::Infrastructure);
    assert!(matches!(err, ApplicantServiceError::ImageStore(_)));
    assert_eq!(repository.applicant_count().await, 0);
    assert_eq!(repository.address_count().await, 0);
    assert_eq!(repository.form_count().await, 0);
}

#[tokio::test]
async fn failed_form_insert_rolls_back_applicant_and_address() {
    let store = Arc::new(FlakyStore::failing_form());
    let images = Arc::new(MemoryImageStore::new());
    let service = ApplicantService::new(store.clone(), images.clone());

    let photo = photo_file().await;
    let err = service
        .register(submission(), photo.path())
        .await
        .expect_err("form insert fails");

    assert_eq!(err.kind(), ErrorKind::Infrastructure);
    assert_eq!(store.inner.applicant_count().await, 0);
    assert_eq!(store.inner.address_count().await, 0);
    assert_eq!(store.inner.form_count().await, 0);
    // The photo was already hosted and stays orphaned.
    assert_eq!(images.uploads().len(), 1);
}

fn orphaned_images(snapshotter: &Snapshotter) -> u64 {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find(|(key, _, _, _)| key.key().name() == ORPHANED_IMAGES_METRIC)
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(count) => count,
            _ => 0,
        })
        .unwrap_or(0)
}

/// Runs a registration against `store` with a recorder installed on this thread.
fn register_recorded(store: Arc<FlakyStore>) -> (Result<(), ErrorKind>, u64) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime builds");

    let outcome = metrics::with_local_recorder(&recorder, || {
        runtime.block_on(async {
            let service = ApplicantService::new(store, Arc::new(MemoryImageStore::new()));
            let photo = photo_file().await;
            service
                .register(submission(), photo.path())
                .await
                .map(|_| ())
                .map_err(|err| err.kind())
        })
    });

    (outcome, orphaned_images(&snapshotter))
}

#[test]
fn orphaned_image_counter_tracks_failures_after_upload() {
    let (outcome, orphaned) = register_recorded(Arc::new(FlakyStore::default()));
    assert_eq!(outcome, Ok(()));
    assert_eq!(orphaned, 0);

    let (outcome, orphaned) = register_recorded(Arc::new(FlakyStore::failing_form()));
    assert_eq!(outcome, Err(ErrorKind::Infrastructure));
    assert_eq!(orphaned, 1);

    let (outcome, orphaned) = register_recorded(Arc::new(FlakyStore::failing_begin()));
    assert_eq!(outcome, Err(ErrorKind::Infrastructure));
    assert_eq!(orphaned, 1);
}

#[tokio::test]
async fn unavailable_store_after_upload_orphans_the_image() {
    let store = Arc::new(FlakyStore::failing_begin());
    let images = Arc::new(MemoryImageStore::new());
    let service = ApplicantService::new(store, images.clone());

    let photo = photo_file().await;
    let err = service
        .register(submission(), photo.path())
        .await
        .expect_err("begin fails");

    assert!(matches!(err, ApplicantServiceError::Repository(_)));
    assert_eq!(images.uploads().len(), 1);
}

#[tokio::test]
async fn list_returns_applicants_in_id_order() {
    let (service, _, _) = build_service();
    assert!(service.list().await.expect("list").is_empty());

    let (first, _, _) = register(&service).await;
    let (second, _, _) = register(&service).await;

    let listed = service.list().await.expect("list");
    assert_eq!(listed, vec![first, second]);
    assert_eq!(service.list().await.expect("list again"), listed);
}

#[tokio::test]
async fn edit_merges_patch_and_keeps_absent_fields() {
    let (service, repository, _) = build_service();
    let (applicant, address, form) = register(&service).await;

    let updated = service
        .edit(phone_edit(applicant.id))
        .await
        .expect("edit succeeds");

    assert_eq!(updated.applicant.phone, "55 8765 4321");
    assert_eq!(updated.applicant.first_name, applicant.first_name);
    assert_eq!(updated.applicant.photo_url, applicant.photo_url);
    assert_eq!(updated.address.street, "Calle Madero");
    assert_eq!(updated.address.postal_code, address.postal_code);
    assert_eq!(updated.address.id, address.id);

    let stored = repository.fetch(applicant.id).await.expect("fetch");
    assert_eq!(stored, Some(updated.applicant.clone()));
    assert_eq!(repository.forms_for(applicant.id).await, vec![form]);
}

#[tokio::test]
async fn edit_with_null_clears_nullable_fields() {
    let (service, repository, _) = build_service();
    let (applicant, address, _) = register(&service).await;
    assert!(applicant.email.is_some());
    assert!(address.interior_number.is_some());

    let edit: ApplicantEdit = serde_json::from_value(serde_json::json!({
        "id": applicant.id.0,
        "reqSolicitante": { "email": null },
        "reqDomicilio": { "interiorNumber": null },
    }))
    .expect("edit parses");
    let updated = service.edit(edit).await.expect("edit succeeds");

    assert_eq!(updated.applicant.email, None);
    assert_eq!(updated.address.interior_number, None);
    assert_eq!(updated.applicant.second_last_name, applicant.second_last_name);
    assert_eq!(updated.applicant.phone, applicant.phone);
    assert_eq!(updated.address.street, address.street);

    let stored = repository.fetch(applicant.id).await.expect("fetch");
    assert_eq!(stored.and_then(|stored| stored.email), None);
    let stored_address = repository.address(address.id).await.expect("address kept");
    assert_eq!(stored_address.interior_number, None);
}

#[tokio::test]
async fn edit_of_missing_applicant_changes_nothing() {
    let (service, repository, _) = build_service();
    let (applicant, address, _) = register(&service).await;

    let err = service
        .edit(phone_edit(ApplicantId(applicant.id.0 + 40)))
        .await
        .expect_err("applicant missing");

    assert!(matches!(err, ApplicantServiceError::ApplicantNotFound(_)));
    assert_eq!(repository.fetch(applicant.id).await.expect("fetch"), Some(applicant));
    assert_eq!(repository.address(address.id).await, Some(address));
}

#[tokio::test]
async fn failed_address_update_rolls_back_applicant_update() {
    let store = Arc::new(FlakyStore::default());
    let service = ApplicantService::new(store.clone(), Arc::new(MemoryImageStore::new()));
    let photo = photo_file().await;
    let registered = service
        .register(submission(), photo.path())
        .await
        .expect("registration succeeds");

    store
        .fail_address_update
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let err = service
        .edit(phone_edit(registered.applicant.id))
        .await
        .expect_err("address update fails");

    assert_eq!(err.kind(), ErrorKind::Infrastructure);
    let stored = store
        .inner
        .fetch(registered.applicant.id)
        .await
        .expect("fetch")
        .expect("applicant present");
    assert_eq!(stored.phone, registered.applicant.phone);
}

#[tokio::test]
async fn address_lookup_strategies_diverge_when_ids_are_out_of_step() {
    let repository = Arc::new(MemoryApplicantStore::new());
    let images = Arc::new(MemoryImageStore::new());
    let by_key = ApplicantService::new(repository.clone(), images.clone());
    assert_eq!(by_key.address_lookup(), AddressLookup::PrimaryKey);

    // Addresses written in the opposite order of their applicants.
    let mut tx = repository.begin().await.expect("begin");
    let first = tx
        .insert_applicant(new_applicant(), None)
        .await
        .expect("first applicant");
    let second = tx
        .insert_applicant(new_applicant(), None)
        .await
        .expect("second applicant");
    let second_address = tx
        .insert_address(second.id, new_address())
        .await
        .expect("second address");
    let first_address = tx
        .insert_address(first.id, new_address())
        .await
        .expect("first address");
    tx.commit().await.expect("commit");
    assert_eq!(second_address.id, AddressId(first.id.0));

    let updated = by_key
        .edit(phone_edit(first.id))
        .await
        .expect("primary key lookup succeeds");
    assert_eq!(updated.address.id, second_address.id);
    assert_eq!(updated.address.applicant_id, second.id);

    let by_applicant = ApplicantService::new(repository.clone(), images)
        .with_address_lookup(AddressLookup::Applicant);
    let updated = by_applicant
        .edit(phone_edit(first.id))
        .await
        .expect("foreign key lookup succeeds");
    assert_eq!(updated.address.id, first_address.id);
    assert_eq!(updated.address.applicant_id, first.id);
}

#[tokio::test]
async fn primary_key_lookup_reports_missing_address_as_conflict() {
    let repository = Arc::new(MemoryApplicantStore::new());
    let images = Arc::new(MemoryImageStore::new());
    let service = ApplicantService::new(repository.clone(), images);

    // An applicant inserted without an address has no row at its id.
    let mut tx = repository.begin().await.expect("begin");
    let orphan = tx
        .insert_applicant(new_applicant(), None)
        .await
        .expect("insert applicant");
    tx.commit().await.expect("commit");

    let err = service
        .edit(phone_edit(orphan.id))
        .await
        .expect_err("address missing");
    assert!(matches!(err, ApplicantServiceError::AddressNotFound(id) if id == orphan.id));
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn get_returns_applicant_with_its_address() {
    let (service, _, _) = build_service();
    let (applicant, address, _) = register(&service).await;

    let found = service.get(applicant.id).await.expect("get succeeds");
    assert_eq!(found.applicant, applicant);
    assert_eq!(found.address, address);
}

#[tokio::test]
async fn get_of_unknown_applicant_is_not_found() {
    let (service, _, _) = build_service();
    let err = service.get(ApplicantId(99)).await.expect_err("missing");
    assert!(matches!(err, ApplicantServiceError::ApplicantNotFound(ApplicantId(99))));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
