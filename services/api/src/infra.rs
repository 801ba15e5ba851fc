use applicant_intake::config::{AppConfig, ConfigError};
use applicant_intake::error::AppError;
use applicant_intake::workflows::applicants::{
    postgres, ApplicantService, CloudinaryImageStore, MemoryApplicantStore, MemoryImageStore,
    PgApplicantStore,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type PersistentService = ApplicantService<PgApplicantStore, CloudinaryImageStore>;
pub(crate) type MemoryService = ApplicantService<MemoryApplicantStore, MemoryImageStore>;

/// Gateways backed by Postgres and Cloudinary. Both settings are required.
pub(crate) async fn persistent_service(
    config: &AppConfig,
    migrate: bool,
) -> Result<PersistentService, AppError> {
    let database = config
        .database
        .as_ref()
        .ok_or(ConfigError::MissingDatabaseUrl)?;
    let images = config
        .images
        .clone()
        .ok_or(ConfigError::MissingCloudinaryUrl)?;

    let pool = postgres::connect(database).await?;
    if migrate {
        postgres::migrate(&pool).await?;
    }

    let service = ApplicantService::new(
        Arc::new(PgApplicantStore::new(pool)),
        Arc::new(CloudinaryImageStore::new(images)?),
    );
    Ok(service.with_address_lookup(config.intake.address_lookup))
}

pub(crate) fn memory_service(config: &AppConfig) -> MemoryService {
    ApplicantService::new(
        Arc::new(MemoryApplicantStore::new()),
        Arc::new(MemoryImageStore::new()),
    )
    .with_address_lookup(config.intake.address_lookup)
}
