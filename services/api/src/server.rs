use crate::cli::ServeArgs;
use crate::infra::{memory_service, persistent_service, AppState};
use crate::routes::with_applicant_routes;
use applicant_intake::config::{AppConfig, ConfigError};
use applicant_intake::error::AppError;
use applicant_intake::telemetry;
use applicant_intake::workflows::applicants::postgres;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let max_body_bytes = config.intake.max_photo_bytes;
    let app = if args.in_memory {
        info!("serving applicants from process memory");
        with_applicant_routes(Arc::new(memory_service(&config)), max_body_bytes)
    } else {
        let service = persistent_service(&config, args.migrate).await?;
        with_applicant_routes(Arc::new(service), max_body_bytes)
    };
    let app = app.layer(Extension(app_state)).layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        address_lookup = config.intake.address_lookup.label(),
        "applicant intake ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

pub(crate) async fn migrate() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry, config.environment)?;

    let database = config
        .database
        .as_ref()
        .ok_or(ConfigError::MissingDatabaseUrl)?;
    let pool = postgres::connect(database).await?;
    postgres::migrate(&pool).await?;
    pool.close().await;

    info!("applicant schema is up to date");
    Ok(())
}
