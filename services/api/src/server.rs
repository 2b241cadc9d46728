use crate::cli::ServeArgs;
use crate::infra::{AppState, LendingBackend};
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use loan_lifecycle::config::{AppConfig, StorageConfig};
use loan_lifecycle::error::AppError;
use loan_lifecycle::telemetry;
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
    if let Some(url) = args.database_url.take() {
        config.storage = StorageConfig::from_url(&url)?;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let backend = LendingBackend::open(&config.storage)?;
    let app = backend
        .router()
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, storage = backend.label(), "loan lifecycle engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}
