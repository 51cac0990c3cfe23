use crate::cli::ServeArgs;
use crate::infra::{open_store, AppState};
use crate::routes::with_enrollment_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use school_enrollment::config::AppConfig;
use school_enrollment::error::AppError;
use school_enrollment::workflows::enrollment::EnrollmentService;
use school_enrollment::{i18n, telemetry};
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

    telemetry::init(&config.telemetry)?;
    i18n::set_locale(&config.locale);

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = open_store(&config.database)?;
    let enrollment_service = Arc::new(EnrollmentService::new(
        store.clone(),
        store,
        config.grading.clone(),
    ));

    let app = with_enrollment_routes(enrollment_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        locale = %config.locale,
        pass_mark = config.grading.pass_mark,
        "school enrollment service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
