use metrics_exporter_prometheus::PrometheusHandle;
use school_enrollment::config::DatabaseConfig;
use school_enrollment::error::AppError;
use school_enrollment::i18n::t;
use school_enrollment::workflows::enrollment::{
    ActorContext, EnrollmentSummary, SqliteSchoolStore, StaffRole,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Open the configured SQLite database, or an empty in-memory one when no
/// path is set.
pub(crate) fn open_store(config: &DatabaseConfig) -> Result<Arc<SqliteSchoolStore>, AppError> {
    let store = match &config.path {
        Some(path) => SqliteSchoolStore::open(path)?,
        None => {
            warn!("APP_DATABASE_PATH not set; using an empty in-memory database");
            SqliteSchoolStore::open_in_memory()?
        }
    };
    Ok(Arc::new(store))
}

/// Actor used by command-line batch operations.
pub(crate) fn cli_actor() -> ActorContext {
    ActorContext::new("cli", StaffRole::Administrator)
}

pub(crate) fn print_summary(summary: &EnrollmentSummary) {
    println!(
        "\n{} -> {}: {} enrollments",
        summary.source_class_id, summary.target_year, summary.total
    );
    for entry in &summary.states {
        println!("- {}: {}", entry.label, entry.count);
    }
    for entry in &summary.transitions {
        println!("- {}: {}", entry.label, entry.count);
    }
    match summary.class_average {
        Some(average) => println!("Class average: {average:.2}"),
        None => println!(
            "Class average: {}",
            t("enrollment.transition.unclassified")
        ),
    }
}
