use crate::infra::{cli_actor, print_summary};
use clap::Args;
use school_enrollment::config::{AppConfig, ConfigError};
use school_enrollment::error::AppError;
use school_enrollment::i18n::{self, t_with_args};
use school_enrollment::workflows::enrollment::{
    write_csv, ClassYearRequest, EnrollmentFilter, EnrollmentService, EnrollmentServiceError,
    EnrollmentState, SqliteSchoolStore,
};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

type SqliteService = EnrollmentService<SqliteSchoolStore, SqliteSchoolStore>;

#[derive(Args, Debug)]
pub(crate) struct SelectionArgs {
    /// SQLite database (defaults to APP_DATABASE_PATH)
    #[arg(long)]
    pub(crate) database: Option<PathBuf>,
    /// Source class identifier
    #[arg(long = "class")]
    pub(crate) class_id: String,
    /// Destination academic year, e.g. 2025/2026
    #[arg(long)]
    pub(crate) year: String,
}

impl SelectionArgs {
    fn request(&self) -> ClassYearRequest {
        ClassYearRequest::new(self.class_id.clone(), self.year.clone())
    }
}

#[derive(Args, Debug)]
pub(crate) struct ExportArgs {
    #[command(flatten)]
    pub(crate) selection: SelectionArgs,
    /// Only export enrollments in this state (pendente, aguardando_exame, confirmada)
    #[arg(long, value_parser = parse_state)]
    pub(crate) state: Option<EnrollmentState>,
    /// Output file; writes to stdout when omitted
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

fn parse_state(raw: &str) -> Result<EnrollmentState, String> {
    EnrollmentState::parse(raw).ok_or_else(|| format!("unknown enrollment state '{raw}'"))
}

fn export_filter(
    selection: &SelectionArgs,
    state: Option<EnrollmentState>,
) -> Result<EnrollmentFilter, EnrollmentServiceError> {
    let filter = selection.request().to_filter()?;
    Ok(EnrollmentFilter { state, ..filter })
}

fn open_service(database: Option<&PathBuf>) -> Result<SqliteService, AppError> {
    let config = AppConfig::load()?;
    i18n::set_locale(&config.locale);

    let path = database
        .map(|path| path.to_string_lossy().into_owned())
        .or(config.database.path)
        .ok_or(ConfigError::MissingDatabasePath)?;
    let store = Arc::new(SqliteSchoolStore::open(path)?);
    Ok(EnrollmentService::new(store.clone(), store, config.grading))
}

pub(crate) fn run_generate(args: SelectionArgs) -> Result<(), AppError> {
    let service = open_service(args.database.as_ref())?;
    let report = service.generate(&cli_actor(), &args.request())?;

    println!(
        "{}",
        t_with_args(
            "enrollment.generated",
            &[("count", &report.created.to_string())]
        )
    );
    println!(
        "- skipped (already enrolled): {} | inactive: {} | unclassified: {}",
        report.skipped, report.inactive, report.unclassified
    );
    Ok(())
}

pub(crate) fn run_classify(args: SelectionArgs) -> Result<(), AppError> {
    let service = open_service(args.database.as_ref())?;
    let report = service.classify_pending(&cli_actor(), &args.request())?;

    println!(
        "{}",
        t_with_args(
            "enrollment.classified",
            &[("count", &report.updated.to_string())]
        )
    );
    if report.unclassified > 0 {
        println!("- still unclassified: {}", report.unclassified);
    }
    Ok(())
}

pub(crate) fn run_summary(args: SelectionArgs) -> Result<(), AppError> {
    let service = open_service(args.database.as_ref())?;
    let summary = service.summary(&cli_actor(), &args.request())?;
    print_summary(&summary);
    Ok(())
}

pub(crate) fn run_export(args: ExportArgs) -> Result<(), AppError> {
    let ExportArgs {
        selection,
        state,
        output,
    } = args;
    let filter = export_filter(&selection, state)?;
    let service = open_service(selection.database.as_ref())?;
    let records = service.list(&cli_actor(), &filter)?;

    match output {
        Some(path) => {
            write_csv(File::create(&path)?, &records)?;
            eprintln!("{} enrollments written to {}", records.len(), path.display());
        }
        None => write_csv(io::stdout().lock(), &records)?,
    }
    Ok(())
}
