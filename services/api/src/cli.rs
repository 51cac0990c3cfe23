use crate::demo::{run_demo, DemoArgs};
use crate::enrollment::{
    run_classify, run_export, run_generate, run_summary, ExportArgs, SelectionArgs,
};
use crate::server;
use clap::{Args, Parser, Subcommand};
use school_enrollment::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "School Enrollment",
    about = "Generate, classify and confirm next-year school enrollments",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Batch operations against a SQLite school database
    Enrollment {
        #[command(subcommand)]
        command: EnrollmentCommand,
    },
    /// Run an in-memory walkthrough of generation, confirmation and exams
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum EnrollmentCommand {
    /// Create pending enrollments for every active student of a class
    Generate(SelectionArgs),
    /// Recompute averages and transition statuses of pending enrollments
    Classify(SelectionArgs),
    /// Print counts per state and transition status
    Summary(SelectionArgs),
    /// Write enrollments as CSV
    Export(ExportArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Enrollment { command } => match command {
            EnrollmentCommand::Generate(args) => run_generate(args),
            EnrollmentCommand::Classify(args) => run_classify(args),
            EnrollmentCommand::Summary(args) => run_summary(args),
            EnrollmentCommand::Export(args) => run_export(args),
        },
        Command::Demo(args) => run_demo(args),
    }
}
