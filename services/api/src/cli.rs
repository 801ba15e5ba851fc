use crate::demo::{run_demo, DemoArgs};
use crate::server;
use applicant_intake::error::AppError;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "Applicant Intake",
    about = "Serve and operate the applicant intake API from the command line",
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
    /// Create or upgrade the applicant tables in DATABASE_URL
    Migrate,
    /// Run the intake workflow end to end against in-memory gateways
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Keep applicants and photos in process memory instead of Postgres and Cloudinary
    #[arg(long)]
    pub(crate) in_memory: bool,
    /// Apply the schema before accepting traffic
    #[arg(long, conflicts_with = "in_memory")]
    pub(crate) migrate: bool,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Migrate => server::migrate().await,
        Command::Demo(args) => run_demo(args).await,
    }
}
