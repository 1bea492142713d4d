use crate::demo::{run_demo, DemoArgs};
use crate::repair::{run_apply, run_plan, ApplyArgs, PlanArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use pipeline_repair::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Pipeline Repair",
    about = "Repair recruiting pipeline applications after Application Step Result score corrections",
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
    /// Query the CRM for corrected step results and write the actions to take
    Plan(PlanArgs),
    /// Apply a previously written action plan against the CRM
    Apply(ApplyArgs),
    /// Walk through the repair workflow using bundled sample records
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
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Plan(args) => run_plan(args).await,
        Command::Apply(args) => run_apply(args).await,
        Command::Demo(args) => run_demo(args),
    }
}
