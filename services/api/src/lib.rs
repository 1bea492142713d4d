mod cli;
mod demo;
mod infra;
mod repair;
mod routes;
mod server;

use pipeline_repair::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
