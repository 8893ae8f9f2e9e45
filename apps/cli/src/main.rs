//! Dynamic application rule evaluator.
//!
//! Loads a definition bundle, applies one mutation request against it and
//! prints the outcome as JSON on stdout. Logs go to stderr.

#![forbid(unsafe_code)]

mod bundle;
mod cli_config;
mod request;
mod services;

use dynapp_core::{AppError, AppResult};
use tracing::info;

use crate::bundle::{Bundle, read_json};
use crate::cli_config::{CliConfig, init_tracing};
use crate::request::MutationRequest;
use crate::services::Services;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = CliConfig::load()?;
    let services = Services::build(&config);

    let bundle: Bundle = read_json(config.bundle_path.as_path()).await?;
    bundle.seed(&services).await?;

    let request: MutationRequest = read_json(config.mutation_path.as_path()).await?;
    let output = request.execute(&services).await?;

    print_output(&output)?;
    info!("mutation request completed");
    Ok(())
}

fn print_output(output: &serde_json::Value) -> AppResult<()> {
    let rendered = serde_json::to_string_pretty(output)
        .map_err(|error| AppError::Internal(format!("failed to render output: {error}")))?;
    println!("{rendered}");
    Ok(())
}
