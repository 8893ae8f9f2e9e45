use std::env;
use std::path::PathBuf;

use dynapp_core::{AppError, AppResult};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub bundle_path: PathBuf,
    pub mutation_path: PathBuf,
    pub currency_symbol: String,
    pub record_number_prefix: String,
}

impl CliConfig {
    pub fn load() -> AppResult<Self> {
        let bundle_path = PathBuf::from(required_non_empty_env("DYNAPP_BUNDLE_PATH")?);
        let mutation_path = PathBuf::from(required_non_empty_env("DYNAPP_MUTATION_PATH")?);
        let currency_symbol = env::var("DYNAPP_CURRENCY_SYMBOL").unwrap_or_default();
        let record_number_prefix = env::var("DYNAPP_RECORD_NUMBER_PREFIX").unwrap_or_default();

        if currency_symbol.chars().count() > 8 {
            return Err(AppError::Validation(format!(
                "DYNAPP_CURRENCY_SYMBOL must be at most 8 characters, got '{currency_symbol}'"
            )));
        }

        Ok(Self {
            bundle_path,
            mutation_path,
            currency_symbol,
            record_number_prefix,
        })
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn required_non_empty_env(name: &str) -> AppResult<String> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::Validation(format!("{name} is required")))
}
