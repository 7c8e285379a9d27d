//! Typed configuration from environment variables.
//!
//! Loaded once at startup. The bot token is optional: without it every
//! delivery fails with missing credentials instead of aborting the run.
//! Sensitive values are wrapped in `secrecy::SecretString` to keep them
//! out of logs.

pub mod secrets;

use std::time::Duration;

use crate::error::{Error, Result};
use secrecy::SecretString;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_ORGANIZATION: &str = "ОАО «Доломит»";
pub const DEFAULT_SEND_TIMEOUT_SECS: u64 = 5;

#[derive(Debug)]
pub struct Config {
    pub telegram_bot_token: Option<SecretString>,
    pub telegram_api_base: String,
    pub database_path: String,
    pub organization: String,
    pub send_timeout: Duration,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Call `dotenvy::dotenv().ok()` first when running from a checkout.
    pub fn from_env() -> Result<Self> {
        let send_timeout = match optional_var("SEND_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                Error::Config(format!("SEND_TIMEOUT_SECS must be a whole number, got {raw:?}"))
            })?,
            None => DEFAULT_SEND_TIMEOUT_SECS,
        };

        Ok(Self {
            telegram_bot_token: optional_var("TELEGRAM_BOT_TOKEN").map(SecretString::from),
            telegram_api_base: optional_var("TELEGRAM_API_BASE")
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            database_path: required_var("DATABASE_PATH")?,
            organization: optional_var("ORGANIZATION_NAME")
                .unwrap_or_else(|| DEFAULT_ORGANIZATION.to_string()),
            send_timeout: Duration::from_secs(send_timeout),
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    optional_var(name)
        .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
}

/// Empty values count as unset.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
