//! Error types for assignment-notify.
//!
//! Delivery failures are not errors: they are reported through the
//! diagnostics sink and reflected in workflow counts. Everything here is
//! unexpected from the engine's point of view and propagates to the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("telegram API error: {0}")]
    Telegram(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
