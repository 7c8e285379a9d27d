//! Secret handling utilities.
//!
//! Re-exports the secrecy types used for the bot token.

pub use secrecy::{ExposeSecret, SecretString};
