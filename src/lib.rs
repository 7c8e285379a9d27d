//! # assignment-notify
//!
//! Notification engine for tracked assignments.
//!
//! Groups pending assignments by the executor's Telegram chat, renders them
//! into HTML messages split to the Bot API length limit, and advances the
//! per-assignment notification state only after a complete delivery.

pub mod bot;
pub mod config;
pub mod error;
pub mod event;
pub mod model;
pub mod notify;
pub mod storage;
pub mod telemetry;
