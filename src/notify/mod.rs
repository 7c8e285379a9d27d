//! Notification composition and delivery.
//!
//! ```text
//! records ─▶ eligibility ─▶ group_by_recipient ─▶ per bucket:
//!              sort ─▶ Formatter ─▶ split_message ─▶ Transport (chunk by chunk)
//!              all chunks ok ─▶ commit state via StateStore
//! ```

pub mod format;
pub mod group;
pub mod split;
pub mod transport;
pub mod workflow;

pub use format::Formatter;
pub use group::{RecipientBucket, group_by_recipient};
pub use split::split_message;
pub use transport::{TelegramTransport, Transport, deliver};
pub use workflow::{Notifier, StateStore};

/// Hard per-message ceiling of the Telegram Bot API, in characters.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Section divider between header, cards and footer.
pub const DIVIDER: &str = "▬▬▬▬▬▬▬▬▬▬";

/// Divider inside an assignment card.
pub const CARD_DIVIDER: &str = "──────────";

/// Placeholder for an absent person or value.
pub const DASH: &str = "—";

/// Reminders cover deadlines up to this many days ahead.
pub const REMINDER_HORIZON_DAYS: i64 = 3;
