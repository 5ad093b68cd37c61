//! Well-known notification channel tags.
//!
//! Stored in `notification_intents.channel` and used by the delivery queue to
//! tag outbound messages.

/// The external messaging channel used to reach technicians and customers.
pub const CHANNEL_WHATSAPP: &str = "whatsapp";
