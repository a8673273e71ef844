use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{MessageId, UserId};

/// What a recipient is told about a freshly delivered message.
/// Carries no body; the recipient reads it from their inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub message_id: MessageId,
    pub sender_id: Option<UserId>,
    pub subject: String,
    pub scheduled_delivery_at: DateTime<Utc>,
    /// True when the entry was created as a pending reminder.
    pub deferred: bool,
}

/// One notification job: a summary addressed to one admitted recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: UserId,
    pub summary: MessageSummary,
}
