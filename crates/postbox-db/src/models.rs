//! Database row types. These map directly to SQLite rows and are converted to
//! the shared `postbox-types` models at the edge of this crate.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use postbox_types::models::{
    InboxItem, MailboxEntry, MailboxStatus, Message, MessageId, RecipientSpec, UserId,
};

pub struct MessageRow {
    pub id: String,
    pub sender_id: Option<i64>,
    pub subject: String,
    pub body: String,
    pub to_nicknames: String,
    pub to_groups: String,
    pub sent_at: i64,
    pub scheduled_at: i64,
}

pub struct MailboxRow {
    pub user_id: i64,
    pub message_id: String,
    pub status: String,
}

impl MessageRow {
    pub fn from_message(message: &Message) -> Result<Self> {
        Ok(Self {
            id: message.id.to_string(),
            sender_id: message.sender_id.map(|id| id.0),
            subject: message.subject.clone(),
            body: message.body.clone(),
            to_nicknames: serde_json::to_string(&message.recipient_spec.nicknames)?,
            to_groups: serde_json::to_string(&message.recipient_spec.groups)?,
            sent_at: message.sent_at.timestamp_millis(),
            scheduled_at: message.scheduled_delivery_at.timestamp_millis(),
        })
    }

    pub fn into_message(self) -> Result<Message> {
        let id: MessageId = self
            .id
            .parse()
            .with_context(|| format!("Corrupt message id '{}'", self.id))?;
        let nicknames: Vec<String> = serde_json::from_str(&self.to_nicknames)
            .with_context(|| format!("Corrupt nickname list on message '{}'", self.id))?;
        let groups: Vec<String> = serde_json::from_str(&self.to_groups)
            .with_context(|| format!("Corrupt group list on message '{}'", self.id))?;

        Ok(Message {
            id,
            sender_id: self.sender_id.map(UserId),
            subject: self.subject,
            body: self.body,
            recipient_spec: RecipientSpec::new(nicknames, groups),
            sent_at: millis_to_datetime(self.sent_at)?,
            scheduled_delivery_at: millis_to_datetime(self.scheduled_at)?,
        })
    }
}

impl MailboxRow {
    pub fn into_entry(self) -> Result<MailboxEntry> {
        let message_id: MessageId = self
            .message_id
            .parse()
            .with_context(|| format!("Corrupt message id '{}' in mailbox", self.message_id))?;
        let status: MailboxStatus = self.status.parse().map_err(|e: String| anyhow!(e))?;
        Ok(MailboxEntry {
            user_id: UserId(self.user_id),
            message_id,
            status,
        })
    }
}

pub fn inbox_item(entry: MailboxRow, message: MessageRow) -> Result<InboxItem> {
    Ok(InboxItem {
        entry: entry.into_entry()?,
        message: message.into_message()?,
    })
}

pub fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| anyhow!("Timestamp out of range: {}", millis))
}
