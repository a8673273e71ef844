//! Message creation pipeline: validate, resolve recipients, admit against the
//! quota, then persist the message and fan it out in one transaction.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use postbox_db::queries;
use postbox_types::events::MessageSummary;
use postbox_types::models::{MailboxStatus, Message, MessageId, RecipientSpec, UserId};

use crate::Postbox;
use crate::error::{PostboxError, Result, ValidationError};
use crate::recipients::{self, RecipientSetBuilder};
use crate::scheduler::{initial_status, to_stored_precision};
use crate::{gc, quota};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub message_id: MessageId,
    pub admitted: BTreeSet<UserId>,
    pub quota_exceeded: BTreeSet<UserId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditOutcome {
    pub added: BTreeSet<UserId>,
    pub quota_exceeded: BTreeSet<UserId>,
    pub removed: BTreeSet<UserId>,
}

impl Postbox {
    /// Create a message and deliver it to every admitted recipient.
    ///
    /// `scheduled_delivery_at` in the future turns the delivery into a
    /// reminder; `None` means now. Recipients with a full inbox are reported in
    /// `quota_exceeded` and skipped. If nobody is admitted the message is
    /// collected before the transaction commits.
    pub fn create_message(
        &self,
        sender: Option<UserId>,
        nicknames: &[String],
        groups: &[String],
        subject: &str,
        body: &str,
        scheduled_delivery_at: Option<DateTime<Utc>>,
    ) -> Result<SendOutcome> {
        let spec = recipients::normalize(nicknames, groups)?;
        self.deliver(sender, spec, subject.to_string(), body.to_string(), scheduled_delivery_at)
    }

    pub(crate) fn deliver(
        &self,
        sender: Option<UserId>,
        spec: RecipientSpec,
        subject: String,
        body: String,
        scheduled_delivery_at: Option<DateTime<Utc>>,
    ) -> Result<SendOutcome> {
        if spec.is_empty() {
            return Err(ValidationError::NoRecipients.into());
        }
        self.check_body(&body)?;
        if let Some(sender) = sender {
            if !self.resolver.users().user_exists(sender)? {
                return Err(ValidationError::UnknownSender(sender).into());
            }
        }

        let recipients = RecipientSetBuilder::new(&self.resolver).build(&spec)?;
        let exempt = self.exempt_users(&recipients)?;

        let now = to_stored_precision(self.clock.now());
        let scheduled = scheduled_delivery_at.map(to_stored_precision).unwrap_or(now);
        let status = initial_status(scheduled, now);
        let message = Message {
            id: MessageId::new(),
            sender_id: sender,
            subject,
            body,
            recipient_spec: spec,
            sent_at: now,
            scheduled_delivery_at: scheduled,
        };
        let max = self.config.max_messages_per_inbox;

        let admission = self.transact("create_message", |tx| {
            queries::insert_message(tx, &message, &recipients)?;
            let admission = quota::admit(tx, &recipients, &exempt, max)?;
            for &user in &admission.admitted {
                queries::insert_entry(tx, user, &message.id, status)?;
            }
            if admission.admitted.is_empty() {
                gc::collect(tx, &[message.id])?;
            }
            Ok(admission)
        })?;

        info!(
            message_id = %message.id,
            status = %status,
            admitted = admission.admitted.len(),
            quota_exceeded = admission.quota_exceeded.len(),
            "Message created"
        );

        self.notify_delivered(&message, status, &admission.admitted);

        Ok(SendOutcome {
            message_id: message.id,
            admitted: admission.admitted,
            quota_exceeded: admission.quota_exceeded,
        })
    }

    /// Replace the recipient spec of a message the caller sent.
    ///
    /// The new spec is resolved against today's directory and compared with
    /// the recipient set stored when the message was sent (or last edited).
    /// Users only in the new set get an entry, subject to the quota; users
    /// only in the stored set lose theirs.
    pub fn edit_recipients(
        &self,
        sender: UserId,
        message_id: MessageId,
        nicknames: &[String],
        groups: &[String],
    ) -> Result<EditOutcome> {
        let new_spec = recipients::normalize(nicknames, groups)?;
        if new_spec.is_empty() {
            return Err(ValidationError::NoRecipients.into());
        }

        let message = self
            .db
            .with_conn(|conn| queries::get_message(conn, &message_id))?
            .ok_or(PostboxError::NotFound)?;
        if message.sender_id != Some(sender) {
            return Err(PostboxError::NotFound);
        }

        let new = RecipientSetBuilder::new(&self.resolver).build(&new_spec)?;
        let exempt = self.exempt_users(&new)?;

        let status = initial_status(message.scheduled_delivery_at, self.clock.now());
        let max = self.config.max_messages_per_inbox;

        let (admission, removed) = self.transact("edit_recipients", |tx| {
            let old = queries::message_recipients(tx, &message.id)?.ok_or(PostboxError::NotFound)?;
            let delta = recipients::diff(&old, &new);

            queries::update_recipient_spec(tx, &message.id, &new_spec)?;
            queries::set_message_recipients(tx, &message.id, &new)?;

            let mut fresh = BTreeSet::new();
            for &user in &delta.added {
                if queries::get_entry(tx, user, &message.id)?.is_none() {
                    fresh.insert(user);
                }
            }
            let admission = quota::admit(tx, &fresh, &exempt, max)?;
            for &user in &admission.admitted {
                queries::insert_entry(tx, user, &message.id, status)?;
            }

            let mut removed = BTreeSet::new();
            for &user in &delta.removed {
                if queries::delete_entry(tx, user, &message.id)? > 0 {
                    removed.insert(user);
                }
            }
            if !removed.is_empty() {
                gc::collect(tx, &[message.id])?;
            }

            Ok((admission, removed))
        })?;

        info!(
            message_id = %message.id,
            added = admission.admitted.len(),
            removed = removed.len(),
            quota_exceeded = admission.quota_exceeded.len(),
            "Recipients edited"
        );

        self.notify_delivered(&message, status, &admission.admitted);

        Ok(EditOutcome {
            added: admission.admitted,
            quota_exceeded: admission.quota_exceeded,
            removed,
        })
    }

    fn check_body(&self, body: &str) -> Result<()> {
        let len = body.chars().count();
        let max = self.config.max_body_chars;
        if len > max {
            return Err(ValidationError::BodyTooLong { len, max }.into());
        }
        Ok(())
    }

    /// Runs after commit. A failing notifier is logged and otherwise ignored.
    fn notify_delivered(&self, message: &Message, status: MailboxStatus, recipients: &BTreeSet<UserId>) {
        if recipients.is_empty() {
            return;
        }
        let summary = MessageSummary {
            message_id: message.id,
            sender_id: message.sender_id,
            subject: message.subject.clone(),
            scheduled_delivery_at: message.scheduled_delivery_at,
            deferred: status == MailboxStatus::Reminder,
        };
        for &user in recipients {
            if let Err(e) = self.notifier.notify(user, &summary) {
                warn!(user_id = %user, message_id = %message.id, "Notification failed: {:#}", e);
            }
        }
    }
}
