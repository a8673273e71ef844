//! Reply Engine. A reply is a brand new message: it is not linked to the one
//! it answers and goes through the normal creation pipeline.

use postbox_db::queries;
use postbox_types::models::{MailboxStatus, Message, MessageId, RecipientSpec, UserId};

use crate::Postbox;
use crate::error::{PostboxError, Result, ValidationError};
use crate::send::SendOutcome;

const REPLY_PREFIX: &str = "RE: ";

pub fn reply_subject(original: &str) -> String {
    format!("{}{}", REPLY_PREFIX, original)
}

/// The reply text, a blank line, then the original body with every line
/// quoted.
pub fn reply_body(reply: &str, original: &str) -> String {
    let quoted: Vec<String> = original
        .lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_string()
            } else {
                format!("> {}", line)
            }
        })
        .collect();
    format!("{}\n\n{}", reply, quoted.join("\n"))
}

impl Postbox {
    /// Answer only the original sender. Fails with NotFound unless `user`
    /// holds a visible entry for `message_id`, and with NoSender when there
    /// is nobody to answer (a system message, or a sender who has since left
    /// the directory).
    pub fn reply_to_sender(&self, message_id: MessageId, user: UserId, body: &str) -> Result<SendOutcome> {
        let original = self.replyable_message(message_id, user)?;
        let sender = original.sender_id.ok_or(ValidationError::NoSender)?;
        let nickname = self
            .resolver
            .users()
            .nickname_of(sender)?
            .ok_or(ValidationError::NoSender)?;

        self.send_reply(&original, user, vec![nickname], body)
    }

    /// Answer the sender and everyone the original was delivered to, minus
    /// the replying user. The audience is the recipient set stored with the
    /// original, so later group changes do not widen it.
    pub fn reply_to_all(&self, message_id: MessageId, user: UserId, body: &str) -> Result<SendOutcome> {
        let original = self.replyable_message(message_id, user)?;

        let mut audience = self
            .db
            .with_conn(|conn| queries::message_recipients(conn, &message_id))?
            .ok_or(PostboxError::NotFound)?;
        audience.extend(original.sender_id);
        audience.remove(&user);

        // Users that vanished from the directory are dropped.
        let mut nicknames = Vec::with_capacity(audience.len());
        for id in audience {
            if let Some(nickname) = self.resolver.users().nickname_of(id)? {
                nicknames.push(nickname);
            }
        }

        self.send_reply(&original, user, nicknames, body)
    }

    fn replyable_message(&self, message_id: MessageId, user: UserId) -> Result<Message> {
        let now = self.clock.now();
        let (entry, message) = self.db.with_conn(|conn| {
            Ok((
                queries::get_entry(conn, user, &message_id)?,
                queries::get_message(conn, &message_id)?,
            ))
        })?;

        let (Some(entry), Some(message)) = (entry, message) else {
            return Err(PostboxError::NotFound);
        };
        // A reminder that is still pending has not been delivered yet.
        if entry.status == MailboxStatus::Reminder && message.scheduled_delivery_at > now {
            return Err(PostboxError::NotFound);
        }
        Ok(message)
    }

    /// Recipients are addressed by nickname so the stored spec reads like one
    /// a person would have typed.
    fn send_reply(
        &self,
        original: &Message,
        user: UserId,
        nicknames: Vec<String>,
        body: &str,
    ) -> Result<SendOutcome> {
        self.deliver(
            Some(user),
            RecipientSpec::new(nicknames, Vec::new()),
            reply_subject(&original.subject),
            reply_body(body, &original.body),
            None,
        )
    }
}
