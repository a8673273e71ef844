//! Mailbox operations. Each one is scoped to the caller's own entries; an
//! entry that belongs to somebody else looks exactly like a missing one.

use tracing::{debug, info};

use postbox_db::queries;
use postbox_types::models::{InboxItem, MailboxStatus, MessageId, Page, UserId};

use crate::Postbox;
use crate::error::{PostboxError, Result, ValidationError};
use crate::gc;
use crate::scheduler::promote_due;

/// Pages needed for `total_items` at `page_size` items per page.
fn page_count(total_items: u64, page_size: u32) -> u64 {
    total_items.div_ceil(u64::from(page_size))
}

impl Postbox {
    /// One page of the user's delivered messages (1-based `page`).
    ///
    /// Due reminders are promoted first, so a reminder whose time has come is
    /// never returned as pending. Reminders still in the future are not listed.
    pub fn list_inbox(&self, user: UserId, page: u32, page_size: u32) -> Result<Page<InboxItem>> {
        if page == 0 || page_size == 0 {
            return Err(ValidationError::InvalidPage { page, page_size }.into());
        }
        let now = self.clock.now();

        self.transact("list_inbox", |tx| {
            promote_due(tx, user, now)?;

            let total_items = queries::count_entries(tx, user, true)?;
            let total_pages = page_count(total_items, page_size);
            if total_items == 0 && page == 1 {
                return Ok(Page::empty(page, page_size));
            }
            if u64::from(page) > total_pages {
                return Err(ValidationError::InvalidPage { page, page_size }.into());
            }

            let offset = u64::from(page - 1) * u64::from(page_size);
            let items = queries::list_inbox(tx, user, offset, page_size)?;
            Ok(Page {
                items,
                page,
                page_size,
                total_items,
                total_pages,
            })
        })
    }

    /// View one message: the entry moves from NEW to READ.
    pub fn open_message(&self, user: UserId, message_id: MessageId) -> Result<InboxItem> {
        let now = self.clock.now();

        self.transact("open_message", |tx| {
            promote_due(tx, user, now)?;

            let mut entry = queries::get_entry(tx, user, &message_id)?
                .filter(|e| e.status != MailboxStatus::Reminder)
                .ok_or(PostboxError::NotFound)?;
            let message = queries::get_message(tx, &message_id)?.ok_or(PostboxError::NotFound)?;

            if entry.status == MailboxStatus::New {
                queries::transition_status(tx, user, &message_id, MailboxStatus::New, MailboxStatus::Read)?;
                entry.status = MailboxStatus::Read;
            }
            Ok(InboxItem { entry, message })
        })
    }

    /// NEW -> READ. Marking an already read entry is a no-op; a pending
    /// reminder is not visible yet and reports NotFound.
    pub fn mark_read(&self, user: UserId, message_id: MessageId) -> Result<()> {
        let now = self.clock.now();

        self.transact("mark_read", |tx| {
            promote_due(tx, user, now)?;

            match queries::get_entry(tx, user, &message_id)? {
                Some(entry) if entry.status == MailboxStatus::New => {
                    queries::transition_status(tx, user, &message_id, MailboxStatus::New, MailboxStatus::Read)?;
                    Ok(())
                }
                Some(entry) if entry.status == MailboxStatus::Read => Ok(()),
                _ => Err(PostboxError::NotFound),
            }
        })
    }

    /// Delete one delivered entry and collect the message if that was its
    /// last reference. Pending reminders can only go through `delete_all`.
    pub fn delete_message(&self, user: UserId, message_id: MessageId) -> Result<()> {
        let now = self.clock.now();

        let collected = self.transact("delete_message", |tx| {
            promote_due(tx, user, now)?;

            let visible = queries::get_entry(tx, user, &message_id)?
                .is_some_and(|e| e.status != MailboxStatus::Reminder);
            if !visible {
                return Err(PostboxError::NotFound);
            }
            queries::delete_entry(tx, user, &message_id)?;
            Ok(gc::collect(tx, &[message_id])?)
        })?;

        debug!(user_id = %user, message_id = %message_id, collected, "Mailbox entry deleted");
        Ok(())
    }

    /// Delete everything in the user's mailbox except reminders that are
    /// still scheduled in the future. Returns how many entries went away.
    pub fn delete_all(&self, user: UserId) -> Result<usize> {
        let now = self.clock.now();

        let (removed, collected) = self.transact("delete_all", |tx| {
            let affected = queries::delete_all_entries(tx, user, now)?;
            let collected = gc::collect(tx, &affected)?;
            Ok((affected.len(), collected))
        })?;

        info!(user_id = %user, removed, collected, "Mailbox emptied");
        Ok(removed)
    }

    /// Number of entries the user holds; with `exclude_reminder` only the
    /// delivered ones.
    pub fn count(&self, user: UserId, exclude_reminder: bool) -> Result<u64> {
        let now = self.clock.now();

        self.transact("count", |tx| {
            promote_due(tx, user, now)?;
            Ok(queries::count_entries(tx, user, exclude_reminder)?)
        })
    }

    /// Number of unread delivered entries.
    pub fn count_new(&self, user: UserId) -> Result<u64> {
        let now = self.clock.now();

        self.transact("count_new", |tx| {
            promote_due(tx, user, now)?;
            Ok(queries::count_entries_with_status(tx, user, MailboxStatus::New)?)
        })
    }
}
