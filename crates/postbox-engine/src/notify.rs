//! Outbound notifications after a message is delivered.
//!
//! Delivery is best effort and at most once: failures are logged, never
//! retried, and never affect the send that triggered them.

use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use crossbeam_channel::{Sender, unbounded};
use tracing::{debug, info, warn};

use postbox_types::events::{MessageSummary, Notification};
use postbox_types::models::UserId;

pub trait NotificationSender: Send + Sync {
    fn notify(&self, recipient: UserId, summary: &MessageSummary) -> Result<()>;
}

/// Writes a log line per notification and nothing else.
pub struct LogNotifier;

impl NotificationSender for LogNotifier {
    fn notify(&self, recipient: UserId, summary: &MessageSummary) -> Result<()> {
        info!(
            user_id = %recipient,
            message_id = %summary.message_id,
            deferred = summary.deferred,
            "New message: {}",
            summary.subject
        );
        Ok(())
    }
}

/// Moves notifications off the caller's thread.
///
/// `notify` only enqueues; a background thread hands each job to the wrapped
/// sender. Dropping the dispatcher drains the queue and joins the thread.
pub struct NotificationDispatcher {
    tx: Option<Sender<Notification>>,
    worker: Option<JoinHandle<()>>,
}

impl NotificationDispatcher {
    pub fn spawn(inner: Arc<dyn NotificationSender>) -> Result<Self> {
        let (tx, rx) = unbounded::<Notification>();

        let worker = std::thread::Builder::new()
            .name("postbox-notify".into())
            .spawn(move || {
                for job in rx {
                    if let Err(e) = inner.notify(job.recipient, &job.summary) {
                        warn!(
                            user_id = %job.recipient,
                            message_id = %job.summary.message_id,
                            "Notification failed: {:#}",
                            e
                        );
                    }
                }
                debug!("Notification worker stopped");
            })
            .context("failed to start notification worker")?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }
}

impl NotificationSender for NotificationDispatcher {
    fn notify(&self, recipient: UserId, summary: &MessageSummary) -> Result<()> {
        let tx = self.tx.as_ref().context("notification dispatcher is shut down")?;
        tx.send(Notification {
            recipient,
            summary: summary.clone(),
        })
        .context("notification worker is gone")
    }
}

impl Drop for NotificationDispatcher {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop once the queue is empty.
        drop(self.tx.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Notification worker panicked");
            }
        }
    }
}
