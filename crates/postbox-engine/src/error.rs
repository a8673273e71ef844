use postbox_types::models::UserId;
use thiserror::Error;
use tracing::warn;

pub type Result<T> = std::result::Result<T, PostboxError>;

#[derive(Debug, Error)]
pub enum PostboxError {
    /// Bad input, rejected before anything was written.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The entry or message is absent, or belongs to someone else. The two
    /// cases are deliberately indistinguishable.
    #[error("not found")]
    NotFound,

    /// A concurrent writer kept winning; the transaction was retried once.
    #[error("integrity conflict: {0}")]
    Integrity(String),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("user {0} does not exist")]
    UnknownUser(String),

    #[error("group {0} does not exist")]
    UnknownGroup(String),

    #[error("{0} is listed more than once")]
    DuplicateRecipient(String),

    #[error("please enter a user name or a group name")]
    NoRecipients,

    #[error("message is too long ({len} characters, maximum is {max})")]
    BodyTooLong { len: usize, max: usize },

    #[error("sender {0} does not exist")]
    UnknownSender(UserId),

    #[error("invalid page {page} (page size {page_size})")]
    InvalidPage { page: u32, page_size: u32 },

    #[error("message has no sender to reply to")]
    NoSender,
}

impl From<rusqlite::Error> for PostboxError {
    fn from(err: rusqlite::Error) -> Self {
        PostboxError::Store(err.into())
    }
}

/// Run `op`, retrying exactly once if the store reports a conflict. A second
/// conflict surfaces as [`PostboxError::Integrity`].
pub(crate) fn retry_on_conflict<T, F>(op: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    match f() {
        Err(PostboxError::Store(e)) if postbox_db::is_conflict(&e) => {
            warn!(op = %op, error = %e, "Store conflict, retrying once");
            match f() {
                Err(PostboxError::Store(e)) if postbox_db::is_conflict(&e) => {
                    Err(PostboxError::Integrity(format!("{}: {}", op, e)))
                }
                other => other,
            }
        }
        other => other,
    }
}
