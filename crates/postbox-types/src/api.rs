use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{MessageId, UserId};

// -- JWT Claims --

/// Bearer token claims. Tokens are issued by the surrounding site; the API only
/// verifies them to learn who is calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub nickname: String,
    pub exp: usize,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub to_users: Vec<String>,
    #[serde(default)]
    pub to_groups: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    pub scheduled_delivery_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub id: MessageId,
    pub admitted: Vec<UserId>,
    pub quota_exceeded: Vec<UserId>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplyRequest {
    pub body: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditRecipientsRequest {
    #[serde(default)]
    pub to_users: Vec<String>,
    #[serde(default)]
    pub to_groups: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct EditRecipientsResponse {
    pub added: Vec<UserId>,
    pub quota_exceeded: Vec<UserId>,
    pub removed: Vec<UserId>,
}

#[derive(Debug, Serialize)]
pub struct DeleteAllResponse {
    pub deleted: usize,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
