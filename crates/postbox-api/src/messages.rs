use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;

use postbox_engine::{Postbox, SendOutcome};
use postbox_types::api::{
    Claims, DeleteAllResponse, EditRecipientsRequest, EditRecipientsResponse, ReplyRequest,
    SendMessageRequest, SendMessageResponse, UnreadCountResponse,
};
use postbox_types::models::MessageId;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

/// Run an engine call on the blocking pool.
async fn engine<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Postbox) -> postbox_engine::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let postbox = state.postbox.clone();
    tokio::task::spawn_blocking(move || f(&postbox))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(ApiError::from)
}

fn sent(outcome: SendOutcome) -> SendMessageResponse {
    SendMessageResponse {
        id: outcome.message_id,
        admitted: outcome.admitted.into_iter().collect(),
        quota_exceeded: outcome.quota_exceeded.into_iter().collect(),
    }
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = engine(&state, move |postbox| {
        postbox.create_message(
            Some(claims.sub),
            &req.to_users,
            &req.to_groups,
            &req.subject,
            &req.body,
            req.scheduled_delivery_at,
        )
    })
    .await?;

    Ok((StatusCode::CREATED, Json(sent(outcome))))
}

pub async fn list_inbox(
    State(state): State<AppState>,
    Query(query): Query<InboxQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let page_size = query.page_size.min(200);
    let page = engine(&state, move |postbox| {
        postbox.list_inbox(claims.sub, query.page, page_size)
    })
    .await?;

    Ok(Json(page))
}

pub async fn open_message(
    State(state): State<AppState>,
    Path(message_id): Path<MessageId>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let item = engine(&state, move |postbox| postbox.open_message(claims.sub, message_id)).await?;
    Ok(Json(item))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(message_id): Path<MessageId>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    engine(&state, move |postbox| postbox.mark_read(claims.sub, message_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<MessageId>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    engine(&state, move |postbox| postbox.delete_message(claims.sub, message_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_all(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = engine(&state, move |postbox| postbox.delete_all(claims.sub)).await?;
    Ok(Json(DeleteAllResponse { deleted }))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let unread = engine(&state, move |postbox| postbox.count_new(claims.sub)).await?;
    Ok(Json(UnreadCountResponse { unread }))
}

pub async fn reply_to_sender(
    State(state): State<AppState>,
    Path(message_id): Path<MessageId>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReplyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = engine(&state, move |postbox| {
        postbox.reply_to_sender(message_id, claims.sub, &req.body)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(sent(outcome))))
}

pub async fn reply_to_all(
    State(state): State<AppState>,
    Path(message_id): Path<MessageId>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReplyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = engine(&state, move |postbox| {
        postbox.reply_to_all(message_id, claims.sub, &req.body)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(sent(outcome))))
}

/// Only the sender may change who a message goes to; anybody else gets 404.
pub async fn edit_recipients(
    State(state): State<AppState>,
    Path(message_id): Path<MessageId>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EditRecipientsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = engine(&state, move |postbox| {
        postbox.edit_recipients(claims.sub, message_id, &req.to_users, &req.to_groups)
    })
    .await?;

    Ok(Json(EditRecipientsResponse {
        added: outcome.added.into_iter().collect(),
        quota_exceeded: outcome.quota_exceeded.into_iter().collect(),
        removed: outcome.removed.into_iter().collect(),
    }))
}
