use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use nest_db::models::{MessageRow, NewMessage};
use nest_types::api::{
    ConversationsResponse, InboxResponse, MessageResponse, MessagesResponse, SendMessageRequest, ThreadQuery,
    ThreadResponse, UserSummary,
};

use crate::conversations;
use crate::error::{ApiError, ValidationErrors};
use crate::extract::{Json, Path, Query};
use crate::listings::{active_listing, listing_not_found};
use crate::middleware::RequestContext;
use crate::state::{AppState, AppStateInner, blocking};

pub fn message_response(row: MessageRow) -> MessageResponse {
    let listing = conversations::listing_ref(&row);
    MessageResponse {
        id: row.id,
        sender: UserSummary {
            id: row.sender_id,
            name: row.sender_name,
            email: row.sender_email,
        },
        recipient: UserSummary {
            id: row.recipient_id,
            name: row.recipient_name,
            email: row.recipient_email,
        },
        listing,
        subject: row.subject,
        content: row.content,
        is_read: row.is_read,
        read_at: row.read_at,
        created_at: row.created_at,
    }
}

fn to_responses(rows: Vec<MessageRow>) -> Vec<MessageResponse> {
    rows.into_iter().map(message_response).collect()
}

/// Sends a message. Without an explicit recipient it goes to the owner of the
/// given listing, which must still be active.
pub fn send(
    state: &AppStateInner,
    ctx: &RequestContext,
    req: SendMessageRequest,
    now: DateTime<Utc>,
) -> Result<MessageResponse, ApiError> {
    let caller = ctx.require()?;
    let subject = req.subject.trim();
    let content = req.content.trim();

    let mut errors = ValidationErrors::new();
    errors.check(!subject.is_empty(), "subject", "Subject is required.");
    errors.check(subject.chars().count() <= 200, "subject", "Subject must be at most 200 characters.");
    errors.check(!content.is_empty(), "content", "Message cannot be empty.");
    if req.recipient_id.is_none() && req.listing_id.is_none() {
        errors.add("recipient_id", "Choose a recipient or a listing to enquire about.");
    }
    errors.finish()?;

    let recipient_id = match (req.recipient_id, req.listing_id) {
        (Some(recipient_id), listing_id) => {
            if state.db.get_user_by_id(recipient_id)?.is_none() {
                return Err(ApiError::NotFound("Recipient not found.".to_string()));
            }
            if let Some(listing_id) = listing_id {
                state.db.get_listing(listing_id)?.ok_or_else(listing_not_found)?;
            }
            recipient_id
        }
        (None, Some(listing_id)) => active_listing(state, listing_id)?.owner_id,
        (None, None) => {
            return Err(ApiError::invalid(
                "recipient_id",
                "Choose a recipient or a listing to enquire about.",
            ));
        }
    };

    if recipient_id == caller.user_id {
        return Err(ApiError::invalid("recipient_id", "You cannot send a message to yourself."));
    }

    let row = state.db.insert_message(
        &NewMessage {
            id: Uuid::new_v4(),
            sender_id: caller.user_id,
            recipient_id,
            listing_id: req.listing_id,
            subject,
            content,
        },
        now,
    )?;

    info!("{} sent message {} to {}", caller.user_id, row.id, recipient_id);
    Ok(message_response(row))
}

/// Marks a message read for its recipient. Repeating the call changes nothing.
pub fn mark_read(
    state: &AppStateInner,
    ctx: &RequestContext,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<MessageResponse, ApiError> {
    let caller = ctx.require()?;
    let row = state
        .db
        .mark_message_read(id, caller.user_id, now)?
        .ok_or_else(|| ApiError::NotFound("Message not found.".to_string()))?;
    Ok(message_response(row))
}

pub fn inbox(state: &AppStateInner, ctx: &RequestContext) -> Result<InboxResponse, ApiError> {
    let caller = ctx.require()?;
    let messages = to_responses(state.db.list_inbox(caller.user_id)?);
    Ok(InboxResponse {
        count: messages.len(),
        unread_count: messages.iter().filter(|m| !m.is_read).count(),
        messages,
    })
}

pub fn sent(state: &AppStateInner, ctx: &RequestContext) -> Result<MessagesResponse, ApiError> {
    let caller = ctx.require()?;
    let messages = to_responses(state.db.list_sent(caller.user_id)?);
    Ok(MessagesResponse {
        count: messages.len(),
        messages,
    })
}

pub fn list_conversations(state: &AppStateInner, ctx: &RequestContext) -> Result<ConversationsResponse, ApiError> {
    let caller = ctx.require()?;
    let history = state.db.list_messages_involving(caller.user_id)?;
    let conversations = conversations::derive(caller.user_id, &history);
    Ok(ConversationsResponse {
        count: conversations.len(),
        conversations,
    })
}

/// One conversation, oldest first. Opening it marks the other participant's
/// unread messages in it as read.
pub fn thread(
    state: &AppStateInner,
    ctx: &RequestContext,
    query: ThreadQuery,
    now: DateTime<Utc>,
) -> Result<ThreadResponse, ApiError> {
    let caller = ctx.require()?;
    let other = state
        .db
        .get_user_by_id(query.other_user_id)?
        .ok_or_else(|| ApiError::NotFound("User not found.".to_string()))?;
    if let Some(listing_id) = query.listing_id {
        state.db.get_listing(listing_id)?.ok_or_else(listing_not_found)?;
    }

    let (marked, rows) = state.db.open_thread(caller.user_id, other.id, query.listing_id, now)?;
    if marked > 0 {
        debug!("Marked {} message(s) read for {}", marked, caller.user_id);
    }

    let messages = to_responses(rows);
    Ok(ThreadResponse {
        count: messages.len(),
        messages,
        other_user: UserSummary {
            id: other.id,
            name: other.name,
            email: other.email,
        },
    })
}

// -- Handlers --

pub async fn send_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = blocking(&state, move |s| send(s, &ctx, req, Utc::now())).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

pub async fn inbox_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = blocking(&state, move |s| inbox(s, &ctx)).await?;
    Ok(Json(resp))
}

pub async fn sent_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = blocking(&state, move |s| sent(s, &ctx)).await?;
    Ok(Json(resp))
}

pub async fn read_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = blocking(&state, move |s| mark_read(s, &ctx, id, Utc::now())).await?;
    Ok(Json(resp))
}

pub async fn conversations_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = blocking(&state, move |s| list_conversations(s, &ctx)).await?;
    Ok(Json(resp))
}

pub async fn thread_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ThreadQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = blocking(&state, move |s| thread(s, &ctx, query, Utc::now())).await?;
    Ok(Json(resp))
}
