//! Read-receipt endpoints: the admin's per-message recipient view, the
//! student inbox, and mark-as-read.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use classcast_db::models::{InboxRow, ReceiptRow};
use classcast_db::{fmt_ts, parse_ts};
use classcast_types::api::{
    Claims, InboxMessage, InboxResponse, MarkReadResponse, PageQuery, ReceiptResponse,
    RecipientQuery, RecipientStatusFilter, RecipientsResponse,
};
use classcast_types::events::GatewayEvent;
use classcast_types::stats::read_stats;

use crate::error::ApiError;
use crate::messages::{parse_dt, parse_kind, parse_priority, parse_uuid};
use crate::middleware::{require_admin, require_student};
use crate::state::AppState;

/// Who has (not) read a message, in frozen-audience order.
pub async fn list_recipients(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Query(query): Query<RecipientQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;

    let filter = match query.status {
        RecipientStatusFilter::All => None,
        RecipientStatusFilter::Read => Some(true),
        RecipientStatusFilter::Unread => Some(false),
    };

    let db = state.clone();
    let mid = message_id.to_string();
    let (message, receipts, (read, total)) = tokio::task::spawn_blocking(move || {
        let message = db.db.get_message(&mid)?;
        let receipts = db.db.get_receipts(&mid, filter)?;
        let counts = db.db.read_count(&mid)?;
        Ok::<_, anyhow::Error>((message, receipts, counts))
    })
    .await
    .map_err(ApiError::join)??;

    message.ok_or_else(|| ApiError::NotFound("message not found".into()))?;

    Ok(Json(RecipientsResponse {
        receipts: receipts.into_iter().map(receipt_to_response).collect(),
        stats: read_stats(read, total),
    }))
}

/// Read accounting for one message: count, frozen-audience total, rounded
/// percentage.
pub async fn message_stats(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;

    let db = state.clone();
    let mid = message_id.to_string();
    let (message, (read, total)) = tokio::task::spawn_blocking(move || {
        let message = db.db.get_message(&mid)?;
        let counts = db.db.read_count(&mid)?;
        Ok::<_, anyhow::Error>((message, counts))
    })
    .await
    .map_err(ApiError::join)??;

    message.ok_or_else(|| ApiError::NotFound("message not found".into()))?;

    Ok(Json(read_stats(read, total)))
}

/// A student marks their own receipt read. Monotonic and idempotent:
/// the first call stamps read_at, repeats return the same receipt
/// unchanged.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    require_student(&claims)?;

    let now = Utc::now();
    let db = state.clone();
    let mid = message_id.to_string();
    let sid = claims.sub.to_string();
    let stamp = fmt_ts(&now);

    let (message, marked) = tokio::task::spawn_blocking(move || {
        let Some(message) = db.db.get_message(&mid)? else {
            return Ok::<_, anyhow::Error>((None, None));
        };
        let marked = db.db.mark_read(&mid, &sid, &stamp)?;
        Ok((Some(message), marked))
    })
    .await
    .map_err(ApiError::join)??;

    let message = message.ok_or_else(|| ApiError::NotFound("message not found".into()))?;
    let (receipt, newly_read) =
        marked.ok_or_else(|| ApiError::NotFound("you are not a recipient of this message".into()))?;

    // Live read-count tick for the sender's portal, only on a real
    // unread -> read transition. Repeats stay silent.
    if newly_read {
        let db = state.clone();
        let mid = message_id.to_string();
        let (read, total) = tokio::task::spawn_blocking(move || db.db.read_count(&mid))
            .await
            .map_err(ApiError::join)??;
        let stats = read_stats(read, total);

        state
            .dispatcher
            .send_to_user(
                parse_uuid(&message.sender_id, "sender id"),
                GatewayEvent::ReceiptRead {
                    message_id,
                    student_id: claims.sub,
                    read_count: stats.read_count,
                    total: stats.total,
                    percentage: stats.percentage,
                },
            )
            .await;
    }

    Ok(Json(MarkReadResponse {
        success: true,
        receipt: receipt_to_response(receipt),
    }))
}

/// The student portal's message list: dispatched messages only, newest
/// first, plus the unread badge count.
pub async fn get_inbox(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    require_student(&claims)?;

    let db = state.clone();
    let sid = claims.sub.to_string();
    let limit = query.limit.min(200);
    let before = query.before;
    let now = fmt_ts(&Utc::now());

    let (rows, unread) = tokio::task::spawn_blocking(move || {
        let rows = db.db.list_inbox(&sid, &now, limit, before.as_deref())?;
        let unread = db.db.count_unread(&sid, &now)?;
        Ok::<_, anyhow::Error>((rows, unread))
    })
    .await
    .map_err(ApiError::join)??;

    Ok(Json(InboxResponse {
        messages: rows.into_iter().map(inbox_to_response).collect(),
        unread,
    }))
}

fn receipt_to_response(row: ReceiptRow) -> ReceiptResponse {
    ReceiptResponse {
        message_id: parse_uuid(&row.message_id, "message id"),
        student_id: parse_uuid(&row.student_id, "student id"),
        is_read: row.is_read,
        read_at: row.read_at.as_deref().and_then(parse_ts),
    }
}

fn inbox_to_response(row: InboxRow) -> InboxMessage {
    let msg = row.message;
    InboxMessage {
        id: parse_uuid(&msg.id, "message id"),
        kind: parse_kind(&msg.kind, &msg.id),
        priority: parse_priority(&msg.priority, &msg.id),
        sent_at: msg.sent_at.as_deref().and_then(parse_ts),
        created_at: parse_dt(&msg.created_at, "created_at", &msg.id),
        is_read: row.is_read,
        read_at: row.read_at.as_deref().and_then(parse_ts),
        sender_name: msg.sender_name,
        title: msg.title,
        content: msg.content,
    }
}
