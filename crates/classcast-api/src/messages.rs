//! Message lifecycle: preview, create, list, edit, delete.
//!
//! The audience is resolved through `classcast_types::audience::resolve`
//! against one directory snapshot per request. The admin client runs the
//! same pure function for its compose preview, so the persisted audience
//! can only differ from the previewed one when the roster itself changed
//! in between.

use std::collections::{HashMap, HashSet};

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use classcast_db::models::MessageRow;
use classcast_db::{fmt_ts, parse_ts};
use classcast_types::api::{
    Claims, CreateMessageRequest, DeleteMessagesRequest, DeleteMessagesResponse,
    EditMessageRequest, MessageResponse, PageQuery, PreviewAudienceRequest,
    PreviewAudienceResponse,
};
use classcast_types::audience::resolve;
use classcast_types::events::GatewayEvent;
use classcast_types::models::{MAX_CONTENT_LEN, MessageKind, MessageStatus, Priority};
use classcast_types::stats::{ReadStats, read_stats};

use crate::error::ApiError;
use crate::middleware::require_admin;
use crate::state::AppState;

/// Author-facing recipient count. Must match what `create_message` will
/// persist for the same selection and roster.
pub async fn preview_audience(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PreviewAudienceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;

    let roster = state.directory.list_students().await?;
    let audience = resolve(&req.selection, &roster);

    Ok(Json(PreviewAudienceResponse {
        count: audience.count,
    }))
}

pub async fn create_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;

    let now = Utc::now();
    validate_content(&req.title, &req.content)?;
    validate_schedule(req.scheduled_at, now)?;

    let roster = state.directory.list_students().await?;
    let audience = resolve(&req.selection, &roster);
    if audience.count == 0 {
        return Err(ApiError::Validation("message has no recipients".into()));
    }

    let message_id = Uuid::new_v4();
    // Dispatched now unless a schedule was given; never both unset.
    let sent_at = if req.scheduled_at.is_none() { Some(now) } else { None };

    let row = MessageRow {
        id: message_id.to_string(),
        sender_id: claims.sub.to_string(),
        sender_name: claims.name.clone(),
        kind: req.kind.to_string(),
        title: req.title.clone(),
        content: req.content.clone(),
        priority: req.priority.to_string(),
        scheduled_at: req.scheduled_at.as_ref().map(fmt_ts),
        sent_at: sent_at.as_ref().map(fmt_ts),
        created_at: fmt_ts(&now),
        updated_at: fmt_ts(&now),
    };
    let recipient_rows: Vec<String> = audience
        .recipient_ids
        .iter()
        .map(|id| id.to_string())
        .collect();

    // Run the blocking insert off the async runtime
    let db = state.clone();
    tokio::task::spawn_blocking(move || db.db.insert_message(&row, &recipient_rows))
        .await
        .map_err(ApiError::join)??;

    let status = MessageStatus::derive(req.scheduled_at, now);

    // Refresh signal: admin lists pick up the new message without a reload
    state.dispatcher.broadcast(GatewayEvent::MessageCreate {
        id: message_id,
        sender_id: claims.sub,
        kind: req.kind,
        title: req.title.clone(),
        status,
        recipient_count: audience.count,
        timestamp: now,
    });

    // Connected recipients get a targeted nudge once the message is live
    if status == MessageStatus::Sent {
        for student_id in &audience.recipient_ids {
            state
                .dispatcher
                .send_to_user(
                    *student_id,
                    GatewayEvent::InboxUpdate {
                        message_id,
                        sender_name: claims.name.clone(),
                        kind: req.kind,
                        title: req.title.clone(),
                        priority: req.priority,
                    },
                )
                .await;
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            id: message_id,
            sender_id: claims.sub,
            sender_name: claims.name.clone(),
            kind: req.kind,
            title: req.title,
            content: req.content,
            priority: req.priority,
            status,
            scheduled_at: req.scheduled_at,
            sent_at,
            recipient_count: audience.count,
            read_stats: read_stats(0, audience.count),
            created_at: now,
            updated_at: now,
        }),
    ))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;

    let db = state.clone();
    let sender = claims.sub.to_string();
    let limit = query.limit.min(200);
    let before = query.before;

    let (rows, counts) = tokio::task::spawn_blocking(move || {
        let rows = db.db.list_messages_by_sender(&sender, limit, before.as_deref())?;
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let counts = db.db.read_counts_for_messages(&ids)?;
        Ok::<_, anyhow::Error>((rows, counts))
    })
    .await
    .map_err(ApiError::join)??;

    let count_map: HashMap<String, (usize, usize)> = counts
        .into_iter()
        .map(|c| (c.message_id, (c.read_count, c.total)))
        .collect();

    let now = Utc::now();
    let messages: Vec<MessageResponse> = rows
        .into_iter()
        .map(|row| {
            let (read, total) = count_map.get(&row.id).copied().unwrap_or((0, 0));
            row_to_response(row, read_stats(read, total), now)
        })
        .collect();

    Ok(Json(messages))
}

pub async fn edit_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(patch): Json<EditMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;

    let now = Utc::now();

    let db = state.clone();
    let mid = message_id.to_string();
    let existing = tokio::task::spawn_blocking(move || db.db.get_message(&mid))
        .await
        .map_err(ApiError::join)??
        .ok_or_else(|| ApiError::NotFound("message not found".into()))?;

    if existing.sender_id != claims.sub.to_string() {
        return Err(ApiError::Forbidden(
            "only the sender can edit this message".into(),
        ));
    }

    // Merge the patch over the stored row and validate the merged result
    // before touching anything; an invalid edit changes nothing.
    let title = patch.title.clone().unwrap_or_else(|| existing.title.clone());
    let content = patch
        .content
        .clone()
        .unwrap_or_else(|| existing.content.clone());
    let priority = match patch.priority {
        Some(p) => p.to_string(),
        None => existing.priority.clone(),
    };
    let scheduled_at = match patch.scheduled_at {
        Some(at) => Some(at),
        None => existing.scheduled_at.as_deref().and_then(parse_ts),
    };

    validate_content(&title, &content)?;
    if patch.scheduled_at.is_some() {
        // Only a *new* schedule has to be in the future; a schedule that
        // already elapsed on a dispatched message is fine to keep.
        validate_schedule(patch.scheduled_at, now)?;
    }

    // Re-resolve the audience if the selection changed, and diff it
    // against the frozen recipient set.
    let mut audience_change: Option<(Vec<String>, Vec<String>)> = None;
    let mut added_ids: Vec<Uuid> = Vec::new();

    if let Some(selection) = &patch.selection {
        let roster = state.directory.list_students().await?;
        let audience = resolve(selection, &roster);
        if audience.count == 0 {
            return Err(ApiError::Validation("message has no recipients".into()));
        }

        let db = state.clone();
        let mid = message_id.to_string();
        let current = tokio::task::spawn_blocking(move || db.db.recipient_ids(&mid))
            .await
            .map_err(ApiError::join)??;

        let current_set: HashSet<String> = current.iter().cloned().collect();
        let new_order: Vec<String> = audience
            .recipient_ids
            .iter()
            .map(|id| id.to_string())
            .collect();
        let new_set: HashSet<&String> = new_order.iter().collect();

        let removed: Vec<String> = current
            .iter()
            .filter(|id| !new_set.contains(*id))
            .cloned()
            .collect();
        added_ids = audience
            .recipient_ids
            .iter()
            .copied()
            .filter(|id| !current_set.contains(&id.to_string()))
            .collect();

        if !removed.is_empty() || !added_ids.is_empty() {
            audience_change = Some((new_order, removed));
        }
    }

    let updated = MessageRow {
        id: existing.id.clone(),
        sender_id: existing.sender_id.clone(),
        sender_name: existing.sender_name.clone(),
        kind: existing.kind.clone(),
        title,
        content,
        priority,
        scheduled_at: scheduled_at.as_ref().map(fmt_ts),
        sent_at: existing.sent_at.clone(),
        created_at: existing.created_at.clone(),
        updated_at: fmt_ts(&now),
    };

    let db = state.clone();
    let mid = message_id.to_string();
    let change = audience_change;
    let (row, read, total) = tokio::task::spawn_blocking(move || {
        db.db.update_message(
            &updated,
            change.as_ref().map(|(n, r)| (n.as_slice(), r.as_slice())),
        )?;
        let row = db
            .db
            .get_message(&mid)?
            .ok_or_else(|| anyhow::anyhow!("message vanished during edit"))?;
        let (read, total) = db.db.read_count(&mid)?;
        Ok::<_, anyhow::Error>((row, read, total))
    })
    .await
    .map_err(ApiError::join)??;

    let response = row_to_response(row, read_stats(read, total), now);

    state.dispatcher.broadcast(GatewayEvent::MessageUpdate {
        id: message_id,
        sender_id: claims.sub,
        status: response.status,
        recipient_count: total,
        timestamp: now,
    });

    if response.status == MessageStatus::Sent {
        for student_id in &added_ids {
            state
                .dispatcher
                .send_to_user(
                    *student_id,
                    GatewayEvent::InboxUpdate {
                        message_id,
                        sender_name: response.sender_name.clone(),
                        kind: response.kind,
                        title: response.title.clone(),
                        priority: response.priority,
                    },
                )
                .await;
        }
    }

    Ok(Json(response))
}

pub async fn delete_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DeleteMessagesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;

    if req.message_ids.is_empty() {
        return Err(ApiError::Validation("no messages selected".into()));
    }

    let db = state.clone();
    let ids: Vec<String> = req.message_ids.iter().map(|id| id.to_string()).collect();
    let sender = claims.sub.to_string();

    let deleted = tokio::task::spawn_blocking(move || {
        // Ownership check first; the delete itself is one transaction and
        // the FK cascade takes the receipts with each message.
        for id in &ids {
            let row = db
                .db
                .get_message(id)?
                .ok_or_else(|| ApiError::NotFound(format!("message {id} not found")))?;
            if row.sender_id != sender {
                return Err(ApiError::Forbidden(
                    "only the sender can delete this message".into(),
                ));
            }
        }
        Ok::<_, ApiError>(db.db.delete_messages(&ids)?)
    })
    .await
    .map_err(ApiError::join)??;

    for id in &req.message_ids {
        state.dispatcher.broadcast(GatewayEvent::MessageDelete {
            id: *id,
            sender_id: claims.sub,
        });
    }

    Ok(Json(DeleteMessagesResponse {
        success: true,
        message: format!("{deleted} message(s) deleted"),
        deleted,
    }))
}

// -- Validation --

fn validate_content(title: &str, content: &str) -> Result<(), ApiError> {
    if title.trim().is_empty() {
        return Err(ApiError::Validation("title cannot be blank".into()));
    }
    if content.trim().is_empty() {
        return Err(ApiError::Validation("content cannot be blank".into()));
    }
    if content.chars().count() > MAX_CONTENT_LEN {
        return Err(ApiError::Validation(format!(
            "content exceeds {MAX_CONTENT_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_schedule(
    scheduled_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(), ApiError> {
    match scheduled_at {
        Some(at) if at < now => Err(ApiError::Validation("scheduled time is in the past".into())),
        _ => Ok(()),
    }
}

// -- Row conversion --

pub(crate) fn parse_uuid(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

pub(crate) fn parse_dt(raw: &str, what: &str, message_id: &str) -> DateTime<Utc> {
    parse_ts(raw).unwrap_or_else(|| {
        warn!("Corrupt {} '{}' on message '{}'", what, raw, message_id);
        DateTime::default()
    })
}

pub(crate) fn parse_kind(raw: &str, message_id: &str) -> MessageKind {
    raw.parse().unwrap_or_else(|e| {
        warn!("{} on message '{}'", e, message_id);
        MessageKind::Announcement
    })
}

pub(crate) fn parse_priority(raw: &str, message_id: &str) -> Priority {
    raw.parse().unwrap_or_else(|e| {
        warn!("{} on message '{}'", e, message_id);
        Priority::Medium
    })
}

pub(crate) fn row_to_response(row: MessageRow, stats: ReadStats, now: DateTime<Utc>) -> MessageResponse {
    let scheduled_at = row.scheduled_at.as_deref().and_then(parse_ts);
    let sent_at = row.sent_at.as_deref().and_then(parse_ts);

    MessageResponse {
        id: parse_uuid(&row.id, "message id"),
        sender_id: parse_uuid(&row.sender_id, "sender id"),
        kind: parse_kind(&row.kind, &row.id),
        priority: parse_priority(&row.priority, &row.id),
        status: MessageStatus::derive(scheduled_at, now),
        scheduled_at,
        sent_at,
        recipient_count: stats.total,
        read_stats: stats,
        created_at: parse_dt(&row.created_at, "created_at", &row.id),
        updated_at: parse_dt(&row.updated_at, "updated_at", &row.id),
        sender_name: row.sender_name,
        title: row.title,
        content: row.content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_or_oversized_content_is_rejected() {
        assert!(validate_content("Quiz words", "Twenty new words.").is_ok());
        assert!(validate_content("", "body").is_err());
        assert!(validate_content("   ", "body").is_err());
        assert!(validate_content("title", "").is_err());
        assert!(validate_content("title", &"x".repeat(MAX_CONTENT_LEN + 1)).is_err());
        assert!(validate_content("title", &"x".repeat(MAX_CONTENT_LEN)).is_ok());
    }

    #[test]
    fn schedule_must_not_be_in_the_past() {
        let now = Utc::now();
        assert!(validate_schedule(None, now).is_ok());
        assert!(validate_schedule(Some(now + chrono::Duration::minutes(5)), now).is_ok());
        assert!(validate_schedule(Some(now - chrono::Duration::minutes(5)), now).is_err());
    }
}
