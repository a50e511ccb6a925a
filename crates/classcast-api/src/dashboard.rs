//! Fleet-wide roll-up for the admin dashboard.

use std::collections::HashMap;

use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;

use classcast_db::parse_ts;
use classcast_types::api::Claims;
use classcast_types::models::MessageStatus;
use classcast_types::stats::{MessageSummary, fleet_stats, read_stats};

use crate::error::ApiError;
use crate::messages::parse_kind;
use crate::middleware::require_admin;
use crate::state::AppState;

/// Per-kind and sent/scheduled partitions, total unread, and the average
/// read rate across the sender's messages. Status is derived against the
/// current wall clock on every call, so a schedule elapsing moves its
/// message from one partition to the other with no write in between.
pub async fn get_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;

    let db = state.clone();
    let sender = claims.sub.to_string();

    let (rows, counts) = tokio::task::spawn_blocking(move || {
        let rows = db.db.all_messages_by_sender(&sender)?;
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
    let summaries: Vec<MessageSummary> = rows
        .iter()
        .map(|row| {
            let (read, total) = count_map.get(&row.id).copied().unwrap_or((0, 0));
            MessageSummary {
                kind: parse_kind(&row.kind, &row.id),
                status: MessageStatus::derive(row.scheduled_at.as_deref().and_then(parse_ts), now),
                stats: read_stats(read, total),
            }
        })
        .collect();

    Ok(Json(fleet_stats(&summaries)))
}
