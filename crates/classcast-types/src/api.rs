use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{MessageKind, MessageStatus, Priority, SelectionSpec};
use crate::stats::ReadStats;

// -- JWT Claims --

/// Who the caller is. Tokens are minted by the platform's auth service;
/// this backend only validates them. The definition lives here because both
/// the REST middleware and the gateway's WebSocket identify step decode it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub role: Role,
    pub exp: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Student,
}

// -- Compose / preview --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PreviewAudienceRequest {
    pub selection: SelectionSpec,
}

#[derive(Debug, Serialize)]
pub struct PreviewAudienceResponse {
    pub count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMessageRequest {
    pub kind: MessageKind,
    pub title: String,
    pub content: String,
    pub priority: Priority,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub selection: SelectionSpec,
}

/// Partial edit. Absent fields keep their current value; a present
/// `selection` re-resolves the audience against a fresh roster snapshot.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditMessageRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub priority: Option<Priority>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub selection: Option<SelectionSpec>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub kind: MessageKind,
    pub title: String,
    pub content: String,
    pub priority: Priority,
    pub status: MessageStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub recipient_count: usize,
    pub read_stats: ReadStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Delete --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteMessagesRequest {
    pub message_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct DeleteMessagesResponse {
    pub success: bool,
    pub message: String,
    pub deleted: usize,
}

// -- Receipts --

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientStatusFilter {
    #[default]
    All,
    Read,
    Unread,
}

#[derive(Debug, Deserialize)]
pub struct RecipientQuery {
    #[serde(default)]
    pub status: RecipientStatusFilter,
}

#[derive(Debug, Serialize)]
pub struct ReceiptResponse {
    pub message_id: Uuid,
    pub student_id: Uuid,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct RecipientsResponse {
    pub receipts: Vec<ReceiptResponse>,
    pub stats: ReadStats,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub success: bool,
    pub receipt: ReceiptResponse,
}

// -- Pagination --

/// Shared by the admin message list and the student inbox.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor-based pagination — pass the `created_at` of the oldest message
    /// from the previous page to fetch older ones.
    pub before: Option<String>,
}

fn default_limit() -> u32 {
    50
}

// -- Student inbox --

#[derive(Debug, Serialize)]
pub struct InboxMessage {
    pub id: Uuid,
    pub sender_name: String,
    pub kind: MessageKind,
    pub title: String,
    pub content: String,
    pub priority: Priority,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct InboxResponse {
    pub messages: Vec<InboxMessage>,
    pub unread: usize,
}
