use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum message body length, enforced at create and edit time.
pub const MAX_CONTENT_LEN: usize = 1000;

/// A student as reported by the directory service. Read-only here;
/// the roster is owned by the platform, not by the messaging backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub name: String,
    pub grade: String,
    pub active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
}

/// The author's recipient-selection intent: send-to-all, whole grades,
/// and individually picked students, in any combination. This is *intent*,
/// not a resolved audience; see [`crate::audience::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSpec {
    #[serde(default)]
    pub send_to_all: bool,
    #[serde(default)]
    pub grades: BTreeSet<String>,
    #[serde(default)]
    pub student_ids: BTreeSet<Uuid>,
}

/// The deduplicated recipient set a message was dispatched to, frozen at
/// create time. Roster changes after dispatch never alter it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audience {
    pub recipient_ids: Vec<Uuid>,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Announcement,
    Personal,
    Reminder,
    Achievement,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Announcement => "announcement",
            Self::Personal => "personal",
            Self::Reminder => "reminder",
            Self::Achievement => "achievement",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "announcement" => Ok(Self::Announcement),
            "personal" => Ok(Self::Personal),
            "reminder" => Ok(Self::Reminder),
            "achievement" => Ok(Self::Achievement),
            other => Err(format!("unknown message kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Display status of a dispatched message. Always derived from the
/// timestamps, never persisted, so it can't drift from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Scheduled,
}

impl MessageStatus {
    /// The single derivation rule: a schedule still in the future means
    /// "scheduled", anything else is "sent". Every surface (list
    /// responses, dashboard partitions, inbox visibility) goes through
    /// here or through SQL expressing the same comparison.
    pub fn derive(scheduled_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match scheduled_at {
            Some(at) if now < at => Self::Scheduled,
            _ => Self::Sent,
        }
    }
}

/// A dispatched message together with its frozen audience.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub kind: MessageKind,
    pub title: String,
    pub content: String,
    pub priority: Priority,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub audience: Audience,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Recomputed on every read; scheduled messages flip to sent purely
    /// by wall-clock time passing.
    pub fn status(&self, now: DateTime<Utc>) -> MessageStatus {
        MessageStatus::derive(self.scheduled_at, now)
    }
}

/// One read record per (message, recipient) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub message_id: Uuid,
    pub student_id: Uuid,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn message(scheduled_at: Option<DateTime<Utc>>, sent_at: Option<DateTime<Utc>>) -> Message {
        Message {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            sender_name: "Ms. Rivera".into(),
            kind: MessageKind::Announcement,
            title: "Week 4 vocabulary list".into(),
            content: "New words are up.".into(),
            priority: Priority::Medium,
            scheduled_at,
            sent_at,
            audience: Audience {
                recipient_ids: vec![Uuid::new_v4()],
                count: 1,
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn status_is_sent_without_schedule() {
        let now = Utc::now();
        let m = message(None, Some(now));
        assert_eq!(m.status(now), MessageStatus::Sent);
    }

    #[test]
    fn status_is_scheduled_before_the_schedule() {
        let now = Utc::now();
        let m = message(Some(now + Duration::hours(2)), None);
        assert_eq!(m.status(now), MessageStatus::Scheduled);
    }

    #[test]
    fn status_flips_to_sent_once_the_schedule_passes() {
        let now = Utc::now();
        let m = message(Some(now + Duration::hours(2)), None);
        assert_eq!(m.status(now + Duration::hours(3)), MessageStatus::Sent);
    }

    #[test]
    fn kind_and_priority_round_trip_through_strings() {
        for kind in [
            MessageKind::Announcement,
            MessageKind::Personal,
            MessageKind::Reminder,
            MessageKind::Achievement,
        ] {
            assert_eq!(kind.as_str().parse::<MessageKind>().unwrap(), kind);
        }
        for priority in [Priority::Low, Priority::Medium, Priority::High] {
            assert_eq!(priority.as_str().parse::<Priority>().unwrap(), priority);
        }
        assert!("urgent".parse::<Priority>().is_err());
    }
}
