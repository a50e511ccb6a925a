//! Read-receipt aggregation.
//!
//! Pure arithmetic over receipt counts; the store supplies the counts and
//! the handlers expose the results. Kept side-effect free so the admin
//! client can recompute the same figures locally.

use serde::{Deserialize, Serialize};

use crate::models::{MessageKind, MessageStatus};

/// Per-message read accounting. `total` is always the frozen audience
/// count, not the current roster size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadStats {
    pub read_count: usize,
    pub total: usize,
    pub percentage: u32,
}

/// `round(read_count / total * 100)`. A historically empty audience yields
/// 0 of 0 at 0% instead of dividing by zero; creation-time validation
/// keeps that case out of new data.
pub fn read_stats(read_count: usize, total: usize) -> ReadStats {
    let percentage = if total == 0 {
        0
    } else {
        (read_count as f64 / total as f64 * 100.0).round() as u32
    };
    ReadStats {
        read_count,
        total,
        percentage,
    }
}

/// What the dashboard needs to know about one message.
#[derive(Debug, Clone)]
pub struct MessageSummary {
    pub kind: MessageKind,
    pub status: MessageStatus,
    pub stats: ReadStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    pub announcement: usize,
    pub personal: usize,
    pub reminder: usize,
    pub achievement: usize,
}

/// Fleet-wide roll-up across one sender's messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetStats {
    pub total_messages: usize,
    pub sent: usize,
    pub scheduled: usize,
    pub by_kind: KindCounts,
    pub unread_total: usize,
    /// Unweighted mean of each message's own percentage, not a weighted
    /// mean over raw counts. Matches the figures the portal displays.
    pub average_read_rate: u32,
}

pub fn fleet_stats(summaries: &[MessageSummary]) -> FleetStats {
    let mut by_kind = KindCounts::default();
    let mut sent = 0;
    let mut scheduled = 0;
    let mut unread_total = 0;
    let mut percentage_sum: u64 = 0;

    for summary in summaries {
        match summary.kind {
            MessageKind::Announcement => by_kind.announcement += 1,
            MessageKind::Personal => by_kind.personal += 1,
            MessageKind::Reminder => by_kind.reminder += 1,
            MessageKind::Achievement => by_kind.achievement += 1,
        }
        match summary.status {
            MessageStatus::Sent => sent += 1,
            MessageStatus::Scheduled => scheduled += 1,
        }
        unread_total += summary.stats.total - summary.stats.read_count;
        percentage_sum += u64::from(summary.stats.percentage);
    }

    let average_read_rate = if summaries.is_empty() {
        0
    } else {
        (percentage_sum as f64 / summaries.len() as f64).round() as u32
    };

    FleetStats {
        total_messages: summaries.len(),
        sent,
        scheduled,
        by_kind,
        unread_total,
        average_read_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(kind: MessageKind, status: MessageStatus, read: usize, total: usize) -> MessageSummary {
        MessageSummary {
            kind,
            status,
            stats: read_stats(read, total),
        }
    }

    #[test]
    fn percentage_rounds_to_nearest_whole() {
        assert_eq!(read_stats(1, 4).percentage, 25);
        assert_eq!(read_stats(1, 3).percentage, 33);
        assert_eq!(read_stats(2, 3).percentage, 67);
        assert_eq!(read_stats(1, 1).percentage, 100);
    }

    #[test]
    fn empty_audience_reports_zero_of_zero() {
        let stats = read_stats(0, 0);
        assert_eq!(stats.read_count, 0);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.percentage, 0);
    }

    #[test]
    fn average_read_rate_is_an_unweighted_mean() {
        // 100% of 1 and 0% of 99: the weighted mean would be 1%,
        // the displayed figure is the plain mean of the percentages.
        let summaries = vec![
            summary(MessageKind::Personal, MessageStatus::Sent, 1, 1),
            summary(MessageKind::Announcement, MessageStatus::Sent, 0, 99),
        ];
        assert_eq!(fleet_stats(&summaries).average_read_rate, 50);
    }

    #[test]
    fn fleet_partitions_by_kind_and_status() {
        let summaries = vec![
            summary(MessageKind::Announcement, MessageStatus::Sent, 3, 4),
            summary(MessageKind::Announcement, MessageStatus::Scheduled, 0, 4),
            summary(MessageKind::Reminder, MessageStatus::Sent, 2, 2),
        ];

        let fleet = fleet_stats(&summaries);
        assert_eq!(fleet.total_messages, 3);
        assert_eq!(fleet.sent, 2);
        assert_eq!(fleet.scheduled, 1);
        assert_eq!(fleet.by_kind.announcement, 2);
        assert_eq!(fleet.by_kind.reminder, 1);
        assert_eq!(fleet.by_kind.personal, 0);
        assert_eq!(fleet.unread_total, 1 + 4 + 0);
    }

    #[test]
    fn no_messages_average_to_zero() {
        assert_eq!(fleet_stats(&[]).average_read_rate, 0);
    }
}
