use crate::Database;
use crate::models::{InboxRow, MessageRow, ReadCountRow, ReceiptRow};
use anyhow::Result;

impl Database {
    // -- Messages --

    /// Insert a message together with one unread receipt per recipient.
    /// Single transaction: the message and its receipt set appear together
    /// or not at all.
    pub fn insert_message(&self, msg: &MessageRow, recipient_ids: &[String]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO messages
                    (id, sender_id, sender_name, kind, title, content, priority,
                     scheduled_at, sent_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    msg.id,
                    msg.sender_id,
                    msg.sender_name,
                    msg.kind,
                    msg.title,
                    msg.content,
                    msg.priority,
                    msg.scheduled_at,
                    msg.sent_at,
                    msg.created_at,
                    msg.updated_at,
                ],
            )?;

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO receipts (message_id, student_id, position) VALUES (?1, ?2, ?3)",
                )?;
                for (position, student_id) in recipient_ids.iter().enumerate() {
                    stmt.execute(rusqlite::params![msg.id, student_id, position as i64])?;
                }
            }

            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{MESSAGE_SELECT} WHERE id = ?1"))?;
            let row = stmt.query_row([id], row_to_message).optional()?;
            Ok(row)
        })
    }

    pub fn list_messages_by_sender(
        &self,
        sender_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let rows = match before {
                Some(cursor) => {
                    let mut stmt = conn.prepare(&format!(
                        "{MESSAGE_SELECT}
                         WHERE sender_id = ?1 AND created_at < ?2
                         ORDER BY created_at DESC
                         LIMIT ?3"
                    ))?;
                    stmt.query_map(rusqlite::params![sender_id, cursor, limit], row_to_message)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "{MESSAGE_SELECT}
                         WHERE sender_id = ?1
                         ORDER BY created_at DESC
                         LIMIT ?2"
                    ))?;
                    stmt.query_map(rusqlite::params![sender_id, limit], row_to_message)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
    }

    /// Every message a sender has dispatched, for the dashboard roll-up.
    pub fn all_messages_by_sender(&self, sender_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{MESSAGE_SELECT} WHERE sender_id = ?1 ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map([sender_id], row_to_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Frozen audience of a message, in audience order.
    pub fn recipient_ids(&self, message_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT student_id FROM receipts WHERE message_id = ?1 ORDER BY position",
            )?;
            let ids = stmt
                .query_map([message_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Apply an edit. When the audience changed, `audience` carries the full
    /// new recipient order plus the removed ids: removed receipts are
    /// deleted, new recipients get fresh unread receipts, and receipts in
    /// the intersection keep their read state (only their position moves).
    /// All inside one transaction with the message row update.
    pub fn update_message(
        &self,
        msg: &MessageRow,
        audience: Option<(&[String], &[String])>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "UPDATE messages
                 SET title = ?2, content = ?3, priority = ?4,
                     scheduled_at = ?5, sent_at = ?6, updated_at = ?7
                 WHERE id = ?1",
                rusqlite::params![
                    msg.id,
                    msg.title,
                    msg.content,
                    msg.priority,
                    msg.scheduled_at,
                    msg.sent_at,
                    msg.updated_at,
                ],
            )?;

            if let Some((new_order, removed)) = audience {
                {
                    let mut del =
                        tx.prepare("DELETE FROM receipts WHERE message_id = ?1 AND student_id = ?2")?;
                    for student_id in removed {
                        del.execute(rusqlite::params![msg.id, student_id])?;
                    }
                }
                {
                    // Upsert: new recipients arrive unread, kept receipts
                    // only have their position refreshed.
                    let mut upsert = tx.prepare(
                        "INSERT INTO receipts (message_id, student_id, position)
                         VALUES (?1, ?2, ?3)
                         ON CONFLICT(message_id, student_id)
                         DO UPDATE SET position = excluded.position",
                    )?;
                    for (position, student_id) in new_order.iter().enumerate() {
                        upsert.execute(rusqlite::params![msg.id, student_id, position as i64])?;
                    }
                }
            }

            tx.commit()?;
            Ok(())
        })
    }

    /// Hard-delete messages; receipts go with them via the FK cascade.
    /// Returns the number of messages removed.
    pub fn delete_messages(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "DELETE FROM messages WHERE id IN ({})",
                placeholders.join(", ")
            );
            let params: Vec<&dyn rusqlite::types::ToSql> =
                ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
            let deleted = tx.execute(&sql, params.as_slice())?;
            tx.commit()?;
            Ok(deleted)
        })
    }

    // -- Receipts --

    /// Flip a receipt to read. Idempotent: a receipt that is already read
    /// keeps its original read_at and the call still returns it. The bool
    /// is true only when this call performed the unread->read transition.
    /// Returns None when no receipt exists for the pair.
    pub fn mark_read(
        &self,
        message_id: &str,
        student_id: &str,
        read_at: &str,
    ) -> Result<Option<(ReceiptRow, bool)>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE receipts SET is_read = 1, read_at = ?3
                 WHERE message_id = ?1 AND student_id = ?2 AND is_read = 0",
                rusqlite::params![message_id, student_id, read_at],
            )? > 0;

            let row = conn
                .query_row(
                    "SELECT message_id, student_id, is_read, read_at
                     FROM receipts WHERE message_id = ?1 AND student_id = ?2",
                    rusqlite::params![message_id, student_id],
                    row_to_receipt,
                )
                .optional()?;
            Ok(row.map(|r| (r, changed)))
        })
    }

    pub fn get_receipts(
        &self,
        message_id: &str,
        is_read: Option<bool>,
    ) -> Result<Vec<ReceiptRow>> {
        self.with_conn(|conn| {
            let rows = match is_read {
                Some(flag) => {
                    let mut stmt = conn.prepare(
                        "SELECT message_id, student_id, is_read, read_at
                         FROM receipts WHERE message_id = ?1 AND is_read = ?2
                         ORDER BY position",
                    )?;
                    stmt.query_map(rusqlite::params![message_id, flag], row_to_receipt)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT message_id, student_id, is_read, read_at
                         FROM receipts WHERE message_id = ?1
                         ORDER BY position",
                    )?;
                    stmt.query_map([message_id], row_to_receipt)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
    }

    pub fn read_count(&self, message_id: &str) -> Result<(usize, usize)> {
        self.with_conn(|conn| {
            let (read, total): (i64, i64) = conn.query_row(
                "SELECT COALESCE(SUM(is_read), 0), COUNT(*)
                 FROM receipts WHERE message_id = ?1",
                [message_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok((read as usize, total as usize))
        })
    }

    /// Batch-fetch read counts for a set of message IDs.
    pub fn read_counts_for_messages(&self, message_ids: &[String]) -> Result<Vec<ReadCountRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT message_id, COALESCE(SUM(is_read), 0), COUNT(*)
                 FROM receipts WHERE message_id IN ({})
                 GROUP BY message_id",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(ReadCountRow {
                        message_id: row.get(0)?,
                        read_count: row.get::<_, i64>(1)? as usize,
                        total: row.get::<_, i64>(2)? as usize,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Student inbox --

    /// A student's dispatched messages, newest first. Scheduled messages
    /// whose time has not come yet are held back; the status comparison
    /// happens against `now` on every call, never against a stored flag.
    pub fn list_inbox(
        &self,
        student_id: &str,
        now: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<InboxRow>> {
        self.with_conn(|conn| {
            let rows = match before {
                Some(cursor) => {
                    let mut stmt = conn.prepare(&format!(
                        "{INBOX_SELECT}
                         AND m.created_at < ?3
                         ORDER BY m.created_at DESC
                         LIMIT ?4"
                    ))?;
                    stmt.query_map(
                        rusqlite::params![student_id, now, cursor, limit],
                        row_to_inbox,
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "{INBOX_SELECT}
                         ORDER BY m.created_at DESC
                         LIMIT ?3"
                    ))?;
                    stmt.query_map(rusqlite::params![student_id, now, limit], row_to_inbox)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
    }

    pub fn count_unread(&self, student_id: &str, now: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*)
                 FROM receipts r
                 JOIN messages m ON m.id = r.message_id
                 WHERE r.student_id = ?1 AND r.is_read = 0
                   AND (m.scheduled_at IS NULL OR m.scheduled_at <= ?2)",
                rusqlite::params![student_id, now],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }
}

const MESSAGE_SELECT: &str = "SELECT id, sender_id, sender_name, kind, title, content, priority,
            scheduled_at, sent_at, created_at, updated_at
     FROM messages";

const INBOX_SELECT: &str = "SELECT m.id, m.sender_id, m.sender_name, m.kind, m.title, m.content,
            m.priority, m.scheduled_at, m.sent_at, m.created_at, m.updated_at,
            r.is_read, r.read_at
     FROM receipts r
     JOIN messages m ON m.id = r.message_id
     WHERE r.student_id = ?1
       AND (m.scheduled_at IS NULL OR m.scheduled_at <= ?2)";

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        sender_name: row.get(2)?,
        kind: row.get(3)?,
        title: row.get(4)?,
        content: row.get(5)?,
        priority: row.get(6)?,
        scheduled_at: row.get(7)?,
        sent_at: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn row_to_receipt(row: &rusqlite::Row) -> rusqlite::Result<ReceiptRow> {
    Ok(ReceiptRow {
        message_id: row.get(0)?,
        student_id: row.get(1)?,
        is_read: row.get(2)?,
        read_at: row.get(3)?,
    })
}

fn row_to_inbox(row: &rusqlite::Row) -> rusqlite::Result<InboxRow> {
    Ok(InboxRow {
        message: row_to_message(row)?,
        is_read: row.get(11)?,
        read_at: row.get(12)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fmt_ts;
    use chrono::{Duration, Utc};

    fn message_row(id: &str, sender_id: &str) -> MessageRow {
        let now = fmt_ts(&Utc::now());
        MessageRow {
            id: id.into(),
            sender_id: sender_id.into(),
            sender_name: "Ms. Rivera".into(),
            kind: "announcement".into(),
            title: "Unit 3 quiz words".into(),
            content: "Twenty new words this week.".into(),
            priority: "medium".into(),
            scheduled_at: None,
            sent_at: Some(now.clone()),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn insert_creates_one_unread_receipt_per_recipient() {
        let db = Database::open_in_memory().unwrap();
        let recipients = ids(&["s1", "s2", "s3"]);
        db.insert_message(&message_row("m1", "admin"), &recipients).unwrap();

        let receipts = db.get_receipts("m1", None).unwrap();
        assert_eq!(receipts.len(), 3);
        assert!(receipts.iter().all(|r| !r.is_read && r.read_at.is_none()));
        // Audience order is preserved.
        assert_eq!(db.recipient_ids("m1").unwrap(), recipients);
        assert_eq!(db.read_count("m1").unwrap(), (0, 3));
    }

    #[test]
    fn audience_is_frozen_at_insert() {
        let db = Database::open_in_memory().unwrap();
        db.insert_message(&message_row("m1", "admin"), &ids(&["s1", "s2"])).unwrap();

        // A later message to a wider roster does not touch m1's audience.
        db.insert_message(&message_row("m2", "admin"), &ids(&["s1", "s2", "s3", "s4"])).unwrap();
        assert_eq!(db.recipient_ids("m1").unwrap(), ids(&["s1", "s2"]));
    }

    #[test]
    fn mark_read_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.insert_message(&message_row("m1", "admin"), &ids(&["s1", "s2"])).unwrap();

        let (first, newly_read) = db.mark_read("m1", "s1", "2026-03-01T10:00:00Z").unwrap().unwrap();
        assert!(first.is_read);
        assert!(newly_read);
        assert_eq!(first.read_at.as_deref(), Some("2026-03-01T10:00:00Z"));

        // Second call with a later timestamp does not overwrite the first.
        let (second, newly_read) = db.mark_read("m1", "s1", "2026-03-02T10:00:00Z").unwrap().unwrap();
        assert!(!newly_read);
        assert_eq!(second.read_at.as_deref(), Some("2026-03-01T10:00:00Z"));
        assert_eq!(db.read_count("m1").unwrap(), (1, 2));
    }

    #[test]
    fn mark_read_outside_the_audience_returns_none() {
        let db = Database::open_in_memory().unwrap();
        db.insert_message(&message_row("m1", "admin"), &ids(&["s1"])).unwrap();
        assert!(db.mark_read("m1", "s9", "2026-03-01T10:00:00Z").unwrap().is_none());
        assert!(db.mark_read("nope", "s1", "2026-03-01T10:00:00Z").unwrap().is_none());
    }

    #[test]
    fn audience_edit_preserves_read_state_of_kept_recipients() {
        let db = Database::open_in_memory().unwrap();
        db.insert_message(&message_row("m1", "admin"), &ids(&["a", "b", "c"])).unwrap();
        db.mark_read("m1", "b", "2026-03-01T10:00:00Z").unwrap();

        // {a, b, c} -> {b, c, d}
        let mut msg = message_row("m1", "admin");
        msg.title = "Unit 3 quiz words (updated)".into();
        let new_order = ids(&["b", "c", "d"]);
        let removed = ids(&["a"]);
        db.update_message(&msg, Some((&new_order, &removed))).unwrap();

        assert_eq!(db.recipient_ids("m1").unwrap(), new_order);
        let receipts = db.get_receipts("m1", None).unwrap();
        let by_id = |id: &str| receipts.iter().find(|r| r.student_id == id).unwrap();
        assert!(by_id("b").is_read);
        assert_eq!(by_id("b").read_at.as_deref(), Some("2026-03-01T10:00:00Z"));
        assert!(!by_id("c").is_read);
        assert!(!by_id("d").is_read);
        assert!(receipts.iter().all(|r| r.student_id != "a"));

        let updated = db.get_message("m1").unwrap().unwrap();
        assert_eq!(updated.title, "Unit 3 quiz words (updated)");
    }

    #[test]
    fn content_only_edit_leaves_receipts_alone() {
        let db = Database::open_in_memory().unwrap();
        db.insert_message(&message_row("m1", "admin"), &ids(&["a", "b"])).unwrap();
        db.mark_read("m1", "a", "2026-03-01T10:00:00Z").unwrap();

        let mut msg = message_row("m1", "admin");
        msg.content = "Corrected word list.".into();
        db.update_message(&msg, None).unwrap();

        assert_eq!(db.read_count("m1").unwrap(), (1, 2));
    }

    #[test]
    fn delete_cascades_to_receipts() {
        let db = Database::open_in_memory().unwrap();
        db.insert_message(&message_row("m1", "admin"), &ids(&["s1", "s2"])).unwrap();
        db.insert_message(&message_row("m2", "admin"), &ids(&["s1"])).unwrap();

        let deleted = db.delete_messages(&ids(&["m1", "missing"])).unwrap();
        assert_eq!(deleted, 1);

        assert!(db.get_message("m1").unwrap().is_none());
        assert!(db.get_receipts("m1", None).unwrap().is_empty());
        // The other message is untouched.
        assert_eq!(db.read_count("m2").unwrap(), (0, 1));
    }

    #[test]
    fn read_counts_batch_matches_per_message_counts() {
        let db = Database::open_in_memory().unwrap();
        db.insert_message(&message_row("m1", "admin"), &ids(&["s1", "s2", "s3", "s4"])).unwrap();
        db.insert_message(&message_row("m2", "admin"), &ids(&["s1"])).unwrap();
        db.mark_read("m1", "s4", "2026-03-01T10:00:00Z").unwrap();

        let counts = db.read_counts_for_messages(&ids(&["m1", "m2"])).unwrap();
        let m1 = counts.iter().find(|c| c.message_id == "m1").unwrap();
        assert_eq!((m1.read_count, m1.total), (1, 4));
        let m2 = counts.iter().find(|c| c.message_id == "m2").unwrap();
        assert_eq!((m2.read_count, m2.total), (0, 1));
    }

    #[test]
    fn inbox_holds_back_future_scheduled_messages() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();

        db.insert_message(&message_row("m1", "admin"), &ids(&["s1"])).unwrap();

        let mut scheduled = message_row("m2", "admin");
        scheduled.sent_at = None;
        scheduled.scheduled_at = Some(fmt_ts(&(now + Duration::hours(2))));
        db.insert_message(&scheduled, &ids(&["s1"])).unwrap();

        let inbox = db.list_inbox("s1", &fmt_ts(&now), 50, None).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].message.id, "m1");
        assert_eq!(db.count_unread("s1", &fmt_ts(&now)).unwrap(), 1);

        // Once the wall clock passes the schedule, the message surfaces
        // with no write in between.
        let later = fmt_ts(&(now + Duration::hours(3)));
        let inbox = db.list_inbox("s1", &later, 50, None).unwrap();
        assert_eq!(inbox.len(), 2);
        assert_eq!(db.count_unread("s1", &later).unwrap(), 2);
    }

    #[test]
    fn inbox_paginates_with_a_before_cursor() {
        let db = Database::open_in_memory().unwrap();
        let base = Utc::now();
        for i in 0..3 {
            let mut msg = message_row(&format!("m{i}"), "admin");
            msg.created_at = fmt_ts(&(base + Duration::minutes(i)));
            db.insert_message(&msg, &ids(&["s1"])).unwrap();
        }

        let now = fmt_ts(&(base + Duration::hours(1)));
        let page = db.list_inbox("s1", &now, 2, None).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].message.id, "m2");

        let cursor = page.last().unwrap().message.created_at.clone();
        let rest = db.list_inbox("s1", &now, 2, Some(&cursor)).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].message.id, "m0");
    }
}
