use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS messages (
            id            TEXT PRIMARY KEY,
            sender_id     TEXT NOT NULL,
            sender_name   TEXT NOT NULL,
            kind          TEXT NOT NULL,
            title         TEXT NOT NULL,
            content       TEXT NOT NULL,
            priority      TEXT NOT NULL,
            scheduled_at  TEXT,
            sent_at       TEXT,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_sender
            ON messages(sender_id, created_at);

        -- One receipt per (message, recipient); the composite key enforces it.
        -- position preserves the frozen audience order.
        CREATE TABLE IF NOT EXISTS receipts (
            message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            student_id  TEXT NOT NULL,
            position    INTEGER NOT NULL,
            is_read     INTEGER NOT NULL DEFAULT 0,
            read_at     TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (message_id, student_id)
        );

        CREATE INDEX IF NOT EXISTS idx_receipts_student
            ON receipts(student_id, is_read);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
