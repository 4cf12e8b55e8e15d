//! Durable on-disk FIFO fallback for the hybrid publisher: a local
//! `rusqlite` table giving at-least-once delivery when the fast channel
//! is down (C11).

use crate::error::QueueError;
use crate::ipc::Envelope;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

pub struct DurableQueue {
    conn: Connection,
}

impl DurableQueue {
    pub fn open(path: &str) -> Result<Self, QueueError> {
        if let Some(parent) = Path::new(path).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")?;
        Self::init_schema(&conn)?;
        Ok(DurableQueue { conn })
    }

    fn init_schema(conn: &Connection) -> Result<(), QueueError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS queue_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                envelope_id TEXT NOT NULL,
                message_type TEXT NOT NULL,
                body TEXT NOT NULL,
                enqueued_at INTEGER NOT NULL,
                processed INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_queue_messages_unprocessed
                ON queue_messages (processed, id)",
            [],
        )?;
        Ok(())
    }

    /// Appends an envelope to the tail of the queue.
    pub fn enqueue(&self, envelope: &Envelope, now_ms: i64) -> Result<(), QueueError> {
        let body = serde_json::to_string(envelope)?;
        self.conn.execute(
            "INSERT INTO queue_messages (envelope_id, message_type, body, enqueued_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![envelope.id.to_string(), envelope.message_type, body, now_ms],
        )?;
        Ok(())
    }

    /// Pops up to `limit` unprocessed rows in FIFO order, oldest first.
    pub fn dequeue(&self, limit: u32) -> Result<Vec<(i64, Envelope)>, QueueError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, body FROM queue_messages
             WHERE processed = 0
             ORDER BY id ASC
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                let id: i64 = row.get(0)?;
                let body: String = row.get(1)?;
                Ok((id, body))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, body)| {
                let envelope = Envelope::decode(body.as_bytes())?;
                Ok((id, envelope))
            })
            .collect()
    }

    /// Marks a row delivered; it becomes eligible for `cleanup`.
    pub fn mark_processed(&self, row_id: i64) -> Result<(), QueueError> {
        self.conn.execute(
            "UPDATE queue_messages SET processed = 1 WHERE id = ?1",
            params![row_id],
        )?;
        Ok(())
    }

    /// Deletes processed rows older than `retention_hours`. Returns the
    /// number of rows removed.
    pub fn cleanup(&self, retention_hours: u64, now_ms: i64) -> Result<usize, QueueError> {
        let cutoff = now_ms - (retention_hours as i64) * 3_600_000;
        let removed = self.conn.execute(
            "DELETE FROM queue_messages WHERE processed = 1 AND enqueued_at < ?1",
            params![cutoff],
        )?;
        Ok(removed)
    }

    /// Count of unprocessed rows, used by health reporting.
    pub fn pending_count(&self) -> Result<u64, QueueError> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM queue_messages WHERE processed = 0",
                [],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        Ok(count as u64)
    }
}
