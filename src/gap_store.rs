//! Persistence for gap records and worker candle-group snapshots (C14).

use crate::candle_group::CandleGroup;
use crate::error::SnapshotError;
use crate::gap::GapRecord;
use rusqlite::{Connection, params};
use std::path::Path;

pub struct GapStore {
    conn: Connection,
}

impl GapStore {
    pub fn open(path: &str) -> Result<Self, SnapshotError> {
        if let Some(parent) = Path::new(path).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")?;
        Self::init_schema(&conn)?;
        Ok(GapStore { conn })
    }

    fn init_schema(conn: &Connection) -> Result<(), SnapshotError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS gap_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                exchange TEXT NOT NULL,
                symbol TEXT NOT NULL,
                from_trade_id INTEGER NOT NULL,
                to_trade_id INTEGER NOT NULL,
                gap_size INTEGER NOT NULL,
                detected_at INTEGER NOT NULL,
                synced INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS candle_group_snapshots (
                exchange TEXT NOT NULL,
                symbol TEXT NOT NULL,
                snapshot BLOB NOT NULL,
                saved_at INTEGER NOT NULL,
                PRIMARY KEY (exchange, symbol)
            )",
            [],
        )?;
        Ok(())
    }

    pub fn save_gap(&self, gap: &GapRecord) -> Result<(), SnapshotError> {
        self.conn.execute(
            "INSERT INTO gap_records
                (exchange, symbol, from_trade_id, to_trade_id, gap_size, detected_at, synced)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            params![
                gap.exchange,
                gap.symbol,
                gap.from_trade_id as i64,
                gap.to_trade_id as i64,
                gap.gap_size as i64,
                gap.detected_at,
            ],
        )?;
        Ok(())
    }

    pub fn unsynced_gaps(&self, exchange: &str, symbol: &str) -> Result<Vec<GapRecord>, SnapshotError> {
        let mut stmt = self.conn.prepare(
            "SELECT exchange, symbol, from_trade_id, to_trade_id, gap_size, detected_at, synced
             FROM gap_records
             WHERE exchange = ?1 AND symbol = ?2 AND synced = 0
             ORDER BY from_trade_id ASC",
        )?;
        let rows = stmt
            .query_map(params![exchange, symbol], |row| {
                Ok(GapRecord {
                    exchange: row.get(0)?,
                    symbol: row.get(1)?,
                    from_trade_id: row.get::<_, i64>(2)? as u64,
                    to_trade_id: row.get::<_, i64>(3)? as u64,
                    gap_size: row.get::<_, i64>(4)? as u64,
                    detected_at: row.get(5)?,
                    synced: row.get::<_, i64>(6)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn mark_gap_synced(
        &self,
        exchange: &str,
        symbol: &str,
        from_trade_id: u64,
    ) -> Result<(), SnapshotError> {
        self.conn.execute(
            "UPDATE gap_records SET synced = 1
             WHERE exchange = ?1 AND symbol = ?2 AND from_trade_id = ?3",
            params![exchange, symbol, from_trade_id as i64],
        )?;
        Ok(())
    }

    /// Serializes and upserts a worker's candle group for crash recovery.
    pub fn save_snapshot(&self, group: &CandleGroup, saved_at: i64) -> Result<(), SnapshotError> {
        let bytes = bincode::serialize(group)?;
        self.conn.execute(
            "INSERT INTO candle_group_snapshots (exchange, symbol, snapshot, saved_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(exchange, symbol) DO UPDATE SET snapshot = excluded.snapshot, saved_at = excluded.saved_at",
            params![group.exchange, group.symbol, bytes, saved_at],
        )?;
        Ok(())
    }

    pub fn load_snapshot(
        &self,
        exchange: &str,
        symbol: &str,
    ) -> Result<Option<CandleGroup>, SnapshotError> {
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT snapshot FROM candle_group_snapshots WHERE exchange = ?1 AND symbol = ?2",
                params![exchange, symbol],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        match bytes {
            Some(b) => Ok(Some(bincode::deserialize(&b)?)),
            None => Ok(None),
        }
    }
}
