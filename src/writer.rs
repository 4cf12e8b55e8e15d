//! Candle validation and idempotent storage, keyed by
//! (exchange, symbol, timeframe, open_time) (C13).

use crate::candle::Candle;
use crate::error::WriterError;
use crate::timeframe::Timeframe;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

pub struct CandleWriter {
    conn: Connection,
}

impl CandleWriter {
    pub fn open(path: &str) -> Result<Self, WriterError> {
        if let Some(parent) = Path::new(path).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path).map_err(|e| WriterError::Sqlite(e.to_string()))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
            .map_err(|e| WriterError::Sqlite(e.to_string()))?;
        Self::init_schema(&conn)?;
        Ok(CandleWriter { conn })
    }

    fn init_schema(conn: &Connection) -> Result<(), WriterError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS candles (
                exchange TEXT NOT NULL,
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                open_time INTEGER NOT NULL,
                close_time INTEGER NOT NULL,
                open TEXT NOT NULL,
                high TEXT NOT NULL,
                low TEXT NOT NULL,
                close TEXT NOT NULL,
                total_volume TEXT NOT NULL,
                buy_volume TEXT NOT NULL,
                sell_volume TEXT NOT NULL,
                total_quote_volume TEXT NOT NULL,
                buy_quote_volume TEXT NOT NULL,
                sell_quote_volume TEXT NOT NULL,
                trade_count INTEGER NOT NULL,
                delta TEXT NOT NULL,
                delta_max TEXT NOT NULL,
                delta_min TEXT NOT NULL,
                bins TEXT NOT NULL,
                UNIQUE(exchange, symbol, timeframe, open_time)
            )",
            [],
        )
        .map_err(|e| WriterError::Sqlite(e.to_string()))?;
        Ok(())
    }

    /// Validates a candle per the rules in the error taxonomy; never
    /// touches storage.
    pub fn validate(candle: &Candle) -> Result<(), WriterError> {
        if candle.timeframe.is_base() {
            return Err(WriterError::BaseTimeframeRejected);
        }

        if !candle.is_bucket_aligned() {
            return Err(WriterError::Misaligned {
                open_time: candle.open_time,
                duration_ms: candle.timeframe.duration_ms(),
            });
        }

        if candle.low > candle.open.min(candle.close) {
            return Err(WriterError::LowAboveBody {
                low: candle.low.to_string(),
            });
        }
        if candle.high < candle.open.max(candle.close) {
            return Err(WriterError::HighBelowBody {
                high: candle.high.to_string(),
            });
        }

        if !candle.bins.is_sorted_unique() {
            return Err(WriterError::BinsUnsorted);
        }
        for bin in &candle.bins.0 {
            if bin.buy_volume.is_sign_negative() || bin.sell_volume.is_sign_negative() {
                return Err(WriterError::NegativeBinVolume {
                    tick_price: bin.tick_price.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Validates then idempotently inserts (or replaces, by natural key)
    /// a completed candle.
    pub fn persist(&self, candle: &Candle) -> Result<(), WriterError> {
        Self::validate(candle)?;

        let bins_json = serde_json::to_string(&candle.bins)
            .map_err(|e| WriterError::Sqlite(e.to_string()))?;

        self.conn
            .execute(
                "INSERT INTO candles (
                    exchange, symbol, timeframe, open_time, close_time,
                    open, high, low, close,
                    total_volume, buy_volume, sell_volume,
                    total_quote_volume, buy_quote_volume, sell_quote_volume,
                    trade_count, delta, delta_max, delta_min, bins
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9,
                    ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20
                )
                ON CONFLICT(exchange, symbol, timeframe, open_time) DO UPDATE SET
                    close_time = excluded.close_time,
                    open = excluded.open, high = excluded.high,
                    low = excluded.low, close = excluded.close,
                    total_volume = excluded.total_volume,
                    buy_volume = excluded.buy_volume,
                    sell_volume = excluded.sell_volume,
                    total_quote_volume = excluded.total_quote_volume,
                    buy_quote_volume = excluded.buy_quote_volume,
                    sell_quote_volume = excluded.sell_quote_volume,
                    trade_count = excluded.trade_count,
                    delta = excluded.delta, delta_max = excluded.delta_max,
                    delta_min = excluded.delta_min, bins = excluded.bins",
                params![
                    candle.exchange,
                    candle.symbol,
                    candle.timeframe.as_str(),
                    candle.open_time,
                    candle.close_time,
                    candle.open.to_string(),
                    candle.high.to_string(),
                    candle.low.to_string(),
                    candle.close.to_string(),
                    candle.total_volume.to_string(),
                    candle.buy_volume.to_string(),
                    candle.sell_volume.to_string(),
                    candle.total_quote_volume.to_string(),
                    candle.buy_quote_volume.to_string(),
                    candle.sell_quote_volume.to_string(),
                    candle.trade_count as i64,
                    candle.delta.to_string(),
                    candle.delta_max.to_string(),
                    candle.delta_min.to_string(),
                    bins_json,
                ],
            )
            .map_err(|e| WriterError::Sqlite(e.to_string()))?;
        Ok(())
    }

    /// Reads back the count of stored candles for (symbol, timeframe),
    /// used by tests and the health endpoint.
    pub fn count(&self, exchange: &str, symbol: &str, timeframe: Timeframe) -> Result<u64, WriterError> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM candles WHERE exchange = ?1 AND symbol = ?2 AND timeframe = ?3",
                params![exchange, symbol, timeframe.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| WriterError::Sqlite(e.to_string()))?
            .unwrap_or(0);
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use tempfile::NamedTempFile;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn closed_minute_candle() -> Candle {
        let mut c = Candle::open_from_trade("binance", "BTCUSDT", Timeframe::OneMinute, 0, d("100"), 1);
        c.merge_trade(d("101"), d("1"), d("101"), false, 2, d("101"));
        c.close();
        c
    }

    #[test]
    fn rejects_base_timeframe() {
        let c = Candle::open_from_trade("binance", "BTCUSDT", Timeframe::OneSecond, 0, d("100"), 1);
        assert_eq!(CandleWriter::validate(&c), Err(WriterError::BaseTimeframeRejected));
    }

    #[test]
    fn rejects_misaligned_open_time() {
        let mut c = closed_minute_candle();
        c.open_time = 1; // not a multiple of 60_000
        assert!(matches!(CandleWriter::validate(&c), Err(WriterError::Misaligned { .. })));
    }

    #[test]
    fn persist_is_idempotent_by_natural_key() {
        let file = NamedTempFile::new().unwrap();
        let writer = CandleWriter::open(file.path().to_str().unwrap()).unwrap();
        let candle = closed_minute_candle();

        writer.persist(&candle).unwrap();
        writer.persist(&candle).unwrap();

        assert_eq!(writer.count("binance", "BTCUSDT", Timeframe::OneMinute).unwrap(), 1);
    }
}
