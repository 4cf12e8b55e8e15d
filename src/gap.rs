//! Sequence-gap record: a detected discontinuity in a symbol's trade-id
//! sequence, repaired out of band and never blocking the live path.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapRecord {
    pub symbol: String,
    pub exchange: String,
    pub from_trade_id: u64,
    pub to_trade_id: u64,
    pub gap_size: u64,
    pub detected_at: i64,
    pub synced: bool,
}

impl GapRecord {
    pub fn new(
        symbol: &str,
        exchange: &str,
        from_trade_id: u64,
        to_trade_id: u64,
        detected_at: i64,
    ) -> Self {
        GapRecord {
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            from_trade_id,
            to_trade_id,
            gap_size: to_trade_id - from_trade_id + 1,
            detected_at,
            synced: false,
        }
    }
}
