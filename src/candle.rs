//! OHLCV + footprint candle for one (symbol, timeframe, open_time).

use crate::footprint::BinSet;
use crate::timeframe::Timeframe;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One candle: OHLCV, delta, and the footprint bins backing it.
///
/// `closed` transitions `false -> true` exactly once; callers must not
/// mutate a candle after it has closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub exchange: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub open_time: i64,
    pub close_time: i64,

    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,

    pub total_volume: Decimal,
    pub buy_volume: Decimal,
    pub sell_volume: Decimal,
    pub total_quote_volume: Decimal,
    pub buy_quote_volume: Decimal,
    pub sell_quote_volume: Decimal,

    pub trade_count: u64,
    pub delta: Decimal,
    pub delta_max: Decimal,
    pub delta_min: Decimal,

    pub first_trade_id: u64,
    pub last_trade_id: u64,

    pub closed: bool,
    pub bins: BinSet,
}

impl Candle {
    /// Opens a fresh candle seeded from a single trade.
    pub fn open_from_trade(
        exchange: &str,
        symbol: &str,
        timeframe: Timeframe,
        open_time: i64,
        price: Decimal,
        trade_id: u64,
    ) -> Candle {
        Candle {
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            timeframe,
            open_time,
            close_time: timeframe.close_time(open_time),
            open: price,
            high: price,
            low: price,
            close: price,
            total_volume: Decimal::ZERO,
            buy_volume: Decimal::ZERO,
            sell_volume: Decimal::ZERO,
            total_quote_volume: Decimal::ZERO,
            buy_quote_volume: Decimal::ZERO,
            sell_quote_volume: Decimal::ZERO,
            trade_count: 0,
            delta: Decimal::ZERO,
            delta_max: Decimal::ZERO,
            delta_min: Decimal::ZERO,
            first_trade_id: trade_id,
            last_trade_id: trade_id,
            closed: false,
            bins: BinSet::new(),
        }
    }

    /// Folds one trade into this (still-open) base candle: updates
    /// h/l/c, counters, volumes, footprint bin, and delta extrema.
    pub fn merge_trade(
        &mut self,
        price: Decimal,
        quantity: Decimal,
        quote_volume: Decimal,
        buyer_is_maker: bool,
        trade_id: u64,
        tick_price: Decimal,
    ) {
        debug_assert!(!self.closed, "attempted to mutate a closed candle");

        if price > self.high {
            self.high = price;
        }
        if price < self.low {
            self.low = price;
        }
        self.close = price;

        self.trade_count += 1;
        self.last_trade_id = trade_id;
        if self.trade_count == 1 {
            self.first_trade_id = trade_id;
        }

        self.total_volume += quantity;
        self.total_quote_volume += quote_volume;
        if !buyer_is_maker {
            self.buy_volume += quantity;
            self.buy_quote_volume += quote_volume;
        } else {
            self.sell_volume += quantity;
            self.sell_quote_volume += quote_volume;
        }

        self.bins
            .apply_trade(tick_price, quantity, quote_volume, buyer_is_maker);

        self.delta = self.buy_volume - self.sell_volume;
        if self.delta > self.delta_max {
            self.delta_max = self.delta;
        }
        if self.delta < self.delta_min {
            self.delta_min = self.delta;
        }
    }

    /// Marks the candle closed. Idempotent only in the sense that calling
    /// it twice is a logic error callers must avoid (see `closed`).
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// `open_time % duration == 0` and `close_time == open_time + duration - 1`.
    pub fn is_bucket_aligned(&self) -> bool {
        self.open_time % self.timeframe.duration_ms() == 0
            && self.close_time == self.open_time + self.timeframe.duration_ms() - 1
    }

    /// `low <= min(open, close) <= max(open, close) <= high`.
    pub fn body_within_range(&self) -> bool {
        self.low <= self.open.min(self.close) && self.high >= self.open.max(self.close)
    }
}
