//! Per-symbol trade processing: dedup, gap detection, base-candle update,
//! rollup trigger (C6). Runs single-threaded inside the owning worker, so
//! steps 1-5 are atomic with respect to other trades for this symbol.

use crate::candle::Candle;
use crate::candle_group::CandleGroup;
use crate::footprint::bin_price;
use crate::gap::GapRecord;
use crate::rollup;
use crate::timeframe::Timeframe;
use crate::trade::Trade;
use tracing::{debug, warn};

/// Outcome of processing one trade through the state machine.
#[derive(Debug, Default)]
pub struct ProcessOutcome {
    /// Set when the trade was a no-op: duplicate, or metadata-only.
    pub discarded_reason: Option<DiscardReason>,
    /// Present when steps 1-2 detected a hole in the trade-id sequence.
    pub gap: Option<GapRecord>,
    /// The base 1s candle that just closed, if this trade rolled one over.
    pub completed_base: Option<Candle>,
    /// Rollup candles that closed as a result of this trade, in
    /// ascending timeframe order.
    pub completed_rollups: Vec<Candle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    Duplicate,
    MetadataOnly,
}

/// Processes one trade for the symbol owning `group`. Never panics on bad
/// input; malformed trades are rejected upstream during `Trade::parse`.
pub fn process_trade(group: &mut CandleGroup, trade: &Trade) -> ProcessOutcome {
    let mut outcome = ProcessOutcome::default();

    // Step 1: dedup / order guard. `None` means no trade has been
    // committed yet for this symbol, so every trade id (including 0) is
    // accepted on first sight.
    if let Some(last) = group.last_trade_id {
        if trade.trade_id <= last {
            debug!(trade_id = trade.trade_id, symbol = %trade.symbol, "duplicate trade discarded");
            outcome.discarded_reason = Some(DiscardReason::Duplicate);
            return outcome;
        }

        if trade.trade_id > last + 1 {
            let gap = GapRecord::new(
                &trade.symbol,
                &trade.exchange,
                last + 1,
                trade.trade_id - 1,
                trade.timestamp_ms,
            );
            warn!(
                symbol = %trade.symbol,
                from = gap.from_trade_id,
                to = gap.to_trade_id,
                "trade-id gap detected"
            );
            outcome.gap = Some(gap);
        }
    }

    // Step 2: skip filter — metadata-only trades only advance last_trade_id.
    if trade.is_metadata_only() {
        group.last_trade_id = Some(trade.trade_id);
        group.last_timestamp_ms = trade.timestamp_ms;
        group.mark_dirty();
        outcome.discarded_reason = Some(DiscardReason::MetadataOnly);
        return outcome;
    }

    // Step 3: base-candle update.
    let base_open_time = Timeframe::OneSecond.bucket_open(trade.timestamp_ms);
    let effective_bin = group.effective_bin_size();
    let tick = bin_price(trade.price, effective_bin);

    let needs_new_base = match group.candles.get(&Timeframe::OneSecond) {
        Some(existing) => existing.open_time != base_open_time,
        None => true,
    };

    if needs_new_base {
        if let Some(mut previous) = group.candles.remove(&Timeframe::OneSecond) {
            previous.close();
            outcome.completed_base = Some(previous);
        }
        let fresh = Candle::open_from_trade(
            &trade.exchange,
            &trade.symbol,
            Timeframe::OneSecond,
            base_open_time,
            trade.price,
            trade.trade_id,
        );
        group.candles.insert(Timeframe::OneSecond, fresh);
    }

    let base = group
        .candles
        .get_mut(&Timeframe::OneSecond)
        .expect("base candle just ensured present");
    base.merge_trade(
        trade.price,
        trade.quantity,
        trade.quote_volume(),
        trade.buyer_is_maker,
        trade.trade_id,
        tick,
    );

    // Step 4: rollup, only when this trade produced a completed base candle.
    if let Some(completed) = &outcome.completed_base {
        outcome.completed_rollups = rollup::roll_up(group, completed, trade.timestamp_ms);
    }

    // Step 5: commit.
    group.last_trade_id = Some(trade.trade_id);
    group.last_timestamp_ms = trade.timestamp_ms;
    group.mark_dirty();

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn trade(trade_id: u64, price: &str, qty: &str, ts: i64, maker: bool) -> Trade {
        Trade {
            exchange: "binance".into(),
            symbol: "BTCUSDT".into(),
            trade_id,
            price: d(price),
            quantity: d(qty),
            timestamp_ms: ts,
            buyer_is_maker: maker,
        }
    }

    fn fresh_group() -> CandleGroup {
        CandleGroup::new("binance", "BTCUSDT", Decimal::from_str("0.01").unwrap(), 1)
    }

    #[test]
    fn s1_basic_close() {
        let mut group = fresh_group();

        let o1 = process_trade(&mut group, &trade(1, "100.0", "1.0", 1000, false));
        assert!(o1.completed_base.is_none());

        let o2 = process_trade(&mut group, &trade(2, "100.5", "2.0", 2500, true));
        let closed = o2.completed_base.expect("first second should have closed");
        assert_eq!(closed.open, d("100.0"));
        assert_eq!(closed.high, d("100.0"));
        assert_eq!(closed.low, d("100.0"));
        assert_eq!(closed.close, d("100.0"));
        assert_eq!(closed.total_volume, d("1.0"));
        assert_eq!(closed.buy_volume, d("1.0"));
        assert_eq!(closed.sell_volume, d("0"));
        assert!(closed.closed);

        let live = group.candles.get(&Timeframe::OneSecond).unwrap();
        assert_eq!(live.open, d("100.5"));
        assert_eq!(live.total_volume, d("2.0"));
        assert_eq!(live.sell_volume, d("2.0"));
        assert!(!live.closed);

        assert_eq!(group.last_trade_id, Some(2));
        assert_eq!(o2.completed_rollups.len(), 0); // no 1m boundary crossed yet
    }

    #[test]
    fn s2_duplicate_is_a_no_op() {
        let mut group = fresh_group();
        process_trade(&mut group, &trade(1, "100.0", "1.0", 1000, false));
        process_trade(&mut group, &trade(2, "100.5", "2.0", 2500, true));
        let before = group.clone();

        let outcome = process_trade(&mut group, &trade(1, "100.0", "1.0", 1000, false));
        assert_eq!(outcome.discarded_reason, Some(DiscardReason::Duplicate));
        assert_eq!(group.last_trade_id, before.last_trade_id);
        assert_eq!(group.candles, before.candles);
    }

    #[test]
    fn s3_gap_is_recorded_and_live_path_continues() {
        let mut group = fresh_group();
        process_trade(&mut group, &trade(1, "100.0", "1.0", 1000, false));
        process_trade(&mut group, &trade(2, "100.5", "2.0", 2500, true));

        let outcome = process_trade(&mut group, &trade(5, "101.0", "1.0", 2700, false));
        let gap = outcome.gap.expect("gap should be recorded");
        assert_eq!(gap.from_trade_id, 3);
        assert_eq!(gap.to_trade_id, 4);
        assert_eq!(gap.gap_size, 2);

        assert_eq!(group.last_trade_id, Some(5));
        let live = group.candles.get(&Timeframe::OneSecond).unwrap();
        assert_eq!(live.total_volume, d("3.0")); // 2.0 (id=2) + 1.0 (id=5)
    }

    #[test]
    fn metadata_only_trade_advances_id_without_touching_candles() {
        let mut group = fresh_group();
        process_trade(&mut group, &trade(1, "100.0", "1.0", 1000, false));
        let before_candles = group.candles.clone();

        let outcome = process_trade(&mut group, &trade(2, "0", "0", 1500, false));
        assert_eq!(outcome.discarded_reason, Some(DiscardReason::MetadataOnly));
        assert_eq!(group.last_trade_id, Some(2));
        assert_eq!(group.candles, before_candles);
    }

    #[test]
    fn trade_id_zero_is_accepted_on_first_sight_and_its_replay_is_a_duplicate() {
        let mut group = fresh_group();

        let first = process_trade(&mut group, &trade(0, "100.0", "1.0", 1000, false));
        assert_eq!(first.discarded_reason, None);
        assert_eq!(group.last_trade_id, Some(0));

        let replay = process_trade(&mut group, &trade(0, "100.0", "1.0", 1000, false));
        assert_eq!(replay.discarded_reason, Some(DiscardReason::Duplicate));
        assert_eq!(group.last_trade_id, Some(0));
    }
}
