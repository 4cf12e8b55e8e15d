//! Merges a completed 1s candle into every higher timeframe, emitting a
//! candle whenever a bucket boundary is crossed (C7).

use crate::candle::Candle;
use crate::candle_group::CandleGroup;
use crate::timeframe::Timeframe;

/// Invoked once per completed base (1s) candle. Returns the rollup
/// candles that closed as a side effect of folding `base` in — at most
/// one per timeframe, per the bucket-close invariant.
pub fn roll_up(group: &mut CandleGroup, base: &Candle, reference_time_ms: i64) -> Vec<Candle> {
    let mut emitted = Vec::new();

    for tf in Timeframe::ROLLUPS {
        let bucket_open = tf.bucket_open(base.open_time);
        let check_bucket = tf.bucket_open(reference_time_ms);

        let needs_new_bucket = match group.candles.get(&tf) {
            Some(existing) => bucket_open > existing.open_time,
            None => true,
        };

        if needs_new_bucket {
            let mut fresh = Candle::open_from_trade(
                &base.exchange,
                &base.symbol,
                tf,
                bucket_open,
                base.open,
                base.first_trade_id,
            );
            copy_into_new_bucket(&mut fresh, base);
            group.candles.insert(tf, fresh);
        } else {
            let existing = group.candles.get_mut(&tf).expect("checked above");
            merge_base_into_rollup(existing, base);
        }

        let current = group.candles.get_mut(&tf).expect("just inserted or merged");
        if check_bucket != bucket_open {
            current.close();
            emitted.push(current.clone());
        }
    }

    emitted
}

/// Seeds a brand-new rollup bucket from the first base candle that falls
/// into it: o/h/l/c, volumes, and bins are copied wholesale.
fn copy_into_new_bucket(fresh: &mut Candle, base: &Candle) {
    fresh.high = base.high;
    fresh.low = base.low;
    fresh.close = base.close;
    fresh.total_volume = base.total_volume;
    fresh.buy_volume = base.buy_volume;
    fresh.sell_volume = base.sell_volume;
    fresh.total_quote_volume = base.total_quote_volume;
    fresh.buy_quote_volume = base.buy_quote_volume;
    fresh.sell_quote_volume = base.sell_quote_volume;
    fresh.trade_count = base.trade_count;
    fresh.delta = base.buy_volume - base.sell_volume;
    fresh.delta_max = fresh.delta;
    fresh.delta_min = fresh.delta;
    fresh.first_trade_id = base.first_trade_id;
    fresh.last_trade_id = base.last_trade_id;
    fresh.bins = base.bins.clone();
}

/// Folds a completed base candle into an in-progress rollup bucket.
/// Delta is recomputed from buy/sell totals rather than accumulated, to
/// avoid drift across many merges.
fn merge_base_into_rollup(rollup: &mut Candle, base: &Candle) {
    rollup.high = rollup.high.max(base.high);
    rollup.low = rollup.low.min(base.low);
    rollup.close = base.close;

    rollup.total_volume += base.total_volume;
    rollup.buy_volume += base.buy_volume;
    rollup.sell_volume += base.sell_volume;
    rollup.total_quote_volume += base.total_quote_volume;
    rollup.buy_quote_volume += base.buy_quote_volume;
    rollup.sell_quote_volume += base.sell_quote_volume;
    rollup.trade_count += base.trade_count;
    rollup.last_trade_id = base.last_trade_id;

    rollup.delta = rollup.buy_volume - rollup.sell_volume;
    if rollup.delta > rollup.delta_max {
        rollup.delta_max = rollup.delta;
    }
    if rollup.delta < rollup.delta_min {
        rollup.delta_min = rollup.delta;
    }

    rollup.bins.merge(&base.bins);
}
