//! Footprint bin calculation: per-price-level buy/sell volume breakdown.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Warn-only soft cap on bin count per candle; never truncated.
pub const BIN_WARN_THRESHOLD: usize = 500;

const BASE_VOLUME_SCALE: u32 = 8;
const QUOTE_VOLUME_SCALE: u32 = 5;
const PRICE_SCALE: i64 = 10_000_000; // 10^7, per the binning spec

/// Aggregated buy/sell volume at one discretised price level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootprintBin {
    pub tick_price: Decimal,
    pub buy_volume: Decimal,
    pub sell_volume: Decimal,
    pub buy_quote_volume: Decimal,
    pub sell_quote_volume: Decimal,
}

impl FootprintBin {
    fn new(tick_price: Decimal) -> Self {
        FootprintBin {
            tick_price,
            buy_volume: Decimal::ZERO,
            sell_volume: Decimal::ZERO,
            buy_quote_volume: Decimal::ZERO,
            sell_quote_volume: Decimal::ZERO,
        }
    }
}

/// Computes the effective bin size `tick_value * bin_multiplier`.
pub fn effective_bin_size(tick_value: Decimal, bin_multiplier: u32) -> Decimal {
    tick_value * Decimal::from(bin_multiplier)
}

/// Maps a trade price to its bin's `tick_price`: `floor(p / e) * e`,
/// computed in integers scaled by 10^7 so a price sitting exactly on a
/// bin boundary lands in that bin rather than drifting into the one below
/// it due to floating-point rounding.
pub fn bin_price(price: Decimal, effective_bin: Decimal) -> Decimal {
    let scaled_price = (price * Decimal::from(PRICE_SCALE))
        .trunc()
        .to_i128()
        .unwrap_or(0);
    let scaled_bin = (effective_bin * Decimal::from(PRICE_SCALE))
        .trunc()
        .to_i128()
        .unwrap_or(1)
        .max(1);

    let floored = (scaled_price / scaled_bin) * scaled_bin;

    Decimal::from_i128_with_scale(floored, 7).normalize()
}

/// Picks a bin multiplier from `{1,2,2.5,4,5} x 10^n` that yields roughly
/// 40-200 bins across `price_range` for a given `tick_value`.
pub fn choose_bin_multiplier(tick_value: Decimal, price_range: Decimal) -> u32 {
    if tick_value.is_zero() || price_range.is_zero() {
        return 1;
    }

    let nice_steps: [f64; 5] = [1.0, 2.0, 2.5, 4.0, 5.0];
    let tick_f = tick_value.to_f64().unwrap_or(1.0);
    let range_f = price_range.to_f64().unwrap_or(1.0);

    let mut best_multiplier: u32 = 1;
    let mut best_distance = f64::MAX;

    for exp in 0..9i32 {
        let pow10 = 10f64.powi(exp);
        for step in nice_steps {
            let multiplier_f = step * pow10;
            let multiplier = multiplier_f.round().max(1.0) as u32;
            let bin_size = tick_f * multiplier as f64;
            if bin_size <= 0.0 {
                continue;
            }
            let bins = range_f / bin_size;
            let target = bins.clamp(40.0, 200.0);
            let distance = (bins - target).abs();
            if distance < best_distance {
                best_distance = distance;
                best_multiplier = multiplier;
            }
        }
    }

    best_multiplier
}

/// Ordered, uniquely-keyed set of footprint bins for one candle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BinSet(pub Vec<FootprintBin>);

impl BinSet {
    pub fn new() -> Self {
        BinSet(Vec::new())
    }

    /// Locates the bin for `tick_price`, inserting it at the sorted
    /// position if absent, and applies the trade's volumes to it.
    pub fn apply_trade(
        &mut self,
        tick_price: Decimal,
        quantity: Decimal,
        quote_volume: Decimal,
        buyer_is_maker: bool,
    ) {
        let idx = match self.0.iter().position(|b| b.tick_price == tick_price) {
            Some(i) => i,
            None => {
                let insert_at = self
                    .0
                    .iter()
                    .position(|b| b.tick_price > tick_price)
                    .unwrap_or(self.0.len());
                self.0.insert(insert_at, FootprintBin::new(tick_price));
                insert_at
            }
        };

        let bin = &mut self.0[idx];
        if !buyer_is_maker {
            bin.buy_volume = round_clamped(bin.buy_volume + quantity, BASE_VOLUME_SCALE);
            bin.buy_quote_volume =
                round_clamped(bin.buy_quote_volume + quote_volume, QUOTE_VOLUME_SCALE);
        } else {
            bin.sell_volume = round_clamped(bin.sell_volume + quantity, BASE_VOLUME_SCALE);
            bin.sell_quote_volume =
                round_clamped(bin.sell_quote_volume + quote_volume, QUOTE_VOLUME_SCALE);
        }
    }

    /// Merges `other`'s bins into `self` by `tick_price`, summing volumes
    /// and keeping the set sorted (used by the rollup engine).
    pub fn merge(&mut self, other: &BinSet) {
        for bin in &other.0 {
            let idx = match self.0.iter().position(|b| b.tick_price == bin.tick_price) {
                Some(i) => i,
                None => {
                    let insert_at = self
                        .0
                        .iter()
                        .position(|b| b.tick_price > bin.tick_price)
                        .unwrap_or(self.0.len());
                    self.0.insert(insert_at, FootprintBin::new(bin.tick_price));
                    insert_at
                }
            };
            let target = &mut self.0[idx];
            target.buy_volume =
                round_clamped(target.buy_volume + bin.buy_volume, BASE_VOLUME_SCALE);
            target.sell_volume =
                round_clamped(target.sell_volume + bin.sell_volume, BASE_VOLUME_SCALE);
            target.buy_quote_volume = round_clamped(
                target.buy_quote_volume + bin.buy_quote_volume,
                QUOTE_VOLUME_SCALE,
            );
            target.sell_quote_volume = round_clamped(
                target.sell_quote_volume + bin.sell_quote_volume,
                QUOTE_VOLUME_SCALE,
            );
        }
    }

    pub fn total_buy_volume(&self) -> Decimal {
        self.0.iter().map(|b| b.buy_volume).sum()
    }

    pub fn total_sell_volume(&self) -> Decimal {
        self.0.iter().map(|b| b.sell_volume).sum()
    }

    /// True if bins are strictly ascending by `tick_price` with no
    /// duplicate key, as required at the writer.
    pub fn is_sorted_unique(&self) -> bool {
        self.0.windows(2).all(|w| w[0].tick_price < w[1].tick_price)
    }
}

/// Rounds to `scale` decimal places, clamping a negative fractional drift
/// (a value that rounds to just below zero) up to zero.
fn round_clamped(value: Decimal, scale: u32) -> Decimal {
    let rounded = value.round_dp(scale);
    if rounded.is_sign_negative() {
        Decimal::ZERO
    } else {
        rounded
    }
}
