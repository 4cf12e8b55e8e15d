//! Fixed table of supported timeframes and their rollup parents.

use serde::{Deserialize, Serialize};

/// One of the twelve supported candle timeframes. `OneSecond` is the base
/// timeframe that the trade state machine updates directly; every other
/// variant is a rollup timeframe fed by completed base candles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    OneSecond,
    OneMinute,
    ThreeMinutes,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    TwoHours,
    FourHours,
    EightHours,
    TwelveHours,
    OneDay,
}

impl Timeframe {
    /// All timeframes other than the base, in ascending duration order.
    pub const ROLLUPS: [Timeframe; 11] = [
        Timeframe::OneMinute,
        Timeframe::ThreeMinutes,
        Timeframe::FiveMinutes,
        Timeframe::FifteenMinutes,
        Timeframe::ThirtyMinutes,
        Timeframe::OneHour,
        Timeframe::TwoHours,
        Timeframe::FourHours,
        Timeframe::EightHours,
        Timeframe::TwelveHours,
        Timeframe::OneDay,
    ];

    /// Every timeframe including the base, ascending.
    pub const ALL: [Timeframe; 12] = [
        Timeframe::OneSecond,
        Timeframe::OneMinute,
        Timeframe::ThreeMinutes,
        Timeframe::FiveMinutes,
        Timeframe::FifteenMinutes,
        Timeframe::ThirtyMinutes,
        Timeframe::OneHour,
        Timeframe::TwoHours,
        Timeframe::FourHours,
        Timeframe::EightHours,
        Timeframe::TwelveHours,
        Timeframe::OneDay,
    ];

    /// Duration of one bucket, in milliseconds.
    pub const fn duration_ms(self) -> i64 {
        match self {
            Timeframe::OneSecond => 1_000,
            Timeframe::OneMinute => 60_000,
            Timeframe::ThreeMinutes => 180_000,
            Timeframe::FiveMinutes => 300_000,
            Timeframe::FifteenMinutes => 900_000,
            Timeframe::ThirtyMinutes => 1_800_000,
            Timeframe::OneHour => 3_600_000,
            Timeframe::TwoHours => 7_200_000,
            Timeframe::FourHours => 14_400_000,
            Timeframe::EightHours => 28_800_000,
            Timeframe::TwelveHours => 43_200_000,
            Timeframe::OneDay => 86_400_000,
        }
    }

    /// True for the base (1s) timeframe the state machine updates per trade.
    pub const fn is_base(self) -> bool {
        matches!(self, Timeframe::OneSecond)
    }

    /// Symbolic name as used on the wire and in snapshot keys.
    pub const fn as_str(self) -> &'static str {
        match self {
            Timeframe::OneSecond => "1s",
            Timeframe::OneMinute => "1m",
            Timeframe::ThreeMinutes => "3m",
            Timeframe::FiveMinutes => "5m",
            Timeframe::FifteenMinutes => "15m",
            Timeframe::ThirtyMinutes => "30m",
            Timeframe::OneHour => "1h",
            Timeframe::TwoHours => "2h",
            Timeframe::FourHours => "4h",
            Timeframe::EightHours => "8h",
            Timeframe::TwelveHours => "12h",
            Timeframe::OneDay => "1d",
        }
    }

    pub fn from_str(name: &str) -> Option<Timeframe> {
        Some(match name {
            "1s" => Timeframe::OneSecond,
            "1m" => Timeframe::OneMinute,
            "3m" => Timeframe::ThreeMinutes,
            "5m" => Timeframe::FiveMinutes,
            "15m" => Timeframe::FifteenMinutes,
            "30m" => Timeframe::ThirtyMinutes,
            "1h" => Timeframe::OneHour,
            "2h" => Timeframe::TwoHours,
            "4h" => Timeframe::FourHours,
            "8h" => Timeframe::EightHours,
            "12h" => Timeframe::TwelveHours,
            "1d" => Timeframe::OneDay,
            _ => return None,
        })
    }

    /// Aligns a millisecond timestamp down to this timeframe's bucket open.
    pub const fn bucket_open(self, timestamp_ms: i64) -> i64 {
        let d = self.duration_ms();
        (timestamp_ms.div_euclid(d)) * d
    }

    /// Last millisecond inside the bucket starting at `open_time`.
    pub const fn close_time(self, open_time: i64) -> i64 {
        open_time + self.duration_ms() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_open_aligns_down() {
        assert_eq!(Timeframe::OneMinute.bucket_open(61_234), 60_000);
        assert_eq!(Timeframe::OneSecond.bucket_open(2_700), 2_000);
    }

    #[test]
    fn close_time_is_one_ms_before_next_open() {
        let open = Timeframe::OneHour.bucket_open(5_000_000);
        let close = Timeframe::OneHour.close_time(open);
        assert_eq!(close + 1, open + Timeframe::OneHour.duration_ms());
    }

    #[test]
    fn round_trip_names() {
        for tf in Timeframe::ALL {
            assert_eq!(Timeframe::from_str(tf.as_str()), Some(tf));
        }
    }
}
