//! Wire trade DTO and its single parse boundary into the domain `Trade`.

use crate::error::TradeError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Exact wire shape delivered by the exchange adapter to the main thread,
/// per the external trade-input contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTrade {
    pub exchange: String,
    pub symbol: String,
    pub trade_id: u64,
    pub price: String,
    pub quantity: String,
    pub timestamp_ms: u64,
    pub buyer_is_maker: bool,
    #[serde(default)]
    pub trade_type: Option<String>,
}

/// Domain trade: immutable, decimal-accurate, ready to fold into a candle.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub exchange: String,
    pub symbol: String,
    pub trade_id: u64,
    pub price: Decimal,
    pub quantity: Decimal,
    pub timestamp_ms: i64,
    pub buyer_is_maker: bool,
}

impl Trade {
    /// Parses a wire trade, the single point where string-decimals become
    /// fixed-point `Decimal` values. Rejects NaN/negative numerics; a
    /// zero-price, zero-quantity trade is valid metadata (used only to
    /// advance `trade_id`).
    pub fn parse(raw: &RawTrade) -> Result<Trade, TradeError> {
        let price = Decimal::from_str(raw.price.trim())
            .map_err(|_| TradeError::MalformedNumeric(raw.price.clone()))?;
        let quantity = Decimal::from_str(raw.quantity.trim())
            .map_err(|_| TradeError::MalformedNumeric(raw.quantity.clone()))?;

        if price.is_sign_negative() || quantity.is_sign_negative() {
            return Err(TradeError::Negative {
                trade_id: raw.trade_id,
            });
        }

        Ok(Trade {
            exchange: raw.exchange.clone(),
            symbol: raw.symbol.clone(),
            trade_id: raw.trade_id,
            price,
            quantity,
            timestamp_ms: raw.timestamp_ms as i64,
            buyer_is_maker: raw.buyer_is_maker,
        })
    }

    /// True for the zero-quantity, zero-price metadata trades that only
    /// advance `last_trade_id` without touching candle state.
    pub fn is_metadata_only(&self) -> bool {
        self.price.is_zero() && self.quantity.is_zero()
    }

    /// Quote volume for this trade (`price * quantity`).
    pub fn quote_volume(&self) -> Decimal {
        self.price * self.quantity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(price: &str, qty: &str, maker: bool) -> RawTrade {
        RawTrade {
            exchange: "binance".into(),
            symbol: "BTCUSDT".into(),
            trade_id: 1,
            price: price.into(),
            quantity: qty.into(),
            timestamp_ms: 1_000,
            buyer_is_maker: maker,
            trade_type: None,
        }
    }

    #[test]
    fn parses_valid_decimals() {
        let t = Trade::parse(&raw("100.5", "2.25", false)).unwrap();
        assert_eq!(t.price, Decimal::from_str("100.5").unwrap());
        assert_eq!(t.quantity, Decimal::from_str("2.25").unwrap());
    }

    #[test]
    fn rejects_malformed_numeric() {
        let err = Trade::parse(&raw("not-a-number", "1", false)).unwrap_err();
        assert!(matches!(err, TradeError::MalformedNumeric(_)));
    }

    #[test]
    fn rejects_negative_quantity() {
        let err = Trade::parse(&raw("1", "-1", false)).unwrap_err();
        assert!(matches!(err, TradeError::Negative { .. }));
    }

    #[test]
    fn zero_price_and_quantity_is_metadata_only() {
        let t = Trade::parse(&raw("0", "0", false)).unwrap();
        assert!(t.is_metadata_only());
    }
}
