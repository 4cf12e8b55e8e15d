//! The only seam to a live exchange: a `TradeFeed` port plus a Binance
//! WebSocket implementation, adapted from the teacher's kline reconnect
//! loop and retargeted at the raw-trade stream (C-exchange / §4.9a).

use crate::error::FeedError;
use crate::trade::RawTrade;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{Duration, sleep};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Subscribes to a live trade stream for one symbol and forwards each
/// trade to `sink`. Implementations own their own reconnect policy; the
/// only contract is that `run` does not return while the feed should
/// keep delivering trades.
#[async_trait]
pub trait TradeFeed: Send {
    async fn run(self, sink: UnboundedSender<RawTrade>) -> Result<(), FeedError>;
}

#[derive(Debug, Deserialize)]
struct BinanceTradeEvent {
    #[serde(rename = "e")]
    #[allow(dead_code)]
    event_type: String,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "t")]
    trade_id: u64,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    quantity: String,
    #[serde(rename = "T")]
    timestamp_ms: u64,
    #[serde(rename = "m")]
    buyer_is_maker: bool,
}

/// Subscribes to Binance's raw trade stream (`<symbol>@trade`) for one
/// symbol, reconnecting on every disconnect.
pub struct BinanceTradeFeed {
    pub symbol: String,
}

impl BinanceTradeFeed {
    pub fn new(symbol: &str) -> Self {
        BinanceTradeFeed {
            symbol: symbol.to_string(),
        }
    }
}

#[async_trait]
impl TradeFeed for BinanceTradeFeed {
    async fn run(self, sink: UnboundedSender<RawTrade>) -> Result<(), FeedError> {
        let stream_name = format!("{}@trade", self.symbol.to_lowercase());
        let url = format!("wss://stream.binance.com:9443/ws/{stream_name}");

        loop {
            info!(symbol = %self.symbol, %url, "connecting to trade stream");
            match connect_async(&url).await {
                Ok((ws_stream, _)) => {
                    info!(symbol = %self.symbol, "trade stream connected");
                    let (_write, mut read) = ws_stream.split();

                    while let Some(msg) = read.next().await {
                        match msg {
                            Ok(Message::Text(text)) => {
                                if let Err(e) = forward_trade(&text, &sink) {
                                    warn!(symbol = %self.symbol, error = %e, "failed to decode trade event");
                                }
                            }
                            Ok(Message::Close(_)) => break,
                            Ok(_) => {}
                            Err(e) => {
                                warn!(symbol = %self.symbol, error = %e, "websocket read error");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(symbol = %self.symbol, error = %e, "trade stream connect failed");
                }
            }

            if sink.is_closed() {
                return Err(FeedError::Closed);
            }
            sleep(RECONNECT_DELAY).await;
        }
    }
}

fn forward_trade(text: &str, sink: &UnboundedSender<RawTrade>) -> Result<(), FeedError> {
    let event: BinanceTradeEvent = serde_json::from_str(text)?;
    let raw = RawTrade {
        exchange: "binance".to_string(),
        symbol: event.symbol,
        trade_id: event.trade_id,
        price: event.price,
        quantity: event.quantity,
        timestamp_ms: event.timestamp_ms,
        buyer_is_maker: event.buyer_is_maker,
        trade_type: None,
    };
    let _ = sink.send(raw);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_binance_trade_event_into_raw_trade() {
        let text = r#"{"e":"trade","s":"BTCUSDT","t":12345,"p":"100.50","q":"0.01","T":1700000000000,"m":false}"#;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        forward_trade(text, &tx).unwrap();

        let raw = rx.try_recv().unwrap();
        assert_eq!(raw.symbol, "BTCUSDT");
        assert_eq!(raw.trade_id, 12345);
        assert_eq!(raw.price, "100.50");
        assert!(!raw.buyer_is_maker);
    }
}
