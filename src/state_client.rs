//! Synchronous request/response client the worker runtime uses to pull a
//! candle group snapshot from the persistence process's store on symbol
//! assignment (C8 <-> C14, the `state`/`load` envelope in the wire
//! contract). Kept separate from [`crate::publisher::HybridPublisher`]:
//! a snapshot load needs a reply, while the publisher's contract is
//! fire-and-forget with a durable fallback.

use crate::candle_group::CandleGroup;
use crate::error::StateClientError;
use crate::ipc::{Envelope, blocking as framing};
use serde_json::json;
use std::os::unix::net::UnixStream;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_millis(500);

/// One dedicated connection per request; never shared with the worker's
/// long-lived `HybridPublisher` stream.
pub struct StateClient {
    socket_path: String,
}

impl StateClient {
    pub fn new(socket_path: &str) -> Self {
        StateClient {
            socket_path: socket_path.to_string(),
        }
    }

    /// Requests the snapshot for one symbol. Any failure (persistence
    /// unreachable, timeout, decode error) is treated as "no snapshot" so
    /// the worker falls back to starting the symbol fresh rather than
    /// blocking assignment on the persistence process being up.
    pub fn load_snapshot(&self, exchange: &str, symbol: &str, now_ms: i64) -> Option<CandleGroup> {
        match self.try_load_snapshot(exchange, symbol, now_ms) {
            Ok(group) => group,
            Err(e) => {
                debug!(error = %e, exchange, symbol, "snapshot load request failed, starting fresh");
                None
            }
        }
    }

    fn try_load_snapshot(
        &self,
        exchange: &str,
        symbol: &str,
        now_ms: i64,
    ) -> Result<Option<CandleGroup>, StateClientError> {
        let mut stream = UnixStream::connect(&self.socket_path)?;
        stream.set_read_timeout(Some(REQUEST_TIMEOUT))?;
        stream.set_write_timeout(Some(REQUEST_TIMEOUT))?;

        let request = Envelope::new(
            "state",
            json!({"action": "load", "exchange": exchange, "symbol": symbol}),
            now_ms,
        );
        let body = serde_json::to_vec(&request)?;
        framing::write_frame(&mut stream, &body)?;

        let response_body = framing::read_frame(&mut stream)?;
        let response = Envelope::decode(&response_body)?;
        let snapshot = response
            .payload
            .get("snapshot")
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        if snapshot.is_null() {
            Ok(None)
        } else {
            Ok(Some(serde_json::from_value(snapshot)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::os::unix::net::UnixListener;
    use std::str::FromStr;
    use std::thread;

    #[test]
    fn load_snapshot_returns_none_when_persistence_is_unreachable() {
        let tmp = tempfile::tempdir().unwrap();
        let socket_path = tmp.path().join("nonexistent.sock");
        let client = StateClient::new(socket_path.to_str().unwrap());
        assert!(client.load_snapshot("binance", "BTCUSDT", 1_000).is_none());
    }

    #[test]
    fn load_snapshot_round_trips_through_a_fake_persistence_listener() {
        let tmp = tempfile::tempdir().unwrap();
        let socket_path = tmp.path().join("fast.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let body = framing::read_frame(&mut stream).unwrap();
            let _request = Envelope::decode(&body).unwrap();

            let mut group = CandleGroup::new("binance", "BTCUSDT", Decimal::from_str("0.1").unwrap(), 10);
            group.last_trade_id = Some(42);
            let response = Envelope::new(
                "state",
                json!({"action": "load_result", "snapshot": serde_json::to_value(&group).unwrap()}),
                1_000,
            );
            let resp_body = serde_json::to_vec(&response).unwrap();
            framing::write_frame(&mut stream, &resp_body).unwrap();
        });

        let client = StateClient::new(socket_path.to_str().unwrap());
        let restored = client.load_snapshot("binance", "BTCUSDT", 1_000).unwrap();
        assert_eq!(restored.last_trade_id, Some(42));

        server.join().unwrap();
    }
}
