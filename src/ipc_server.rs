//! Persistence-side IPC: a Unix socket listener for the fast channel and
//! a periodic poller draining the durable queue, both routing envelopes
//! into the candle writer and the gap/state store (C12).

use crate::candle::Candle;
use crate::error::DispatchError;
use crate::gap::GapRecord;
use crate::gap_store::GapStore;
use crate::ipc::{Envelope, read_frame_async, write_frame_async};
use crate::queue::DurableQueue;
use crate::writer::CandleWriter;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio::time::{Duration, interval};
use tracing::{error, info, warn};

/// What dispatching one envelope produced. Only a `state`/`load` request
/// carries a reply; every other message type is fire-and-forget.
pub enum DispatchOutcome {
    None,
    Reply(Value),
}

/// Handles one decoded envelope, persisting whatever it names. Shared by
/// both the socket listener and the queue poller so delivery is
/// identical regardless of which transport carried the message.
pub fn dispatch_envelope(
    envelope: &Envelope,
    gap_store: &GapStore,
    writer: &CandleWriter,
) -> Result<DispatchOutcome, DispatchError> {
    match envelope.message_type.as_str() {
        "candle:complete" => {
            let candle: Candle = serde_json::from_value(envelope.payload.clone())?;
            writer.persist(&candle)?;
            Ok(DispatchOutcome::None)
        }
        "gap" => dispatch_gap(envelope, gap_store),
        "state" => dispatch_state(envelope, gap_store),
        other => {
            warn!(message_type = other, "unknown envelope type, dropping");
            Ok(DispatchOutcome::None)
        }
    }
}

fn dispatch_gap(envelope: &Envelope, gap_store: &GapStore) -> Result<DispatchOutcome, DispatchError> {
    let action = envelope.payload.get("action").and_then(Value::as_str).unwrap_or("");
    match action {
        "gap_save" => {
            if let Some(record) = envelope.payload.get("record") {
                let gap: GapRecord = serde_json::from_value(record.clone())?;
                gap_store.save_gap(&gap)?;
            }
            Ok(DispatchOutcome::None)
        }
        "gap_mark_synced" => {
            let exchange = envelope.payload.get("exchange").and_then(Value::as_str);
            let symbol = envelope.payload.get("symbol").and_then(Value::as_str);
            let from_trade_id = envelope.payload.get("from_trade_id").and_then(Value::as_u64);
            if let (Some(exchange), Some(symbol), Some(from_trade_id)) = (exchange, symbol, from_trade_id) {
                gap_store.mark_gap_synced(exchange, symbol, from_trade_id)?;
            }
            Ok(DispatchOutcome::None)
        }
        other => {
            warn!(action = other, "unhandled gap action, dropping");
            Ok(DispatchOutcome::None)
        }
    }
}

fn dispatch_state(envelope: &Envelope, gap_store: &GapStore) -> Result<DispatchOutcome, DispatchError> {
    let action = envelope.payload.get("action").and_then(Value::as_str).unwrap_or("");
    match action {
        "save" => {
            let exchange = envelope.payload.get("exchange").and_then(Value::as_str);
            let symbol = envelope.payload.get("symbol").and_then(Value::as_str);
            if let (Some(_), Some(_), Some(snapshot)) = (exchange, symbol, envelope.payload.get("snapshot")) {
                let group = serde_json::from_value(snapshot.clone())?;
                gap_store.save_snapshot(&group, envelope.timestamp)?;
            }
            Ok(DispatchOutcome::None)
        }
        "load" => {
            let exchange = envelope.payload.get("exchange").and_then(Value::as_str).unwrap_or("");
            let symbol = envelope.payload.get("symbol").and_then(Value::as_str).unwrap_or("");
            let snapshot = gap_store.load_snapshot(exchange, symbol)?;
            let snapshot_value = match snapshot {
                Some(group) => serde_json::to_value(group)?,
                None => Value::Null,
            };
            Ok(DispatchOutcome::Reply(json!({
                "action": "load_result",
                "snapshot": snapshot_value,
            })))
        }
        other => {
            warn!(action = other, "unhandled state action, dropping");
            Ok(DispatchOutcome::None)
        }
    }
}

/// Accepts fast-channel connections and dispatches every frame received
/// on each. Runs for the lifetime of the persistence process.
pub async fn run_socket_listener(
    socket_path: &str,
    gap_store: Arc<GapStore>,
    writer: Arc<CandleWriter>,
) -> std::io::Result<()> {
    if Path::new(socket_path).exists() {
        let _ = std::fs::remove_file(socket_path);
    }
    if let Some(parent) = Path::new(socket_path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let listener = UnixListener::bind(socket_path)?;
    info!(socket = socket_path, "fast channel listener bound");

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let gap_store = Arc::clone(&gap_store);
                let writer = Arc::clone(&writer);
                tokio::spawn(async move {
                    handle_connection(stream, gap_store, writer).await;
                });
            }
            Err(e) => {
                error!(error = %e, "fast channel accept failed");
            }
        }
    }
}

/// One connection may carry the publisher's long-lived fire-and-forget
/// stream, or a worker's short-lived `state`/`load` request — either way,
/// a reply is written back only when dispatching produced one.
async fn handle_connection(mut stream: UnixStream, gap_store: Arc<GapStore>, writer: Arc<CandleWriter>) {
    loop {
        let body = match read_frame_async(&mut stream).await {
            Ok(b) => b,
            Err(_) => break, // peer closed or I/O error; drop this connection
        };

        match Envelope::decode(&body) {
            Ok(envelope) => match dispatch_envelope(&envelope, &gap_store, &writer) {
                Ok(DispatchOutcome::None) => {}
                Ok(DispatchOutcome::Reply(payload)) => {
                    let reply = Envelope::new("state", payload, envelope.timestamp);
                    match serde_json::to_vec(&reply) {
                        Ok(reply_body) => {
                            if let Err(e) = write_frame_async(&mut stream, &reply_body).await {
                                warn!(error = %e, "failed to write reply frame, dropping connection");
                                break;
                            }
                        }
                        Err(e) => error!(error = %e, "failed to encode reply envelope"),
                    }
                }
                Err(e) => error!(error = %e, "failed to dispatch envelope from fast channel"),
            },
            Err(e) => warn!(error = %e, "failed to decode frame from fast channel"),
        }
    }
}

/// Periodically drains the durable queue and runs an occasional cleanup
/// sweep (~1% of polls), matching the "fallback catches up, then gets
/// swept" lifecycle of a queued envelope. Queued messages are always
/// fire-and-forget (`candle:complete`, `gap`, `state`/`save`); a
/// `state`/`load` request never goes through the durable queue, since it
/// needs a reply the poller has no connection to deliver.
pub async fn run_queue_poller(
    queue: Arc<DurableQueue>,
    gap_store: Arc<GapStore>,
    writer: Arc<CandleWriter>,
    poll_interval_ms: u64,
    retention_hours: u64,
    now_ms: impl Fn() -> i64 + Send + 'static,
) {
    let mut ticker = interval(Duration::from_millis(poll_interval_ms));
    let mut poll_count: u64 = 0;

    loop {
        ticker.tick().await;
        poll_count += 1;

        match queue.dequeue(100) {
            Ok(rows) => {
                for (row_id, envelope) in rows {
                    match dispatch_envelope(&envelope, &gap_store, &writer) {
                        Ok(_) => {}
                        Err(e) => {
                            error!(error = %e, "failed to dispatch envelope from durable queue");
                            continue;
                        }
                    }
                    if let Err(e) = queue.mark_processed(row_id) {
                        error!(error = %e, "failed to mark durable row processed");
                    }
                }
            }
            Err(e) => error!(error = %e, "durable queue dequeue failed"),
        }

        if poll_count % 100 == 0 {
            if let Err(e) = queue.cleanup(retention_hours, now_ms()) {
                error!(error = %e, "durable queue cleanup failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeframe::Timeframe;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use tempfile::NamedTempFile;

    fn stores() -> (NamedTempFile, NamedTempFile, GapStore, CandleWriter) {
        let gap_file = NamedTempFile::new().unwrap();
        let candle_file = NamedTempFile::new().unwrap();
        let gap_store = GapStore::open(gap_file.path().to_str().unwrap()).unwrap();
        let writer = CandleWriter::open(candle_file.path().to_str().unwrap()).unwrap();
        (gap_file, candle_file, gap_store, writer)
    }

    fn closed_minute_candle() -> Candle {
        let d = |s: &str| Decimal::from_str(s).unwrap();
        let mut c = Candle::open_from_trade("binance", "BTCUSDT", Timeframe::OneMinute, 0, d("100"), 1);
        c.merge_trade(d("101"), d("1"), d("101"), false, 2, d("101"));
        c.close();
        c
    }

    #[test]
    fn dispatch_candle_complete_persists_the_candle() {
        let (_gf, _cf, gap_store, writer) = stores();
        let candle = closed_minute_candle();
        let payload = serde_json::to_value(&candle).unwrap();
        let envelope = Envelope::new("candle:complete", payload, 1_000);

        dispatch_envelope(&envelope, &gap_store, &writer).unwrap();

        assert_eq!(writer.count("binance", "BTCUSDT", Timeframe::OneMinute).unwrap(), 1);
    }

    #[test]
    fn dispatch_gap_save_persists_the_gap() {
        let (_gf, _cf, gap_store, writer) = stores();

        let gap = GapRecord::new("BTCUSDT", "binance", 5, 9, 1_000);
        let payload = json!({"action": "gap_save", "record": serde_json::to_value(&gap).unwrap()});
        let envelope = Envelope::new("gap", payload, 1_000);

        dispatch_envelope(&envelope, &gap_store, &writer).unwrap();

        let pending = gap_store.unsynced_gaps("binance", "BTCUSDT").unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].from_trade_id, 5);
    }

    #[test]
    fn dispatch_state_save_then_load_round_trips_a_snapshot() {
        let (_gf, _cf, gap_store, writer) = stores();

        let mut group = crate::candle_group::CandleGroup::new(
            "binance",
            "BTCUSDT",
            Decimal::from_str("0.1").unwrap(),
            10,
        );
        group.last_trade_id = Some(42);

        let save_payload = json!({
            "action": "save",
            "exchange": "binance",
            "symbol": "BTCUSDT",
            "snapshot": serde_json::to_value(&group).unwrap(),
        });
        let save_envelope = Envelope::new("state", save_payload, 1_000);
        dispatch_envelope(&save_envelope, &gap_store, &writer).unwrap();

        let load_payload = json!({"action": "load", "exchange": "binance", "symbol": "BTCUSDT"});
        let load_envelope = Envelope::new("state", load_payload, 2_000);
        let outcome = dispatch_envelope(&load_envelope, &gap_store, &writer).unwrap();

        match outcome {
            DispatchOutcome::Reply(payload) => {
                let snapshot = payload.get("snapshot").unwrap();
                assert_eq!(snapshot["last_trade_id"], 42);
            }
            DispatchOutcome::None => panic!("state/load must reply"),
        }
    }

    #[test]
    fn dispatch_unknown_type_is_a_no_op() {
        let (_gf, _cf, gap_store, writer) = stores();
        let envelope = Envelope::new("mystery", json!({}), 1_000);
        dispatch_envelope(&envelope, &gap_store, &writer).unwrap();
    }
}
