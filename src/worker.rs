//! Worker runtime: one OS thread per worker, owning a disjoint set of
//! symbols with no locking over their state (C8).

use crate::candle_group::CandleGroup;
use crate::ipc::Envelope;
use crate::publisher::HybridPublisher;
use crate::state_client::StateClient;
use crate::state_machine::process_trade;
use crate::trade::Trade;
use crossbeam_channel::{Receiver, Sender, unbounded};
use serde_json::json;
use std::collections::HashMap;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

/// Messages a worker accepts on its inbox.
pub enum WorkerMessage {
    /// A batch of trades for one symbol, dispatched by the router.
    ProcessTrades { symbol: String, trades: Vec<Trade> },
    /// The router has assigned this symbol to this worker; restores any
    /// existing snapshot before accepting trades for it.
    AssignSymbol { exchange: String, symbol: String, tick_value: rust_decimal::Decimal, bin_multiplier: u32 },
    /// The router has moved this symbol elsewhere; flush and drop it.
    UnassignSymbol { symbol: String },
    /// Periodic tick driving the dirty-snapshot flush.
    Heartbeat { now_ms: i64 },
    Shutdown,
}

/// Handle the router/main thread holds to talk to a running worker.
pub struct WorkerHandle {
    pub worker_id: u32,
    sender: Sender<WorkerMessage>,
    join_handle: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn send(&self, msg: WorkerMessage) {
        if self.sender.send(msg).is_err() {
            warn!(worker_id = self.worker_id, "worker inbox closed, message dropped");
        }
    }

    /// True once the worker thread has exited, whether cleanly or from a
    /// panic. The router polls this on its heartbeat tick to detect a
    /// crashed worker and respawn it.
    pub fn is_dead(&self) -> bool {
        match &self.join_handle {
            Some(handle) => handle.is_finished(),
            None => true,
        }
    }

    pub fn shutdown(mut self) {
        self.send(WorkerMessage::Shutdown);
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

/// Spawns a worker thread and returns a handle to it.
pub fn spawn_worker(
    worker_id: u32,
    socket_path: String,
    durable_queue_path: String,
    snapshot_interval_secs: u64,
) -> WorkerHandle {
    let (tx, rx) = unbounded();

    let join_handle = thread::Builder::new()
        .name(format!("flowtrace-worker-{worker_id}"))
        .spawn(move || {
            run_worker(worker_id, rx, socket_path, durable_queue_path, snapshot_interval_secs);
        })
        .expect("failed to spawn worker thread");

    WorkerHandle {
        worker_id,
        sender: tx,
        join_handle: Some(join_handle),
    }
}

/// Publishes a candle group snapshot as a `state`/`save` envelope. The
/// persistence process owns the only durable copy of a snapshot; workers
/// never touch the gap/state store directly.
fn publish_snapshot(publisher: &mut HybridPublisher, group: &CandleGroup, now_ms: i64) {
    let payload = json!({
        "action": "save",
        "exchange": group.exchange,
        "symbol": group.symbol,
        "snapshot": serde_json::to_value(group).unwrap_or(serde_json::Value::Null),
    });
    let envelope = Envelope::new("state", payload, now_ms);
    publisher.publish(&envelope, now_ms);
}

fn run_worker(
    worker_id: u32,
    rx: Receiver<WorkerMessage>,
    socket_path: String,
    durable_queue_path: String,
    snapshot_interval_secs: u64,
) {
    let mut publisher = match HybridPublisher::new(&socket_path, &durable_queue_path) {
        Ok(p) => p,
        Err(e) => {
            warn!(worker_id, error = %e, "worker failed to open publisher, exiting");
            return;
        }
    };
    let state_client = StateClient::new(&socket_path);

    let mut groups: HashMap<String, CandleGroup> = HashMap::new();
    let mut last_snapshot_ms: i64 = 0;

    info!(worker_id, "worker started");

    while let Ok(msg) = rx.recv() {
        match msg {
            WorkerMessage::AssignSymbol {
                exchange,
                symbol,
                tick_value,
                bin_multiplier,
            } => {
                let restored = state_client.load_snapshot(&exchange, &symbol, last_snapshot_ms);
                let mut group = restored.unwrap_or_else(|| {
                    CandleGroup::new(&exchange, &symbol, tick_value, bin_multiplier)
                });
                group.mark_clean();
                info!(worker_id, %symbol, "symbol assigned");
                groups.insert(symbol, group);
            }
            WorkerMessage::UnassignSymbol { symbol } => {
                if let Some(group) = groups.remove(&symbol) {
                    publish_snapshot(&mut publisher, &group, last_snapshot_ms);
                    info!(worker_id, %symbol, "symbol unassigned, snapshot flushed");
                }
            }
            WorkerMessage::ProcessTrades { symbol, trades } => {
                let Some(group) = groups.get_mut(&symbol) else {
                    warn!(worker_id, %symbol, "trades for unassigned symbol, dropping batch");
                    continue;
                };

                for trade in &trades {
                    let outcome = process_trade(group, trade);

                    if let Some(gap) = &outcome.gap {
                        let payload = json!({
                            "action": "gap_save",
                            "record": serde_json::to_value(gap).unwrap_or(serde_json::Value::Null),
                        });
                        let envelope = Envelope::new("gap", payload, trade.timestamp_ms);
                        publisher.publish(&envelope, trade.timestamp_ms);
                    }

                    for candle in &outcome.completed_rollups {
                        let payload = serde_json::to_value(candle).unwrap_or(serde_json::Value::Null);
                        let envelope = Envelope::new("candle:complete", payload, trade.timestamp_ms);
                        publisher.publish(&envelope, trade.timestamp_ms);
                    }
                }
            }
            WorkerMessage::Heartbeat { now_ms } => {
                if now_ms - last_snapshot_ms >= (snapshot_interval_secs as i64) * 1_000 {
                    for group in groups.values_mut() {
                        if group.dirty {
                            publish_snapshot(&mut publisher, group, now_ms);
                            group.mark_clean();
                        }
                    }
                    last_snapshot_ms = now_ms;
                }
            }
            WorkerMessage::Shutdown => {
                for group in groups.values() {
                    publish_snapshot(&mut publisher, group, last_snapshot_ms);
                }
                info!(worker_id, "worker shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::DurableQueue;
    use std::time::Duration;

    #[test]
    fn worker_processes_trades_and_shuts_down_cleanly() {
        let tmp = tempfile::tempdir().unwrap();
        let socket_path = tmp.path().join("fast.sock").to_str().unwrap().to_string();
        let queue_path = tmp.path().join("queue.db").to_str().unwrap().to_string();

        // No persistence process listens on `socket_path` in this test, so
        // every publish (snapshot saves included) falls back to the
        // durable queue.
        let handle = spawn_worker(1, socket_path, queue_path.clone(), 30);

        handle.send(WorkerMessage::AssignSymbol {
            exchange: "binance".into(),
            symbol: "BTCUSDT".into(),
            tick_value: rust_decimal::Decimal::new(1, 1),
            bin_multiplier: 10,
        });

        let raw = crate::trade::RawTrade {
            exchange: "binance".into(),
            symbol: "BTCUSDT".into(),
            trade_id: 1,
            price: "100.0".into(),
            quantity: "1.0".into(),
            timestamp_ms: 1_000,
            buyer_is_maker: false,
            trade_type: None,
        };
        let trade = crate::trade::Trade::parse(&raw).unwrap();
        handle.send(WorkerMessage::ProcessTrades {
            symbol: "BTCUSDT".into(),
            trades: vec![trade],
        });

        thread::sleep(Duration::from_millis(50));
        handle.shutdown();

        let queue = DurableQueue::open(&queue_path).unwrap();
        assert!(queue.pending_count().unwrap() >= 1);
    }

    #[test]
    fn is_dead_reports_true_after_a_clean_shutdown_join() {
        let tmp = tempfile::tempdir().unwrap();
        let socket_path = tmp.path().join("fast.sock").to_str().unwrap().to_string();
        let queue_path = tmp.path().join("queue.db").to_str().unwrap().to_string();

        let handle = spawn_worker(2, socket_path, queue_path, 30);
        assert!(!handle.is_dead());
        handle.send(WorkerMessage::Shutdown);

        let mut waited = Duration::from_millis(0);
        while !handle.is_dead() && waited < Duration::from_secs(1) {
            thread::sleep(Duration::from_millis(10));
            waited += Duration::from_millis(10);
        }
        assert!(handle.is_dead(), "worker thread should have exited after Shutdown");
    }
}
