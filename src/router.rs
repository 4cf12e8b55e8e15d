//! Main-thread symbol router: owns the consistent hash ring and the
//! worker pool, and dispatches inbound trade batches to the owning
//! worker (C9).

use crate::hash_ring::ConsistentHashRing;
use crate::trade::Trade;
use crate::worker::{WorkerHandle, WorkerMessage, spawn_worker};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{error, warn};

/// Per-symbol metadata the router needs to hand a worker on assignment;
/// everything else lives inside the worker's `CandleGroup`.
#[derive(Debug, Clone)]
pub struct SymbolMeta {
    pub exchange: String,
    pub tick_value: Decimal,
    pub bin_multiplier: u32,
}

/// Arguments `check_workers` needs to respawn a dead worker under its
/// original `worker_id`, preserving the ring's stable mapping.
#[derive(Debug, Clone)]
pub struct WorkerSpawnSpec {
    pub socket_path: String,
    pub durable_queue_path: String,
    pub snapshot_interval_secs: u64,
}

pub struct SymbolRouter {
    ring: ConsistentHashRing,
    workers: HashMap<u32, WorkerHandle>,
    assignments: HashMap<String, u32>,
    symbol_meta: HashMap<String, SymbolMeta>,
    spawn_spec: Option<WorkerSpawnSpec>,
}

impl SymbolRouter {
    pub fn new() -> Self {
        SymbolRouter {
            ring: ConsistentHashRing::new(),
            workers: HashMap::new(),
            assignments: HashMap::new(),
            symbol_meta: HashMap::new(),
            spawn_spec: None,
        }
    }

    /// Records the parameters `check_workers` needs to respawn a dead
    /// worker. Every worker in a given router is spawned identically
    /// (same socket/queue path scheme, same snapshot interval), so one
    /// spec covers the whole pool.
    pub fn set_spawn_spec(&mut self, spec: WorkerSpawnSpec) {
        self.spawn_spec = Some(spec);
    }

    pub fn add_worker(&mut self, handle: WorkerHandle) {
        self.ring.add_worker(handle.worker_id);
        self.workers.insert(handle.worker_id, handle);
    }

    /// Assigns a symbol to the worker the ring currently designates,
    /// moving it (with a snapshot handoff) if it was previously owned by
    /// a different worker after a membership change.
    pub fn assign_symbol(&mut self, symbol: &str, meta: SymbolMeta) {
        let Ok(worker_id) = self.ring.worker_for(symbol) else {
            warn!(symbol, "no workers available, symbol not assigned");
            return;
        };

        if let Some(&previous) = self.assignments.get(symbol) {
            if previous == worker_id {
                return;
            }
            if let Some(prev_handle) = self.workers.get(&previous) {
                prev_handle.send(WorkerMessage::UnassignSymbol {
                    symbol: symbol.to_string(),
                });
            }
        }

        if let Some(handle) = self.workers.get(&worker_id) {
            handle.send(WorkerMessage::AssignSymbol {
                exchange: meta.exchange.clone(),
                symbol: symbol.to_string(),
                tick_value: meta.tick_value,
                bin_multiplier: meta.bin_multiplier,
            });
            self.assignments.insert(symbol.to_string(), worker_id);
            self.symbol_meta.insert(symbol.to_string(), meta);
        }
    }

    /// Dispatches a batch of trades for one symbol to its owning worker.
    /// Drops the batch (with a warning) if the ring has no workers or the
    /// symbol has not yet been assigned.
    pub fn route_trades(&self, symbol: &str, trades: Vec<Trade>) {
        let Some(&worker_id) = self.assignments.get(symbol) else {
            warn!(symbol, "trades for unassigned symbol, dropping batch");
            return;
        };
        if let Some(handle) = self.workers.get(&worker_id) {
            handle.send(WorkerMessage::ProcessTrades {
                symbol: symbol.to_string(),
                trades,
            });
        }
    }

    pub fn broadcast_heartbeat(&self, now_ms: i64) {
        for handle in self.workers.values() {
            handle.send(WorkerMessage::Heartbeat { now_ms });
        }
    }

    pub fn worker_for(&self, symbol: &str) -> Option<u32> {
        self.assignments.get(symbol).copied()
    }

    /// Detects workers whose thread has died (panicked or returned) and
    /// respawns each under its original `worker_id`, then re-sends
    /// `AssignSymbol` for every symbol that worker owned. The respawned
    /// worker reloads each symbol's snapshot through the normal
    /// `AssignSymbol` handling (a `state`/`load` IPC round trip), so no
    /// separate crash-recovery transfer is needed. A no-op if
    /// `set_spawn_spec` was never called.
    pub fn check_workers(&mut self) {
        let Some(spec) = self.spawn_spec.clone() else {
            return;
        };

        let dead_ids: Vec<u32> = self
            .workers
            .iter()
            .filter(|(_, handle)| handle.is_dead())
            .map(|(id, _)| *id)
            .collect();

        for worker_id in dead_ids {
            error!(worker_id, "worker thread died, respawning");
            self.workers.remove(&worker_id);

            let handle = spawn_worker(
                worker_id,
                spec.socket_path.clone(),
                spec.durable_queue_path.clone(),
                spec.snapshot_interval_secs,
            );
            self.workers.insert(worker_id, handle);

            let orphaned_symbols: Vec<String> = self
                .assignments
                .iter()
                .filter(|(_, &owner)| owner == worker_id)
                .map(|(symbol, _)| symbol.clone())
                .collect();

            for symbol in orphaned_symbols {
                if let Some(meta) = self.symbol_meta.get(&symbol).cloned() {
                    if let Some(handle) = self.workers.get(&worker_id) {
                        handle.send(WorkerMessage::AssignSymbol {
                            exchange: meta.exchange,
                            symbol: symbol.clone(),
                            tick_value: meta.tick_value,
                            bin_multiplier: meta.bin_multiplier,
                        });
                        info_resend(worker_id, &symbol);
                    }
                }
            }
        }
    }

    pub fn shutdown(self) {
        for (_, handle) in self.workers {
            handle.shutdown();
        }
    }
}

fn info_resend(worker_id: u32, symbol: &str) {
    tracing::info!(worker_id, symbol, "re-assigned symbol to respawned worker");
}

impl Default for SymbolRouter {
    fn default() -> Self {
        Self::new()
    }
}
