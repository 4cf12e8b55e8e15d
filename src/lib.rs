//! FlowTrace: ingests live exchange trade streams and assembles them into
//! time-bucketed, footprint-enriched candles across a sharded worker
//! pool, handed off to a separate persistence process over a hybrid
//! fast/durable channel.

pub mod candle;
pub mod candle_group;
pub mod config;
pub mod error;
pub mod exchange;
pub mod footprint;
pub mod gap;
pub mod gap_recovery;
pub mod gap_store;
pub mod hash_ring;
pub mod ipc;
pub mod ipc_server;
pub mod publisher;
pub mod queue;
pub mod rollup;
pub mod router;
pub mod state_client;
pub mod state_machine;
pub mod timeframe;
pub mod trade;
pub mod worker;
pub mod writer;
