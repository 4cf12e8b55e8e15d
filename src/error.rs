//! Error taxonomy for every component seam.
//!
//! Library code never reaches for `anyhow`; each module returns one of
//! these concrete variants so callers can match on failure kind instead of
//! parsing a message string. Binaries convert into `anyhow::Error` at the
//! top level for logging and process exit codes.

use thiserror::Error;

/// Errors raised while turning a wire [`crate::trade::RawTrade`] into a
/// domain [`crate::trade::Trade`], or while folding a trade into a
/// candle group.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradeError {
    #[error("malformed numeric field: {0}")]
    MalformedNumeric(String),

    #[error("negative price or quantity in trade {trade_id}")]
    Negative { trade_id: u64 },
}

/// Errors from the consistent hash ring.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RingError {
    #[error("hash ring has no workers")]
    Empty,
}

/// Errors surfaced by the hybrid publisher.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("fast channel write failed: {0}")]
    FastChannel(#[source] std::io::Error),

    #[error("durable queue enqueue failed: {0}")]
    Durable(#[from] QueueError),
}

/// Errors from the durable queue storage layer.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors raised validating or persisting a candle at the writer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WriterError {
    #[error("missing or non-numeric field: {0}")]
    MissingField(String),

    #[error("open_time {open_time} is not aligned to timeframe duration {duration_ms}")]
    Misaligned { open_time: i64, duration_ms: i64 },

    #[error("low {low} exceeds min(open, close)")]
    LowAboveBody { low: String },

    #[error("high {high} is below max(open, close)")]
    HighBelowBody { high: String },

    #[error("footprint bins are not sorted or contain a duplicate tick_price")]
    BinsUnsorted,

    #[error("negative bin volume at tick_price {tick_price}")]
    NegativeBinVolume { tick_price: String },

    #[error("1s candles are not persisted")]
    BaseTimeframeRejected,

    #[error("sqlite error: {0}")]
    Sqlite(String),
}

/// Errors from the gap/state snapshot store.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("encode error: {0}")]
    Encode(#[from] Box<bincode::ErrorKind>),
}

/// Errors constructing a typed configuration from the environment/CLI.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Errors from an exchange trade feed or gap-recovery fetch.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("feed closed")]
    Closed,
}

/// Errors routing a decoded IPC envelope to its handler at the persistence
/// process (C12's dispatch step).
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("snapshot store error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("writer error: {0}")]
    Writer(#[from] WriterError),

    #[error("envelope payload decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors from the worker-side synchronous snapshot request/response
/// client (C8's `state.load` call into C14 over IPC).
#[derive(Error, Debug)]
pub enum StateClientError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}
