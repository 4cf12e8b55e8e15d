//! Hybrid publisher: a fast, non-durable Unix-socket channel backed by a
//! durable on-disk queue fallback whenever the fast channel is down (C10).

use crate::error::PublishError;
use crate::ipc::{Envelope, blocking as framing};
use crate::queue::DurableQueue;
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::time::Duration;
use tracing::{debug, info, warn};

const INITIAL_BACKOFF_MS: u64 = 1_000;
const MAX_BACKOFF_MS: u64 = 30_000;
const MAX_BACKOFF_ATTEMPTS: u32 = 10;
const WRITE_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Connected,
    Disconnected,
}

/// Reconnect backoff: doubles from `INITIAL_BACKOFF_MS` up to
/// `MAX_BACKOFF_MS`, then holds at the cap indefinitely. The attempt
/// counter resets on every successful reconnect.
struct Backoff {
    attempt: u32,
    next_allowed_at_ms: i64,
}

impl Backoff {
    fn new() -> Self {
        Backoff {
            attempt: 0,
            next_allowed_at_ms: 0,
        }
    }

    fn delay_ms(&self) -> u64 {
        let capped_attempt = self.attempt.min(MAX_BACKOFF_ATTEMPTS);
        let scaled = INITIAL_BACKOFF_MS.saturating_mul(1u64 << capped_attempt.min(20));
        scaled.min(MAX_BACKOFF_MS)
    }

    fn ready(&self, now_ms: i64) -> bool {
        now_ms >= self.next_allowed_at_ms
    }

    fn record_failure(&mut self, now_ms: i64) {
        self.attempt = self.attempt.saturating_add(1);
        self.next_allowed_at_ms = now_ms + self.delay_ms() as i64;
    }

    fn reset(&mut self) {
        self.attempt = 0;
        self.next_allowed_at_ms = 0;
    }
}

/// Publishes completed candles and gap records to the persistence
/// process. Called directly from worker threads: every operation here is
/// either non-blocking-bounded (100ms write timeout) or a local SQLite
/// call.
pub struct HybridPublisher {
    socket_path: String,
    stream: Option<UnixStream>,
    state: ConnectionState,
    backoff: Backoff,
    queue: DurableQueue,
}

impl HybridPublisher {
    pub fn new(socket_path: &str, durable_queue_path: &str) -> Result<Self, PublishError> {
        let queue = DurableQueue::open(durable_queue_path)?;
        Ok(HybridPublisher {
            socket_path: socket_path.to_string(),
            stream: None,
            state: ConnectionState::Disconnected,
            backoff: Backoff::new(),
            queue,
        })
    }

    /// Sends `envelope`. On fast-channel failure, falls back to the
    /// durable queue and never returns an error to the caller (the
    /// candle is never silently dropped).
    pub fn publish(&mut self, envelope: &Envelope, now_ms: i64) {
        self.maybe_reconnect(now_ms);

        let body = match serde_json::to_vec(envelope) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "failed to serialize envelope, dropping");
                return;
            }
        };

        if self.state == ConnectionState::Connected {
            if let Some(stream) = self.stream.as_mut() {
                match framing::write_frame(stream, &body) {
                    Ok(()) => {
                        debug!(message_type = %envelope.message_type, "published over fast channel");
                        return;
                    }
                    Err(e) => {
                        warn!(error = %e, "fast channel write failed, falling back to durable queue");
                        self.on_disconnect(now_ms);
                    }
                }
            }
        }

        if let Err(e) = self.queue.enqueue(envelope, now_ms) {
            warn!(error = %e, "durable enqueue failed, envelope is lost");
        }
    }

    fn maybe_reconnect(&mut self, now_ms: i64) {
        if self.state == ConnectionState::Connected || !self.backoff.ready(now_ms) {
            return;
        }

        match UnixStream::connect(&self.socket_path) {
            Ok(stream) => {
                let _ = stream.set_write_timeout(Some(WRITE_TIMEOUT));
                self.stream = Some(stream);
                self.state = ConnectionState::Connected;
                self.backoff.reset();
                info!(socket = %self.socket_path, "fast channel connected");
            }
            Err(e) => {
                debug!(error = %e, "fast channel connect failed, staying on durable queue");
                self.backoff.record_failure(now_ms);
            }
        }
    }

    fn on_disconnect(&mut self, now_ms: i64) {
        self.stream = None;
        self.state = ConnectionState::Disconnected;
        self.backoff.record_failure(now_ms);
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn pending_durable_count(&self) -> Result<u64, PublishError> {
        Ok(self.queue.pending_count()?)
    }
}
