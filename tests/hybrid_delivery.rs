//! Fast-channel-down / durable-queue-catchup scenario (S5): candles
//! published while the persistence socket is closed all land in the
//! durable queue; once the socket reopens, new publishes go over the
//! fast channel while the poller drains the backlog, with the writer's
//! natural-key idempotence covering any overlap between the two paths.

use flowtrace::candle::Candle;
use flowtrace::gap_store::GapStore;
use flowtrace::ipc::{Envelope, read_frame_async};
use flowtrace::ipc_server::dispatch_envelope;
use flowtrace::publisher::HybridPublisher;
use flowtrace::queue::DurableQueue;
use flowtrace::timeframe::Timeframe;
use flowtrace::writer::CandleWriter;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::UnixListener;

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn sample_candle(open_time: i64) -> Candle {
    let mut c = Candle::open_from_trade("binance", "BTCUSDT", Timeframe::OneMinute, open_time, d("100"), 1);
    c.merge_trade(d("101"), d("1"), d("101"), false, 2, d("101"));
    c.close();
    c
}

#[tokio::test]
async fn fast_channel_down_then_recovered_delivers_every_candle_exactly_once() {
    let tmp = tempfile::tempdir().unwrap();
    let socket_path = tmp.path().join("fast.sock");
    let queue_path = tmp.path().join("queue.db");
    let gap_path = tmp.path().join("gaps.db");
    let candles_path = tmp.path().join("candles.db");

    let gap_store = GapStore::open(gap_path.to_str().unwrap()).unwrap();
    let writer = CandleWriter::open(candles_path.to_str().unwrap()).unwrap();

    let mut publisher =
        HybridPublisher::new(socket_path.to_str().unwrap(), queue_path.to_str().unwrap()).unwrap();

    // Socket does not exist yet: every publish falls back to the durable queue.
    for n in 0..10 {
        let candle = sample_candle(n * Timeframe::OneMinute.duration_ms());
        let payload = serde_json::to_value(&candle).unwrap();
        let envelope = Envelope::new("candle:complete", payload, 1_000 + n);
        publisher.publish(&envelope, 1_000 + n);
    }
    assert!(!publisher.is_connected());
    assert_eq!(publisher.pending_durable_count().unwrap(), 10);

    // Bring the persistence side up: bind the listener so later publishes
    // have somewhere to land.
    let listener = UnixListener::bind(&socket_path).unwrap();
    let received = Arc::new(std::sync::Mutex::new(Vec::new()));
    let received_task = Arc::clone(&received);
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        loop {
            let body = match read_frame_async(&mut stream).await {
                Ok(b) => b,
                Err(_) => break,
            };
            let envelope = Envelope::decode(&body).unwrap();
            received_task.lock().unwrap().push(envelope);
        }
    });

    // Drain the backlog through the real dispatch path, the way the queue
    // poller would.
    let queue = DurableQueue::open(queue_path.to_str().unwrap()).unwrap();
    let backlog = queue.dequeue(100).unwrap();
    assert_eq!(backlog.len(), 10);
    for (row_id, envelope) in &backlog {
        dispatch_envelope(envelope, &gap_store, &writer).unwrap();
        queue.mark_processed(*row_id).unwrap();
    }
    assert_eq!(writer.count("binance", "BTCUSDT", Timeframe::OneMinute).unwrap(), 10);

    // Re-dispatching the same backlog (simulating a receiver crash after
    // the fast-path write succeeded but before the durable row was marked
    // processed) must not double the persisted count: the writer's
    // natural-key upsert absorbs the replay.
    for (_, envelope) in &backlog {
        dispatch_envelope(envelope, &gap_store, &writer).unwrap();
    }
    assert_eq!(writer.count("binance", "BTCUSDT", Timeframe::OneMinute).unwrap(), 10);

    // New publishes after backoff elapses go over the now-live fast channel.
    let fresh = sample_candle(10 * Timeframe::OneMinute.duration_ms());
    let envelope = Envelope::new("candle:complete", serde_json::to_value(&fresh).unwrap(), 50_000);
    publisher.publish(&envelope, 50_000);
    assert!(publisher.is_connected());

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let got = received.lock().unwrap();
    assert_eq!(got.len(), 1);
    dispatch_envelope(&got[0], &gap_store, &writer).unwrap();

    assert_eq!(writer.count("binance", "BTCUSDT", Timeframe::OneMinute).unwrap(), 11);
}
