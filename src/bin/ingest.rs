//! Ingest process: one exchange trade feed per configured symbol,
//! routed through the consistent hash ring to a fixed pool of worker
//! threads.

use clap::Parser;
use flowtrace::config::{IngestArgs, IngestConfig};
use flowtrace::exchange::{BinanceTradeFeed, TradeFeed};
use flowtrace::footprint::choose_bin_multiplier;
use flowtrace::router::{SymbolMeta, SymbolRouter, WorkerSpawnSpec};
use flowtrace::trade::Trade;
use flowtrace::worker::spawn_worker;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Comma-separated symbol list; a minimal stand-in for a symbol registry,
/// since cached exchange/symbol metadata (tick size, listing date) is
/// explicitly out of scope.
fn configured_symbols() -> Vec<String> {
    env::var("FLOWTRACE_SYMBOLS")
        .unwrap_or_else(|_| "BTCUSDT,ETHUSDT".to_string())
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = IngestArgs::parse();
    let config = IngestConfig::from_env(&args)?;
    info!(?config, "starting ingest process");

    std::fs::create_dir_all(
        std::path::Path::new(&config.durable_queue_path)
            .parent()
            .unwrap_or_else(|| std::path::Path::new("/tmp/flowtrace")),
    )?;

    let mut router = SymbolRouter::new();
    router.set_spawn_spec(WorkerSpawnSpec {
        socket_path: config.fast_channel_path.clone(),
        durable_queue_path: config.durable_queue_path.clone(),
        snapshot_interval_secs: config.snapshot_interval_secs,
    });
    for worker_id in 0..config.worker_count {
        let handle = spawn_worker(
            worker_id,
            config.fast_channel_path.clone(),
            config.durable_queue_path.clone(),
            config.snapshot_interval_secs,
        );
        router.add_worker(handle);
    }

    let symbols = configured_symbols();
    let default_tick = Decimal::from_str("0.01").unwrap();
    for symbol in &symbols {
        let meta = SymbolMeta {
            exchange: config.exchange.clone(),
            tick_value: default_tick,
            bin_multiplier: choose_bin_multiplier(default_tick, Decimal::from(1_000)),
        };
        router.assign_symbol(symbol, meta);
    }

    let (trade_tx, mut trade_rx) = mpsc::unbounded_channel();
    for symbol in &symbols {
        let feed = BinanceTradeFeed::new(symbol);
        let sink = trade_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = feed.run(sink).await {
                error!(error = %e, "trade feed exited");
            }
        });
    }
    drop(trade_tx);

    let mut shutdown = Box::pin(shutdown_signal());
    let mut heartbeat = tokio::time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            Some(raw) = trade_rx.recv() => {
                match Trade::parse(&raw) {
                    Ok(trade) => {
                        let symbol = trade.symbol.clone();
                        router.route_trades(&symbol, vec![trade]);
                    }
                    Err(e) => warn!(error = %e, "dropping malformed trade"),
                }
            }
            _ = heartbeat.tick() => {
                router.check_workers();
                router.broadcast_heartbeat(now_ms());
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, draining workers");
                break;
            }
        }
    }

    router.shutdown();
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
