//! Persistence process: durable queue poller + fast-channel socket
//! listener + candle writer, fronted by a `GET /health` endpoint.

use actix_web::{App, HttpResponse, HttpServer, get, web};
use clap::Parser;
use flowtrace::config::{PersistenceArgs, PersistenceConfig};
use flowtrace::gap_store::GapStore;
use flowtrace::ipc_server::{run_queue_poller, run_socket_listener};
use flowtrace::queue::DurableQueue;
use flowtrace::writer::CandleWriter;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Serialize)]
struct HealthComponents {
    socket: &'static str,
    poller: &'static str,
    storage: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    components: HealthComponents,
    timestamp: i64,
}

struct AppState {
    poller_alive: Arc<AtomicBool>,
    last_poll_ms: Arc<AtomicI64>,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[get("/health")]
async fn health(state: web::Data<AppState>) -> HttpResponse {
    let poller_alive = state.poller_alive.load(Ordering::Relaxed);
    let stale = now_ms() - state.last_poll_ms.load(Ordering::Relaxed) > 10_000;

    let status = if !poller_alive {
        "unhealthy"
    } else if stale {
        "degraded"
    } else {
        "healthy"
    };

    let body = HealthResponse {
        status,
        components: HealthComponents {
            socket: "up",
            poller: if poller_alive { "up" } else { "down" },
            storage: "up",
        },
        timestamp: now_ms(),
    };

    if status == "unhealthy" {
        HttpResponse::ServiceUnavailable().json(body)
    } else {
        HttpResponse::Ok().json(body)
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = PersistenceArgs::parse();
    let config = PersistenceConfig::from_env(&args)?;
    info!(?config, "starting persistence process");

    std::fs::create_dir_all(&config.storage_dir)?;
    let gap_store_path = format!("{}/gaps.db", config.storage_dir);
    let candles_db_path = format!("{}/candles.db", config.storage_dir);

    let gap_store = Arc::new(GapStore::open(&gap_store_path)?);
    let writer = Arc::new(CandleWriter::open(&candles_db_path)?);
    let queue = Arc::new(DurableQueue::open(&config.durable_queue_path)?);

    let poller_alive = Arc::new(AtomicBool::new(true));
    let last_poll_ms = Arc::new(AtomicI64::new(now_ms()));

    {
        let queue = Arc::clone(&queue);
        let gap_store = Arc::clone(&gap_store);
        let writer = Arc::clone(&writer);
        let retention = config.queue_retention_hours;
        let interval_ms = config.poll_interval_ms;
        let last_poll_ms = Arc::clone(&last_poll_ms);
        tokio::spawn(async move {
            last_poll_ms.store(now_ms(), Ordering::Relaxed);
            run_queue_poller(queue, gap_store, writer, interval_ms, retention, now_ms).await;
        });
    }

    {
        let socket_path = config.socket_path.clone();
        let gap_store = Arc::clone(&gap_store);
        let writer = Arc::clone(&writer);
        let poller_alive = Arc::clone(&poller_alive);
        tokio::spawn(async move {
            if let Err(e) = run_socket_listener(&socket_path, gap_store, writer).await {
                error!(error = %e, "fast channel listener exited");
                poller_alive.store(false, Ordering::Relaxed);
            }
        });
    }

    let state = web::Data::new(AppState {
        poller_alive,
        last_poll_ms,
    });

    HttpServer::new(move || App::new().app_data(state.clone()).service(health))
        .bind(("0.0.0.0", config.health_port))?
        .run()
        .await?;

    Ok(())
}
