//! Service entry point: configuration, state wiring, background tasks
//! (legacy migration, eviction sweep, queue consumers), HTTP serving and
//! graceful shutdown.

use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use counterscope::api::build_router;
use counterscope::services::queue::ConsumerPool;
use counterscope::{AppState, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "counterscope=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let bind_addr = config.bind_addr.clone();
    let eviction_interval = Duration::from_secs(config.eviction_interval_secs);
    let graceful_timeout = Duration::from_secs(config.queue_graceful_timeout_secs);

    let state = AppState::build(config)?;

    // One-shot migration of legacy `thread:` rows into the threads space.
    match state.storage.migrate_legacy_threads() {
        Ok(0) => {}
        Ok(migrated) => info!(migrated, "legacy thread migration complete"),
        Err(err) => warn!(error = %err, "legacy thread migration failed"),
    }

    // Hourly eviction sweep over cache TTLs and report expiries.
    {
        let storage = state.storage.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(eviction_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let now = chrono::Utc::now().timestamp();
                if let Err(err) = storage.evict_expired(now) {
                    error!(error = %err, "eviction sweep failed");
                }
            }
        });
    }

    // Queue consumers: same state machine as the synchronous path.
    let consumers = ConsumerPool::start(
        state.broker.clone(),
        state.engine.clone(),
        state.threads.clone(),
        state.cache.clone(),
        state.config.queue_consumers,
        state.config.idempotency_window_secs,
        graceful_timeout,
    );

    let router = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "counterscope listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down: draining consumers");
    state.engine.notify_shutdown();
    consumers.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        sig.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
