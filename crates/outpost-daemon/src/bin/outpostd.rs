// SPDX-License-Identifier: MIT

//! Agent binary entry point. Resolves config, wires the registry to the
//! request surface, serves until SIGINT, then drains every supervisor
//! before exiting.

use std::sync::Arc;

use outpost_core::SystemClock;
use outpost_daemon::{build_router, AppState, Config};
use outpost_engine::{HttpArchiveFetcher, Registry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::resolve();
    tracing::info!(listen_addr = %config.listen_addr, "starting outpostd");

    let fetcher = Arc::new(HttpArchiveFetcher::default());
    let registry = Registry::new(
        SystemClock,
        fetcher,
        config.supervisor.clone(),
        config.log_tail_capacity,
        config.log_queue_capacity,
    );

    let router = build_router(AppState { registry: registry.clone() });
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    tracing::info!("outpostd ready");
    axum::serve(listener, router).with_graceful_shutdown(wait_for_sigint()).await?;

    tracing::info!("shutdown signal handled, draining supervisors");
    registry.shutdown().await;
    tracing::info!("all supervisors drained, exiting");

    Ok(())
}

async fn wait_for_sigint() {
    let _ = tokio::signal::ctrl_c().await;
}
