// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! outpost-daemon: the HTTP/WebSocket request surface over the process
//! lifecycle engine, plus config resolution and the binary entry point
//! in `src/bin/outpostd.rs`.

pub mod config;
pub mod handlers;
pub mod state;

use axum::routing::{get, post};
use axum::Router;

pub use config::Config;
pub use state::AppState;

/// Build the request surface's router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/list-processes", get(handlers::list_processes))
        .route("/create-process", post(handlers::create_process))
        .route("/process-status/:slug", get(handlers::process_status))
        .route("/delete-process/:slug", post(handlers::delete_process))
        .route("/attach-console/:slug", get(handlers::attach_console))
        .with_state(state)
}
