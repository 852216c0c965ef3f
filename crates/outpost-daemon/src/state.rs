// SPDX-License-Identifier: MIT

//! Shared application state handed to every handler.

use outpost_core::SystemClock;
use outpost_engine::Registry;

/// Cheap to clone: wraps the registry, which is itself reference-counted.
#[derive(Clone)]
pub struct AppState {
    pub registry: Registry<SystemClock>,
}
