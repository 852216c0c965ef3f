// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! outpost-engine: the process lifecycle engine — archive fetch/extract,
//! the per-process log hub, the process supervisor, and the slug
//! registry that ties them together.

pub mod archive;
pub mod backoff;
pub mod log_hub;
pub mod registry;
pub mod supervisor;

pub use archive::{ArchiveFetcher, FetchError, FetchErrorCategory, HttpArchiveFetcher};
pub use log_hub::{Channel, LogEvent, LogHandle, LogHub};
pub use registry::{CreateSpec, Registry, RegistryError};
pub use supervisor::{spawn_supervisor, SupervisorConfig, SupervisorHandle};
