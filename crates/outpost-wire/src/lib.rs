// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! outpost-wire: JSON document types for the request surface,
//! mechanically mapped to and from the registry/engine types — no
//! lifecycle logic lives here.

pub mod error;
pub mod request;
pub mod response;

pub use error::{ApiError, ApiErrorKind};
pub use request::CreateProcessRequest;
pub use response::{DeleteResponse, IndexDocument, ListProcessesResponse, ProcessSnapshotDocument};
