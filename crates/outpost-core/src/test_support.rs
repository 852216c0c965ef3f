// SPDX-License-Identifier: MIT

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

/// Proptest strategies for core types.
pub mod strategies {
    use crate::process::ProcessState;
    use proptest::prelude::*;

    pub fn arb_process_state() -> impl Strategy<Value = ProcessState> {
        prop_oneof![
            Just(ProcessState::Pending),
            Just(ProcessState::Fetching),
            Just(ProcessState::Unpacking),
            Just(ProcessState::Parsing),
            Just(ProcessState::Running),
            Just(ProcessState::Restarting),
            Just(ProcessState::Terminating),
            Just(ProcessState::Failed),
            Just(ProcessState::Deleted),
        ]
    }

    /// Strategy for generating slug-legal component strings: lowercase
    /// alphanumerics and hyphens, never empty.
    pub fn arb_slug_component() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,15}".prop_map(String::from)
    }
}
