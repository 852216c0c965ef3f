// SPDX-License-Identifier: MIT

//! Process descriptor and state machine.
//!
//! [`ProcessState`] models the lifecycle graph from create through delete.
//! The descriptor's immutable fields and mutable state are kept in
//! separate types so ownership is obvious: [`ProcessSpec`] never changes
//! after creation, while [`ProcessState`]/`last_error` are written only by
//! the owning supervisor (see `outpost-engine::supervisor`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::slug::Slug;

/// State of a process's lifecycle. See the transition table in the design
/// notes for the full graph; `Deleted` is terminal and `Failed` is terminal
/// except for a subsequent delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Pending,
    Fetching,
    Unpacking,
    Parsing,
    Running,
    Restarting,
    Terminating,
    Failed,
    Deleted,
}

crate::simple_display! {
    ProcessState {
        Pending => "pending",
        Fetching => "fetching",
        Unpacking => "unpacking",
        Parsing => "parsing",
        Running => "running",
        Restarting => "restarting",
        Terminating => "terminating",
        Failed => "failed",
        Deleted => "deleted",
    }
}

impl ProcessState {
    /// True once no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessState::Deleted)
    }

    /// True when the process has never spawned a child and never will
    /// without external intervention.
    pub fn is_failed(self) -> bool {
        matches!(self, ProcessState::Failed)
    }
}

/// The immutable request-derived identity of a process. Shared read-only
/// with request handlers; never mutated after the registry inserts it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub slug: Slug,
    pub app: String,
    pub node: String,
    pub process_type: String,
    pub source_url: String,
    pub env: BTreeMap<String, String>,
}

/// A point-in-time, immutable copy of a process's mutable state, safe to
/// hand to callers without holding any lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub spec: ProcessSpec,
    pub state: ProcessState,
    pub last_error: Option<String>,
    pub pid: Option<u32>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl ProcessSnapshot {
    pub fn slug(&self) -> &Slug {
        &self.spec.slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deleted_is_the_only_terminal_state() {
        for state in [
            ProcessState::Pending,
            ProcessState::Fetching,
            ProcessState::Unpacking,
            ProcessState::Parsing,
            ProcessState::Running,
            ProcessState::Restarting,
            ProcessState::Terminating,
            ProcessState::Failed,
        ] {
            assert!(!state.is_terminal(), "{state} should not be terminal");
        }
        assert!(ProcessState::Deleted.is_terminal());
    }

    #[test]
    fn display_matches_wire_format() {
        assert_eq!(ProcessState::Running.to_string(), "running");
        assert_eq!(ProcessState::Failed.to_string(), "failed");
    }
}
