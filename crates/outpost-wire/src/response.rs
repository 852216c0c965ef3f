// SPDX-License-Identifier: MIT

//! Response document types: index, process snapshot, list, delete
//! acknowledgement. Absolute URLs are derived from the request's host by
//! the caller (`outpost-daemon`), not computed here.

use serde::{Deserialize, Serialize};

use outpost_core::ProcessSnapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDocument {
    pub list: String,
    pub create: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSnapshotDocument {
    pub slug: String,
    pub app: String,
    pub node: String,
    pub state: String,
    pub last_error: Option<String>,
    pub attach: String,
    pub details: String,
    pub delete: String,
}

impl ProcessSnapshotDocument {
    pub fn from_snapshot(snapshot: &ProcessSnapshot, base_url: &str) -> Self {
        let slug = snapshot.slug().to_string();
        Self {
            slug: slug.clone(),
            app: snapshot.spec.app.clone(),
            node: snapshot.spec.node.clone(),
            state: snapshot.state.to_string(),
            last_error: snapshot.last_error.clone(),
            attach: format!("{base_url}/attach-console/{slug}"),
            details: format!("{base_url}/process-status/{slug}"),
            delete: format!("{base_url}/delete-process/{slug}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListProcessesResponse {
    pub processes: Vec<ProcessSnapshotDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeleteResponse {}
