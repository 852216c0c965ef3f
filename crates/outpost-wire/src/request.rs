// SPDX-License-Identifier: MIT

//! Create-request document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProcessRequest {
    pub app: String,
    pub node: String,
    pub process_type: String,
    pub source_url: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl CreateProcessRequest {
    /// Validate the document shape (charset of `app`/`node` is re-checked
    /// by `Slug::derive` at the registry boundary; this only rejects
    /// request-level shape problems: empty required fields, a
    /// non-http(s) `source_url`).
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.app.trim().is_empty() {
            return Err(ApiError::invalid_request("app must not be empty"));
        }
        if self.node.trim().is_empty() {
            return Err(ApiError::invalid_request("node must not be empty"));
        }
        if self.process_type.trim().is_empty() {
            return Err(ApiError::invalid_request("process_type must not be empty"));
        }
        if !(self.source_url.starts_with("http://") || self.source_url.starts_with("https://")) {
            return Err(ApiError::invalid_request("source_url must be http or https"));
        }
        Ok(())
    }
}
