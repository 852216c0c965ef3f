// SPDX-License-Identifier: MIT

//! API-facing error taxonomy.

use serde::{Deserialize, Serialize};

/// The `error` discriminant returned in an error response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApiErrorKind {
    InvalidRequest,
    SlugInUse,
    NotFound,
}

/// JSON body for a non-2xx response: `{ "error": ..., "detail": ... }`.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{error:?}: {detail}")]
pub struct ApiError {
    pub error: ApiErrorKind,
    pub detail: String,
}

impl ApiError {
    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self { error: ApiErrorKind::InvalidRequest, detail: detail.into() }
    }

    pub fn slug_in_use(slug: &str) -> Self {
        Self { error: ApiErrorKind::SlugInUse, detail: format!("slug already in use: {slug}") }
    }

    pub fn not_found(slug: &str) -> Self {
        Self { error: ApiErrorKind::NotFound, detail: format!("no such process: {slug}") }
    }

    pub fn kind(&self) -> ApiErrorKind {
        self.error
    }
}
