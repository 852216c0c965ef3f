// SPDX-License-Identifier: MIT

//! Slug: the primary key of a process on the agent, `app + "." + node`.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Errors returned while validating the `app`/`node` components of a slug.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum InvalidComponent {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} contains characters outside [A-Za-z0-9_-]: {value:?}")]
    BadCharset { field: &'static str, value: String },
}

fn validate_component(field: &'static str, value: &str) -> Result<(), InvalidComponent> {
    if value.is_empty() {
        return Err(InvalidComponent::Empty { field });
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(InvalidComponent::BadCharset { field, value: value.to_string() });
    }
    Ok(())
}

/// Unique identifier for a process: `app + "." + node`, global across the agent.
///
/// Constructed only via [`Slug::derive`], so a `Slug` value is always well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slug(String);

impl Slug {
    /// Validate `app` and `node` and derive the slug `app.node`.
    pub fn derive(app: &str, node: &str) -> Result<Self, InvalidComponent> {
        validate_component("app", app)?;
        validate_component("node", node)?;
        Ok(Self(format!("{app}.{node}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for Slug {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Slug {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}
