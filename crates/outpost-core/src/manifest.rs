// SPDX-License-Identifier: MIT

//! Manifest parser: `name: command` lines mapping a process type to its
//! command line.

use std::collections::BTreeMap;

/// The well-known manifest filename at the root of an extracted archive.
pub const MANIFEST_FILENAME: &str = "Procfile";

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("manifest file not found at {0:?}")]
    NotFound(String),
    #[error("line {line}: expected `name: command`, got {text:?}")]
    BadLine { line: usize, text: String },
    #[error("line {line}: name {name:?} contains characters outside [A-Za-z0-9_-]")]
    BadName { line: usize, name: String },
    #[error("line {line}: empty command for {name:?}")]
    EmptyCommand { line: usize, name: String },
    #[error("duplicate process type {name:?} (first seen at line {first_line}, again at line {line})")]
    Duplicate { name: String, first_line: usize, line: usize },
}

/// A parsed manifest: process type name -> raw (not shell-interpreted) command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: BTreeMap<String, String>,
}

impl Manifest {
    pub fn get(&self, process_type: &str) -> Option<&str> {
        self.entries.get(process_type).map(String::as_str)
    }

    pub fn process_types(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Parse manifest text: non-empty, non-comment lines of the shape
    /// `name: command`, where `name` matches `[A-Za-z0-9_-]+` and
    /// `command` is the remainder after the first colon, trimmed.
    /// Duplicate names are a parse error.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut entries = BTreeMap::new();
        let mut first_seen_at: BTreeMap<String, usize> = BTreeMap::new();

        for (idx, raw_line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = raw_line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let Some(colon) = trimmed.find(':') else {
                return Err(ParseError::BadLine { line: line_no, text: trimmed.to_string() });
            };
            let name = trimmed[..colon].trim();
            let command = trimmed[colon + 1..].trim();

            if name.is_empty()
                || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(ParseError::BadName { line: line_no, name: name.to_string() });
            }
            if command.is_empty() {
                return Err(ParseError::EmptyCommand { line: line_no, name: name.to_string() });
            }
            if let Some(&first_line) = first_seen_at.get(name) {
                return Err(ParseError::Duplicate {
                    name: name.to_string(),
                    first_line,
                    line: line_no,
                });
            }

            first_seen_at.insert(name.to_string(), line_no);
            entries.insert(name.to_string(), command.to_string());
        }

        Ok(Self { entries })
    }
}
