//! Error primitives shared across the workspace.
//!
//! Validation failures are accumulated per field rather than raised one at a
//! time, so a caller sees every problem with an upload in a single pass.

use std::collections::HashMap;
use thiserror::Error;

/// Field-keyed validation errors.
///
/// Errors are collected, not thrown: components add to this set and the
/// lifecycle orchestrator decides whether to halt.
#[derive(Error, Debug, Default, Clone, PartialEq, Eq)]
#[error("Validation errors: {errors:?}")]
pub struct ValidationErrors {
    /// Field-specific errors: field name -> messages.
    pub errors: HashMap<String, Vec<String>>,
    /// Errors not tied to a specific field.
    pub base_errors: Vec<String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn add_base(&mut self, message: impl Into<String>) {
        self.base_errors.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.base_errors.is_empty()
    }

    /// Check if there are errors for a specific field.
    pub fn has_error(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    /// Get errors for a specific field.
    pub fn get(&self, field: &str) -> Option<&Vec<String>> {
        self.errors.get(field)
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.errors {
            self.errors.entry(field).or_default().extend(messages);
        }
        self.base_errors.extend(other.base_errors);
    }

    pub fn full_messages(&self) -> Vec<String> {
        let mut messages = self.base_errors.clone();
        for (field, field_messages) in &self.errors {
            for msg in field_messages {
                messages.push(format!("{} {}", field, msg));
            }
        }
        messages
    }
}

/// Configuration-time failures.
///
/// These are raised when a lifecycle is configured, never deferred to first
/// use: an unusable backend or engine should stop startup, not a request.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown storage backend: {0}")]
    UnknownBackend(String),

    #[error("missing settings section for storage backend: {0}")]
    MissingBackendSettings(String),

    #[error("unknown image engine: {0}")]
    UnknownEngine(String),

    #[error("image engine {name} is not available: {reason}")]
    EngineUnavailable { name: String, reason: String },

    #[error("no usable image engine (tried: {tried})")]
    NoEngineAvailable { tried: String },

    #[error("malformed resize geometry: {0:?}")]
    MalformedGeometry(String),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}
