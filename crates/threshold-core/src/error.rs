//! Error types for the threshold patch cycle
//!
//! Every failure is terminal for one invocation. Nothing here retries.

use std::path::PathBuf;
use thiserror::Error;

/// The embedded document could not be read as a threshold document
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("threshold document is empty")]
    Empty,

    #[error("threshold document is not valid YAML: {0}")]
    Syntax(#[from] serde_yaml::Error),

    #[error("threshold document root must be a mapping, found {found}")]
    NotAMapping { found: &'static str },

    #[error("invalid `tenants` section: {reason}")]
    InvalidTenants { reason: String },

    #[error("invalid `{section}` section: {source}")]
    InvalidSection {
        section: &'static str,
        source: serde_yaml::Error,
    },
}

/// The in-memory document could not be serialized
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to serialize tenants: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

/// Failures reported by a [`ConfigStore`](crate::store::ConfigStore)
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport, authorization, or a missing object/field
    #[error("fetch failed: {reason}")]
    Fetch { reason: String },

    /// Write-back rejected or transport failure
    #[error("patch failed: {reason}")]
    Patch { reason: String },

    /// Version-checked write against a document that changed since fetch
    #[error("document changed since it was fetched (expected version {expected})")]
    Conflict { expected: String },
}

impl StoreError {
    pub fn fetch(reason: impl Into<String>) -> Self {
        StoreError::Fetch {
            reason: reason.into(),
        }
    }

    pub fn patch(reason: impl Into<String>) -> Self {
        StoreError::Patch {
            reason: reason.into(),
        }
    }
}

/// Malformed update arguments, reported before anything is fetched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} contains control characters: {value:?}")]
    ControlCharacters { field: &'static str, value: String },

    #[error("unknown metric key `{metric}`")]
    UnknownMetric { metric: String },
}

/// Cycle-level error for one fetch → apply → patch invocation
#[derive(Debug, Error)]
pub enum PatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fetch(StoreError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Write(StoreError),

    #[error(transparent)]
    Conflict(StoreError),
}

impl PatchError {
    /// True when a retry against a fresh fetch could succeed
    pub fn is_conflict(&self) -> bool {
        matches!(self, PatchError::Conflict(_))
    }
}

/// The exporter could not (re)load its config file
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

