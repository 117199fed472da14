//! Error types surfaced by the cache.

use std::sync::Arc;

use thiserror::Error;

use crate::slot::Suspension;

/// A loader failure captured once and shared by every later read of the key.
#[derive(Clone, Debug, Error)]
#[error("failed to load resource {key}: {cause:#}")]
pub struct LoadFailure {
    key: String,
    cause: Arc<anyhow::Error>,
}

impl LoadFailure {
    pub(crate) fn new(key: String, cause: anyhow::Error) -> Self {
        Self {
            key,
            cause: Arc::new(cause),
        }
    }

    /// Debug rendering of the key that failed.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The error the loader returned.
    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }

    /// `true` if both failures carry the same captured cause.
    pub fn same_cause(&self, other: &LoadFailure) -> bool {
        Arc::ptr_eq(&self.cause, &other.cause)
    }
}

/// Outcome of a non-ready [`ResourceCache::read`](crate::ResourceCache::read).
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("resource {} is still loading", .0.key())]
    Suspended(Suspension),
    #[error(transparent)]
    Failed(#[from] LoadFailure),
}

impl ReadError {
    pub fn is_suspended(&self) -> bool {
        matches!(self, ReadError::Suspended(_))
    }
}
