// src/error.rs
use std::time::Duration;

use thiserror::Error;

use crate::job::JobId;
use crate::message::DeletionResult;

/// Failure of a single call against the remote message store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The request never produced an HTTP answer (DNS, connect, timeout, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with an error object (`{"message": ...}`).
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Still rate limited after the client's retries ran out.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// The body was neither a message array nor an error object.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl StoreError {
    /// Whether repeating the same call may succeed. The client retries
    /// exactly these failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Transport(_) | StoreError::RateLimited { .. } => true,
            StoreError::Api { status, .. } => *status >= 500,
            StoreError::Decode(_) => false,
        }
    }
}

/// Why a deletion run did not produce a result.
#[derive(Debug, Error)]
pub enum DeletionError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Listing failed. Messages deleted before the failure are kept in
    /// `partial`; they are gone remotely even though the run failed.
    #[error("failed to list page {page}: {source}")]
    ListFailed {
        page: u32,
        #[source]
        source: StoreError,
        partial: DeletionResult,
    },
}

impl DeletionError {
    /// Deletions that completed before the run failed, if any.
    pub fn partial(&self) -> Option<&DeletionResult> {
        match self {
            DeletionError::ListFailed { partial, .. } => Some(partial),
            DeletionError::InvalidRequest(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("a deletion job is already running ({0})")]
    Busy(JobId),

    #[error("no such job: {0}")]
    NotFound(String),
}
