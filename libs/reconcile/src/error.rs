//! Allocation errors and their retry classification.

use thiserror::Error;

/// Result type for allocation operations.
pub type AllocationResult<T> = Result<T, AllocationError>;

/// Errors that can occur while allocating a deletion cost.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// Pod, node or deployment is gone. The event is stale.
    #[error("not found: {0}")]
    NotFound(String),

    /// The pod → replica set → deployment chain is broken.
    #[error("owner missing: {0}")]
    OwnerMissing(String),

    /// The pod changed since it was read.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Every value in the cost range is claimed.
    #[error("no free deletion cost in [{min}, {max}]")]
    Exhausted { min: i32, max: i32 },

    /// Any other I/O failure talking to the API server.
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    /// Shutdown was signalled before the call finished.
    #[error("cancelled")]
    Cancelled,
}

/// What the worker should do with a key after a failed allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Forget the key until a new event arrives.
    Drop,
    /// Put the key straight back on the queue.
    RequeueNow,
    /// Put the key back after the retry delay.
    Backoff,
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Disposition::Drop => write!(f, "drop"),
            Disposition::RequeueNow => write!(f, "requeue"),
            Disposition::Backoff => write!(f, "backoff"),
        }
    }
}

impl AllocationError {
    /// Classify the error for the worker.
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::NotFound(_) | Self::OwnerMissing(_) | Self::Cancelled => Disposition::Drop,
            Self::Conflict(_) => Disposition::RequeueNow,
            Self::Exhausted { .. } | Self::TransientIo(_) => Disposition::Backoff,
        }
    }

    /// Returns true if the worker will try the key again.
    pub fn is_retryable(&self) -> bool {
        self.disposition() != Disposition::Drop
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
