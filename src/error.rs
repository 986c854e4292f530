//! Error types for whatif.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! the specific condition and degrade gracefully (for example by asking the
//! user to "choose at least one object") instead of failing the request.

use thiserror::Error;

use crate::entity::{EntityId, EventId};
use crate::storage::StorageError;

/// Validation errors that occur while checking caller input.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Nothing to simulate: choose at least one object, a family or a type")]
    NothingToSimulate,

    #[error("Edge would be a self-loop on entity {id}")]
    SelfLoop {
        id: EntityId,
    },

    #[error("Edge weight {value} is not a finite number")]
    InvalidWeight {
        value: f64,
    },

    #[error("Unknown event: {id}")]
    UnknownEvent {
        id: EventId,
    },

    #[error("Invalid event parameters: {reason}")]
    InvalidEventParams {
        reason: String,
    },

    #[error("Invalid catalog schema: {reason}")]
    InvalidSchema {
        reason: String,
    },

    #[error("Invalid engine configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },

    #[error("Limit exceeded: {limit} (max: {max_value}, actual: {actual_value})")]
    LimitExceeded {
        limit: String,
        max_value: u64,
        actual_value: u64,
    },

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },
}

/// Execution errors that occur while running an operation.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Top-level error type for whatif.
#[derive(Debug, Error)]
pub enum WhatIfError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),
}

impl From<StorageError> for WhatIfError {
    fn from(err: StorageError) -> Self {
        Self::Execution(ExecutionError::Storage(err))
    }
}

impl WhatIfError {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if the caller should report "nothing to simulate".
    #[must_use]
    pub const fn is_nothing_to_simulate(&self) -> bool {
        matches!(self, Self::Validation(ValidationError::NothingToSimulate))
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Execution(ExecutionError::Storage(StorageError::ConnectionError(_)))
        )
    }
}

/// Result type alias for whatif operations.
pub type WhatIfResult<T> = Result<T, WhatIfError>;
