//! Projection limits (resource bounds).

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Hard caps that bound the work of one projection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionLimits {
    /// Longest horizon a run may cover, in years.
    pub max_years: u32,
    /// Deepest propagation a run may request.
    pub max_depth: u32,
    /// Most objects a single run may simulate.
    pub max_objects: usize,
}

impl Default for ProjectionLimits {
    fn default() -> Self {
        Self {
            max_years: 80,
            max_depth: 6,
            max_objects: 10_000,
        }
    }
}

impl ProjectionLimits {
    /// Validate limits.
    ///
    /// # Errors
    /// `InvalidConfig` when a limit is zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_years == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "max_years must be > 0".to_string(),
            });
        }
        if self.max_objects == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "max_objects must be > 0".to_string(),
            });
        }
        Ok(())
    }

    /// Rejects a horizon above `max_years`.
    ///
    /// # Errors
    /// `LimitExceeded`.
    pub fn check_years(&self, years: u32) -> Result<(), ValidationError> {
        if years > self.max_years {
            return Err(ValidationError::LimitExceeded {
                limit: "horizon_years".to_string(),
                max_value: u64::from(self.max_years),
                actual_value: u64::from(years),
            });
        }
        Ok(())
    }

    /// Rejects a selection larger than `max_objects`.
    ///
    /// # Errors
    /// `LimitExceeded`.
    pub fn check_objects(&self, count: usize) -> Result<(), ValidationError> {
        if count > self.max_objects {
            return Err(ValidationError::LimitExceeded {
                limit: "objects".to_string(),
                max_value: self.max_objects as u64,
                actual_value: count as u64,
            });
        }
        Ok(())
    }
}
