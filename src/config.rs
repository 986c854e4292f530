//! Engine configuration.
//!
//! Every field has a default matching the deployed simulator, so an empty
//! JSON document is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::propagation::PropagationSettings;
use crate::simulation::ProjectionLimits;

/// Tunables shared by every run against a universe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Propagation depth used when resolving event impacts.
    pub propagation_depth: u32,
    /// Weight kept per propagation hop, in `[0, 1]`.
    pub attenuation: f64,
    /// Yearly revenue growth rate (0.01 = +1 %/year).
    pub default_revenue_rate: f64,
    pub default_horizon_years: u32,
    pub default_start_year: i32,
    /// Start years below this are raised to it.
    pub min_start_year: i32,
    /// Rule probability at or above which an algorithmic rule fires.
    pub rule_trigger_threshold: f64,
    pub limits: ProjectionLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            propagation_depth: 6,
            attenuation: 0.70,
            default_revenue_rate: 0.01,
            default_horizon_years: 10,
            default_start_year: 2025,
            min_start_year: 2025,
            rule_trigger_threshold: 0.5,
            limits: ProjectionLimits::default(),
        }
    }
}

impl EngineConfig {
    /// Parses a JSON configuration document and validates it.
    ///
    /// # Errors
    /// `InvalidConfig` on malformed JSON or out-of-range values.
    pub fn from_json_str(json: &str) -> Result<Self, ValidationError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    ///
    /// # Errors
    /// `InvalidConfig` describing the first offending field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.limits.validate()?;
        let invalid = |reason: String| Err(ValidationError::InvalidConfig { reason });

        if !(0.0..=1.0).contains(&self.attenuation) {
            return invalid(format!("attenuation must be in [0, 1], got {}", self.attenuation));
        }
        if !(0.0..=1.0).contains(&self.rule_trigger_threshold) {
            return invalid(format!(
                "rule_trigger_threshold must be in [0, 1], got {}",
                self.rule_trigger_threshold
            ));
        }
        if !self.default_revenue_rate.is_finite() || self.default_revenue_rate <= -1.0 {
            return invalid("default_revenue_rate must be > -1".to_string());
        }
        if self.propagation_depth > self.limits.max_depth {
            return invalid(format!(
                "propagation_depth {} exceeds max_depth {}",
                self.propagation_depth, self.limits.max_depth
            ));
        }
        if self.default_horizon_years == 0 || self.default_horizon_years > self.limits.max_years {
            return invalid(format!(
                "default_horizon_years must be in [1, {}]",
                self.limits.max_years
            ));
        }
        Ok(())
    }

    /// Propagation settings for impact resolution.
    #[must_use]
    pub fn propagation(&self) -> PropagationSettings {
        PropagationSettings::new(
            i64::from(self.propagation_depth.min(self.limits.max_depth)),
            self.attenuation,
        )
    }

    /// Raises a start year to `min_start_year`.
    #[must_use]
    pub fn effective_start_year(&self, year: i32) -> i32 {
        year.max(self.min_start_year)
    }
}
