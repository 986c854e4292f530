//! Event effects and their per-object interpolation.

use serde::{Deserialize, Serialize};

use crate::event::{EventParams, ParametricAction};
use crate::params::{clamp_unit, finite_or, positive_coefficient};

use super::schedule::ScheduledEvent;

/// The full-strength effect of one scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventEffect {
    pub price_coefficient: f64,
    pub revenue_coefficient: f64,
    /// Additive price shift at full weight.
    pub price_delta: f64,
}

impl Default for EventEffect {
    fn default() -> Self {
        Self {
            price_coefficient: 1.0,
            revenue_coefficient: 1.0,
            price_delta: 0.0,
        }
    }
}

impl EventEffect {
    /// Combines the schedule's coefficients with the event's own action.
    #[must_use]
    pub fn new(entry: &ScheduledEvent, params: &EventParams) -> Self {
        let mut effect = Self {
            price_coefficient: positive_coefficient(entry.price_coefficient),
            revenue_coefficient: positive_coefficient(entry.revenue_coefficient),
            price_delta: 0.0,
        };
        if let EventParams::Parametric(p) = params {
            match p.action {
                ParametricAction::Evolution(v) => {
                    effect.price_coefficient *= positive_coefficient(v);
                    effect.revenue_coefficient *= positive_coefficient(v);
                }
                ParametricAction::PriceMultiplier(v) => {
                    effect.price_coefficient *= positive_coefficient(v);
                }
                ParametricAction::RevenueMultiplier(v) => {
                    effect.revenue_coefficient *= positive_coefficient(v);
                }
                ParametricAction::PriceDelta(v) => effect.price_delta = finite_or(v, 0.0),
            }
        }
        effect
    }

    /// The effect felt by an object of the given total weight.
    ///
    /// `local = 1 + (global - 1) × weight`; the delta is scaled by weight.
    #[must_use]
    pub fn local(&self, total_weight: f64) -> LocalEffect {
        let w = clamp_unit(total_weight);
        LocalEffect {
            price_coefficient: 1.0 + (self.price_coefficient - 1.0) * w,
            revenue_coefficient: 1.0 + (self.revenue_coefficient - 1.0) * w,
            price_delta: self.price_delta * w,
        }
    }
}

/// An effect already scaled for one object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalEffect {
    pub price_coefficient: f64,
    pub revenue_coefficient: f64,
    pub price_delta: f64,
}
