//! Mutable per-object state during a projection run.

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogObject;
use crate::entity::ObjectId;
use crate::event::ObjectField;
use crate::params::{finite_or, floor_zero};

use super::effect::LocalEffect;

/// One simulated object. Never written back to the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectState {
    pub id: ObjectId,
    pub name: String,
    pub price_mean: f64,
    pub price_min: f64,
    pub price_max: f64,
    pub revenue: f64,
    /// Yearly price multiplier, already adjusted by the classifiers.
    pub annual_price_coefficient: f64,
}

impl ObjectState {
    /// Initial state from a catalog row. Negative or non-finite values are
    /// floored at zero.
    #[must_use]
    pub fn from_catalog(object: &CatalogObject) -> Self {
        Self {
            id: object.id,
            name: object.name.clone(),
            price_mean: floor_zero(object.price_mean),
            price_min: floor_zero(object.price_min),
            price_max: floor_zero(object.price_max),
            revenue: floor_zero(object.revenue),
            annual_price_coefficient: object.annual_price_coefficient(),
        }
    }

    /// One year of baseline compounding.
    pub fn apply_growth(&mut self, revenue_rate: f64) {
        let k = self.annual_price_coefficient;
        self.price_mean = floor_zero(self.price_mean * k);
        self.price_min = floor_zero(self.price_min * k);
        self.price_max = floor_zero(self.price_max * k);
        self.revenue = floor_zero(self.revenue * (1.0 + finite_or(revenue_rate, 0.0)));
    }

    /// Applies an event's local effect.
    pub fn apply(&mut self, effect: &LocalEffect) {
        let price = |value: f64| floor_zero(value * effect.price_coefficient + effect.price_delta);
        self.price_mean = price(self.price_mean);
        self.price_min = price(self.price_min);
        self.price_max = price(self.price_max);
        self.revenue = floor_zero(self.revenue * effect.revenue_coefficient);
    }

    /// Current value of an observable field.
    #[must_use]
    pub fn field(&self, field: ObjectField) -> f64 {
        match field {
            ObjectField::PriceMean => self.price_mean,
            ObjectField::PriceMin => self.price_min,
            ObjectField::PriceMax => self.price_max,
            ObjectField::Revenue => self.revenue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn state(price: f64, growth: f64) -> ObjectState {
        ObjectState::from_catalog(
            &CatalogObject::new(ObjectId::new(1), "x", price)
                .with_revenue(50.0)
                .with_growth(growth),
        )
    }

    #[test]
    fn growth_compounds_prices_and_revenue() {
        let mut s = state(100.0, 1.05);
        s.apply_growth(0.01);
        s.apply_growth(0.01);
        assert_relative_eq!(s.price_mean, 100.0 * 1.05 * 1.05, epsilon = 1e-9);
        assert_relative_eq!(s.revenue, 50.0 * 1.01 * 1.01, epsilon = 1e-9);
    }

    #[test]
    fn negative_catalog_values_start_at_zero() {
        let s = ObjectState::from_catalog(&CatalogObject::new(ObjectId::new(1), "x", -4.0));
        assert_eq!(s.price_mean, 0.0);
    }

    #[test]
    fn effect_never_makes_prices_negative() {
        let mut s = state(10.0, 1.0);
        s.apply(&LocalEffect {
            price_coefficient: 1.0,
            revenue_coefficient: 0.5,
            price_delta: -25.0,
        });
        assert_eq!(s.price_mean, 0.0);
        assert_eq!(s.revenue, 25.0);
        assert_eq!(s.field(ObjectField::Revenue), 25.0);
    }
}
