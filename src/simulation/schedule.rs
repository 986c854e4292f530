//! Event schedules: which event arrives in which relative year.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::EventId;
use crate::params::{parse_f64_or, parse_i64_or, positive_coefficient};

/// One scheduled event arrival.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub event: EventId,
    /// Years after the start year (0 = the start year itself).
    pub year_offset: u32,
    pub price_coefficient: f64,
    pub revenue_coefficient: f64,
}

impl ScheduledEvent {
    /// An arrival with neutral coefficients.
    #[must_use]
    pub fn new(event: EventId, year_offset: u32) -> Self {
        Self {
            event,
            year_offset,
            price_coefficient: 1.0,
            revenue_coefficient: 1.0,
        }
    }

    /// Sets both coefficients. Non-positive values become 1.0.
    #[must_use]
    pub fn coefficients(mut self, price: f64, revenue: f64) -> Self {
        self.price_coefficient = positive_coefficient(price);
        self.revenue_coefficient = positive_coefficient(revenue);
        self
    }
}

/// Ordered list of arrivals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    entries: Vec<ScheduledEvent>,
}

impl Schedule {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `eid:year:price_coef:revenue_coef` blocks separated by commas.
    ///
    /// Missing years default to 0 and missing coefficients to 1.0. Blocks
    /// without a positive numeric event id, or with a negative year, are
    /// skipped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut schedule = Self::new();
        for block in text.split(',') {
            let mut parts = block.split(':').map(str::trim);
            let raw_id = parts.next().unwrap_or_default();
            if raw_id.is_empty() || !raw_id.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            let id = parse_i64_or(raw_id, 0);
            if id <= 0 {
                continue;
            }
            let Ok(year) = u32::try_from(parse_i64_or(parts.next().unwrap_or("0"), 0)) else {
                continue;
            };
            let price = parse_f64_or(parts.next().unwrap_or("1"), 1.0);
            let revenue = parse_f64_or(parts.next().unwrap_or("1"), 1.0);
            schedule.push(ScheduledEvent::new(EventId::new(id), year).coefficients(price, revenue));
        }
        schedule
    }

    pub fn push(&mut self, entry: ScheduledEvent) {
        self.entries.push(entry);
    }

    #[must_use]
    pub fn entries(&self) -> &[ScheduledEvent] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Arrivals at exactly `year_offset`, in declaration order.
    pub fn arriving_at(&self, year_offset: u32) -> impl Iterator<Item = &ScheduledEvent> {
        self.entries
            .iter()
            .filter(move |e| e.year_offset == year_offset)
    }
}

impl FromIterator<ScheduledEvent> for Schedule {
    fn from_iter<I: IntoIterator<Item = ScheduledEvent>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(
                f,
                "{}:{}:{}:{}",
                e.event, e.year_offset, e.price_coefficient, e.revenue_coefficient
            )?;
        }
        Ok(())
    }
}
