//! Year-by-year deterministic projection.
//!
//! For every simulated year `t` in `0..=years`: compound baseline growth
//! (from `t = 1`), re-evaluate event rules, apply the events scheduled at
//! `t`, then record per-object and aggregate values. Impacts of an event are
//! resolved (and propagated) once per run, before any state they affect is
//! mutated.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entity::{EventId, ObjectId};
use crate::error::{ValidationError, WhatIfResult};
use crate::event::EventRecord;
use crate::impact::{resolve_impacts, ImpactSet};
use crate::params::{clamp_unit, round_cents};
use crate::universe::UniverseHandle;

use super::effect::EventEffect;
use super::rules::EventStates;
use super::schedule::Schedule;
use super::selection::Selection;
use super::state::ObjectState;

/// Identifier of one projection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a new random run ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What to project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionPlan {
    pub selection: Selection,
    /// Raised to the configured minimum start year.
    pub start_year: i32,
    /// Horizon in years; the run records `years + 1` points.
    pub years: u32,
    #[serde(default)]
    pub schedule: Schedule,
}

impl ProjectionPlan {
    #[must_use]
    pub fn new(selection: Selection, start_year: i32, years: u32) -> Self {
        Self {
            selection,
            start_year,
            years,
            schedule: Schedule::new(),
        }
    }

    #[must_use]
    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }
}

/// Yearly values of one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSeries {
    pub name: String,
    pub price: Vec<f64>,
    pub revenue: Vec<f64>,
}

/// An event applied during the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedEvent {
    pub year: i32,
    pub event: EventId,
    pub name: String,
    /// Run probability used as trigger weight.
    pub probability: f64,
    /// Simulated objects with a non-zero total weight.
    pub affected: usize,
}

/// Output of one run. All series are indexed like `years`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionReport {
    pub run_id: RunId,
    pub years: Vec<i32>,
    pub price_total: Vec<f64>,
    pub revenue_total: Vec<f64>,
    pub objects: BTreeMap<ObjectId, ObjectSeries>,
    pub applied_events: Vec<AppliedEvent>,
    pub warnings: Vec<String>,
}

impl ProjectionReport {
    /// A copy with every value rounded to cents, for display.
    #[must_use]
    pub fn rounded(&self) -> Self {
        let round = |v: &[f64]| v.iter().copied().map(round_cents).collect::<Vec<_>>();
        Self {
            price_total: round(&self.price_total),
            revenue_total: round(&self.revenue_total),
            objects: self
                .objects
                .iter()
                .map(|(id, s)| {
                    (
                        *id,
                        ObjectSeries {
                            name: s.name.clone(),
                            price: round(&s.price),
                            revenue: round(&s.revenue),
                        },
                    )
                })
                .collect(),
            ..self.clone()
        }
    }

    /// Final-year price of one object.
    #[must_use]
    pub fn final_price(&self, object: ObjectId) -> Option<f64> {
        self.objects.get(&object)?.price.last().copied()
    }
}

fn push_unique(warnings: &mut Vec<String>, message: String) {
    if !warnings.contains(&message) {
        warn!("{message}");
        warnings.push(message);
    }
}

fn skipped_event_warning(id: EventId, reason: &str) -> String {
    format!("event {id} has unreadable parameters and was ignored: {reason}")
}

/// Runs a projection.
///
/// # Errors
/// - `NothingToSimulate`: the selection resolves to no catalog object
/// - `LimitExceeded`: horizon or object count above the configured caps
/// - storage errors
pub fn project(universe: &UniverseHandle, plan: &ProjectionPlan) -> WhatIfResult<ProjectionReport> {
    let config = universe.config();
    config.limits.check_years(plan.years)?;

    let ids = plan.selection.resolve(universe.catalog())?;
    config.limits.check_objects(ids.len())?;
    let catalog_rows = universe.catalog().get_many(&ids)?;
    if catalog_rows.is_empty() {
        return Err(ValidationError::NothingToSimulate.into());
    }
    let mut objects: BTreeMap<ObjectId, ObjectState> = catalog_rows
        .iter()
        .map(|o| (o.id, ObjectState::from_catalog(o)))
        .collect();

    let run_id = RunId::new();
    let start_year = config.effective_start_year(plan.start_year);
    info!(
        %run_id,
        objects = objects.len(),
        start_year,
        years = plan.years,
        scheduled = plan.schedule.entries().len(),
        "projection started"
    );

    let listing = universe.events().list_readable()?;
    let skipped: HashMap<EventId, &str> = listing
        .skipped
        .iter()
        .map(|s| (s.id, s.reason.as_str()))
        .collect();
    let events: Vec<EventRecord> = listing.events;
    let by_id: HashMap<EventId, &EventRecord> = events.iter().map(|e| (e.id, e)).collect();
    let mut states = EventStates::seed(&events);
    let mut impacts: HashMap<EventId, ImpactSet> = HashMap::new();
    let settings = config.propagation();

    let mut report = ProjectionReport {
        run_id,
        years: Vec::with_capacity(plan.years as usize + 1),
        price_total: Vec::with_capacity(plan.years as usize + 1),
        revenue_total: Vec::with_capacity(plan.years as usize + 1),
        objects: objects
            .values()
            .map(|s| {
                (
                    s.id,
                    ObjectSeries {
                        name: s.name.clone(),
                        price: Vec::new(),
                        revenue: Vec::new(),
                    },
                )
            })
            .collect(),
        applied_events: Vec::new(),
        warnings: Vec::new(),
    };
    for skip in &listing.skipped {
        push_unique(&mut report.warnings, skipped_event_warning(skip.id, &skip.reason));
    }

    for t in 0..=plan.years {
        let year = start_year.saturating_add(i32::try_from(t).unwrap_or(i32::MAX));
        if t > 0 {
            for state in objects.values_mut() {
                state.apply_growth(config.default_revenue_rate);
            }
        }

        let mut rule_warnings = Vec::new();
        let fired = states.evaluate_year(
            &events,
            &objects,
            config.rule_trigger_threshold,
            &mut rule_warnings,
        );
        for message in rule_warnings {
            push_unique(&mut report.warnings, message);
        }
        if !fired.is_empty() {
            debug!(%run_id, year, fired = fired.len(), "rules evaluated");
        }

        for entry in plan.schedule.arriving_at(t) {
            let Some(event) = by_id.get(&entry.event) else {
                let message = match skipped.get(&entry.event) {
                    Some(reason) => skipped_event_warning(entry.event, reason),
                    None => format!("scheduled event {} does not exist", entry.event),
                };
                push_unique(&mut report.warnings, message);
                continue;
            };
            let Some(state) = states.get(entry.event).copied() else {
                continue;
            };
            if !state.active {
                push_unique(
                    &mut report.warnings,
                    format!("event {} is inactive in {year} and was skipped", entry.event),
                );
                continue;
            }

            if !impacts.contains_key(&entry.event) {
                let resolved = resolve_impacts(universe, entry.event, &settings)?;
                impacts.insert(entry.event, resolved);
            }
            let weights = impacts
                .get(&entry.event)
                .map(ImpactSet::weights)
                .unwrap_or_default();

            let effect = EventEffect::new(entry, &event.params);
            let mut affected = 0;
            for (id, object) in &mut objects {
                let Some(weight) = weights.get(id) else {
                    continue;
                };
                let total = clamp_unit(weight * state.probability);
                if total > 0.0 {
                    affected += 1;
                }
                object.apply(&effect.local(total));
            }
            debug!(%run_id, year, event = %entry.event, affected, "event applied");
            report.applied_events.push(AppliedEvent {
                year,
                event: entry.event,
                name: event.name.clone(),
                probability: state.probability,
                affected,
            });
        }

        let mut price_total = 0.0;
        let mut revenue_total = 0.0;
        for (id, object) in &objects {
            price_total += object.price_mean;
            revenue_total += object.revenue;
            if let Some(series) = report.objects.get_mut(id) {
                series.price.push(object.price_mean);
                series.revenue.push(object.revenue);
            }
        }
        report.years.push(year);
        report.price_total.push(price_total);
        report.revenue_total.push(revenue_total);
    }

    info!(
        %run_id,
        applied = report.applied_events.len(),
        warnings = report.warnings.len(),
        "projection finished"
    );
    Ok(report)
}
