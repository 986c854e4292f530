//! Per-run event states and yearly rule evaluation.
//!
//! Event activity is simulation-local: it is seeded from the stored events
//! at the start of a run and never persisted. Each simulated year, constat
//! events are re-evaluated first, then algorithmic rules, both in ascending
//! event id order. Later rules see the effects of earlier ones.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entity::{EventId, ObjectId};
use crate::event::{ActivityState, ConstatCondition, EventParams, EventRecord, RuleAction};
use crate::params::clamp_unit;

use super::state::ObjectState;

/// Run-time state of one event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventState {
    pub active: bool,
    /// Trigger probability in `[0, 1]`.
    pub probability: f64,
}

impl EventState {
    #[must_use]
    pub fn activity(&self) -> ActivityState {
        ActivityState::from_active(self.active)
    }
}

/// A rule that fired during one year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FiredRule {
    pub rule: EventId,
    pub target: EventId,
    pub action: RuleAction,
}

/// Activity map for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventStates {
    states: BTreeMap<EventId, EventState>,
}

impl EventStates {
    /// Seeds every event: active iff its base probability is positive.
    #[must_use]
    pub fn seed(events: &[EventRecord]) -> Self {
        let states = events
            .iter()
            .map(|e| {
                let probability = clamp_unit(e.probability);
                (
                    e.id,
                    EventState {
                        active: probability > 0.0,
                        probability,
                    },
                )
            })
            .collect();
        Self { states }
    }

    #[must_use]
    pub fn get(&self, id: EventId) -> Option<&EventState> {
        self.states.get(&id)
    }

    /// Evaluates every constat, then every algorithmic rule, for one year.
    ///
    /// Unknown event references are reported in `warnings` and skipped.
    pub fn evaluate_year(
        &mut self,
        events: &[EventRecord],
        objects: &BTreeMap<ObjectId, ObjectState>,
        threshold: f64,
        warnings: &mut Vec<String>,
    ) -> Vec<FiredRule> {
        let mut ordered: Vec<&EventRecord> = events.iter().collect();
        ordered.sort_by_key(|e| e.id);

        for event in &ordered {
            let EventParams::Constat(constat) = &event.params else {
                continue;
            };
            let observed = match &constat.condition {
                None => None,
                Some(ConstatCondition::Object {
                    objects: watched,
                    field,
                    operator,
                    value,
                }) => {
                    let present: Vec<&ObjectState> =
                        watched.iter().filter_map(|id| objects.get(id)).collect();
                    if present.is_empty() {
                        None
                    } else {
                        Some(present.iter().all(|s| operator.holds(s.field(*field), *value)))
                    }
                }
                Some(ConstatCondition::Event { target, state }) => match self.states.get(target) {
                    Some(s) => Some(s.activity() == *state),
                    None => {
                        warnings.push(format!(
                            "constat {} observes unknown event {target}",
                            event.id
                        ));
                        None
                    }
                },
            };
            if let (Some(holds), Some(state)) = (observed, self.states.get_mut(&event.id)) {
                state.active = holds;
            }
        }

        let mut fired = Vec::new();
        for event in &ordered {
            let EventParams::Algorithmic(rule) = &event.params else {
                continue;
            };
            let Some(condition) = self.states.get(&rule.condition_event) else {
                warnings.push(format!(
                    "rule {} depends on unknown event {}",
                    event.id, rule.condition_event
                ));
                continue;
            };
            if condition.activity() != rule.condition_state || rule.rule_probability < threshold {
                continue;
            }
            let Some(target) = self.states.get_mut(&rule.target_event) else {
                warnings.push(format!(
                    "rule {} targets unknown event {}",
                    event.id, rule.target_event
                ));
                continue;
            };
            match rule.action {
                RuleAction::Activate => target.active = true,
                RuleAction::Deactivate => target.active = false,
                RuleAction::SetProbability(p) => {
                    target.probability = clamp_unit(p);
                    target.active = target.probability > 0.0;
                }
            }
            debug!(rule = %event.id, target = %rule.target_event, action = rule.action.label(), "rule fired");
            fired.push(FiredRule {
                rule: event.id,
                target: rule.target_event,
                action: rule.action,
            });
        }
        fired
    }
}
