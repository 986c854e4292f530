//! Building engine requests from loosely-typed query parameters.
//!
//! Values arrive as strings from the surrounding web layer. Unparsable
//! values fall back to documented defaults; only genuinely missing
//! mandatory input is reported.

use std::collections::BTreeMap;

use url::form_urlencoded;

use crate::config::EngineConfig;
use crate::entity::{EntityId, EntityKind, ObjectId};
use crate::error::ValidationError;
use crate::event::{EventDraft, EventParams};
use crate::graph::{Direction, EdgeType, NewEdge};
use crate::params::{parse_f64_or, parse_flag, parse_i64_or, parse_id_list};
use crate::simulation::{ProjectionPlan, Schedule, Selection};

/// A bag of query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    values: BTreeMap<String, String>,
}

impl QueryParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an `application/x-www-form-urlencoded` query string.
    /// A repeated key keeps its first value.
    #[must_use]
    pub fn parse(query: &str) -> Self {
        let mut params = Self::new();
        let query = query.strip_prefix('?').unwrap_or(query);
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            params
                .values
                .entry(key.into_owned())
                .or_insert_with(|| value.into_owned());
        }
        params
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Trimmed value, `None` when absent or blank.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Every pair, keys ascending, values untrimmed.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |params, (k, v)| params.with(k, v))
    }
}

/// Edges requested from one source to a list of targets.
///
/// Keys: `type_applicable` (`O`/`E`, default `O`), `source_id`,
/// `cibles_ids` (or a single `cible_id`), `implication` (default `->`),
/// `type_lien` (default `associe`), `poids` (default 1.0), `commentaire`.
/// Targets equal to the source are dropped.
///
/// # Errors
/// `MissingField` when there is no numeric source or no usable target.
pub fn edges_from_params(params: &QueryParams) -> Result<Vec<NewEdge>, ValidationError> {
    let kind = params
        .get("type_applicable")
        .and_then(EntityKind::from_code)
        .unwrap_or(EntityKind::Object);

    let source = params
        .get("source_id")
        .filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
        .map(|s| EntityId::new(parse_i64_or(s, 0)))
        .ok_or_else(|| ValidationError::MissingField {
            field: "source_id".to_string(),
        })?;

    let raw_targets = params
        .get("cibles_ids")
        .or_else(|| params.get("cible_id"))
        .unwrap_or_default();
    let targets: Vec<EntityId> = parse_id_list(raw_targets)
        .into_iter()
        .map(EntityId::new)
        .filter(|t| *t != source)
        .collect();
    if targets.is_empty() {
        return Err(ValidationError::MissingField {
            field: "cibles_ids".to_string(),
        });
    }

    let direction = Direction::from_symbol(params.get("implication").unwrap_or("->"));
    let edge_type = EdgeType::from_label(params.get("type_lien").unwrap_or("associe"));
    let weight = parse_f64_or(params.get("poids").unwrap_or("1.0"), 1.0);
    let comment = params.get("commentaire").unwrap_or_default();

    Ok(targets
        .into_iter()
        .map(|target| {
            NewEdge::new(kind, source, target)
                .direction(direction)
                .edge_type(edge_type.clone())
                .weight(weight)
                .comment(comment)
        })
        .collect())
}

/// An event definition from a creation form.
///
/// `nom` is mandatory; `description` and `afficher_simulation` (visible
/// unless a falsy flag is sent) are optional. Every other key goes to the
/// event's parameter bag, see [`EventParams::from_pairs`].
///
/// # Errors
/// `MissingField` without a name; `InvalidEventParams` for a bag that does
/// not describe a valid event.
pub fn event_from_params(params: &QueryParams) -> Result<EventDraft, ValidationError> {
    let name = params.get("nom").ok_or_else(|| ValidationError::MissingField {
        field: "nom".to_string(),
    })?;

    let bag: Vec<(String, String)> = params
        .iter()
        .filter(|(k, _)| !matches!(*k, "nom" | "description" | "afficher_simulation"))
        .map(|(k, v)| (k.to_string(), v.trim().to_string()))
        .collect();
    let (probability, event_params) = EventParams::from_pairs(&bag)?;

    let mut draft = EventDraft::new(name, event_params)
        .probability(probability)
        .description(params.get("description").unwrap_or_default());
    if params.get("afficher_simulation").is_some_and(|v| !parse_flag(v)) {
        draft = draft.hidden();
    }
    Ok(draft)
}

/// A projection plan from query parameters.
///
/// Keys: `selection_ids`, `famille`, `type`, `nb_annees` (default from the
/// config, raised to 1; a horizon above the limit is rejected when the plan
/// runs), `annee_depart` (default from the
/// config, raised to the minimum start year), `planning` (schedule string).
/// Selection emptiness is checked when the plan runs.
#[must_use]
pub fn plan_from_params(params: &QueryParams, config: &EngineConfig) -> ProjectionPlan {
    let selection = Selection {
        objects: parse_id_list(params.get("selection_ids").unwrap_or_default())
            .into_iter()
            .map(ObjectId::new)
            .collect(),
        family: params.get("famille").map(str::to_string),
        object_type: params.get("type").map(str::to_string),
    };

    let years = params
        .get("nb_annees")
        .map_or(i64::from(config.default_horizon_years), |s| {
            parse_i64_or(s, i64::from(config.default_horizon_years))
        })
        .clamp(1, i64::from(u32::MAX));
    let start_year = params
        .get("annee_depart")
        .map_or(i64::from(config.default_start_year), |s| {
            parse_i64_or(s, i64::from(config.default_start_year))
        })
        .clamp(i64::from(i32::MIN), i64::from(i32::MAX));

    ProjectionPlan::new(
        selection,
        config.effective_start_year(i32::try_from(start_year).unwrap_or(config.default_start_year)),
        u32::try_from(years).unwrap_or(config.default_horizon_years),
    )
    .schedule(Schedule::parse(params.get("planning").unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_string_is_parsed() {
        let q = QueryParams::parse("?nom=Or+fin&poids=&x=1&x=2");
        assert_eq!(q.get("nom"), Some("Or fin"));
        assert_eq!(q.get("poids"), None);
        assert_eq!(q.get("x"), Some("1"));
    }

    #[test]
    fn percent_encoded_form_values_are_decoded() {
        let q = QueryParams::parse(
            "selection_ids=1%2C2&planning=3%3A0%3A0.5%3A1%2C7%3A2&nom=Or%20fin&type=c%C3%A2ble",
        );
        assert_eq!(q.get("nom"), Some("Or fin"));
        assert_eq!(q.get("type"), Some("c\u{e2}ble"));

        let plan = plan_from_params(&q, &EngineConfig::default());
        assert_eq!(plan.selection.objects, vec![ObjectId::new(1), ObjectId::new(2)]);
        let entries = plan.schedule.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event, crate::entity::EventId::new(3));
        assert_eq!(entries[0].price_coefficient, 0.5);
        assert_eq!(entries[1].year_offset, 2);
    }

    #[test]
    fn edges_use_defaults_and_drop_self_targets() {
        let q: QueryParams = [("source_id", "3"), ("cibles_ids", "4, 3,5,x"), ("poids", "abc")]
            .into_iter()
            .collect();
        let edges = edges_from_params(&q).unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].target, EntityId::new(4));
        assert_eq!(edges[0].kind, EntityKind::Object);
        assert_eq!(edges[0].weight, 1.0);
        assert_eq!(edges[0].direction, Direction::Implication);
        assert_eq!(edges[1].edge_type, EdgeType::Association);
    }

    #[test]
    fn edges_need_source_and_target() {
        let q: QueryParams = [("cibles_ids", "4")].into_iter().collect();
        assert!(matches!(
            edges_from_params(&q),
            Err(ValidationError::MissingField { field }) if field == "source_id"
        ));
        let q: QueryParams = [("source_id", "4"), ("cibles_ids", "4")].into_iter().collect();
        assert!(edges_from_params(&q).is_err());
    }

    #[test]
    fn event_edges_with_equivalence() {
        let q: QueryParams = [
            ("type_applicable", "E"),
            ("source_id", "1"),
            ("cible_id", "2"),
            ("implication", "<->"),
            ("poids", "0,5"),
        ]
        .into_iter()
        .collect();
        let edges = edges_from_params(&q).unwrap();
        assert_eq!(edges[0].kind, EntityKind::Event);
        assert_eq!(edges[0].direction, Direction::Equivalence);
        assert_eq!(edges[0].weight, 0.5);
    }

    #[test]
    fn event_form_builds_a_parametric_draft() {
        let q = QueryParams::parse(
            "nom=Secheresse&description=trois+ans&afficher_simulation=0&probabilite=0,4\
             &appliquer_portee=famille&appliquer_famille=agri&action=mult_prix_moyen&valeur=1,3",
        );
        let draft = event_from_params(&q).unwrap();
        assert_eq!(draft.name, "Secheresse");
        assert_eq!(draft.description, "trois ans");
        assert!(!draft.visible);
        assert_eq!(draft.probability, 0.4);
        match draft.params {
            EventParams::Parametric(p) => {
                assert_eq!(p.scope, crate::event::Scope::Family("agri".to_string()));
                assert_eq!(p.action, crate::event::ParametricAction::PriceMultiplier(1.3));
            }
            other => panic!("unexpected params {other:?}"),
        }
    }

    #[test]
    fn event_form_needs_a_name_and_valid_rule() {
        let q = QueryParams::parse("description=x");
        assert!(matches!(
            event_from_params(&q),
            Err(ValidationError::MissingField { field }) if field == "nom"
        ));
        let q = QueryParams::parse("nom=r&type_mode=algorithmique&si_evenement_id=x");
        assert!(matches!(
            event_from_params(&q),
            Err(ValidationError::InvalidEventParams { .. })
        ));
        let draft = event_from_params(&QueryParams::parse("nom=bare&afficher_simulation=on")).unwrap();
        assert!(draft.visible);
        assert_eq!(draft.params, EventParams::default());
    }

    #[test]
    fn plan_defaults_and_lower_bounds() {
        let config = EngineConfig::default();
        let plan = plan_from_params(&QueryParams::new(), &config);
        assert_eq!(plan.years, 10);
        assert_eq!(plan.start_year, 2025);
        assert!(plan.schedule.is_empty());

        let q: QueryParams = [
            ("nb_annees", "500"),
            ("annee_depart", "1990"),
            ("selection_ids", "1,2"),
            ("planning", "4:1:0.9:1"),
        ]
        .into_iter()
        .collect();
        let plan = plan_from_params(&q, &config);
        assert_eq!(plan.years, 500);
        assert_eq!(plan.start_year, 2025);
        assert_eq!(plan.selection.objects.len(), 2);
        assert_eq!(plan.schedule.entries().len(), 1);

        let q: QueryParams = [("nb_annees", "-3"), ("annee_depart", "2031")].into_iter().collect();
        let plan = plan_from_params(&q, &config);
        assert_eq!(plan.years, 1);
        assert_eq!(plan.start_year, 2031);
    }
}
