//! Events and their typed parameters.
//!
//! Events are persisted as metadata plus an ordered key/value parameter bag.
//! The bag is parsed once, at the storage boundary, into [`EventParams`]; the
//! engine only ever matches on the typed form.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{EventId, ObjectId};
use crate::error::ValidationError;
use crate::params::{clamp_unit, format_id_list, parse_f64_or, parse_id_list, parse_i64_or};

/// Ordered key/value pairs as stored in the parameter table.
pub type ParamBag = Vec<(String, String)>;

/// Whether an event is on or off during a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    #[default]
    Active,
    Inactive,
}

impl ActivityState {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "actif",
            Self::Inactive => "inactif",
        }
    }

    /// Parses `actif` / `inactif`; anything else is `Active`.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "inactif" | "inactive" => Self::Inactive,
            _ => Self::Active,
        }
    }

    #[must_use]
    pub const fn from_active(active: bool) -> Self {
        if active {
            Self::Active
        } else {
            Self::Inactive
        }
    }
}

/// Numeric object field a constat can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectField {
    PriceMean,
    PriceMin,
    PriceMax,
    Revenue,
}

impl ObjectField {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::PriceMean => "prix_moyen",
            Self::PriceMin => "prix_min",
            Self::PriceMax => "prix_max",
            Self::Revenue => "ca",
        }
    }

    /// Parses a field label, accepting the catalog column spellings.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "prix_moyen" | "prix_moyen_actuel" | "price_mean" => Some(Self::PriceMean),
            "prix_min" | "price_min" => Some(Self::PriceMin),
            "prix_max" | "price_max" => Some(Self::PriceMax),
            "ca" | "ca_2025_2035_mdeur" | "revenue" => Some(Self::Revenue),
            _ => None,
        }
    }
}

/// Comparison operator of an object constat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "=",
            Self::Ne => "!=",
        }
    }

    #[must_use]
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.trim() {
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "=" | "==" => Some(Self::Eq),
            "!=" | "<>" => Some(Self::Ne),
            _ => None,
        }
    }

    /// Evaluates `lhs <op> rhs`. Equality uses a small absolute tolerance.
    #[must_use]
    pub fn holds(self, lhs: f64, rhs: f64) -> bool {
        const EPS: f64 = 1e-9;
        match self {
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
            Self::Eq => (lhs - rhs).abs() <= EPS,
            Self::Ne => (lhs - rhs).abs() > EPS,
        }
    }
}

/// What a constat observes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "on", rename_all = "snake_case")]
pub enum ConstatCondition {
    /// Every listed object satisfies `field <operator> value`.
    Object {
        objects: Vec<ObjectId>,
        field: ObjectField,
        operator: Comparison,
        value: f64,
    },
    /// Another event is in the given state.
    Event {
        target: EventId,
        state: ActivityState,
    },
}

/// Observation / condition event (Ec).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConstatParams {
    /// `None` for a bare event with no declared condition.
    pub condition: Option<ConstatCondition>,
}

/// Which objects a parametric event targets.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "scope", content = "value", rename_all = "snake_case")]
pub enum Scope {
    #[default]
    All,
    Family(String),
    Type(String),
    /// An empty list degrades to `All` when resolved.
    List(Vec<ObjectId>),
}

impl Scope {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::All => "tout",
            Self::Family(_) => "famille",
            Self::Type(_) => "type",
            Self::List(_) => "liste",
        }
    }

    /// Collapses an empty explicit list into `All`.
    #[must_use]
    pub fn normalized(self) -> Self {
        match self {
            Self::List(ids) if ids.is_empty() => Self::All,
            other => other,
        }
    }
}

/// Numeric effect of a parametric event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "value", rename_all = "snake_case")]
pub enum ParametricAction {
    /// Multiplies both price and revenue coefficients.
    Evolution(f64),
    /// Multiplies the price coefficient only.
    PriceMultiplier(f64),
    /// Adds a price delta, scaled by the object's total weight.
    PriceDelta(f64),
    /// Multiplies the revenue coefficient only.
    RevenueMultiplier(f64),
}

impl Default for ParametricAction {
    fn default() -> Self {
        Self::Evolution(1.0)
    }
}

impl ParametricAction {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Evolution(_) => "coef_evolution",
            Self::PriceMultiplier(_) => "mult_prix_moyen",
            Self::PriceDelta(_) => "delta_prix_moyen",
            Self::RevenueMultiplier(_) => "mult_CA",
        }
    }

    #[must_use]
    pub const fn value(&self) -> f64 {
        match self {
            Self::Evolution(v)
            | Self::PriceMultiplier(v)
            | Self::PriceDelta(v)
            | Self::RevenueMultiplier(v) => *v,
        }
    }

    fn parse(label: &str, value: Option<&str>) -> Self {
        match label.trim() {
            "mult_prix_moyen" => Self::PriceMultiplier(value.map_or(1.0, |v| parse_f64_or(v, 1.0))),
            "delta_prix_moyen" => Self::PriceDelta(value.map_or(0.0, |v| parse_f64_or(v, 0.0))),
            "mult_CA" | "mult_ca" => {
                Self::RevenueMultiplier(value.map_or(1.0, |v| parse_f64_or(v, 1.0)))
            }
            _ => Self::Evolution(value.map_or(1.0, |v| parse_f64_or(v, 1.0))),
        }
    }
}

/// Direct numeric effect event (Ep).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParametricParams {
    pub scope: Scope,
    pub action: ParametricAction,
}

/// Action of an algorithmic rule on its target event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "do", content = "probability", rename_all = "snake_case")]
pub enum RuleAction {
    Activate,
    Deactivate,
    SetProbability(f64),
}

impl RuleAction {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Activate => "activer",
            Self::Deactivate => "desactiver",
            Self::SetProbability(_) => "changer_probabilite",
        }
    }
}

/// Conditional rule event (Ea): "if A is in state S, then act on P".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmicParams {
    /// Probability that the rule fires once its condition holds.
    pub rule_probability: f64,
    pub condition_event: EventId,
    pub condition_state: ActivityState,
    pub action: RuleAction,
    pub target_event: EventId,
    /// Free-form parameter carried along for the UI.
    #[serde(default)]
    pub parameter: Option<String>,
}

/// Typed event parameters, one variant per event kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventParams {
    Constat(ConstatParams),
    Parametric(ParametricParams),
    Algorithmic(AlgorithmicParams),
}

impl Default for EventParams {
    fn default() -> Self {
        Self::Constat(ConstatParams::default())
    }
}

impl EventParams {
    /// Short kind code (`Ec`, `Ep`, `Ea`).
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Constat(_) => "Ec",
            Self::Parametric(_) => "Ep",
            Self::Algorithmic(_) => "Ea",
        }
    }

    const fn mode(&self) -> &'static str {
        match self {
            Self::Constat(_) => "constat",
            Self::Parametric(_) => "parametrique",
            Self::Algorithmic(_) => "algorithmique",
        }
    }

    /// Parses a stored parameter bag into `(base probability, params)`.
    ///
    /// A bag without `type_mode` is classified from the keys it carries; a
    /// bag with none of the known keys is a bare constat.
    ///
    /// # Errors
    /// `InvalidEventParams` when a declared kind lacks a mandatory key.
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<(f64, Self), ValidationError> {
        let get = |key: &str| -> Option<&str> {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        let probability = clamp_unit(get("probabilite").map_or(1.0, |v| parse_f64_or(v, 1.0)));

        let mode = match get("type_mode").map(str::trim) {
            Some(mode) if !mode.is_empty() => mode.to_string(),
            _ if get("si_evenement_id").is_some() => "algorithmique".to_string(),
            _ if get("appliquer_portee").is_some() || get("action").is_some() => {
                "parametrique".to_string()
            }
            _ => "constat".to_string(),
        };

        let params = match mode.as_str() {
            "parametrique" => Self::Parametric(parse_parametric(&get)?),
            "algorithmique" => Self::Algorithmic(parse_algorithmic(&get)?),
            "constat" => Self::Constat(parse_constat(&get)?),
            other => {
                return Err(ValidationError::InvalidEventParams {
                    reason: format!("unknown type_mode '{other}'"),
                })
            }
        };

        Ok((probability, params))
    }

    /// Serializes into the stored parameter bag, probability first.
    #[must_use]
    pub fn to_pairs(&self, probability: f64) -> ParamBag {
        let mut out: ParamBag = vec![
            ("probabilite".into(), clamp_unit(probability).to_string()),
            ("type_mode".into(), self.mode().into()),
        ];
        match self {
            Self::Constat(c) => match &c.condition {
                None => {}
                Some(ConstatCondition::Object {
                    objects,
                    field,
                    operator,
                    value,
                }) => {
                    out.push(("type_constat".into(), "objet".into()));
                    out.push(("objets_ids".into(), format_id_list(objects.iter().copied())));
                    out.push(("champ".into(), field.label().into()));
                    out.push(("operateur".into(), operator.symbol().into()));
                    out.push(("valeur".into(), value.to_string()));
                }
                Some(ConstatCondition::Event { target, state }) => {
                    out.push(("type_constat".into(), "evenement".into()));
                    out.push(("evenement_cible_id".into(), target.to_string()));
                    out.push(("etat".into(), state.label().into()));
                }
            },
            Self::Parametric(p) => {
                out.push(("appliquer_portee".into(), p.scope.label().into()));
                match &p.scope {
                    Scope::All => {}
                    Scope::Family(f) => out.push(("appliquer_famille".into(), f.clone())),
                    Scope::Type(t) => out.push(("appliquer_type".into(), t.clone())),
                    Scope::List(ids) => out.push((
                        "appliquer_objets_ids".into(),
                        format_id_list(ids.iter().copied()),
                    )),
                }
                out.push(("action".into(), p.action.label().into()));
                out.push(("valeur".into(), p.action.value().to_string()));
            }
            Self::Algorithmic(a) => {
                out.push(("regle_probabilite".into(), a.rule_probability.to_string()));
                if let Some(u) = &a.parameter {
                    out.push(("parametre_u".into(), u.clone()));
                }
                out.push(("si_evenement_id".into(), a.condition_event.to_string()));
                out.push(("si_etat".into(), a.condition_state.label().into()));
                out.push(("faire_type".into(), a.action.label().into()));
                out.push(("faire_evenement_id".into(), a.target_event.to_string()));
                if let RuleAction::SetProbability(p) = a.action {
                    out.push(("faire_probabilite".into(), p.to_string()));
                }
            }
        }
        out
    }
}

fn required_event_id<'a>(
    get: &impl Fn(&str) -> Option<&'a str>,
    key: &str,
) -> Result<EventId, ValidationError> {
    let raw = get(key).map(str::trim).unwrap_or_default();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::InvalidEventParams {
            reason: format!("'{key}' must be an event id (got '{raw}')"),
        });
    }
    Ok(EventId::new(parse_i64_or(raw, 0)))
}

fn parse_constat<'a>(
    get: &impl Fn(&str) -> Option<&'a str>,
) -> Result<ConstatParams, ValidationError> {
    let condition = match get("type_constat").map(str::trim) {
        Some("objet") => {
            let objects: Vec<ObjectId> = parse_id_list(get("objets_ids").unwrap_or_default())
                .into_iter()
                .map(ObjectId::new)
                .collect();
            if objects.is_empty() {
                return Err(ValidationError::InvalidEventParams {
                    reason: "object constat needs at least one object".to_string(),
                });
            }
            let field_label = get("champ").unwrap_or("prix_moyen");
            let field = ObjectField::from_label(field_label).ok_or_else(|| {
                ValidationError::InvalidEventParams {
                    reason: format!("unknown constat field '{field_label}'"),
                }
            })?;
            let op_symbol = get("operateur").unwrap_or("<");
            let operator = Comparison::from_symbol(op_symbol).ok_or_else(|| {
                ValidationError::InvalidEventParams {
                    reason: format!("unknown constat operator '{op_symbol}'"),
                }
            })?;
            let value = get("valeur").map_or(0.0, |v| parse_f64_or(v, 0.0));
            Some(ConstatCondition::Object {
                objects,
                field,
                operator,
                value,
            })
        }
        Some("evenement") => Some(ConstatCondition::Event {
            target: required_event_id(get, "evenement_cible_id")?,
            state: ActivityState::from_label(get("etat").unwrap_or_default()),
        }),
        _ => None,
    };
    Ok(ConstatParams { condition })
}

fn parse_parametric<'a>(
    get: &impl Fn(&str) -> Option<&'a str>,
) -> Result<ParametricParams, ValidationError> {
    let scope = match get("appliquer_portee").map(str::trim).unwrap_or("tout") {
        "famille" => {
            let family = get("appliquer_famille").unwrap_or_default().trim();
            if family.is_empty() {
                return Err(ValidationError::InvalidEventParams {
                    reason: "family scope without a family".to_string(),
                });
            }
            Scope::Family(family.to_string())
        }
        "type" => {
            let object_type = get("appliquer_type").unwrap_or_default().trim();
            if object_type.is_empty() {
                return Err(ValidationError::InvalidEventParams {
                    reason: "type scope without a type".to_string(),
                });
            }
            Scope::Type(object_type.to_string())
        }
        "liste" => Scope::List(
            parse_id_list(get("appliquer_objets_ids").unwrap_or_default())
                .into_iter()
                .map(ObjectId::new)
                .collect(),
        ),
        _ => Scope::All,
    };
    let action = ParametricAction::parse(get("action").unwrap_or("coef_evolution"), get("valeur"));
    Ok(ParametricParams { scope, action })
}

fn parse_algorithmic<'a>(
    get: &impl Fn(&str) -> Option<&'a str>,
) -> Result<AlgorithmicParams, ValidationError> {
    let rule_probability =
        clamp_unit(get("regle_probabilite").map_or(1.0, |v| parse_f64_or(v, 1.0)));
    let condition_event = required_event_id(get, "si_evenement_id")?;
    let condition_state = ActivityState::from_label(get("si_etat").unwrap_or_default());
    let target_event = required_event_id(get, "faire_evenement_id")?;
    let action = match get("faire_type").map(str::trim).unwrap_or("activer") {
        "desactiver" => RuleAction::Deactivate,
        "changer_probabilite" => RuleAction::SetProbability(clamp_unit(
            get("faire_probabilite").map_or(1.0, |v| parse_f64_or(v, 1.0)),
        )),
        _ => RuleAction::Activate,
    };
    let parameter = get("parametre_u")
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string);
    Ok(AlgorithmicParams {
        rule_probability,
        condition_event,
        condition_state,
        action,
        target_event,
        parameter,
    })
}

/// An event to be inserted; the store assigns its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    pub name: String,
    /// Shown in simulation pickers (`true`) or internal (`false`).
    pub visible: bool,
    pub description: String,
    pub probability: f64,
    pub params: EventParams,
}

impl EventDraft {
    #[must_use]
    pub fn new(name: impl Into<String>, params: EventParams) -> Self {
        Self {
            name: name.into(),
            visible: true,
            description: String::new(),
            probability: 1.0,
            params,
        }
    }

    #[must_use]
    pub fn probability(mut self, probability: f64) -> Self {
        self.probability = clamp_unit(probability);
        self
    }

    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// # Errors
    /// `MissingField` when the name is blank.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "name".to_string(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn into_record(self, id: EventId, created_at: DateTime<Utc>) -> EventRecord {
        EventRecord {
            id,
            name: self.name,
            visible: self.visible,
            description: self.description,
            probability: clamp_unit(self.probability),
            params: self.params,
            created_at,
        }
    }
}

/// A stored event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    pub name: String,
    pub visible: bool,
    #[serde(default)]
    pub description: String,
    /// Base trigger probability in `[0, 1]`.
    pub probability: f64,
    pub params: EventParams,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{} ({})", self.name, self.id, self.params.code())
    }
}
