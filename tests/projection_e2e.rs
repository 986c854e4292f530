use approx::assert_relative_eq;
use whatif::{
    ActivityState, AlgorithmicParams, CatalogObject, Comparison, ConstatCondition, ConstatParams,
    EngineConfig, EntityKind, EventDraft, EventId, EventParams, InMemoryCatalogStore, NewEdge,
    ObjectField, ObjectId, ParametricAction, ParametricParams, ProjectionPlan, QueryParams,
    RuleAction, Schedule, ScheduledEvent, Scope, Selection, UniverseHandle, ValidationError, WhatIfError,
};

fn o(id: i64) -> ObjectId {
    ObjectId::new(id)
}

fn two_objects() -> UniverseHandle {
    let catalog = InMemoryCatalogStore::from_objects([
        CatalogObject::new(o(1), "O1", 100.0)
            .with_growth(1.05)
            .with_revenue(1000.0)
            .with_family("metal"),
        CatalogObject::new(o(2), "O2", 200.0)
            .with_growth(1.00)
            .with_family("metal")
            .with_type("cable"),
    ]);
    UniverseHandle::in_memory(catalog, EngineConfig::default()).unwrap()
}

fn both() -> Selection {
    Selection::objects([o(1), o(2)])
}

fn scheduled(event: EventId, year: u32, price: f64) -> Schedule {
    [ScheduledEvent::new(event, year).coefficients(price, 1.0)]
        .into_iter()
        .collect()
}

#[test]
fn growth_only_baseline_compounds() {
    let u = two_objects();
    let report = u.project(&ProjectionPlan::new(both(), 2025, 10)).unwrap();

    assert_eq!(report.years.len(), 11);
    assert_eq!(report.years.first(), Some(&2025));
    assert_eq!(report.years.last(), Some(&2035));
    assert_relative_eq!(
        report.final_price(o(1)).unwrap(),
        100.0 * 1.05_f64.powi(10),
        max_relative = 1e-12
    );
    assert_relative_eq!(report.final_price(o(2)).unwrap(), 200.0, max_relative = 1e-12);
    assert_relative_eq!(
        report.objects[&o(1)].revenue[10],
        1000.0 * 1.01_f64.powi(10),
        max_relative = 1e-12
    );
    assert_relative_eq!(
        report.price_total[3],
        100.0 * 1.05_f64.powi(3) + 200.0,
        max_relative = 1e-12
    );
    assert!(report.applied_events.is_empty());
    assert!(report.warnings.is_empty());
}

#[test]
fn start_year_is_raised_to_minimum() {
    let u = two_objects();
    let report = u.project(&ProjectionPlan::new(both(), 1999, 1)).unwrap();
    assert_eq!(report.years, vec![2025, 2026]);
}

#[test]
fn event_reaches_neighbor_attenuated() {
    let u = two_objects();
    u.attach_edge(NewEdge::new(EntityKind::Object, o(1), o(2)).weight(1.0)).unwrap();
    let shock = u
        .events()
        .insert(EventDraft::new("shock", EventParams::default()))
        .unwrap();
    assert_eq!(u.curate_impacts(shock.id, &[o(1)]).unwrap(), 1);

    let plan = ProjectionPlan::new(both(), 2025, 2).schedule(scheduled(shock.id, 0, 0.5));
    let report = u.project(&plan).unwrap();

    assert_relative_eq!(report.objects[&o(1)].price[0], 50.0, epsilon = 1e-9);
    assert_relative_eq!(report.objects[&o(2)].price[0], 130.0, epsilon = 1e-9);
    assert_relative_eq!(report.objects[&o(1)].price[1], 52.5, epsilon = 1e-9);
    assert_eq!(report.applied_events.len(), 1);
    assert_eq!(report.applied_events[0].affected, 2);
    assert_eq!(report.applied_events[0].year, 2025);

    let impacts = u.resolve_impacts(shock.id).unwrap();
    assert_eq!(impacts.get(o(2)).unwrap().level, 1);
    assert_relative_eq!(impacts.get(o(2)).unwrap().weight, 0.7);
}

#[test]
fn interpolation_boundaries() {
    let u = two_objects();
    let shock = u
        .events()
        .insert(EventDraft::new("shock", EventParams::default()))
        .unwrap();
    u.curate_impacts(shock.id, &[o(1)]).unwrap();

    let plan = ProjectionPlan::new(both(), 2025, 1).schedule(scheduled(shock.id, 0, 1.8));
    let report = u.project(&plan).unwrap();

    assert_relative_eq!(report.objects[&o(1)].price[0], 180.0, epsilon = 1e-9);
    assert_relative_eq!(report.objects[&o(2)].price[0], 200.0, epsilon = 1e-9);
    assert_eq!(report.applied_events[0].affected, 1);
}

#[test]
fn run_probability_scales_the_weight() {
    let u = two_objects();
    let maybe = u
        .events()
        .insert(EventDraft::new("maybe", EventParams::default()).probability(0.5))
        .unwrap();
    u.curate_impacts(maybe.id, &[o(1)]).unwrap();

    let plan = ProjectionPlan::new(both(), 2025, 1).schedule(scheduled(maybe.id, 0, 0.5));
    let report = u.project(&plan).unwrap();
    assert_relative_eq!(report.objects[&o(1)].price[0], 75.0, epsilon = 1e-9);
}

#[test]
fn empty_list_scope_falls_back_to_whole_catalog() {
    let u = two_objects();
    let params = EventParams::Parametric(ParametricParams {
        scope: Scope::List(Vec::new()),
        action: ParametricAction::PriceMultiplier(0.5),
    });
    let halving = u.events().insert(EventDraft::new("halving", params)).unwrap();

    let impacts = u.resolve_impacts(halving.id).unwrap();
    assert_eq!(impacts.len(), 2);

    let plan = ProjectionPlan::new(both(), 2025, 1).schedule(scheduled(halving.id, 0, 1.0));
    let report = u.project(&plan).unwrap();
    assert_relative_eq!(report.objects[&o(1)].price[0], 50.0, epsilon = 1e-9);
    assert_relative_eq!(report.objects[&o(2)].price[0], 100.0, epsilon = 1e-9);
}

#[test]
fn type_scope_and_price_delta() {
    let u = two_objects();
    let params = EventParams::Parametric(ParametricParams {
        scope: Scope::Type("cable".to_string()),
        action: ParametricAction::PriceDelta(-250.0),
    });
    let crash = u.events().insert(EventDraft::new("crash", params)).unwrap();

    let plan = ProjectionPlan::new(both(), 2025, 1).schedule(scheduled(crash.id, 1, 1.0));
    let report = u.project(&plan).unwrap();
    assert_relative_eq!(report.objects[&o(1)].price[1], 105.0, epsilon = 1e-9);
    assert_eq!(report.objects[&o(2)].price[1], 0.0);
}

#[test]
fn selection_resolution_and_nothing_to_simulate() {
    let u = two_objects();
    let report = u
        .project(&ProjectionPlan::new(Selection::family("metal"), 2025, 1))
        .unwrap();
    assert_eq!(report.objects.len(), 2);

    let report = u
        .project(&ProjectionPlan::new(Selection::object_type("cable"), 2025, 1))
        .unwrap();
    assert_eq!(report.objects.len(), 1);

    for selection in [
        Selection::default(),
        Selection::objects([o(99)]),
        Selection::family("wood"),
    ] {
        let err = u.project(&ProjectionPlan::new(selection, 2025, 1)).unwrap_err();
        assert!(err.is_nothing_to_simulate(), "{err}");
    }
}

#[test]
fn horizon_above_limit_is_rejected() {
    let u = two_objects();
    let err = u.project(&ProjectionPlan::new(both(), 2025, 81)).unwrap_err();
    assert!(matches!(
        err,
        WhatIfError::Validation(ValidationError::LimitExceeded { .. })
    ));
}

#[test]
fn requested_horizon_reaches_the_limit_check() {
    let u = two_objects();
    let query = QueryParams::parse("selection_ids=1&nb_annees=500");
    let plan = whatif::plan_from_params(&query, u.config());
    assert_eq!(plan.years, 500);
    let err = u.project(&plan).unwrap_err();
    assert!(matches!(
        err,
        WhatIfError::Validation(ValidationError::LimitExceeded { max_value: 80, actual_value: 500, .. })
    ));
}

#[test]
fn unknown_scheduled_event_is_a_warning() {
    let u = two_objects();
    let plan = ProjectionPlan::new(both(), 2025, 1).schedule(Schedule::parse("42:0:0.5:1"));
    let report = u.project(&plan).unwrap();
    assert!(report.applied_events.is_empty());
    assert_eq!(report.warnings.len(), 1);
    assert_relative_eq!(report.objects[&o(1)].price[0], 100.0);
}

#[test]
fn algorithmic_rule_deactivates_scheduled_event() {
    let u = two_objects();
    let dormant = u
        .events()
        .insert(EventDraft::new("dormant", EventParams::default()).probability(0.0))
        .unwrap();
    let shock = u
        .events()
        .insert(EventDraft::new("shock", EventParams::default()))
        .unwrap();
    u.curate_impacts(shock.id, &[o(1)]).unwrap();
    u.events()
        .insert(EventDraft::new(
            "veto",
            EventParams::Algorithmic(AlgorithmicParams {
                rule_probability: 1.0,
                condition_event: dormant.id,
                condition_state: ActivityState::Inactive,
                action: RuleAction::Deactivate,
                target_event: shock.id,
                parameter: None,
            }),
        ))
        .unwrap();

    let plan = ProjectionPlan::new(both(), 2025, 1).schedule(scheduled(shock.id, 1, 0.5));
    let report = u.project(&plan).unwrap();

    assert!(report.applied_events.is_empty());
    assert_eq!(report.warnings.len(), 1);
    assert_relative_eq!(report.objects[&o(1)].price[1], 105.0, epsilon = 1e-9);
}

#[test]
fn constat_gates_a_rule_on_object_prices() {
    let u = two_objects();
    let expensive = u
        .events()
        .insert(EventDraft::new(
            "O1 above 110",
            EventParams::Constat(ConstatParams {
                condition: Some(ConstatCondition::Object {
                    objects: vec![o(1)],
                    field: ObjectField::PriceMean,
                    operator: Comparison::Gt,
                    value: 110.0,
                }),
            }),
        ))
        .unwrap();
    let correction = u
        .events()
        .insert(EventDraft::new("correction", EventParams::default()).probability(0.0))
        .unwrap();
    u.curate_impacts(correction.id, &[o(1)]).unwrap();
    u.events()
        .insert(EventDraft::new(
            "trigger",
            EventParams::Algorithmic(AlgorithmicParams {
                rule_probability: 0.9,
                condition_event: expensive.id,
                condition_state: ActivityState::Active,
                action: RuleAction::SetProbability(1.0),
                target_event: correction.id,
                parameter: None,
            }),
        ))
        .unwrap();

    // O1 crosses 110 in year 2 (110.25); the correction is skipped before that.
    let schedule: Schedule = [
        ScheduledEvent::new(correction.id, 1).coefficients(0.5, 1.0),
        ScheduledEvent::new(correction.id, 3).coefficients(0.5, 1.0),
    ]
    .into_iter()
    .collect();
    let report = u
        .project(&ProjectionPlan::new(both(), 2025, 3).schedule(schedule))
        .unwrap();

    assert_eq!(report.applied_events.len(), 1);
    assert_eq!(report.applied_events[0].year, 2028);
    assert_relative_eq!(
        report.objects[&o(1)].price[3],
        100.0 * 1.05_f64.powi(3) * 0.5,
        epsilon = 1e-9
    );
}

#[test]
fn runs_are_deterministic() {
    let u = two_objects();
    u.attach_edge(NewEdge::new(EntityKind::Object, o(2), o(1))).unwrap();
    let shock = u
        .events()
        .insert(EventDraft::new("shock", EventParams::default()))
        .unwrap();
    u.curate_impacts(shock.id, &[o(2)]).unwrap();
    let plan = ProjectionPlan::new(both(), 2025, 5).schedule(scheduled(shock.id, 2, 1.3));

    let first = u.project(&plan).unwrap();
    let second = u.project(&plan).unwrap();
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.objects, second.objects);
    assert_eq!(first.price_total, second.price_total);
}
