#![cfg(feature = "persistent")]

use std::path::Path;
use std::thread;

use approx::assert_relative_eq;
use rusqlite::Connection;
use whatif::{
    CatalogStore, EngineConfig, EntityId, EntityKind, EventDraft, EventId, EventParams, EventStore,
    GraphStore, ImpactRole, ObjectId, ParametricAction, ParametricParams, ProjectionPlan,
    Schedule, SchemaDescriptor, Scope, Selection, SqliteUniverse, StorageError, UniverseHandle,
};

const CATALOG: &str = "
CREATE TABLE stat_objects (
    id INTEGER PRIMARY KEY,
    Objet TEXT,
    Prix_Moyen_Actuel TEXT,
    Famille TEXT,
    Type TEXT,
    Coef_Aug_Prev REAL
);
INSERT INTO stat_objects VALUES (1, 'cuivre', '100', 'metaux', 'brut', 1.05);
INSERT INTO stat_objects VALUES (2, 'cable', '200', 'metaux', 'fini', 1.0);
INSERT INTO stat_objects VALUES (3, 'ble', '50,5', 'agri', 'brut', 1.0);
INSERT INTO stat_objects VALUES (4, 'farine', '80', 'agri', 'fini', 1.0);
";

fn seed(path: &Path) {
    Connection::open(path).unwrap().execute_batch(CATALOG).unwrap();
}

fn open(path: &Path) -> UniverseHandle {
    UniverseHandle::open_sqlite(path, None, EngineConfig::default()).unwrap()
}

fn edge(a: i64, b: i64) -> whatif::NewEdge {
    whatif::NewEdge::new(EntityKind::Object, ObjectId::new(a), ObjectId::new(b))
}

#[test]
fn catalog_is_read_through_discovered_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("universe.db");
    seed(&path);
    let u = open(&path);

    let wheat = u.catalog().get(ObjectId::new(3)).unwrap().unwrap();
    assert_eq!(wheat.name, "ble");
    assert_relative_eq!(wheat.price_mean, 50.5);
    assert_eq!(wheat.object_type, "brut");
    assert_eq!(
        u.catalog().ids_by_family("agri").unwrap(),
        vec![ObjectId::new(3), ObjectId::new(4)]
    );
    assert_eq!(u.catalog().all_ids().unwrap().len(), 4);
}

#[test]
fn explicit_descriptor_is_checked_against_the_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("universe.db");
    seed(&path);

    let mut schema = SchemaDescriptor::new("stat_objects", "id", "Objet");
    schema.price_mean = Some("Prix_Moyen_Actuel".to_string());
    let store = SqliteUniverse::open(&path, schema.clone()).unwrap();
    assert_eq!(store.schema(), &schema);

    schema.revenue = Some("ca".to_string());
    assert!(matches!(
        SqliteUniverse::open(&path, schema),
        Err(StorageError::Schema(_))
    ));
}

#[test]
fn networks_merge_and_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("universe.db");
    seed(&path);

    {
        let u = open(&path);
        u.attach_edge(edge(1, 2)).unwrap();
        u.attach_edge(edge(3, 4)).unwrap();
        assert_eq!(u.graph().network_ids(EntityKind::Object).unwrap().len(), 2);
        u.attach_edge(edge(2, 3)).unwrap();
    }

    let u = open(&path);
    let graph = u.graph();
    let networks = graph.network_ids(EntityKind::Object).unwrap();
    assert_eq!(networks.len(), 1);
    let members = graph
        .network_summary(EntityKind::Object, networks[0])
        .unwrap()
        .members;
    assert_eq!(members.len(), 4);
    for id in 1..=4 {
        assert_eq!(
            graph.networks_of(EntityKind::Object, EntityId::new(id)).unwrap().len(),
            1
        );
    }

    let newest = graph.list_edges(EntityKind::Object, 1).unwrap();
    assert_eq!(newest[0].source, EntityId::new(2));
    u.detach_edge(EntityKind::Object, newest[0].id).unwrap();
    assert!(graph.neighbors(EntityKind::Object, EntityId::new(2)).unwrap().is_empty());
    assert!(matches!(
        graph.detach(EntityKind::Object, newest[0].id),
        Err(StorageError::EdgeNotFound(_))
    ));
}

#[test]
fn events_round_trip_and_cascade() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("universe.db");
    seed(&path);
    let u = open(&path);

    let params = EventParams::Parametric(ParametricParams {
        scope: Scope::Family("agri".to_string()),
        action: ParametricAction::PriceMultiplier(1.2),
    });
    let drought = u
        .events()
        .insert(
            EventDraft::new("secheresse", params.clone())
                .probability(0.8)
                .description("three dry summers"),
        )
        .unwrap();

    let loaded = u.events().get(drought.id).unwrap().unwrap();
    assert_eq!(loaded.params, params);
    assert_relative_eq!(loaded.probability, 0.8);
    assert_eq!(loaded.description, "three dry summers");

    let mut renamed = loaded.clone();
    renamed.name = "grande secheresse".to_string();
    u.events().update(renamed).unwrap();
    assert_eq!(u.events().list().unwrap()[0].name, "grande secheresse");

    let impacts = u.resolve_impacts(drought.id).unwrap();
    assert_eq!(impacts.len(), 2);
    let cached = u.impacts().for_event(drought.id).unwrap();
    assert!(cached.iter().all(|i| i.role == ImpactRole::Scoped));

    u.delete_event(drought.id).unwrap();
    assert!(u.events().get(drought.id).unwrap().is_none());
    assert!(u.impacts().for_event(drought.id).unwrap().is_empty());
}

#[test]
fn projection_runs_against_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("universe.db");
    seed(&path);
    let u = open(&path);

    u.attach_edge(edge(1, 2)).unwrap();
    let shortage = u
        .events()
        .insert(EventDraft::new("penurie", EventParams::default()))
        .unwrap();
    u.curate_impacts(shortage.id, &[ObjectId::new(1)]).unwrap();

    let plan = ProjectionPlan::new(Selection::family("metaux"), 2025, 3)
        .schedule(Schedule::parse(&format!("{}:0:0.5:1", shortage.id)));
    let report = u.project(&plan).unwrap();

    assert_eq!(report.objects.len(), 2);
    assert_relative_eq!(report.objects[&ObjectId::new(1)].price[0], 50.0, epsilon = 1e-9);
    assert_relative_eq!(report.objects[&ObjectId::new(2)].price[0], 130.0, epsilon = 1e-9);
    assert_relative_eq!(
        report.final_price(ObjectId::new(1)).unwrap(),
        50.0 * 1.05_f64.powi(3),
        epsilon = 1e-9
    );

    let direct = u.impacts().direct_for_event(shortage.id).unwrap();
    assert_eq!(direct.len(), 1);
    assert_eq!(u.impacts().for_event(shortage.id).unwrap().len(), 2);
}

#[test]
fn unreadable_event_row_is_a_warning_not_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("universe.db");
    seed(&path);
    let u = open(&path);

    let shock = u
        .events()
        .insert(EventDraft::new("choc", EventParams::default()))
        .unwrap();
    u.curate_impacts(shock.id, &[ObjectId::new(1)]).unwrap();

    // A rule row written by an older tool, without its condition event.
    Connection::open(&path)
        .unwrap()
        .execute_batch(
            "INSERT INTO evenements (id, nom) VALUES (9, 'regle cassee');
             INSERT INTO parametres_evenements (evenement_id, cle, valeur, ordre)
             VALUES (9, 'type_mode', 'algorithmique', 0);",
        )
        .unwrap();

    let listing = u.events().list_readable().unwrap();
    assert_eq!(listing.events.len(), 1);
    assert_eq!(listing.skipped.len(), 1);
    assert_eq!(listing.skipped[0].id, EventId::new(9));
    assert_eq!(u.events().list().unwrap().len(), 1);
    assert!(matches!(
        u.events().get(EventId::new(9)),
        Err(StorageError::SerializationError(_))
    ));

    let plan = ProjectionPlan::new(Selection::objects([ObjectId::new(1)]), 2025, 1)
        .schedule(Schedule::parse(&format!("{}:0:0.5:1", shock.id)));
    let report = u.project(&plan).unwrap();
    assert_relative_eq!(report.objects[&ObjectId::new(1)].price[0], 50.0, epsilon = 1e-9);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("event 9"));

    let plan = ProjectionPlan::new(Selection::objects([ObjectId::new(1)]), 2025, 1)
        .schedule(Schedule::parse("9:0:0.5:1"));
    let report = u.project(&plan).unwrap();
    assert!(report.applied_events.is_empty());
    assert_eq!(report.warnings.len(), 1);
    assert_relative_eq!(report.objects[&ObjectId::new(1)].price[0], 100.0);
}

#[test]
fn concurrent_writers_keep_one_network_per_entity() {
    const WRITERS: i64 = 4;
    const EDGES_PER_WRITER: i64 = 30;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("universe.db");
    seed(&path);

    // Every writer owns its own connection to the same file.
    let handles: Vec<UniverseHandle> = (0..WRITERS).map(|_| open(&path)).collect();
    let workers: Vec<_> = handles
        .into_iter()
        .enumerate()
        .map(|(w, u)| {
            let w = i64::try_from(w).unwrap();
            thread::spawn(move || {
                for i in 0..EDGES_PER_WRITER {
                    let a = (i * 7 + w) % 40 + 1;
                    let b = (i * 13 + w * 3 + 1) % 40 + 1;
                    if a != b {
                        u.attach_edge(edge(a, b)).unwrap();
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let u = open(&path);
    let graph = u.graph();
    for id in 1..=40 {
        let networks = graph.networks_of(EntityKind::Object, EntityId::new(id)).unwrap();
        assert!(networks.len() <= 1, "entity {id} spans {networks:?}");
    }
    let total: usize = graph
        .network_ids(EntityKind::Object)
        .unwrap()
        .into_iter()
        .map(|n| graph.edges_in_network(EntityKind::Object, n).unwrap().len())
        .sum();
    let expected: usize = (0..WRITERS)
        .flat_map(|w| {
            (0..EDGES_PER_WRITER).filter(move |i| (i * 7 + w) % 40 != (i * 13 + w * 3 + 1) % 40)
        })
        .count();
    assert_eq!(total, expected);
}
