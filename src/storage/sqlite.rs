//! SQLite storage backend: one database file per universe.
//!
//! The catalog table belongs to the surrounding application and is only read,
//! through the [`SchemaDescriptor`] validated at open time. Graph, event and
//! impact tables are created on first open if they are missing.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use tracing::{debug, info, warn};

use crate::catalog::{
    CatalogField, CatalogObject, SchemaDescriptor, Speculation, UsageFrequency,
    DEFAULT_GROWTH_COEFFICIENT,
};
use crate::entity::{EdgeId, EntityId, EntityKind, EventId, NetworkId, ObjectId};
use crate::error::ValidationError;
use crate::event::{EventDraft, EventParams, EventRecord};
use crate::graph::{Direction, Edge, EdgeType, NewEdge};
use crate::impact::{EventImpact, ImpactRole};
use crate::network::{plan_network, NetworkPlan};
use crate::params::{finite_or, parse_f64_or};
use crate::storage::traits::{
    CatalogStore, EventListing, EventStore, GraphStore, ImpactStore, SkippedEvent, StorageError,
};

const MIGRATIONS: &str = "
CREATE TABLE IF NOT EXISTS reseaux_applicables (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    type_applicable TEXT NOT NULL,
    nom             TEXT,
    date_creation   TEXT
);
CREATE TABLE IF NOT EXISTS liaisons_applicables (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    type_applicable TEXT NOT NULL,
    reseau_id       INTEGER,
    source_id       INTEGER NOT NULL,
    cible_id        INTEGER NOT NULL,
    implication     TEXT NOT NULL DEFAULT '->',
    type_lien       TEXT NOT NULL DEFAULT 'associe',
    poids           REAL NOT NULL DEFAULT 1.0,
    commentaire     TEXT,
    date_creation   TEXT
);
CREATE INDEX IF NOT EXISTS idx_liaisons_source ON liaisons_applicables (type_applicable, source_id);
CREATE INDEX IF NOT EXISTS idx_liaisons_cible ON liaisons_applicables (type_applicable, cible_id);
CREATE INDEX IF NOT EXISTS idx_liaisons_reseau ON liaisons_applicables (type_applicable, reseau_id);
CREATE TABLE IF NOT EXISTS evenements (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    nom                 TEXT NOT NULL,
    type_evenement      TEXT,
    type_detail         TEXT,
    afficher_simulation INTEGER NOT NULL DEFAULT 1,
    description         TEXT,
    date_creation       TEXT
);
CREATE TABLE IF NOT EXISTS parametres_evenements (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    evenement_id INTEGER NOT NULL,
    cle          TEXT NOT NULL,
    valeur       TEXT,
    ordre        INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_parametres_evenement ON parametres_evenements (evenement_id, ordre);
CREATE TABLE IF NOT EXISTS impacts_evenements (
    evenement_id INTEGER NOT NULL,
    objet_id     INTEGER NOT NULL,
    niveau       INTEGER NOT NULL,
    poids        REAL NOT NULL,
    role         TEXT NOT NULL,
    origine_id   INTEGER,
    PRIMARY KEY (evenement_id, objet_id)
);
";

const EDGE_COLUMNS: &str = "id, reseau_id, source_id, cible_id, implication, type_lien, poids, commentaire, date_creation";

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

fn sql_err(err: rusqlite::Error) -> StorageError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen) => {
            StorageError::ConnectionError(err.to_string())
        }
        _ => StorageError::BackendError(err.to_string()),
    }
}

/// Double-quotes an SQL identifier.
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn now_text() -> String {
    Utc::now().to_rfc3339()
}

fn parse_timestamp(text: Option<&str>) -> DateTime<Utc> {
    let Some(text) = text.map(str::trim) else {
        return DateTime::<Utc>::default();
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return dt.with_timezone(&Utc);
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .unwrap_or_default()
}

fn value_f64(value: &Value) -> Option<f64> {
    match value {
        #[allow(clippy::cast_precision_loss)]
        Value::Integer(i) => Some(*i as f64),
        Value::Real(r) if r.is_finite() => Some(*r),
        Value::Text(t) => {
            let parsed = parse_f64_or(t, f64::NAN);
            parsed.is_finite().then_some(parsed)
        }
        _ => None,
    }
}

fn value_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(*i),
        Value::Text(t) => t.trim().parse().ok(),
        _ => None,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Text(t) => t.trim().to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => r.to_string(),
        Value::Null | Value::Blob(_) => String::new(),
    }
}

fn edge_from_row(kind: EntityKind, row: &Row<'_>) -> rusqlite::Result<Edge> {
    let implication: Option<String> = row.get(4)?;
    let edge_type: Option<String> = row.get(5)?;
    let weight: Option<f64> = row.get(6)?;
    let created: Option<String> = row.get(8)?;
    Ok(Edge {
        id: EdgeId::new(row.get(0)?),
        kind,
        network_id: NetworkId::new(row.get::<_, Option<i64>>(1)?.unwrap_or(0)),
        source: EntityId::new(row.get(2)?),
        target: EntityId::new(row.get(3)?),
        direction: Direction::from_symbol(implication.as_deref().unwrap_or("->")),
        edge_type: EdgeType::from_label(edge_type.as_deref().unwrap_or_default()),
        weight: finite_or(weight.unwrap_or(1.0), 1.0),
        comment: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        created_at: parse_timestamp(created.as_deref()),
    })
}

/// A universe stored in one SQLite database.
pub struct SqliteUniverse {
    conn: Mutex<Connection>,
    schema: SchemaDescriptor,
}

impl std::fmt::Debug for SqliteUniverse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteUniverse")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl SqliteUniverse {
    /// Opens a universe with an explicit catalog descriptor.
    ///
    /// # Errors
    /// `Schema` when the descriptor is invalid or names columns the catalog
    /// table does not have; `ConnectionError` / `BackendError` otherwise.
    pub fn open(path: impl AsRef<Path>, schema: SchemaDescriptor) -> Result<Self, StorageError> {
        schema
            .validate()
            .map_err(|e| StorageError::Schema(e.to_string()))?;
        let conn = Self::connect(path.as_ref())?;
        let columns = table_columns(&conn, &schema.table)?;
        for (field, column) in schema.mapped() {
            if !columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                return Err(StorageError::Schema(format!(
                    "catalog table '{}' has no column '{column}' (mapped to {field})",
                    schema.table
                )));
            }
        }
        Self::finish(conn, schema, path.as_ref())
    }

    /// Opens a universe, building the catalog descriptor from the columns
    /// of `table`.
    ///
    /// # Errors
    /// `Schema` when the table lacks an id or name column.
    pub fn open_discovering(path: impl AsRef<Path>, table: &str) -> Result<Self, StorageError> {
        let conn = Self::connect(path.as_ref())?;
        let columns = table_columns(&conn, table)?;
        let schema = SchemaDescriptor::discover(table, &columns)
            .map_err(|e| StorageError::Schema(e.to_string()))?;
        Self::finish(conn, schema, path.as_ref())
    }

    /// The catalog descriptor in use.
    #[must_use]
    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    fn connect(path: &Path) -> Result<Connection, StorageError> {
        let conn = Connection::open(path).map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(sql_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").map_err(sql_err)?;
        Ok(conn)
    }

    fn finish(conn: Connection, schema: SchemaDescriptor, path: &Path) -> Result<Self, StorageError> {
        conn.execute_batch(MIGRATIONS).map_err(sql_err)?;
        info!(path = %path.display(), table = %schema.table, "universe opened");
        Ok(Self {
            conn: Mutex::new(conn),
            schema,
        })
    }

    fn lock(&self, context: &'static str) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| lock_err(context))
    }

    fn select_objects(
        &self,
        context: &'static str,
        filter: Option<(CatalogField, Value)>,
    ) -> Result<Vec<CatalogObject>, StorageError> {
        let mapped = self.schema.mapped();
        let columns = mapped
            .iter()
            .map(|(_, c)| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("SELECT {columns} FROM {}", quote_ident(&self.schema.table));
        let mut bound = Vec::new();
        if let Some((field, value)) = filter {
            let Some(column) = self.schema.column(field) else {
                return Ok(Vec::new());
            };
            sql.push_str(&format!(" WHERE {} = ?1", quote_ident(column)));
            bound.push(value);
        }
        sql.push_str(&format!(" ORDER BY {}", quote_ident(&self.schema.id)));

        let conn = self.lock(context)?;
        let mut stmt = conn.prepare(&sql).map_err(sql_err)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(bound.iter()), |row| {
                (0..mapped.len())
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<rusqlite::Result<Vec<Value>>>()
            })
            .map_err(sql_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_err)?;

        Ok(rows
            .iter()
            .filter_map(|values| object_from_values(&mapped, values))
            .collect())
    }

    fn params_of(conn: &Connection, id: EventId) -> Result<Vec<(String, String)>, StorageError> {
        let mut stmt = conn
            .prepare(
                "SELECT cle, valeur FROM parametres_evenements
                 WHERE evenement_id = ?1 ORDER BY ordre ASC, id ASC",
            )
            .map_err(sql_err)?;
        let pairs = stmt
            .query_map(params![id.get()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                ))
            })
            .map_err(sql_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_err)?;
        Ok(pairs)
    }

    fn write_params(
        conn: &Connection,
        id: EventId,
        params: &EventParams,
        probability: f64,
    ) -> Result<(), StorageError> {
        conn.execute(
            "DELETE FROM parametres_evenements WHERE evenement_id = ?1",
            params![id.get()],
        )
        .map_err(sql_err)?;
        for (ordre, (key, value)) in params.to_pairs(probability).iter().enumerate() {
            conn.execute(
                "INSERT INTO parametres_evenements (evenement_id, cle, valeur, ordre)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id.get(), key, value, i64::try_from(ordre).unwrap_or(i64::MAX)],
            )
            .map_err(sql_err)?;
        }
        Ok(())
    }

    fn load_event(conn: &Connection, id: EventId) -> Result<Option<EventRecord>, StorageError> {
        Self::read_event(conn, id)?
            .transpose()
            .map_err(|e| StorageError::SerializationError(format!("event {id}: {e}")))
    }

    /// The outer error is the database; the inner one a parameter bag that
    /// no longer decodes.
    fn read_event(
        conn: &Connection,
        id: EventId,
    ) -> Result<Option<Result<EventRecord, ValidationError>>, StorageError> {
        let row = conn
            .query_row(
                "SELECT nom, afficher_simulation, description, date_creation
                 FROM evenements WHERE id = ?1",
                params![id.get()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<i64>>(1)?.unwrap_or(1),
                        row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(sql_err)?;
        let Some((name, visible, description, created)) = row else {
            return Ok(None);
        };
        let pairs = Self::params_of(conn, id)?;
        Ok(Some(EventParams::from_pairs(&pairs).map(|(probability, params)| {
            EventRecord {
                id,
                name,
                visible: visible != 0,
                description,
                probability,
                params,
                created_at: parse_timestamp(created.as_deref()),
            }
        })))
    }
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))
        .map_err(sql_err)?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(sql_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(sql_err)?;
    if columns.is_empty() {
        return Err(StorageError::Schema(format!("catalog table '{table}' not found")));
    }
    Ok(columns)
}

fn object_from_values(mapped: &[(CatalogField, &str)], values: &[Value]) -> Option<CatalogObject> {
    let cell = |field: CatalogField| -> Option<&Value> {
        mapped
            .iter()
            .position(|(f, _)| *f == field)
            .and_then(|i| values.get(i))
    };
    let number = |field: CatalogField| cell(field).and_then(value_f64);
    let text = |field: CatalogField| cell(field).map(value_text).unwrap_or_default();

    let id = ObjectId::new(cell(CatalogField::Id).and_then(value_i64)?);
    let price_mean = number(CatalogField::PriceMean).unwrap_or(0.0);
    let mut object = CatalogObject::new(id, text(CatalogField::Name), price_mean)
        .with_price_range(
            number(CatalogField::PriceMin).unwrap_or(price_mean),
            number(CatalogField::PriceMax).unwrap_or(price_mean),
        )
        .with_revenue(number(CatalogField::Revenue).unwrap_or(0.0))
        .with_family(text(CatalogField::Family))
        .with_type(text(CatalogField::ObjectType))
        .with_growth(number(CatalogField::Growth).unwrap_or(DEFAULT_GROWTH_COEFFICIENT))
        .with_classifiers(
            Speculation::from_label(&text(CatalogField::Speculation)),
            UsageFrequency::from_label(&text(CatalogField::Usage)),
        );
    object.name = object.name.trim().to_string();
    Some(object)
}

impl CatalogStore for SqliteUniverse {
    fn get(&self, id: ObjectId) -> Result<Option<CatalogObject>, StorageError> {
        Ok(self
            .select_objects("catalog.get", Some((CatalogField::Id, Value::Integer(id.get()))))?
            .into_iter()
            .next())
    }

    fn get_many(&self, ids: &[ObjectId]) -> Result<Vec<CatalogObject>, StorageError> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for id in ids {
            if seen.insert(*id) {
                if let Some(object) = CatalogStore::get(self, *id)? {
                    out.push(object);
                }
            }
        }
        Ok(out)
    }

    fn all_ids(&self) -> Result<Vec<ObjectId>, StorageError> {
        Ok(self
            .select_objects("catalog.all_ids", None)?
            .into_iter()
            .map(|o| o.id)
            .collect())
    }

    fn ids_by_family(&self, family: &str) -> Result<Vec<ObjectId>, StorageError> {
        Ok(self
            .select_objects(
                "catalog.ids_by_family",
                Some((CatalogField::Family, Value::Text(family.to_string()))),
            )?
            .into_iter()
            .map(|o| o.id)
            .collect())
    }

    fn ids_by_type(&self, object_type: &str) -> Result<Vec<ObjectId>, StorageError> {
        Ok(self
            .select_objects(
                "catalog.ids_by_type",
                Some((CatalogField::ObjectType, Value::Text(object_type.to_string()))),
            )?
            .into_iter()
            .map(|o| o.id)
            .collect())
    }
}

fn networks_touching(
    conn: &Connection,
    kind: EntityKind,
    id: EntityId,
) -> Result<BTreeSet<NetworkId>, StorageError> {
    let mut stmt = conn
        .prepare(
            "SELECT DISTINCT reseau_id FROM liaisons_applicables
             WHERE type_applicable = ?1 AND (source_id = ?2 OR cible_id = ?2)
               AND reseau_id IS NOT NULL",
        )
        .map_err(sql_err)?;
    let ids = stmt
        .query_map(params![kind.code(), id.get()], |row| row.get::<_, i64>(0))
        .map_err(sql_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(sql_err)?;
    Ok(ids.into_iter().map(NetworkId::new).collect())
}

impl GraphStore for SqliteUniverse {
    fn attach(&self, edge: NewEdge) -> Result<Edge, StorageError> {
        edge.validate()
            .map_err(|e| StorageError::InvalidEdge(e.to_string()))?;

        let mut conn = self.lock("graph.attach")?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(sql_err)?;
        let kind = edge.kind;
        let plan = plan_network(
            &networks_touching(&tx, kind, edge.source)?,
            &networks_touching(&tx, kind, edge.target)?,
        );

        let network_id = match plan {
            NetworkPlan::Create => {
                tx.execute(
                    "INSERT INTO reseaux_applicables (type_applicable, date_creation) VALUES (?1, ?2)",
                    params![kind.code(), now_text()],
                )
                .map_err(sql_err)?;
                NetworkId::new(tx.last_insert_rowid())
            }
            NetworkPlan::Join(id) => id,
            NetworkPlan::Merge { survivor, absorbed } => {
                for gone in &absorbed {
                    tx.execute(
                        "UPDATE liaisons_applicables SET reseau_id = ?1
                         WHERE type_applicable = ?2 AND reseau_id = ?3",
                        params![survivor.get(), kind.code(), gone.get()],
                    )
                    .map_err(sql_err)?;
                    tx.execute(
                        "DELETE FROM reseaux_applicables WHERE id = ?1",
                        params![gone.get()],
                    )
                    .map_err(sql_err)?;
                }
                debug!(%kind, survivor = %survivor, absorbed = absorbed.len(), "networks merged");
                survivor
            }
        };

        let created_at = Utc::now();
        tx.execute(
            "INSERT INTO liaisons_applicables
             (type_applicable, reseau_id, source_id, cible_id, implication, type_lien, poids, commentaire, date_creation)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                kind.code(),
                network_id.get(),
                edge.source.get(),
                edge.target.get(),
                edge.direction.symbol(),
                edge.edge_type.label(),
                edge.weight,
                edge.comment,
                created_at.to_rfc3339(),
            ],
        )
        .map_err(sql_err)?;
        let id = EdgeId::new(tx.last_insert_rowid());
        tx.commit().map_err(sql_err)?;
        Ok(edge.into_edge(id, network_id, created_at))
    }

    fn detach(&self, kind: EntityKind, id: EdgeId) -> Result<(), StorageError> {
        let conn = self.lock("graph.detach")?;
        let removed = conn
            .execute(
                "DELETE FROM liaisons_applicables WHERE id = ?1 AND type_applicable = ?2",
                params![id.get(), kind.code()],
            )
            .map_err(sql_err)?;
        if removed == 0 {
            return Err(StorageError::EdgeNotFound(id));
        }
        Ok(())
    }

    fn get_edge(&self, kind: EntityKind, id: EdgeId) -> Result<Option<Edge>, StorageError> {
        let conn = self.lock("graph.get_edge")?;
        conn.query_row(
            &format!(
                "SELECT {EDGE_COLUMNS} FROM liaisons_applicables WHERE id = ?1 AND type_applicable = ?2"
            ),
            params![id.get(), kind.code()],
            |row| edge_from_row(kind, row),
        )
        .optional()
        .map_err(sql_err)
    }

    fn edges_touching(&self, kind: EntityKind, id: EntityId) -> Result<Vec<Edge>, StorageError> {
        let conn = self.lock("graph.edges_touching")?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {EDGE_COLUMNS} FROM liaisons_applicables
                 WHERE type_applicable = ?1 AND (source_id = ?2 OR cible_id = ?2)
                 ORDER BY id ASC"
            ))
            .map_err(sql_err)?;
        let edges = stmt
            .query_map(params![kind.code(), id.get()], |row| edge_from_row(kind, row))
            .map_err(sql_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_err)?;
        Ok(edges)
    }

    fn networks_of(
        &self,
        kind: EntityKind,
        id: EntityId,
    ) -> Result<BTreeSet<NetworkId>, StorageError> {
        let conn = self.lock("graph.networks_of")?;
        networks_touching(&conn, kind, id)
    }

    fn network_ids(&self, kind: EntityKind) -> Result<Vec<NetworkId>, StorageError> {
        let conn = self.lock("graph.network_ids")?;
        let mut stmt = conn
            .prepare("SELECT id FROM reseaux_applicables WHERE type_applicable = ?1 ORDER BY id ASC")
            .map_err(sql_err)?;
        let ids = stmt
            .query_map(params![kind.code()], |row| row.get::<_, i64>(0))
            .map_err(sql_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_err)?;
        Ok(ids.into_iter().map(NetworkId::new).collect())
    }

    fn edges_in_network(
        &self,
        kind: EntityKind,
        network: NetworkId,
    ) -> Result<Vec<Edge>, StorageError> {
        let conn = self.lock("graph.edges_in_network")?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {EDGE_COLUMNS} FROM liaisons_applicables
                 WHERE type_applicable = ?1 AND reseau_id = ?2 ORDER BY id ASC"
            ))
            .map_err(sql_err)?;
        let edges = stmt
            .query_map(params![kind.code(), network.get()], |row| edge_from_row(kind, row))
            .map_err(sql_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_err)?;
        Ok(edges)
    }

    fn list_edges(&self, kind: EntityKind, limit: usize) -> Result<Vec<Edge>, StorageError> {
        let conn = self.lock("graph.list_edges")?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {EDGE_COLUMNS} FROM liaisons_applicables
                 WHERE type_applicable = ?1 ORDER BY id DESC LIMIT ?2"
            ))
            .map_err(sql_err)?;
        let edges = stmt
            .query_map(
                params![kind.code(), i64::try_from(limit).unwrap_or(i64::MAX)],
                |row| edge_from_row(kind, row),
            )
            .map_err(sql_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_err)?;
        Ok(edges)
    }
}

impl EventStore for SqliteUniverse {
    fn insert(&self, draft: EventDraft) -> Result<EventRecord, StorageError> {
        let mut conn = self.lock("event.insert")?;
        let tx = conn.transaction().map_err(sql_err)?;
        let created_at = Utc::now();
        let type_evenement = if draft.visible { "E" } else { draft.params.code() };
        tx.execute(
            "INSERT INTO evenements
             (nom, type_evenement, type_detail, afficher_simulation, description, date_creation)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                draft.name,
                type_evenement,
                draft.params.code(),
                i64::from(draft.visible),
                draft.description,
                created_at.to_rfc3339(),
            ],
        )
        .map_err(sql_err)?;
        let id = EventId::new(tx.last_insert_rowid());
        Self::write_params(&tx, id, &draft.params, draft.probability)?;
        tx.commit().map_err(sql_err)?;
        Ok(draft.into_record(id, created_at))
    }

    fn get(&self, id: EventId) -> Result<Option<EventRecord>, StorageError> {
        let conn = self.lock("event.get")?;
        Self::load_event(&conn, id)
    }

    fn update(&self, event: EventRecord) -> Result<(), StorageError> {
        let mut conn = self.lock("event.update")?;
        let tx = conn.transaction().map_err(sql_err)?;
        let type_evenement = if event.visible { "E" } else { event.params.code() };
        let changed = tx
            .execute(
                "UPDATE evenements SET nom = ?1, type_evenement = ?2, type_detail = ?3,
                 afficher_simulation = ?4, description = ?5 WHERE id = ?6",
                params![
                    event.name,
                    type_evenement,
                    event.params.code(),
                    i64::from(event.visible),
                    event.description,
                    event.id.get(),
                ],
            )
            .map_err(sql_err)?;
        if changed == 0 {
            return Err(StorageError::EventNotFound(event.id));
        }
        Self::write_params(&tx, event.id, &event.params, event.probability)?;
        tx.commit().map_err(sql_err)
    }

    fn delete(&self, id: EventId) -> Result<(), StorageError> {
        let mut conn = self.lock("event.delete")?;
        let tx = conn.transaction().map_err(sql_err)?;
        let removed = tx
            .execute("DELETE FROM evenements WHERE id = ?1", params![id.get()])
            .map_err(sql_err)?;
        if removed == 0 {
            return Err(StorageError::EventNotFound(id));
        }
        tx.execute(
            "DELETE FROM parametres_evenements WHERE evenement_id = ?1",
            params![id.get()],
        )
        .map_err(sql_err)?;
        tx.commit().map_err(sql_err)
    }

    fn list(&self) -> Result<Vec<EventRecord>, StorageError> {
        Ok(self.list_readable()?.events)
    }

    fn list_readable(&self) -> Result<EventListing, StorageError> {
        let conn = self.lock("event.list")?;
        let ids = {
            let mut stmt = conn
                .prepare("SELECT id FROM evenements ORDER BY id ASC")
                .map_err(sql_err)?;
            let rows = stmt
                .query_map([], |row| row.get::<_, i64>(0))
                .map_err(sql_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(sql_err)?
        };
        let mut listing = EventListing::default();
        for id in ids.into_iter().map(EventId::new) {
            match Self::read_event(&conn, id)? {
                Some(Ok(event)) => listing.events.push(event),
                Some(Err(e)) => {
                    warn!(event = %id, error = %e, "skipping event with unreadable parameters");
                    listing.skipped.push(SkippedEvent {
                        id,
                        reason: e.to_string(),
                    });
                }
                None => {}
            }
        }
        Ok(listing)
    }
}

fn impact_from_row(row: &Row<'_>) -> rusqlite::Result<EventImpact> {
    let object = ObjectId::new(row.get(1)?);
    Ok(EventImpact {
        event: EventId::new(row.get(0)?),
        object,
        level: u32::try_from(row.get::<_, i64>(2)?.max(0)).unwrap_or(u32::MAX),
        weight: finite_or(row.get(3)?, 0.0),
        role: ImpactRole::from_label(&row.get::<_, String>(4)?),
        origin: row
            .get::<_, Option<i64>>(5)?
            .map_or(object, ObjectId::new),
    })
}

impl ImpactStore for SqliteUniverse {
    fn upsert(&self, impact: EventImpact) -> Result<(), StorageError> {
        let mut conn = self.lock("impact.upsert")?;
        let tx = conn.transaction().map_err(sql_err)?;
        let existing = tx
            .query_row(
                "SELECT evenement_id, objet_id, niveau, poids, role, origine_id
                 FROM impacts_evenements WHERE evenement_id = ?1 AND objet_id = ?2",
                params![impact.event.get(), impact.object.get()],
                impact_from_row,
            )
            .optional()
            .map_err(sql_err)?;
        let merged = existing.map_or(impact, |e| e.merge(impact));
        tx.execute(
            "INSERT OR REPLACE INTO impacts_evenements
             (evenement_id, objet_id, niveau, poids, role, origine_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                merged.event.get(),
                merged.object.get(),
                i64::from(merged.level),
                merged.weight,
                merged.role.label(),
                merged.origin.get(),
            ],
        )
        .map_err(sql_err)?;
        tx.commit().map_err(sql_err)
    }

    fn for_event(&self, event: EventId) -> Result<Vec<EventImpact>, StorageError> {
        let conn = self.lock("impact.for_event")?;
        let mut stmt = conn
            .prepare(
                "SELECT evenement_id, objet_id, niveau, poids, role, origine_id
                 FROM impacts_evenements WHERE evenement_id = ?1 ORDER BY objet_id ASC",
            )
            .map_err(sql_err)?;
        let impacts = stmt
            .query_map(params![event.get()], impact_from_row)
            .map_err(sql_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_err)?;
        Ok(impacts)
    }

    fn clear_event(&self, event: EventId) -> Result<usize, StorageError> {
        let conn = self.lock("impact.clear_event")?;
        conn.execute(
            "DELETE FROM impacts_evenements WHERE evenement_id = ?1",
            params![event.get()],
        )
        .map_err(sql_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn universe_with_catalog(ddl: &str) -> (tempfile::TempDir, SqliteUniverse) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("universe.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(ddl).unwrap();
        drop(conn);
        let universe = SqliteUniverse::open_discovering(&path, "stat_objects").unwrap();
        (dir, universe)
    }

    #[test]
    fn quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("prix"), "\"prix\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn lenient_cell_conversion() {
        assert_eq!(value_f64(&Value::Text("12,5".to_string())), Some(12.5));
        assert_eq!(value_f64(&Value::Text("n/a".to_string())), None);
        assert_eq!(value_f64(&Value::Integer(3)), Some(3.0));
        assert_eq!(value_i64(&Value::Text(" 7 ".to_string())), Some(7));
        assert_eq!(value_text(&Value::Null), "");
    }

    #[test]
    fn timestamps_accept_both_formats() {
        let a = parse_timestamp(Some("2025-03-01 10:00:00"));
        let b = parse_timestamp(Some("2025-03-01T10:00:00+00:00"));
        assert_eq!(a, b);
        assert_eq!(parse_timestamp(Some("garbage")), DateTime::<Utc>::default());
    }

    #[test]
    fn catalog_rows_are_read_through_descriptor() {
        let (_dir, universe) = universe_with_catalog(
            "CREATE TABLE stat_objects (id INTEGER PRIMARY KEY, Objet TEXT, Prix_Moyen_Actuel TEXT, Famille TEXT);
             INSERT INTO stat_objects VALUES (1, ' or ', '1800,5', 'Metaux');
             INSERT INTO stat_objects VALUES (2, 'ble', NULL, 'Agri');",
        );
        let gold = CatalogStore::get(&universe, ObjectId::new(1)).unwrap().unwrap();
        assert_eq!(gold.name, "or");
        assert_eq!(gold.price_mean, 1800.5);
        assert_eq!(gold.price_min, 1800.5);
        assert_eq!(gold.growth_coefficient, DEFAULT_GROWTH_COEFFICIENT);
        assert_eq!(universe.ids_by_family("Agri").unwrap(), vec![ObjectId::new(2)]);
        assert!(universe.ids_by_type("x").unwrap().is_empty());
    }

    #[test]
    fn open_rejects_unknown_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("u.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE stat_objects (id INTEGER, nom TEXT);")
            .unwrap();
        let mut schema = SchemaDescriptor::new("stat_objects", "id", "nom");
        schema.price_mean = Some("prix".to_string());
        let err = SqliteUniverse::open(&path, schema).unwrap_err();
        assert!(matches!(err, StorageError::Schema(_)));
    }
}
