// 🗄️ Card Store - SQLite persistence + audit trail
//
// Load a collection before a batch, flush the reconciled result after it.
// Flush writes are derived from the final collection state, so an entry
// created and deleted inside one batch never touches the database.
//
// Every write is also recorded in the events table ("every change is an event").

use crate::catalog::{CatalogLookup, StaticCatalog};
use crate::collection::Collection;
use crate::entities::{CardEntry, Condition};
use crate::reconciliation::{ReconciliationEngine, ReconciliationReport};
use crate::request::ParsedRequest;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::{ToSql, Type};
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Cards Table
    // fingerprint = SHA-256 of the identity tuple (indexed, not unique)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cards (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            catalog_ref TEXT NOT NULL,
            amount INTEGER NOT NULL CHECK (amount > 0),
            tags TEXT NOT NULL,
            foil INTEGER NOT NULL,
            condition TEXT NOT NULL,
            signed INTEGER NOT NULL,
            altered INTEGER NOT NULL,
            misprint INTEGER NOT NULL,
            fingerprint TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Catalog Table (known catalog references)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS catalog (
            catalog_ref TEXT PRIMARY KEY,
            added_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_cards_identity ON cards(owner_id, fingerprint)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_cards_catalog_ref ON cards(owner_id, catalog_ref)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// AUDIT EVENTS
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }

    fn for_card(event_type: &str, entry: &CardEntry, actor: &str) -> Result<Self> {
        Ok(Event::new(
            event_type,
            "card",
            &entry.id,
            serde_json::to_value(entry)?,
            actor,
        ))
    }
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Events for one entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_timestamp(1, &timestamp_str)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| conversion_error(5, e))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// STORE INTERFACE
// ============================================================================

/// Lookup criteria for `find_one`. Unset fields are not constrained.
#[derive(Debug, Clone, Default)]
pub struct CardFilter {
    pub owner_id: String,
    pub id: Option<String>,
    pub catalog_ref: Option<String>,
    pub fingerprint: Option<String>,
}

impl CardFilter {
    pub fn owner(owner_id: impl Into<String>) -> Self {
        CardFilter {
            owner_id: owner_id.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_catalog_ref(mut self, catalog_ref: impl Into<String>) -> Self {
        self.catalog_ref = Some(catalog_ref.into());
        self
    }

    /// Match the identity tuple of `entry`
    pub fn with_identity_of(mut self, entry: &CardEntry) -> Self {
        self.fingerprint = Some(entry.fingerprint());
        self
    }
}

/// Rows written by one flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl FlushSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

/// Writes needed to make the store match a reconciled collection
#[derive(Debug, Clone, Default)]
pub struct FlushPlan {
    pub deletes: Vec<CardEntry>,
    pub updates: Vec<CardEntry>,
    pub inserts: Vec<CardEntry>,
}

impl FlushPlan {
    /// Derive writes from the report, using the collection's final state.
    ///
    /// - delete: reported deleted, gone at the end, and stored before the batch
    /// - update: reported updated, still present, and stored before the batch
    /// - insert: reported created and still present
    pub fn new(collection: &Collection, report: &ReconciliationReport) -> Self {
        let deletes = report
            .deleted()
            .into_iter()
            .filter(|e| !collection.contains(&e.id) && collection.was_persisted(&e.id))
            .cloned()
            .collect();

        let updates = report
            .updated()
            .into_iter()
            .filter(|e| collection.was_persisted(&e.id))
            .filter_map(|e| collection.get(&e.id).cloned())
            .collect();

        let inserts = report
            .created()
            .into_iter()
            .filter_map(|e| collection.get(&e.id).cloned())
            .collect();

        FlushPlan {
            deletes,
            updates,
            inserts,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.updates.is_empty() && self.inserts.is_empty()
    }
}

pub trait CardStore {
    fn load_owner_entries(&self, owner_id: &str) -> Result<Vec<CardEntry>>;
    fn find_one(&self, filter: &CardFilter) -> Result<Option<CardEntry>>;
    fn insert(&self, entry: &CardEntry) -> Result<()>;
    fn update(&self, entry: &CardEntry) -> Result<()>;
    fn delete(&self, id: &str) -> Result<()>;
    fn delete_all(&self, owner_id: &str) -> Result<usize>;

    /// Snapshot of everything an owner has stored
    fn load_collection(&self, owner_id: &str) -> Result<Collection> {
        let entries = self.load_owner_entries(owner_id)?;
        Collection::from_persisted(owner_id, entries)
            .with_context(|| format!("Stored collection for {owner_id} is inconsistent"))
    }

    /// Persist a reconciled collection: deletes, then updates, then inserts.
    ///
    /// Writes run one after another; stores with transactions wrap this.
    fn flush(&self, collection: &Collection, report: &ReconciliationReport) -> Result<FlushSummary> {
        let plan = FlushPlan::new(collection, report);

        for entry in &plan.deletes {
            self.delete(&entry.id)?;
        }
        for entry in &plan.updates {
            self.update(entry)?;
        }
        for entry in &plan.inserts {
            self.insert(entry)?;
        }

        Ok(FlushSummary {
            inserted: plan.inserts.len(),
            updated: plan.updates.len(),
            deleted: plan.deletes.len(),
        })
    }
}

/// Load, reconcile and flush one owner's batch.
///
/// The fatal ambiguous state comes back as an `AmbiguousStateError` inside
/// the `anyhow::Error` (use `downcast_ref`); nothing is flushed in that case.
pub fn apply_batch<S: CardStore + ?Sized>(
    store: &S,
    catalog: Option<&dyn CatalogLookup>,
    owner_id: &str,
    requests: Vec<ParsedRequest>,
) -> Result<(ReconciliationReport, FlushSummary)> {
    let mut collection = store.load_collection(owner_id)?;

    let engine = match catalog {
        Some(catalog) => ReconciliationEngine::with_catalog(catalog),
        None => ReconciliationEngine::new(),
    };
    let report = engine.reconcile_batch(&mut collection, requests)?;
    let summary = store.flush(&collection, &report)?;

    Ok((report, summary))
}

// ============================================================================
// SQLITE STORE
// ============================================================================

const CARD_COLUMNS: &str = "id, owner_id, catalog_ref, amount, tags, foil, condition, \
                            signed, altered, misprint, created_at";

pub struct SqliteCardStore<'c> {
    conn: &'c Connection,
    /// Recorded as the actor of every audit event
    actor: String,
}

impl<'c> SqliteCardStore<'c> {
    pub fn new(conn: &'c Connection, actor: impl Into<String>) -> Self {
        SqliteCardStore {
            conn,
            actor: actor.into(),
        }
    }

    pub fn connection(&self) -> &Connection {
        self.conn
    }

    pub fn events_for_card(&self, id: &str) -> Result<Vec<Event>> {
        get_events_for_entity(self.conn, "card", id)
    }

    /// Add a catalog reference. Returns false if it was already known.
    pub fn register_catalog_ref(&self, catalog_ref: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO catalog (catalog_ref, added_at) VALUES (?1, ?2)",
            params![catalog_ref, Utc::now().to_rfc3339()],
        )?;
        Ok(changed > 0)
    }

    pub fn load_catalog(&self) -> Result<StaticCatalog> {
        let mut stmt = self.conn.prepare("SELECT catalog_ref FROM catalog")?;
        let refs = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<StaticCatalog, _>>()?;
        Ok(refs)
    }

    fn record(&self, event_type: &str, entry: &CardEntry) -> Result<()> {
        insert_event(self.conn, &Event::for_card(event_type, entry, &self.actor)?)
    }

    fn write_deletion(&self, entry: &CardEntry) -> Result<()> {
        self.delete(&entry.id)?;
        self.record("card_deleted", entry)
    }
}

impl CardStore for SqliteCardStore<'_> {
    fn load_owner_entries(&self, owner_id: &str) -> Result<Vec<CardEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CARD_COLUMNS} FROM cards WHERE owner_id = ?1 ORDER BY created_at, id"
        ))?;

        let entries = stmt
            .query_map(params![owner_id], card_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to load cards for {owner_id}"))?;

        Ok(entries)
    }

    fn find_one(&self, filter: &CardFilter) -> Result<Option<CardEntry>> {
        let mut clauses = vec!["owner_id = ?".to_string()];
        let mut values: Vec<&dyn ToSql> = vec![&filter.owner_id];

        for (column, value) in [
            ("id", &filter.id),
            ("catalog_ref", &filter.catalog_ref),
            ("fingerprint", &filter.fingerprint),
        ] {
            if let Some(value) = value {
                clauses.push(format!("{column} = ?"));
                values.push(value);
            }
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CARD_COLUMNS} FROM cards WHERE {} LIMIT 2",
            clauses.join(" AND ")
        ))?;
        let mut found = stmt
            .query_map(params_from_iter(values), card_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        if found.len() > 1 {
            bail!("more than one card matches {filter:?}");
        }
        Ok(found.pop())
    }

    fn insert(&self, entry: &CardEntry) -> Result<()> {
        if !entry.has_id() {
            bail!("cannot store a card without an id");
        }
        let now = Utc::now().to_rfc3339();

        self.conn
            .execute(
                &format!(
                    "INSERT INTO cards ({CARD_COLUMNS}, fingerprint, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                params![
                    entry.id,
                    entry.owner_id,
                    entry.catalog_ref,
                    entry.amount,
                    serde_json::to_string(&entry.tags)?,
                    entry.foil,
                    entry.condition.as_str(),
                    entry.signed,
                    entry.altered,
                    entry.misprint,
                    entry.created_at.to_rfc3339(),
                    entry.fingerprint(),
                    now,
                ],
            )
            .with_context(|| format!("Failed to insert card {}", entry.id))?;

        Ok(())
    }

    fn update(&self, entry: &CardEntry) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE cards SET
                    catalog_ref = ?2, amount = ?3, tags = ?4, foil = ?5, condition = ?6,
                    signed = ?7, altered = ?8, misprint = ?9, fingerprint = ?10, updated_at = ?11
                 WHERE id = ?1",
                params![
                    entry.id,
                    entry.catalog_ref,
                    entry.amount,
                    serde_json::to_string(&entry.tags)?,
                    entry.foil,
                    entry.condition.as_str(),
                    entry.signed,
                    entry.altered,
                    entry.misprint,
                    entry.fingerprint(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .with_context(|| format!("Failed to update card {}", entry.id))?;

        if changed == 0 {
            bail!("card {} no longer exists", entry.id);
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM cards WHERE id = ?1", params![id])?;
        if changed == 0 {
            bail!("card {id} no longer exists");
        }
        Ok(())
    }

    fn delete_all(&self, owner_id: &str) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;

        let entries = self.load_owner_entries(owner_id)?;
        for entry in &entries {
            self.write_deletion(entry)?;
        }
        let deleted = entries.len();

        tx.commit()?;

        tracing::info!(owner_id, deleted, "cleared collection");
        Ok(deleted)
    }

    /// One SQLite transaction for the whole batch, one audit event per write
    fn flush(&self, collection: &Collection, report: &ReconciliationReport) -> Result<FlushSummary> {
        let plan = FlushPlan::new(collection, report);
        if plan.is_empty() {
            return Ok(FlushSummary::default());
        }

        let tx = self.conn.unchecked_transaction()?;

        for entry in &plan.deletes {
            self.write_deletion(entry)?;
        }
        for entry in &plan.updates {
            self.update(entry)?;
            self.record("card_updated", entry)?;
        }
        for entry in &plan.inserts {
            self.insert(entry)?;
            self.record("card_created", entry)?;
        }

        tx.commit().context("Failed to commit flush")?;

        let summary = FlushSummary {
            inserted: plan.inserts.len(),
            updated: plan.updates.len(),
            deleted: plan.deletes.len(),
        };
        tracing::info!(
            owner_id = collection.owner_id(),
            inserted = summary.inserted,
            updated = summary.updated,
            deleted = summary.deleted,
            "flushed collection"
        );
        Ok(summary)
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn parse_timestamp(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, e))
}

fn card_from_row(row: &Row) -> rusqlite::Result<CardEntry> {
    let tags_json: String = row.get(4)?;
    let condition: String = row.get(6)?;
    let created_at: String = row.get(10)?;

    Ok(CardEntry {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        catalog_ref: row.get(2)?,
        amount: row.get(3)?,
        tags: serde_json::from_str::<BTreeSet<String>>(&tags_json)
            .map_err(|e| conversion_error(4, e))?,
        foil: row.get(5)?,
        condition: Condition::parse(&condition).map_err(|e| conversion_error(6, e))?,
        signed: row.get(7)?,
        altered: row.get(8)?,
        misprint: row.get(9)?,
        created_at: parse_timestamp(10, &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::AmountDelta;
    use crate::reconciliation::ReconciliationEngine;
    use crate::request::ChangeRequest;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn stored(id: &str, catalog_ref: &str, amount: i64) -> CardEntry {
        let mut card = CardEntry::new("owner", catalog_ref);
        card.id = id.to_string();
        card.amount = amount;
        card
    }

    #[test]
    fn test_insert_and_load_round_trip() {
        let conn = open();
        let store = SqliteCardStore::new(&conn, "test");

        let mut card = stored("1", "X", 3);
        card.tags = ["edh".to_string()].into_iter().collect();
        card.condition = Condition::HeavilyPlayed;
        card.foil = true;
        store.insert(&card).unwrap();

        let loaded = store.load_owner_entries("owner").unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "1");
        assert_eq!(loaded[0].amount, 3);
        assert_eq!(loaded[0].condition, Condition::HeavilyPlayed);
        assert!(loaded[0].foil);
        assert!(loaded[0].same_identity(&card));

        assert!(store.load_owner_entries("someone-else").unwrap().is_empty());
    }

    #[test]
    fn test_find_one_by_identity() {
        let conn = open();
        let store = SqliteCardStore::new(&conn, "test");
        store.insert(&stored("1", "X", 3)).unwrap();

        let wanted = CardEntry::new("owner", "X");
        let found = store
            .find_one(&CardFilter::owner("owner").with_identity_of(&wanted))
            .unwrap();
        assert_eq!(found.map(|e| e.id), Some("1".to_string()));

        let by_id = store
            .find_one(&CardFilter::owner("owner").with_id("1").with_catalog_ref("X"))
            .unwrap();
        assert!(by_id.is_some());

        let missing = store
            .find_one(&CardFilter::owner("owner").with_catalog_ref("Y"))
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_find_one_rejects_ambiguous_rows() {
        let conn = open();
        let store = SqliteCardStore::new(&conn, "test");
        store.insert(&stored("1", "X", 1)).unwrap();
        store.insert(&stored("2", "X", 1)).unwrap();

        let wanted = CardEntry::new("owner", "X");
        assert!(store
            .find_one(&CardFilter::owner("owner").with_identity_of(&wanted))
            .is_err());
    }

    #[test]
    fn test_update_and_delete_missing_rows_fail() {
        let conn = open();
        let store = SqliteCardStore::new(&conn, "test");

        assert!(store.update(&stored("1", "X", 1)).is_err());
        assert!(store.delete("1").is_err());
        assert!(store.insert(&CardEntry::new("owner", "X")).is_err());
    }

    #[test]
    fn test_flush_writes_final_state_with_events() {
        let conn = open();
        let store = SqliteCardStore::new(&conn, "test");
        store.insert(&stored("1", "X", 2)).unwrap();
        store.insert(&stored("2", "Y", 1)).unwrap();

        let mut collection = store.load_collection("owner").unwrap();
        let report = ReconciliationEngine::new()
            .reconcile(
                &mut collection,
                &[
                    ChangeRequest::by_id("1").with_amount(AmountDelta::relative(1)),
                    ChangeRequest::by_id("2").deleting(),
                    ChangeRequest::by_catalog_ref("Z"),
                    ChangeRequest::by_catalog_ref("Z").with_amount(AmountDelta::relative(4)),
                ],
            )
            .unwrap();

        let summary = store.flush(&collection, &report).unwrap();
        assert_eq!(
            summary,
            FlushSummary {
                inserted: 1,
                updated: 1,
                deleted: 1
            }
        );

        let reloaded = store.load_owner_entries("owner").unwrap();
        assert_eq!(reloaded.len(), 2);
        let z = reloaded.iter().find(|e| e.catalog_ref == "Z").unwrap();
        assert_eq!(z.amount, 5);
        assert_eq!(reloaded.iter().find(|e| e.id == "1").unwrap().amount, 3);

        let events = store.events_for_card("2").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "card_deleted");
        assert_eq!(events[0].actor, "test");

        let created = store.events_for_card(&z.id).unwrap();
        assert_eq!(created[0].event_type, "card_created");
        assert_eq!(created[0].data["amount"], 5);
    }

    #[test]
    fn test_flush_skips_entries_created_and_deleted_in_batch() {
        let conn = open();
        let store = SqliteCardStore::new(&conn, "test");

        let mut collection = store.load_collection("owner").unwrap();
        let report = ReconciliationEngine::new()
            .reconcile(
                &mut collection,
                &[
                    ChangeRequest::by_catalog_ref("X"),
                    ChangeRequest::by_catalog_ref("X").with_amount(AmountDelta::relative(-1)),
                ],
            )
            .unwrap();

        let summary = store.flush(&collection, &report).unwrap();
        assert_eq!(summary.total(), 0);
        assert!(store.load_owner_entries("owner").unwrap().is_empty());
    }

    #[test]
    fn test_apply_batch_aborts_on_ambiguous_state() {
        let conn = open();
        let store = SqliteCardStore::new(&conn, "test");
        store.insert(&stored("1", "X", 1)).unwrap();
        store.insert(&stored("2", "X", 1)).unwrap();

        let err = apply_batch(
            &store,
            None,
            "owner",
            vec![
                Ok(ChangeRequest::by_catalog_ref("Y")),
                Ok(ChangeRequest::by_catalog_ref("X")),
            ],
        )
        .unwrap_err();

        assert!(err.downcast_ref::<crate::error::AmbiguousStateError>().is_some());
        // Y was never flushed
        assert_eq!(store.load_owner_entries("owner").unwrap().len(), 2);
    }

    #[test]
    fn test_apply_batch_with_catalog() {
        let conn = open();
        let store = SqliteCardStore::new(&conn, "test");
        store.register_catalog_ref("X").unwrap();
        let catalog = store.load_catalog().unwrap();

        let (report, summary) = apply_batch(
            &store,
            Some(&catalog),
            "owner",
            vec![
                Ok(ChangeRequest::by_catalog_ref("X")),
                Ok(ChangeRequest::by_catalog_ref("unknown")),
            ],
        )
        .unwrap();

        assert_eq!(summary.inserted, 1);
        assert_eq!(report.errors().len(), 1);
    }

    #[test]
    fn test_delete_all() {
        let conn = open();
        let store = SqliteCardStore::new(&conn, "test");
        store.insert(&stored("1", "X", 1)).unwrap();
        store.insert(&stored("2", "Y", 1)).unwrap();

        assert_eq!(store.delete_all("owner").unwrap(), 2);
        assert!(store.load_owner_entries("owner").unwrap().is_empty());
        assert_eq!(store.events_for_card("1").unwrap()[0].event_type, "card_deleted");
    }

    #[test]
    fn test_catalog_registry() {
        let conn = open();
        let store = SqliteCardStore::new(&conn, "test");

        assert!(store.register_catalog_ref("X").unwrap());
        assert!(!store.register_catalog_ref("X").unwrap());
        store.register_catalog_ref("Y").unwrap();

        let catalog = store.load_catalog().unwrap();
        assert_eq!(catalog.len(), 2);
    }
}
