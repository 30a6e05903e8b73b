use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::records::{BehaviorLogEntry, InmateRecord, SubmissionBatch};
use crate::store::{BehaviorStore, InmateDirectory};

/// How long a connection waits for another writer before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Event for audit trail ("Every change is an event")
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
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<(), StoreError> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Inmates (owned by inmate management, read here)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS inmates (
            inmate_id TEXT PRIMARY KEY,
            full_name TEXT,
            start_date TEXT,
            sentence_length REAL NOT NULL CHECK (sentence_length >= 0),
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Parole records (one per inmate, created on first batch, never deleted)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS parole_records (
            inmate_id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Behavior batches: one per (inmate, calendar month)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS behavior_batches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            batch_id TEXT UNIQUE NOT NULL,
            inmate_id TEXT NOT NULL REFERENCES parole_records(inmate_id),
            period_year INTEGER NOT NULL,
            period_month INTEGER NOT NULL,
            committee_name TEXT NOT NULL,
            signature_ref TEXT NOT NULL,
            submitted_at TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (inmate_id, period_year, period_month)
        )",
        [],
    )?;

    // ==========================================================================
    // Behavior entries (append-only audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS behavior_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            batch_id TEXT NOT NULL REFERENCES behavior_batches(batch_id),
            inmate_id TEXT NOT NULL,
            rule_id INTEGER NOT NULL,
            points INTEGER NOT NULL CHECK (points BETWEEN 1 AND 5),
            submitted_at TEXT NOT NULL,
            UNIQUE (batch_id, rule_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail / event sourcing)
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
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_entries_inmate ON behavior_entries(inmate_id)",
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

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<(), StoreError> {
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

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let rows = stmt
        .query_map(params![entity_type, entity_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(
            |(event_id, timestamp, event_type, entity_type, entity_id, data, actor)| {
                Ok(Event {
                    event_id,
                    timestamp: parse_timestamp(&timestamp)?,
                    event_type,
                    entity_type,
                    entity_id,
                    data: serde_json::from_str(&data)?,
                    actor,
                })
            },
        )
        .collect()
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {:?}: {}", value, e)))
}

fn parse_date(value: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| StoreError::Corrupt(format!("date {:?}: {}", value, e)))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// SQLite-backed inmate directory and behavior store
///
/// One connection per store, serialized by a mutex. Several stores (or
/// processes) may open the same file; the unique index on
/// (inmate_id, period_year, period_month) arbitrates between them.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        setup_database(&conn)?;
        debug!(path = %path.as_ref().display(), "sqlite store opened");
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        SqliteStore {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Insert or replace an inmate record
    pub fn upsert_inmate(&self, record: &InmateRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO inmates (inmate_id, full_name, start_date, sentence_length)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(inmate_id) DO UPDATE SET
                full_name = excluded.full_name,
                start_date = excluded.start_date,
                sentence_length = excluded.sentence_length,
                updated_at = CURRENT_TIMESTAMP",
            params![
                record.inmate_id,
                record.full_name,
                record.start_date.map(|d| d.format("%Y-%m-%d").to_string()),
                record.sentence_length,
            ],
        )?;

        let event = Event::new(
            "inmate_upserted",
            "inmate",
            &record.inmate_id,
            serde_json::json!({
                "start_date": record.start_date,
                "sentence_length": record.sentence_length,
            }),
            "inmate_directory",
            Utc::now(),
        );
        insert_event(&conn, &event)?;

        Ok(())
    }

    /// Audit events recorded for an entity
    pub fn events_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<Event>, StoreError> {
        let conn = self.lock()?;
        get_events_for_entity(&conn, entity_type, entity_id)
    }

    /// Number of behavior entries stored for an inmate
    pub fn entry_count(&self, inmate_id: &str) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM behavior_entries WHERE inmate_id = ?1",
            [inmate_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn load_entries(conn: &Connection, inmate_id: &str) -> Result<Vec<BehaviorLogEntry>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT inmate_id, batch_id, rule_id, points, submitted_at
         FROM behavior_entries
         WHERE inmate_id = ?1
         ORDER BY id ASC",
    )?;

    let rows = stmt
        .query_map([inmate_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, u8>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(inmate_id, batch_id, rule_id, points, submitted_at)| {
            Ok(BehaviorLogEntry {
                inmate_id,
                batch_id,
                rule_id,
                points,
                submitted_at: parse_timestamp(&submitted_at)?,
            })
        })
        .collect()
}

impl InmateDirectory for SqliteStore {
    fn find_inmate(&self, inmate_id: &str) -> Result<Option<InmateRecord>, StoreError> {
        let conn = self.lock()?;

        let row = conn
            .query_row(
                "SELECT inmate_id, full_name, start_date, sentence_length
                 FROM inmates WHERE inmate_id = ?1",
                [inmate_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, f64>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((inmate_id, full_name, start_date, sentence_length)) => Ok(Some(InmateRecord {
                inmate_id,
                full_name,
                start_date: start_date.as_deref().map(parse_date).transpose()?,
                sentence_length,
            })),
            None => Ok(None),
        }
    }
}

impl BehaviorStore for SqliteStore {
    fn list_entries(&self, inmate_id: &str) -> Result<Vec<BehaviorLogEntry>, StoreError> {
        let conn = self.lock()?;
        load_entries(&conn, inmate_id)
    }

    fn list_batches(&self, inmate_id: &str) -> Result<Vec<SubmissionBatch>, StoreError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT batch_id, inmate_id, committee_name, signature_ref, submitted_at
             FROM behavior_batches
             WHERE inmate_id = ?1
             ORDER BY id ASC",
        )?;

        let rows = stmt
            .query_map([inmate_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut batches = rows
            .into_iter()
            .map(
                |(batch_id, inmate_id, committee_name, signature_ref, submitted_at)| {
                    Ok(SubmissionBatch {
                        batch_id,
                        inmate_id,
                        committee_name,
                        signature_ref,
                        submitted_at: parse_timestamp(&submitted_at)?,
                        entries: Vec::new(),
                    })
                },
            )
            .collect::<Result<Vec<_>, StoreError>>()?;

        for entry in load_entries(&conn, inmate_id)? {
            match batches.iter_mut().find(|b| b.batch_id == entry.batch_id) {
                Some(batch) => batch.entries.push(entry),
                None => {
                    return Err(StoreError::Corrupt(format!(
                        "entry references unknown batch {}",
                        entry.batch_id
                    )))
                }
            }
        }

        Ok(batches)
    }

    fn append_batch(&self, batch: &SubmissionBatch) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let (year, month) = batch.period();
        let submitted_at = batch.submitted_at.to_rfc3339();

        // IMMEDIATE takes the write lock up front; dropping tx without commit rolls back
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT OR IGNORE INTO parole_records (inmate_id, created_at) VALUES (?1, ?2)",
            params![batch.inmate_id, submitted_at],
        )?;

        let inserted = tx.execute(
            "INSERT INTO behavior_batches (
                batch_id, inmate_id, period_year, period_month,
                committee_name, signature_ref, submitted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                batch.batch_id,
                batch.inmate_id,
                year,
                month,
                batch.committee_name,
                batch.signature_ref,
                submitted_at,
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                warn!(
                    inmate_id = %batch.inmate_id,
                    year,
                    month,
                    "unique month index rejected behavior batch"
                );
                return Err(StoreError::Conflict {
                    inmate_id: batch.inmate_id.clone(),
                    year,
                    month,
                });
            }
            Err(e) => return Err(e.into()),
        }

        for entry in &batch.entries {
            tx.execute(
                "INSERT INTO behavior_entries (batch_id, inmate_id, rule_id, points, submitted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.batch_id,
                    entry.inmate_id,
                    entry.rule_id,
                    entry.points,
                    entry.submitted_at.to_rfc3339(),
                ],
            )?;
        }

        let event = Event::new(
            "behavior_batch_submitted",
            "parole_record",
            &batch.inmate_id,
            serde_json::json!({
                "batch_id": batch.batch_id,
                "committee_name": batch.committee_name,
                "signature_ref": batch.signature_ref,
                "entries": batch.entries.len(),
                "period": format!("{}-{:02}", year, month),
            }),
            &batch.committee_name,
            batch.submitted_at,
        );
        insert_event(&tx, &event)?;

        tx.commit()?;

        info!(
            inmate_id = %batch.inmate_id,
            batch_id = %batch.batch_id,
            entries = batch.entries.len(),
            "behavior batch persisted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn feb(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 2, day, 9, 0, 0).unwrap()
    }

    fn seeded_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert_inmate(&InmateRecord::new(
                "inm-1",
                NaiveDate::from_ymd_opt(2023, 1, 10),
                3.0,
            ))
            .unwrap();
        store
    }

    #[test]
    fn test_inmate_round_trip() {
        let store = seeded_store();

        let record = store.find_inmate("inm-1").unwrap().unwrap();
        assert_eq!(record.start_date, NaiveDate::from_ymd_opt(2023, 1, 10));
        assert_eq!(record.sentence_length, 3.0);

        // Upsert replaces values
        store
            .upsert_inmate(&InmateRecord::new("inm-1", None, 4.5))
            .unwrap();
        let record = store.find_inmate("inm-1").unwrap().unwrap();
        assert_eq!(record.start_date, None);
        assert_eq!(record.sentence_length, 4.5);

        assert!(store.find_inmate("nobody").unwrap().is_none());
    }

    #[test]
    fn test_append_and_list_batches() {
        let store = seeded_store();
        let batch = SubmissionBatch::new("inm-1", &[(1, 5), (7, 3)], "Board A", "sig-77", feb(15));

        store.append_batch(&batch).unwrap();

        let batches = store.list_batches("inm-1").unwrap();
        assert_eq!(batches, vec![batch.clone()]);

        let entries = store.list_entries("inm-1").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].rule_id, 7);
        assert_eq!(entries[1].submitted_at, feb(15));
    }

    #[test]
    fn test_unique_month_index_rejects_second_batch() {
        let store = seeded_store();

        store
            .append_batch(&SubmissionBatch::new("inm-1", &[(1, 5)], "Board", "sig", feb(15)))
            .unwrap();
        let err = store
            .append_batch(&SubmissionBatch::new("inm-1", &[(2, 4), (3, 4)], "Board", "sig", feb(28)))
            .unwrap_err();

        assert!(matches!(err, StoreError::Conflict { year: 2023, month: 2, .. }));
        // Rolled back: nothing from the rejected batch remains
        assert_eq!(store.entry_count("inm-1").unwrap(), 1);
        assert_eq!(store.list_batches("inm-1").unwrap().len(), 1);
    }

    #[test]
    fn test_failed_entry_rolls_back_whole_batch() {
        let store = seeded_store();
        let mut batch = SubmissionBatch::new("inm-1", &[(1, 5), (2, 5)], "Board", "sig", feb(15));
        // Violates the points CHECK constraint on the second entry
        batch.entries[1].points = 9;

        assert!(store.append_batch(&batch).is_err());
        assert_eq!(store.entry_count("inm-1").unwrap(), 0);
        assert!(store.list_batches("inm-1").unwrap().is_empty());
    }

    #[test]
    fn test_batch_event_logged() {
        let store = seeded_store();
        let batch = SubmissionBatch::new("inm-1", &[(1, 5)], "Board A", "sig-1", feb(15));
        store.append_batch(&batch).unwrap();

        let events = store.events_for_entity("parole_record", "inm-1").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "behavior_batch_submitted");
        assert_eq!(events[0].actor, "Board A");
        assert_eq!(events[0].data["batch_id"], batch.batch_id);
    }

    #[test]
    fn test_event_log() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let event = Event::new(
            "test_event",
            "inmate",
            "test_id_123",
            serde_json::json!({"test": "data"}),
            "test_actor",
            Utc::now(),
        );

        insert_event(&conn, &event).unwrap();

        let events = get_events_for_entity(&conn, "inmate", "test_id_123").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "test_event");
        assert_eq!(events[0].actor, "test_actor");
    }
}
