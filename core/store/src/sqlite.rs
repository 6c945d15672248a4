//! SQLite-backed event store.
//!
//! Persists synced events locally for offline access. Every entity is one
//! row keyed by `(kind, uuid)` with its decoded fields stored as JSON, so
//! all four variants share one table and one delete path.

use async_trait::async_trait;
use chrono::SecondsFormat;
use rusqlite::{params, Connection, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use pinsync_common::{Error, EventKind, Result};

use crate::entity::LocalEvent;
use crate::store::{EventFilter, EventStore, SaveSummary, StagedOp, Staging};

/// Schema version recorded in `PRAGMA user_version`.
const SCHEMA_VERSION: i64 = 1;

fn store_err(e: rusqlite::Error) -> Error {
    Error::Store(e.to_string())
}

/// Persistent event store using SQLite.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    staged: Mutex<Staging>,
}

impl SqliteStore {
    /// Create or open an event database.
    ///
    /// # Errors
    /// - Database creation or migration failure
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref()).map_err(store_err)?;
        Self::init(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                kind TEXT NOT NULL,
                uuid TEXT NOT NULL,
                created_at TEXT NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (kind, uuid)
            );

            CREATE INDEX IF NOT EXISTS idx_events_created ON events(kind, created_at);

            CREATE TEMP TABLE IF NOT EXISTS filter_ids (
                uuid TEXT PRIMARY KEY
            );
            "#,
        )
        .map_err(store_err)?;

        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(store_err)?;
        if version > SCHEMA_VERSION {
            return Err(Error::Store(format!(
                "Database schema version {} is newer than supported version {}",
                version, SCHEMA_VERSION
            )));
        }
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(store_err)?;

        info!("Event store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            staged: Mutex::new(Staging::default()),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| Error::Store("Connection lock poisoned".to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| Error::Store(format!("Store task failed: {}", e)))?
    }

    fn staging(&self) -> Result<MutexGuard<'_, Staging>> {
        self.staged
            .lock()
            .map_err(|_| Error::Store("Staging lock poisoned".to_string()))
    }

    /// Apply `ops` in one transaction.
    async fn commit(&self, ops: Vec<StagedOp>) -> Result<SaveSummary> {
        if ops.is_empty() {
            return Ok(SaveSummary::default());
        }

        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(store_err)?;
            let mut summary = SaveSummary::default();
            for op in ops {
                Self::apply(&tx, op, &mut summary)?;
            }
            tx.commit().map_err(store_err)?;
            debug!(
                "Committed {} upserts, {} deletes",
                summary.upserted, summary.deleted
            );
            Ok(summary)
        })
        .await
    }

    fn apply(tx: &Transaction<'_>, op: StagedOp, summary: &mut SaveSummary) -> Result<()> {
        match op {
            StagedOp::Upsert(event) => {
                let payload = serde_json::to_string(&event)?;
                tx.execute(
                    r#"
                    INSERT OR REPLACE INTO events (kind, uuid, created_at, payload)
                    VALUES (?1, ?2, ?3, ?4)
                    "#,
                    params![
                        event.kind().as_str(),
                        event.uuid().to_string(),
                        event.created_at().to_rfc3339_opts(SecondsFormat::Micros, true),
                        payload,
                    ],
                )
                .map_err(store_err)?;
                summary.upserted += 1;
            }
            StagedOp::Delete { kind, filter } => {
                summary.deleted += Self::delete_matching(tx, kind, &filter)?;
            }
        }
        Ok(())
    }

    fn load_filter_ids<'a>(
        tx: &Transaction<'_>,
        ids: impl IntoIterator<Item = &'a Uuid>,
    ) -> Result<()> {
        tx.execute("DELETE FROM filter_ids", []).map_err(store_err)?;
        let mut stmt = tx
            .prepare("INSERT OR IGNORE INTO filter_ids (uuid) VALUES (?1)")
            .map_err(store_err)?;
        for id in ids {
            stmt.execute(params![id.to_string()]).map_err(store_err)?;
        }
        Ok(())
    }

    fn delete_matching(tx: &Transaction<'_>, kind: EventKind, filter: &EventFilter) -> Result<usize> {
        let deleted = match filter {
            EventFilter::All => tx
                .execute("DELETE FROM events WHERE kind = ?1", params![kind.as_str()])
                .map_err(store_err)?,
            EventFilter::Ids(ids) => {
                Self::load_filter_ids(tx, ids)?;
                tx.execute(
                    "DELETE FROM events WHERE kind = ?1 AND uuid IN (SELECT uuid FROM filter_ids)",
                    params![kind.as_str()],
                )
                .map_err(store_err)?
            }
            EventFilter::NotIn(ids) => {
                Self::load_filter_ids(tx, ids)?;
                tx.execute(
                    "DELETE FROM events WHERE kind = ?1 AND uuid NOT IN (SELECT uuid FROM filter_ids)",
                    params![kind.as_str()],
                )
                .map_err(store_err)?
            }
        };
        debug!("Deleted {} {} events", deleted, kind);
        Ok(deleted)
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert(&self, event: LocalEvent) -> Result<()> {
        let kind = event.kind();
        self.staging()?.push(kind, StagedOp::Upsert(event));
        Ok(())
    }

    async fn delete(&self, kind: EventKind, filter: EventFilter) -> Result<()> {
        self.staging()?.push(kind, StagedOp::Delete { kind, filter });
        Ok(())
    }

    async fn save(&self, kind: EventKind) -> Result<SaveSummary> {
        let ops = self.staging()?.take(kind);
        self.commit(ops).await
    }

    async fn save_all(&self) -> Result<SaveSummary> {
        let ops = self.staging()?.take_all();
        self.commit(ops).await
    }

    async fn rollback(&self, kind: EventKind) -> Result<()> {
        self.staging()?.take(kind);
        Ok(())
    }

    async fn fetch(&self, kind: EventKind, filter: EventFilter) -> Result<Vec<LocalEvent>> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT uuid, payload FROM events
                    WHERE kind = ?1
                    ORDER BY created_at ASC, uuid ASC
                    "#,
                )
                .map_err(store_err)?;

            let rows = stmt
                .query_map(params![kind.as_str()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(store_err)?;

            let mut events = Vec::new();
            for row in rows {
                let (raw_uuid, payload) = row.map_err(store_err)?;
                let uuid = Uuid::parse_str(&raw_uuid)
                    .map_err(|e| Error::Store(format!("Corrupt uuid '{}': {}", raw_uuid, e)))?;
                if !filter.matches(&uuid) {
                    continue;
                }
                let event: LocalEvent = serde_json::from_str(&payload)
                    .map_err(|e| Error::Store(format!("Corrupt event {}: {}", uuid, e)))?;
                events.push(event);
            }
            Ok(events)
        })
        .await
    }

    async fn count(&self, kind: EventKind) -> Result<usize> {
        self.with_conn(move |conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM events WHERE kind = ?1",
                    params![kind.as_str()],
                    |row| row.get(0),
                )
                .map_err(store_err)?;
            Ok(count as usize)
        })
        .await
    }
}
