//! The event collection: CRUD, date-range queries and erase.
//!
//! Reads filter out tombstones. Writes go through [`write_document`], which
//! computes the next revision, extends the stored revision ancestry and
//! assigns a fresh sequence number in the same statement as the write.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use loggit_db::{open_pool, run_migrations, DbPool, DbRuntimeSettings, Schema};
use loggit_types::date::{self, ALL_TIME_RANGE, EXPORT_RANGE};
use loggit_types::{generate_event_id, Event, EventDocument, Revision, RevisionHistory};
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::EventError;
use crate::revision::next_revision;

/// Message of the validation error raised for blank names.
pub const INVALID_NAME_MESSAGE: &str = "The event needs a valid name.";

/// Partial update of an existing event. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventUpdate {
    pub name: Option<String>,
    pub date: Option<String>,
}

/// Outcome of [`EventStore::bulk_insert`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkInsertReport {
    /// Number of documents written.
    pub inserted: usize,
    /// Ids that already existed as live documents and were left alone.
    pub skipped: Vec<String>,
    /// Ids of documents rejected by validation.
    pub rejected: Vec<String>,
}

/// Handle to the event collection.
///
/// Cloning is cheap and clones share the pool and the collection state.
#[derive(Clone)]
pub struct EventStore {
    pool: DbPool,
    collection_ready: Arc<AtomicBool>,
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("collection_ready", &self.has_collection())
            .finish_non_exhaustive()
    }
}

const SELECT_COLUMNS: &str = "id, name, date, rev";

fn map_row_to_event(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        name: row.get(1)?,
        date: row.get(2)?,
        revision: Some(row.get(3)?),
    })
}

impl EventStore {
    /// Wraps an existing pool. The collection is not provisioned yet.
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            collection_ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Opens the events database at `path`. The collection still has to be
    /// provisioned.
    pub fn open(path: &str, settings: DbRuntimeSettings) -> Result<Self, EventError> {
        Ok(Self::new(open_pool(path, Schema::Events, settings)?))
    }

    /// Creates the collection tables if needed and marks the collection
    /// available.
    pub fn provision(&self) -> Result<(), EventError> {
        let conn = self.pool.get()?;
        let applied = run_migrations(&conn, Schema::Events)?;
        if applied > 0 {
            tracing::info!(count = applied, "provisioned event collection");
        }
        self.collection_ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Returns `true` while the collection is provisioned.
    pub fn has_collection(&self) -> bool {
        self.collection_ready.load(Ordering::SeqCst)
    }

    pub(crate) fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, EventError> {
        Ok(self.pool.get()?)
    }

    /// Events dated within `month` (`YYYY-MM`), newest first.
    ///
    /// The range is `[month-01, month-31]` compared as strings.
    pub fn fetch_by_month(&self, month: &str) -> Result<Vec<Event>, EventError> {
        let (from, to) = date::month_range(month);
        self.fetch_descending(&from, &to)
    }

    /// All events, newest first.
    pub fn fetch_all(&self) -> Result<Vec<Event>, EventError> {
        self.fetch_descending(ALL_TIME_RANGE.0, ALL_TIME_RANGE.1)
    }

    /// All events for a backup, oldest first.
    pub fn fetch_for_export(&self) -> Result<Vec<Event>, EventError> {
        self.fetch_range(EXPORT_RANGE.0, EXPORT_RANGE.1)
    }

    fn fetch_descending(&self, from: &str, to: &str) -> Result<Vec<Event>, EventError> {
        let mut events = self.fetch_range(from, to)?;
        events.reverse();
        Ok(events)
    }

    /// Live events with `from <= date <= to`, ascending by date and then
    /// by insertion order.
    pub fn fetch_range(&self, from: &str, to: &str) -> Result<Vec<Event>, EventError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM events
             WHERE deleted = 0 AND date >= ?1 AND date <= ?2
             ORDER BY date ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map(params![from, to], map_row_to_event)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    /// Retrieves a live event by id.
    pub fn get(&self, id: &str) -> Result<Event, EventError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM events WHERE id = ?1 AND deleted = 0"),
            [id],
            map_row_to_event,
        )
        .optional()?
        .ok_or_else(|| EventError::NotFound(id.to_string()))
    }

    /// Inserts a new event and returns it as stored.
    ///
    /// Blank names are rejected, invalid dates are replaced by today, and
    /// the new-event sentinel (or an empty id) is replaced by a generated id.
    pub fn insert(&self, event: Event) -> Result<Event, EventError> {
        let event = normalize(event)?;
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        if live_revision(&tx, &event.id)?.is_some() {
            return Err(EventError::Conflict(event.id));
        }
        let stored = write_document(&tx, &event.id, &event.name, &event.date, false)?;
        tx.commit()?;
        tracing::debug!(event_id = %stored.id, "inserted event");
        Ok(stored)
    }

    /// Applies a partial update to the live event `id`.
    pub fn update(&self, id: &str, fields: &EventUpdate) -> Result<Event, EventError> {
        if let Some(name) = &fields.name {
            if name.trim().is_empty() {
                return Err(EventError::Validation(INVALID_NAME_MESSAGE.to_string()));
            }
        }

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let current = tx
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM events WHERE id = ?1 AND deleted = 0"),
                [id],
                map_row_to_event,
            )
            .optional()?
            .ok_or_else(|| EventError::NotFound(id.to_string()))?;

        let name = fields.name.clone().unwrap_or(current.name);
        let date = match &fields.date {
            Some(d) if date::is_valid_date(d) => d.clone(),
            Some(_) => date::today(),
            None => current.date,
        };
        let stored = write_document(&tx, id, &name, &date, false)?;
        tx.commit()?;
        tracing::debug!(event_id = %id, "updated event");
        Ok(stored)
    }

    /// Deletes the live event `id`, leaving a tombstone for replication.
    pub fn remove(&self, id: &str) -> Result<(), EventError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        if live_revision(&tx, id)?.is_none() {
            return Err(EventError::NotFound(id.to_string()));
        }
        write_document(&tx, id, "", "", true)?;
        tx.commit()?;
        tracing::debug!(event_id = %id, "removed event");
        Ok(())
    }

    /// Inserts many events in one transaction.
    ///
    /// Events whose id already exists as a live document are skipped, and
    /// events with a blank name are rejected; both are reported rather than
    /// failing the whole batch.
    pub fn bulk_insert(&self, events: &[Event]) -> Result<BulkInsertReport, EventError> {
        let mut report = BulkInsertReport::default();
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        for event in events {
            let event = match normalize(event.clone()) {
                Ok(event) => event,
                Err(_) => {
                    report.rejected.push(event.id.clone());
                    continue;
                }
            };
            if live_revision(&tx, &event.id)?.is_some() {
                report.skipped.push(event.id);
                continue;
            }
            write_document(&tx, &event.id, &event.name, &event.date, false)?;
            report.inserted += 1;
        }

        tx.commit()?;
        tracing::info!(
            inserted = report.inserted,
            skipped = report.skipped.len(),
            rejected = report.rejected.len(),
            "bulk inserted events"
        );
        Ok(report)
    }

    /// Removes every document of the collection and marks it unavailable
    /// until [`provision`](Self::provision) runs again.
    pub fn remove_collection(&self) -> Result<usize, EventError> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM events", [])?;
        self.collection_ready.store(false, Ordering::SeqCst);
        tracing::info!(count = removed, "removed event collection");
        Ok(removed)
    }

    /// Destroys the collection's storage: documents, tombstones, change
    /// sequence, replication checkpoints and migration history. The file
    /// is vacuumed and the WAL truncated afterwards.
    pub fn erase_all(&self) -> Result<(), EventError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "BEGIN;
             DROP TABLE IF EXISTS events;
             DROP TABLE IF EXISTS replication_checkpoints;
             DROP TABLE IF EXISTS _loggit_migrations;
             COMMIT;",
        )?;
        conn.execute_batch("VACUUM;")?;
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE);", [], |_| Ok(()))?;
        self.collection_ready.store(false, Ordering::SeqCst);
        tracing::info!("erased local event storage");
        Ok(())
    }
}

/// Validates and completes an event before it is written.
fn normalize(mut event: Event) -> Result<Event, EventError> {
    if !event.has_valid_name() {
        return Err(EventError::Validation(INVALID_NAME_MESSAGE.to_string()));
    }
    if !date::is_valid_date(&event.date) {
        event.date = date::today();
    }
    if event.is_new() {
        event.id = generate_event_id();
    }
    Ok(event)
}

/// Revision of the live document `id`, if any.
fn live_revision(conn: &Connection, id: &str) -> Result<Option<String>, EventError> {
    Ok(conn
        .query_row(
            "SELECT rev FROM events WHERE id = ?1 AND deleted = 0",
            [id],
            |row| row.get(0),
        )
        .optional()?)
}

/// Column list matching [`map_row_to_document`].
pub(crate) const DOCUMENT_COLUMNS: &str = "id, rev, name, date, deleted, ancestry";

/// Reads a row selected with [`DOCUMENT_COLUMNS`], ancestry included.
pub(crate) fn map_row_to_document(row: &Row<'_>) -> rusqlite::Result<EventDocument> {
    let rev: String = row.get(1)?;
    let ancestry: String = row.get(5)?;
    let revisions = rev.parse::<Revision>().ok().map(|parsed| {
        let mut ids = vec![parsed.hash];
        ids.extend(
            ancestry
                .split(',')
                .filter(|hash| !hash.is_empty())
                .map(str::to_string),
        );
        RevisionHistory {
            start: parsed.generation,
            ids,
        }
    });
    Ok(EventDocument {
        id: row.get(0)?,
        rev,
        name: row.get(2)?,
        date: row.get(3)?,
        deleted: row.get(4)?,
        revisions,
    })
}

/// The stored document `id`, tombstones included.
pub(crate) fn stored_document(
    conn: &Connection,
    id: &str,
) -> Result<Option<EventDocument>, EventError> {
    Ok(conn
        .query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM events WHERE id = ?1"),
            [id],
            map_row_to_document,
        )
        .optional()?)
}

/// Writes a local edit of `id` on top of whatever revision is stored.
fn write_document(
    conn: &Connection,
    id: &str,
    name: &str,
    date: &str,
    deleted: bool,
) -> Result<Event, EventError> {
    let previous = stored_document(conn, id)?;
    let previous_rev = previous.as_ref().and_then(|doc| doc.rev.parse::<Revision>().ok());
    let rev = next_revision(previous_rev.as_ref(), id, name, date, deleted);
    let history = match previous.as_ref().and_then(|doc| doc.history().ok()) {
        Some(history) => history.extend(&rev),
        None => RevisionHistory::root(&rev),
    };

    let doc = EventDocument {
        id: id.to_string(),
        rev: rev.to_string(),
        name: name.to_string(),
        date: date.to_string(),
        deleted,
        revisions: None,
    };
    upsert_document(conn, &doc, &history)?;
    Ok(Event {
        id: doc.id,
        name: doc.name,
        date: doc.date,
        revision: Some(doc.rev),
    })
}

/// Stores a document revision with its ancestry and assigns it the next
/// sequence number.
pub(crate) fn upsert_document(
    conn: &Connection,
    doc: &EventDocument,
    history: &RevisionHistory,
) -> Result<(), EventError> {
    conn.execute(
        "INSERT INTO events (id, rev, name, date, deleted, ancestry, seq)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, (SELECT COALESCE(MAX(seq), 0) + 1 FROM events))
         ON CONFLICT(id) DO UPDATE SET
            rev = excluded.rev,
            name = excluded.name,
            date = excluded.date,
            deleted = excluded.deleted,
            ancestry = excluded.ancestry,
            seq = excluded.seq,
            updated_at = datetime('now')",
        params![
            doc.id,
            doc.rev,
            doc.name,
            doc.date,
            doc.deleted,
            history.ancestor_ids().join(","),
        ],
    )?;
    Ok(())
}
