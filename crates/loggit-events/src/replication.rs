//! Changes feed, merge of replicated documents, and checkpoints.

use loggit_types::EventDocument;
use rusqlite::{params, OptionalExtension};

use crate::error::EventError;
use crate::store::{
    map_row_to_document, stored_document, upsert_document, EventStore, DOCUMENT_COLUMNS,
};

/// One entry of the local changes feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Local sequence number of this revision.
    pub seq: i64,
    /// The document as currently stored (tombstones included), with its
    /// revision ancestry.
    pub doc: EventDocument,
}

/// Replication progress against one remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// Highest local sequence number pushed to the remote.
    pub pushed_seq: i64,
    /// Opaque remote sequence marker pulled up to.
    pub pulled_seq: String,
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self {
            pushed_seq: 0,
            pulled_seq: "0".to_string(),
        }
    }
}

impl EventStore {
    /// Documents changed after local sequence `since`, in sequence order.
    pub fn changes_since(&self, since: i64, limit: usize) -> Result<Vec<Change>, EventError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS}, seq FROM events
             WHERE seq > ?1
             ORDER BY seq ASC
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![since, limit as i64], |row| {
            Ok(Change {
                seq: row.get(6)?,
                doc: map_row_to_document(row)?,
            })
        })?;

        let mut changes = Vec::new();
        for row in rows {
            changes.push(row?);
        }
        Ok(changes)
    }

    /// Highest local sequence number assigned so far (0 when empty).
    pub fn last_seq(&self) -> Result<i64, EventError> {
        let conn = self.conn()?;
        let seq: Option<i64> = conn.query_row("SELECT MAX(seq) FROM events", [], |row| row.get(0))?;
        Ok(seq.unwrap_or(0))
    }

    /// Merges documents received from a remote.
    ///
    /// A document replaces the stored one when it descends from it, or when
    /// it wins the conflict per [`EventDocument::supersedes`]. The incoming
    /// ancestry is stored with it. Documents with an unparseable revision are
    /// skipped. Returns the number of documents that changed locally.
    pub fn apply_replicated(&self, docs: &[EventDocument]) -> Result<usize, EventError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let mut written = 0;

        for doc in docs {
            let history = match doc.history() {
                Ok(history) => history,
                Err(e) => {
                    tracing::warn!(event_id = %doc.id, error = %e, "skipping replicated document");
                    continue;
                }
            };

            let wins = match stored_document(&tx, &doc.id)? {
                Some(current) => doc.supersedes(&current),
                None => true,
            };
            if !wins {
                continue;
            }

            upsert_document(&tx, doc, &history)?;
            written += 1;
        }

        tx.commit()?;
        if written > 0 {
            tracing::debug!(count = written, "merged replicated documents");
        }
        Ok(written)
    }

    /// Loads the checkpoint for `remote`, or the initial one.
    pub fn checkpoint(&self, remote: &str) -> Result<Checkpoint, EventError> {
        let conn = self.conn()?;
        let checkpoint = conn
            .query_row(
                "SELECT pushed_seq, pulled_seq FROM replication_checkpoints WHERE remote = ?1",
                [remote],
                |row| {
                    Ok(Checkpoint {
                        pushed_seq: row.get(0)?,
                        pulled_seq: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(checkpoint.unwrap_or_default())
    }

    /// Persists the checkpoint for `remote`.
    pub fn save_checkpoint(&self, remote: &str, checkpoint: &Checkpoint) -> Result<(), EventError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO replication_checkpoints (remote, pushed_seq, pulled_seq)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(remote) DO UPDATE SET
                pushed_seq = excluded.pushed_seq,
                pulled_seq = excluded.pulled_seq,
                updated_at = datetime('now')",
            params![remote, checkpoint.pushed_seq, checkpoint.pulled_seq],
        )?;
        Ok(())
    }
}
