//! Shared types for the Loggit event log.
//!
//! This crate holds the data model every other Loggit crate speaks: the
//! logical [`Event`] record used by the UI and by import/export, the
//! replicated [`EventDocument`] form with its revision tag, the fixed set
//! of persisted settings, and the date helpers that define month ranges.
//!
//! Nothing here touches storage or the network.

pub mod date;
mod revision;
mod setting;

pub use revision::{ParseRevisionError, Revision, RevisionHistory, REVS_LIMIT};
pub use setting::{ParseSettingNameError, Setting, SettingName, SETTING_KEY_PREFIX};

use serde::{Deserialize, Serialize};

/// Id used by callers to mark an event that has not been stored yet.
pub const NEW_EVENT_ID: &str = "newEvent";

/// Name of the only document collection.
pub const EVENTS_COLLECTION: &str = "events";

/// A named, dated occurrence logged by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Stable identifier. Empty or [`NEW_EVENT_ID`] means "not stored yet".
    #[serde(default)]
    pub id: String,
    /// Display name. Must be non-empty after trimming.
    pub name: String,
    /// Calendar date, `YYYY-MM-DD`.
    pub date: String,
    /// Revision tag, present only on records read back from storage.
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl Event {
    /// Creates an unsaved event carrying the [`NEW_EVENT_ID`] sentinel.
    pub fn new(name: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            id: NEW_EVENT_ID.to_string(),
            name: name.into(),
            date: date.into(),
            revision: None,
        }
    }

    /// Returns `true` if this event has no stored identity yet.
    pub fn is_new(&self) -> bool {
        self.id.is_empty() || self.id == NEW_EVENT_ID
    }

    /// Returns `true` if the name is non-empty after trimming.
    pub fn has_valid_name(&self) -> bool {
        !self.name.trim().is_empty()
    }

    /// Drops the revision tag, producing the wire form used by backups.
    pub fn without_revision(mut self) -> Self {
        self.revision = None;
        self
    }
}

/// Generates a fresh event id from the current time and a random component.
pub fn generate_event_id() -> String {
    format!(
        "{}:{}",
        chrono::Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4().simple()
    )
}

/// A stored event in its replicated form.
///
/// This is the shape exchanged with remote endpoints: it always carries a
/// revision, and deletions travel as tombstones with `deleted = true`.
/// `revisions` carries the ancestry when it is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev")]
    pub rev: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub date: String,
    #[serde(rename = "_deleted", default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    #[serde(rename = "_revisions", default, skip_serializing_if = "Option::is_none")]
    pub revisions: Option<RevisionHistory>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl EventDocument {
    /// The ancestry of this revision. Falls back to the revision alone when
    /// `revisions` is missing or does not end in `rev`.
    pub fn history(&self) -> Result<RevisionHistory, ParseRevisionError> {
        let rev: Revision = self.rev.parse()?;
        Ok(self.history_of(&rev))
    }

    fn history_of(&self, rev: &Revision) -> RevisionHistory {
        match &self.revisions {
            Some(history) if history.start == rev.generation && history.contains(rev) => {
                history.clone()
            }
            _ => RevisionHistory::root(rev),
        }
    }

    /// Whether this document replaces `current`, another revision of the
    /// same id.
    ///
    /// A descendant replaces its ancestor and never the other way round.
    /// Between conflicting revisions a live one beats a deleted one and
    /// then the larger revision wins, the same winner a CouchDB server
    /// picks. An unparseable incoming revision never wins.
    pub fn supersedes(&self, current: &EventDocument) -> bool {
        let Ok(incoming) = self.rev.parse::<Revision>() else {
            return false;
        };
        let Ok(stored) = current.rev.parse::<Revision>() else {
            return true;
        };
        if incoming == stored {
            return false;
        }
        if self.history_of(&incoming).contains(&stored) {
            return true;
        }
        if current.history_of(&stored).contains(&incoming) {
            return false;
        }
        (!self.deleted, incoming) > (!current.deleted, stored)
    }
}

/// The canonical backup payload: all events, ascending by date, without
/// revision tags and without settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportPayload {
    pub events: Vec<Event>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_event_uses_sentinel_id() {
        let event = Event::new("Coffee", "2024-03-01");
        assert_eq!(event.id, NEW_EVENT_ID);
        assert!(event.is_new());
    }

    #[test]
    fn blank_name_is_invalid() {
        assert!(!Event::new("   ", "2024-03-01").has_valid_name());
        assert!(Event::new(" Gym ", "2024-03-01").has_valid_name());
    }

    #[test]
    fn generated_ids_are_unique_and_not_sentinel() {
        let a = generate_event_id();
        let b = generate_event_id();
        assert_ne!(a, b);
        assert_ne!(a, NEW_EVENT_ID);
        assert!(a.contains(':'), "id should combine time and randomness: {a}");
    }

    #[test]
    fn export_payload_omits_revision() {
        let event = Event {
            id: "1".to_string(),
            name: "Run".to_string(),
            date: "2024-01-02".to_string(),
            revision: Some("1-abc".to_string()),
        };
        let payload = ExportPayload {
            events: vec![event.without_revision()],
        };
        let json = serde_json::to_value(&payload).expect("payload should serialize");
        assert_eq!(
            json,
            serde_json::json!({ "events": [{ "id": "1", "name": "Run", "date": "2024-01-02" }] })
        );
    }

    #[test]
    fn import_payload_accepts_missing_id() {
        let payload: ExportPayload =
            serde_json::from_str(r#"{"events":[{"name":"Run","date":"2024-01-02"}]}"#)
                .expect("payload should parse");
        assert!(payload.events[0].is_new());
    }

    #[test]
    fn tombstone_serializes_deleted_flag() {
        let doc = EventDocument {
            id: "a".to_string(),
            rev: "2-ff".to_string(),
            name: String::new(),
            date: String::new(),
            deleted: true,
            revisions: None,
        };
        let json = serde_json::to_value(&doc).expect("doc should serialize");
        assert_eq!(json["_deleted"], true);
        assert_eq!(json["_id"], "a");
        assert!(json.get("_revisions").is_none());
    }

    fn doc(rev: &str, deleted: bool, ancestors: &[&str]) -> EventDocument {
        let parsed: Revision = rev.parse().unwrap();
        let mut ids = vec![parsed.hash.clone()];
        ids.extend(ancestors.iter().map(|a| a.to_string()));
        EventDocument {
            id: "e".to_string(),
            rev: rev.to_string(),
            name: if deleted { String::new() } else { "Run".to_string() },
            date: if deleted { String::new() } else { "2024-01-02".to_string() },
            deleted,
            revisions: Some(RevisionHistory {
                start: parsed.generation,
                ids,
            }),
        }
    }

    #[test]
    fn descendant_tombstone_replaces_live_ancestor() {
        let live = doc("1-aa", false, &[]);
        let deleted = doc("2-bb", true, &["aa"]);
        assert!(deleted.supersedes(&live));
        assert!(!live.supersedes(&deleted));
    }

    #[test]
    fn live_edit_beats_conflicting_tombstone() {
        let deleted = doc("2-zzzz", true, &["aa"]);
        let edited = doc("2-aaaa", false, &["aa"]);
        assert!(edited.supersedes(&deleted));
        assert!(!deleted.supersedes(&edited));
    }

    #[test]
    fn live_edit_beats_deeper_conflicting_tombstone() {
        let deleted = doc("3-dd", true, &["cc", "aa"]);
        let edited = doc("2-bb", false, &["aa"]);
        assert!(edited.supersedes(&deleted));
        assert!(!deleted.supersedes(&edited));
    }

    #[test]
    fn conflicting_live_edits_pick_the_larger_revision() {
        let a = doc("2-aaaa", false, &["11"]);
        let b = doc("2-bbbb", false, &["11"]);
        assert!(b.supersedes(&a));
        assert!(!a.supersedes(&b));
        assert!(!a.supersedes(&a.clone()));
    }

    #[test]
    fn missing_history_compares_revisions_only() {
        let mut old = doc("1-aa", false, &[]);
        let mut new = doc("2-bb", false, &[]);
        old.revisions = None;
        new.revisions = None;
        assert!(new.supersedes(&old));
        assert!(!old.supersedes(&new));
    }
}
