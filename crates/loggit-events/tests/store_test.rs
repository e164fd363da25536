mod common;

use common::open_store;
use loggit_events::{EventError, EventUpdate, INVALID_NAME_MESSAGE};
use loggit_types::{date, Event, NEW_EVENT_ID};

fn dated(id: &str, name: &str, date: &str) -> Event {
    let mut event = Event::new(name, date);
    event.id = id.to_string();
    event
}

#[test]
fn blank_name_is_rejected_without_writing() {
    let (_dir, store) = open_store();

    let err = store
        .insert(Event::new("   ", "2024-03-01"))
        .expect_err("blank name should be rejected");
    match err {
        EventError::Validation(message) => assert_eq!(message, INVALID_NAME_MESSAGE),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(store.fetch_all().expect("query").is_empty());
}

#[test]
fn invalid_date_is_replaced_by_today() {
    let (_dir, store) = open_store();

    let stored = store
        .insert(Event::new("Dentist", "31/02/2024"))
        .expect("insert should succeed");
    assert_eq!(stored.date, date::today());
    assert_eq!(store.get(&stored.id).expect("get").date, date::today());
}

#[test]
fn sentinel_id_gets_fresh_unique_ids() {
    let (_dir, store) = open_store();

    let a = store.insert(Event::new("A", "2024-03-01")).expect("insert a");
    let b = store.insert(Event::new("B", "2024-03-01")).expect("insert b");

    assert_ne!(a.id, NEW_EVENT_ID);
    assert_ne!(b.id, NEW_EVENT_ID);
    assert_ne!(a.id, b.id, "rapid inserts must not collide");
    assert_eq!(store.fetch_all().expect("query").len(), 2);
}

#[test]
fn inserting_an_existing_id_conflicts() {
    let (_dir, store) = open_store();
    store.insert(dated("x", "First", "2024-03-01")).expect("insert");

    let err = store
        .insert(dated("x", "Second", "2024-03-02"))
        .expect_err("duplicate id should conflict");
    assert!(matches!(err, EventError::Conflict(id) if id == "x"));
}

#[test]
fn month_query_uses_inclusive_lexical_range() {
    let (_dir, store) = open_store();
    for day in 1..=31 {
        let date = format!("2024-03-{day:02}");
        store.insert(dated(&date, "March", &date)).expect("insert");
    }
    store.insert(dated("apr", "April", "2024-04-01")).expect("insert");
    store.insert(dated("feb", "Feb", "2024-02-29")).expect("insert");

    let march = store.fetch_by_month("2024-03").expect("query");
    assert_eq!(march.len(), 31);
    assert!(march.iter().all(|e| e.date.starts_with("2024-03")));

    let february = store.fetch_by_month("2024-02").expect("query");
    assert_eq!(february.len(), 1, "short months still match with -31 bound");
}

#[test]
fn month_query_is_descending_by_date() {
    let (_dir, store) = open_store();
    store.insert(dated("1", "a", "2024-03-05")).expect("insert");
    store.insert(dated("2", "b", "2024-03-20")).expect("insert");
    store.insert(dated("3", "c", "2024-03-01")).expect("insert");

    let dates: Vec<String> = store
        .fetch_by_month("2024-03")
        .expect("query")
        .into_iter()
        .map(|e| e.date)
        .collect();
    assert_eq!(dates, vec!["2024-03-20", "2024-03-05", "2024-03-01"]);
}

#[test]
fn same_day_events_come_back_in_reverse_insertion_order() {
    let (_dir, store) = open_store();
    store.insert(dated("first", "a", "2024-03-05")).expect("insert");
    store.insert(dated("second", "b", "2024-03-05")).expect("insert");

    let ids: Vec<String> = store
        .fetch_by_month("2024-03")
        .expect("query")
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids, vec!["second", "first"]);
}

#[test]
fn update_changes_only_given_fields() {
    let (_dir, store) = open_store();
    let stored = store.insert(dated("u", "Run", "2024-03-01")).expect("insert");

    let updated = store
        .update(
            "u",
            &EventUpdate {
                name: Some("Long run".to_string()),
                date: None,
            },
        )
        .expect("update");
    assert_eq!(updated.name, "Long run");
    assert_eq!(updated.date, "2024-03-01");
    assert_ne!(updated.revision, stored.revision);
    assert!(updated
        .revision
        .as_deref()
        .is_some_and(|rev| rev.starts_with("2-")));
}

#[test]
fn update_and_remove_of_missing_id_are_not_found() {
    let (_dir, store) = open_store();

    let err = store
        .update("ghost", &EventUpdate::default())
        .expect_err("missing id");
    assert!(matches!(err, EventError::NotFound(_)));

    let err = store.remove("ghost").expect_err("missing id");
    assert!(matches!(err, EventError::NotFound(_)));
}

#[test]
fn removed_events_disappear_and_cannot_be_removed_twice() {
    let (_dir, store) = open_store();
    store.insert(dated("r", "Run", "2024-03-01")).expect("insert");

    store.remove("r").expect("remove");
    assert!(store.fetch_all().expect("query").is_empty());
    assert!(matches!(store.get("r"), Err(EventError::NotFound(_))));
    assert!(matches!(store.remove("r"), Err(EventError::NotFound(_))));
}

#[test]
fn reinserting_a_removed_id_resurrects_it() {
    let (_dir, store) = open_store();
    store.insert(dated("r", "Run", "2024-03-01")).expect("insert");
    store.remove("r").expect("remove");

    let back = store.insert(dated("r", "Run again", "2024-03-02")).expect("insert");
    assert!(back
        .revision
        .as_deref()
        .is_some_and(|rev| rev.starts_with("3-")));
    assert_eq!(store.get("r").expect("get").name, "Run again");
}

#[test]
fn bulk_insert_reports_skips_and_rejections() {
    let (_dir, store) = open_store();
    store.insert(dated("dup", "Existing", "2024-01-01")).expect("insert");

    let report = store
        .bulk_insert(&[
            dated("a", "A", "2024-01-02"),
            dated("dup", "Again", "2024-01-03"),
            dated("blank", " ", "2024-01-04"),
            Event::new("New", "2024-01-05"),
        ])
        .expect("bulk insert");

    assert_eq!(report.inserted, 2);
    assert_eq!(report.skipped, vec!["dup".to_string()]);
    assert_eq!(report.rejected, vec!["blank".to_string()]);
    assert_eq!(store.fetch_all().expect("query").len(), 3);
    assert_eq!(store.get("dup").expect("get").name, "Existing");
}

#[test]
fn export_range_is_ascending() {
    let (_dir, store) = open_store();
    store.insert(dated("b", "b", "2024-05-01")).expect("insert");
    store.insert(dated("a", "a", "2023-01-01")).expect("insert");

    let dates: Vec<String> = store
        .fetch_for_export()
        .expect("query")
        .into_iter()
        .map(|e| e.date)
        .collect();
    assert_eq!(dates, vec!["2023-01-01", "2024-05-01"]);
}

#[test]
fn remove_collection_requires_reprovisioning() {
    let (_dir, store) = open_store();
    store.insert(dated("a", "A", "2024-01-01")).expect("insert");

    let removed = store.remove_collection().expect("remove collection");
    assert_eq!(removed, 1);
    assert!(!store.has_collection());

    store.provision().expect("provision");
    assert!(store.has_collection());
    assert!(store.fetch_all().expect("query").is_empty());
}

#[test]
fn erase_clears_history_and_checkpoints() {
    let (_dir, store) = open_store();
    store.insert(dated("a", "A", "2024-01-01")).expect("insert");
    store.remove("a").expect("remove");
    store
        .save_checkpoint(
            "memory://remote",
            &loggit_events::Checkpoint {
                pushed_seq: 2,
                pulled_seq: "7".to_string(),
            },
        )
        .expect("checkpoint");

    store.erase_all().expect("erase");
    assert!(!store.has_collection());
    assert!(store.fetch_all().is_err(), "tables are gone until provisioned");

    store.provision().expect("provision");
    assert!(store.changes_since(0, 100).expect("changes").is_empty());
    assert_eq!(store.last_seq().expect("seq"), 0);
    assert_eq!(
        store.checkpoint("memory://remote").expect("checkpoint"),
        loggit_events::Checkpoint::default()
    );
}

#[test]
fn data_survives_reopening_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let store = common::open_store_in(&dir, "persist.db");
        store.insert(dated("p", "Persisted", "2024-01-01")).expect("insert");
    }
    let store = common::open_store_in(&dir, "persist.db");
    assert_eq!(store.get("p").expect("get").name, "Persisted");
}
