use loggit_db::DbRuntimeSettings;
use loggit_events::EventStore;
use tempfile::TempDir;

/// Opens a provisioned store in a fresh temporary directory.
pub fn open_store() -> (TempDir, EventStore) {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let store = open_store_in(&dir, "events.db");
    (dir, store)
}

pub fn open_store_in(dir: &TempDir, file: &str) -> EventStore {
    let path = dir.path().join(file);
    let store = EventStore::open(path.to_str().expect("utf-8 path"), DbRuntimeSettings::default())
        .expect("failed to open events database");
    store.provision().expect("failed to provision collection");
    store
}
