use loggit_db::{open_pool, run_migrations, DbRuntimeSettings, Schema};

#[test]
fn db_initialization_works() {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let path = dir.path().join("events.db");
    let pool = open_pool(
        path.to_str().expect("utf-8 path"),
        Schema::Events,
        DbRuntimeSettings::default(),
    )
    .expect("failed to create pool");
    let conn = pool.get().expect("failed to get connection");
    let applied = run_migrations(&conn, Schema::Events).expect("failed to run migrations");
    assert_eq!(applied, 3);

    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .expect("failed to prepare table query");
    let tables: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .expect("failed to execute table query")
        .map(|r| r.expect("failed to read table name"))
        .collect();

    assert_eq!(
        tables,
        vec!["_loggit_migrations", "events", "replication_checkpoints"]
    );
}

#[test]
fn migrations_persist_across_pools() {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let path = dir.path().join("settings.db");
    let path = path.to_str().expect("utf-8 path");

    {
        let pool = open_pool(path, Schema::Settings, DbRuntimeSettings::default()).expect("pool");
        let conn = pool.get().expect("conn");
        assert_eq!(run_migrations(&conn, Schema::Settings).expect("migrate"), 1);
    }

    let pool = open_pool(path, Schema::Settings, DbRuntimeSettings::default()).expect("pool");
    let conn = pool.get().expect("conn");
    assert_eq!(run_migrations(&conn, Schema::Settings).expect("migrate"), 0);
}
