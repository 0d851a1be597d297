//! Unit store behaviour shared by the in-memory and SQLite backends

use serde_json::json;

use gitlab_charm::store::{ConfigStore, ConfigStoreExt, MemoryStore, SqliteStore};

fn exercise(store: &mut dyn ConfigStore) {
    assert_eq!(store.get("missing").unwrap(), None);
    store.unset("missing").unwrap();

    store.set("port", json!(5432)).unwrap();
    assert_eq!(store.get_string("port").unwrap().as_deref(), Some("5432"));
    assert!(store.is_set("port").unwrap());

    store.set_str("host", "").unwrap();
    assert!(!store.is_set("host").unwrap());

    store.set_bool("flag", false).unwrap();
    assert!(!store.is_set("flag").unwrap());
    store.set_bool("flag", true).unwrap();
    assert!(store.is_set("flag").unwrap());

    store.set("nothing", json!(null)).unwrap();
    assert!(!store.is_set("nothing").unwrap());

    store.unset_all(&["port", "flag"]).unwrap();
    assert_eq!(store.get("port").unwrap(), None);
    assert_eq!(store.get("flag").unwrap(), None);
}

#[test]
fn test_memory_store_semantics() {
    exercise(&mut MemoryStore::new());
}

#[test]
fn test_sqlite_store_semantics() {
    exercise(&mut SqliteStore::open_in_memory().unwrap());
}

#[test]
fn test_sqlite_store_is_unitdata_compatible() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".unit-state.db");

    {
        let mut store = SqliteStore::open(&path).unwrap();
        store.set_str("pgsql_host", "10.0.0.1").unwrap();
        store.set_bool("mysql_migration_run", true).unwrap();
    }

    let conn = rusqlite::Connection::open(&path).unwrap();
    let data: String = conn
        .query_row("SELECT data FROM kv WHERE key = ?1", ["pgsql_host"], |row| row.get(0))
        .unwrap();
    assert_eq!(data, "\"10.0.0.1\"");

    let store = SqliteStore::open(&path).unwrap();
    assert!(store.is_set("mysql_migration_run").unwrap());
}
