//! Adapter-indexed SQLite schema.
//!
//! `link` holds one nullable `<adapter>_id` column per adapter. Each adapter
//! owns a snapshot table named after it, keyed by native id.

use std::collections::BTreeSet;

use rusqlite::Connection;

use crate::error::{StoreError, StoreResult};

pub const SCHEMA_VERSION: i64 = 1;

pub const LINK_TABLE: &str = "link";
pub const META_TABLE: &str = "meta";

pub const SNAPSHOT_COLUMNS: &[&str] = &[
    "native_id",
    "link_id",
    "title",
    "location",
    "description",
    "start_time",
    "end_time",
    "completed",
    "modified_at",
    "synced_at",
];

pub fn link_column(adapter: &str) -> String {
    format!("{adapter}_id")
}

pub fn create_statements(adapters: &[String]) -> Vec<String> {
    let mut link_columns = vec![
        "id INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
        "created_at TEXT NOT NULL".to_string(),
    ];
    link_columns.extend(adapters.iter().map(|a| {
        format!(
            "{} TEXT UNIQUE REFERENCES {a}(native_id) ON DELETE SET NULL DEFERRABLE INITIALLY DEFERRED",
            link_column(a)
        )
    }));

    let mut statements = vec![
        format!("CREATE TABLE {META_TABLE} (key TEXT PRIMARY KEY, value TEXT NOT NULL)"),
        format!(
            "INSERT INTO {META_TABLE} (key, value) VALUES ('schema_version', '{SCHEMA_VERSION}')"
        ),
        format!("CREATE TABLE {LINK_TABLE} ({})", link_columns.join(", ")),
    ];

    for adapter in adapters {
        statements.push(format!(
            "CREATE TABLE {adapter} (
                native_id TEXT PRIMARY KEY,
                link_id INTEGER NOT NULL REFERENCES {LINK_TABLE}(id) ON DELETE CASCADE,
                title TEXT,
                location TEXT,
                description TEXT,
                start_time TEXT,
                end_time TEXT,
                completed INTEGER NOT NULL DEFAULT 0,
                modified_at TEXT NOT NULL,
                synced_at TEXT NOT NULL
            )"
        ));
        statements.push(format!(
            "CREATE INDEX {adapter}_link_id ON {adapter}(link_id)"
        ));
    }

    statements
}

/// Drop every user table. Foreign keys must be off.
pub fn drop_all(conn: &Connection) -> StoreResult<()> {
    let tables = {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )?;
        stmt.query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?
    };
    for table in tables {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS \"{}\"", table.replace('"', "\"\"")))?;
    }
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> StoreResult<BTreeSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(columns)
}

/// Check the database was initialized for exactly this adapter set.
pub fn verify(conn: &Connection, adapters: &[String]) -> StoreResult<()> {
    let meta = table_columns(conn, META_TABLE)?;
    if meta.is_empty() {
        return Err(StoreError::Corrupt("store has not been initialized".into()));
    }
    let version: Option<String> = conn
        .query_row(
            &format!("SELECT value FROM {META_TABLE} WHERE key = 'schema_version'"),
            [],
            |row| row.get(0),
        )
        .ok();
    if version.as_deref() != Some(SCHEMA_VERSION.to_string().as_str()) {
        return Err(StoreError::Corrupt(format!(
            "unsupported schema version {}",
            version.as_deref().unwrap_or("<missing>")
        )));
    }

    let found = table_columns(conn, LINK_TABLE)?;
    let mut expected: BTreeSet<String> =
        ["id", "created_at"].iter().map(|c| c.to_string()).collect();
    expected.extend(adapters.iter().map(|a| link_column(a)));
    if found != expected {
        let initialized: Vec<&str> = found
            .iter()
            .filter_map(|c| c.strip_suffix("_id"))
            .collect();
        return Err(StoreError::Corrupt(format!(
            "store was initialized for adapters [{}] but [{}] are enabled",
            initialized.join(", "),
            adapters.join(", ")
        )));
    }

    let snapshot: BTreeSet<String> = SNAPSHOT_COLUMNS.iter().map(|c| c.to_string()).collect();
    for adapter in adapters {
        let columns = table_columns(conn, adapter)?;
        if columns.is_empty() {
            return Err(StoreError::Corrupt(format!("table '{adapter}' is missing")));
        }
        if columns != snapshot {
            return Err(StoreError::Corrupt(format!(
                "table '{adapter}' has unexpected columns"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["asana".to_string(), "caldav".to_string()]
    }

    fn initialized() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        for statement in create_statements(&names()) {
            conn.execute_batch(&statement).unwrap();
        }
        conn
    }

    #[test]
    fn test_verify_accepts_fresh_schema() {
        verify(&initialized(), &names()).unwrap();
    }

    #[test]
    fn test_verify_rejects_empty_database() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(matches!(verify(&conn, &names()), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_verify_rejects_different_adapter_set() {
        let conn = initialized();
        let err = verify(&conn, &["asana".to_string(), "google".to_string()]).unwrap_err();
        match err {
            StoreError::Corrupt(message) => assert!(message.contains("asana, caldav")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_verify_rejects_dropped_snapshot_table() {
        let conn = initialized();
        conn.execute_batch("PRAGMA foreign_keys = OFF; DROP TABLE caldav;").unwrap();
        assert!(matches!(verify(&conn, &names()), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_drop_all_removes_tables() {
        let conn = initialized();
        drop_all(&conn).unwrap();
        assert!(table_columns(&conn, LINK_TABLE).unwrap().is_empty());
    }
}
