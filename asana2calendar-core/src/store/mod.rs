//! Correspondence store.
//!
//! Persists which native records on different adapters are the same logical
//! event (a link), plus the last known copy of every linked record (its
//! snapshot). All writes of a pass go through one [`StoreTransaction`].

mod schema;
mod transaction;

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};

use crate::clock::{Clock, SystemClock};
use crate::error::{StoreError, StoreResult};

pub use transaction::StoreTransaction;

/// Engine-assigned id of a link. Stable across passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub i64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of the link table.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkRow {
    pub id: LinkId,
    pub created_at: DateTime<Utc>,
    /// `(adapter, native id)` in adapter order.
    pub members: Vec<(String, Option<String>)>,
}

impl LinkRow {
    pub fn native_id(&self, adapter: &str) -> Option<&str> {
        self.members
            .iter()
            .find(|(name, _)| name == adapter)
            .and_then(|(_, id)| id.as_deref())
    }
}

/// Adapter names become table and column names, so they are restricted to
/// lowercase SQL identifiers.
pub fn validate_adapter_name(name: &str) -> StoreResult<()> {
    let mut chars = name.chars();
    let valid_start = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    let reserved = name == schema::LINK_TABLE || name == schema::META_TABLE;

    if valid_start && valid_rest && !reserved {
        Ok(())
    } else {
        Err(StoreError::InvalidAdapterName(name.to_string()))
    }
}

pub struct Store {
    conn: Connection,
    adapters: Vec<String>,
    clock: Arc<dyn Clock>,
}

impl Store {
    /// Open an initialized store and check it matches `adapters`.
    pub fn open(path: &Path, adapters: &[String]) -> StoreResult<Self> {
        if !path.exists() {
            return Err(StoreError::Corrupt(format!(
                "no store found at {}",
                path.display()
            )));
        }
        let store = Store::connect(Connection::open(path)?, adapters)?;
        schema::verify(&store.conn, &store.adapters)?;
        Ok(store)
    }

    /// Create (or recreate) the schema for `adapters`, discarding any links.
    pub fn initialize(path: &Path, adapters: &[String]) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Store::create(Connection::open(path)?, adapters)
    }

    pub fn initialize_in_memory(adapters: &[String]) -> StoreResult<Self> {
        Store::create(Connection::open_in_memory()?, adapters)
    }

    fn connect(conn: Connection, adapters: &[String]) -> StoreResult<Self> {
        for name in adapters {
            validate_adapter_name(name)?;
        }
        conn.busy_timeout(Duration::ZERO)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(Store {
            conn,
            adapters: adapters.to_vec(),
            clock: Arc::new(SystemClock),
        })
    }

    fn create(conn: Connection, adapters: &[String]) -> StoreResult<Self> {
        let mut store = Store::connect(conn, adapters)?;

        store.conn.pragma_update(None, "foreign_keys", false)?;
        let tx = store
            .conn
            .transaction_with_behavior(TransactionBehavior::Exclusive)?;
        schema::drop_all(&tx)?;
        for statement in schema::create_statements(adapters) {
            tx.execute_batch(&statement)?;
        }
        tx.commit()?;
        store.conn.pragma_update(None, "foreign_keys", true)?;

        tracing::info!(adapters = ?adapters, "initialized correspondence store");
        Ok(store)
    }

    pub fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
    }

    pub fn adapters(&self) -> &[String] {
        &self.adapters
    }

    /// Take the store's exclusive lock for one pass.
    ///
    /// Fails immediately with [`StoreError::Locked`] while another pass holds
    /// it. Dropping the returned transaction without committing rolls back.
    pub fn begin(&mut self) -> StoreResult<StoreTransaction<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Exclusive)?;
        Ok(StoreTransaction::new(tx, &self.adapters, self.clock.now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["asana".to_string(), "caldav".to_string()]
    }

    #[test]
    fn test_validate_adapter_name() {
        assert!(validate_adapter_name("asana").is_ok());
        assert!(validate_adapter_name("work_cal2").is_ok());
        assert!(validate_adapter_name("").is_err());
        assert!(validate_adapter_name("2cal").is_err());
        assert!(validate_adapter_name("Work").is_err());
        assert!(validate_adapter_name("cal-dav").is_err());
        assert!(validate_adapter_name("link").is_err());
        assert!(validate_adapter_name("meta").is_err());
    }

    #[test]
    fn test_open_missing_store_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let result = Store::open(&dir.path().join("sync.db"), &names());
        assert!(matches!(result, Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_open_after_initialize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sync.db");
        Store::initialize(&path, &names()).unwrap();
        let store = Store::open(&path, &names()).unwrap();
        assert_eq!(store.adapters(), names().as_slice());
    }

    #[test]
    fn test_open_with_other_adapters_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.db");
        Store::initialize(&path, &names()).unwrap();
        let result = Store::open(&path, &["asana".to_string()]);
        assert!(matches!(result, Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_second_pass_is_locked_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.db");
        Store::initialize(&path, &names()).unwrap();

        let mut first = Store::open(&path, &names()).unwrap();
        let mut second = Store::open(&path, &names()).unwrap();

        let tx = first.begin().unwrap();
        assert!(matches!(second.begin(), Err(StoreError::Locked)));
        drop(tx);
        assert!(second.begin().is_ok());
    }

    #[test]
    fn test_reinitialize_discards_links() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.db");
        let mut store = Store::initialize(&path, &names()).unwrap();
        {
            let tx = store.begin().unwrap();
            let event = crate::testing::event("t1", "Task", 1);
            let link = tx.create_link("asana", "t1").unwrap();
            tx.update_snapshot(link, "asana", &event).unwrap();
            tx.commit().unwrap();
        }
        drop(store);

        let mut store = Store::initialize(&path, &["asana".to_string(), "google".to_string()]).unwrap();
        let tx = store.begin().unwrap();
        assert!(tx.links().unwrap().is_empty());
    }
}
