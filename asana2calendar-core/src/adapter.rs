//! Source adapter contract.
//!
//! An adapter wraps one backing service (a task tracker or a calendar) and
//! exposes it as a flat collection of [`Event`]s. The engine never talks to a
//! service directly.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use crate::date_range::DateRange;
use crate::error::{AdapterError, AdapterResult, MalformedEventError, SyncError, SyncResult};
use crate::event::{Event, Field};
use crate::store::validate_adapter_name;

/// Result of pulling one adapter.
#[derive(Debug, Default, Clone)]
pub struct Listing {
    pub events: Vec<Event>,
    /// Records that exist but could not be coerced. Their ids are never
    /// treated as deleted.
    pub malformed: Vec<MalformedEventError>,
}

impl Listing {
    /// Sort drafts coerced by an adapter into events and malformed records.
    pub fn collect(results: impl IntoIterator<Item = Result<Event, MalformedEventError>>) -> Self {
        let mut listing = Listing::default();
        for result in results {
            match result {
                Ok(event) => listing.events.push(event),
                Err(err) => listing.malformed.push(err),
            }
        }
        listing
    }
}

#[async_trait]
pub trait Adapter: Send + Sync {
    /// Instance name, also used for the store columns and tables.
    fn name(&self) -> &str;

    /// Canonical fields this service can store.
    fn supported_fields(&self) -> &'static [Field];

    async fn list_events(&self, range: &DateRange) -> AdapterResult<Listing>;

    /// Create a record and return its native id.
    async fn create_event(&self, event: &Event) -> AdapterResult<String>;

    async fn update_event(&self, native_id: &str, event: &Event) -> AdapterResult<()>;

    /// Deleting a record that is already gone succeeds.
    async fn delete_event(&self, native_id: &str) -> AdapterResult<()>;
}

/// Run an adapter call under a deadline. Elapsed deadlines are reported as
/// [`AdapterError::Unavailable`].
pub async fn call_with_timeout<T, F>(adapter: &str, limit: Duration, call: F) -> AdapterResult<T>
where
    F: Future<Output = AdapterResult<T>>,
{
    timeout(limit, call).await.map_err(|_| {
        AdapterError::unavailable(adapter, format!("timed out after {}s", limit.as_secs()))
    })?
}

#[derive(Clone)]
pub struct AdapterEntry {
    pub adapter: Arc<dyn Adapter>,
    /// A required adapter being unavailable makes the pass fail.
    pub required: bool,
}

impl AdapterEntry {
    pub fn name(&self) -> &str {
        self.adapter.name()
    }
}

/// The enabled adapters of a run, in configuration order.
#[derive(Clone, Default)]
pub struct AdapterSet {
    entries: Vec<AdapterEntry>,
}

impl AdapterSet {
    pub fn new() -> Self {
        AdapterSet::default()
    }

    pub fn insert(&mut self, adapter: Arc<dyn Adapter>, required: bool) -> SyncResult<()> {
        let name = adapter.name().to_string();
        validate_adapter_name(&name)?;
        if self.get(&name).is_some() {
            return Err(SyncError::Config(format!("Adapter '{}' is configured twice", name)));
        }
        self.entries.push(AdapterEntry { adapter, required });
        Ok(())
    }

    pub fn with(mut self, adapter: Arc<dyn Adapter>, required: bool) -> SyncResult<Self> {
        self.insert(adapter, required)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&AdapterEntry> {
        self.entries.iter().find(|e| e.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AdapterEntry> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
