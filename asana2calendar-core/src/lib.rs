//! Core of asana2calendar.
//!
//! - `event`: the side-neutral event model
//! - `adapter`: the capability contract every backing service implements
//! - `store`: the SQLite correspondence store
//! - `sync`: the reconciliation engine

pub mod adapter;
pub mod clock;
pub mod config;
pub mod constants;
pub mod date_range;
pub mod error;
pub mod event;
pub mod store;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::{Adapter, AdapterEntry, AdapterSet, Listing};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AdapterConfig, AppConfig};
pub use date_range::DateRange;
pub use error::{
    AdapterError, AdapterResult, MalformedEventError, StoreError, StoreResult, SyncError,
    SyncResult,
};
pub use event::{Event, EventDraft, Field, TimeFormat};
pub use store::{LinkId, LinkRow, Store, StoreTransaction};
pub use sync::{AdapterCounts, Engine, PassReport, SyncContext, SyncOptions};
