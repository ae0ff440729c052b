//! Reconciliation across adapters.
//!
//! A pass locks the store, pulls every adapter, matches records to links,
//! propagates the newest version of each changed link, propagates deletions
//! and commits.

mod engine;
mod report;


use std::sync::Arc;
use std::time::Duration;

use crate::adapter::AdapterSet;
use crate::clock::Clock;
use crate::constants::{DEFAULT_CALL_TIMEOUT, DEFAULT_SYNC_DAYS};
use crate::date_range::DateRange;

pub use engine::Engine;
pub use report::{AdapterCounts, PassReport};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Records are pulled from this window, and only snapshots inside it can
    /// be detected as deleted.
    pub window: DateRange,
    /// Deadline for every single adapter call.
    pub call_timeout: Duration,
}

impl SyncOptions {
    pub fn new(window: DateRange) -> Self {
        SyncOptions {
            window,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_window(mut self, window: DateRange) -> Self {
        self.window = window;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }
}

/// Everything a pass needs besides the store.
pub struct SyncContext {
    pub adapters: AdapterSet,
    pub clock: Arc<dyn Clock>,
    pub options: SyncOptions,
}

impl SyncContext {
    /// Context with a window of ±DEFAULT_SYNC_DAYS around the clock's now.
    pub fn new(adapters: AdapterSet, clock: Arc<dyn Clock>) -> Self {
        let window = DateRange::around(clock.now(), DEFAULT_SYNC_DAYS);
        SyncContext {
            adapters,
            clock,
            options: SyncOptions::new(window),
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }
}
