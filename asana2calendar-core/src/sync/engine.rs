use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::SyncContext;
use super::report::PassReport;
use crate::adapter::{AdapterEntry, Listing, call_with_timeout};
use crate::error::{AdapterError, AdapterResult, StoreError, SyncResult};
use crate::event::{Event, Field};
use crate::store::{LinkId, Store, StoreTransaction};

/// Runs reconciliation passes over a set of adapters and one store.
pub struct Engine {
    ctx: SyncContext,
    store: Store,
}

impl Engine {
    pub fn new(ctx: SyncContext, mut store: Store) -> Self {
        store.set_clock(ctx.clock.clone());
        Engine { ctx, store }
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn into_store(self) -> Store {
        self.store
    }

    /// Run one pass. Nothing is committed unless the whole pass completes;
    /// dropping the returned future rolls back.
    pub async fn run_pass(&mut self) -> SyncResult<PassReport> {
        let Engine { ctx, store } = self;

        let configured = ctx.adapters.names();
        if store.adapters() != configured.as_slice() {
            return Err(StoreError::Corrupt(format!(
                "store holds adapters [{}] but [{}] are configured",
                store.adapters().join(", "),
                configured.join(", ")
            ))
            .into());
        }

        let tx = store.begin()?;
        info!(adapters = ?configured, "starting sync pass");

        let mut pass = Pass::new(ctx, &tx);
        pass.pull().await;
        pass.match_records()?;
        let deletions = pass.detect_deletions()?;
        pass.propagate(&deletions).await?;
        pass.delete(deletions).await?;
        let report = pass.finish();

        tx.commit()?;
        info!(
            writes = report.writes(),
            skipped = report.skipped,
            deferred = report.deferred,
            "sync pass committed"
        );
        Ok(report)
    }
}

/// Call an adapter under the deadline, retrying once when it is unavailable.
async fn with_retry<T, F, Fut>(adapter: &str, limit: Duration, mut call: F) -> AdapterResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AdapterResult<T>>,
{
    match call_with_timeout(adapter, limit, call()).await {
        Err(err) if err.is_unavailable() => {
            debug!(adapter, error = %err, "retrying adapter call");
            call_with_timeout(adapter, limit, call()).await
        }
        result => result,
    }
}

/// What an adapter holds after being handed `source`.
fn as_written(source: &Event, native_id: String, fields: &[Field]) -> Event {
    let blank = Event {
        title: None,
        location: None,
        description: None,
        start: None,
        end: None,
        completed: false,
        ..source.clone()
    };
    let mut written = blank.apply(source, fields);
    written.native_id = native_id;
    written
}

/// One attached member of a link.
struct Side<'p> {
    entry: &'p AdapterEntry,
    native_id: String,
    /// As pulled this pass.
    current: Option<Event>,
    /// `current`, or the snapshot when the record was not pulled.
    latest: Event,
}

impl Side<'_> {
    fn name(&self) -> &str {
        self.entry.name()
    }

    fn fields(&self) -> &'static [Field] {
        self.entry.adapter.supported_fields()
    }
}

struct Pass<'p, 't> {
    ctx: &'p SyncContext,
    tx: &'p StoreTransaction<'t>,
    available: BTreeSet<String>,
    pulled: HashMap<String, HashMap<String, Event>>,
    /// Ids of malformed records per adapter. They exist, so they are never
    /// treated as deleted.
    shielded: HashMap<String, HashSet<String>>,
    touched: BTreeSet<LinkId>,
    report: PassReport,
}

impl<'p, 't> Pass<'p, 't> {
    fn new(ctx: &'p SyncContext, tx: &'p StoreTransaction<'t>) -> Self {
        Pass {
            ctx,
            tx,
            available: BTreeSet::new(),
            pulled: HashMap::new(),
            shielded: HashMap::new(),
            touched: BTreeSet::new(),
            report: PassReport::default(),
        }
    }

    fn is_available(&self, adapter: &str) -> bool {
        self.available.contains(adapter)
    }

    fn limit(&self) -> Duration {
        self.ctx.options.call_timeout
    }

    async fn pull(&mut self) {
        let ctx = self.ctx;
        let window = &ctx.options.window;
        let limit = self.limit();

        let pulls = ctx.adapters.iter().map(|entry| async move {
            let result = with_retry(entry.name(), limit, || entry.adapter.list_events(window)).await;
            (entry.name(), result)
        });

        for (name, result) in join_all(pulls).await {
            match result {
                Ok(listing) => self.accept_listing(name, listing),
                Err(err) => {
                    warn!(adapter = name, error = %err, "excluding adapter from this pass");
                    self.report.mark_unavailable(name);
                }
            }
        }
    }

    fn accept_listing(&mut self, adapter: &str, listing: Listing) {
        let shielded = self.shielded.entry(adapter.to_string()).or_default();
        for malformed in listing.malformed {
            warn!(
                adapter,
                native_id = malformed.native_id.as_deref().unwrap_or("<unknown>"),
                reason = %malformed.reason,
                "skipping malformed record"
            );
            self.report.skipped += 1;
            if let Some(native_id) = malformed.native_id {
                shielded.insert(native_id);
            }
        }

        let events: HashMap<String, Event> = listing
            .events
            .into_iter()
            .map(|e| (e.native_id.clone(), e))
            .collect();
        debug!(adapter, records = events.len(), "pulled adapter");
        self.pulled.insert(adapter.to_string(), events);
        self.available.insert(adapter.to_string());
    }

    /// Link unseen records and note which links changed since their snapshot.
    fn match_records(&mut self) -> SyncResult<()> {
        let ctx = self.ctx;
        for entry in ctx.adapters.iter() {
            let name = entry.name();
            let Some(events) = self.pulled.get(name) else {
                continue;
            };
            let mut ids: Vec<&String> = events.keys().collect();
            ids.sort();

            for native_id in ids {
                let event = &events[native_id];
                match self.tx.find_link_by_native_id(name, native_id)? {
                    None => {
                        let link = self.tx.create_link(name, native_id)?;
                        self.tx.update_snapshot(link, name, event)?;
                        self.touched.insert(link);
                        self.report.links_created += 1;
                        info!(
                            adapter = name,
                            native_id = %native_id,
                            link_id = %link,
                            title = event.label(),
                            "new record"
                        );
                    }
                    Some(link) => {
                        let changed = match self.tx.snapshot(link, name)? {
                            Some(snapshot) => event.modified_at > snapshot.modified_at,
                            None => true,
                        };
                        if changed {
                            debug!(adapter = name, native_id = %native_id, link_id = %link, "record changed");
                            self.touched.insert(link);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Snapshots whose record vanished from a successful pull, keyed by link.
    fn detect_deletions(&self) -> SyncResult<BTreeMap<LinkId, Vec<String>>> {
        let mut deletions: BTreeMap<LinkId, Vec<String>> = BTreeMap::new();

        for entry in self.ctx.adapters.iter() {
            let name = entry.name();
            let Some(events) = self.pulled.get(name) else {
                continue;
            };
            let shielded = self.shielded.get(name);

            for (link, snapshot) in self.tx.cached_records(name)? {
                if events.contains_key(&snapshot.native_id)
                    || shielded.is_some_and(|ids| ids.contains(&snapshot.native_id))
                {
                    continue;
                }
                // Records outside the window were never pulled.
                if !self.ctx.options.window.overlaps(&snapshot) {
                    continue;
                }
                // A record moved out of the window also lands here.
                info!(
                    adapter = name,
                    native_id = %snapshot.native_id,
                    link_id = %link,
                    last_start = ?snapshot.start,
                    last_due = ?snapshot.end,
                    "record deleted at source"
                );
                deletions.entry(link).or_default().push(name.to_string());
            }
        }

        Ok(deletions)
    }

    async fn propagate(&mut self, deletions: &BTreeMap<LinkId, Vec<String>>) -> SyncResult<()> {
        let available: Vec<String> = self.available.iter().cloned().collect();
        let mut work = self.touched.clone();
        work.extend(self.tx.incomplete_links(&available)?);

        for link in work {
            if deletions.contains_key(&link) {
                continue;
            }
            self.propagate_link(link).await?;
        }
        Ok(())
    }

    async fn propagate_link(&mut self, link: LinkId) -> SyncResult<()> {
        let ctx = self.ctx;
        let limit = self.limit();
        let row = self.tx.link_members(link)?;

        let mut sides = Vec::new();
        for entry in ctx.adapters.iter() {
            let Some(native_id) = row.native_id(entry.name()) else {
                continue;
            };
            let current = self
                .pulled
                .get(entry.name())
                .and_then(|events| events.get(native_id))
                .cloned();
            let Some(latest) = current.clone().or(self.tx.snapshot(link, entry.name())?) else {
                continue;
            };
            sides.push(Side {
                entry,
                native_id: native_id.to_string(),
                current,
                latest,
            });
        }

        let Some(newest) = sides.iter().map(|s| s.latest.modified_at).max() else {
            return Ok(());
        };
        let top: Vec<usize> = (0..sides.len())
            .filter(|&i| sides[i].latest.modified_at == newest)
            .collect();

        if top.len() > 1 {
            let first = &sides[top[0]];
            let conflicting = top[1..].iter().any(|&i| {
                let fields = Field::shared(first.fields(), sides[i].fields());
                !first.latest.content_eq(&sides[i].latest, &fields)
            });
            if conflicting {
                warn!(
                    link_id = %link,
                    modified_at = %newest,
                    "sides edited at the same instant with different content, leaving link as is"
                );
            } else {
                debug!(link_id = %link, modified_at = %newest, "sides share a timestamp, nothing to write");
            }
            self.report.ties += 1;
            for side in &sides {
                if let Some(current) = &side.current {
                    self.tx.update_snapshot(link, side.name(), current)?;
                }
            }
            return Ok(());
        }
        let winner_idx = top[0];

        let winner = &sides[winner_idx];
        if !self.is_available(winner.name()) {
            debug!(link_id = %link, adapter = winner.name(), "winning adapter unavailable, deferring link");
            self.report.deferred += 1;
            return Ok(());
        }
        let source = winner.latest.clone();

        let mut updates = Vec::new();
        let mut in_sync = Vec::new();
        for (i, side) in sides.iter().enumerate() {
            if i == winner_idx {
                continue;
            }
            let fields = Field::shared(winner.fields(), side.fields());
            if side.latest.content_eq(&source, &fields) {
                in_sync.push(i);
                continue;
            }
            if !self.is_available(side.name()) {
                info!(
                    link_id = %link,
                    adapter = side.name(),
                    "counterpart adapter unavailable, deferring link"
                );
                self.report.deferred += 1;
                return Ok(());
            }
            let changed = side.latest.changed_fields(&source, &fields);
            updates.push((i, side.latest.apply(&source, &fields), changed));
        }

        let creates: Vec<&AdapterEntry> = ctx
            .adapters
            .iter()
            .filter(|e| row.native_id(e.name()).is_none() && self.is_available(e.name()))
            .collect();

        let mut complete = true;

        for (i, patched, changed) in updates {
            let side = &sides[i];
            if !self.is_available(side.name()) {
                complete = false;
                continue;
            }
            let result = with_retry(side.name(), limit, || {
                side.entry.adapter.update_event(&side.native_id, &patched)
            })
            .await;
            match result {
                Ok(()) => {
                    info!(
                        adapter = side.name(),
                        native_id = %side.native_id,
                        link_id = %link,
                        from = winner.name(),
                        title = patched.label(),
                        fields = ?changed,
                        "updated record"
                    );
                    self.tx.update_snapshot(link, side.name(), &patched)?;
                    self.report.counts(side.name()).updated += 1;
                }
                Err(err) => {
                    self.record_failure(&err, link);
                    complete = false;
                }
            }
        }

        for i in in_sync {
            if let Some(current) = &sides[i].current {
                self.tx.update_snapshot(link, sides[i].name(), current)?;
            }
        }

        for entry in creates {
            let name = entry.name();
            if !self.is_available(name) {
                complete = false;
                continue;
            }
            let result = with_retry(name, limit, || entry.adapter.create_event(&source)).await;
            match result {
                Ok(native_id) => {
                    if let Some(other) = self.tx.find_link_by_native_id(name, &native_id)?
                        && other != link
                    {
                        warn!(
                            adapter = name,
                            native_id = %native_id,
                            link_id = %link,
                            other_link_id = %other,
                            "created record already belongs to another link, retrying next pass"
                        );
                        self.report.skipped += 1;
                        complete = false;
                        continue;
                    }
                    info!(
                        adapter = name,
                        native_id = %native_id,
                        link_id = %link,
                        from = winner.name(),
                        title = source.label(),
                        "created record"
                    );
                    self.tx.attach(link, name, &native_id)?;
                    let written = as_written(&source, native_id, entry.adapter.supported_fields());
                    self.tx.update_snapshot(link, name, &written)?;
                    self.report.counts(name).created += 1;
                }
                Err(err) => {
                    self.record_failure(&err, link);
                    complete = false;
                }
            }
        }

        // Holding the winner back keeps the link changed, so failed targets
        // are retried next pass.
        if complete && let Some(current) = &winner.current {
            self.tx.update_snapshot(link, winner.name(), current)?;
        }

        Ok(())
    }

    async fn delete(&mut self, deletions: BTreeMap<LinkId, Vec<String>>) -> SyncResult<()> {
        let ctx = self.ctx;
        let limit = self.limit();

        for (link, deleted) in deletions {
            let row = self.tx.link_members(link)?;
            let survivors: Vec<(&AdapterEntry, String)> = ctx
                .adapters
                .iter()
                .filter(|e| !deleted.iter().any(|d| d == e.name()))
                .filter_map(|e| row.native_id(e.name()).map(|id| (e, id.to_string())))
                .collect();

            if let Some((entry, _)) = survivors.iter().find(|(e, _)| !self.is_available(e.name())) {
                info!(
                    link_id = %link,
                    adapter = entry.name(),
                    "counterpart adapter unavailable, deferring deletion"
                );
                self.report.deferred += 1;
                continue;
            }

            let mut complete = true;
            for (entry, native_id) in &survivors {
                let name = entry.name();
                match with_retry(name, limit, || entry.adapter.delete_event(native_id)).await {
                    Ok(()) => {
                        info!(adapter = name, native_id = %native_id, link_id = %link, "deleted record");
                        self.report.counts(name).deleted += 1;
                    }
                    Err(err) => {
                        self.record_failure(&err, link);
                        complete = false;
                    }
                }
            }
            if !complete {
                continue;
            }

            for (adapter, native_id) in &row.members {
                if native_id.is_some() {
                    self.tx.detach(link, adapter)?;
                }
            }
            if self.tx.delete_link_if_orphaned(link)? {
                self.report.links_removed += 1;
            }
        }

        Ok(())
    }

    fn record_failure(&mut self, err: &AdapterError, link: LinkId) {
        match err {
            AdapterError::Unavailable { adapter, reason } => {
                warn!(
                    adapter = %adapter,
                    link_id = %link,
                    reason = %reason,
                    "adapter failed twice, excluding it for the rest of this pass"
                );
                self.available.remove(adapter);
                self.report.mark_unavailable(adapter);
            }
            AdapterError::Rejected {
                adapter,
                native_id,
                reason,
            } => {
                warn!(
                    adapter = %adapter,
                    native_id = native_id.as_deref().unwrap_or("<new>"),
                    link_id = %link,
                    reason = %reason,
                    "record rejected, retrying next pass"
                );
                self.report.skipped += 1;
            }
        }
    }

    fn finish(self) -> PassReport {
        let mut report = self.report;
        report.required_unavailable = self
            .ctx
            .adapters
            .iter()
            .filter(|e| e.required && report.unavailable.iter().any(|u| u == e.name()))
            .map(|e| e.name().to_string())
            .collect();
        report
    }
}
