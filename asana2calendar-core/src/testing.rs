//! In-memory adapter and fixtures shared by the crate's tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::adapter::{Adapter, Listing};
use crate::date_range::DateRange;
use crate::error::{AdapterError, AdapterResult, MalformedEventError};
use crate::event::{Event, EventDraft, Field};

/// 2025-03-01T00:00:00Z
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
}

/// Due 2025-03-10 09:00 UTC, modified `minute` minutes after [`base_time`].
pub fn event(native_id: &str, title: &str, minute: i64) -> Event {
    let due = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
    EventDraft {
        title: Some(title.to_string()),
        end: Some(due),
        ..EventDraft::new(native_id, base_time() + Duration::minutes(minute))
    }
    .validate("test")
    .unwrap()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List,
    Create(Option<String>),
    Update(String),
    Delete(String),
}

#[derive(Default)]
struct State {
    records: BTreeMap<String, Event>,
    next_id: u32,
    server_time: DateTime<Utc>,
    calls: Vec<Call>,
    malformed: Vec<MalformedEventError>,
    unavailable: bool,
    unavailable_writes: u32,
    reject_creates: bool,
    create_answer: Option<String>,
    reject_updates: Vec<String>,
    hang: bool,
    hang_creates: bool,
}

/// Adapter over a map of records. Writes stamp `modified_at` with a server
/// time that tests move forward explicitly.
pub struct MemoryAdapter {
    name: String,
    fields: &'static [Field],
    state: Mutex<State>,
}

impl MemoryAdapter {
    pub fn new(name: &str) -> Self {
        MemoryAdapter::with_fields(name, Field::ALL)
    }

    pub fn with_fields(name: &str, fields: &'static [Field]) -> Self {
        MemoryAdapter {
            name: name.to_string(),
            fields,
            state: Mutex::new(State {
                next_id: 1,
                server_time: base_time() + Duration::days(1),
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Ids handed out by `create_event` start at `n`.
    pub fn ids_from(self, n: u32) -> Self {
        self.state().next_id = n;
        self
    }

    pub fn insert(&self, event: Event) {
        self.state().records.insert(event.native_id.clone(), event);
    }

    /// Edit a record as a user would, stamping it with the server time.
    pub fn edit(&self, native_id: &str, change: impl FnOnce(&mut Event)) {
        let mut state = self.state();
        let now = state.server_time;
        if let Some(record) = state.records.get_mut(native_id) {
            change(record);
            record.modified_at = now;
        }
    }

    pub fn remove(&self, native_id: &str) {
        self.state().records.remove(native_id);
    }

    pub fn get(&self, native_id: &str) -> Option<Event> {
        self.state().records.get(native_id).cloned()
    }

    pub fn records(&self) -> Vec<Event> {
        self.state().records.values().cloned().collect()
    }

    pub fn advance(&self, by: Duration) {
        self.state().server_time += by;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn writes(&self) -> Vec<Call> {
        self.calls().into_iter().filter(|c| *c != Call::List).collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Hide `native_id` from listings and report it as malformed instead.
    pub fn report_malformed(&self, native_id: &str) {
        let err = MalformedEventError::new(&self.name, Some(native_id), "unparseable due date");
        self.state().malformed.push(err);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// The next `n` write calls fail as unavailable.
    pub fn fail_next_writes(&self, n: u32) {
        self.state().unavailable_writes = n;
    }

    pub fn set_reject_creates(&self, reject: bool) {
        self.state().reject_creates = reject;
    }

    /// Creates report `native_id` without storing anything, like a server
    /// that already holds the resource.
    pub fn answer_creates_with(&self, native_id: &str) {
        self.state().create_answer = Some(native_id.to_string());
    }

    pub fn reject_updates_of(&self, native_id: &str) {
        self.state().reject_updates.push(native_id.to_string());
    }

    /// Listings never return.
    pub fn set_hang(&self, hang: bool) {
        self.state().hang = hang;
    }

    /// Creates never return.
    pub fn set_hang_creates(&self, hang: bool) {
        self.state().hang_creates = hang;
    }

    fn check_available(&self, state: &mut State, write: bool) -> AdapterResult<()> {
        if state.unavailable {
            return Err(AdapterError::unavailable(&self.name, "service is down"));
        }
        if write && state.unavailable_writes > 0 {
            state.unavailable_writes -= 1;
            return Err(AdapterError::unavailable(&self.name, "connection reset"));
        }
        Ok(())
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_fields(&self) -> &'static [Field] {
        self.fields
    }

    async fn list_events(&self, range: &DateRange) -> AdapterResult<Listing> {
        let hang = {
            let mut state = self.state();
            state.calls.push(Call::List);
            state.hang
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.state();
        self.check_available(&mut state, false)?;
        let hidden: Vec<String> = state
            .malformed
            .iter()
            .filter_map(|m| m.native_id.clone())
            .collect();
        let events = state
            .records
            .values()
            .filter(|e| !hidden.contains(&e.native_id) && range.overlaps(e))
            .cloned()
            .collect();
        Ok(Listing {
            events,
            malformed: state.malformed.clone(),
        })
    }

    async fn create_event(&self, event: &Event) -> AdapterResult<String> {
        let hang = {
            let mut state = self.state();
            state.calls.push(Call::Create(event.title.clone()));
            state.hang_creates
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.state();
        self.check_available(&mut state, true)?;
        if state.reject_creates {
            return Err(AdapterError::rejected(&self.name, None, "validation failed"));
        }
        if let Some(existing) = state.create_answer.clone() {
            return Ok(existing);
        }

        let native_id = state.next_id.to_string();
        state.next_id += 1;
        let mut stored = Event {
            native_id: native_id.clone(),
            modified_at: state.server_time,
            ..event.clone()
        };
        for field in Field::ALL {
            if !self.fields.contains(field) {
                stored = stored.apply(&blank(&stored), &[*field]);
            }
        }
        stored.modified_at = state.server_time;
        state.records.insert(native_id.clone(), stored);
        Ok(native_id)
    }

    async fn update_event(&self, native_id: &str, event: &Event) -> AdapterResult<()> {
        let mut state = self.state();
        state.calls.push(Call::Update(native_id.to_string()));
        self.check_available(&mut state, true)?;
        if state.reject_updates.iter().any(|id| id == native_id) {
            return Err(AdapterError::rejected(&self.name, Some(native_id), "record is locked"));
        }

        let now = state.server_time;
        let fields = self.fields;
        let Some(record) = state.records.get_mut(native_id) else {
            return Err(AdapterError::rejected(&self.name, Some(native_id), "not found"));
        };
        *record = record.apply(event, fields);
        record.modified_at = now;
        Ok(())
    }

    async fn delete_event(&self, native_id: &str) -> AdapterResult<()> {
        let mut state = self.state();
        state.calls.push(Call::Delete(native_id.to_string()));
        self.check_available(&mut state, true)?;
        state.records.remove(native_id);
        Ok(())
    }
}

/// Event with every optional field cleared.
fn blank(like: &Event) -> Event {
    Event {
        title: None,
        location: None,
        description: None,
        start: None,
        end: None,
        completed: false,
        ..like.clone()
    }
}
