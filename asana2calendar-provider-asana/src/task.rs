//! Asana task payloads and their mapping to [`Event`]s.
//!
//! `due_*` carries the event end, `start_*` its start. Date-only values are
//! read as midnight UTC and written back as dates when every bound falls on
//! midnight.

use asana2calendar_core::{Event, EventDraft, MalformedEventError, TimeFormat};
use chrono::{DateTime, Timelike, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Fields requested for every task listing.
pub const TASK_FIELDS: &str = "name,notes,completed,due_at,due_on,start_at,start_on,modified_at";

#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    pub gid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub due_at: Option<String>,
    #[serde(default)]
    pub due_on: Option<String>,
    #[serde(default)]
    pub start_at: Option<String>,
    #[serde(default)]
    pub start_on: Option<String>,
    #[serde(default)]
    pub modified_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Project {
    pub gid: String,
    #[serde(default)]
    pub name: String,
}

/// `{"data": ...}` wrapper around single objects.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// One page of a paginated collection.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub next_page: Option<NextPage>,
}

#[derive(Debug, Deserialize)]
pub struct NextPage {
    pub offset: String,
}

impl Task {
    /// Timed values win over date-only ones.
    pub fn into_event(self, adapter: &str) -> Result<Event, MalformedEventError> {
        let mut draft = EventDraft {
            native_id: self.gid,
            title: self.name,
            description: self.notes,
            completed: self.completed,
            ..Default::default()
        };

        draft.modified_at = draft.parse_time(adapter, self.modified_at.as_deref(), TimeFormat::Rfc3339)?;
        draft.start = match draft.parse_time(adapter, self.start_at.as_deref(), TimeFormat::Rfc3339)? {
            Some(start) => Some(start),
            None => draft.parse_time(adapter, self.start_on.as_deref(), TimeFormat::Date)?,
        };
        draft.end = match draft.parse_time(adapter, self.due_at.as_deref(), TimeFormat::Rfc3339)? {
            Some(due) => Some(due),
            None => draft.parse_time(adapter, self.due_on.as_deref(), TimeFormat::Date)?,
        };

        draft.validate(adapter)
    }
}

pub trait ToAsana {
    /// Body of a create or update request, without the `data` wrapper.
    fn to_asana(&self) -> Map<String, Value>;
}

impl ToAsana for Event {
    fn to_asana(&self) -> Map<String, Value> {
        let mut body = Map::new();
        body.insert("name".into(), Value::from(self.title.clone().unwrap_or_default()));
        body.insert("notes".into(), Value::from(self.description.clone().unwrap_or_default()));
        body.insert("completed".into(), Value::from(self.completed));

        let all_day = [self.start, self.end]
            .into_iter()
            .flatten()
            .all(is_midnight);
        let (format, start_key, due_key) = if all_day {
            (TimeFormat::Date, "start_on", "due_on")
        } else {
            (TimeFormat::Rfc3339, "start_at", "due_at")
        };

        body.insert(
            start_key.into(),
            self.start.map_or(Value::Null, |dt| Value::from(format.format(dt))),
        );
        body.insert(
            due_key.into(),
            self.end.map_or(Value::Null, |dt| Value::from(format.format(dt))),
        );
        body
    }
}

fn is_midnight(dt: DateTime<Utc>) -> bool {
    dt.num_seconds_from_midnight() == 0
}
