//! Side-neutral event types.
//!
//! Adapters convert their records into these types through [`EventDraft`],
//! and the engine works exclusively with [`Event`] for matching, comparison
//! and propagation.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SubsecRound, Utc};

use crate::error::MalformedEventError;

/// A task or calendar entry as seen by one adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Id assigned by the backing service. Never changes.
    pub native_id: String,
    pub title: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    /// Whole seconds, UTC.
    pub start: Option<DateTime<Utc>>,
    /// Doubles as the due time on task-like adapters. Whole seconds, UTC.
    pub end: Option<DateTime<Utc>>,
    pub completed: bool,
    /// Last mutation time reported by the source, full precision.
    pub modified_at: DateTime<Utc>,
}

/// Canonical attributes compared and propagated between adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Title,
    Location,
    Description,
    Start,
    End,
    Completed,
}

impl Field {
    pub const ALL: &'static [Field] = &[
        Field::Title,
        Field::Location,
        Field::Description,
        Field::Start,
        Field::End,
        Field::Completed,
    ];

    /// Fields present in both capability sets.
    pub fn shared(a: &[Field], b: &[Field]) -> Vec<Field> {
        Field::ALL
            .iter()
            .copied()
            .filter(|f| a.contains(f) && b.contains(f))
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Location => "location",
            Field::Description => "description",
            Field::Start => "start",
            Field::End => "end",
            Field::Completed => "completed",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Event {
    fn field_eq(&self, other: &Event, field: Field) -> bool {
        match field {
            Field::Title => self.title == other.title,
            Field::Location => self.location == other.location,
            Field::Description => self.description == other.description,
            Field::Start => self.start == other.start,
            Field::End => self.end == other.end,
            Field::Completed => self.completed == other.completed,
        }
    }

    /// True when every listed field matches. `native_id` and `modified_at`
    /// are never compared.
    pub fn content_eq(&self, other: &Event, fields: &[Field]) -> bool {
        fields.iter().all(|&f| self.field_eq(other, f))
    }

    pub fn changed_fields(&self, other: &Event, fields: &[Field]) -> Vec<Field> {
        fields
            .iter()
            .copied()
            .filter(|&f| !self.field_eq(other, f))
            .collect()
    }

    /// Copy of `self` with the listed fields taken from `source`.
    ///
    /// The result keeps this event's `native_id` and takes `modified_at` from
    /// `source`.
    pub fn apply(&self, source: &Event, fields: &[Field]) -> Event {
        let mut patched = self.clone();
        for field in fields {
            match field {
                Field::Title => patched.title = source.title.clone(),
                Field::Location => patched.location = source.location.clone(),
                Field::Description => patched.description = source.description.clone(),
                Field::Start => patched.start = source.start,
                Field::End => patched.end = source.end,
                Field::Completed => patched.completed = source.completed,
            }
        }
        patched.modified_at = source.modified_at;
        patched
    }

    /// Display label for logs and reports.
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or("(untitled)")
    }
}

/// How an adapter writes timestamps on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFormat {
    /// `2025-03-10T09:30:00.000Z`, any offset accepted
    Rfc3339,
    /// `2025-03-10`, midnight UTC
    Date,
    /// `20250310T093000Z`
    IcsUtc,
    /// `20250310T093000`, read as UTC
    IcsFloating,
}

impl TimeFormat {
    pub fn parse(self, raw: &str) -> Result<DateTime<Utc>, String> {
        let raw = raw.trim();
        let parsed = match self {
            TimeFormat::Rfc3339 => {
                DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
            }
            TimeFormat::Date => {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN).and_utc())
            }
            TimeFormat::IcsUtc => {
                NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%SZ").map(|dt| dt.and_utc())
            }
            TimeFormat::IcsFloating => {
                NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%S").map(|dt| dt.and_utc())
            }
        };
        parsed.map_err(|e| format!("'{}' is not a valid {:?} timestamp: {}", raw, self, e))
    }

    pub fn format(self, dt: DateTime<Utc>) -> String {
        match self {
            TimeFormat::Rfc3339 => dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            TimeFormat::Date => dt.format("%Y-%m-%d").to_string(),
            TimeFormat::IcsUtc => dt.format("%Y%m%dT%H%M%SZ").to_string(),
            TimeFormat::IcsFloating => dt.format("%Y%m%dT%H%M%S").to_string(),
        }
    }
}

/// Unvalidated fields of an [`Event`], filled in by an adapter.
#[derive(Debug, Clone, Default)]
pub struct EventDraft {
    pub native_id: String,
    pub title: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub completed: bool,
    pub modified_at: Option<DateTime<Utc>>,
}

impl EventDraft {
    pub fn new(native_id: impl Into<String>, modified_at: DateTime<Utc>) -> Self {
        EventDraft {
            native_id: native_id.into(),
            modified_at: Some(modified_at),
            ..Default::default()
        }
    }

    /// Parse an optional raw timestamp, attributing failures to this draft.
    pub fn parse_time(
        &self,
        adapter: &str,
        raw: Option<&str>,
        format: TimeFormat,
    ) -> Result<Option<DateTime<Utc>>, MalformedEventError> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(None),
            Some(s) => format
                .parse(s)
                .map(Some)
                .map_err(|reason| MalformedEventError::new(adapter, Some(&self.native_id), reason)),
        }
    }

    pub fn validate(self, adapter: &str) -> Result<Event, MalformedEventError> {
        let malformed = |reason: &str| MalformedEventError::new(adapter, Some(&self.native_id), reason);

        if self.native_id.trim().is_empty() {
            return Err(MalformedEventError::new(adapter, None, "record has no id"));
        }
        let Some(modified_at) = self.modified_at else {
            return Err(malformed("missing modification time"));
        };
        if self.start.is_none() && self.end.is_none() {
            return Err(malformed("record has neither a start nor an end/due time"));
        }

        Ok(Event {
            native_id: self.native_id,
            title: normalize_text(self.title),
            location: normalize_text(self.location),
            description: normalize_text(self.description),
            start: self.start.map(|dt| dt.trunc_subsecs(0)),
            end: self.end.map(|dt| dt.trunc_subsecs(0)),
            completed: self.completed,
            modified_at,
        })
    }
}

fn normalize_text(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
