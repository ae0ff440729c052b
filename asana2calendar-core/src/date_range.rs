//! Date range for filtering events.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::constants::DEFAULT_SYNC_DAYS;
use crate::event::Event;

/// Date range a pass pulls from every adapter.
/// None values mean unbounded in that direction.
#[derive(Debug, Clone, PartialEq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    /// ±`days` around `now`.
    pub fn around(now: DateTime<Utc>, days: i64) -> Self {
        DateRange {
            from: Some(now - Duration::days(days)),
            to: Some(now + Duration::days(days)),
        }
    }

    /// Parse command line bounds into a DateRange.
    /// - `from`: "start" for unbounded, or YYYY-MM-DD
    /// - `to`: YYYY-MM-DD
    ///
    /// Missing bounds default to ±`days` around `now`.
    pub fn from_args(
        now: DateTime<Utc>,
        days: i64,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<Self, String> {
        let from_dt = match from {
            Some("start") => None,
            Some(s) => Some(parse_date(s, NaiveTime::MIN)?),
            None => Some(now - Duration::days(days)),
        };

        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
        let to_dt = match to {
            Some(s) => Some(parse_date(s, end_of_day)?),
            None => Some(now + Duration::days(days)),
        };

        if let (Some(from), Some(to)) = (from_dt, to_dt)
            && from > to
        {
            return Err(format!("--from ({}) is after --to ({})", from.date_naive(), to.date_naive()));
        }

        Ok(DateRange {
            from: from_dt,
            to: to_dt,
        })
    }

    /// `from`, or the Unix epoch if unbounded.
    pub fn start_or_epoch(&self) -> DateTime<Utc> {
        self.from.unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// `to`, or 2100-01-01 if unbounded.
    pub fn end_or_far_future(&self) -> DateTime<Utc> {
        self.to.unwrap_or_else(|| {
            Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        })
    }

    pub fn contains_instant(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at <= to)
    }

    /// Whether the event overlaps the range. Events with a single bound are
    /// treated as instants.
    pub fn overlaps(&self, event: &Event) -> bool {
        let (start, end) = match (event.start, event.end) {
            (Some(start), Some(end)) => (start, end),
            (Some(at), None) | (None, Some(at)) => (at, at),
            (None, None) => return false,
        };

        self.from.is_none_or(|from| end >= from) && self.to.is_none_or(|to| start <= to)
    }
}

impl Default for DateRange {
    /// Default range: ±DEFAULT_SYNC_DAYS from now
    fn default() -> Self {
        DateRange::around(Utc::now(), DEFAULT_SYNC_DAYS)
    }
}

fn parse_date(s: &str, time: NaiveTime) -> Result<DateTime<Utc>, String> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date format '{}'. Expected YYYY-MM-DD", s))?;
    Ok(date.and_time(time).and_utc())
}
