//! Mapping between VEVENTs and [`Event`]s.
//!
//! A due-only event is stored as a zero-length VEVENT (`DTSTART == DTEND`)
//! and read back as due-only. New events are written in UTC. Updates rewrite
//! only the properties an [`Event`] carries and keep everything else.

use asana2calendar_core::{Event, EventDraft, MalformedEventError, TimeFormat};
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use icalendar::{
    CalendarDateTime, Component, DatePerhapsTime, EventLike,
    parser::{Component as ParsedComponent, read_calendar, unfold},
};

/// Parse the first VEVENT of `content`, identified by `href`.
pub fn parse_event(adapter: &str, href: &str, content: &str) -> Result<Event, MalformedEventError> {
    let malformed = |reason: String| MalformedEventError::new(adapter, Some(href), reason);

    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(|e| malformed(format!("invalid ICS: {e}")))?;
    let vevent = calendar
        .components
        .iter()
        .find(|c| c.name == "VEVENT")
        .ok_or_else(|| malformed("no VEVENT in resource".to_string()))?;

    let start = read_time(vevent, "DTSTART").map_err(malformed)?;
    let end = read_time(vevent, "DTEND").map_err(malformed)?;
    let (start, end) = match (start, end) {
        (Some(start), Some(end)) if start == end => (None, Some(end)),
        other => other,
    };

    let modified_at = ["LAST-MODIFIED", "DTSTAMP"]
        .iter()
        .find_map(|name| vevent.find_prop(name))
        .map(|p| parse_stamp(p.val.as_ref()))
        .transpose()
        .map_err(malformed)?;

    let text = |name: &str| vevent.find_prop(name).map(|p| p.val.to_string());

    EventDraft {
        native_id: href.to_string(),
        title: text("SUMMARY"),
        location: text("LOCATION"),
        description: text("DESCRIPTION"),
        start,
        end,
        completed: false,
        modified_at,
    }
    .validate(adapter)
}

/// UID of the first VEVENT, needed to rewrite an existing resource.
pub fn event_uid(content: &str) -> Option<String> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).ok()?;
    let vevent = calendar.components.iter().find(|c| c.name == "VEVENT")?;
    Some(vevent.find_prop("UID")?.val.to_string())
}

/// Generate a VCALENDAR holding `event` under `uid`.
pub fn generate_event(uid: &str, event: &Event) -> String {
    let mut cal = icalendar::Calendar::new();

    let mut ics_event = icalendar::Event::new();
    ics_event.uid(uid);

    let stamp = TimeFormat::IcsUtc.format(event.modified_at);
    ics_event.add_property("DTSTAMP", &stamp);
    ics_event.add_property("LAST-MODIFIED", &stamp);

    let (start, end) = match (event.start, event.end) {
        (None, Some(due)) => (Some(due), Some(due)),
        other => other,
    };
    if let Some(start) = start {
        ics_event.add_property("DTSTART", TimeFormat::IcsUtc.format(start));
    }
    if let Some(end) = end {
        ics_event.add_property("DTEND", TimeFormat::IcsUtc.format(end));
    }

    if let Some(ref title) = event.title {
        ics_event.summary(title);
    }
    if let Some(ref desc) = event.description {
        ics_event.description(desc);
    }
    if let Some(ref loc) = event.location {
        ics_event.location(loc);
    }

    cal.push(ics_event.done());
    cal.done().to_string()
}

/// VEVENT properties owned by [`Event`]. `DURATION` goes because `DTEND`
/// replaces it.
const REWRITTEN: &[&str] = &[
    "SUMMARY",
    "DESCRIPTION",
    "LOCATION",
    "DTSTART",
    "DTEND",
    "DURATION",
    "LAST-MODIFIED",
    "DTSTAMP",
];

/// Rewrite the first VEVENT of `existing` with `event`'s fields.
///
/// Alarms, attendees, recurrence and any other property stay as they were.
/// All-day events stay all-day while the new bounds fall on midnight. An
/// unreadable resource is replaced by a fresh one under its UID, or
/// `fallback_uid` when it has none.
pub fn patch_event(existing: &str, fallback_uid: &str, event: &Event) -> String {
    let unfolded = unfold(existing);
    let all_day = match read_calendar(&unfolded) {
        Ok(calendar) => match calendar.components.iter().find(|c| c.name == "VEVENT") {
            Some(vevent) => ["DTSTART", "DTEND"].iter().any(|name| {
                matches!(
                    vevent.find_prop(name).map(DatePerhapsTime::try_from),
                    Some(Ok(DatePerhapsTime::Date(_)))
                )
            }),
            None => return generate_event(fallback_uid, event),
        },
        Err(_) => {
            let uid = event_uid(existing).unwrap_or_else(|| fallback_uid.to_string());
            return generate_event(&uid, event);
        }
    };

    let fresh = unfold(&generate_event(fallback_uid, event));
    let replacement: Vec<String> = fresh
        .lines()
        .filter(|line| is_rewritten(line))
        .map(|line| if all_day { as_date(line) } else { line.to_string() })
        .collect();

    let mut lines: Vec<String> = Vec::new();
    // None before the first VEVENT, Some(depth) inside it, then done.
    let mut depth: Option<usize> = None;
    let mut done = false;
    for line in unfolded.lines().filter(|l| !l.is_empty()) {
        let upper = line.to_ascii_uppercase();
        match depth {
            _ if done => {}
            None => {
                if upper == "BEGIN:VEVENT" {
                    lines.push(line.to_string());
                    lines.extend(replacement.iter().cloned());
                    depth = Some(0);
                    continue;
                }
            }
            Some(level) => {
                if upper.starts_with("BEGIN:") {
                    depth = Some(level + 1);
                } else if upper.starts_with("END:") {
                    if level == 0 {
                        done = true;
                    } else {
                        depth = Some(level - 1);
                    }
                } else if level == 0 && is_rewritten(line) {
                    continue;
                }
            }
        }
        lines.push(line.to_string());
    }

    let mut out = String::new();
    for line in lines {
        out.push_str(&fold(&line));
        out.push_str("\r\n");
    }
    out
}

fn property_name(line: &str) -> &str {
    let end = line.find([';', ':']).unwrap_or(line.len());
    &line[..end]
}

fn is_rewritten(line: &str) -> bool {
    let name = property_name(line);
    REWRITTEN.iter().any(|p| p.eq_ignore_ascii_case(name))
}

/// `DTSTART:20250310T000000Z` becomes `DTSTART;VALUE=DATE:20250310`.
fn as_date(line: &str) -> String {
    let name = property_name(line);
    if !(name == "DTSTART" || name == "DTEND") {
        return line.to_string();
    }
    match line.split_once(':') {
        Some((_, value)) if value.len() == 16 && value.ends_with("T000000Z") => {
            format!("{name};VALUE=DATE:{}", &value[..8])
        }
        _ => line.to_string(),
    }
}

/// Fold at 75 octets.
fn fold(line: &str) -> String {
    let mut folded = String::with_capacity(line.len());
    let mut width = 0;
    for ch in line.chars() {
        if width + ch.len_utf8() > 75 {
            folded.push_str("\r\n ");
            width = 1;
        }
        folded.push(ch);
        width += ch.len_utf8();
    }
    folded
}

fn read_time(vevent: &ParsedComponent<'_>, name: &str) -> Result<Option<DateTime<Utc>>, String> {
    let Some(prop) = vevent.find_prop(name) else {
        return Ok(None);
    };
    let value = DatePerhapsTime::try_from(prop)
        .map_err(|_| format!("{name} '{}' is not a valid date or date-time", prop.val.as_ref()))?;
    to_utc(value).map(Some).map_err(|e| format!("{name}: {e}"))
}

/// All-day dates map to midnight UTC, floating times are read as UTC.
fn to_utc(value: DatePerhapsTime) -> Result<DateTime<Utc>, String> {
    match value {
        DatePerhapsTime::Date(date) => Ok(date.and_time(NaiveTime::MIN).and_utc()),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => Ok(dt),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => Ok(naive.and_utc()),
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            let tz: chrono_tz::Tz = tzid
                .parse()
                .map_err(|_| format!("unknown time zone '{tzid}'"))?;
            tz.from_local_datetime(&date_time)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(|| format!("{date_time} does not exist in {tzid}"))
        }
    }
}

fn parse_stamp(raw: &str) -> Result<DateTime<Utc>, String> {
    TimeFormat::IcsUtc
        .parse(raw)
        .or_else(|_| TimeFormat::IcsFloating.parse(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn vcalendar(body: &str) -> String {
        format!("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//test//EN\r\nBEGIN:VEVENT\r\n{body}END:VEVENT\r\nEND:VCALENDAR\r\n")
    }

    #[test]
    fn test_parse_timed_event() {
        let ics = vcalendar(
            "UID:a\r\nSUMMARY:Standup\r\nLOCATION:Room 4\r\nDTSTART:20250310T090000Z\r\nDTEND:20250310T093000Z\r\nLAST-MODIFIED:20250301T120000Z\r\nDTSTAMP:20250101T000000Z\r\n",
        );
        let event = parse_event("caldav", "/cal/a.ics", &ics).unwrap();

        assert_eq!(event.native_id, "/cal/a.ics");
        assert_eq!(event.title.as_deref(), Some("Standup"));
        assert_eq!(event.location.as_deref(), Some("Room 4"));
        assert_eq!(event.start, Some(utc(2025, 3, 10, 9, 0)));
        assert_eq!(event.end, Some(utc(2025, 3, 10, 9, 30)));
        assert_eq!(event.modified_at, utc(2025, 3, 1, 12, 0));
        assert!(!event.completed);
    }

    #[test]
    fn test_zero_length_event_is_due_only() {
        let ics = vcalendar(
            "UID:a\r\nSUMMARY:File taxes\r\nDTSTART:20250415T170000Z\r\nDTEND:20250415T170000Z\r\nDTSTAMP:20250301T120000Z\r\n",
        );
        let event = parse_event("caldav", "/cal/a.ics", &ics).unwrap();
        assert_eq!(event.start, None);
        assert_eq!(event.end, Some(utc(2025, 4, 15, 17, 0)));
        // DTSTAMP stands in for a missing LAST-MODIFIED
        assert_eq!(event.modified_at, utc(2025, 3, 1, 12, 0));
    }

    #[test]
    fn test_all_day_and_zoned_times() {
        let ics = vcalendar(
            "UID:a\r\nDTSTART;VALUE=DATE:20250310\r\nDTEND;TZID=Europe/Berlin:20250311T100000\r\nLAST-MODIFIED:20250301T120000Z\r\n",
        );
        let event = parse_event("caldav", "/cal/a.ics", &ics).unwrap();
        assert_eq!(event.start, Some(utc(2025, 3, 10, 0, 0)));
        assert_eq!(event.end, Some(utc(2025, 3, 11, 9, 0)));
    }

    #[test]
    fn test_missing_modification_time_is_malformed() {
        let ics = vcalendar("UID:a\r\nSUMMARY:x\r\nDTSTART:20250310T090000Z\r\n");
        let err = parse_event("caldav", "/cal/a.ics", &ics).unwrap_err();
        assert_eq!(err.native_id.as_deref(), Some("/cal/a.ics"));
    }

    #[test]
    fn test_unknown_time_zone_is_malformed() {
        let ics = vcalendar(
            "UID:a\r\nDTSTART;TZID=Mars/Olympus:20250310T090000\r\nLAST-MODIFIED:20250301T120000Z\r\n",
        );
        let err = parse_event("caldav", "/cal/a.ics", &ics).unwrap_err();
        assert!(err.reason.starts_with("DTSTART"));
    }

    fn moved(start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
        Event {
            native_id: "/cal/a.ics".into(),
            title: Some("Moved".into()),
            location: None,
            description: None,
            start: Some(start),
            end: Some(end),
            completed: false,
            modified_at: utc(2025, 3, 2, 8, 0),
        }
    }

    #[test]
    fn test_patch_keeps_other_properties_and_all_day_dates() {
        let existing = vcalendar(
            "UID:keep-me\r\nSUMMARY:Old\r\nDTSTART;VALUE=DATE:20250310\r\nDTEND;VALUE=DATE:20250311\r\nRRULE:FREQ=WEEKLY\r\nATTENDEE;CN=Sam:mailto:sam@example.com\r\nDTSTAMP:20250101T000000Z\r\nBEGIN:VALARM\r\nACTION:DISPLAY\r\nDESCRIPTION:Reminder\r\nTRIGGER:-PT15M\r\nEND:VALARM\r\n",
        );
        let event = moved(utc(2025, 3, 12, 0, 0), utc(2025, 3, 13, 0, 0));

        let ics = patch_event(&existing, "fallback", &event);
        assert_eq!(ics.matches("UID:").count(), 1);
        assert!(ics.contains("UID:keep-me"));
        assert!(ics.contains("RRULE:FREQ=WEEKLY"));
        assert!(ics.contains("ATTENDEE;CN=Sam:mailto:sam@example.com"));
        assert!(ics.contains("BEGIN:VALARM"));
        assert!(ics.contains("DESCRIPTION:Reminder"));
        assert!(ics.contains("DTSTART;VALUE=DATE:20250312"));
        assert!(ics.contains("DTEND;VALUE=DATE:20250313"));
        assert!(ics.contains("SUMMARY:Moved"));
        assert!(!ics.contains("SUMMARY:Old"));
        assert!(!ics.contains("20250101T000000Z"));

        let parsed = parse_event("caldav", "/cal/a.ics", &ics).unwrap();
        assert_eq!(parsed.title.as_deref(), Some("Moved"));
        assert_eq!(parsed.start, event.start);
        assert_eq!(parsed.end, event.end);
        assert_eq!(parsed.modified_at, event.modified_at);
    }

    #[test]
    fn test_patch_switches_all_day_to_timed_off_midnight() {
        let existing = vcalendar(
            "UID:a\r\nDTSTART;VALUE=DATE:20250310\r\nDURATION:P1D\r\nDTSTAMP:20250101T000000Z\r\n",
        );
        let event = moved(utc(2025, 3, 12, 9, 0), utc(2025, 3, 12, 10, 0));

        let ics = patch_event(&existing, "fallback", &event);
        assert!(ics.contains("DTSTART:20250312T090000Z"));
        assert!(ics.contains("DTEND:20250312T100000Z"));
        assert!(!ics.contains("DURATION"));
    }

    #[test]
    fn test_patch_of_unreadable_resource_starts_over() {
        let event = moved(utc(2025, 3, 12, 9, 0), utc(2025, 3, 12, 10, 0));
        let ics = patch_event("not a calendar", "fallback", &event);
        assert_eq!(event_uid(&ics).as_deref(), Some("fallback"));
        assert!(ics.contains("SUMMARY:Moved"));
    }

    #[test]
    fn test_generated_event_reads_back() {
        let event = Event {
            native_id: "/cal/a.ics".into(),
            title: Some("File taxes".into()),
            location: None,
            description: Some("Before the deadline".into()),
            start: None,
            end: Some(utc(2025, 4, 15, 17, 0)),
            completed: true,
            modified_at: utc(2025, 3, 1, 12, 0),
        };

        let ics = generate_event("uid-1", &event);
        assert!(ics.contains("DTSTART:20250415T170000Z"));
        assert!(ics.contains("DTEND:20250415T170000Z"));
        assert_eq!(event_uid(&ics).as_deref(), Some("uid-1"));

        let parsed = parse_event("caldav", "/cal/a.ics", &ics).unwrap();
        assert_eq!(parsed.title, event.title);
        assert_eq!(parsed.description, event.description);
        assert_eq!(parsed.start, None);
        assert_eq!(parsed.end, event.end);
        assert_eq!(parsed.modified_at, event.modified_at);
        assert!(!parsed.completed);
    }
}
