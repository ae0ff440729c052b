//! CalDAV protocol helpers: collection URLs, the calendar-query REPORT and
//! multistatus parsing.

use chrono::{DateTime, Utc};
use url::Url;

use asana2calendar_core::TimeFormat;

/// Parse a configured calendar collection URL.
///
/// `webcal://` and `webcals://` are accepted and rewritten to `https://`.
/// The path always ends with `/` so event URLs can be joined onto it.
pub fn parse_calendar_url(raw: &str) -> Result<Url, String> {
    let raw = raw.trim();
    let rewritten = match raw.split_once("://") {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("webcal") || scheme.eq_ignore_ascii_case("webcals") => {
            format!("https://{rest}")
        }
        _ => raw.to_string(),
    };

    let mut url = Url::parse(&rewritten).map_err(|e| format!("Invalid calendar URL '{raw}': {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!(
            "Unsupported calendar URL scheme '{}' (expected http, https, webcal or webcals)",
            url.scheme()
        ));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Build the URL for an event resource.
pub fn event_url(calendar_url: &str, event_uid: &str) -> String {
    let base = calendar_url.trim_end_matches('/');
    format!("{}/{}.ics", base, event_uid)
}

/// Extract the href path from a full URL.
///
/// Converts "https://dav.example.com/calendars/me/work/x.ics" to
/// "/calendars/me/work/x.ics". Paths are returned unchanged.
pub fn url_to_href(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.to_string(),
    }
}

/// calendar-query REPORT body selecting VEVENTs that overlap `[start, end)`.
pub fn calendar_query(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<C:calendar-query xmlns="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
    <prop>
        <getetag/>
        <C:calendar-data/>
    </prop>
    <C:filter>
        <C:comp-filter name="VCALENDAR">
            <C:comp-filter name="VEVENT">
                <C:time-range start="{}" end="{}"/>
            </C:comp-filter>
        </C:comp-filter>
    </C:filter>
</C:calendar-query>"#,
        TimeFormat::IcsUtc.format(start),
        TimeFormat::IcsUtc.format(end)
    )
}

/// A fetched calendar resource with its ICS data.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarResource {
    pub href: String,
    pub etag: Option<String>,
    pub data: String,
}

/// Parse calendar resources from a CalDAV multistatus response.
///
/// Responses without calendar data (e.g. the collection itself) are skipped.
pub fn parse_calendar_resources(body: &str) -> Result<Vec<CalendarResource>, roxmltree::Error> {
    let doc = roxmltree::Document::parse(body)?;
    let root = doc.root_element();

    let mut resources = Vec::new();

    for response in root.descendants().filter(|n| n.tag_name().name() == "response") {
        let href = response
            .descendants()
            .find(|n| n.tag_name().name() == "href")
            .and_then(|n| n.text())
            .map(|s| url_to_href(s.trim()));

        let Some(href) = href else { continue };

        let etag = response
            .descendants()
            .find(|n| n.tag_name().name() == "getetag")
            .and_then(|n| n.text())
            .map(|s| s.trim().to_string());

        let data = response
            .descendants()
            .find(|n| n.tag_name().name() == "calendar-data")
            .and_then(|n| n.text())
            .map(|s| s.to_string());

        if let Some(data) = data {
            resources.push(CalendarResource { href, etag, data });
        }
    }

    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_calendar_url() {
        let url = parse_calendar_url("webcal://dav.example.com/cal/work").unwrap();
        assert_eq!(url.as_str(), "https://dav.example.com/cal/work/");

        let url = parse_calendar_url("http://localhost:5232/me/tasks/").unwrap();
        assert_eq!(url.as_str(), "http://localhost:5232/me/tasks/");

        assert!(parse_calendar_url("ftp://dav.example.com/cal/").is_err());
        assert!(parse_calendar_url("not a url").is_err());
    }

    #[test]
    fn test_event_url_and_href() {
        let url = event_url("https://dav.example.com/cal/work/", "abc");
        assert_eq!(url, "https://dav.example.com/cal/work/abc.ics");
        assert_eq!(url_to_href(&url), "/cal/work/abc.ics");
        assert_eq!(url_to_href("/cal/work/abc.ics"), "/cal/work/abc.ics");
    }

    #[test]
    fn test_calendar_query_uses_ics_timestamps() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 1, 1, 12, 30, 0).unwrap();
        let body = calendar_query(start, end);
        assert!(body.contains(r#"start="20250101T000000Z""#));
        assert!(body.contains(r#"end="20260101T123000Z""#));
    }

    #[test]
    fn test_parse_calendar_resources() {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:" xmlns:cal="urn:ietf:params:xml:ns:caldav">
  <d:response>
    <d:href>/cal/work/</d:href>
    <d:propstat><d:prop><d:getetag>"c0"</d:getetag></d:prop></d:propstat>
  </d:response>
  <d:response>
    <d:href>https://dav.example.com/cal/work/a.ics</d:href>
    <d:propstat>
      <d:prop>
        <d:getetag>"e1"</d:getetag>
        <cal:calendar-data>BEGIN:VCALENDAR
END:VCALENDAR</cal:calendar-data>
      </d:prop>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

        let resources = parse_calendar_resources(body).unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].href, "/cal/work/a.ics");
        assert_eq!(resources[0].etag.as_deref(), Some("\"e1\""));
        assert!(resources[0].data.starts_with("BEGIN:VCALENDAR"));
    }

    #[test]
    fn test_parse_calendar_resources_rejects_garbage() {
        assert!(parse_calendar_resources("<multistatus").is_err());
    }
}
