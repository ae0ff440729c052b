use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, ETAG, IF_MATCH, IF_NONE_MATCH};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use asana2calendar_core::{
    Adapter, AdapterConfig, AdapterError, AdapterResult, DateRange, Event, Field, Listing,
    SyncError, SyncResult,
};

use crate::caldav::{calendar_query, event_url, parse_calendar_resources, parse_calendar_url, url_to_href};
use crate::ics;

/// VEVENTs carry no completion state.
const SUPPORTED_FIELDS: &[Field] = &[
    Field::Title,
    Field::Location,
    Field::Description,
    Field::Start,
    Field::End,
];

const ICS_CONTENT_TYPE: &str = "text/calendar; charset=utf-8";

const UID_NAMESPACE: Uuid = Uuid::from_u128(0x6a1f_3c2e_9b4d_4e8a_a5c7_2d9e_0f81_b346);

/// One CalDAV calendar collection. Native ids are resource hrefs.
pub struct CalDavAdapter {
    name: String,
    http: reqwest::Client,
    calendar_url: Url,
    username: String,
    password: String,
}

impl CalDavAdapter {
    pub fn new(
        name: impl Into<String>,
        calendar_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> SyncResult<Self> {
        let name = name.into();
        let calendar_url = parse_calendar_url(calendar_url)
            .map_err(|e| SyncError::Config(format!("adapters.{name}.url: {e}")))?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("asana2calendar/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Config(format!("Could not build HTTP client: {e}")))?;

        Ok(CalDavAdapter {
            name,
            http,
            calendar_url,
            username: username.into(),
            password: password.into(),
        })
    }

    /// Build from an `[adapters.<name>]` table with `url`, `username` and `password`.
    pub fn from_config(name: &str, config: &AdapterConfig) -> SyncResult<Self> {
        CalDavAdapter::new(
            name,
            &config.require(name, "url")?,
            config.require(name, "username")?,
            config.require(name, "password")?,
        )
    }

    fn resource_url(&self, href: &str) -> AdapterResult<Url> {
        self.calendar_url
            .join(href)
            .map_err(|e| AdapterError::rejected(&self.name, Some(href), format!("invalid href: {e}")))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }

    fn transport_error(&self, err: reqwest::Error) -> AdapterError {
        AdapterError::unavailable(&self.name, err.to_string())
    }

    async fn send(&self, request: RequestBuilder, native_id: Option<&str>) -> AdapterResult<Response> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AdapterError::from_status(&self.name, native_id, status.as_u16(), &body))
    }
}

/// UID for an event created from the record `source_id`. A retried create
/// lands on the same resource.
fn uid_for(source_id: &str) -> String {
    Uuid::new_v5(&UID_NAMESPACE, source_id.as_bytes()).to_string()
}

/// Resource name without `.ics`, used when an existing resource has no UID.
fn uid_from_href(href: &str) -> String {
    let file = href.trim_end_matches('/').rsplit('/').next().unwrap_or(href);
    file.trim_end_matches(".ics").to_string()
}

#[async_trait]
impl Adapter for CalDavAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_fields(&self) -> &'static [Field] {
        SUPPORTED_FIELDS
    }

    async fn list_events(&self, range: &DateRange) -> AdapterResult<Listing> {
        let report = Method::from_bytes(b"REPORT")
            .map_err(|e| AdapterError::unavailable(&self.name, e.to_string()))?;
        let request = self
            .request(report, self.calendar_url.clone())
            .header("Depth", "1")
            .header(CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(calendar_query(range.start_or_epoch(), range.end_or_far_future()));

        let body = self
            .send(request, None)
            .await?
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;
        let resources = parse_calendar_resources(&body).map_err(|e| {
            AdapterError::unavailable(&self.name, format!("invalid multistatus response: {e}"))
        })?;

        let mut listing = Listing::collect(
            resources
                .iter()
                .map(|resource| ics::parse_event(&self.name, &resource.href, &resource.data)),
        );
        listing.events.retain(|event| range.overlaps(event));

        debug!(
            adapter = %self.name,
            events = listing.events.len(),
            malformed = listing.malformed.len(),
            "Listed calendar events"
        );
        Ok(listing)
    }

    async fn create_event(&self, event: &Event) -> AdapterResult<String> {
        let uid = uid_for(&event.native_id);
        let href = url_to_href(&event_url(self.calendar_url.as_str(), &uid));
        let url = self.resource_url(&href)?;

        let response = self
            .request(Method::PUT, url)
            .header(CONTENT_TYPE, ICS_CONTENT_TYPE)
            .header(IF_NONE_MATCH, "*")
            .body(ics::generate_event(&uid, event))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == StatusCode::PRECONDITION_FAILED {
            // An earlier attempt already stored it.
            debug!(adapter = %self.name, native_id = %href, "Calendar event already exists");
            return Ok(href);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::from_status(&self.name, None, status.as_u16(), &body));
        }

        debug!(adapter = %self.name, native_id = %href, "Created calendar event");
        Ok(href)
    }

    async fn update_event(&self, native_id: &str, event: &Event) -> AdapterResult<()> {
        let url = self.resource_url(native_id)?;

        let current = self
            .send(self.request(Method::GET, url.clone()), Some(native_id))
            .await?;
        let etag = current
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content = current.text().await.map_err(|e| self.transport_error(e))?;

        let mut request = self
            .request(Method::PUT, url)
            .header(CONTENT_TYPE, ICS_CONTENT_TYPE)
            .body(ics::patch_event(&content, &uid_from_href(native_id), event));
        if let Some(etag) = etag {
            request = request.header(IF_MATCH, etag);
        }
        self.send(request, Some(native_id)).await?;

        debug!(adapter = %self.name, native_id, "Updated calendar event");
        Ok(())
    }

    async fn delete_event(&self, native_id: &str) -> AdapterResult<()> {
        let url = self.resource_url(native_id)?;
        let response = self
            .request(Method::DELETE, url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            debug!(adapter = %self.name, native_id, "Deleted calendar event");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(AdapterError::from_status(&self.name, Some(native_id), status.as_u16(), &body))
    }
}
