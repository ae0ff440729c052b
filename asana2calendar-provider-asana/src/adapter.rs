use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

use asana2calendar_core::{
    Adapter, AdapterConfig, AdapterError, AdapterResult, DateRange, Event, Field, Listing,
    SyncError, SyncResult,
};

use crate::client::{AsanaClient, DEFAULT_BASE_URL};
use crate::task::ToAsana;

/// Tasks have no location.
const SUPPORTED_FIELDS: &[Field] = &[
    Field::Title,
    Field::Description,
    Field::Start,
    Field::End,
    Field::Completed,
];

/// Tasks of one Asana project. Native ids are task gids.
pub struct AsanaAdapter {
    name: String,
    client: AsanaClient,
    /// Project gid, or a project name resolved on first use.
    project: String,
    workspace: Option<String>,
    project_gid: OnceCell<String>,
}

impl AsanaAdapter {
    pub fn new(name: impl Into<String>, token: impl Into<String>, project: impl Into<String>) -> SyncResult<Self> {
        AsanaAdapter::with_base_url(name, token, project, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        name: impl Into<String>,
        token: impl Into<String>,
        project: impl Into<String>,
        base_url: &str,
    ) -> SyncResult<Self> {
        let name = name.into();
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&base_url)
            .map_err(|e| SyncError::Config(format!("adapters.{name}.base_url: {e}")))?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("asana2calendar/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Config(format!("Could not build HTTP client: {e}")))?;

        Ok(AsanaAdapter {
            client: AsanaClient::new(&name, http, base_url, token.into()),
            name,
            project: project.into(),
            workspace: None,
            project_gid: OnceCell::new(),
        })
    }

    /// Limit project name lookup to one workspace.
    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    /// Build from an `[adapters.<name>]` table with `token`, `project` and
    /// optionally `workspace` and `base_url`.
    pub fn from_config(name: &str, config: &AdapterConfig) -> SyncResult<Self> {
        let token = config.require(name, "token")?;
        let project = config.require(name, "project")?;
        let base_url = config
            .param("base_url")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let adapter = AsanaAdapter::with_base_url(name, token, project, &base_url)?;
        Ok(match config.param("workspace") {
            Some(workspace) => adapter.with_workspace(workspace),
            None => adapter,
        })
    }

    async fn project_gid(&self) -> AdapterResult<&str> {
        self.project_gid
            .get_or_try_init(|| self.resolve_project())
            .await
            .map(String::as_str)
    }

    async fn resolve_project(&self) -> AdapterResult<String> {
        if self.project.chars().all(|c| c.is_ascii_digit()) {
            return Ok(self.project.clone());
        }

        let projects = self.client.projects(self.workspace.as_deref()).await?;
        let gid = projects
            .into_iter()
            .find(|p| p.name == self.project)
            .map(|p| p.gid)
            .ok_or_else(|| {
                AdapterError::unavailable(&self.name, format!("no project named '{}'", self.project))
            })?;

        debug!(adapter = %self.name, project = %self.project, gid = %gid, "Resolved Asana project");
        Ok(gid)
    }
}

#[async_trait]
impl Adapter for AsanaAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_fields(&self) -> &'static [Field] {
        SUPPORTED_FIELDS
    }

    async fn list_events(&self, range: &DateRange) -> AdapterResult<Listing> {
        let project = self.project_gid().await?;
        let tasks = self.client.project_tasks(project).await?;

        let mut listing = Listing::collect(tasks.into_iter().map(|task| task.into_event(&self.name)));
        listing.events.retain(|event| range.overlaps(event));

        debug!(
            adapter = %self.name,
            events = listing.events.len(),
            malformed = listing.malformed.len(),
            "Listed Asana tasks"
        );
        Ok(listing)
    }

    async fn create_event(&self, event: &Event) -> AdapterResult<String> {
        let project = self.project_gid().await?;
        let gid = self.client.create_task(project, event.to_asana()).await?;
        debug!(adapter = %self.name, native_id = %gid, "Created Asana task");
        Ok(gid)
    }

    async fn update_event(&self, native_id: &str, event: &Event) -> AdapterResult<()> {
        self.client.update_task(native_id, event.to_asana()).await?;
        debug!(adapter = %self.name, native_id, "Updated Asana task");
        Ok(())
    }

    async fn delete_event(&self, native_id: &str) -> AdapterResult<()> {
        self.client.delete_task(native_id).await?;
        debug!(adapter = %self.name, native_id, "Deleted Asana task");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter_for(server: &MockServer, project: &str) -> AsanaAdapter {
        AsanaAdapter::with_base_url("asana", "secret", project, &server.uri()).unwrap()
    }

    fn window() -> DateRange {
        DateRange::around(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(), 30)
    }

    fn event() -> Event {
        Event {
            native_id: "/cal/work/a.ics".into(),
            title: Some("Review".into()),
            location: Some("Room 4".into()),
            description: Some("Bring notes".into()),
            start: Some(Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()),
            end: Some(Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap()),
            completed: false,
            modified_at: Utc.with_ymd_and_hms(2025, 3, 2, 8, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_list_events_follows_pages_and_filters_window() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/42/tasks"))
            .and(header("Authorization", "Bearer secret"))
            .and(query_param("offset", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"gid": "3", "name": "Far away", "due_on": "2026-12-01",
                     "modified_at": "2025-03-02T08:00:00.000Z"},
                    {"gid": "4", "name": "No date", "modified_at": "2025-03-02T08:00:00.000Z"}
                ],
                "next_page": null
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/42/tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"gid": "1", "name": "Ship", "due_at": "2025-03-10T17:00:00.000Z",
                     "completed": false, "modified_at": "2025-03-02T08:00:00.000Z"}
                ],
                "next_page": {"offset": "page2", "path": "/projects/42/tasks?offset=page2"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let listing = adapter_for(&server, "42").list_events(&window()).await.unwrap();

        let ids: Vec<_> = listing.events.iter().map(|e| e.native_id.as_str()).collect();
        assert_eq!(ids, vec!["1"]);
        assert_eq!(listing.malformed.len(), 1);
        assert_eq!(listing.malformed[0].native_id.as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn test_project_name_is_resolved_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"gid": "7", "name": "Other"}, {"gid": "42", "name": "Launch"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/42/tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .expect(2)
            .mount(&server)
            .await;

        let adapter = adapter_for(&server, "Launch");
        adapter.list_events(&window()).await.unwrap();
        adapter.list_events(&window()).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_project_name_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;

        let err = adapter_for(&server, "Launch").list_events(&window()).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_create_event_posts_task_in_project() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tasks"))
            .and(body_partial_json(json!({
                "data": {
                    "name": "Review",
                    "notes": "Bring notes",
                    "start_at": "2025-03-10T09:00:00.000Z",
                    "due_at": "2025-03-10T10:00:00.000Z",
                    "projects": ["42"]
                }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "data": {"gid": "1209", "name": "Review"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gid = adapter_for(&server, "42").create_event(&event()).await.unwrap();
        assert_eq!(gid, "1209");
    }

    #[tokio::test]
    async fn test_update_errors_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/tasks/1"))
            .respond_with(ResponseTemplate::new(400).set_body_string("start_at requires due_at"))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/tasks/2"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let adapter = adapter_for(&server, "42");
        let err = adapter.update_event("1", &event()).await.unwrap_err();
        assert!(matches!(err, AdapterError::Rejected { ref native_id, .. } if native_id.as_deref() == Some("1")));
        assert!(adapter.update_event("2", &event()).await.unwrap_err().is_unavailable());
    }

    #[tokio::test]
    async fn test_delete_of_missing_task_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/tasks/1"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        adapter_for(&server, "42").delete_event("1").await.unwrap();
    }

    #[test]
    fn test_from_config() {
        let config: AdapterConfig = toml::from_str("token = \"t\"\nproject = 42\nworkspace = \"9\"\n").unwrap();
        let adapter = AsanaAdapter::from_config("asana", &config).unwrap();
        assert_eq!(adapter.project, "42");
        assert_eq!(adapter.workspace.as_deref(), Some("9"));

        let config: AdapterConfig = toml::from_str("project = 42\n").unwrap();
        let err = AsanaAdapter::from_config("asana", &config).err().unwrap();
        assert!(err.to_string().contains("adapters.asana.token"));
    }
}
