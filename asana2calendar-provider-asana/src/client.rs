//! Thin client for the Asana REST API.

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use url::Url;

use asana2calendar_core::{AdapterError, AdapterResult};

use crate::task::{Envelope, Page, Project, TASK_FIELDS, Task};

pub const DEFAULT_BASE_URL: &str = "https://app.asana.com/api/1.0/";

const PAGE_SIZE: &str = "100";

pub struct AsanaClient {
    /// Adapter name, for error attribution.
    adapter: String,
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl AsanaClient {
    pub fn new(adapter: &str, http: reqwest::Client, base_url: Url, token: String) -> Self {
        AsanaClient {
            adapter: adapter.to_string(),
            http,
            base_url,
            token,
        }
    }

    fn url(&self, path: &str) -> AdapterResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AdapterError::unavailable(&self.adapter, format!("invalid API path {path}: {e}")))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http.request(method, url).bearer_auth(&self.token)
    }

    async fn send(&self, request: RequestBuilder, native_id: Option<&str>) -> AdapterResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| AdapterError::unavailable(&self.adapter, e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AdapterError::from_status(&self.adapter, native_id, status.as_u16(), &body))
    }

    async fn json<T: DeserializeOwned>(&self, response: Response) -> AdapterResult<T> {
        response.json().await.map_err(|e| {
            AdapterError::unavailable(&self.adapter, format!("unexpected response body: {e}"))
        })
    }

    /// Follow `next_page.offset` until the collection is exhausted.
    async fn get_all<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> AdapterResult<Vec<T>> {
        let url = self.url(path)?;
        let mut items = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut request = self
                .request(Method::GET, url.clone())
                .query(query)
                .query(&[("limit", PAGE_SIZE)]);
            if let Some(ref offset) = offset {
                request = request.query(&[("offset", offset.as_str())]);
            }

            let page: Page<T> = self.json(self.send(request, None).await?).await?;
            items.extend(page.data);

            match page.next_page {
                Some(next) => offset = Some(next.offset),
                None => return Ok(items),
            }
        }
    }

    pub async fn project_tasks(&self, project_gid: &str) -> AdapterResult<Vec<Task>> {
        self.get_all(
            &format!("projects/{project_gid}/tasks"),
            &[("opt_fields", TASK_FIELDS)],
        )
        .await
    }

    /// Projects visible to the token, optionally limited to one workspace.
    pub async fn projects(&self, workspace: Option<&str>) -> AdapterResult<Vec<Project>> {
        let mut query = vec![("opt_fields", "name")];
        if let Some(workspace) = workspace {
            query.push(("workspace", workspace));
        }
        self.get_all("projects", &query).await
    }

    pub async fn create_task(&self, project_gid: &str, mut body: Map<String, Value>) -> AdapterResult<String> {
        body.insert("projects".into(), json!([project_gid]));
        let request = self
            .request(Method::POST, self.url("tasks")?)
            .json(&json!({ "data": body }));

        let created: Envelope<Task> = self.json(self.send(request, None).await?).await?;
        Ok(created.data.gid)
    }

    pub async fn update_task(&self, gid: &str, body: Map<String, Value>) -> AdapterResult<()> {
        let request = self
            .request(Method::PUT, self.url(&format!("tasks/{gid}"))?)
            .json(&json!({ "data": body }));
        self.send(request, Some(gid)).await?;
        Ok(())
    }

    /// A task that is already gone counts as deleted.
    pub async fn delete_task(&self, gid: &str) -> AdapterResult<()> {
        let response = self
            .request(Method::DELETE, self.url(&format!("tasks/{gid}"))?)
            .send()
            .await
            .map_err(|e| AdapterError::unavailable(&self.adapter, e.to_string()))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(AdapterError::from_status(&self.adapter, Some(gid), status.as_u16(), &body))
    }
}
