use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use taskboard_core::api::{ApiError, ApiResult, BoardApi};
use taskboard_core::chat::Message;
use taskboard_core::notification::Notification;
use taskboard_core::session::SessionContext;
use taskboard_core::statistics::StatisticsSnapshot;
use taskboard_core::task::{Task, TaskFilter, TaskPatch};

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// REST client for the board backend.
#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base: Url,
    session: Arc<dyn SessionContext>,
}

/// The notification endpoint answers with a map keyed by counterpart; a flat
/// list is grouped locally.
#[derive(Deserialize)]
#[serde(untagged)]
enum NotificationsBody {
    Grouped(BTreeMap<String, Vec<Notification>>),
    Flat(Vec<Notification>),
}

impl NotificationsBody {
    fn into_map(self) -> BTreeMap<String, Vec<Notification>> {
        match self {
            Self::Grouped(map) => map,
            Self::Flat(list) => {
                let mut map: BTreeMap<String, Vec<Notification>> = BTreeMap::new();
                for n in list {
                    map.entry(n.counterpart().to_string()).or_default().push(n);
                }
                map
            }
        }
    }
}

impl RestClient {
    /// Create a client rooted at `base` (for example `http://host/app/rest/`).
    pub fn new(base: Url, session: Arc<dyn SessionContext>) -> Self {
        debug!(base_url = %base, "RestClient initialized");
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base,
            session,
        }
    }

    /// Resolve `path` against the base and append raw path segments, which
    /// are percent-encoded.
    fn url(&self, path: &str, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| ApiError::transport(format!("invalid url {path}: {e}")))?;
        if !segments.is_empty() {
            let mut parts = url
                .path_segments_mut()
                .map_err(|_| ApiError::transport("base url cannot have path segments"))?;
            parts.pop_if_empty();
            parts.extend(segments);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> ApiResult<RequestBuilder> {
        let token = self.session.auth_token().ok_or(ApiError::Unauthorized)?;
        Ok(self
            .client
            .request(method, url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json"))
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> ApiResult<Response> {
        let response = request.send().await.map_err(|e| {
            warn!(error = %e, request = what, "REST request failed");
            ApiError::transport(e)
        })?;
        let status = response.status();
        if status.is_success() {
            debug!(request = what, status_code = %status, "REST request succeeded");
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(request = what, status_code = %status, body = %body, "REST request rejected");
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized,
            StatusCode::NOT_FOUND => ApiError::NotFound(if body.is_empty() {
                what.to_string()
            } else {
                body
            }),
            other => ApiError::rejected(other.as_u16(), body),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, what: &str) -> ApiResult<T> {
        let request = self.request(Method::GET, url)?;
        let response = self.send(request, what).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    fn tasks_url(&self, filter: &TaskFilter, deleted: Option<bool>) -> ApiResult<Url> {
        let mut url = self.url("tasks/", &[])?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(deleted) = deleted {
                query.append_pair("deleted", if deleted { "true" } else { "false" });
            }
            if let Some(username) = &filter.username {
                query.append_pair("username", username);
            }
            if let Some(category) = &filter.category {
                query.append_pair("category", category);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl BoardApi for RestClient {
    async fn list_tasks(&self, filter: &TaskFilter) -> ApiResult<Vec<Task>> {
        // An unfiltered board asks explicitly for live tasks; the filtered
        // endpoints only ever return live ones.
        let deleted = filter.is_empty().then_some(false);
        let url = self.tasks_url(filter, deleted)?;
        let tasks: Vec<Task> = self.get_json(url, "list tasks").await?;
        debug!(count = tasks.len(), ?filter, "Fetched tasks");
        Ok(tasks)
    }

    async fn list_deleted_tasks(&self) -> ApiResult<Vec<Task>> {
        let url = self.tasks_url(&TaskFilter::default(), Some(true))?;
        self.get_json(url, "list deleted tasks").await
    }

    async fn patch_task(&self, patch: &TaskPatch) -> ApiResult<()> {
        let id = patch.id.to_string();
        let url = if patch.is_status_only() {
            self.url("tasks/status/", &[id.as_str()])?
        } else {
            self.url("tasks/", &[id.as_str()])?
        };
        debug!(task_id = patch.id, url = %url, "Patching task");
        let request = self.request(Method::POST, url)?.json(patch);
        self.send(request, "patch task").await?;
        Ok(())
    }

    async fn delete_task_permanently(&self, id: i64) -> ApiResult<()> {
        let id = id.to_string();
        let url = self.url("tasks/", &[id.as_str()])?;
        let request = self.request(Method::DELETE, url)?;
        self.send(request, "delete task").await?;
        Ok(())
    }

    async fn messages_between(&self, me: &str, counterpart: &str) -> ApiResult<Vec<Message>> {
        let url = self.url("messages/", &[me, counterpart])?;
        self.get_json(url, "list messages").await
    }

    async fn notifications(&self) -> ApiResult<BTreeMap<String, Vec<Notification>>> {
        let url = self.url("notification", &[])?;
        let body: NotificationsBody = self.get_json(url, "list notifications").await?;
        Ok(body.into_map())
    }

    async fn mark_notifications_read(&self, counterpart: &str) -> ApiResult<()> {
        let url = self.url("notification/read/", &[counterpart])?;
        let request = self.request(Method::PUT, url)?;
        self.send(request, "mark notifications read").await?;
        Ok(())
    }

    async fn statistics(&self) -> ApiResult<StatisticsSnapshot> {
        let url = self.url("statistics/dashboard", &[])?;
        self.get_json(url, "dashboard statistics").await
    }
}
