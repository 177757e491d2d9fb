use crate::domain::models::{Label, RawTask};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::todoist_payload::{
    CompletedItem, NewTask, RemoteComment, RemoteProject, TaskUpdate,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

pub const REST_API_BASE: &str = "https://api.todoist.com/rest/v2/";
pub const SYNC_API_BASE: &str = "https://api.todoist.com/sync/v9/";

#[async_trait]
pub trait TodoistClient: Send + Sync {
    async fn list_tasks(
        &self,
        access_token: &str,
        project_id: Option<&str>,
    ) -> Result<Vec<RawTask>, InfraError>;

    async fn get_task(&self, access_token: &str, task_id: &str)
        -> Result<Option<RawTask>, InfraError>;

    async fn create_task(&self, access_token: &str, task: &NewTask) -> Result<RawTask, InfraError>;

    async fn update_task(
        &self,
        access_token: &str,
        task_id: &str,
        update: &TaskUpdate,
    ) -> Result<(), InfraError>;

    async fn list_labels(&self, access_token: &str) -> Result<Vec<Label>, InfraError>;

    async fn list_projects(&self, access_token: &str) -> Result<Vec<RemoteProject>, InfraError>;

    async fn list_comments(
        &self,
        access_token: &str,
        task_id: &str,
    ) -> Result<Vec<RemoteComment>, InfraError>;

    async fn create_comment(
        &self,
        access_token: &str,
        task_id: &str,
        content: &str,
    ) -> Result<RemoteComment, InfraError>;

    async fn update_comment(
        &self,
        access_token: &str,
        comment_id: &str,
        content: &str,
    ) -> Result<(), InfraError>;

    async fn list_completed(
        &self,
        access_token: &str,
        limit: usize,
    ) -> Result<Vec<CompletedItem>, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTodoistClient {
    client: Client,
    rest_base: String,
    sync_base: String,
}

impl Default for ReqwestTodoistClient {
    fn default() -> Self {
        Self::new(REST_API_BASE, SYNC_API_BASE)
    }
}

#[derive(Debug, serde::Deserialize)]
struct CompletedPage {
    items: Option<Vec<CompletedItem>>,
}

#[derive(Debug, serde::Serialize)]
struct CommentRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    task_id: Option<&'a str>,
    content: &'a str,
}

impl ReqwestTodoistClient {
    pub fn new(rest_base: impl Into<String>, sync_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            rest_base: rest_base.into(),
            sync_base: sync_base.into(),
        }
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::Remote(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn ensure_token(access_token: &str) -> Result<(), InfraError> {
        if access_token.trim().is_empty() {
            return Err(InfraError::AuthRequired);
        }
        Ok(())
    }

    fn http_error(status: StatusCode, body: &str) -> InfraError {
        let message = if body.trim().is_empty() {
            format!("http {}", status.as_u16())
        } else {
            format!("http {}; body={body}", status.as_u16())
        };
        InfraError::Remote(message)
    }

    fn endpoint(base: &str, segments: &[&str]) -> Result<Url, InfraError> {
        let mut url = Url::parse(base)
            .map_err(|error| InfraError::Remote(format!("invalid api base url '{base}': {error}")))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| InfraError::Remote(format!("api base url '{base}' cannot be a base")))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn rest(&self, segments: &[&str]) -> Result<Url, InfraError> {
        Self::endpoint(&self.rest_base, segments)
    }

    async fn send(request: RequestBuilder, action: &str) -> Result<(StatusCode, String), InfraError> {
        let response = request
            .send()
            .await
            .map_err(|error| InfraError::Remote(format!("network error while {action}: {error}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Remote(format!("failed reading response while {action}: {error}")))?;
        Ok((status, body))
    }

    async fn fetch_json<T: DeserializeOwned>(
        request: RequestBuilder,
        action: &str,
    ) -> Result<T, InfraError> {
        let (status, body) = Self::send(request, action).await?;
        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        serde_json::from_str(&body).map_err(|error| {
            InfraError::Remote(format!("invalid payload while {action}: {error}; body={body}"))
        })
    }

    async fn expect_success(request: RequestBuilder, action: &str) -> Result<(), InfraError> {
        let (status, body) = Self::send(request, action).await?;
        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        Ok(())
    }
}

#[async_trait]
impl TodoistClient for ReqwestTodoistClient {
    async fn list_tasks(
        &self,
        access_token: &str,
        project_id: Option<&str>,
    ) -> Result<Vec<RawTask>, InfraError> {
        Self::ensure_token(access_token)?;
        let mut request = self.client.get(self.rest(&["tasks"])?).bearer_auth(access_token);
        if let Some(project_id) = project_id.map(str::trim).filter(|value| !value.is_empty()) {
            request = request.query(&[("project_id", project_id)]);
        }
        Self::fetch_json(request, "listing tasks").await
    }

    async fn get_task(
        &self,
        access_token: &str,
        task_id: &str,
    ) -> Result<Option<RawTask>, InfraError> {
        Self::ensure_token(access_token)?;
        Self::ensure_non_empty(task_id, "task id")?;

        let request = self
            .client
            .get(self.rest(&["tasks", task_id.trim()])?)
            .bearer_auth(access_token);
        let (status, body) = Self::send(request, "reading task").await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        let task = serde_json::from_str(&body).map_err(|error| {
            InfraError::Remote(format!("invalid task payload: {error}; body={body}"))
        })?;
        Ok(Some(task))
    }

    async fn create_task(&self, access_token: &str, task: &NewTask) -> Result<RawTask, InfraError> {
        Self::ensure_token(access_token)?;
        Self::ensure_non_empty(&task.content, "task content")?;
        let request = self
            .client
            .post(self.rest(&["tasks"])?)
            .bearer_auth(access_token)
            .json(task);
        let created: RawTask = Self::fetch_json(request, "creating task").await?;
        if created.id.is_empty() {
            return Err(InfraError::Remote(
                "task create response did not include id".to_string(),
            ));
        }
        Ok(created)
    }

    async fn update_task(
        &self,
        access_token: &str,
        task_id: &str,
        update: &TaskUpdate,
    ) -> Result<(), InfraError> {
        Self::ensure_token(access_token)?;
        Self::ensure_non_empty(task_id, "task id")?;
        let request = self
            .client
            .post(self.rest(&["tasks", task_id.trim()])?)
            .bearer_auth(access_token)
            .json(update);
        Self::expect_success(request, "updating task").await
    }

    async fn list_labels(&self, access_token: &str) -> Result<Vec<Label>, InfraError> {
        Self::ensure_token(access_token)?;
        let request = self.client.get(self.rest(&["labels"])?).bearer_auth(access_token);
        Self::fetch_json(request, "listing labels").await
    }

    async fn list_projects(&self, access_token: &str) -> Result<Vec<RemoteProject>, InfraError> {
        Self::ensure_token(access_token)?;
        let request = self.client.get(self.rest(&["projects"])?).bearer_auth(access_token);
        Self::fetch_json(request, "listing projects").await
    }

    async fn list_comments(
        &self,
        access_token: &str,
        task_id: &str,
    ) -> Result<Vec<RemoteComment>, InfraError> {
        Self::ensure_token(access_token)?;
        Self::ensure_non_empty(task_id, "task id")?;
        let request = self
            .client
            .get(self.rest(&["comments"])?)
            .query(&[("task_id", task_id.trim())])
            .bearer_auth(access_token);
        Self::fetch_json(request, "listing comments").await
    }

    async fn create_comment(
        &self,
        access_token: &str,
        task_id: &str,
        content: &str,
    ) -> Result<RemoteComment, InfraError> {
        Self::ensure_token(access_token)?;
        Self::ensure_non_empty(task_id, "task id")?;
        let request = self
            .client
            .post(self.rest(&["comments"])?)
            .bearer_auth(access_token)
            .json(&CommentRequest {
                task_id: Some(task_id.trim()),
                content,
            });
        Self::fetch_json(request, "creating comment").await
    }

    async fn update_comment(
        &self,
        access_token: &str,
        comment_id: &str,
        content: &str,
    ) -> Result<(), InfraError> {
        Self::ensure_token(access_token)?;
        Self::ensure_non_empty(comment_id, "comment id")?;
        let request = self
            .client
            .post(self.rest(&["comments", comment_id.trim()])?)
            .bearer_auth(access_token)
            .json(&CommentRequest {
                task_id: None,
                content,
            });
        Self::expect_success(request, "updating comment").await
    }

    async fn list_completed(
        &self,
        access_token: &str,
        limit: usize,
    ) -> Result<Vec<CompletedItem>, InfraError> {
        Self::ensure_token(access_token)?;
        let request = self
            .client
            .post(Self::endpoint(&self.sync_base, &["completed", "get_all"])?)
            .bearer_auth(access_token)
            .json(&serde_json::json!({}));
        let page: CompletedPage = Self::fetch_json(request, "listing completed items").await?;
        let mut items = page.items.unwrap_or_default();
        items.truncate(limit);
        Ok(items)
    }
}
