use std::time::Duration;

use anyhow::{anyhow, bail, Context as _, Result};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use url::Url;

use crate::{auth::Token, config::ApiConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    List,
    Kanban,
    Timeline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProjectKind {
    Task,
    Note,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// The project endpoints take the sort order as a string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_mode: Option<ViewMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ProjectKind>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_all_day: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminders: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat_flag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<Value>>,
}

/// Authenticated client for the task API.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: Token,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, token: Token) -> Result<Self> {
        let base_url = Url::parse(&format!("{}{}", config.base_url, config.api_version))
            .with_context(|| format!("Invalid API base URL: {}", config.base_url))?;
        if base_url.cannot_be_a_base() {
            bail!("Invalid API base URL: {}", config.base_url);
        }

        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn request(&self, method: Method, segments: &[&str], body: Option<Value>) -> Result<Value> {
        let url = self.endpoint(segments);
        let path = url.path().to_owned();

        // The API rejects requests that carry no JSON body.
        let response = self
            .http
            .request(method.clone(), url)
            .bearer_auth(&self.token.value)
            .json(&body.unwrap_or_else(|| json!({})))
            .send()
            .await
            .with_context(|| format!("{method} {path} failed"))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response to {method} {path}"))?;

        if !status.is_success() {
            tracing::error!("API request {method} {path} failed: {status}");
            if status == StatusCode::UNAUTHORIZED {
                bail!(
                    "Unauthorized ({status}): the access token was rejected, \
                     remove the token file and restart the server to re-authorize"
                );
            }
            bail!("API request {method} {path} failed with {status}: {text}");
        }

        if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
            return Ok(json!({}));
        }

        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse response to {method} {path}"))
    }

    pub async fn get_projects(&self) -> Result<Vec<Value>> {
        match self.request(Method::GET, &["project"], None).await? {
            Value::Array(projects) => Ok(projects),
            _ => Ok(Vec::new()),
        }
    }

    pub async fn get_project_by_id(&self, project_id: &str) -> Result<Value> {
        let project = self.request(Method::GET, &["project", project_id], None).await?;
        Ok(object_or_empty(project))
    }

    /// The project together with its tasks.
    pub async fn get_project_details(&self, project_id: &str) -> Result<Value> {
        let details = self
            .request(Method::GET, &["project", project_id, "data"], None)
            .await?;
        Ok(object_or_empty(details))
    }

    pub async fn create_project(&self, fields: &ProjectFields) -> Result<Value> {
        tracing::info!("Creating project: {}", serde_json::to_string(fields)?);
        let project = self
            .request(Method::POST, &["project"], Some(serde_json::to_value(fields)?))
            .await?;
        expect_object(project, "create project")
    }

    pub async fn update_project(&self, project_id: &str, fields: &ProjectFields) -> Result<Value> {
        let project = self
            .request(
                Method::PUT,
                &["project", project_id],
                Some(serde_json::to_value(fields)?),
            )
            .await?;
        expect_object(project, "update project")
    }

    pub async fn delete_project(&self, project_id: &str) -> Result<()> {
        self.request(Method::DELETE, &["project", project_id], None)
            .await?;
        Ok(())
    }

    pub async fn get_task_by_id(&self, project_id: &str, task_id: &str) -> Result<Value> {
        self.request(Method::GET, &["project", project_id, "task", task_id], None)
            .await
    }

    pub async fn create_task(&self, fields: &TaskFields) -> Result<Value> {
        let task = self
            .request(Method::POST, &["task"], Some(serde_json::to_value(fields)?))
            .await?;
        expect_object(task, "create task")
    }

    pub async fn update_task(&self, task_id: &str, fields: &TaskFields) -> Result<Value> {
        let task = self
            .request(Method::PUT, &["task", task_id], Some(serde_json::to_value(fields)?))
            .await?;
        expect_object(task, "update task")
    }

    pub async fn complete_task(&self, project_id: &str, task_id: &str) -> Result<()> {
        self.request(
            Method::POST,
            &["project", project_id, "task", task_id, "complete"],
            None,
        )
        .await?;
        Ok(())
    }

    pub async fn delete_task(&self, project_id: &str, task_id: &str) -> Result<()> {
        self.request(Method::DELETE, &["project", project_id, "task", task_id], None)
            .await?;
        Ok(())
    }
}

fn object_or_empty(value: Value) -> Value {
    if value.is_object() {
        value
    } else {
        json!({})
    }
}

fn expect_object(value: Value, action: &str) -> Result<Value> {
    if value.is_object() {
        Ok(value)
    } else {
        Err(anyhow!("Failed to {action}: unexpected response {value}"))
    }
}
