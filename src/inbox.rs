use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::client::{ApiClient, TaskFields};

const INBOX_KEY: &str = "inbox_project_id";
// Tasks created in an unknown project land in the inbox.
const PROBE_PROJECT_ID: &str = "11365in";
const PROBE_TITLE: &str = "_inbox_id_probe_";

/// Caches the id of the inbox project, which the API does not list.
pub struct InboxCache {
    path: PathBuf,
}

impl InboxCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_data(&self) -> Map<String, Value> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    fn save_data(&self, data: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(data)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    pub fn cached(&self) -> Option<String> {
        self.read_data()
            .get(INBOX_KEY)
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    /// Returns the cached inbox id, discovering it with a throwaway task the
    /// first time.
    pub async fn inbox_project_id(&self, client: &ApiClient) -> Result<Option<String>> {
        if let Some(id) = self.cached() {
            return Ok(Some(id));
        }

        let probe = client
            .create_task(&TaskFields {
                project_id: Some(PROBE_PROJECT_ID.to_owned()),
                title: Some(PROBE_TITLE.to_owned()),
                ..TaskFields::default()
            })
            .await?;

        let (Some(inbox_id), Some(task_id)) = (
            probe.get("projectId").and_then(Value::as_str),
            probe.get("id").and_then(Value::as_str),
        ) else {
            tracing::warn!("Inbox probe task came back without projectId or id");
            return Ok(None);
        };

        client.delete_task(inbox_id, task_id).await?;

        let mut data = self.read_data();
        data.insert(INBOX_KEY.to_owned(), Value::String(inbox_id.to_owned()));
        self.save_data(&data)?;
        tracing::info!("Discovered inbox project {inbox_id}");

        Ok(Some(inbox_id.to_owned()))
    }
}
