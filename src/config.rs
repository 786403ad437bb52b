use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{AuthError, OAuthSettings},
    mcp::ToolGroup,
};

const APP_DIR: &str = "dida365-mcp";

fn default_scope() -> String {
    "tasks:read tasks:write".to_owned()
}

fn default_host() -> String {
    "localhost".to_owned()
}

fn default_port() -> u16 {
    11365
}

fn default_callback_timeout_secs() -> u64 {
    600
}

fn default_base_url() -> String {
    "https://api.dida365.com".to_owned()
}

fn default_api_version() -> String {
    "/open/v1".to_owned()
}

fn default_user_agent() -> String {
    "MCP-Dida365/1.0".to_owned()
}

fn default_true() -> bool {
    true
}

fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub auth_url: Option<String>,
    pub token_url: Option<String>,
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Host the local callback listener binds to
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Log the authorization URL instead of opening a browser
    #[serde(default)]
    pub headless: bool,
    /// How long to wait for the browser round-trip, 0 waits forever
    #[serde(default = "default_callback_timeout_secs")]
    pub callback_timeout_secs: u64,
    pub token_file: Option<PathBuf>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            auth_url: None,
            token_url: None,
            scope: default_scope(),
            host: default_host(),
            port: default_port(),
            headless: false,
            callback_timeout_secs: default_callback_timeout_secs(),
            token_file: None,
        }
    }
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("scope", &self.scope)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("headless", &self.headless)
            .field("callback_timeout_secs", &self.callback_timeout_secs)
            .field("token_file", &self.token_file)
            .finish()
    }
}

impl OAuthConfig {
    /// Validates the provider settings, naming every missing one.
    pub fn settings(&self) -> Result<OAuthSettings, AuthError> {
        let required = [
            ("CLIENT_ID", &self.client_id),
            ("CLIENT_SECRET", &self.client_secret),
            ("AUTH_URL", &self.auth_url),
            ("TOKEN_URL", &self.token_url),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(AuthError::Configuration(format!(
                "missing required setting(s): {}",
                missing.join(", ")
            )));
        }

        Ok(OAuthSettings {
            client_id: self.client_id.clone().unwrap_or_default(),
            client_secret: self.client_secret.clone().unwrap_or_default(),
            auth_url: self.auth_url.clone().unwrap_or_default(),
            token_url: self.token_url.clone().unwrap_or_default(),
            scope: self.scope.clone(),
        })
    }

    pub fn token_file(&self) -> PathBuf {
        self.token_file
            .clone()
            .unwrap_or_else(|| app_data_dir().join("token.json"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// The API answers 400 to requests without a user agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_version: default_api_version(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectToolsConfig {
    /// Include closed (archived) projects when listing
    #[serde(default)]
    pub include_closed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskToolsConfig {
    /// Append the current local time to formatted tasks
    #[serde(default = "default_true")]
    pub show_current_time: bool,
}

impl Default for TaskToolsConfig {
    fn default() -> Self {
        Self {
            show_current_time: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    pub projects: Option<ProjectToolsConfig>,
    pub tasks: Option<TaskToolsConfig>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            projects: Some(ProjectToolsConfig::default()),
            tasks: Some(TaskToolsConfig::default()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Where the discovered inbox project id is cached
    pub data_file: Option<PathBuf>,
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = serde_json::from_str(&content)
            .with_context(|| "Failed to parse config file as JSON")?;

        Ok(config)
    }

    /// Loads the first config file found, then applies `.env` and environment
    /// overrides.
    pub fn load_default() -> Result<Self> {
        let mut config_paths = vec![PathBuf::from("./dida365-mcp-config.json")];
        if let Some(config_dir) = dirs::config_dir() {
            config_paths.push(config_dir.join(APP_DIR).join("config.json"));
        }

        let mut config = match config_paths.iter().find(|path| path.exists()) {
            Some(path) => {
                tracing::info!("Loading configuration from {}", path.display());
                Self::load_from_file(path)?
            }
            None => Config::default(),
        };

        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }
        config.apply_env(|key| std::env::var(key).ok());

        Ok(config)
    }

    /// Overrides file values with the environment variables the server has
    /// always honoured.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("CLIENT_ID") {
            self.oauth.client_id = Some(v);
        }
        if let Some(v) = var("CLIENT_SECRET") {
            self.oauth.client_secret = Some(v);
        }
        if let Some(v) = var("AUTH_URL") {
            self.oauth.auth_url = Some(v);
        }
        if let Some(v) = var("TOKEN_URL") {
            self.oauth.token_url = Some(v);
        }
        if let Some(v) = var("SCOPE") {
            self.oauth.scope = v;
        }
        if let Some(v) = var("HOST") {
            self.oauth.host = v;
        }
        if let Some(v) = var("PORT") {
            match v.trim().parse() {
                Ok(port) => self.oauth.port = port,
                Err(_) => tracing::warn!("Ignoring invalid PORT value {v:?}"),
            }
        }
        if let Some(v) = var("DOCKER_SERVER") {
            self.oauth.headless = matches!(v.trim().to_lowercase().as_str(), "1" | "true");
        }
        if let Some(v) = var("TICKTICK_API_BASE_URL") {
            self.api.base_url = v;
        }
        if let Some(v) = var("TICKTICK_API_VERSION") {
            self.api.api_version = v;
        }
    }

    pub fn is_group_enabled(&self, group: ToolGroup) -> bool {
        match group {
            ToolGroup::Projects => self.tools.projects.is_some(),
            ToolGroup::Tasks => self.tools.tasks.is_some(),
        }
    }

    pub fn data_file(&self) -> PathBuf {
        self.data_file
            .clone()
            .unwrap_or_else(|| app_data_dir().join("data.json"))
    }

    pub fn get_project_tools_config(&self) -> ProjectToolsConfig {
        self.tools.projects.clone().unwrap_or_default()
    }

    pub fn get_task_tools_config(&self) -> TaskToolsConfig {
        self.tools.tasks.clone().unwrap_or_default()
    }
}
