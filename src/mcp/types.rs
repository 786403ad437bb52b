use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::context::Context;

#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    /// Absent for notifications, which get no response.
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    pub method: String,
    pub params: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    pub description: String,
    pub required: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptDefinition {
    pub name: String,
    pub description: String,
    pub arguments: Vec<PromptArgument>,
}

/// Groups of tools that can be switched off together in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolGroup {
    Projects,
    Tasks,
}

pub trait ToolParams: Sized {
    fn input_schema() -> serde_json::Value;
    fn extract_params(arguments: &serde_json::Value) -> Result<Self>;
}

pub trait ToolProvider: Default {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;
    const GROUP: ToolGroup;
    type Params: ToolParams;

    fn get_tool_definition() -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_owned(),
            description: Self::DESCRIPTION.to_owned(),
            input_schema: Self::Params::input_schema(),
        }
    }

    /// Runs the tool and returns the text handed back to the agent.
    async fn execute_with_params(&self, ctx: &Context, params: Self::Params) -> Result<String>;

    async fn execute(&self, ctx: &Context, arguments: &serde_json::Value) -> Result<String> {
        let params = Self::Params::extract_params(arguments)?;
        self.execute_with_params(ctx, params).await
    }
}
