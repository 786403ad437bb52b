use anyhow::Result;
use serde_json::{json, Value};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::context::Context;
use crate::mcp::macros::register_providers;
use crate::mcp::{Request, Response, ResponseError, ToolProvider};
use crate::prompts;

register_providers! {
    tools: [
        crate::tools::projects::GetProjects,
        crate::tools::projects::GetProjectById,
        crate::tools::projects::GetProjectDetails,
        crate::tools::projects::CreateProject,
        crate::tools::projects::UpdateProject,
        crate::tools::projects::DeleteProject,
        crate::tools::projects::GetInboxProject,
        crate::tools::tasks::FilterProjectTasks,
        crate::tools::tasks::GetTaskById,
        crate::tools::tasks::CreateTask,
        crate::tools::tasks::UpdateTask,
        crate::tools::tasks::CompleteTask,
        crate::tools::tasks::DeleteTask,
    ]
}

const INSTRUCTIONS: &str = "This server provides a todo list management service for the user.\n\
    If not specified, tasks should always be created in the default project named \"AI-Planner\".\n\
    Prompt the user to re-authorize when a response contains an unauthorized error.";

const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

pub struct Server {
    ctx: Context,
}

impl Server {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub async fn run(self) -> Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        let mut reader = BufReader::new(stdin);
        let mut line = String::new();

        tracing::info!("Serving MCP requests on stdio");
        loop {
            line.clear();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                break; // EOF
            }
            if line.trim().is_empty() {
                continue;
            }

            let request = match serde_json::from_str::<Request>(&line) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!("Ignoring malformed request: {e}");
                    continue;
                }
            };

            if let Some(response) = self.handle_request(request).await {
                let response_json = serde_json::to_string(&response)?;
                stdout.write_all(response_json.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }

        tracing::info!("stdin closed, shutting down");
        Ok(())
    }

    async fn handle_request(&self, request: Request) -> Option<Response> {
        let Some(id) = request.id else {
            tracing::debug!("Notification {}", request.method);
            return None;
        };
        let params = request.params.unwrap_or_else(|| json!({}));

        let outcome = match request.method.as_str() {
            "initialize" => Ok(Self::handle_initialize()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.handle_list_tools()),
            "tools/call" => self.handle_call_tool(&params).await,
            "prompts/list" => Ok(json!({ "prompts": prompts::list_prompts() })),
            "prompts/get" => Self::handle_get_prompt(&params),
            method => Err(ResponseError {
                code: METHOD_NOT_FOUND,
                message: format!("Method not found: {method}"),
            }),
        };

        let (result, error) = match outcome {
            Ok(result) => (Some(result), None),
            Err(error) => (None, Some(error)),
        };
        Some(Response {
            jsonrpc: "2.0".to_owned(),
            id,
            result,
            error,
        })
    }

    fn handle_initialize() -> Value {
        json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {
                "tools": {},
                "prompts": {}
            },
            "serverInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions": INSTRUCTIONS
        })
    }

    fn handle_list_tools(&self) -> Value {
        json!({ "tools": list_tools(&self.ctx.config) })
    }

    async fn handle_call_tool(&self, params: &Value) -> Result<Value, ResponseError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ResponseError {
                code: INVALID_PARAMS,
                message: "Missing tool name".to_owned(),
            })?;
        let empty = json!({});
        let arguments = params.get("arguments").unwrap_or(&empty);

        let (text, is_error) = match execute_tool(&self.ctx, name, arguments).await {
            Ok(text) => (text, false),
            Err(e) => {
                tracing::error!("Error in {name}: {e:#}");
                (format!("Error in {name}: {e:#}"), true)
            }
        };
        Ok(json!({
            "content": [{ "type": "text", "text": text }],
            "isError": is_error
        }))
    }

    fn handle_get_prompt(params: &Value) -> Result<Value, ResponseError> {
        let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
        let empty = json!({});
        let arguments = params.get("arguments").unwrap_or(&empty);
        prompts::get_prompt(name, arguments).map_err(|e| ResponseError {
            code: INVALID_PARAMS,
            message: e.to_string(),
        })
    }
}
