use anyhow::{anyhow, Result};
use serde_json::{json, Value};

use crate::mcp::{PromptArgument, PromptDefinition};

const NEW_TASK_REQUEST: &str = "generate_new_task_request";

pub fn list_prompts() -> Vec<PromptDefinition> {
    vec![PromptDefinition {
        name: NEW_TASK_REQUEST.to_owned(),
        description: "Generate a new user message for new task(s).".to_owned(),
        arguments: vec![PromptArgument {
            name: "task_description".to_owned(),
            description: "What the new task(s) should achieve".to_owned(),
            required: true,
        }],
    }]
}

pub fn get_prompt(name: &str, arguments: &Value) -> Result<Value> {
    match name {
        NEW_TASK_REQUEST => {
            let description = arguments
                .get("task_description")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("Missing required argument: task_description"))?;
            Ok(json!({
                "description": "Generate a new user message for new task(s).",
                "messages": [{
                    "role": "user",
                    "content": {"type": "text", "text": new_task_request(description)}
                }]
            }))
        }
        _ => Err(anyhow!("Prompt not found: {name}")),
    }
}

fn new_task_request(task_description: &str) -> String {
    format!(
        "Use the MCP, create new task(s) with the following description: {task_description}.\n\
         You should split the task into subtasks (capstones) and fill the details for the task. \
         If the subtask items are supposed to have a due date, create them as Tasks.\n\
         The task should have an appropriate due date. Take other tasks in the week into consideration.\n"
    )
}
