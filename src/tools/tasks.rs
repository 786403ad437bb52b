use anyhow::Result;
use serde_json::Value;

use crate::client::TaskFields;
use crate::context::Context;
use crate::filter::filter_tasks;
use crate::format::format_task;
use crate::mcp::{ToolGroup, ToolProvider};
use crate::tool_params;

const PRIORITY_DOC: &str = "The priority of the task. 0: none, 1: low, 3: medium, 5: high";
const ITEMS_DOC: &str = "The items (subtasks/capstones) of the task, e.g. \
    [{\"title\": \"Subtask 1\"}, {\"title\": \"Subtask 2\"}]. Do not wrap the array in a string";

#[derive(Default)]
pub struct FilterProjectTasks;

tool_params! {
    FilterProjectTasksParams {
        required(project_id: String, "The ID of the project whose tasks are filtered"),
        required(filter_fields: Vec<String>, "Filter expressions, all of which must match"),
    }
}

impl ToolProvider for FilterProjectTasks {
    const NAME: &'static str = "filter_project_tasks";
    const DESCRIPTION: &'static str = "Filter the tasks in a project, returning only the tasks \
        for which all filter expressions match. Each expression is `<field> <op> <value>` with op \
        one of ==, !=, >, <, >=, <=. `==` means exactly equal and is not recommended for date \
        fields. Date fields accept today, tomorrow, yesterday or an ISO date. priority accepts \
        high, medium, low, none or a number. Examples: [\"dueDate <= tomorrow\", \
        \"startDate <= today\", \"priority >= high\"]";
    const GROUP: ToolGroup = ToolGroup::Tasks;
    type Params = FilterProjectTasksParams;

    async fn execute_with_params(
        &self,
        ctx: &Context,
        params: FilterProjectTasksParams,
    ) -> Result<String> {
        let mut details = ctx.client.get_project_details(&params.project_id).await?;
        let tasks = match details.get_mut("tasks").map(Value::take) {
            Some(Value::Array(tasks)) => tasks,
            _ => Vec::new(),
        };

        let matched = filter_tasks(tasks, params.filter_fields.as_slice())?;
        tracing::debug!(
            "{} tasks in {} matched {:?}",
            matched.len(),
            params.project_id,
            params.filter_fields
        );
        if matched.is_empty() {
            return Ok("No tasks matched the filters".to_owned());
        }

        let clock = ctx.task_clock();
        Ok(matched
            .iter()
            .map(|task| format_task(task, clock))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

#[derive(Default)]
pub struct GetTaskById;

tool_params! {
    TaskRefParams {
        required(project_id: String, "The ID of the project the task belongs to"),
        required(task_id: String, "The ID of the task"),
    }
}

impl ToolProvider for GetTaskById {
    const NAME: &'static str = "get_task_by_id";
    const DESCRIPTION: &'static str = "Get a task by id.";
    const GROUP: ToolGroup = ToolGroup::Tasks;
    type Params = TaskRefParams;

    async fn execute_with_params(&self, ctx: &Context, params: TaskRefParams) -> Result<String> {
        let task = ctx
            .client
            .get_task_by_id(&params.project_id, &params.task_id)
            .await?;
        match task.as_object() {
            Some(fields) if !fields.is_empty() => Ok(format_task(&task, ctx.task_clock())),
            _ => Ok(format!("Task {} not found", params.task_id)),
        }
    }
}

#[derive(Default)]
pub struct CreateTask;

tool_params! {
    CreateTaskParams {
        required(project_id: String, "The ID of the project to create the task in"),
        required(title: String, "The title of the task, keep it short and concise"),
        optional(content: String, "The content/details of the task"),
        optional(is_all_day as "isAllDay": bool, "Whether the task is all day"),
        optional(start_date as "startDate": String, "The start date of the task, e.g. \"2019-11-13T03:00:00+0000\""),
        optional(due_date as "dueDate": String, "The due date of the task, e.g. \"2019-11-13T03:00:00+0000\""),
        optional(repeat_flag as "repeatFlag": String, "The repeat pattern of the task, e.g. \"RRULE:FREQ=DAILY;INTERVAL=1\""),
        optional(priority: i64, PRIORITY_DOC),
        optional(sort_order as "sortOrder": i64, "Smaller values are listed first"),
        optional(items: Vec<Value>, ITEMS_DOC),
    }
}

impl ToolProvider for CreateTask {
    const NAME: &'static str = "create_task";
    const DESCRIPTION: &'static str = "Create a task in a project.";
    const GROUP: ToolGroup = ToolGroup::Tasks;
    type Params = CreateTaskParams;

    async fn execute_with_params(&self, ctx: &Context, params: CreateTaskParams) -> Result<String> {
        let fields = TaskFields {
            project_id: Some(params.project_id),
            title: Some(params.title),
            content: params.content,
            is_all_day: params.is_all_day,
            start_date: params.start_date,
            due_date: params.due_date,
            repeat_flag: params.repeat_flag,
            priority: params.priority,
            sort_order: params.sort_order,
            items: params.items,
            ..TaskFields::default()
        };
        let task = ctx.client.create_task(&fields).await?;
        Ok(format_task(&task, ctx.task_clock()))
    }
}

#[derive(Default)]
pub struct UpdateTask;

tool_params! {
    UpdateTaskParams {
        required(task_id: String, "The ID of the task to update"),
        required(project_id: String, "The ID of the project the task belongs to"),
        optional(title: String, "The title of the task"),
        optional(content: String, "The content of the task"),
        optional(is_all_day as "isAllDay": bool, "Whether the task is all day"),
        optional(start_date as "startDate": String, "The start date of the task"),
        optional(due_date as "dueDate": String, "The due date of the task"),
        optional(repeat_flag as "repeatFlag": String, "The repeat pattern of the task, e.g. \"RRULE:FREQ=DAILY;INTERVAL=1\""),
        optional(priority: i64, PRIORITY_DOC),
        optional(sort_order as "sortOrder": i64, "Smaller values are listed first"),
        optional(items: Vec<Value>, ITEMS_DOC),
    }
}

impl ToolProvider for UpdateTask {
    const NAME: &'static str = "update_task";
    const DESCRIPTION: &'static str = "Update a task.";
    const GROUP: ToolGroup = ToolGroup::Tasks;
    type Params = UpdateTaskParams;

    async fn execute_with_params(&self, ctx: &Context, params: UpdateTaskParams) -> Result<String> {
        let fields = TaskFields {
            id: Some(params.task_id.clone()),
            project_id: Some(params.project_id),
            title: params.title,
            content: params.content,
            is_all_day: params.is_all_day,
            start_date: params.start_date,
            due_date: params.due_date,
            repeat_flag: params.repeat_flag,
            priority: params.priority,
            sort_order: params.sort_order,
            items: params.items,
            ..TaskFields::default()
        };
        let task = ctx.client.update_task(&params.task_id, &fields).await?;
        Ok(format_task(&task, ctx.task_clock()))
    }
}

#[derive(Default)]
pub struct CompleteTask;

impl ToolProvider for CompleteTask {
    const NAME: &'static str = "complete_task";
    const DESCRIPTION: &'static str = "Complete a task.";
    const GROUP: ToolGroup = ToolGroup::Tasks;
    type Params = TaskRefParams;

    async fn execute_with_params(&self, ctx: &Context, params: TaskRefParams) -> Result<String> {
        ctx.client
            .complete_task(&params.project_id, &params.task_id)
            .await?;
        Ok(format!("Task {} completed successfully", params.task_id))
    }
}

#[derive(Default)]
pub struct DeleteTask;

impl ToolProvider for DeleteTask {
    const NAME: &'static str = "delete_task";
    const DESCRIPTION: &'static str = "Delete a task.";
    const GROUP: ToolGroup = ToolGroup::Tasks;
    type Params = TaskRefParams;

    async fn execute_with_params(&self, ctx: &Context, params: TaskRefParams) -> Result<String> {
        ctx.client
            .delete_task(&params.project_id, &params.task_id)
            .await?;
        Ok(format!("Task {} deleted successfully", params.task_id))
    }
}
