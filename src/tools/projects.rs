use anyhow::{bail, Result};
use serde_json::Value;

use super::numbered;
use crate::client::{ProjectFields, ProjectKind, ViewMode};
use crate::context::Context;
use crate::format::{format_project, format_task};
use crate::mcp::{ToolGroup, ToolProvider};
use crate::tool_params;

fn parse_view_mode(value: &str) -> Result<ViewMode> {
    match value {
        "list" => Ok(ViewMode::List),
        "kanban" => Ok(ViewMode::Kanban),
        "timeline" => Ok(ViewMode::Timeline),
        other => bail!("Invalid viewMode {other:?}: expected list, kanban or timeline"),
    }
}

fn parse_kind(value: &str) -> Result<ProjectKind> {
    match value {
        "TASK" => Ok(ProjectKind::Task),
        "NOTE" => Ok(ProjectKind::Note),
        other => bail!("Invalid kind {other:?}: expected TASK or NOTE"),
    }
}

fn project_fields(
    name: Option<String>,
    color: Option<String>,
    sort_order: Option<i64>,
    view_mode: Option<String>,
    kind: Option<String>,
) -> Result<ProjectFields> {
    Ok(ProjectFields {
        name,
        color,
        sort_order: sort_order.map(|order| order.to_string()),
        view_mode: view_mode.as_deref().map(parse_view_mode).transpose()?,
        kind: kind.as_deref().map(parse_kind).transpose()?,
    })
}

#[derive(Default)]
pub struct GetProjects;

tool_params! {
    NoParams {}
}

impl ToolProvider for GetProjects {
    const NAME: &'static str = "get_projects";
    const DESCRIPTION: &'static str = "Get a list of all Projects (collections of tasks). \
        The inbox contains all tasks that are not allocated to any project and is not listed here, \
        use get_inbox_project for it.";
    const GROUP: ToolGroup = ToolGroup::Projects;
    type Params = NoParams;

    async fn execute_with_params(&self, ctx: &Context, _params: NoParams) -> Result<String> {
        let include_closed = ctx.config.get_project_tools_config().include_closed;
        let projects = ctx.client.get_projects().await?;
        let listed = projects
            .iter()
            .filter(|project| {
                include_closed || !project.get("closed").and_then(Value::as_bool).unwrap_or(false)
            })
            .map(format_project);
        Ok(numbered(listed))
    }
}

#[derive(Default)]
pub struct GetProjectById;

tool_params! {
    ProjectIdParams {
        required(project_id: String, "The ID of the project"),
    }
}

impl ToolProvider for GetProjectById {
    const NAME: &'static str = "get_project_by_id";
    const DESCRIPTION: &'static str = "Get a project's details by id, no tasks included.";
    const GROUP: ToolGroup = ToolGroup::Projects;
    type Params = ProjectIdParams;

    async fn execute_with_params(&self, ctx: &Context, params: ProjectIdParams) -> Result<String> {
        let project = ctx.client.get_project_by_id(&params.project_id).await?;
        Ok(format_project(&project))
    }
}

#[derive(Default)]
pub struct GetProjectDetails;

impl ToolProvider for GetProjectDetails {
    const NAME: &'static str = "get_project_details";
    const DESCRIPTION: &'static str = "Get a project (collection of tasks) and the list of tasks in it. \
        The task list can be very long, use filter_project_tasks to pick out the tasks you need.";
    const GROUP: ToolGroup = ToolGroup::Projects;
    type Params = ProjectIdParams;

    async fn execute_with_params(&self, ctx: &Context, params: ProjectIdParams) -> Result<String> {
        let details = ctx.client.get_project_details(&params.project_id).await?;
        if details.as_object().map_or(true, |d| d.is_empty()) {
            return Ok(String::new());
        }

        let clock = ctx.task_clock();
        let tasks = details
            .get("tasks")
            .and_then(Value::as_array)
            .map(|tasks| tasks.iter().map(|task| format_task(task, clock)).collect::<Vec<_>>())
            .unwrap_or_default();
        let project = details.get("project").map(format_project).unwrap_or_default();

        let mut sections = vec!["Project Details:".to_owned(), project, "Tasks:".to_owned()];
        sections.extend(
            tasks
                .into_iter()
                .enumerate()
                .map(|(idx, task)| format!("{}. {task}", idx + 1)),
        );
        Ok(sections.join("\n\n"))
    }
}

#[derive(Default)]
pub struct CreateProject;

tool_params! {
    CreateProjectParams {
        required(name: String, "The name of the project"),
        optional(color: String, "Hex color code of the project, starting with #"),
        optional(sort_order as "sortOrder": i64, "The sort order of the project"),
        optional(view_mode as "viewMode": String, "The view mode of the project: list, kanban or timeline (default list)"),
        optional(kind: String, "The kind of the project: TASK or NOTE"),
    }
}

impl ToolProvider for CreateProject {
    const NAME: &'static str = "create_project";
    const DESCRIPTION: &'static str = "Create a project (collection of tasks).";
    const GROUP: ToolGroup = ToolGroup::Projects;
    type Params = CreateProjectParams;

    async fn execute_with_params(
        &self,
        ctx: &Context,
        params: CreateProjectParams,
    ) -> Result<String> {
        let fields = project_fields(
            Some(params.name),
            params.color,
            params.sort_order,
            Some(params.view_mode.unwrap_or_else(|| "list".to_owned())),
            params.kind,
        )?;
        let project = ctx.client.create_project(&fields).await?;
        Ok(format_project(&project))
    }
}

#[derive(Default)]
pub struct UpdateProject;

tool_params! {
    UpdateProjectParams {
        required(project_id: String, "The ID of the project to update"),
        optional(name: String, "The name of the project"),
        optional(color: String, "Hex color code of the project, starting with #"),
        optional(sort_order as "sortOrder": i64, "The sort order of the project"),
        optional(view_mode as "viewMode": String, "The view mode of the project: list, kanban or timeline"),
        optional(kind: String, "The kind of the project: TASK or NOTE"),
    }
}

impl ToolProvider for UpdateProject {
    const NAME: &'static str = "update_project";
    const DESCRIPTION: &'static str = "Update a project (collection of tasks).";
    const GROUP: ToolGroup = ToolGroup::Projects;
    type Params = UpdateProjectParams;

    async fn execute_with_params(
        &self,
        ctx: &Context,
        params: UpdateProjectParams,
    ) -> Result<String> {
        let fields = project_fields(
            params.name,
            params.color,
            params.sort_order,
            params.view_mode,
            params.kind,
        )?;
        let project = ctx
            .client
            .update_project(&params.project_id, &fields)
            .await?;
        Ok(format_project(&project))
    }
}

#[derive(Default)]
pub struct DeleteProject;

impl ToolProvider for DeleteProject {
    const NAME: &'static str = "delete_project";
    const DESCRIPTION: &'static str = "Delete a project (collection of tasks).";
    const GROUP: ToolGroup = ToolGroup::Projects;
    type Params = ProjectIdParams;

    async fn execute_with_params(&self, ctx: &Context, params: ProjectIdParams) -> Result<String> {
        ctx.client.delete_project(&params.project_id).await?;
        Ok(format!("Project {} deleted successfully", params.project_id))
    }
}

#[derive(Default)]
pub struct GetInboxProject;

impl ToolProvider for GetInboxProject {
    const NAME: &'static str = "get_inbox_project";
    const DESCRIPTION: &'static str = "Get the ID of the inbox project, which holds the tasks \
        not allocated to any project. Use it as project_id to work with inbox tasks.";
    const GROUP: ToolGroup = ToolGroup::Projects;
    type Params = NoParams;

    async fn execute_with_params(&self, ctx: &Context, _params: NoParams) -> Result<String> {
        match ctx.inbox.inbox_project_id(&ctx.client).await? {
            Some(id) => Ok(format!("Inbox project id: {id}")),
            None => bail!("The API did not report an inbox project id"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tools::tests::test_context;

    #[tokio::test]
    async fn test_get_projects_hides_closed_projects() {
        let (ctx, _api, _dir) = test_context().await;

        let text = GetProjects.execute(&ctx, &json!({})).await.unwrap();
        assert!(text.starts_with("1. id: inbox1"));
        assert!(text.contains("\n\n2. id: p1\nname: Work"));
        assert!(!text.contains("Archive"));
    }

    #[tokio::test]
    async fn test_get_projects_can_include_closed_projects() {
        let (mut ctx, _api, _dir) = test_context().await;
        ctx.config.tools.projects = Some(crate::config::ProjectToolsConfig {
            include_closed: true,
        });

        let text = GetProjects.execute(&ctx, &json!({})).await.unwrap();
        assert!(text.contains("3. id: p2\nname: Archive"));
    }

    #[tokio::test]
    async fn test_project_details_lists_numbered_tasks() {
        let (ctx, _api, _dir) = test_context().await;

        let text = GetProjectDetails
            .execute(&ctx, &json!({"project_id": "p1"}))
            .await
            .unwrap();
        let sections: Vec<&str> = text.split("\n\n").collect();
        assert_eq!(sections[0], "Project Details:");
        assert_eq!(sections[1], "id: p1\nname: Work");
        assert_eq!(sections[2], "Tasks:");
        assert!(sections[3].starts_with("1. id: t1"));
        assert!(sections[4].starts_with("2. id: t2"));
        assert!(!text.contains("Current time"));
    }

    #[test]
    fn test_project_fields_validate_enums() {
        let fields = project_fields(
            Some("Work".to_owned()),
            None,
            Some(3),
            Some("kanban".to_owned()),
            Some("NOTE".to_owned()),
        )
        .unwrap();
        assert_eq!(fields.view_mode, Some(ViewMode::Kanban));
        assert_eq!(fields.kind, Some(ProjectKind::Note));
        assert_eq!(fields.sort_order.as_deref(), Some("3"));

        assert!(project_fields(None, None, None, Some("grid".to_owned()), None).is_err());
        assert!(project_fields(None, None, None, None, Some("task".to_owned())).is_err());
    }

    #[tokio::test]
    async fn test_missing_project_id_is_rejected() {
        let (ctx, _api, _dir) = test_context().await;
        let err = DeleteProject.execute(&ctx, &json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing required parameter: project_id");
    }

    #[tokio::test]
    async fn test_inbox_project_is_discovered() {
        let (ctx, _api, _dir) = test_context().await;
        let text = GetInboxProject.execute(&ctx, &json!({})).await.unwrap();
        assert_eq!(text, "Inbox project id: inbox1");
    }
}
