macro_rules! register_providers {
    (
        tools: [ $($tool:path),* $(,)? ]
    ) => {
        pub fn list_tools(config: &crate::config::Config) -> Vec<crate::mcp::ToolDefinition> {
            let mut tools = Vec::new();
            $(
                if config.is_group_enabled(<$tool>::GROUP) {
                    tools.push(<$tool>::get_tool_definition());
                }
            )*
            tools
        }

        pub async fn execute_tool(
            ctx: &crate::context::Context,
            name: &str,
            arguments: &serde_json::Value,
        ) -> anyhow::Result<String> {
            $(
                if <$tool>::NAME == name && ctx.config.is_group_enabled(<$tool>::GROUP) {
                    return <$tool>::default().execute(ctx, arguments).await;
                }
            )*
            Err(anyhow::anyhow!("Tool not found: {}", name))
        }
    };
}

pub(crate) use register_providers;
