mod macros;
pub mod params;
mod server;
mod types;

pub use server::Server;
pub use types::{
    PromptArgument, PromptDefinition, Request, Response, ResponseError, ToolDefinition, ToolGroup,
    ToolParams, ToolProvider,
};
