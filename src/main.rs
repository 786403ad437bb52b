mod auth;
mod client;
mod config;
mod context;
mod filter;
mod format;
mod inbox;
mod mcp;
mod prompts;
mod tools;

use anyhow::Context as _;
use tracing_subscriber::EnvFilter;

use crate::auth::{AuthorizationFlow, TokenStore};
use crate::config::Config;
use crate::context::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the JSON-RPC stream.
    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .init();

    let config = Config::load_default()?;
    let store = TokenStore::new(config.oauth.token_file());
    tracing::debug!(
        "Using token file {} (valid token cached: {})",
        store.path().display(),
        store.is_valid()
    );

    let flow = AuthorizationFlow::new(config.oauth.clone(), store, &config.api.user_agent)?;
    let token = flow
        .ensure_authorized()
        .await
        .context("Authorization failed")?;

    let ctx = Context::new(config, token)?;
    mcp::Server::new(ctx).run().await
}
