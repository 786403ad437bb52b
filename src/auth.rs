mod flow;
mod token;

use std::time::Duration;

pub use flow::AuthorizationFlow;
pub use token::{Token, TokenStore};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("OAuth configuration error: {0}")]
    Configuration(String),
    #[error("OAuth authorization failed: {0}")]
    Authorization(String),
    #[error("OAuth callback state mismatch, aborting as a possible CSRF attack")]
    Security,
    #[error("Timed out after {0:?} waiting for the OAuth callback")]
    Timeout(Duration),
    #[error("Failed to start the OAuth callback listener on {addr}")]
    Listener {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Token exchange request failed")]
    Exchange(#[source] reqwest::Error),
    #[error("Failed to persist the access token")]
    Persist(#[source] anyhow::Error),
}

/// Provider settings required to run the authorization-code exchange.
#[derive(Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub scope: String,
}

impl std::fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("scope", &self.scope)
            .finish()
    }
}
