use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use tokio::{
    net::TcpListener,
    sync::{oneshot, Mutex},
    task::JoinHandle,
};
use url::Url;

use super::{AuthError, OAuthSettings, Token, TokenStore};
use crate::config::OAuthConfig;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

type Outcome = Result<Token, AuthError>;

/// Obtains an access token, running the browser-based authorization-code
/// exchange when no valid token is stored.
pub struct AuthorizationFlow {
    config: OAuthConfig,
    store: TokenStore,
    http: reqwest::Client,
}

impl AuthorizationFlow {
    pub fn new(config: OAuthConfig, store: TokenStore, user_agent: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            store,
            http,
        })
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub async fn ensure_authorized(&self) -> Result<Token, AuthError> {
        if let Some(token) = self.store.load().filter(Token::is_valid) {
            tracing::info!("Token is valid, skipping authorization");
            return Ok(token);
        }

        let pending = self.start().await?;
        let auth_url = pending.auth_url();
        if self.config.headless {
            tracing::info!("Please visit {auth_url} to authorize");
        } else if let Err(e) = webbrowser::open(&auth_url) {
            tracing::error!("Failed to open browser: {e}");
            tracing::info!("Please visit {auth_url} to authorize");
        }

        tracing::debug!("Waiting for the OAuth callback on {}", pending.base_url());
        pending.wait(self.callback_timeout()).await
    }

    fn callback_timeout(&self) -> Option<Duration> {
        match self.config.callback_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Validates the settings and starts the callback listener for one
    /// authorization attempt.
    pub async fn start(&self) -> Result<PendingAuthorization, AuthError> {
        let settings = self.config.settings()?;
        let auth_url = Url::parse(&settings.auth_url).map_err(|e| {
            AuthError::Configuration(format!("AUTH_URL is not a valid URL: {e}"))
        })?;

        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| AuthError::Listener {
                addr: addr.clone(),
                source,
            })?;
        // Port 0 lets the OS pick; the redirect URI must carry the real one.
        let port = listener
            .local_addr()
            .map_err(|source| AuthError::Listener {
                addr: addr.clone(),
                source,
            })?
            .port();
        let base_url = format!("http://{}:{}", self.config.host, port);

        let (completion_tx, completion_rx) = oneshot::channel();
        let context = Arc::new(CallbackContext {
            nonce: generate_nonce(),
            redirect_uri: format!("{base_url}/callback"),
            auth_url,
            settings,
            http: self.http.clone(),
            store: self.store.clone(),
            completion: Mutex::new(Some(completion_tx)),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, router(context))
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        tracing::info!("OAuth callback listener started on {base_url}");

        Ok(PendingAuthorization {
            base_url,
            completion: completion_rx,
            listener: ListenerGuard {
                shutdown: Some(shutdown_tx),
                server: Some(server),
            },
        })
    }
}

/// An authorization attempt whose callback listener is running.
pub struct PendingAuthorization {
    base_url: String,
    completion: oneshot::Receiver<Outcome>,
    listener: ListenerGuard,
}

impl PendingAuthorization {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth_url(&self) -> String {
        format!("{}/auth", self.base_url)
    }

    /// Waits for the callback handler to finish, then stops the listener
    /// whatever the outcome.
    pub async fn wait(mut self, timeout: Option<Duration>) -> Outcome {
        let received = match timeout {
            Some(limit) => tokio::time::timeout(limit, &mut self.completion)
                .await
                .map_err(|_| AuthError::Timeout(limit)),
            None => Ok((&mut self.completion).await),
        };

        self.listener.shutdown().await;

        match received? {
            Ok(outcome) => outcome,
            Err(_) => Err(AuthError::Authorization(
                "callback listener stopped before authorization completed".to_owned(),
            )),
        }
    }
}

struct ListenerGuard {
    shutdown: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<std::io::Result<()>>>,
}

impl ListenerGuard {
    async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(mut server) = self.server.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
                Ok(Ok(Ok(()))) => tracing::debug!("OAuth callback listener stopped"),
                Ok(Ok(Err(e))) => tracing::warn!("OAuth callback listener failed: {e}"),
                Ok(Err(e)) => tracing::warn!("OAuth callback listener task failed: {e}"),
                Err(_) => {
                    tracing::warn!("OAuth callback listener did not stop in time, aborting");
                    server.abort();
                }
            }
        }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}

/// Everything the callback routes need for one attempt.
struct CallbackContext {
    nonce: String,
    redirect_uri: String,
    auth_url: Url,
    settings: OAuthSettings,
    http: reqwest::Client,
    store: TokenStore,
    completion: Mutex<Option<oneshot::Sender<Outcome>>>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<f64>,
    error: Option<String>,
    error_description: Option<String>,
}

fn router(context: Arc<CallbackContext>) -> Router {
    Router::new()
        .route("/", get(authorize))
        .route("/auth", get(authorize))
        .route("/callback", get(callback))
        .fallback(not_found)
        .with_state(context)
}

async fn authorize(State(ctx): State<Arc<CallbackContext>>) -> Response {
    let location = ctx.authorization_url();
    tracing::info!("Redirecting to {location}");
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

async fn callback(
    State(ctx): State<Arc<CallbackContext>>,
    Query(params): Query<CallbackQuery>,
) -> Response {
    // The sender doubles as the single-use marker for the nonce.
    let Some(completion) = ctx.completion.lock().await.take() else {
        return (
            StatusCode::BAD_REQUEST,
            "Authorization for this attempt has already completed",
        )
            .into_response();
    };

    let outcome = ctx.complete(params).await;
    let response = match &outcome {
        Ok(_) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "OAuth Success",
        )
            .into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let _ = completion.send(outcome);
    response
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

impl CallbackContext {
    fn authorization_url(&self) -> Url {
        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("scope", &self.settings.scope)
            .append_pair("state", &self.nonce)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code");
        url
    }

    async fn complete(&self, params: CallbackQuery) -> Outcome {
        if params.state.as_deref() != Some(self.nonce.as_str()) {
            tracing::warn!("Wrong state received on OAuth callback, possible CSRF attack");
            return Err(AuthError::Security);
        }

        if let Some(error) = params.error {
            let detail = params
                .error_description
                .map(|d| format!(" ({d})"))
                .unwrap_or_default();
            return Err(AuthError::Authorization(format!(
                "provider denied the request: {error}{detail}"
            )));
        }

        let code = params
            .code
            .filter(|code| !code.is_empty())
            .ok_or_else(|| {
                AuthError::Authorization("callback carried no authorization code".to_owned())
            })?;

        let token = self.exchange_code(&code).await?;
        self.store.save(&token).map_err(AuthError::Persist)?;
        tracing::info!(
            "Authorization succeeded, token saved to {} (valid until {})",
            self.store.path().display(),
            token.expires_at
        );

        Ok(token)
    }

    async fn exchange_code(&self, code: &str) -> Outcome {
        let response = self
            .http
            .post(&self.settings.token_url)
            .basic_auth(&self.settings.client_id, Some(&self.settings.client_secret))
            .form(&[
                ("code", code),
                ("grant_type", "authorization_code"),
                ("scope", self.settings.scope.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(AuthError::Exchange)?;

        let status = response.status();
        let body = response.text().await.map_err(AuthError::Exchange)?;
        let parsed: TokenResponse = serde_json::from_str(&body).unwrap_or_default();

        match parsed.access_token.filter(|t| !t.is_empty()) {
            Some(value) if status == reqwest::StatusCode::OK => {
                let expires_in = parsed.expires_in.ok_or_else(|| {
                    AuthError::Authorization("token response carried no expires_in".to_owned())
                })?;
                Token::from_lifetime(value, expires_in as i64, Utc::now()).ok_or_else(|| {
                    AuthError::Authorization(format!("token lifetime {expires_in} is out of range"))
                })
            }
            _ => {
                let detail = match (parsed.error, parsed.error_description) {
                    (Some(error), Some(description)) => format!(": {error} ({description})"),
                    (Some(error), None) => format!(": {error}"),
                    _ => String::new(),
                };
                Err(AuthError::Authorization(format!(
                    "token endpoint answered {status}{detail}; check the client id and secret, \
                     and that the redirect URI registered with the provider is exactly {}",
                    self.redirect_uri
                )))
            }
        }
    }
}

fn generate_nonce() -> String {
    rand::random::<[u8; 16]>()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use axum::{http::HeaderMap, routing::post, Form, Json};
    use serde_json::{json, Value};

    use super::*;

    struct FakeProvider {
        calls: AtomicUsize,
        status: StatusCode,
        body: Value,
    }

    async fn token_endpoint(
        State(provider): State<Arc<FakeProvider>>,
        headers: HeaderMap,
        Form(form): Form<HashMap<String, String>>,
    ) -> Response {
        provider.calls.fetch_add(1, Ordering::SeqCst);

        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if authorization != Some("Basic Y2xpZW50LWlkOmNsaWVudC1zZWNyZXQ=")
            || form.get("grant_type").map(String::as_str) != Some("authorization_code")
            || form.get("code").map(String::as_str) != Some("the-code")
            || form.get("scope").map(String::as_str) != Some("tasks:read tasks:write")
            || !form
                .get("redirect_uri")
                .is_some_and(|uri| uri.ends_with("/callback"))
        {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid_request"})))
                .into_response();
        }

        (provider.status, Json(provider.body.clone())).into_response()
    }

    async fn spawn_provider(status: StatusCode, body: Value) -> (String, Arc<FakeProvider>) {
        let provider = Arc::new(FakeProvider {
            calls: AtomicUsize::new(0),
            status,
            body,
        });
        let app = Router::new()
            .route("/oauth/token", post(token_endpoint))
            .with_state(provider.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/oauth/token"), provider)
    }

    fn oauth_config(token_url: &str, token_file: std::path::PathBuf) -> OAuthConfig {
        OAuthConfig {
            client_id: Some("client-id".to_owned()),
            client_secret: Some("client-secret".to_owned()),
            auth_url: Some("https://provider.example/oauth/authorize".to_owned()),
            token_url: Some(token_url.to_owned()),
            host: "127.0.0.1".to_owned(),
            port: 0,
            headless: true,
            token_file: Some(token_file),
            ..OAuthConfig::default()
        }
    }

    fn browser() -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    /// Follows `/auth` and returns the query of the provider redirect.
    async fn redirect_params(pending: &PendingAuthorization) -> HashMap<String, String> {
        let response = browser().get(pending.auth_url()).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_owned();
        assert!(location.starts_with("https://provider.example/oauth/authorize?"));
        Url::parse(&location)
            .unwrap()
            .query_pairs()
            .into_owned()
            .collect()
    }

    fn flow_for(config: OAuthConfig) -> AuthorizationFlow {
        let store = TokenStore::new(config.token_file());
        AuthorizationFlow::new(config, store, "test-agent").unwrap()
    }

    #[tokio::test]
    async fn test_successful_authorization_persists_token() {
        let dir = tempfile::tempdir().unwrap();
        let (token_url, provider) = spawn_provider(
            StatusCode::OK,
            json!({"access_token": "tok-123", "expires_in": 3600, "token_type": "bearer"}),
        )
        .await;
        let flow = flow_for(oauth_config(&token_url, dir.path().join("token.json")));

        let pending = flow.start().await.unwrap();
        let base_url = pending.base_url().to_owned();
        let params = redirect_params(&pending).await;
        assert_eq!(params["client_id"], "client-id");
        assert_eq!(params["scope"], "tasks:read tasks:write");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["redirect_uri"], format!("{base_url}/callback"));
        assert_eq!(params["state"].len(), 32);

        let root = browser().get(format!("{base_url}/")).send().await.unwrap();
        assert_eq!(root.status(), StatusCode::FOUND);
        drop(root);

        let response = browser()
            .get(format!("{base_url}/callback"))
            .query(&[("code", "the-code"), ("state", params["state"].as_str())])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "OAuth Success");

        let token = pending.wait(Some(Duration::from_secs(10))).await.unwrap();
        assert_eq!(token.value, "tok-123");
        assert!(token.is_valid());
        assert_eq!(flow.store().load(), Some(token));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        // The listener is gone once the attempt is over.
        assert!(browser().get(format!("{base_url}/auth")).send().await.is_err());
    }

    #[tokio::test]
    async fn test_state_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (token_url, provider) = spawn_provider(
            StatusCode::OK,
            json!({"access_token": "tok-123", "expires_in": 3600}),
        )
        .await;
        let flow = flow_for(oauth_config(&token_url, dir.path().join("token.json")));

        let pending = flow.start().await.unwrap();
        let response = browser()
            .get(format!("{}/callback", pending.base_url()))
            .query(&[("code", "the-code"), ("state", "forged")])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let err = pending.wait(Some(Duration::from_secs(10))).await.unwrap_err();
        assert!(matches!(err, AuthError::Security));
        assert!(flow.store().load().is_none());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejected_exchange_fails_the_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let (token_url, _provider) = spawn_provider(
            StatusCode::BAD_REQUEST,
            json!({"error": "invalid_grant", "error_description": "code expired"}),
        )
        .await;
        let flow = flow_for(oauth_config(&token_url, dir.path().join("token.json")));

        let pending = flow.start().await.unwrap();
        let params = redirect_params(&pending).await;
        let response = browser()
            .get(format!("{}/callback", pending.base_url()))
            .query(&[("code", "the-code"), ("state", params["state"].as_str())])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let err = pending.wait(Some(Duration::from_secs(10))).await.unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, AuthError::Authorization(_)));
        assert!(message.contains("invalid_grant"));
        assert!(!message.contains("client-secret"));
        assert!(flow.store().load().is_none());
    }

    #[tokio::test]
    async fn test_missing_access_token_fails_the_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let (token_url, _provider) =
            spawn_provider(StatusCode::OK, json!({"access_token": "", "expires_in": 3600})).await;
        let flow = flow_for(oauth_config(&token_url, dir.path().join("token.json")));

        let pending = flow.start().await.unwrap();
        let params = redirect_params(&pending).await;
        let response = browser()
            .get(format!("{}/callback", pending.base_url()))
            .query(&[("code", "the-code"), ("state", params["state"].as_str())])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let err = pending.wait(Some(Duration::from_secs(10))).await.unwrap_err();
        assert!(matches!(err, AuthError::Authorization(_)));
    }

    #[tokio::test]
    async fn test_provider_denial_and_unknown_paths() {
        let dir = tempfile::tempdir().unwrap();
        let (token_url, provider) = spawn_provider(StatusCode::OK, json!({})).await;
        let flow = flow_for(oauth_config(&token_url, dir.path().join("token.json")));

        let pending = flow.start().await.unwrap();
        let missing = browser()
            .get(format!("{}/favicon.ico", pending.base_url()))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let params = redirect_params(&pending).await;
        let response = browser()
            .get(format!("{}/callback", pending.base_url()))
            .query(&[("error", "access_denied"), ("state", params["state"].as_str())])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // The nonce is consumed by the first callback.
        let replay = browser()
            .get(format!("{}/callback", pending.base_url()))
            .query(&[("code", "the-code"), ("state", params["state"].as_str())])
            .send()
            .await
            .unwrap();
        assert_eq!(replay.status(), StatusCode::BAD_REQUEST);

        let err = pending.wait(Some(Duration::from_secs(10))).await.unwrap_err();
        assert!(err.to_string().contains("access_denied"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wait_times_out_and_stops_listener() {
        let dir = tempfile::tempdir().unwrap();
        let flow = flow_for(oauth_config(
            "http://127.0.0.1:9/oauth/token",
            dir.path().join("token.json"),
        ));

        let pending = flow.start().await.unwrap();
        let base_url = pending.base_url().to_owned();
        let err = pending
            .wait(Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Timeout(_)));
        assert!(browser().get(format!("{base_url}/auth")).send().await.is_err());
    }

    #[tokio::test]
    async fn test_missing_settings_fail_before_listening() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = oauth_config("http://127.0.0.1:9/oauth/token", dir.path().join("t.json"));
        config.client_secret = None;

        let err = flow_for(config).ensure_authorized().await.unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_cached_token_skips_the_flow() {
        let dir = tempfile::tempdir().unwrap();
        let config = OAuthConfig {
            token_file: Some(dir.path().join("token.json")),
            ..OAuthConfig::default()
        };
        let flow = flow_for(config);
        let cached = Token::from_lifetime("cached", 3600, Utc::now()).unwrap();
        flow.store().save(&cached).unwrap();

        // No provider settings at all: a valid token must not need them.
        let token = flow.ensure_authorized().await.unwrap();
        assert_eq!(token.value, "cached");
    }
}
