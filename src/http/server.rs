//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with login, logout and proxy handlers
//! - Wire up middleware (tracing, body limit, request ID)
//! - Start the session reaper next to the server
//! - Serve until the shutdown broadcast fires

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::auth::{AuthenticatingClientFactory, CredentialValidator};
use crate::config::{BackendConfig, ProxyConfig, SessionConfig};
use crate::http::dispatcher::ProxyDispatcher;
use crate::http::request::{
    basic_credentials, expired_session_cookie, request_id, session_cookie, session_id,
};
use crate::observability::metrics;
use crate::session::{SessionBinding, SessionId, SessionReaper, SessionStore};

/// Errors raised while assembling the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to build backend transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid header allow-list: {0}")]
    AllowList(#[from] axum::http::header::InvalidHeaderName),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<BackendConfig>,
    pub validator: CredentialValidator,
    pub dispatcher: ProxyDispatcher,
    pub sessions: SessionStore,
    pub binding: SessionBinding,
    pub session_config: Arc<SessionConfig>,
}

/// Body returned by a successful login.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub principal: String,
    pub authorities: Vec<String>,
}

/// HTTP server for the authenticating proxy.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let factory = AuthenticatingClientFactory::new(&config.timeouts)?;
        Self::with_factory(config, factory)
    }

    /// Create a server whose backend clients come from `factory`.
    pub fn with_factory(
        config: ProxyConfig,
        factory: AuthenticatingClientFactory,
    ) -> Result<Self, ServerError> {
        let backend = Arc::new(config.backend.clone());
        let sessions = SessionStore::new(Duration::from_secs(config.session.idle_timeout_secs));
        let binding = SessionBinding::new();

        let dispatcher = ProxyDispatcher::new(
            backend.clone(),
            &config.proxy,
            sessions.clone(),
            binding.clone(),
        )?
        .with_max_body_size(config.listener.max_body_size)
        .with_binding_enabled(config.session.binding_enabled);

        let state = AppState {
            backend,
            validator: CredentialValidator::new(factory),
            dispatcher,
            sessions,
            binding,
            session_config: Arc::new(config.session.clone()),
        };

        let router = Self::build_router(&config, state.clone());
        Ok(Self {
            router,
            state,
            config,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route(&config.session.login_path, post(login_handler))
            .route(&config.session.logout_path, post(logout_handler))
            .fallback(proxy_handler)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_size))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Run the server on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backend_host = %self.config.backend.host,
            backend_port = self.config.backend.port,
            binding_enabled = self.config.session.binding_enabled,
            "HTTP server starting"
        );

        let reaper = SessionReaper::new(
            self.state.sessions.clone(),
            self.state.binding.clone(),
            Duration::from_secs(self.config.session.sweep_interval_secs),
        );
        tokio::spawn(reaper.run(shutdown.resubscribe()));

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Validate Basic credentials against the backend and open a session.
async fn login_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let request_id = request_id(&headers).to_string();
    let Some(credentials) = basic_credentials(&headers) else {
        tracing::debug!(request_id = %request_id, "Login without Basic credentials");
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic")],
            "Missing credentials",
        )
            .into_response();
    };

    let token = match state
        .validator
        .validate(&state.backend, credentials, &state.backend.probe_path)
        .await
    {
        Ok(token) => token,
        Err(e) => {
            tracing::info!(request_id = %request_id, error = %e, "Login failed");
            return e.into_response();
        }
    };

    let cookie_name = &state.session_config.cookie_name;
    if let Some(previous) = session_id(&headers, cookie_name) {
        end_session(&state, &previous);
    }

    let body = LoginResponse {
        principal: token.principal().to_string(),
        authorities: token.authorities().to_vec(),
    };
    let session = state.sessions.create(token);
    tracing::info!(request_id = %request_id, principal = %body.principal, session = %session, "Session opened");

    let mut response = (StatusCode::OK, Json(body)).into_response();
    if let Some(cookie) = session_cookie(cookie_name, &session) {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

/// End the caller's session and expire its cookie.
async fn logout_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let cookie_name = &state.session_config.cookie_name;
    if let Some(session) = session_id(&headers, cookie_name) {
        end_session(&state, &session);
    }

    let mut response = StatusCode::NO_CONTENT.into_response();
    if let Some(cookie) = expired_session_cookie(cookie_name) {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

fn end_session(state: &AppState, session: &SessionId) {
    let existed = state.sessions.invalidate(session);
    let was_bound = state.binding.discard(session);
    if existed {
        tracing::info!(session = %session, was_bound, "Session closed");
    }
}

/// Forward everything else to the backend as the session's principal.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let request_id = request_id(request.headers()).to_string();
    let session = session_id(request.headers(), &state.session_config.cookie_name);

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        "Proxying request"
    );

    let response = match state.dispatcher.dispatch(request, session.as_ref()).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(request_id = %request_id, path = %path, error = %e, "Proxy request failed");
            e.into_response()
        }
    };

    metrics::record_request(&method, response.status().as_u16(), start_time);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    fn router() -> Router {
        let server = HttpServer::new(ProxyConfig::default()).unwrap();
        server.router
    }

    #[tokio::test]
    async fn test_proxy_without_session_is_not_logged_in() {
        let response = router()
            .oneshot(Request::get("/files").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_logout_expires_cookie() {
        let response = router()
            .oneshot(
                Request::post("/logout")
                    .header(header::COOKIE, "AUTHPROXY_SESSION=gone")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers().get(header::SET_COOKIE).unwrap(),
            "AUTHPROXY_SESSION=; Path=/; HttpOnly; Max-Age=0"
        );
    }

    #[tokio::test]
    async fn test_login_requires_basic_credentials() {
        let response = router()
            .oneshot(Request::post("/login").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get(header::WWW_AUTHENTICATE).unwrap(), "Basic");
    }
}
