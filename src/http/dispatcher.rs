//! Request forwarding to the backend.
//!
//! # Responsibilities
//! - Compose the target URI (path prefix stripped, query encoded once)
//! - Resolve the session's authenticated client
//! - Forward method, allow-listed headers and body unchanged
//! - Relay the backend response
//!
//! # Design Decisions
//! - Headers not on the allow-list are dropped in both directions
//! - One backend call per dispatch, no retries; failures surface as-is
//! - A failed dispatch never touches the session binding

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header::InvalidHeaderName, HeaderMap, HeaderName, Request},
    response::Response,
};

use crate::auth::{AuthError, AuthResult, AuthenticatedClient, BackendRequest};
use crate::config::{BackendConfig, ForwardingConfig};
use crate::http::query::forwardable_query;
use crate::http::request::request_id;
use crate::http::response::{relay, ProxyError};
use crate::session::{SessionBinding, SessionId, SessionStore};

/// Header names allowed through the proxy, matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct HeaderAllowList {
    names: Vec<HeaderName>,
}

impl HeaderAllowList {
    pub fn new<I, S>(names: I) -> Result<Self, InvalidHeaderName>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|name| HeaderName::from_bytes(name.as_ref().as_bytes()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { names })
    }

    /// Copy every value of every allowed header; drop the rest.
    pub fn filter(&self, headers: &HeaderMap) -> HeaderMap {
        let mut filtered = HeaderMap::new();
        for name in &self.names {
            for value in headers.get_all(name) {
                filtered.append(name.clone(), value.clone());
            }
        }
        filtered
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Forwards caller requests using the session's authenticated client.
#[derive(Clone)]
pub struct ProxyDispatcher {
    backend: Arc<BackendConfig>,
    allow_list: Arc<HeaderAllowList>,
    path_prefix: String,
    decode_query: bool,
    max_body_size: usize,
    binding_enabled: bool,
    sessions: SessionStore,
    binding: SessionBinding,
}

impl ProxyDispatcher {
    pub fn new(
        backend: Arc<BackendConfig>,
        forwarding: &ForwardingConfig,
        sessions: SessionStore,
        binding: SessionBinding,
    ) -> Result<Self, InvalidHeaderName> {
        Ok(Self {
            backend,
            allow_list: Arc::new(HeaderAllowList::new(&forwarding.header_allow_list)?),
            path_prefix: forwarding.path_prefix.trim_end_matches('/').to_string(),
            decode_query: forwarding.decode_query,
            max_body_size: usize::MAX,
            binding_enabled: true,
            sessions,
            binding,
        })
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// When disabled, each request uses the client carried by the session's
    /// token and nothing is bound.
    pub fn with_binding_enabled(mut self, enabled: bool) -> Self {
        self.binding_enabled = enabled;
        self
    }

    pub fn allow_list(&self) -> &HeaderAllowList {
        &self.allow_list
    }

    /// Authenticated client for the session, binding it on first use.
    pub async fn resolve_client(
        &self,
        session_id: Option<&SessionId>,
    ) -> AuthResult<Arc<AuthenticatedClient>> {
        let session_id = session_id.ok_or(AuthError::NoSecurityContext)?;
        let Some(context) = self.sessions.get(session_id) else {
            self.binding.discard(session_id);
            return Err(AuthError::NoSecurityContext);
        };
        let pending = context.into_pending_token();

        if !self.binding_enabled {
            let token = pending.ok_or(AuthError::NoSecurityContext)?;
            return token.client().cloned().ok_or(AuthError::SessionNotAuthenticated);
        }

        let had_pending = pending.is_some();
        let client = self.binding.resolve(session_id, pending).await?;
        if had_pending {
            self.sessions.clear_pending(session_id);
        }
        self.ensure_live(session_id)?;
        Ok(client)
    }

    /// Fails when the session ended while its client was being bound,
    /// dropping the binding it would otherwise leave behind.
    fn ensure_live(&self, session_id: &SessionId) -> AuthResult<()> {
        if self.sessions.contains(session_id) {
            return Ok(());
        }
        if self.binding.discard(session_id) {
            tracing::debug!(session = %session_id, "Session ended during bind");
        }
        Err(AuthError::NoSecurityContext)
    }

    /// Forward `request` to the same path on the backend.
    pub async fn dispatch(
        &self,
        request: Request<Body>,
        session_id: Option<&SessionId>,
    ) -> Result<Response, ProxyError> {
        let path = self.backend_path(request.uri().path()).to_string();
        self.dispatch_to(&path, request, session_id).await
    }

    /// Forward `request` to `path` on the backend instead of its own path.
    pub async fn dispatch_to(
        &self,
        path: &str,
        request: Request<Body>,
        session_id: Option<&SessionId>,
    ) -> Result<Response, ProxyError> {
        let client = self.resolve_client(session_id).await?;

        let (parts, body) = request.into_parts();
        let query = forwardable_query(parts.uri.query(), self.decode_query);
        let url = self
            .backend
            .target_url(path, query.as_deref())
            .map_err(AuthError::from)?;
        let body = axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(ProxyError::Body)?;

        tracing::debug!(
            request_id = %request_id(&parts.headers),
            client = %client.id(),
            method = %parts.method,
            url = %url,
            "Proxying to backend"
        );

        let backend_request = BackendRequest {
            method: parts.method,
            url,
            headers: self.allow_list.filter(&parts.headers),
            body,
        };
        let response = client.send(backend_request).await?;
        Ok(relay(response, &self.allow_list))
    }

    fn backend_path<'a>(&self, path: &'a str) -> &'a str {
        if self.path_prefix.is_empty() {
            return path;
        }
        match path.strip_prefix(self.path_prefix.as_str()) {
            Some("") => "/",
            Some(rest) if rest.starts_with('/') => rest,
            _ => path,
        }
    }
}
