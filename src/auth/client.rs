//! HTTP client bound to one credential pair.

use std::fmt;

use axum::http::{header, HeaderMap, Method, StatusCode};
use bytes::Bytes;
use url::{Position, Url};
use uuid::Uuid;

use crate::auth::credentials::Credentials;
use crate::auth::digest_cache::{Answered, AuthCache, AuthScope};
use crate::auth::error::{AuthError, AuthResult};

/// One request to the backend, fully buffered so a challenge can be answered
/// by sending it again.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl BackendRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

/// An HTTP client pre-bound to one credential pair and its own auth cache.
///
/// The underlying `reqwest::Client` (connection pool, TLS, timeouts) may be
/// shared; credentials and cache never are.
pub struct AuthenticatedClient {
    id: Uuid,
    http: reqwest::Client,
    credentials: Credentials,
    cache: AuthCache,
}

impl AuthenticatedClient {
    pub fn new(http: reqwest::Client, credentials: Credentials, cache: AuthCache) -> Self {
        Self {
            id: Uuid::new_v4(),
            http,
            credentials,
            cache,
        }
    }

    /// Identifier for logs; unique per constructed client.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn principal(&self) -> &str {
        self.credentials.principal()
    }

    pub fn auth_cache(&self) -> &AuthCache {
        &self.cache
    }

    /// Send a request, answering at most one authentication challenge.
    ///
    /// Cached scopes get credentials preemptively. On a 401 carrying a
    /// challenge other than the one this request answered, the challenge is
    /// recorded and the request is sent once more. Any other response is
    /// returned as-is.
    pub async fn send(&self, request: BackendRequest) -> AuthResult<reqwest::Response> {
        let scope = AuthScope::of(&request.url)
            .ok_or_else(|| AuthError::InvalidUri(format!("no host in {}", request.url)))?;

        let (response, answered) = self.execute(&request, &scope).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let challenge = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let Some(challenge) = challenge else {
            return Ok(response);
        };
        if !self.cache.accept_challenge(&scope, &challenge, answered.as_ref()) {
            return Ok(response);
        }

        tracing::debug!(
            client = %self.id,
            principal = %self.principal(),
            url = %request.url,
            "Answering backend authentication challenge"
        );
        let (response, _) = self.execute(&request, &scope).await?;
        Ok(response)
    }

    async fn execute(
        &self,
        request: &BackendRequest,
        scope: &AuthScope,
    ) -> AuthResult<(reqwest::Response, Option<Answered>)> {
        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .body(request.body.clone());

        let uri = &request.url[Position::BeforePath..];
        let body = (!request.body.is_empty()).then_some(request.body.as_ref());
        let authorization = self
            .cache
            .authorization(scope, &self.credentials, &request.method, uri, body);
        if let Some(authorization) = &authorization {
            builder = builder.header(header::AUTHORIZATION, authorization.value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AuthError::unreachable(&request.url, e))?;
        Ok((response, authorization.map(|a| a.answered)))
    }
}

impl fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("id", &self.id)
            .field("principal", &self.credentials.principal())
            .field("cached_scopes", &self.cache.len())
            .finish()
    }
}
