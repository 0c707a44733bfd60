//! Backend challenge discovery.
//!
//! # Responsibilities
//! - Send a header-only preflight to the backend root
//! - Extract typed headers from the sampled response
//! - Parse `WWW-Authenticate` into scheme and realm
//!
//! # Design Decisions
//! - Only the first challenge element is read; a backend offering Basic and
//!   Digest together is seen as whichever it lists first
//! - The probe result is never cached; each factory build probes again

use axum::http::{header, HeaderMap, HeaderName, StatusCode};

use crate::auth::error::{AuthError, AuthResult};
use crate::config::BackendConfig;
use crate::observability::metrics;

/// Scheme and realm announced by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthProbeResult {
    /// Scheme token as sent, e.g. "Digest" or "Basic".
    pub scheme: String,
    /// Value of the first challenge parameter, quotes removed.
    pub realm: String,
    /// The header value exactly as received.
    pub raw: String,
}

impl AuthProbeResult {
    /// Parse a `WWW-Authenticate` value of the form
    /// `<scheme> <param>=<value>[, <param>=<value>...]`.
    pub fn parse(raw: &str) -> AuthResult<Self> {
        let trimmed = raw.trim();
        let (scheme, params) = trimmed
            .split_once(char::is_whitespace)
            .ok_or_else(|| AuthError::MalformedChallenge(format!("no parameters in '{}'", raw)))?;

        let realm = first_param_value(params.trim_start())
            .ok_or_else(|| AuthError::MalformedChallenge(format!("no realm in '{}'", raw)))?;

        Ok(Self {
            scheme: scheme.to_string(),
            realm,
            raw: raw.to_string(),
        })
    }

    pub fn is_digest(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("digest")
    }
}

/// Value of the first `name=value` pair, stopping at the first unquoted comma.
fn first_param_value(params: &str) -> Option<String> {
    let mut in_quotes = false;
    let mut end = params.len();
    for (i, c) in params.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                end = i;
                break;
            }
            _ => {}
        }
    }

    let (name, value) = params[..end].split_once('=')?;
    if name.trim().is_empty() {
        return None;
    }
    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    Some(value.to_string())
}

/// Headers the proxy knows how to interpret from a sampled response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    WwwAuthenticate,
}

impl HeaderKind {
    pub fn name(self) -> HeaderName {
        match self {
            HeaderKind::WwwAuthenticate => header::WWW_AUTHENTICATE,
        }
    }
}

/// A header parsed according to its [`HeaderKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampledHeader {
    WwwAuthenticate(AuthProbeResult),
}

/// Status and headers of one preflight response.
#[derive(Debug, Clone)]
pub struct HttpSample {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl HttpSample {
    /// Issue `HEAD /` against the backend and keep the response head.
    pub async fn take(client: &reqwest::Client, config: &BackendConfig) -> AuthResult<Self> {
        let url = config.target_url("/", None)?;
        let response = client
            .head(url.clone())
            .send()
            .await
            .map_err(|e| AuthError::unreachable(&url, e))?;

        Ok(Self {
            status: response.status(),
            headers: response.headers().clone(),
        })
    }

    /// Extract and parse the first header of the given kind.
    pub fn extract(&self, kind: HeaderKind) -> AuthResult<SampledHeader> {
        let value = self.headers.get(kind.name()).ok_or_else(|| {
            AuthError::MalformedChallenge(format!(
                "backend answered {} without a {} header",
                self.status,
                kind.name()
            ))
        })?;
        let value = value
            .to_str()
            .map_err(|_| AuthError::MalformedChallenge(format!("non-ASCII {} header", kind.name())))?;

        match kind {
            HeaderKind::WwwAuthenticate => {
                AuthProbeResult::parse(value).map(SampledHeader::WwwAuthenticate)
            }
        }
    }
}

/// Discovers the backend's authentication scheme and realm.
#[derive(Clone)]
pub struct SchemeProbe {
    client: reqwest::Client,
}

impl SchemeProbe {
    /// The client must not carry credentials; the probe wants the bare challenge.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn probe(&self, config: &BackendConfig) -> AuthResult<AuthProbeResult> {
        let sample = HttpSample::take(&self.client, config).await?;
        let SampledHeader::WwwAuthenticate(result) = sample.extract(HeaderKind::WwwAuthenticate)?;

        tracing::debug!(
            host = %config.host,
            port = config.port,
            scheme = %result.scheme,
            realm = %result.realm,
            "Backend challenge discovered"
        );
        metrics::record_probe(&result.scheme);

        if let Some(expected) = config.realm.as_deref() {
            if expected != result.realm {
                tracing::warn!(
                    expected = %expected,
                    announced = %result.realm,
                    "Backend realm differs from configured realm"
                );
            }
        }

        Ok(result)
    }
}
