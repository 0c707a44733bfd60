//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use url::Url;

/// Root configuration for the authenticating proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// The backend origin every request is forwarded to.
    pub backend: BackendConfig,

    /// Forwarding rules (header allow-list, path prefix).
    pub proxy: ForwardingConfig,

    /// Caller session settings.
    pub session: SessionConfig,

    /// Timeouts handed to the backend HTTP client.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest request body forwarded to the backend, in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Backend origin description.
///
/// Immutable once loaded and shared read-only by the probe, the client
/// factory, the credential validator and the dispatcher.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendConfig {
    /// "http" or "https".
    pub scheme: String,

    /// Backend host name or address.
    pub host: String,

    /// Backend port.
    pub port: u16,

    /// Realm the backend is expected to announce. Only checked against the
    /// live challenge, never used in its place.
    pub realm: Option<String>,

    /// Pre-seed the digest cache so the first request skips the 401 round trip.
    pub digest_caching_enabled: bool,

    /// Path requested when validating caller credentials.
    pub probe_path: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            port: 8000,
            realm: None,
            digest_caching_enabled: true,
            probe_path: "/".to_string(),
        }
    }
}

impl BackendConfig {
    /// Origin URL with the root path.
    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&format!("{}://{}:{}/", self.scheme, self.host, self.port))
    }

    /// Compose a target URL for `path` and an already-decoded `query`.
    ///
    /// The query is encoded exactly once here; callers must not pre-encode it.
    pub fn target_url(&self, path: &str, query: Option<&str>) -> Result<Url, url::ParseError> {
        let mut url = self.base_url()?;
        url.set_path(path);
        url.set_query(query);
        Ok(url)
    }
}

/// Forwarding rules applied by the dispatcher.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Header names copied from caller to backend and from backend to caller.
    /// Everything else is dropped in both directions.
    pub header_allow_list: Vec<String>,

    /// Prefix stripped from incoming paths before forwarding.
    pub path_prefix: String,

    /// Percent-decode the incoming query before it is re-encoded for the backend.
    /// When false the raw query is forwarded as received.
    pub decode_query: bool,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            header_allow_list: vec!["Accept".to_string(), "Content-Type".to_string()],
            path_prefix: String::new(),
            decode_query: true,
        }
    }
}

/// Caller session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie carrying the opaque session id.
    pub cookie_name: String,

    /// Sessions idle for longer than this are expired.
    pub idle_timeout_secs: u64,

    /// How often the idle-session sweeper runs.
    pub sweep_interval_secs: u64,

    /// Bind the validated client to the session. When disabled every request
    /// uses the client carried by the session's authentication token.
    pub binding_enabled: bool,

    /// Path of the login endpoint.
    pub login_path: String,

    /// Path of the logout endpoint.
    pub logout_path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "AUTHPROXY_SESSION".to_string(),
            idle_timeout_secs: 30 * 60,
            sweep_interval_secs: 60,
            binding_enabled: true,
            login_path: "/login".to_string(),
            logout_path: "/logout".to_string(),
        }
    }
}

/// Timeout configuration for backend calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Total time for a backend request/response in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
