//! Configuration validation.
//!
//! Serde handles syntax; this module checks that the values make sense
//! together before the config is accepted. Every problem is reported, not
//! just the first.

use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("backend.scheme must be http or https, got '{0}'")]
    UnsupportedScheme(String),

    #[error("backend.host must not be empty")]
    EmptyHost,

    #[error("backend.port must be non-zero")]
    ZeroPort,

    #[error("{field} must start with '/', got '{value}'")]
    RelativePath { field: &'static str, value: String },

    #[error("proxy.header_allow_list contains invalid header name '{0}'")]
    InvalidHeaderName(String),

    #[error("listener.bind_address '{0}' is not a socket address")]
    InvalidBindAddress(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("session.cookie_name must not be empty")]
    EmptyCookieName,

    #[error("session.login_path and session.logout_path must differ")]
    SameSessionPaths,
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let backend = &config.backend;
    if !matches!(backend.scheme.as_str(), "http" | "https") {
        errors.push(ValidationError::UnsupportedScheme(backend.scheme.clone()));
    }
    if backend.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost);
    }
    if backend.port == 0 {
        errors.push(ValidationError::ZeroPort);
    }
    check_absolute("backend.probe_path", &backend.probe_path, &mut errors);

    if !config.proxy.path_prefix.is_empty() {
        check_absolute("proxy.path_prefix", &config.proxy.path_prefix, &mut errors);
    }
    for name in &config.proxy.header_allow_list {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidHeaderName(name.clone()));
        }
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(config.listener.bind_address.clone()));
    }
    if config.listener.max_body_size == 0 {
        errors.push(ValidationError::Zero("listener.max_body_size"));
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.connect_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }

    let session = &config.session;
    if session.cookie_name.trim().is_empty() {
        errors.push(ValidationError::EmptyCookieName);
    }
    if session.idle_timeout_secs == 0 {
        errors.push(ValidationError::Zero("session.idle_timeout_secs"));
    }
    if session.sweep_interval_secs == 0 {
        errors.push(ValidationError::Zero("session.sweep_interval_secs"));
    }
    check_absolute("session.login_path", &session.login_path, &mut errors);
    check_absolute("session.logout_path", &session.logout_path, &mut errors);
    if session.login_path == session.logout_path {
        errors.push(ValidationError::SameSessionPaths);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_absolute(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if !value.starts_with('/') {
        errors.push(ValidationError::RelativePath {
            field,
            value: value.to_string(),
        });
    }
}
