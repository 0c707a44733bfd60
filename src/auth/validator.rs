//! Credential validation against the backend.

use std::sync::Arc;

use axum::http::StatusCode;

use crate::auth::client::BackendRequest;
use crate::auth::credentials::{AuthenticationToken, Credentials};
use crate::auth::error::{AuthError, AuthResult};
use crate::auth::factory::AuthenticatingClientFactory;
use crate::config::BackendConfig;
use crate::observability::metrics;

/// Proves a caller's identity with one real request to the backend.
#[derive(Clone)]
pub struct CredentialValidator {
    factory: AuthenticatingClientFactory,
    authorities: Vec<String>,
}

impl CredentialValidator {
    pub fn new(factory: AuthenticatingClientFactory) -> Self {
        Self {
            factory,
            authorities: Vec::new(),
        }
    }

    /// Authorities granted to every validated principal.
    pub fn with_authorities(mut self, authorities: Vec<String>) -> Self {
        self.authorities = authorities;
        self
    }

    pub fn factory(&self) -> &AuthenticatingClientFactory {
        &self.factory
    }

    /// Build a client for `credentials` and request `probe_path` with it.
    ///
    /// The client built here is the one handed back in the token; a second
    /// client is never built for the same credentials.
    pub async fn validate(
        &self,
        config: &BackendConfig,
        credentials: Credentials,
        probe_path: &str,
    ) -> AuthResult<AuthenticationToken> {
        let principal = credentials.principal().to_string();
        let client = self.factory.build(config, credentials).await?;

        let url = config.target_url(probe_path, None)?;
        let response = client.send(BackendRequest::get(url)).await?;
        let status = response.status();

        if let Err(e) = classify(status) {
            tracing::info!(principal = %principal, status = %status, "Credential validation rejected");
            metrics::record_validation(outcome_label(&e));
            return Err(e);
        }

        tracing::info!(principal = %principal, client = %client.id(), status = %status, "Credentials validated");
        metrics::record_validation("authenticated");
        Ok(AuthenticationToken::new(
            principal,
            self.authorities.clone(),
            Arc::new(client),
        ))
    }
}

/// Map the probe response status onto the validation outcome.
///
/// A 404 counts as authenticated: the caller only had to prove identity,
/// not that the probe path exists.
pub fn classify(status: StatusCode) -> AuthResult<()> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::NOT_FOUND => Ok(()),
        StatusCode::UNAUTHORIZED => Err(AuthError::InvalidCredentials),
        status => Err(AuthError::BackendError { status }),
    }
}

fn outcome_label(error: &AuthError) -> &'static str {
    match error {
        AuthError::InvalidCredentials => "invalid_credentials",
        _ => "backend_error",
    }
}
