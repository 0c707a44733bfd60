//! Caller credentials and the token produced by a successful validation.

use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::auth::client::AuthenticatedClient;

/// A principal/secret pair supplied by the caller.
///
/// The secret never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    principal: String,
    secret: String,
}

impl Credentials {
    pub fn new(principal: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            secret: secret.into(),
        }
    }

    /// Decode an `Authorization: Basic ...` header value.
    pub fn from_basic_header(value: &str) -> Option<Self> {
        let (scheme, encoded) = value.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (principal, secret) = decoded.split_once(':')?;
        if principal.is_empty() {
            return None;
        }
        Some(Self::new(principal, secret))
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub(crate) fn secret(&self) -> &str {
        &self.secret
    }

    /// `Authorization` value for the Basic scheme.
    pub(crate) fn basic_authorization(&self) -> String {
        let pair = format!("{}:{}", self.principal, self.secret);
        format!("Basic {}", STANDARD.encode(pair))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("principal", &self.principal)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Outcome of a successful credential validation.
///
/// Carries the client built during validation until it is moved into exactly
/// one session binding.
#[derive(Clone)]
pub struct AuthenticationToken {
    principal: String,
    authorities: Vec<String>,
    client: Option<Arc<AuthenticatedClient>>,
}

impl AuthenticationToken {
    pub fn new(
        principal: impl Into<String>,
        authorities: Vec<String>,
        client: Arc<AuthenticatedClient>,
    ) -> Self {
        Self {
            principal: principal.into(),
            authorities,
            client: Some(client),
        }
    }

    /// A token that never went through validation and so holds no client.
    pub fn without_client(principal: impl Into<String>, authorities: Vec<String>) -> Self {
        Self {
            principal: principal.into(),
            authorities,
            client: None,
        }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn authorities(&self) -> &[String] {
        &self.authorities
    }

    pub fn client(&self) -> Option<&Arc<AuthenticatedClient>> {
        self.client.as_ref()
    }

    /// Move the client out, leaving the token without one.
    pub fn take_client(&mut self) -> Option<Arc<AuthenticatedClient>> {
        self.client.take()
    }
}

impl fmt::Debug for AuthenticationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationToken")
            .field("principal", &self.principal)
            .field("authorities", &self.authorities)
            .field("client", &self.client.as_ref().map(|c| c.id()))
            .finish()
    }
}
