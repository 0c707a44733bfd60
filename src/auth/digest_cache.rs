//! Per-client authentication cache.
//!
//! Maps an auth scope (scheme, host, port) to what the client knows about the
//! challenge there, so requests after the first carry credentials up front.
//! Each authenticated client owns its own cache; caches are never shared
//! between credential pairs.

use std::fmt;
use std::sync::Arc;

use axum::http::Method;
use dashmap::DashMap;
use digest_auth::{AuthContext, HttpMethod, WwwAuthenticateHeader};
use url::Url;

use crate::auth::credentials::Credentials;

/// Origin a cache entry applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuthScope {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl AuthScope {
    pub fn new(scheme: &str, host: &str, port: u16) -> Self {
        Self {
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_ascii_lowercase(),
            port,
        }
    }

    /// Scope of a request URL, `None` for URLs without a host.
    pub fn of(url: &Url) -> Option<Self> {
        Some(Self::new(url.scheme(), url.host_str()?, url.port_or_known_default()?))
    }
}

/// Digest state for one scope.
pub struct DigestContext {
    realm: String,
    /// Parsed challenge used to answer; synthesized from the realm until the
    /// server issues a real nonce.
    challenge: Option<WwwAuthenticateHeader>,
    /// Raw header of the last server challenge answered.
    last_challenge: Option<String>,
}

impl DigestContext {
    /// A context knowing only the realm, with no server-issued nonce.
    pub fn primed(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            challenge: None,
            last_challenge: None,
        }
    }

    fn from_challenge(raw: &str, challenge: WwwAuthenticateHeader) -> Self {
        Self {
            realm: challenge.realm.clone(),
            challenge: Some(challenge),
            last_challenge: Some(raw.to_string()),
        }
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// True once a real server challenge has been answered.
    pub fn has_server_nonce(&self) -> bool {
        self.last_challenge.is_some()
    }

    fn answered(&self) -> Answered {
        match &self.last_challenge {
            Some(raw) => Answered::Challenge(raw.clone()),
            None => Answered::PrimedRealm,
        }
    }

    fn authorization(
        &mut self,
        credentials: &Credentials,
        method: &Method,
        uri: &str,
        body: Option<&[u8]>,
    ) -> Option<Authorization> {
        if self.challenge.is_none() {
            let synthetic = format!("Digest realm=\"{}\", nonce=\"\"", self.realm);
            match digest_auth::parse(&synthetic) {
                Ok(challenge) => self.challenge = Some(challenge),
                Err(e) => {
                    tracing::debug!(realm = %self.realm, error = %e, "Cannot answer primed digest realm");
                    return None;
                }
            }
        }

        let challenge = self.challenge.as_mut()?;
        let context = AuthContext::new_with_method(
            credentials.principal(),
            credentials.secret(),
            uri,
            body,
            HttpMethod::from(method.as_str()),
        );
        match challenge.respond(&context) {
            Ok(answer) => Some(Authorization {
                value: answer.to_string(),
                answered: self.answered(),
            }),
            Err(e) => {
                tracing::debug!(realm = %self.realm, error = %e, "Digest response failed");
                None
            }
        }
    }
}

impl fmt::Debug for DigestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestContext")
            .field("realm", &self.realm)
            .field("server_nonce", &self.has_server_nonce())
            .finish()
    }
}

/// What the cache remembers for one scope.
#[derive(Debug)]
pub enum CacheEntry {
    Basic { realm: String },
    Digest(DigestContext),
}

impl CacheEntry {
    pub fn realm(&self) -> &str {
        match self {
            CacheEntry::Basic { realm } => realm,
            CacheEntry::Digest(ctx) => ctx.realm(),
        }
    }

    pub fn is_digest(&self) -> bool {
        matches!(self, CacheEntry::Digest(_))
    }
}

/// What a preemptive `Authorization` value was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answered {
    /// Basic credentials.
    Basic,
    /// A primed realm, before the server issued any nonce.
    PrimedRealm,
    /// The raw server challenge.
    Challenge(String),
}

/// An `Authorization` header value and the challenge it answers.
#[derive(Debug, Clone)]
pub struct Authorization {
    pub value: String,
    pub answered: Answered,
}

/// A cache entry together with the scope it belongs to.
#[derive(Debug)]
pub struct PrimedEntry {
    pub scope: AuthScope,
    pub entry: CacheEntry,
}

/// Builds pre-seeded Digest entries. No I/O.
pub struct DigestCachePrimer;

impl DigestCachePrimer {
    pub fn prime(host: &str, port: u16, scheme: &str, realm: &str) -> PrimedEntry {
        PrimedEntry {
            scope: AuthScope::new(scheme, host, port),
            entry: CacheEntry::Digest(DigestContext::primed(realm)),
        }
    }
}

/// Thread-safe authentication cache owned by one client.
#[derive(Clone, Default)]
pub struct AuthCache {
    entries: Arc<DashMap<AuthScope, CacheEntry>>,
}

impl AuthCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, primed: PrimedEntry) {
        self.entries.insert(primed.scope, primed.entry);
    }

    /// Realm cached for a scope, if any.
    pub fn realm(&self, scope: &AuthScope) -> Option<String> {
        self.entries.get(scope).map(|e| e.realm().to_string())
    }

    /// True when the scope holds a Digest entry.
    pub fn has_digest(&self, scope: &AuthScope) -> bool {
        self.entries.get(scope).is_some_and(|e| e.is_digest())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Preemptive `Authorization` value for a request to `scope`.
    pub fn authorization(
        &self,
        scope: &AuthScope,
        credentials: &Credentials,
        method: &Method,
        uri: &str,
        body: Option<&[u8]>,
    ) -> Option<Authorization> {
        let mut entry = self.entries.get_mut(scope)?;
        match entry.value_mut() {
            CacheEntry::Basic { .. } => Some(Authorization {
                value: credentials.basic_authorization(),
                answered: Answered::Basic,
            }),
            CacheEntry::Digest(ctx) => ctx.authorization(credentials, method, uri, body),
        }
    }

    /// Record a 401 challenge for a request that sent `answered`.
    ///
    /// Returns true when resending can succeed: the challenge differs from
    /// the one the request answered. Several requests may share the cache,
    /// so a challenge another request already stored is reused, not reset.
    pub fn accept_challenge(
        &self,
        scope: &AuthScope,
        raw: &str,
        answered: Option<&Answered>,
    ) -> bool {
        let Some((scheme, _)) = raw.trim().split_once(char::is_whitespace) else {
            return false;
        };

        if scheme.eq_ignore_ascii_case("digest") {
            if matches!(answered, Some(Answered::Challenge(prev)) if prev == raw) {
                return false;
            }
            let stored = self.entries.get(scope).is_some_and(|e| match e.value() {
                CacheEntry::Digest(ctx) => ctx.last_challenge.as_deref() == Some(raw),
                CacheEntry::Basic { .. } => false,
            });
            if stored {
                return true;
            }
            match digest_auth::parse(raw) {
                Ok(challenge) => {
                    let context = DigestContext::from_challenge(raw, challenge);
                    self.entries.insert(scope.clone(), CacheEntry::Digest(context));
                    true
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Unparsable digest challenge from backend");
                    false
                }
            }
        } else if scheme.eq_ignore_ascii_case("basic") {
            if answered == Some(&Answered::Basic) {
                return false;
            }
            if !matches!(self.entries.get(scope).as_deref(), Some(CacheEntry::Basic { .. })) {
                let realm = crate::auth::challenge::AuthProbeResult::parse(raw)
                    .map(|r| r.realm)
                    .unwrap_or_default();
                self.entries.insert(scope.clone(), CacheEntry::Basic { realm });
            }
            true
        } else {
            false
        }
    }
}
