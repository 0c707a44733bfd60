//! Caller sessions and their security contexts.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use crate::auth::AuthenticationToken;

/// Opaque caller session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The authenticated identity of one session.
///
/// The pending token lives here between login and the first proxied request,
/// then is cleared once its client is bound.
#[derive(Debug, Clone)]
pub struct SecurityContext {
    principal: String,
    authorities: Vec<String>,
    pending: Option<AuthenticationToken>,
}

impl SecurityContext {
    pub fn from_token(token: AuthenticationToken) -> Self {
        Self {
            principal: token.principal().to_string(),
            authorities: token.authorities().to_vec(),
            pending: Some(token),
        }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn authorities(&self) -> &[String] {
        &self.authorities
    }

    pub fn pending_token(&self) -> Option<&AuthenticationToken> {
        self.pending.as_ref()
    }

    pub fn into_pending_token(self) -> Option<AuthenticationToken> {
        self.pending
    }
}

struct SessionEntry {
    context: SecurityContext,
    last_access: Instant,
}

/// In-memory session store keyed by [`SessionId`].
///
/// Stands in for the session-management layer: it creates ids, tracks idle
/// time and invalidates sessions. Binding cleanup on expiry is driven by
/// [`crate::session::SessionReaper`].
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<SessionId, SessionEntry>>,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            idle_timeout,
        }
    }

    /// Open a session for a validated token.
    pub fn create(&self, token: AuthenticationToken) -> SessionId {
        let id = SessionId::generate();
        self.put(id.clone(), SecurityContext::from_token(token));
        id
    }

    pub fn put(&self, id: SessionId, context: SecurityContext) {
        self.sessions.insert(
            id,
            SessionEntry {
                context,
                last_access: Instant::now(),
            },
        );
    }

    /// Security context of a live session. Refreshes its idle timer.
    pub fn get(&self, id: &SessionId) -> Option<SecurityContext> {
        let mut entry = self.sessions.get_mut(id)?;
        if entry.last_access.elapsed() > self.idle_timeout {
            return None;
        }
        entry.last_access = Instant::now();
        Some(entry.context.clone())
    }

    /// True while the session is live. Does not refresh its idle timer.
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions
            .get(id)
            .is_some_and(|entry| entry.last_access.elapsed() <= self.idle_timeout)
    }

    /// Drop the pending token once its client has been bound elsewhere.
    pub fn clear_pending(&self, id: &SessionId) {
        if let Some(mut entry) = self.sessions.get_mut(id) {
            entry.context.pending = None;
        }
    }

    /// End a session. Returns true when it existed.
    pub fn invalidate(&self, id: &SessionId) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// Remove every session idle past the timeout and return their ids.
    pub fn expire_idle(&self) -> Vec<SessionId> {
        let mut expired = Vec::new();
        self.sessions.retain(|id, entry| {
            let keep = entry.last_access.elapsed() <= self.idle_timeout;
            if !keep {
                expired.push(id.clone());
            }
            keep
        });
        expired
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
