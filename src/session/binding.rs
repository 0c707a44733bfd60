//! Session → authenticated client binding.
//!
//! # Responsibilities
//! - Hold at most one authenticated client per session
//! - Bind lazily on the first proxied request after login
//! - Serialize first binding per session without blocking other sessions
//!
//! # Design Decisions
//! - One `OnceCell` per session id: concurrent first requests single-flight
//!   on that cell only; the map's shard lock is never held across an await
//! - Bound is terminal; the record is discarded, never transitioned, when
//!   the session ends
//! - A failed bind leaves no trace in the map

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

use crate::auth::{AuthError, AuthResult, AuthenticatedClient, AuthenticationToken};
use crate::observability::metrics;
use crate::session::store::SessionId;

type Slot = Arc<OnceCell<Arc<AuthenticatedClient>>>;

/// Snapshot of one session's binding.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub bound_client: Option<Arc<AuthenticatedClient>>,
}

/// Keyed map of session bindings.
#[derive(Clone, Default)]
pub struct SessionBinding {
    slots: Arc<DashMap<SessionId, Slot>>,
}

impl SessionBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client bound to the session, if any.
    pub fn bound(&self, session_id: &SessionId) -> Option<Arc<AuthenticatedClient>> {
        self.slots
            .get(session_id)
            .and_then(|slot| slot.get().cloned())
    }

    pub fn record(&self, session_id: &SessionId) -> SessionRecord {
        SessionRecord {
            session_id: session_id.clone(),
            bound_client: self.bound(session_id),
        }
    }

    /// Resolve the session's client, binding the pending token's client on first use.
    ///
    /// Fails with `NoSecurityContext` when nothing is bound and no token is
    /// pending, and with `SessionNotAuthenticated` when the token holds no client.
    pub async fn resolve(
        &self,
        session_id: &SessionId,
        pending: Option<AuthenticationToken>,
    ) -> AuthResult<Arc<AuthenticatedClient>> {
        if let Some(client) = self.bound(session_id) {
            return Ok(client);
        }
        let Some(mut token) = pending else {
            return Err(AuthError::NoSecurityContext);
        };

        self.get_or_bind(session_id, || async move {
            token.take_client().ok_or(AuthError::SessionNotAuthenticated)
        })
        .await
    }

    /// Bind the client produced by `init` unless one is bound already.
    ///
    /// `init` runs at most once per successful binding; concurrent callers
    /// for the same session wait and then share the winner's client.
    pub async fn get_or_bind<F, Fut>(
        &self,
        session_id: &SessionId,
        init: F,
    ) -> AuthResult<Arc<AuthenticatedClient>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AuthResult<Arc<AuthenticatedClient>>>,
    {
        let slot: Slot = self.slots.entry(session_id.clone()).or_default().clone();

        let result = slot.get_or_try_init(init).await.cloned();
        match result {
            Ok(client) => {
                tracing::debug!(session = %session_id, client = %client.id(), "Session bound");
                metrics::record_bound_sessions(self.bound_count());
                Ok(client)
            }
            Err(e) => {
                drop(slot);
                // Only this caller held the empty slot; remove it so a failed
                // bind does not leave a record behind.
                self.slots.remove_if(session_id, |_, slot| {
                    slot.get().is_none() && Arc::strong_count(slot) == 1
                });
                Err(e)
            }
        }
    }

    /// Forget the session's binding. Returns true when a client was bound.
    pub fn discard(&self, session_id: &SessionId) -> bool {
        let removed = self
            .slots
            .remove(session_id)
            .is_some_and(|(_, slot)| slot.initialized());
        if removed {
            tracing::debug!(session = %session_id, "Session binding discarded");
            metrics::record_bound_sessions(self.bound_count());
        }
        removed
    }

    pub fn bound_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.initialized()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::auth::{AuthCache, Credentials};

    fn client(principal: &str) -> Arc<AuthenticatedClient> {
        Arc::new(AuthenticatedClient::new(
            reqwest::Client::new(),
            Credentials::new(principal, "pw"),
            AuthCache::new(),
        ))
    }

    fn token(principal: &str) -> AuthenticationToken {
        AuthenticationToken::new(principal, vec![], client(principal))
    }

    #[tokio::test]
    async fn test_unbound_without_token() {
        let binding = SessionBinding::new();
        let id = SessionId::generate();

        let err = binding.resolve(&id, None).await.unwrap_err();
        assert!(matches!(err, AuthError::NoSecurityContext));
        assert!(binding.record(&id).bound_client.is_none());
    }

    #[tokio::test]
    async fn test_token_without_client() {
        let binding = SessionBinding::new();
        let id = SessionId::generate();

        let pending = AuthenticationToken::without_client("alice", vec![]);
        let err = binding.resolve(&id, Some(pending)).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionNotAuthenticated));
        // Failed bind leaves no record.
        assert_eq!(binding.slots.len(), 0);
    }

    #[tokio::test]
    async fn test_bound_is_reused() {
        let binding = SessionBinding::new();
        let id = SessionId::generate();

        let first = binding.resolve(&id, Some(token("alice"))).await.unwrap();
        let again = binding.resolve(&id, None).await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        // A second token never replaces the bound client.
        let other = binding.resolve(&id, Some(token("mallory"))).await.unwrap();
        assert!(Arc::ptr_eq(&first, &other));
        assert_eq!(other.principal(), "alice");
    }

    #[tokio::test]
    async fn test_concurrent_first_binds_build_once() {
        let binding = SessionBinding::new();
        let id = SessionId::generate();
        let builds = Arc::new(AtomicUsize::new(0));

        let bind = |binding: SessionBinding, id: SessionId, builds: Arc<AtomicUsize>| async move {
            binding
                .get_or_bind(&id, || async move {
                    builds.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(client("alice"))
                })
                .await
        };

        let (a, b) = tokio::join!(
            bind(binding.clone(), id.clone(), builds.clone()),
            bind(binding.clone(), id.clone(), builds.clone()),
        );

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    }

    #[tokio::test]
    async fn test_sessions_do_not_contend() {
        let binding = SessionBinding::new();
        let slow = SessionId::generate();
        let fast = SessionId::generate();

        let slow_bind = binding.get_or_bind(&slow, || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(client("slow"))
        });
        let fast_bind = async {
            tokio::time::timeout(
                Duration::from_secs(1),
                binding.resolve(&fast, Some(token("fast"))),
            )
            .await
        };

        tokio::select! {
            _ = slow_bind => panic!("slow bind should not finish first"),
            result = fast_bind => {
                let client = result.expect("fast session blocked").unwrap();
                assert_eq!(client.principal(), "fast");
            }
        }
    }

    #[tokio::test]
    async fn test_discard_then_rebind_with_new_credentials() {
        let binding = SessionBinding::new();
        let id = SessionId::generate();

        let old = binding.resolve(&id, Some(token("alice"))).await.unwrap();
        assert!(binding.discard(&id));
        assert!(!binding.discard(&id));
        assert!(matches!(
            binding.resolve(&id, None).await,
            Err(AuthError::NoSecurityContext)
        ));

        let new = binding.resolve(&id, Some(token("bob"))).await.unwrap();
        assert!(!Arc::ptr_eq(&old, &new));
        assert_eq!(new.principal(), "bob");
        assert_eq!(binding.bound_count(), 1);
    }
}
