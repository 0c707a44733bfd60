//! Caller session subsystem.
//!
//! # Data Flow
//! ```text
//! POST login (validated token)
//!     → store.rs: new SessionId, SecurityContext { pending token }
//!
//! first proxied request
//!     → store.rs: SecurityContext for the session cookie
//!     → binding.rs: resolve(session, pending) → bind client (once)
//!     → store.rs: clear pending token
//!
//! logout / idle expiry
//!     → store.rs: invalidate
//!     → binding.rs: discard
//! ```

pub mod binding;
pub mod store;

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

pub use binding::{SessionBinding, SessionRecord};
pub use store::{SecurityContext, SessionId, SessionStore};

/// Periodically expires idle sessions and discards their bindings.
pub struct SessionReaper {
    store: SessionStore,
    binding: SessionBinding,
    interval: Duration,
}

impl SessionReaper {
    pub fn new(store: SessionStore, binding: SessionBinding, interval: Duration) -> Self {
        Self {
            store,
            binding,
            interval,
        }
    }

    /// Sweep once. Returns the number of sessions expired.
    pub fn sweep(&self) -> usize {
        let expired = self.store.expire_idle();
        for id in &expired {
            self.binding.discard(id);
        }
        if !expired.is_empty() {
            tracing::info!(expired = expired.len(), remaining = self.store.len(), "Idle sessions expired");
        }
        expired.len()
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Session reaper starting");

        let mut ticker = time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Session reaper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::auth::{AuthCache, AuthenticatedClient, AuthenticationToken, Credentials};

    #[tokio::test]
    async fn test_sweep_discards_binding() {
        let store = SessionStore::new(Duration::from_millis(10));
        let binding = SessionBinding::new();
        let client = Arc::new(AuthenticatedClient::new(
            reqwest::Client::new(),
            Credentials::new("alice", "pw"),
            AuthCache::new(),
        ));

        let id = store.create(AuthenticationToken::new("alice", vec![], client));
        let pending = store.get(&id).and_then(SecurityContext::into_pending_token);
        binding.resolve(&id, pending).await.unwrap();
        assert_eq!(binding.bound_count(), 1);

        tokio::time::sleep(Duration::from_millis(30)).await;
        let reaper = SessionReaper::new(store.clone(), binding.clone(), Duration::from_secs(60));
        assert_eq!(reaper.sweep(), 1);
        assert!(binding.bound(&id).is_none());
        assert!(store.is_empty());
    }
}
