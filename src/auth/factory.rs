//! Builds authenticated clients for a backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::challenge::SchemeProbe;
use crate::auth::client::AuthenticatedClient;
use crate::auth::credentials::Credentials;
use crate::auth::digest_cache::{AuthCache, DigestCachePrimer};
use crate::auth::error::AuthResult;
use crate::config::{BackendConfig, TimeoutConfig};
use crate::observability::metrics;

/// Composes the scheme probe, digest priming and credentials into a client.
///
/// Every build probes the backend once; nothing else touches the network.
#[derive(Clone)]
pub struct AuthenticatingClientFactory {
    probe: SchemeProbe,
    http: reqwest::Client,
    built: Arc<AtomicUsize>,
}

impl AuthenticatingClientFactory {
    /// Create a factory whose clients use the configured timeouts.
    ///
    /// Redirects are relayed to the caller, never followed.
    pub fn new(timeouts: &TimeoutConfig) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .timeout(Duration::from_secs(timeouts.request_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self::with_client(http))
    }

    /// Create a factory around an existing transport.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            probe: SchemeProbe::new(http.clone()),
            http,
            built: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn build(
        &self,
        config: &BackendConfig,
        credentials: Credentials,
    ) -> AuthResult<AuthenticatedClient> {
        let probe = self.probe.probe(config).await?;

        let cache = AuthCache::new();
        let primed = probe.is_digest() && config.digest_caching_enabled;
        if primed {
            cache.insert(DigestCachePrimer::prime(
                &config.host,
                config.port,
                &config.scheme,
                &probe.realm,
            ));
        }

        let client = AuthenticatedClient::new(self.http.clone(), credentials, cache);
        self.built.fetch_add(1, Ordering::Relaxed);
        metrics::record_client_built(primed);

        tracing::debug!(
            client = %client.id(),
            principal = %client.principal(),
            scheme = %probe.scheme,
            digest_primed = primed,
            "Authenticated client built"
        );
        Ok(client)
    }

    /// Number of clients this factory (and its clones) has built.
    pub fn built_count(&self) -> usize {
        self.built.load(Ordering::Relaxed)
    }
}
