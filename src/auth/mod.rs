//! Backend authentication subsystem.
//!
//! # Data Flow
//! ```text
//! login credentials
//!     → factory.rs
//!         → challenge.rs (HEAD / → WWW-Authenticate → scheme + realm)
//!         → digest_cache.rs (prime realm when Digest + caching enabled)
//!         → client.rs (AuthenticatedClient: credentials + cache)
//!     → validator.rs (one real request → authenticated / invalid / backend error)
//!     → AuthenticationToken (principal, authorities, client)
//!     → session binding
//! ```
//!
//! # Design Decisions
//! - Digest and Basic arithmetic come from `digest_auth` and base64; this
//!   module only decides when to answer
//! - One challenge answer per request; nothing here retries on failure

pub mod challenge;
pub mod client;
pub mod credentials;
pub mod digest_cache;
pub mod error;
pub mod factory;
pub mod validator;

pub use challenge::{AuthProbeResult, SchemeProbe};
pub use client::{AuthenticatedClient, BackendRequest};
pub use credentials::{AuthenticationToken, Credentials};
pub use digest_cache::{Answered, AuthCache, AuthScope, Authorization, DigestCachePrimer};
pub use error::{AuthError, AuthResult};
pub use factory::AuthenticatingClientFactory;
pub use validator::CredentialValidator;
