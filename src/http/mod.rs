//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, body limit)
//!     → POST login  → auth validator → session store → Set-Cookie
//!     → POST logout → session store + binding discarded
//!     → anything else
//!         → request.rs (session cookie, request ID)
//!         → dispatcher.rs (session client, target URI via query.rs)
//!         → response.rs (relay status, allow-listed headers, body)
//!     → Send to client
//! ```

pub mod dispatcher;
pub mod query;
pub mod request;
pub mod response;
pub mod server;

pub use dispatcher::{HeaderAllowList, ProxyDispatcher};
pub use request::X_REQUEST_ID;
pub use response::ProxyError;
pub use server::{AppState, HttpServer, LoginResponse, ServerError};
