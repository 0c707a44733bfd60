//! Response handling and error mapping.
//!
//! # Responsibilities
//! - Relay the backend response (status, allow-listed headers, streamed body)
//! - Map authentication and proxy errors to caller-facing statuses
//!
//! # Design Decisions
//! - "Not logged in" and "invalid credentials" are both 401 but carry
//!   different messages; they are never conflated
//! - Backend failures surface as 502; backend statuses seen during
//!   validation are passed through verbatim
//! - A request body over the size limit is 413, any other body read
//!   failure is 400

use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;
use thiserror::Error;

use crate::auth::AuthError;
use crate::http::dispatcher::HeaderAllowList;

/// Errors raised while dispatching a proxied request.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("failed to read request body: {0}")]
    Body(#[source] axum::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Auth(e) => auth_status(e),
            ProxyError::Body(e) => body_status(e),
        }
    }
}

fn body_status(error: &axum::Error) -> StatusCode {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return StatusCode::PAYLOAD_TOO_LARGE;
        }
        source = e.source();
    }
    StatusCode::BAD_REQUEST
}

fn auth_status(error: &AuthError) -> StatusCode {
    match error {
        AuthError::InvalidCredentials
        | AuthError::NoSecurityContext
        | AuthError::SessionNotAuthenticated => StatusCode::UNAUTHORIZED,
        AuthError::UnreachableBackend { .. } | AuthError::MalformedChallenge(_) => {
            StatusCode::BAD_GATEWAY
        }
        AuthError::BackendError { status } => *status,
        AuthError::InvalidUri(_) => StatusCode::BAD_REQUEST,
    }
}

fn auth_message(error: &AuthError) -> String {
    if error.is_not_logged_in() {
        "Not logged in".to_string()
    } else {
        error.to_string()
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (auth_status(&self), auth_message(&self)).into_response()
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match self {
            ProxyError::Auth(e) => e.into_response(),
            e @ ProxyError::Body(_) => (e.status(), e.to_string()).into_response(),
        }
    }
}

/// Turn a backend response into the caller's response.
///
/// Status is copied, headers are filtered through the allow-list, and the
/// body is streamed without buffering.
pub fn relay(response: reqwest::Response, allow_list: &HeaderAllowList) -> Response {
    let status = response.status();
    let headers = allow_list.filter(response.headers());

    let mut relayed = Response::new(Body::from_stream(response.bytes_stream()));
    *relayed.status_mut() = status;
    *relayed.headers_mut() = headers;
    relayed
}
