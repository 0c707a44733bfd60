//! Request inspection helpers.
//!
//! # Responsibilities
//! - Find the session id in the caller's cookies
//! - Read login credentials from the `Authorization` header
//! - Build and expire the session cookie

use axum::http::{header, HeaderMap, HeaderValue};

use crate::auth::Credentials;
use crate::session::SessionId;

/// Header carrying the per-request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Correlation id assigned by the request-id layer.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Session id from the named cookie, if the caller sent one.
pub fn session_id(headers: &HeaderMap, cookie_name: &str) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| SessionId::from(value))
}

/// Basic credentials presented for login.
pub fn basic_credentials(headers: &HeaderMap) -> Option<Credentials> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(Credentials::from_basic_header)
}

/// `Set-Cookie` value opening a session.
pub fn session_cookie(cookie_name: &str, id: &SessionId) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("{}={}; Path=/; HttpOnly; SameSite=Lax", cookie_name, id)).ok()
}

/// `Set-Cookie` value removing the session cookie.
pub fn expired_session_cookie(cookie_name: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("{}=; Path=/; HttpOnly; Max-Age=0", cookie_name)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; AUTHPROXY_SESSION=abc123; other=1"),
        );

        assert_eq!(session_id(&headers, "AUTHPROXY_SESSION"), Some(SessionId::from("abc123")));
        assert_eq!(session_id(&headers, "missing"), None);
    }

    #[test]
    fn test_session_id_across_cookie_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::COOKIE, HeaderValue::from_static("SID=xyz"));

        assert_eq!(session_id(&headers, "SID"), Some(SessionId::from("xyz")));
    }

    #[test]
    fn test_empty_cookie_value_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("SID="));
        assert_eq!(session_id(&headers, "SID"), None);
    }

    #[test]
    fn test_cookies() {
        let id = SessionId::from("abc");
        assert_eq!(
            session_cookie("SID", &id).unwrap(),
            "SID=abc; Path=/; HttpOnly; SameSite=Lax"
        );
        assert_eq!(
            expired_session_cookie("SID").unwrap(),
            "SID=; Path=/; HttpOnly; Max-Age=0"
        );
    }

    #[test]
    fn test_basic_credentials() {
        let mut headers = HeaderMap::new();
        assert!(basic_credentials(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(basic_credentials(&headers).unwrap().principal(), "user");
    }

    #[test]
    fn test_request_id_fallback() {
        assert_eq!(request_id(&HeaderMap::new()), "unknown");
    }
}
