//! Query string normalization.
//!
//! Callers often send queries that are already percent-encoded (structured
//! search expressions, JSON fragments). The query is decoded here and encoded
//! exactly once when the target URL is composed, so nothing is encoded twice.

/// Decode a raw query the way form decoders do: `+` is a space, `%XX` is a byte.
///
/// Returns `None` when the decoded bytes are not UTF-8.
pub fn decode_query(raw: &str) -> Option<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced).ok().map(|decoded| decoded.into_owned())
}

/// Query to hand to [`crate::config::BackendConfig::target_url`].
///
/// With `decode` the result is decoded with literal `%` escaped, ready for the
/// single encoding pass `Url::set_query` performs. Without it the raw query
/// is passed through.
pub fn forwardable_query(raw: Option<&str>, decode: bool) -> Option<String> {
    let raw = raw.filter(|q| !q.is_empty())?;
    if !decode {
        return Some(raw.to_string());
    }

    match decode_query(raw) {
        Some(decoded) => Some(decoded.replace('%', "%25")),
        None => {
            tracing::warn!(query = %raw, "Query is not valid UTF-8 once decoded, forwarding raw");
            Some(raw.to_string())
        }
    }
}
