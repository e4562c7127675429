//! Header deny-lists and the fixed security headers

use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, HOST, REFERRER_POLICY,
    TRANSFER_ENCODING, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION,
};

/// Request headers never forwarded upstream.
pub static REQUEST_DENY_LIST: [HeaderName; 2] = [HOST, CONNECTION];

/// Framing headers dropped from requests that are forwarded without a body.
pub static BODYLESS_DENY_LIST: [HeaderName; 2] = [CONTENT_LENGTH, TRANSFER_ENCODING];

/// Response headers never relayed back to the caller.
pub static RESPONSE_DENY_LIST: [HeaderName; 2] = [CONNECTION, TRANSFER_ENCODING];

/// Security headers set on every proxied response.
pub static SECURITY_HEADERS: [(HeaderName, &str); 4] = [
    (X_FRAME_OPTIONS, "DENY"),
    (X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (X_XSS_PROTECTION, "1; mode=block"),
    (REFERRER_POLICY, "strict-origin-when-cross-origin"),
];

/// Copy `headers` into a new map, skipping every name in `deny`.
///
/// `HeaderName` is always lowercase, so matching is case-insensitive. Repeated
/// headers are appended, never collapsed.
pub fn filter_headers(headers: &HeaderMap, deny: &[HeaderName]) -> HeaderMap {
    let mut filtered = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if !deny.contains(name) {
            filtered.append(name.clone(), value.clone());
        }
    }
    filtered
}

/// Set the security headers, replacing any value already present.
pub fn apply_security_headers(headers: &mut HeaderMap) {
    for (name, value) in SECURITY_HEADERS.iter() {
        headers.insert(name.clone(), HeaderValue::from_static(*value));
    }
}
