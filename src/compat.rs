//! Detection of the macOS WebDAV client (the Finder's mount support).
//!
//! That client has nonstandard expectations: it wants class 2 advertised
//! in OPTIONS, does a LOCK-before-PUT dance on zero-length placeholder
//! files, and reads the lock-capability properties in PROPFIND replies.
//! Other clients get a plain class 1 server; LOCK/UNLOCK still work for
//! them, they are just not advertised.
use http::header::HeaderMap;

// The macOS DAV filesystem identifies as "WebDAVFS/x.y.z (...) Darwin/..",
// older releases as "WebDAVLib".
pub(crate) fn is_mac_dav_client(headers: &HeaderMap) -> bool {
    headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(|ua| ua.contains("WebDAVFS") || ua.contains("WebDAVLib"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::HeaderValue;

    #[test]
    fn detects_finder() {
        let mut h = HeaderMap::new();
        h.insert(
            "user-agent",
            HeaderValue::from_static("WebDAVFS/3.0.0 (03008000) Darwin/21.1.0 (arm64)"),
        );
        assert!(is_mac_dav_client(&h));

        let mut h = HeaderMap::new();
        h.insert("user-agent", HeaderValue::from_static("litmus/0.13"));
        assert!(!is_mac_dav_client(&h));

        assert!(!is_mac_dav_client(&HeaderMap::new()));
    }
}
