use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::body::Body;
use crate::errors::{DavError, DavResult};

/// HTTP methods supported by [`DavHandler`](crate::DavHandler).
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum DavMethod {
    Head,
    Get,
    Put,
    Options,
    PropFind,
    MkCol,
    Copy,
    Move,
    Delete,
    Lock,
    Unlock,
}

// translate method into our own enum that has webdav methods as well.
pub(crate) fn dav_method(m: &http::Method) -> DavResult<DavMethod> {
    let m = match m.as_str() {
        "HEAD" => DavMethod::Head,
        "GET" => DavMethod::Get,
        "PUT" => DavMethod::Put,
        "DELETE" => DavMethod::Delete,
        "OPTIONS" => DavMethod::Options,
        "PROPFIND" => DavMethod::PropFind,
        "MKCOL" => DavMethod::MkCol,
        "COPY" => DavMethod::Copy,
        "MOVE" => DavMethod::Move,
        "LOCK" => DavMethod::Lock,
        "UNLOCK" => DavMethod::Unlock,
        _ => return Err(DavError::UnknownDavMethod),
    };
    Ok(m)
}

pub(crate) fn dav_xml_error(body: &str) -> Body {
    let xml = format!(
        "{}\n{}\n{}\n{}\n",
        r#"<?xml version="1.0" encoding="utf-8" ?>"#,
        r#"<D:error xmlns:D="DAV:">"#,
        body,
        r#"</D:error>"#
    );
    Body::from(xml)
}

// "Sat, 02 Aug 2025 10:01:02 GMT", as used by getlastmodified
// and the Last-Modified header.
pub(crate) fn systemtime_to_httpdate(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

// RFC3339, as required for creationdate.
pub(crate) fn systemtime_to_rfc3339(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}
