//! The path part of the request URL, normalized and percent-decoded.
//!
use std::error::Error;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use percent_encoding as pct;

use crate::errors::DavError;

// Encode all non-unreserved characters, except '/'.
// See RFC3986, and https://en.wikipedia.org/wiki/Percent-encoding .
const ENCODE_SET: &pct::AsciiSet = &pct::NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Path information relative to a prefix.
#[derive(Clone)]
pub struct DavPath {
    pub(crate) path: Vec<u8>,
    pub(crate) prefix: Vec<u8>,
}

impl std::fmt::Display for DavPath {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_url_string_with_prefix())
    }
}

impl std::fmt::Debug for DavPath {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self.as_url_string_with_prefix())
    }
}

/// Error returned by the `DavPath` constructors.
#[derive(Debug)]
pub enum ParseError {
    /// malformed path (bad escapes, dotdot segments, NUL bytes).
    InvalidPath,
    /// valid path, but outside of the configured prefix.
    IllegalPath,
}

impl Error for ParseError {}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<ParseError> for DavError {
    fn from(_e: ParseError) -> Self {
        DavError::InvalidPath
    }
}

// a decoded segment can contain any value except '\0' or '/', and
// must not itself turn into a dot or dotdot segment.
fn decode_segment(src: &[u8]) -> Result<Vec<u8>, ParseError> {
    let seg: Vec<u8> = pct::percent_decode(src).collect();
    if seg.iter().any(|&x| x == 0 || x == b'/') {
        return Err(ParseError::InvalidPath);
    }
    if seg == b"." || seg == b".." {
        return Err(ParseError::InvalidPath);
    }
    Ok(seg)
}

fn encode_path(src: &[u8]) -> Vec<u8> {
    pct::percent_encode(src, ENCODE_SET).to_string().into_bytes()
}

// make the path safe:
// - raw path before decoding can contain only printable ascii
// - path must be absolute, fragments are rejected, query is stripped
// - consecutive slashes and "." segments collapse
// - ".." is rejected outright, before and after decoding
// - decoded segments must not contain NUL or '/'
fn normalize_path(rp: &[u8]) -> Result<Vec<u8>, ParseError> {
    if rp.iter().any(|&x| !(32..=126).contains(&x)) {
        return Err(ParseError::InvalidPath);
    }

    // don't allow fragments. query part gets deleted.
    let mut rawpath = rp;
    if let Some(pos) = rawpath.iter().position(|&x| x == b'?' || x == b'#') {
        if rawpath[pos] == b'#' {
            return Err(ParseError::InvalidPath);
        }
        rawpath = &rawpath[..pos];
    }

    if rawpath.is_empty() || rawpath[0] != b'/' {
        return Err(ParseError::InvalidPath);
    }

    let isdir = rawpath.ends_with(b"/");
    let mut v: Vec<u8> = Vec::new();
    for segment in rawpath.split(|&c| c == b'/') {
        match segment {
            b"" | b"." => {}
            b".." => return Err(ParseError::InvalidPath),
            s => {
                v.push(b'/');
                v.extend_from_slice(&decode_segment(s)?);
            }
        }
    }
    if isdir || v.is_empty() {
        v.push(b'/');
    }
    Ok(v)
}

/// Comparison ignores any trailing slash, so /foo == /foo/
impl PartialEq for DavPath {
    fn eq(&self, rhs: &DavPath) -> bool {
        let mut a = self.path.as_slice();
        if a.len() > 1 && a.ends_with(b"/") {
            a = &a[..a.len() - 1];
        }
        let mut b = rhs.path.as_slice();
        if b.len() > 1 && b.ends_with(b"/") {
            b = &b[..b.len() - 1];
        }
        self.prefix == rhs.prefix && a == b
    }
}

impl DavPath {
    /// from an URL encoded path and (URL encoded) prefix.
    pub(crate) fn from_str(src: &str, prefix: &str) -> Result<DavPath, ParseError> {
        let path = normalize_path(src.as_bytes())?;
        let mut prefix = prefix.as_bytes();
        if !path.starts_with(prefix) {
            return Err(ParseError::IllegalPath);
        }
        let pflen = prefix.len();
        if prefix.ends_with(b"/") {
            prefix = &prefix[..pflen - 1];
        } else if path.len() != pflen && (path.len() < pflen || path[pflen] != b'/') {
            return Err(ParseError::IllegalPath);
        }
        Ok(DavPath {
            path: path[prefix.len()..].to_vec(),
            prefix: prefix.to_vec(),
        })
    }

    /// from request.uri
    pub(crate) fn from_uri(uri: &http::uri::Uri, prefix: &str) -> Result<Self, ParseError> {
        match uri.path() {
            "*" => Ok(DavPath {
                prefix: b"".to_vec(),
                path: b"*".to_vec(),
            }),
            path if path.starts_with('/') => DavPath::from_str(path, prefix),
            _ => Err(ParseError::InvalidPath),
        }
    }

    // is this a "star" request (only used with OPTIONS)
    pub(crate) fn is_star(&self) -> bool {
        self.path == b"*"
    }

    // as URL encoded string, without prefix.
    #[cfg(test)]
    pub(crate) fn as_url_string(&self) -> String {
        String::from_utf8(encode_path(&self.path)).unwrap()
    }

    /// as URL encoded string, with prefix.
    pub fn as_url_string_with_prefix(&self) -> String {
        let mut p = encode_path(&self.path);
        if !self.prefix.is_empty() {
            let mut u = encode_path(&self.prefix);
            u.append(&mut p);
            p = u;
        }
        String::from_utf8(p).unwrap()
    }

    /// as utf8 string, with prefix. uses String::from_utf8_lossy.
    pub fn as_utf8_string_with_prefix(&self) -> String {
        let mut p = self.prefix.clone();
        p.extend_from_slice(&self.path);
        String::from_utf8_lossy(&p).to_string()
    }

    /// as raw bytes, not encoded, no prefix.
    pub fn as_bytes(&self) -> &[u8] {
        self.path.as_slice()
    }

    /// as OS specific Path, relative (no leading or trailing slash).
    pub(crate) fn as_rel_pathbuf(&self) -> PathBuf {
        let mut path = if !self.path.is_empty() {
            &self.path[1..]
        } else {
            &self.path[..]
        };
        if path.ends_with(b"/") {
            path = &path[..path.len() - 1];
        }
        PathBuf::from(OsStr::from_bytes(path).to_owned())
    }

    /// is this a collection i.e. does the original URL path end in "/".
    pub fn is_collection(&self) -> bool {
        self.path.ends_with(b"/")
    }

    // remove any trailing slash.
    pub(crate) fn remove_slash(&mut self) {
        let mut l = self.path.len();
        while l > 1 && self.path[l - 1] == b'/' {
            l -= 1;
        }
        self.path.truncate(l);
    }

    /// add a slash to the end of the path (if not already present).
    pub(crate) fn add_slash(&mut self) {
        if !self.is_collection() {
            self.path.push(b'/');
        }
    }

    pub(crate) fn add_slash_if(&mut self, b: bool) {
        if b && !self.is_collection() {
            self.path.push(b'/');
        }
    }

    /// is this the root of the share ("/").
    pub(crate) fn is_root(&self) -> bool {
        self.path == b"/"
    }

    // get parent.
    pub(crate) fn parent(&self) -> DavPath {
        let mut segs = self
            .path
            .split(|&c| c == b'/')
            .filter(|e| !e.is_empty())
            .collect::<Vec<&[u8]>>();
        segs.pop();
        if !segs.is_empty() {
            segs.push(b"");
        }
        segs.insert(0, b"");
        DavPath {
            prefix: self.prefix.clone(),
            path: segs.join(&b'/').to_vec(),
        }
    }

    /// The filename is the last segment of the path. Can be empty.
    pub(crate) fn file_name(&self) -> &[u8] {
        self.segments().next_back().unwrap_or(b"")
    }

    /// iterate over the non-empty path segments.
    pub(crate) fn segments(&self) -> impl DoubleEndedIterator<Item = &[u8]> {
        self.path.split(|&c| c == b'/').filter(|e| !e.is_empty())
    }

    /// Add a segment to the end of the path.
    pub(crate) fn push_segment(&mut self, b: &[u8]) {
        if !self.is_collection() {
            self.path.push(b'/');
        }
        self.path.extend_from_slice(b);
    }

    pub(crate) fn get_mime_type_str(&self) -> &'static str {
        let name = self.file_name();
        let d = name.rsplitn(2, |&c| c == b'.').collect::<Vec<&[u8]>>();
        if d.len() > 1 {
            if let Ok(ext) = std::str::from_utf8(d[0]) {
                if let Some(t) = mime_guess::from_ext(ext).first_raw() {
                    return t;
                }
            }
        }
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<DavPath, ParseError> {
        DavPath::from_str(s, "")
    }

    #[test]
    fn normalizes_dots_and_slashes() {
        assert_eq!(parse("/a//b/./c").unwrap().as_url_string(), "/a/b/c");
        assert_eq!(parse("/a/b/").unwrap().as_url_string(), "/a/b/");
        assert!(parse("/a/b/").unwrap().is_collection());
        assert!(!parse("/a/b").unwrap().is_collection());
    }

    #[test]
    fn rejects_traversal() {
        assert!(parse("/a/../b").is_err());
        assert!(parse("/..").is_err());
        // encoded dotdot must not sneak through as a literal segment
        assert!(parse("/%2e%2e/etc").is_err());
        assert!(parse("/a/%2E%2E").is_err());
        // encoded slash or NUL inside a segment
        assert!(parse("/a%2fb").is_err());
        assert!(parse("/a%00b").is_err());
    }

    #[test]
    fn rejects_schemes_and_fragments() {
        assert!(parse("http://host/a").is_err());
        assert!(parse("/a#frag").is_err());
        assert_eq!(parse("/a?query=1").unwrap().as_url_string(), "/a");
    }

    #[test]
    fn prefix_is_stripped() {
        let p = DavPath::from_str("/dav/a/b", "/dav").unwrap();
        assert_eq!(p.as_url_string(), "/a/b");
        assert_eq!(p.as_url_string_with_prefix(), "/dav/a/b");
        assert!(DavPath::from_str("/other/a", "/dav").is_err());
    }

    #[test]
    fn parent_and_file_name() {
        let p = parse("/a/b/c").unwrap();
        assert_eq!(p.parent().as_url_string(), "/a/b/");
        assert_eq!(p.file_name(), b"c");
        assert_eq!(parse("/").unwrap().file_name(), b"");
    }

    #[test]
    fn percent_decoding_roundtrip() {
        let p = parse("/a%20b/c%26d").unwrap();
        assert_eq!(p.as_bytes(), b"/a b/c&d");
        assert_eq!(p.as_url_string(), "/a%20b/c%26d");
    }
}
