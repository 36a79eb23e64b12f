//! Typed versions of the WebDAV request/response headers.
use std::time::Duration;

use headers::Header;
use http::header::{HeaderName, HeaderValue};

static DEPTH: HeaderName = HeaderName::from_static("depth");
static TIMEOUT: HeaderName = HeaderName::from_static("timeout");
static OVERWRITE: HeaderName = HeaderName::from_static("overwrite");
static DESTINATION: HeaderName = HeaderName::from_static("destination");
static IF: HeaderName = HeaderName::from_static("if");

// helper.
fn one<'i, I>(values: &mut I) -> Result<&'i HeaderValue, headers::Error>
where
    I: Iterator<Item = &'i HeaderValue>,
{
    let v = values.next().ok_or_else(invalid)?;
    if values.next().is_some() {
        Err(invalid())
    } else {
        Ok(v)
    }
}

// helper
fn invalid() -> headers::Error {
    headers::Error::invalid()
}

// helper
fn map_invalid(_e: impl std::error::Error) -> headers::Error {
    headers::Error::invalid()
}

macro_rules! header {
    ($tname:ident, $hname:ident, $sname:expr) => {
        static $hname: HeaderName = HeaderName::from_static($sname);

        #[derive(Debug, Clone, PartialEq)]
        pub struct $tname(pub String);

        impl Header for $tname {
            fn name() -> &'static HeaderName {
                &$hname
            }

            fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
            where
                I: Iterator<Item = &'i HeaderValue>,
            {
                one(values)?
                    .to_str()
                    .map(|x| $tname(x.to_owned()))
                    .map_err(map_invalid)
            }

            fn encode<E>(&self, values: &mut E)
            where
                E: Extend<HeaderValue>,
            {
                let value = HeaderValue::from_str(&self.0).unwrap();
                values.extend(std::iter::once(value))
            }
        }
    };
}

header!(ContentType, CONTENT_TYPE, "content-type");
header!(ContentLocation, CONTENT_LOCATION, "content-location");
header!(LockToken, LOCK_TOKEN, "lock-token");
header!(Dav, DAV, "dav");
header!(MSAuthorVia, MS_AUTHOR_VIA, "ms-author-via");

/// Depth: header.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl Header for Depth {
    fn name() -> &'static HeaderName {
        &DEPTH
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        match one(values)?.as_bytes() {
            b"0" => Ok(Depth::Zero),
            b"1" => Ok(Depth::One),
            b"infinity" | b"Infinity" => Ok(Depth::Infinity),
            _ => Err(invalid()),
        }
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let value = match *self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "Infinity",
        };
        values.extend(std::iter::once(HeaderValue::from_static(value)));
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DavTimeout {
    Seconds(u32),
    Infinite,
}

/// Timeout: header, a list of client wishes in order of preference.
#[derive(Debug, Clone)]
pub struct Timeout(pub Vec<DavTimeout>);

impl Header for Timeout {
    fn name() -> &'static HeaderName {
        &TIMEOUT
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = one(values)?;
        let mut v = Vec::new();
        let words = value.to_str().map_err(map_invalid)?.split(',');
        for word in words {
            let word = word.trim();
            let w = match word {
                "Infinite" => DavTimeout::Infinite,
                _ if word.starts_with("Second-") => match word[7..].parse::<u32>() {
                    Err(_) => return Err(invalid()),
                    Ok(n) => DavTimeout::Seconds(n),
                },
                _ => return Err(invalid()),
            };
            v.push(w);
        }
        Ok(Timeout(v))
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let value = self
            .0
            .iter()
            .map(|s| match *s {
                DavTimeout::Seconds(n) => format!("Second-{}", n),
                DavTimeout::Infinite => "Infinite".to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        values.extend(std::iter::once(HeaderValue::from_str(&value).unwrap()));
    }
}

impl Timeout {
    // turn the client's wish into a concrete duration, capped to `max`.
    pub(crate) fn duration_or(&self, max: Duration) -> Duration {
        match self.0.first() {
            Some(DavTimeout::Seconds(n)) => std::cmp::min(max, Duration::from_secs(*n as u64)),
            _ => max,
        }
    }
}

/// Destination: header. An absolute path, or an absolute URL of
/// which only the path is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct Destination(pub String);

impl Header for Destination {
    fn name() -> &'static HeaderName {
        &DESTINATION
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let s = one(values)?.to_str().map_err(map_invalid)?;
        if s.starts_with('/') {
            return Ok(Destination(s.to_string()));
        }
        let url = url::Url::parse(s).map_err(map_invalid)?;
        match url.scheme() {
            "http" | "https" => Ok(Destination(url.path().to_string())),
            _ => Err(invalid()),
        }
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        values.extend(std::iter::once(HeaderValue::from_str(&self.0).unwrap()));
    }
}

/// Overwrite: header ("T" or "F", default T).
#[derive(Debug, Clone, PartialEq)]
pub struct Overwrite(pub bool);

impl Header for Overwrite {
    fn name() -> &'static HeaderName {
        &OVERWRITE
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        match one(values)?.as_bytes() {
            b"F" => Ok(Overwrite(false)),
            b"T" => Ok(Overwrite(true)),
            _ => Err(invalid()),
        }
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let value = if self.0 { "T" } else { "F" };
        values.extend(std::iter::once(HeaderValue::from_static(value)));
    }
}

/// If: header, reduced to the part the lock table cares about: the
/// submitted state tokens. Resource tags, Not, and etag conditions
/// are skipped over, not evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct If(pub Vec<String>);

impl Header for If {
    fn name() -> &'static HeaderName {
        &IF
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let s = one(values)?.to_str().map_err(map_invalid)?;
        let mut tokens = Vec::new();
        let mut in_list = false;
        let mut rest = s;
        while let Some(i) = rest.find(['(', ')', '<', '[']) {
            let (c, tail) = (&rest[i..i + 1], &rest[i + 1..]);
            match c {
                "(" => {
                    in_list = true;
                    rest = tail;
                }
                ")" => {
                    in_list = false;
                    rest = tail;
                }
                "<" => {
                    let end = tail.find('>').ok_or_else(invalid)?;
                    if in_list {
                        tokens.push(tail[..end].to_string());
                    }
                    rest = &tail[end + 1..];
                }
                // "[etag]" condition, skip.
                _ => {
                    let end = tail.find(']').ok_or_else(invalid)?;
                    rest = &tail[end + 1..];
                }
            }
        }
        Ok(If(tokens))
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let value = format!(
            "({})",
            self.0
                .iter()
                .map(|t| format!("<{}>", t))
                .collect::<Vec<_>>()
                .join(" ")
        );
        values.extend(std::iter::once(HeaderValue::from_str(&value).unwrap()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode<H: Header>(s: &str) -> Result<H, headers::Error> {
        let v = HeaderValue::from_str(s).unwrap();
        let mut iter = std::iter::once(&v);
        H::decode(&mut iter)
    }

    #[test]
    fn depth() {
        assert_eq!(decode::<Depth>("0").unwrap(), Depth::Zero);
        assert_eq!(decode::<Depth>("1").unwrap(), Depth::One);
        assert_eq!(decode::<Depth>("infinity").unwrap(), Depth::Infinity);
        assert!(decode::<Depth>("2").is_err());
    }

    #[test]
    fn overwrite() {
        assert_eq!(decode::<Overwrite>("T").unwrap(), Overwrite(true));
        assert_eq!(decode::<Overwrite>("F").unwrap(), Overwrite(false));
        assert!(decode::<Overwrite>("X").is_err());
    }

    #[test]
    fn destination() {
        assert_eq!(decode::<Destination>("/a/b").unwrap().0, "/a/b");
        assert_eq!(
            decode::<Destination>("http://host:8080/a/b%20c").unwrap().0,
            "/a/b%20c"
        );
        assert!(decode::<Destination>("ftp://host/a").is_err());
    }

    #[test]
    fn timeout() {
        let t = decode::<Timeout>("Second-3600, Infinite").unwrap();
        assert_eq!(t.0, vec![DavTimeout::Seconds(3600), DavTimeout::Infinite]);
        assert_eq!(
            t.duration_or(Duration::from_secs(600)),
            Duration::from_secs(600)
        );
        let t = decode::<Timeout>("Second-120").unwrap();
        assert_eq!(
            t.duration_or(Duration::from_secs(600)),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn if_tokens() {
        let i = decode::<If>("(<urn:uuid:1234> [\"etag\"]) (Not <urn:uuid:5678>)").unwrap();
        assert_eq!(i.0, vec!["urn:uuid:1234", "urn:uuid:5678"]);
        // resource-tagged list: the tag itself is not a state token
        let i = decode::<If>("<http://host/file> (<urn:uuid:deadbeef>)").unwrap();
        assert_eq!(i.0, vec!["urn:uuid:deadbeef"]);
    }
}
