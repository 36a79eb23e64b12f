use std::io::Cursor;
use std::time::Duration;

use headers::HeaderMapExt;
use http::StatusCode as SC;
use http::{Request, Response};
use log::debug;
use xmltree::Element;

use crate::body::Body;
use crate::davheaders::{self, Depth};
use crate::davpath::DavPath;
use crate::errors::{DavError, DavResult};
use crate::locks::{DavLock, LockTable};
use crate::xmltree_ext::{self, ElementExt};

// Exclusive locks never live longer than this; clients asking for more
// (or for Infinite) get this and are expected to refresh.
const MAX_TIMEOUT: Duration = Duration::from_secs(600);

impl crate::DavInner {
    pub(crate) async fn handle_lock(
        &self,
        req: &Request<()>,
        xmldata: &[u8],
    ) -> DavResult<Response<Body>> {
        let mut res = Response::new(Body::empty());

        // path and meta.
        let mut path = self.path(req);
        let resolved = self.resolver.resolve(&path).await?;
        if !self.policy.path_allowed(&path, resolved.is_collection()) {
            return Err(DavError::Forbidden);
        }
        self.fixpath(&mut res, &mut path, &resolved);

        let timeout = match req.headers().typed_get::<davheaders::Timeout>() {
            Some(t) => t.duration_or(MAX_TIMEOUT),
            None => MAX_TIMEOUT,
        };

        // an empty body means this is a refresh of an existing lock,
        // identified by the token in the If header.
        if xmldata.is_empty() {
            let tokens = self.submitted_tokens(req);
            if tokens.len() != 1 {
                return Err(DavError::Status(SC::BAD_REQUEST));
            }
            let lock = match self.locks.refresh(&tokens[0], timeout) {
                Ok(lock) => lock,
                // unknown or expired; expired locks are not refreshable.
                Err(()) => return Err(DavError::PreconditionFailed),
            };

            let prop = build_lock_prop(&lock, true);
            let buffer = xmltree_ext::render(&prop, Default::default())?;
            let ct = "application/xml; charset=utf-8".to_owned();
            res.headers_mut().typed_insert(davheaders::ContentType(ct));
            *res.body_mut() = Body::from(buffer);
            return Ok(res);
        }

        // handle Depth. The mac client locks individual files and leaves
        // the header off; everyone else gets the RFC default (infinity).
        let deep = match req.headers().typed_get::<Depth>() {
            Some(Depth::Zero) => false,
            Some(Depth::Infinity) => true,
            None => !self.mac_client,
            _ => return Err(DavError::Status(SC::BAD_REQUEST)),
        };

        // parse the lockinfo body.
        let tree = Element::parse2(Cursor::new(xmldata))?;
        if tree.name != "lockinfo" {
            return Err(DavError::XmlParseError);
        }

        let mut exclusive = false;
        let mut locktype = false;
        let mut owner: Option<Element> = None;
        for elem in tree.children.iter().filter_map(|n| n.as_element()) {
            let first_child = elem.children.iter().filter_map(|n| n.as_element()).next();
            match elem.name.as_str() {
                "lockscope" => match first_child.map(|e| e.name.as_str()) {
                    Some("exclusive") => exclusive = true,
                    // only exclusive locks exist here.
                    Some("shared") => return Err(DavError::Forbidden),
                    _ => return Err(DavError::XmlParseError),
                },
                "locktype" => match first_child.map(|e| e.name.as_str()) {
                    Some("write") => locktype = true,
                    _ => return Err(DavError::XmlParseError),
                },
                "owner" => {
                    let mut o = elem.clone();
                    o.prefix = Some("D".to_owned());
                    owner = Some(o);
                }
                _ => return Err(DavError::XmlParseError),
            }
        }
        if !exclusive || !locktype {
            return Err(DavError::XmlParseError);
        }

        // create the lock.
        let lock = match self.locks.acquire(&path, deep, owner, timeout) {
            Ok(lock) => lock,
            Err(_conflict) => return Err(DavError::Locked),
        };

        // Locking an unmapped resource creates an empty file (the mac
        // client LOCKs before the PUT that fills it in).
        if !resolved.exists() {
            if let Err(e) = tokio::fs::File::create(&resolved.fullpath).await {
                debug!("lock: cannot create {}: {}", path, e);
                let _ = self.locks.release(&path, &lock.token);
                let err = match e.kind() {
                    std::io::ErrorKind::NotFound => DavError::Conflict,
                    _ => e.into(),
                };
                return Err(err);
            }
        }

        let lt = format!("<{}>", lock.token);
        let ct = "application/xml; charset=utf-8".to_owned();
        res.headers_mut().typed_insert(davheaders::LockToken(lt));
        res.headers_mut().typed_insert(davheaders::ContentType(ct));
        *res.status_mut() = if resolved.exists() { SC::OK } else { SC::CREATED };

        let prop = build_lock_prop(&lock, true);
        let buffer = xmltree_ext::render(&prop, Default::default())?;
        *res.body_mut() = Body::from(buffer);
        Ok(res)
    }

    pub(crate) async fn handle_unlock(&self, req: &Request<()>) -> DavResult<Response<Body>> {
        // must have a Lock-Token header.
        let t = req
            .headers()
            .typed_get::<davheaders::LockToken>()
            .ok_or(DavError::Status(SC::BAD_REQUEST))?;
        let token = t.0.trim_matches(|c| c == '<' || c == '>');

        let mut res = Response::new(Body::empty());
        let mut path = self.path(req);
        if let Ok(resolved) = self.resolver.resolve(&path).await {
            self.fixpath(&mut res, &mut path, &resolved);
        }

        match self.locks.release(&path, token) {
            Ok(()) => {
                *res.status_mut() = SC::NO_CONTENT;
                Ok(res)
            }
            Err(()) => Err(DavError::Conflict),
        }
    }
}

pub(crate) fn list_lockdiscovery(locks: &LockTable, path: &DavPath) -> Element {
    let mut elem = Element::new2("D:lockdiscovery");
    if let Some(lock) = locks.discover(path) {
        elem.push(build_lock_prop(&lock, false));
    }
    elem
}

pub(crate) fn list_supportedlock() -> Element {
    let mut elem = Element::new2("D:supportedlock");
    let mut entry = Element::new2("D:lockentry");
    let mut scope = Element::new2("D:lockscope");
    scope.push(Element::new2("D:exclusive"));
    let mut ltype = Element::new2("D:locktype");
    ltype.push(Element::new2("D:write"));
    entry.push(scope);
    entry.push(ltype);
    elem.push(entry);
    elem
}

fn build_lock_prop(lock: &DavLock, full: bool) -> Element {
    let mut actlock = Element::new2("D:activelock");

    let mut elem = Element::new2("D:lockscope");
    elem.push(Element::new2("D:exclusive"));
    actlock.push(elem);

    let mut elem = Element::new2("D:locktype");
    elem.push(Element::new2("D:write"));
    actlock.push(elem);

    actlock.push(Element::new_text(
        "D:depth",
        if lock.deep { "Infinity" } else { "0" },
    ));
    actlock.push(Element::new_text(
        "D:timeout",
        format!("Second-{}", lock.timeout.as_secs()),
    ));

    let mut locktokenelem = Element::new2("D:locktoken");
    locktokenelem.push(Element::new_text("D:href", lock.token.clone()));
    actlock.push(locktokenelem);

    let mut lockroot = Element::new2("D:lockroot");
    lockroot.push(Element::new_text(
        "D:href",
        lock.path.as_url_string_with_prefix(),
    ));
    actlock.push(lockroot);

    if let Some(ref o) = lock.owner {
        actlock.push(o.clone());
    }

    if !full {
        return actlock;
    }

    let mut ldis = Element::new2("D:lockdiscovery");
    ldis.push(actlock);
    let mut prop = Element::new2("D:prop").ns("D", "DAV:");
    prop.push(ldis);
    prop
}
