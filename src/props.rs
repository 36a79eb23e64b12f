//! PROPFIND body parsing and multistatus generation.
//!
//! Only live, computed properties exist here; there is no dead-property
//! store. Unknown or unavailable properties requested by the client end
//! up in a 404 propstat block inside the multistatus, they never fail
//! the request.
use std::fs::Metadata;
use std::io::Cursor;

use xmltree::Element;

use crate::davpath::DavPath;
use crate::errors::{DavError, DavResult};
use crate::handle_lock::{list_lockdiscovery, list_supportedlock};
use crate::locks::LockTable;
use crate::util::{systemtime_to_httpdate, systemtime_to_rfc3339};
use crate::xmltree_ext::{self, ElementExt};

const NS_DAV_URI: &str = "DAV:";

// properties returned by <allprop/> or an empty body.
const ALLPROP: &[&str] = &[
    "resourcetype",
    "creationdate",
    "getlastmodified",
    "getcontentlength",
    "getcontenttype",
    "displayname",
];

// list returned by <propname/>.
const PROPNAME: &[&str] = &[
    "resourcetype",
    "creationdate",
    "getlastmodified",
    "getcontentlength",
    "getcontenttype",
    "displayname",
    "supportedlock",
    "lockdiscovery",
];

/// What the PROPFIND body asked for.
pub(crate) enum PropfindType {
    AllProp,
    PropName,
    // the requested property elements, verbatim.
    Prop(Vec<Element>),
}

pub(crate) fn parse_propfind(xmldata: &[u8]) -> DavResult<PropfindType> {
    if xmldata.is_empty() {
        return Ok(PropfindType::AllProp);
    }
    let tree = Element::parse2(Cursor::new(xmldata))?;
    if tree.name != "propfind" || tree.namespace.as_deref() != Some(NS_DAV_URI) {
        return Err(DavError::XmlParseError);
    }
    for elem in tree.children.iter().filter_map(|n| n.as_element()) {
        match elem.name.as_str() {
            "allprop" => return Ok(PropfindType::AllProp),
            "propname" => return Ok(PropfindType::PropName),
            "prop" => {
                let props = elem
                    .children
                    .iter()
                    .filter_map(|n| n.as_element())
                    .cloned()
                    .collect();
                return Ok(PropfindType::Prop(props));
            }
            _ => {}
        }
    }
    Err(DavError::XmlParseError)
}

/// Builds the multistatus document, one response entry per resource.
pub(crate) struct PropRenderer<'a> {
    reqtype: &'a PropfindType,
    locks: &'a LockTable,
    // class-2 properties are only rendered for the mac DAV client.
    mac_client: bool,
    multistatus: Element,
}

impl<'a> PropRenderer<'a> {
    pub fn new(reqtype: &'a PropfindType, locks: &'a LockTable, mac_client: bool) -> PropRenderer<'a> {
        PropRenderer {
            reqtype,
            locks,
            mac_client,
            multistatus: Element::new2("D:multistatus").ns("D", NS_DAV_URI),
        }
    }

    /// Add a response entry for one resource.
    pub fn add_resource(&mut self, path: &DavPath, meta: &Metadata) {
        let mut response = Element::new2("D:response");
        response.push(Element::new_text(
            "D:href",
            path.as_url_string_with_prefix(),
        ));

        let (found, notfound) = match self.reqtype {
            PropfindType::PropName => (self.propname(), Vec::new()),
            PropfindType::AllProp => (self.allprop(path, meta), Vec::new()),
            PropfindType::Prop(requested) => self.requested(requested, path, meta),
        };

        response.push(propstat(found, http::StatusCode::OK));
        if !notfound.is_empty() {
            response.push(propstat(notfound, http::StatusCode::NOT_FOUND));
        }
        self.multistatus.push(response);
    }

    /// Serialize. The document is well-formed even with zero resources.
    pub fn into_body(self) -> DavResult<Vec<u8>> {
        xmltree_ext::render(&self.multistatus, xmltree_ext::multistatus_config())
    }

    fn propname(&self) -> Vec<Element> {
        PROPNAME
            .iter()
            .map(|name| Element::new2(&format!("D:{}", name)))
            .collect()
    }

    fn allprop(&self, path: &DavPath, meta: &Metadata) -> Vec<Element> {
        let mut v = Vec::new();
        for name in ALLPROP {
            if let Some(elem) = self.live_prop(name, path, meta) {
                v.push(elem);
            }
        }
        if self.mac_client {
            v.push(list_supportedlock());
            v.push(list_lockdiscovery(self.locks, path));
        }
        v
    }

    // split the requested props into found values and 404s.
    fn requested(
        &self,
        requested: &[Element],
        path: &DavPath,
        meta: &Metadata,
    ) -> (Vec<Element>, Vec<Element>) {
        let mut found = Vec::new();
        let mut notfound = Vec::new();
        for prop in requested {
            let elem = if prop.namespace.as_deref() == Some(NS_DAV_URI) {
                self.live_prop(&prop.name, path, meta)
            } else {
                None
            };
            match elem {
                Some(e) => found.push(e),
                None => {
                    // echo the name back, namespace and all, without value.
                    let mut e = Element::new(&prop.name);
                    e.prefix = prop.prefix.clone();
                    e.namespace = prop.namespace.clone();
                    e.namespaces = prop.namespaces.clone();
                    notfound.push(e);
                }
            }
        }
        (found, notfound)
    }

    fn live_prop(&self, name: &str, path: &DavPath, meta: &Metadata) -> Option<Element> {
        match name {
            "resourcetype" => {
                let mut elem = Element::new2("D:resourcetype");
                if meta.is_dir() {
                    elem.push(Element::new2("D:collection"));
                }
                Some(elem)
            }
            "creationdate" => {
                let time = meta.created().or_else(|_| meta.modified()).ok()?;
                Some(Element::new_text(
                    "D:creationdate",
                    systemtime_to_rfc3339(time),
                ))
            }
            "getlastmodified" => {
                let time = meta.modified().ok()?;
                Some(Element::new_text(
                    "D:getlastmodified",
                    systemtime_to_httpdate(time),
                ))
            }
            "getcontentlength" => {
                // omitted for collections.
                if meta.is_dir() {
                    return None;
                }
                Some(Element::new_text(
                    "D:getcontentlength",
                    meta.len().to_string(),
                ))
            }
            "getcontenttype" => {
                let ct = if meta.is_dir() {
                    "httpd/unix-directory"
                } else {
                    path.get_mime_type_str()
                };
                Some(Element::new_text("D:getcontenttype", ct))
            }
            "displayname" => {
                let name = String::from_utf8_lossy(path.file_name()).to_string();
                Some(Element::new_text("D:displayname", name))
            }
            "supportedlock" if self.mac_client => Some(list_supportedlock()),
            "lockdiscovery" if self.mac_client => Some(list_lockdiscovery(self.locks, path)),
            _ => None,
        }
    }
}

fn propstat(props: Vec<Element>, status: http::StatusCode) -> Element {
    let mut prop = Element::new2("D:prop");
    for p in props {
        prop.push(p);
    }
    let mut ps = Element::new2("D:propstat");
    ps.push(prop);
    ps.push(Element::new_text(
        "D:status",
        format!(
            "HTTP/1.1 {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        ),
    ));
    ps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_body_is_allprop() {
        assert!(matches!(parse_propfind(b"").unwrap(), PropfindType::AllProp));
    }

    #[test]
    fn parse_prop_list() {
        let body = br#"<?xml version="1.0"?>
            <D:propfind xmlns:D="DAV:">
              <D:prop><D:resourcetype/><D:getcontentlength/></D:prop>
            </D:propfind>"#;
        match parse_propfind(body).unwrap() {
            PropfindType::Prop(v) => {
                assert_eq!(v.len(), 2);
                assert_eq!(v[0].name, "resourcetype");
            }
            _ => panic!("expected Prop"),
        }
    }

    #[test]
    fn parse_propname() {
        let body = br#"<D:propfind xmlns:D="DAV:"><D:propname/></D:propfind>"#;
        assert!(matches!(
            parse_propfind(body).unwrap(),
            PropfindType::PropName
        ));
    }

    #[test]
    fn parse_rejects_other_roots() {
        let body = br#"<D:lockinfo xmlns:D="DAV:"></D:lockinfo>"#;
        assert!(parse_propfind(body).is_err());
    }
}
