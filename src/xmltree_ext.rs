//! Small extension trait so that building a DAV XML document out of
//! `xmltree::Element`s reads naturally, plus the event-writer glue to
//! serialize one. Emitter configuration is passed per call, there is no
//! process-wide parser/writer state.
use std::borrow::Cow;
use std::io::{Read, Write};

use xml::common::XmlVersion;
use xml::writer::EventWriter;
use xml::writer::XmlEvent as XmlWEvent;
use xml::EmitterConfig;
use xmltree::{Element, Namespace, XMLNode};

use crate::errors::{DavError, DavResult};

pub(crate) trait ElementExt {
    fn new2(e: &str) -> Self;
    fn new_text(e: &str, t: impl Into<String>) -> Self;
    fn text(self, t: impl Into<String>) -> Self;
    fn ns(self, prefix: &str, namespace: &str) -> Self;
    fn push(&mut self, e: Element);
    fn parse2<R: Read>(r: R) -> Result<Element, DavError>;
    fn write_ev<W: Write>(&self, emitter: &mut EventWriter<W>) -> xml::writer::Result<()>;
}

impl ElementExt for Element {
    // "D:foo" makes an element foo with prefix D.
    fn new2(n: &str) -> Element {
        match n.split_once(':') {
            None => Element::new(n),
            Some((pfx, name)) => {
                let mut e = Element::new(name);
                e.prefix = Some(pfx.to_string());
                e
            }
        }
    }

    fn new_text(n: &str, t: impl Into<String>) -> Element {
        Element::new2(n).text(t)
    }

    fn text(mut self, t: impl Into<String>) -> Element {
        self.children.push(XMLNode::Text(t.into()));
        self
    }

    fn ns(mut self, prefix: &str, namespace: &str) -> Element {
        let mut ns = self.namespaces.take().unwrap_or_else(Namespace::empty);
        ns.force_put(prefix.to_string(), namespace.to_string());
        self.namespaces = Some(ns);
        self
    }

    fn push(&mut self, e: Element) {
        self.children.push(XMLNode::Element(e));
    }

    fn parse2<R: Read>(r: R) -> Result<Element, DavError> {
        match Element::parse(r) {
            Ok(elem) => Ok(elem),
            Err(xmltree::ParseError::MalformedXml(_)) => Err(DavError::XmlReadError),
            Err(_) => Err(DavError::XmlReadError),
        }
    }

    fn write_ev<W: Write>(&self, emitter: &mut EventWriter<W>) -> xml::writer::Result<()> {
        use xml::attribute::Attribute;
        use xml::name::Name;

        let mut name = Name::local(&self.name);
        if let Some(ref ns) = self.namespace {
            name.namespace = Some(ns);
        }
        if let Some(ref p) = self.prefix {
            name.prefix = Some(p);
        }

        let mut attributes = Vec::with_capacity(self.attributes.len());
        for (k, v) in &self.attributes {
            attributes.push(Attribute {
                name: Name::local(k),
                value: v,
            });
        }

        let empty_ns = Namespace::empty();
        let namespace = match self.namespaces {
            Some(ref ns) => Cow::Borrowed(ns),
            None => Cow::Borrowed(&empty_ns),
        };

        emitter.write(XmlWEvent::StartElement {
            name,
            attributes: Cow::Owned(attributes),
            namespace,
        })?;
        for node in &self.children {
            match node {
                XMLNode::Element(elem) => elem.write_ev(emitter)?,
                XMLNode::Text(t) => emitter.write(XmlWEvent::Characters(t))?,
                _ => {}
            }
        }
        emitter.write(XmlWEvent::EndElement { name: Some(name) })
    }
}

// Serialize a document: XML declaration plus the root element.
pub(crate) fn render(root: &Element, config: EmitterConfig) -> DavResult<Vec<u8>> {
    let mut emitter = EventWriter::new_with_config(Vec::new(), config);
    emitter.write(XmlWEvent::StartDocument {
        version: XmlVersion::Version10,
        encoding: Some("utf-8"),
        standalone: None,
    })?;
    root.write_ev(&mut emitter)?;
    Ok(emitter.into_inner())
}

// The config used for multistatus bodies. Empty elements are written
// out in full; some desktop clients choke on <D:resourcetype/>.
pub(crate) fn multistatus_config() -> EmitterConfig {
    EmitterConfig {
        normalize_empty_elements: false,
        perform_indent: false,
        ..Default::default()
    }
}
