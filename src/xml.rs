//! A small owned XML tree for WordprocessingML and OMML.
//!
//! Built from `quick_xml` namespace-resolved events so that `w:` and `m:`
//! elements are told apart by namespace URI rather than by prefix text.

use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

pub const WORD_NS: &[u8] = b"http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const MATH_NS: &[u8] = b"http://schemas.openxmlformats.org/officeDocument/2006/math";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ns {
    Word,
    Math,
    Other,
}

impl Ns {
    fn classify(resolved: &ResolveResult) -> Ns {
        match resolved {
            ResolveResult::Bound(ns) if ns.0 == WORD_NS => Ns::Word,
            ResolveResult::Bound(ns) if ns.0 == MATH_NS => Ns::Math,
            _ => Ns::Other,
        }
    }
}

#[derive(Debug, Clone)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct XmlElement {
    pub ns: Ns,
    pub name: String,
    /// Attributes keyed by local name.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn is(&self, ns: Ns, name: &str) -> bool {
        self.ns == ns && self.name == name
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    pub fn child(&self, ns: Ns, name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.is(ns, name))
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Concatenated character data of this subtree.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }
}

fn collect_text(el: &XmlElement, out: &mut String) {
    for child in &el.children {
        match child {
            XmlNode::Text(t) => out.push_str(t),
            XmlNode::Element(e) => collect_text(e, out),
        }
    }
}

/// Parse a document into its root element.
pub fn parse(xml: &[u8]) -> Result<XmlElement, String> {
    let mut reader = NsReader::from_reader(xml);
    let mut buf = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let (resolved, event) = reader
            .read_resolved_event_into(&mut buf)
            .map_err(|e| e.to_string())?;
        let ns = Ns::classify(&resolved);
        match event {
            Event::Start(e) => {
                stack.push(open_element(ns, &e)?);
            }
            Event::Empty(e) => {
                let el = open_element(ns, &e)?;
                attach(&mut stack, &mut root, el);
            }
            Event::End(_) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| "unbalanced closing tag".to_string())?;
                attach(&mut stack, &mut root, el);
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    let text = t.unescape().map_err(|e| e.to_string())?;
                    top.children.push(XmlNode::Text(text.into_owned()));
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    top.children.push(XmlNode::Text(text));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err("unexpected end of document".to_string());
    }
    root.ok_or_else(|| "document has no root element".to_string())
}

fn open_element(ns: Ns, e: &quick_xml::events::BytesStart) -> Result<XmlElement, String> {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
        attrs.push((key, value));
    }
    Ok(XmlElement {
        ns,
        name,
        attrs,
        children: Vec::new(),
    })
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, el: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(el)),
        None => *root = Some(el),
    }
}
