//! Generic XML element tree and the typed codec traits built on it.
//!
//! Parsing uses quick-xml's namespace-aware reader, which never expands
//! external entities.

use crate::error::{Result, SoapError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::escape::escape;
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use std::borrow::Cow;
use std::io::{BufRead, Write};
use std::str::FromStr;

/// A raw attribute, as written in the document (`xmlns` declarations included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Qualified key, e.g. `wsu:Id`
    pub key: String,
    /// Unescaped value
    pub value: String,
}

/// A child of an [`Element`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An XML element with its subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Namespace prefix as written
    pub prefix: Option<String>,
    /// Local name
    pub name: String,
    /// Resolved namespace URI
    pub namespace: Option<String>,
    /// Attributes in document order
    pub attributes: Vec<Attribute>,
    /// Child nodes in document order
    pub children: Vec<Node>,
}

impl Element {
    /// Create an element without namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the default namespace, declaring it with `xmlns`.
    pub fn with_default_namespace(mut self, uri: &str) -> Self {
        self.set_attr("xmlns", uri);
        self.namespace = Some(uri.to_string());
        self
    }

    /// Set the prefix and the namespace it stands for. The prefix is not declared.
    pub fn with_prefix(mut self, prefix: &str, uri: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self.namespace = Some(uri.to_string());
        self
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Set an attribute, replacing an existing one with the same key in place.
    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|a| a.key == key) {
            Some(attr) => attr.value = value,
            None => self.attributes.push(Attribute {
                key: key.to_string(),
                value,
            }),
        }
    }

    pub fn remove_attr(&mut self, key: &str) -> Option<String> {
        let idx = self.attributes.iter().position(|a| a.key == key)?;
        Some(self.attributes.remove(idx).value)
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }

    /// Parse an attribute value. A missing attribute is `Ok(None)`; a value that
    /// fails to parse returns the parser's own error.
    pub fn parse_attr<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        SoapError: From<T::Err>,
    {
        match self.attr(key) {
            Some(raw) => Ok(Some(raw.trim().parse::<T>()?)),
            None => Ok(None),
        }
    }

    /// `prefix:name`, or just `name`.
    pub fn qualified_name(&self) -> Cow<'_, str> {
        match &self.prefix {
            Some(prefix) => Cow::Owned(format!("{}:{}", prefix, self.name)),
            None => Cow::Borrowed(&self.name),
        }
    }

    /// Child elements, skipping text.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// First child element with the given local name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |e| e.name == name)
    }

    /// Concatenated character data of the direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Text of the first child element with the given local name.
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).map(Element::text)
    }

    /// Parse the text of a child element. Missing child is `Ok(None)`.
    pub fn parse_child<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        SoapError: From<T::Err>,
    {
        match self.child(name) {
            Some(child) => Ok(Some(child.text().trim().parse::<T>()?)),
            None => Ok(None),
        }
    }

    /// Fail unless this element has the given local name.
    pub fn expect_name(&self, name: &str) -> Result<()> {
        if self.name == name {
            Ok(())
        } else {
            Err(SoapError::UnexpectedElement {
                expected: name.to_string(),
                found: self.qualified_name().into_owned(),
            })
        }
    }

    /// Parse a document and return its root element.
    pub fn parse<R: BufRead>(reader: R) -> Result<Element> {
        let mut reader = NsReader::from_reader(reader);
        let mut buf = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let (resolved, event) = reader.read_resolved_event_into(&mut buf)?;
            let namespace = resolved_namespace(resolved);

            match event {
                Event::Start(ref e) => {
                    stack.push(Element::from_start(e, namespace)?);
                }
                Event::Empty(ref e) => {
                    let element = Element::from_start(e, namespace)?;
                    attach(element, &mut stack, &mut root);
                }
                Event::End(_) => {
                    // quick-xml has already matched the end tag against the open one
                    if let Some(element) = stack.pop() {
                        attach(element, &mut stack, &mut root);
                    }
                }
                Event::Text(ref t) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Text(t.unescape()?.into_owned()));
                    }
                }
                Event::CData(ref c) => {
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .children
                            .push(Node::Text(String::from_utf8_lossy(c).into_owned()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }

            buf.clear();
        }

        if let Some(open) = stack.pop() {
            return Err(SoapError::UnexpectedEof(open.qualified_name().into_owned()));
        }

        root.ok_or(SoapError::EmptyDocument)
    }

    /// Parse a document held in memory.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Element> {
        Self::parse(bytes)
    }

    fn from_start(start: &BytesStart<'_>, namespace: Option<String>) -> Result<Element> {
        let qname = start.name();
        let prefix = match qname.prefix() {
            Some(p) => Some(String::from_utf8(p.as_ref().to_vec())?),
            None => None,
        };
        let name = String::from_utf8(qname.local_name().as_ref().to_vec())?;

        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            attributes.push(Attribute {
                key: String::from_utf8(attr.key.as_ref().to_vec())?,
                value: attr.unescape_value()?.into_owned(),
            });
        }

        Ok(Element {
            prefix,
            name,
            namespace,
            attributes,
            children: Vec::new(),
        })
    }

    /// Serialize this element. Empty elements are written with an explicit end tag.
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> std::io::Result<()> {
        let qname = self.qualified_name();
        write!(out, "<{}", qname)?;
        for attr in &self.attributes {
            write!(out, " {}=\"{}\"", attr.key, escape(attr.value.as_str()))?;
        }
        out.write_all(b">")?;

        for child in &self.children {
            match child {
                Node::Element(e) => e.write_to(out)?,
                Node::Text(t) => out.write_all(escape(t.as_str()).as_bytes())?,
            }
        }

        write!(out, "</{}>", qname)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut out);
        out
    }

    pub fn to_xml_string(&self) -> String {
        String::from_utf8_lossy(&self.to_bytes()).into_owned()
    }
}

fn resolved_namespace(resolved: ResolveResult<'_>) -> Option<String> {
    match resolved {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
        _ => None,
    }
}

fn attach(element: Element, stack: &mut [Element], root: &mut Option<Element>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

/// Types that can be written as a single XML element.
pub trait XmlEncode {
    fn to_element(&self) -> Element;
}

/// Types that can be populated in place from an XML element.
///
/// Destinations are allocated by the caller before decoding; the decoder only
/// fills them in.
pub trait XmlDecode {
    fn decode(&mut self, element: &Element) -> Result<()>;

    /// Decode one of several same-named sibling elements. Singular
    /// destinations keep the last one; sequences append a slot per call.
    fn decode_next(&mut self, element: &Element) -> Result<()> {
        self.decode(element)
    }
}

impl XmlEncode for Element {
    fn to_element(&self) -> Element {
        self.clone()
    }
}

impl XmlDecode for Element {
    fn decode(&mut self, element: &Element) -> Result<()> {
        *self = element.clone();
        Ok(())
    }
}

impl<T: XmlEncode + ?Sized> XmlEncode for Box<T> {
    fn to_element(&self) -> Element {
        (**self).to_element()
    }
}

impl<T: XmlEncode + ?Sized> XmlEncode for &T {
    fn to_element(&self) -> Element {
        (**self).to_element()
    }
}

impl<T: XmlDecode + Default> XmlDecode for Vec<T> {
    fn decode(&mut self, element: &Element) -> Result<()> {
        self.clear();
        self.decode_next(element)
    }

    fn decode_next(&mut self, element: &Element) -> Result<()> {
        let mut slot = T::default();
        slot.decode(element)?;
        self.push(slot);
        Ok(())
    }
}
