//! Namespace-preserving XML tree.
//!
//! quick-xml is a pull parser, so descriptors are read into a small owned tree
//! that the scrub and bubble passes can mutate in place. Every element and
//! attribute keeps its qualified name exactly as written in the source next to
//! the namespace URI it resolved to. Queries match on `(namespace, local name)`
//! while serialization writes the original qualified names back, so a document
//! that goes through [`Document::parse`] and [`Document::to_xml`] keeps the
//! prefixes it was written with.
//!
//! The prefix table ([`Namespaces`]) belongs to the [`Document`] rather than to
//! any process-wide registry, so two documents loaded side by side never see
//! each other's declarations.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::attributes::Attribute as RawAttribute;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::{QName as RawName, ResolveResult};
use quick_xml::reader::NsReader;
use quick_xml::Writer;

use crate::error::{Error, Result};

/// Namespace URI bound to the reserved `xmlns` prefix.
pub const XMLNS_NS: &str = "http://www.w3.org/2000/xmlns/";

/// A namespace-qualified name used to look up elements and attributes.
///
/// An empty `namespace` matches names that are not in any namespace, which is
/// how unprefixed attributes such as `networkName` are addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QName {
    pub namespace: &'static str,
    pub local: &'static str,
}

impl QName {
    /// Create a name in the given namespace.
    pub const fn new(namespace: &'static str, local: &'static str) -> Self {
        Self { namespace, local }
    }

    /// Create a name that belongs to no namespace.
    pub const fn unqualified(local: &'static str) -> Self {
        Self {
            namespace: "",
            local,
        }
    }
}

/// Prefix to namespace URI bindings declared anywhere in a document.
///
/// The default namespace is stored under the empty prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespaces {
    prefixes: BTreeMap<String, String>,
}

impl Namespaces {
    /// Look up the URI bound to `prefix` (`""` for the default namespace).
    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    /// Iterate over `(prefix, uri)` pairs in prefix order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefixes.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// Find a non-empty prefix bound to `uri`.
    pub fn named_prefix(&self, uri: &str) -> Option<&str> {
        self.prefixes
            .iter()
            .find(|(prefix, bound)| !prefix.is_empty() && bound.as_str() == uri)
            .map(|(prefix, _)| prefix.as_str())
    }

    fn declare(&mut self, prefix: &str, uri: &str) {
        self.prefixes.insert(prefix.to_string(), uri.to_string());
    }

    /// Qualified element name for `name` using the prefixes of this document.
    fn qualify_element(&self, name: QName) -> Result<String> {
        if name.namespace.is_empty() {
            return Ok(name.local.to_string());
        }
        if let Some(prefix) = self.named_prefix(name.namespace) {
            return Ok(format!("{}:{}", prefix, name.local));
        }
        if self.get("") == Some(name.namespace) {
            return Ok(name.local.to_string());
        }
        Err(Error::xml(format!(
            "namespace '{}' is not declared in the document",
            name.namespace
        )))
    }

    /// Qualified attribute name; unprefixed attributes have no namespace, so a
    /// named prefix is required for anything namespaced.
    fn qualify_attribute(&self, name: QName) -> Result<String> {
        if name.namespace.is_empty() {
            return Ok(name.local.to_string());
        }
        self.named_prefix(name.namespace)
            .map(|prefix| format!("{}:{}", prefix, name.local))
            .ok_or_else(|| {
                Error::xml(format!(
                    "no prefix declared for namespace '{}'",
                    name.namespace
                ))
            })
    }

    /// Create an empty element named with this document's prefixes.
    pub fn element(&self, name: QName) -> Result<Element> {
        Ok(Element {
            name: self.qualify_element(name)?,
            namespace: (!name.namespace.is_empty()).then(|| name.namespace.to_string()),
            local: name.local.to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
        })
    }
}

/// An attribute with its source spelling and resolved namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Qualified name as written, e.g. `ovf:id`.
    pub name: String,
    pub namespace: Option<String>,
    pub local: String,
    /// Unescaped value.
    pub value: String,
}

impl Attribute {
    fn matches(&self, name: QName) -> bool {
        self.local == name.local && self.namespace.as_deref().unwrap_or("") == name.namespace
    }
}

/// A node in the element tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Unescaped character data.
    Text(String),
    CData(String),
    /// Raw comment body.
    Comment(String),
    /// Raw doctype body.
    DocType(String),
}

/// An XML element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written, e.g. `ovf:VirtualSystem`.
    pub name: String,
    pub namespace: Option<String>,
    pub local: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
}

impl Element {
    /// Whether this element has the given qualified name.
    pub fn is(&self, name: QName) -> bool {
        self.local == name.local && self.namespace.as_deref().unwrap_or("") == name.namespace
    }

    /// Value of the attribute `name`, if present.
    pub fn attr(&self, name: QName) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.matches(name))
            .map(|a| a.value.as_str())
    }

    /// Overwrite an existing attribute, returning its previous value.
    ///
    /// Does nothing and returns `None` when the attribute is absent.
    pub fn replace_attr(&mut self, name: QName, value: &str) -> Option<String> {
        self.attributes
            .iter_mut()
            .find(|a| a.matches(name))
            .map(|a| std::mem::replace(&mut a.value, value.to_string()))
    }

    /// Set an attribute, adding it with a prefix from `namespaces` if absent.
    pub fn set_attr(
        &mut self,
        namespaces: &Namespaces,
        name: QName,
        value: &str,
    ) -> Result<Option<String>> {
        if let Some(previous) = self.replace_attr(name, value) {
            return Ok(Some(previous));
        }
        self.attributes.push(Attribute {
            name: namespaces.qualify_attribute(name)?,
            namespace: (!name.namespace.is_empty()).then(|| name.namespace.to_string()),
            local: name.local.to_string(),
            value: value.to_string(),
        });
        Ok(None)
    }

    /// Concatenated text of the direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) | Node::CData(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Replace the direct text children with `text`.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children
            .retain(|node| !matches!(node, Node::Text(_) | Node::CData(_)));
        self.children.insert(0, Node::Text(text.into()));
    }

    /// Child elements.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Child elements, mutably.
    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// First child element named `name`.
    pub fn find(&self, name: QName) -> Option<&Element> {
        self.elements().find(|e| e.is(name))
    }

    /// Child elements named `name`.
    pub fn find_all(&self, name: QName) -> impl Iterator<Item = &Element> {
        self.elements().filter(move |e| e.is(name))
    }

    /// Child elements named `name`, mutably.
    pub fn find_all_mut(&mut self, name: QName) -> impl Iterator<Item = &mut Element> {
        self.elements_mut().filter(move |e| e.is(name))
    }

    /// All descendants named `name`, in document order.
    pub fn descendants(&self, name: QName) -> Vec<&Element> {
        let mut found = Vec::new();
        self.collect_descendants(name, &mut found);
        found
    }

    fn collect_descendants<'a>(&'a self, name: QName, found: &mut Vec<&'a Element>) {
        for child in self.elements() {
            if child.is(name) {
                found.push(child);
            }
            child.collect_descendants(name, found);
        }
    }

    /// Call `visit` on every descendant named `name`.
    ///
    /// Matching elements are handed to `visit` whole; their own subtrees are
    /// not searched again.
    pub fn visit_mut(&mut self, name: QName, visit: &mut dyn FnMut(&mut Element)) {
        for child in self.elements_mut() {
            if child.is(name) {
                visit(child);
            } else {
                child.visit_mut(name, visit);
            }
        }
    }

    /// Remove every child element named `name`, returning how many went.
    pub fn remove_all(&mut self, name: QName) -> usize {
        let before = self.children.len();
        self.children
            .retain(|node| !matches!(node, Node::Element(e) if e.is(name)));
        before - self.children.len()
    }

    /// Append a child element.
    pub fn push(&mut self, element: Element) {
        self.children.push(Node::Element(element));
    }
}

/// A parsed XML document together with its namespace declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    prolog: Vec<Node>,
    pub root: Element,
    pub namespaces: Namespaces,
}

/// Read and parse the XML document at `path`.
pub fn load(path: &Path) -> Result<Document> {
    let content = fs::read_to_string(path).map_err(|e| Error::io(e, path))?;
    Document::parse(&content)
}

impl Document {
    /// Parse a document, recording every namespace declaration it contains.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = NsReader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut namespaces = Namespaces::default();
        let mut prolog = Vec::new();
        let mut open: Vec<Element> = Vec::new();
        let mut root = None;

        loop {
            let event = reader.read_event().map_err(|e| {
                Error::xml(format!("at byte {}: {}", reader.buffer_position(), e))
            })?;
            match event {
                Event::Start(start) => {
                    open.push(element_from(&reader, &start, &mut namespaces)?);
                }
                Event::Empty(start) => {
                    let element = element_from(&reader, &start, &mut namespaces)?;
                    attach(&mut open, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = open
                        .pop()
                        .ok_or_else(|| Error::xml("closing tag without an open element"))?;
                    attach(&mut open, &mut root, element)?;
                }
                Event::Text(text) => {
                    if let Some(parent) = open.last_mut() {
                        let text = text.unescape().map_err(|e| Error::xml(e.to_string()))?;
                        parent.children.push(Node::Text(text.into_owned()));
                    }
                }
                Event::CData(data) => {
                    if let Some(parent) = open.last_mut() {
                        let data = String::from_utf8_lossy(&data.into_inner()).into_owned();
                        parent.children.push(Node::CData(data));
                    }
                }
                Event::Comment(comment) => {
                    let comment = Node::Comment(String::from_utf8_lossy(&comment).into_owned());
                    match open.last_mut() {
                        Some(parent) => parent.children.push(comment),
                        None if root.is_none() => prolog.push(comment),
                        None => {}
                    }
                }
                Event::DocType(doctype) => {
                    prolog.push(Node::DocType(
                        String::from_utf8_lossy(&doctype).into_owned(),
                    ));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(unclosed) = open.last() {
            return Err(Error::xml(format!("element '{}' is never closed", unclosed.name)));
        }
        let root = root.ok_or_else(|| Error::xml("document has no root element"))?;

        Ok(Self {
            prolog,
            root,
            namespaces,
        })
    }

    /// Declare `prefix` for `uri` on the root element unless some named prefix
    /// is already bound to it.
    pub fn ensure_namespace(&mut self, prefix: &str, uri: &str) {
        if self.namespaces.named_prefix(uri).is_some() {
            return;
        }
        self.root.attributes.push(Attribute {
            name: format!("xmlns:{prefix}"),
            namespace: Some(XMLNS_NS.to_string()),
            local: prefix.to_string(),
            value: uri.to_string(),
        });
        self.namespaces.declare(prefix, uri);
    }

    /// Serialize the document, UTF-8 with an XML declaration.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        emit(
            &mut writer,
            Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
        )?;
        writer.get_mut().push(b'\n');
        for node in &self.prolog {
            write_node(&mut writer, node)?;
            writer.get_mut().push(b'\n');
        }
        write_element(&mut writer, &self.root)?;
        writer.get_mut().push(b'\n');
        String::from_utf8(writer.into_inner()).map_err(|e| Error::xml(e.to_string()))
    }

    /// Serialize the document to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let xml = self.to_xml()?;
        fs::write(path, xml).map_err(|e| Error::io(e, path))
    }
}

fn element_from(
    reader: &NsReader<&[u8]>,
    start: &BytesStart<'_>,
    namespaces: &mut Namespaces,
) -> Result<Element> {
    let (resolved, local) = reader.resolve_element(start.name());
    let mut element = Element {
        name: decode(start.name().as_ref()),
        namespace: bound_namespace(resolved),
        local: decode(local.as_ref()),
        attributes: Vec::new(),
        children: Vec::new(),
    };

    for attr in start.attributes() {
        let attr = attr.map_err(|e| Error::xml(e.to_string()))?;
        let name = decode(attr.key.as_ref());
        let value = attr
            .unescape_value()
            .map_err(|e| Error::xml(e.to_string()))?
            .into_owned();

        if name == "xmlns" {
            namespaces.declare("", &value);
        } else if let Some(prefix) = name.strip_prefix("xmlns:") {
            namespaces.declare(prefix, &value);
        }

        let (resolved, local) = reader.resolve_attribute(attr.key);
        element.attributes.push(Attribute {
            namespace: bound_namespace(resolved),
            local: decode(local.as_ref()),
            name,
            value,
        });
    }

    Ok(element)
}

fn attach(open: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match open.last_mut() {
        Some(parent) => parent.push(element),
        None if root.is_none() => *root = Some(element),
        None => {
            return Err(Error::xml(format!(
                "second root element '{}'",
                element.name
            )))
        }
    }
    Ok(())
}

fn bound_namespace(resolved: ResolveResult<'_>) -> Option<String> {
    match resolved {
        ResolveResult::Bound(namespace) => Some(decode(namespace.0)),
        _ => None,
    }
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| Error::xml(e.to_string()))
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for attr in &element.attributes {
        start.push_attribute(RawAttribute {
            key: RawName(attr.name.as_bytes()),
            value: Cow::Owned(escape_attribute(&attr.value).into_bytes()),
        });
    }

    if element.children.is_empty() {
        return emit(writer, Event::Empty(start));
    }

    emit(writer, Event::Start(start))?;
    for child in &element.children {
        write_node(writer, child)?;
    }
    emit(writer, Event::End(BytesEnd::new(element.name.as_str())))
}

/// Escape an attribute value, keeping whitespace characters as character
/// references so attribute-value normalization does not turn them into spaces.
fn escape_attribute(value: &str) -> String {
    escape(value)
        .replace('\n', "&#10;")
        .replace('\r', "&#13;")
        .replace('\t', "&#9;")
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &Node) -> Result<()> {
    match node {
        Node::Element(element) => write_element(writer, element),
        Node::Text(text) => emit(
            writer,
            Event::Text(BytesText::from_escaped(partial_escape(text.as_str()))),
        ),
        Node::CData(data) => emit(writer, Event::CData(BytesCData::new(data.as_str()))),
        Node::Comment(comment) => emit(
            writer,
            Event::Comment(BytesText::from_escaped(comment.as_str())),
        ),
        Node::DocType(doctype) => emit(
            writer,
            Event::DocType(BytesText::from_escaped(doctype.as_str())),
        ),
    }
}
