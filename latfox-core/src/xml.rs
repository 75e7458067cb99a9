//! Namespace-aware XML tree built on quick-xml events
//!
//! FOXML and the archived metadata records are small enough to hold in
//! memory, so documents are parsed into an owned element tree, mutated in
//! place and written back with a declaration. Text is kept verbatim;
//! indentation is only added where [`Element::strip_whitespace`] removed it.

use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;
use std::collections::HashMap;
use std::io::Write;

/// XML Schema instance namespace (`xsi:schemaLocation`)
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Namespace implicitly bound to the `xml` prefix
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// A node in an element's content
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
}

/// Attribute with its resolved namespace
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Qualified name as written (`xsi:schemaLocation`, `ID`, `xmlns:foxml`)
    pub name: String,
    /// Namespace of a prefixed attribute; unprefixed attributes have none
    pub namespace: Option<String>,
    /// Unescaped value
    pub value: String,
}

/// Element with its resolved namespace and ordered content
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Qualified name as written (`foxml:datastream`)
    pub name: String,
    pub namespace: Option<String>,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>, namespace: Option<&str>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.map(str::to_string),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Name without its prefix
    pub fn local_name(&self) -> &str {
        split_qname(&self.name).1
    }

    pub fn prefix(&self) -> Option<&str> {
        split_qname(&self.name).0
    }

    /// Whether this element is `{namespace}local`
    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.namespace.as_deref() == Some(namespace) && self.local_name() == local
    }

    /// Build a qualified name sharing this element's prefix
    pub fn sibling_name(&self, local: &str) -> String {
        match self.prefix() {
            Some(prefix) => format!("{}:{}", prefix, local),
            None => local.to_string(),
        }
    }

    /// Value of an unprefixed attribute
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Value of a namespaced attribute, whatever prefix it was written with
    pub fn attribute_ns(&self, namespace: &str, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.as_deref() == Some(namespace) && split_qname(&a.name).1 == local)
            .map(|a| a.value.as_str())
    }

    /// Set an unprefixed attribute, replacing any existing value in place
    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|a| a.namespace.is_none() && a.name == name)
        {
            Some(attr) => attr.value = value,
            None => self.attributes.push(Attribute {
                name: name.to_string(),
                namespace: None,
                value,
            }),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn push_element(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Insert `child` before all existing content
    pub fn prepend_element(&mut self, child: Element) {
        self.children.insert(0, Node::Element(child));
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Depth-first search including `self`
    pub fn find<F>(&self, pred: &F) -> Option<&Element>
    where
        F: Fn(&Element) -> bool,
    {
        if pred(self) {
            return Some(self);
        }
        self.child_elements().find_map(|c| c.find(pred))
    }

    pub fn find_mut<F>(&mut self, pred: &F) -> Option<&mut Element>
    where
        F: Fn(&Element) -> bool,
    {
        if pred(self) {
            return Some(self);
        }
        for child in &mut self.children {
            if let Node::Element(e) = child {
                if let Some(found) = e.find_mut(pred) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Parse a complete document and return its root element
    pub fn parse_str(xml: &str) -> Result<Element, XmlError> {
        parse_document(xml)
    }

    /// Drop whitespace-only text from elements in `namespace`.
    ///
    /// Only descends into children in the same namespace, so embedded
    /// content from other vocabularies keeps its text untouched.
    pub fn strip_whitespace(&mut self, namespace: &str) {
        if self.namespace.as_deref() != Some(namespace) {
            return;
        }
        self.children
            .retain(|n| !matches!(n, Node::Text(t) if t.trim().is_empty()));
        for child in &mut self.children {
            if let Node::Element(e) = child {
                e.strip_whitespace(namespace);
            }
        }
    }

    fn has_text(&self) -> bool {
        self.children
            .iter()
            .any(|n| matches!(n, Node::Text(_) | Node::CData(_)))
    }

    /// Serialize as a standalone document with a declaration.
    ///
    /// Elements in the root's namespace whose content is only markup are
    /// indented by two spaces per level; everything else is written exactly
    /// as held in the tree.
    pub fn to_document_string(&self) -> Result<String, XmlError> {
        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(ser)?;
        writer.get_mut().push(b'\n');
        let layout = Layout {
            namespace: self.namespace.as_deref(),
        };
        write_element(&mut writer, self, None, Some(0), &layout)?;

        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        String::from_utf8(bytes).map_err(ser)
    }
}

fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

/// In-scope prefix bindings; `""` is the default namespace and an empty
/// URI undeclares it.
struct Scopes {
    stack: Vec<HashMap<String, String>>,
}

impl Scopes {
    fn new() -> Self {
        Self { stack: Vec::new() }
    }

    fn resolve(&self, prefix: &str) -> Option<String> {
        if prefix == "xml" {
            return Some(XML_NS.to_string());
        }
        self.stack
            .iter()
            .rev()
            .find_map(|scope| scope.get(prefix))
            .filter(|uri| !uri.is_empty())
            .cloned()
    }
}

fn open_element(start: &BytesStart<'_>, scopes: &mut Scopes) -> Result<Element, XmlError> {
    let name = String::from_utf8(start.name().as_ref().to_vec())
        .map_err(|e| XmlError::Parse(e.to_string()))?;

    let mut raw = Vec::new();
    let mut bindings = HashMap::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Parse(e.to_string()))?;
        let key = String::from_utf8(attr.key.as_ref().to_vec())
            .map_err(|e| XmlError::Parse(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError::Parse(e.to_string()))?
            .into_owned();
        if key == "xmlns" {
            bindings.insert(String::new(), value.clone());
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            bindings.insert(prefix.to_string(), value.clone());
        }
        raw.push((key, value));
    }
    scopes.stack.push(bindings);

    let namespace = match split_qname(&name).0 {
        Some(prefix) => Some(scopes.resolve(prefix).ok_or_else(|| {
            XmlError::Parse(format!("undeclared namespace prefix '{}' on <{}>", prefix, name))
        })?),
        None => scopes.resolve(""),
    };

    let attributes = raw
        .into_iter()
        .map(|(key, value)| {
            let namespace = match split_qname(&key).0 {
                Some("xmlns") | None => None,
                Some(prefix) => scopes.resolve(prefix),
            };
            Attribute {
                name: key,
                namespace,
                value,
            }
        })
        .collect();

    Ok(Element {
        name,
        namespace,
        attributes,
        children: Vec::new(),
    })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, node: Node) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => match node {
            Node::Element(e) if root.is_none() => *root = Some(e),
            Node::Element(e) => {
                return Err(XmlError::InvalidStructure(format!(
                    "second root element <{}>",
                    e.name
                )));
            }
            // Prolog and epilog content is not kept
            _ => {}
        },
    }
    Ok(())
}

/// Parse an XML document into its root element.
///
/// All text inside the root is kept verbatim, whitespace included.
pub fn parse_document(xml: &str) -> Result<Element, XmlError> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut scopes = Scopes::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let element = open_element(e, &mut scopes)?;
                stack.push(element);
            }
            Ok(Event::Empty(ref e)) => {
                let element = open_element(e, &mut scopes)?;
                scopes.stack.pop();
                attach(&mut stack, &mut root, Node::Element(element))?;
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| XmlError::Parse("unexpected closing tag".into()))?;
                scopes.stack.pop();
                attach(&mut stack, &mut root, Node::Element(element))?;
            }
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| XmlError::Parse(e.to_string()))?
                    .into_owned();
                attach(&mut stack, &mut root, Node::Text(text))?;
            }
            Ok(Event::CData(ref e)) => {
                let text = String::from_utf8_lossy(e).into_owned();
                attach(&mut stack, &mut root, Node::CData(text))?;
            }
            Ok(Event::Comment(ref e)) => {
                let text = String::from_utf8_lossy(e).into_owned();
                attach(&mut stack, &mut root, Node::Comment(text))?;
            }
            Ok(Event::PI(ref e)) => {
                let text = String::from_utf8_lossy(e).into_owned();
                attach(&mut stack, &mut root, Node::ProcessingInstruction(text))?;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(XmlError::Parse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::Parse(format!("unclosed element <{}>", open.name)));
    }
    root.ok_or_else(|| XmlError::InvalidStructure("document has no root element".into()))
}

fn ser<E: std::fmt::Display>(e: E) -> XmlError {
    XmlError::Serialization(e.to_string())
}

/// Which elements get indentation on output
struct Layout<'a> {
    namespace: Option<&'a str>,
}

impl Layout<'_> {
    fn indents(&self, element: &Element) -> bool {
        element.namespace.as_deref() == self.namespace && !element.has_text()
    }
}

fn newline<W: Write>(writer: &mut Writer<W>, depth: usize) -> Result<(), XmlError> {
    let out = writer.get_mut();
    out.write_all(b"\n").map_err(ser)?;
    for _ in 0..depth {
        out.write_all(b"  ").map_err(ser)?;
    }
    Ok(())
}

/// Write `element`; `default` is the default namespace in scope and `depth`
/// is `None` once inside content that must not be re-indented.
fn write_element<W: Write>(
    writer: &mut Writer<W>,
    element: &Element,
    default: Option<&str>,
    depth: Option<usize>,
    layout: &Layout<'_>,
) -> Result<(), XmlError> {
    let mut start = BytesStart::new(element.name.as_str());
    for attr in &element.attributes {
        start.push_attribute((attr.name.as_str(), attr.value.as_str()));
    }

    // An unprefixed element takes the default namespace, so a mismatch has
    // to be declared, including `xmlns=""` for no namespace at all.
    let declared = element
        .attributes
        .iter()
        .find(|a| a.name == "xmlns")
        .map(|a| a.value.as_str());
    let default = match declared {
        Some(uri) => Some(uri).filter(|u| !u.is_empty()),
        None if element.prefix().is_none() && element.namespace.as_deref() != default => {
            start.push_attribute(("xmlns", element.namespace.as_deref().unwrap_or("")));
            element.namespace.as_deref()
        }
        None => default,
    };

    if element.children.is_empty() {
        return writer.write_event(Event::Empty(start)).map_err(ser);
    }

    writer.write_event(Event::Start(start)).map_err(ser)?;
    let inner = match depth {
        Some(d) if layout.indents(element) => Some(d + 1),
        _ => None,
    };
    for child in &element.children {
        if let Some(d) = inner {
            newline(writer, d)?;
        }
        match child {
            Node::Element(e) => write_element(writer, e, default, inner, layout)?,
            Node::Text(t) => writer
                .write_event(Event::Text(BytesText::from_escaped(partial_escape(t))))
                .map_err(ser)?,
            Node::CData(t) => writer
                .write_event(Event::CData(BytesCData::new(t.as_str())))
                .map_err(ser)?,
            Node::Comment(t) => writer
                .write_event(Event::Comment(BytesText::from_escaped(t.as_str())))
                .map_err(ser)?,
            Node::ProcessingInstruction(t) => writer
                .write_event(Event::PI(BytesPI::new(t.as_str())))
                .map_err(ser)?,
        }
    }
    if let (Some(d), Some(_)) = (depth, inner) {
        newline(writer, d)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(ser)
}

/// XML parsing errors
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid XML structure: {0}")]
    InvalidStructure(String),
}
