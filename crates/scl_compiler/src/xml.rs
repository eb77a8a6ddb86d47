//! XML document model
//!
//! SCL files are read once with quick-xml into an owned element tree so the
//! expansion passes can walk it freely and the result can sit in the cache.
//! Element and attribute names are stored by local name; the SCL namespace is
//! auto-detected from the root element.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Result, SclError};

/// Namespace URI of IEC 61850-6 SCL documents
pub const SCL_NAMESPACE: &str = "http://www.iec.ch/61850/2003/SCL";

/// An element of a parsed document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Attribute value by local name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value, or the empty string when absent
    pub fn attr_or_empty(&self, name: &str) -> &str {
        self.attr(name).unwrap_or("")
    }

    /// First direct child with the given name
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Direct children with the given name, in document order
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// All descendants with the given name, depth first in document order
    pub fn descendants_named<'a>(&'a self, name: &str) -> Vec<&'a XmlElement> {
        let mut out = Vec::new();
        self.collect_descendants(name, &mut out);
        out
    }

    fn collect_descendants<'a>(&'a self, name: &str, out: &mut Vec<&'a XmlElement>) {
        for child in &self.children {
            if child.name == name {
                out.push(child);
            }
            child.collect_descendants(name, out);
        }
    }

    /// Whether any descendant has the given name
    pub fn has_descendant(&self, name: &str) -> bool {
        self.children
            .iter()
            .any(|c| c.name == name || c.has_descendant(name))
    }
}

/// A parsed XML document
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    pub root: XmlElement,
    /// Default namespace declared on the root element, if any
    pub namespace: Option<String>,
}

impl XmlDocument {
    /// Parse a document from a string
    pub fn parse_str(content: &str) -> Result<Self> {
        Self::parse(Reader::from_str(content))
    }

    /// Parse a document from raw file bytes
    ///
    /// The encoding comes from the byte order mark or the XML declaration and
    /// defaults to UTF-8.
    pub fn parse_bytes(content: &[u8]) -> Result<Self> {
        Self::parse(Reader::from_reader(content))
    }

    fn parse(mut reader: Reader<&[u8]>) -> Result<Self> {
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;
        let mut namespace = None;

        loop {
            let event = reader.read_event().map_err(|e| SclError::Xml {
                position: reader.buffer_position() as u64,
                message: e.to_string(),
            })?;
            let decoder = reader.decoder();
            let decode = |bytes: &[u8]| -> Result<String> {
                decoder
                    .decode(bytes)
                    .map(Cow::into_owned)
                    .map_err(|e| SclError::Encoding {
                        position: reader.buffer_position() as u64,
                        message: e.to_string(),
                    })
            };

            match event {
                Event::Start(e) => {
                    let element = element_from_start(&e, &decode)?;
                    if stack.is_empty() && root.is_none() {
                        namespace = default_namespace(&e, &decode)?;
                    }
                    stack.push(element);
                }
                Event::Empty(e) => {
                    let element = element_from_start(&e, &decode)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None if root.is_none() => {
                            namespace = default_namespace(&e, &decode)?;
                            root = Some(element);
                        }
                        None => {}
                    }
                }
                Event::Text(t) => {
                    if let Some(current) = stack.last_mut() {
                        let raw = decode(t.as_ref())?;
                        current.text.push_str(&unescape_lossy(&raw));
                    }
                }
                Event::CData(t) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&decode(t.as_ref())?);
                    }
                }
                Event::End(_) => {
                    if let Some(done) = stack.pop() {
                        match stack.last_mut() {
                            Some(parent) => parent.children.push(done),
                            None => root = Some(done),
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(SclError::Xml {
                position: reader.buffer_position() as u64,
                message: format!("unclosed element <{}>", stack[stack.len() - 1].name),
            });
        }

        let root = root.ok_or_else(|| SclError::MissingElement("document root".to_string()))?;
        Ok(Self { root, namespace })
    }

    /// Whether the root declares the IEC 61850 SCL namespace
    pub fn is_scl_namespace(&self) -> bool {
        self.namespace
            .as_deref()
            .is_some_and(|ns| ns.starts_with(SCL_NAMESPACE))
    }
}

fn element_from_start(start: &BytesStart, decode: &impl Fn(&[u8]) -> Result<String>) -> Result<XmlElement> {
    let mut element = XmlElement::new(decode(start.local_name().as_ref())?);

    for attr in start.attributes().flatten() {
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let key = decode(attr.key.local_name().as_ref())?;
        let value = decode(attr.value.as_ref())?;
        element.attributes.push((key, unescape_lossy(&value).into_owned()));
    }

    Ok(element)
}

fn default_namespace(start: &BytesStart, decode: &impl Fn(&[u8]) -> Result<String>) -> Result<Option<String>> {
    start
        .attributes()
        .flatten()
        .find(|a| a.key.as_ref() == b"xmlns")
        .map(|a| decode(a.value.as_ref()))
        .transpose()
}

fn unescape_lossy(raw: &str) -> Cow<'_, str> {
    quick_xml::escape::unescape(raw).unwrap_or(Cow::Borrowed(raw))
}
