//! Generic XML element tree
//!
//! This module reads and writes plain XML with quick-xml. Namespace prefixes
//! are dropped on read, since SCL documents are addressed by local names
//! only. The typed SCL model is built on top of this tree by
//! [`loader`](crate::loader).

use crate::error::{Error, Result};
use indexmap::IndexMap;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;

/// XML Element in the document tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    /// Local name
    pub name: String,
    /// Attributes, in document order
    pub attributes: IndexMap<String, String>,
    /// Text content (if any)
    pub text: Option<String>,
    /// Child elements
    pub children: Vec<Element>,
}

impl Element {
    /// Create a new element
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Get an attribute value by local name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Attribute value, `None` when absent or empty
    pub fn attr_non_empty(&self, name: &str) -> Option<String> {
        self.attr(name)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// Set an attribute
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        self.attributes.insert(name.to_string(), value.into());
    }

    /// Set an attribute when a value is present
    pub fn set_opt_attr(&mut self, name: &str, value: Option<&str>) {
        if let Some(v) = value {
            self.set_attr(name, v);
        }
    }

    /// Builder flavour of [`set_attr`](Self::set_attr)
    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Add a child element
    pub fn add_child(&mut self, child: Element) {
        self.children.push(child);
    }

    /// Set text content
    pub fn set_text(&mut self, text: String) {
        self.text = Some(text);
    }

    /// Find child elements by local name
    pub fn find_children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |e| e.name == name)
    }

    /// First child element with the given local name
    pub fn find_child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|e| e.name == name)
    }
}

fn local_name(raw: &[u8]) -> Result<String> {
    let name = std::str::from_utf8(raw)
        .map_err(|e| Error::Xml(format!("Invalid element name: {}", e)))?;
    Ok(match name.split_once(':') {
        Some((_prefix, local)) => local.to_string(),
        None => name.to_string(),
    })
}

/// Parse element from BytesStart event
fn parse_element(start: &BytesStart) -> Result<Element> {
    let mut element = Element::new(local_name(start.name().as_ref())?);

    for attr_result in start.attributes() {
        let attr =
            attr_result.map_err(|e| Error::Xml(format!("Failed to parse attribute: {}", e)))?;

        let attr_name = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| Error::Xml(format!("Invalid attribute name: {}", e)))?;

        // Namespace declarations carry no SCL data
        if attr_name == "xmlns" || attr_name.starts_with("xmlns:") {
            continue;
        }

        let attr_value = attr
            .unescape_value()
            .map_err(|e| Error::Xml(format!("Failed to unescape attribute value: {}", e)))?
            .to_string();

        element
            .attributes
            .insert(local_name(attr_name.as_bytes())?, attr_value);
    }

    Ok(element)
}

/// Parse an XML document from bytes and return its root element
pub fn parse(xml: &[u8]) -> Result<Element> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut root = None;
    let mut element_stack: Vec<Element> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                element_stack.push(parse_element(&e)?);
            }
            Ok(Event::End(_)) => {
                if let Some(current) = element_stack.pop() {
                    match element_stack.last_mut() {
                        Some(parent) => parent.add_child(current),
                        None => root = Some(current),
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                let element = parse_element(&e)?;
                match element_stack.last_mut() {
                    Some(parent) => parent.add_child(element),
                    None => root = Some(element),
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(current) = element_stack.last_mut() {
                    let text = e
                        .unescape()
                        .map_err(|e| Error::Xml(format!("Failed to unescape text: {}", e)))?
                        .to_string();
                    if !text.trim().is_empty() {
                        current.set_text(text);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::Xml(format!(
                    "Error parsing XML at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {} // comments, processing instructions, declarations
        }
        buf.clear();
    }

    if !element_stack.is_empty() {
        return Err(Error::Xml("Unexpected end of document".to_string()));
    }
    root.ok_or_else(|| Error::Xml("Document has no root element".to_string()))
}

fn write_element<W: std::io::Write>(writer: &mut Writer<W>, element: &Element) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (name, value) in &element.attributes {
        start.push_attribute((name.as_str(), value.as_str()));
    }
    if element.children.is_empty() && element.text.is_none() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    if let Some(text) = &element.text {
        writer.write_event(Event::Text(BytesText::new(text)))?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}

/// Serialize an element tree as an indented XML document
pub fn write(root: &Element) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    write_element(&mut writer, root)?;
    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| Error::Xml(format!("Invalid UTF-8 output: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_xml() {
        let root = parse(b"<SCL><IED name=\"IED1\"/></SCL>").unwrap();
        assert_eq!(root.name, "SCL");
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].attr("name"), Some("IED1"));
    }

    #[test]
    fn test_parse_strips_prefixes() {
        let xml = br#"<scl:SCL xmlns:scl="http://www.iec.ch/61850/2003/SCL" xmlns:x="urn:x" x:ext="1">
            <scl:Private type="T">payload</scl:Private>
        </scl:SCL>"#;
        let root = parse(xml).unwrap();
        assert_eq!(root.name, "SCL");
        assert_eq!(root.attr("ext"), Some("1"));
        assert!(root.attr("scl").is_none());
        let private = root.find_child("Private").unwrap();
        assert_eq!(private.text.as_deref(), Some("payload"));
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(parse(b"<SCL><IED></SCL>"), Err(Error::Xml(_))));
        assert!(matches!(parse(b""), Err(Error::Xml(_))));
    }

    #[test]
    fn test_write_then_parse() {
        let mut root = Element::new("SCL");
        let mut val = Element::new("Val").with_attr("sGroup", "1");
        val.set_text("a<b".to_string());
        root.add_child(val);
        root.add_child(Element::new("IED").with_attr("name", "I&1"));

        let xml = write(&root).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("a&lt;b"));
        assert_eq!(parse(xml.as_bytes()).unwrap(), root);
    }
}
