//! Minimal XML element tree used to build and parse DCP metadata documents
//!
//! This is deliberately schema-agnostic: the CPL, PackingList and AssetMap
//! modules decide which elements exist. Namespace prefixes are kept on
//! write and ignored on read, so `msp-cpl:MainStereoscopicPicture` is found
//! by asking for `MainStereoscopicPicture`.

use crate::{Error, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::path::Path;
use std::str::FromStr;

/// A child of an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An XML element with ordered attributes and children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    /// Creates an empty element
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Creates a root element declaring `namespace` as its default namespace
    pub fn with_namespace(name: impl Into<String>, namespace: &str) -> Self {
        let mut element = Self::new(name);
        element.set_attribute("xmlns", namespace);
        element
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => self.attributes.push((key, value)),
        }
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Appends an empty child element and returns it for further building
    pub fn add_child(&mut self, name: impl Into<String>) -> &mut Element {
        self.children.push(Node::Element(Element::new(name)));
        match self.children.last_mut() {
            Some(Node::Element(e)) => e,
            _ => unreachable!("just pushed an element"),
        }
    }

    /// Appends a text node
    pub fn add_child_text(&mut self, text: impl Into<String>) -> &mut Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// Appends `<name>text</name>`
    pub fn add_text_child(&mut self, name: impl Into<String>, text: impl ToString) -> &mut Element {
        let child = self.add_child(name);
        child.add_child_text(text.to_string());
        child
    }

    /// Local part of the element name, without any namespace prefix
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    /// Child elements in document order
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Child elements whose local name is `name`
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |e| e.local_name() == name)
    }

    /// First child element whose local name is `name`
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.local_name() == name)
    }

    pub fn required_child(&self, name: &str) -> Result<&Element> {
        self.child(name)
            .ok_or_else(|| Error::MissingElement(format!("{}/{}", self.local_name(), name)))
    }

    /// Concatenated text content of this element (direct text children only)
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect::<String>()
            .trim()
            .to_string()
    }

    pub fn string_child(&self, name: &str) -> Result<String> {
        Ok(self.required_child(name)?.text())
    }

    pub fn optional_string_child(&self, name: &str) -> Option<String> {
        self.child(name).map(Element::text)
    }

    /// Parses the text of a required child with [`FromStr`]
    pub fn parsed_child<T: FromStr>(&self, name: &str) -> Result<T> {
        let text = self.string_child(name)?;
        text.parse()
            .map_err(|_| Error::Xml(format!("could not parse {name} value '{text}'")))
    }

    pub fn optional_parsed_child<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        match self.child(name) {
            Some(_) => self.parsed_child(name).map(Some),
            None => Ok(None),
        }
    }

    /// Serializes the element as an indented UTF-8 document
    pub fn to_document_string(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_error)?;
        self.write_events(&mut writer)?;
        String::from_utf8(writer.into_inner()).map_err(|e| Error::Xml(e.to_string()))
    }

    /// Writes the formatted document to `path`
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut document = self.to_document_string()?;
        document.push('\n');
        std::fs::write(path, document).map_err(|e| Error::file("could not write XML file", path, e))
    }

    fn write_events(&self, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (k, v) in &self.attributes {
            start.push_attribute((k.as_str(), v.as_str()));
        }

        if self.children.is_empty() {
            return writer.write_event(Event::Empty(start)).map_err(xml_error);
        }

        writer.write_event(Event::Start(start)).map_err(xml_error)?;
        for child in &self.children {
            match child {
                Node::Element(e) => e.write_events(writer)?,
                Node::Text(t) => writer
                    .write_event(Event::Text(BytesText::new(t)))
                    .map_err(xml_error)?,
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(xml_error)
    }

    /// Parses a document and returns its root element
    pub fn parse(document: &str) -> Result<Element> {
        let mut reader = Reader::from_str(document);
        reader.trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(start) => stack.push(element_from_start(&start)?),
                Event::Empty(start) => {
                    let element = element_from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| Error::Xml("unbalanced end tag".into()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        current.add_child_text(text.unescape().map_err(xml_error)?.into_owned());
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current.add_child_text(String::from_utf8_lossy(&data).into_owned());
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(Error::Xml("unexpected end of document".into()));
        }
        root.ok_or_else(|| Error::Xml("document has no root element".into()))
    }

    /// Reads and parses the document at `path`
    pub fn read_file(path: impl AsRef<Path>) -> Result<Element> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path)
            .map_err(|e| Error::file("could not read XML file", path, e))?;
        Self::parse(&document)
    }
}

fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = Element::new(name);
    for attribute in start.attributes() {
        let attribute = attribute.map_err(xml_error)?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value().map_err(xml_error)?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(Node::Element(element));
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(Error::Xml("document has more than one root element".into())),
    }
}

fn xml_error(e: impl std::fmt::Display) -> Error {
    Error::Xml(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_parse_tree() {
        let mut root = Element::with_namespace("CompositionPlaylist", "urn:test");
        root.add_text_child("Id", "urn:uuid:1234");
        let reel = root.add_child("ReelList").add_child("Reel");
        reel.add_text_child("Duration", 1000);
        root.add_child("RatingList");

        let text = root.to_document_string().unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(text.contains("<RatingList/>"));

        let parsed = Element::parse(&text).unwrap();
        assert_eq!(parsed, root);
        assert_eq!(parsed.attribute("xmlns"), Some("urn:test"));
        let duration: u64 = parsed
            .required_child("ReelList")
            .unwrap()
            .required_child("Reel")
            .unwrap()
            .parsed_child("Duration")
            .unwrap();
        assert_eq!(duration, 1000);
    }

    #[test]
    fn test_text_is_escaped() {
        let mut root = Element::new("Root");
        root.add_text_child("AnnotationText", "Tom & Jerry <3>");
        let text = root.to_document_string().unwrap();
        assert!(text.contains("Tom &amp; Jerry &lt;3&gt;"));
        let parsed = Element::parse(&text).unwrap();
        assert_eq!(parsed.string_child("AnnotationText").unwrap(), "Tom & Jerry <3>");
    }

    #[test]
    fn test_prefixed_names_match_local_name() {
        let doc = r#"<AssetList xmlns:msp-cpl="urn:x"><msp-cpl:MainStereoscopicPicture><Id>a</Id></msp-cpl:MainStereoscopicPicture></AssetList>"#;
        let parsed = Element::parse(doc).unwrap();
        let picture = parsed.child("MainStereoscopicPicture").unwrap();
        assert_eq!(picture.name, "msp-cpl:MainStereoscopicPicture");
        assert_eq!(picture.string_child("Id").unwrap(), "a");
    }

    #[test]
    fn test_missing_child_is_reported() {
        let parsed = Element::parse("<Reel><Id>x</Id></Reel>").unwrap();
        assert!(matches!(
            parsed.string_child("AssetList"),
            Err(Error::MissingElement(_))
        ));
        assert!(parsed.optional_parsed_child::<u64>("EntryPoint").unwrap().is_none());
    }

    #[test]
    fn test_malformed_documents_fail() {
        assert!(Element::parse("<a><b></a>").is_err());
        assert!(Element::parse("").is_err());
    }

    #[test]
    fn test_child_outlives_lookup_name() {
        let parsed = Element::parse("<Reel><Id>x</Id><Id>y</Id></Reel>").unwrap();
        let found = {
            let name = String::from("Id");
            parsed.child(&name)
        };
        assert_eq!(found.unwrap().text(), "x");
        assert_eq!(parsed.children_named("Id").count(), 2);
    }
}
