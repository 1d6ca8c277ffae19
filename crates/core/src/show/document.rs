//! Owned element tree shared by both inbound encodings.
//!
//! Stream lines and show files carry XML. Queue messages carry the same structure encoded
//! as JSON, using the common JSON/XML mapping:
//!
//! - the single top-level key names the root element
//! - keys starting with `@` are attributes
//! - `#text` holds element text
//! - an array value becomes one sibling element per item

use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("XML error: {0}")]
    Xml(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("malformed document: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// This element and every element below it named `name`, depth-first in document order.
    pub fn descendants_named<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        self.collect_named(name, &mut found);
        found
    }

    fn collect_named<'a>(&'a self, name: &str, found: &mut Vec<&'a Element>) {
        if self.name == name {
            found.push(self);
        }
        for child in &self.children {
            child.collect_named(name, found);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub root: Element,
}

impl Document {
    pub fn new(root: Element) -> Self {
        Self { root }
    }

    pub fn from_xml(input: &str) -> Result<Self, DocumentError> {
        let mut reader = Reader::from_str(input);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Eof) => break,
                Ok(Event::Start(ref e)) => {
                    let element = start_element(e.name().as_ref(), e.attributes())?;
                    stack.push(element);
                }
                Ok(Event::Empty(ref e)) => {
                    let element = start_element(e.name().as_ref(), e.attributes())?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| DocumentError::Malformed("unexpected end tag".into()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(ref e)) => {
                    let text = e
                        .unescape()
                        .map_err(|err| DocumentError::Xml(err.to_string()))?;
                    push_text(&mut stack, &text)?;
                }
                Ok(Event::CData(e)) => {
                    let raw = e.into_inner();
                    push_text(&mut stack, &String::from_utf8_lossy(&raw))?;
                }
                Ok(_) => {}
                Err(err) => {
                    return Err(DocumentError::Xml(format!(
                        "at position {}: {}",
                        reader.error_position(),
                        err
                    )))
                }
            }
        }

        if let Some(open) = stack.last() {
            return Err(DocumentError::Malformed(format!(
                "element <{}> is never closed",
                open.name
            )));
        }

        root.map(Document::new)
            .ok_or_else(|| DocumentError::Malformed("document has no root element".into()))
    }

    pub fn from_json(input: &str) -> Result<Self, DocumentError> {
        let value: Value =
            serde_json::from_str(input).map_err(|err| DocumentError::Json(err.to_string()))?;

        let object = value
            .as_object()
            .ok_or_else(|| DocumentError::Malformed("top-level JSON value is not an object".into()))?;
        if object.len() != 1 {
            return Err(DocumentError::Malformed(format!(
                "expected exactly one root key, found {}",
                object.len()
            )));
        }

        let (name, body) = object
            .iter()
            .next()
            .ok_or_else(|| DocumentError::Malformed("empty JSON object".into()))?;

        match body {
            Value::Array(_) => Err(DocumentError::Malformed(format!(
                "root element '{}' cannot be an array",
                name
            ))),
            _ => Ok(Document::new(json_element(name, body)?)),
        }
    }
}

fn start_element(
    name: &[u8],
    attributes: quick_xml::events::attributes::Attributes<'_>,
) -> Result<Element, DocumentError> {
    let mut element = Element::new(String::from_utf8_lossy(name));
    for attr in attributes {
        let attr = attr.map_err(|err| DocumentError::Xml(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| DocumentError::Xml(err.to_string()))?
            .to_string();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), DocumentError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(DocumentError::Malformed(format!(
            "second root element <{}>",
            element.name
        ))),
    }
}

fn push_text(stack: &mut [Element], text: &str) -> Result<(), DocumentError> {
    match stack.last_mut() {
        Some(element) => {
            element.text.push_str(text);
            Ok(())
        }
        None => Err(DocumentError::Malformed(format!(
            "text outside the root element: {:?}",
            text
        ))),
    }
}

fn json_element(name: &str, value: &Value) -> Result<Element, DocumentError> {
    let mut element = Element::new(name);
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (key, child) in map {
                if let Some(attr) = key.strip_prefix('@') {
                    element.attributes.push((attr.to_string(), json_scalar(key, child)?));
                } else if key == "#text" {
                    element.text = json_scalar(key, child)?;
                } else if let Value::Array(items) = child {
                    for item in items {
                        element.children.push(json_element(key, item)?);
                    }
                } else {
                    element.children.push(json_element(key, child)?);
                }
            }
        }
        Value::Array(_) => {
            return Err(DocumentError::Malformed(format!(
                "nested array under '{}'",
                name
            )))
        }
        scalar => element.text = json_scalar(name, scalar)?,
    }
    Ok(element)
}

fn json_scalar(key: &str, value: &Value) -> Result<String, DocumentError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        _ => Err(DocumentError::Malformed(format!(
            "'{}' must be a scalar value",
            key
        ))),
    }
}
