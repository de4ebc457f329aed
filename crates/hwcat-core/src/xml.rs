//! Minimal XML element tree for submission documents.
//!
//! Submissions carry recursively typed `<property>`/`<value>` markup
//! whose shape depends on a `type` attribute, which does not map onto
//! serde derive. This module builds a small DOM from the streamed
//! `quick_xml::Reader` events; schema validation and the section
//! parsers walk the tree afterwards.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Malformed(String),
    #[error("document has no root element")]
    NoRoot,
}

/// One XML element: tag name, attributes, child elements and the
/// concatenated character data directly inside the element.
#[derive(Debug, Clone, Default)]
pub struct Element {
    pub name: String,
    pub attributes: HashMap<String, String>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    /// The value of an attribute, if present.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// The first child element with the given tag name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All child elements with the given tag name.
    pub fn children_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Element text with surrounding whitespace removed.
    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }
}

/// Parse an XML document into an [`Element`] tree.
pub fn parse_document(xml: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| XmlError::Malformed(e.to_string()))?;
        match event {
            Event::Start(start) => {
                let element = element_from_start(&start)?;
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = element_from_start(&start)?;
                attach(element, &mut stack, &mut root)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| XmlError::Malformed("unbalanced end tag".into()))?;
                attach(element, &mut stack, &mut root)?;
            }
            Event::Text(text) => {
                let content = text
                    .xml_content()
                    .map_err(|e| XmlError::Malformed(e.to_string()))?;
                if let Some(parent) = stack.last_mut() {
                    parent.text.push_str(&content);
                }
            }
            Event::CData(data) => {
                let raw = String::from_utf8_lossy(&data.into_inner()).into_owned();
                if let Some(parent) = stack.last_mut() {
                    parent.text.push_str(&raw);
                }
            }
            Event::GeneralRef(reference) => {
                let resolved = reference
                    .resolve_char_ref()
                    .map_err(|e| XmlError::Malformed(e.to_string()))?;
                if let Some(parent) = stack.last_mut() {
                    match resolved {
                        Some(ch) => parent.text.push(ch),
                        None => match reference.as_ref() {
                            b"amp" => parent.text.push('&'),
                            b"lt" => parent.text.push('<'),
                            b"gt" => parent.text.push('>'),
                            b"apos" => parent.text.push('\''),
                            b"quot" => parent.text.push('"'),
                            other => {
                                return Err(XmlError::Malformed(format!(
                                    "unknown entity reference: &{};",
                                    String::from_utf8_lossy(other)
                                )))
                            }
                        },
                    }
                }
            }
            Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
            Event::Eof => break,
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::Malformed("unclosed element".into()));
    }
    root.ok_or(XmlError::NoRoot)
}

fn element_from_start(
    start: &quick_xml::events::BytesStart<'_>,
) -> Result<Element, XmlError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = HashMap::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Malformed(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError::Malformed(e.to_string()))?
            .into_owned();
        attributes.insert(key, value);
    }
    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

fn attach(
    element: Element,
    stack: &mut Vec<Element>,
    root: &mut Option<Element>,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            Ok(())
        }
        None => {
            if root.is_some() {
                return Err(XmlError::Malformed("multiple root elements".into()));
            }
            *root = Some(element);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_and_attributes() {
        let doc = parse_document(
            r#"<system version="1.0"><summary><system_id value="abc"/></summary></system>"#,
        )
        .unwrap();
        assert_eq!(doc.name, "system");
        assert_eq!(doc.attr("version"), Some("1.0"));
        let summary = doc.child("summary").unwrap();
        assert_eq!(summary.children.len(), 1);
        assert_eq!(summary.children[0].attr("value"), Some("abc"));
    }

    #[test]
    fn collects_text_including_entities() {
        let doc = parse_document("<a>x &amp; y</a>").unwrap();
        assert_eq!(doc.trimmed_text(), "x & y");
        let doc = parse_document("<a>&lt;tag&gt; &#65;&#x42;</a>").unwrap();
        assert_eq!(doc.trimmed_text(), "<tag> AB");
        assert!(parse_document("<a>&nosuchentity;</a>").is_err());
    }

    #[test]
    fn rejects_malformed_markup() {
        assert!(parse_document("<a><b></a>").is_err());
        assert!(parse_document("").is_err());
    }

    #[test]
    fn keeps_multiline_text_verbatim() {
        let doc = parse_document("<udev>\nP: /devices/LNXSYSTM:00\nE: A=1\n</udev>").unwrap();
        assert!(doc.text.contains("P: /devices/LNXSYSTM:00\nE: A=1"));
    }
}
