//! Lightweight owned element trees.

use crate::{Error, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::io::BufRead;

/// An owned XML element subtree.
///
/// Whitespace-only text is dropped, comments and the declaration are
/// skipped, and CDATA is treated as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    /// Element name.
    pub name: String,
    /// Attributes in document order.
    pub attrs: Vec<(String, String)>,
    /// Concatenated non-whitespace text content.
    pub text: String,
    /// Child elements in document order.
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// Returns an attribute value by name.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the first child element with the given name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Iterates over child elements with the given name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Self> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Parses a standalone element from raw XML bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(bytes);
        let mut buf = Vec::new();
        loop {
            match reader
                .read_event_into(&mut buf)
                .map_err(|e| Error::MalformedDocument(e.to_string()))?
            {
                Event::Start(e) => {
                    let (name, attrs) = name_and_attrs(&e)?;
                    return read_node(&mut reader, name, attrs);
                },
                Event::Empty(e) => {
                    let (name, attrs) = name_and_attrs(&e)?;
                    return Ok(Self {
                        name,
                        attrs,
                        ..Self::default()
                    });
                },
                Event::Eof => {
                    return Err(Error::MalformedDocument(
                        "no element found in input".to_string(),
                    ));
                },
                _ => {},
            }
            buf.clear();
        }
    }
}

/// Extracts the local name and attributes of a start tag.
pub(crate) fn name_and_attrs(start: &BytesStart<'_>) -> Result<(String, Vec<(String, String)>)> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| Error::MalformedDocument(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| Error::MalformedDocument(e.to_string()))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok((name, attrs))
}

/// Reads the remainder of an element whose start tag was already consumed.
pub(crate) fn read_node<R: BufRead>(
    reader: &mut Reader<R>,
    name: String,
    attrs: Vec<(String, String)>,
) -> Result<XmlNode> {
    let mut node = XmlNode {
        name,
        attrs,
        text: String::new(),
        children: Vec::new(),
    };
    let mut buf = Vec::new();
    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::MalformedDocument(e.to_string()))?
        {
            Event::Start(e) => {
                let (child_name, child_attrs) = name_and_attrs(&e)?;
                let child = read_node(reader, child_name, child_attrs)?;
                node.children.push(child);
            },
            Event::Empty(e) => {
                let (child_name, child_attrs) = name_and_attrs(&e)?;
                node.children.push(XmlNode {
                    name: child_name,
                    attrs: child_attrs,
                    ..XmlNode::default()
                });
            },
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| Error::MalformedDocument(e.to_string()))?;
                // Indentation between child elements is whitespace-only and
                // dropped; any other text is kept verbatim, padding included.
                if !text.trim().is_empty() {
                    node.text.push_str(&text);
                }
            },
            Event::CData(t) => {
                node.text.push_str(&String::from_utf8_lossy(t.as_ref()));
            },
            Event::End(_) => return Ok(node),
            Event::Eof => {
                return Err(Error::MalformedDocument(format!(
                    "unexpected end of document inside element '{}'",
                    node.name
                )));
            },
            _ => {},
        }
        buf.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_tree_with_attributes_and_text() {
        let node = XmlNode::parse(
            b"<systemSettings>\n  <entry key=\"A\">1</entry>\n  <entry key=\"B\">2</entry>\n\
              </systemSettings>",
        )
        .unwrap();

        assert_eq!(node.name, "systemSettings");
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.children[0].attr("key"), Some("A"));
        assert_eq!(node.children[0].text, "1");
        assert_eq!(node.children_named("entry").count(), 2);
        // surrounding whitespace never becomes text
        assert!(node.text.is_empty());
    }

    #[test]
    fn parses_empty_elements_as_leaves() {
        let node = XmlNode::parse(b"<metricTemplate metricName=\"Load\" enabled=\"true\"/>")
            .unwrap();
        assert_eq!(node.attr("metricName"), Some("Load"));
        assert_eq!(node.attr("enabled"), Some("true"));
        assert!(node.children.is_empty());
    }

    #[test]
    fn preserves_padded_text_verbatim() {
        let node = XmlNode::parse(b"<entry key=\"A\"> padded@example.com </entry>").unwrap();
        assert_eq!(node.text, " padded@example.com ");
    }

    #[test]
    fn unescapes_entities() {
        let node = XmlNode::parse(b"<entry key=\"a&lt;b\">x &amp; y</entry>").unwrap();
        assert_eq!(node.attr("key"), Some("a<b"));
        assert_eq!(node.text, "x & y");
    }

    #[test]
    fn rejects_truncated_input() {
        let err = XmlNode::parse(b"<entities id=\"x\"><entity>").unwrap_err();
        assert!(matches!(err, Error::MalformedDocument(_)));
    }
}
