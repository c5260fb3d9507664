//! Streaming parser for the export document.
//!
//! The document is walked in two levels: [`DocumentParser::next_section`]
//! yields validator subtrees and the starts of `entities` blocks;
//! [`DocumentParser::next_entities_item`] then yields the block's inline
//! default configuration and its entities, one at a time, without ever
//! holding more than one entity tree in memory.

use super::node::{XmlNode, name_and_attrs, read_node};
use super::{
    DATA_ELEMENT, DEFAULT_CONFIGURATION_ELEMENT, ENTITIES_ELEMENT, ENTITY_ELEMENT, ID_ATTRIBUTE,
    ROOT_ELEMENT, VALIDATOR_ELEMENT,
};
use crate::{Error, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::io::BufRead;

/// A top-level section of the export document.
#[derive(Debug)]
pub enum Section {
    /// A `validator` element, fully parsed.
    Validator(XmlNode),
    /// The start of an `entities` element; drain it with
    /// [`DocumentParser::next_entities_item`].
    EntitiesStart {
        /// The synchronizer id.
        id: String,
    },
}

/// An item inside an `entities` element.
#[derive(Debug)]
pub enum EntitiesItem {
    /// The inline `default-configuration` element.
    DefaultConfiguration(XmlNode),
    /// One `entity` element, fully parsed.
    Entity(XmlNode),
}

/// Streaming reader over a configuration-export document.
pub struct DocumentParser<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    in_entities: bool,
    done: bool,
}

impl<R: BufRead> DocumentParser<R> {
    /// Opens the document and consumes the root start tag.
    pub fn new(input: R) -> Result<Self> {
        let mut reader = Reader::from_reader(input);
        let mut buf = Vec::new();
        loop {
            match reader
                .read_event_into(&mut buf)
                .map_err(|e| Error::MalformedDocument(e.to_string()))?
            {
                Event::Start(e) => {
                    let (name, _) = name_and_attrs(&e)?;
                    if name != ROOT_ELEMENT {
                        return Err(Error::MalformedDocument(format!(
                            "expected root element '{ROOT_ELEMENT}', found '{name}'"
                        )));
                    }
                    break;
                },
                Event::Empty(e) => {
                    // an empty root is a valid, if pointless, document
                    let (name, _) = name_and_attrs(&e)?;
                    if name != ROOT_ELEMENT {
                        return Err(Error::MalformedDocument(format!(
                            "expected root element '{ROOT_ELEMENT}', found '{name}'"
                        )));
                    }
                    buf.clear();
                    return Ok(Self {
                        reader,
                        buf,
                        in_entities: false,
                        done: true,
                    });
                },
                Event::Eof => {
                    return Err(Error::MalformedDocument("empty document".to_string()));
                },
                _ => {},
            }
            buf.clear();
        }
        buf.clear();
        Ok(Self {
            reader,
            buf,
            in_entities: false,
            done: false,
        })
    }

    /// Returns the next top-level section, or `None` at the end of the root.
    ///
    /// Any unread remainder of a previous `entities` block is drained first.
    pub fn next_section(&mut self) -> Result<Option<Section>> {
        while self.in_entities {
            if self.next_entities_item()?.is_none() {
                break;
            }
        }
        if self.done {
            return Ok(None);
        }
        loop {
            self.buf.clear();
            match self
                .reader
                .read_event_into(&mut self.buf)
                .map_err(|e| Error::MalformedDocument(e.to_string()))?
            {
                Event::Start(e) => {
                    let (name, attrs) = name_and_attrs(&e)?;
                    match name.as_str() {
                        VALIDATOR_ELEMENT => {
                            require_id(&attrs, VALIDATOR_ELEMENT)?;
                            let node = read_node(&mut self.reader, name, attrs)?;
                            return Ok(Some(Section::Validator(node)));
                        },
                        ENTITIES_ELEMENT => {
                            let id = require_id(&attrs, ENTITIES_ELEMENT)?;
                            self.in_entities = true;
                            return Ok(Some(Section::EntitiesStart { id }));
                        },
                        // unknown top-level elements are skipped wholesale
                        _ => {
                            read_node(&mut self.reader, name, attrs)?;
                        },
                    }
                },
                Event::Empty(e) => {
                    let (name, attrs) = name_and_attrs(&e)?;
                    match name.as_str() {
                        VALIDATOR_ELEMENT => {
                            require_id(&attrs, VALIDATOR_ELEMENT)?;
                            return Ok(Some(Section::Validator(XmlNode {
                                name,
                                attrs,
                                ..XmlNode::default()
                            })));
                        },
                        ENTITIES_ELEMENT => {
                            let id = require_id(&attrs, ENTITIES_ELEMENT)?;
                            return Ok(Some(Section::EntitiesStart { id }));
                        },
                        _ => {},
                    }
                },
                Event::End(_) | Event::Eof => {
                    self.done = true;
                    return Ok(None);
                },
                _ => {},
            }
        }
    }

    /// Returns the next item of the current `entities` block, or `None` once
    /// the block is closed.
    pub fn next_entities_item(&mut self) -> Result<Option<EntitiesItem>> {
        if !self.in_entities {
            return Ok(None);
        }
        loop {
            self.buf.clear();
            match self
                .reader
                .read_event_into(&mut self.buf)
                .map_err(|e| Error::MalformedDocument(e.to_string()))?
            {
                Event::Start(e) => {
                    let (name, attrs) = name_and_attrs(&e)?;
                    match name.as_str() {
                        DEFAULT_CONFIGURATION_ELEMENT => {
                            let node = read_node(&mut self.reader, name, attrs)?;
                            return Ok(Some(EntitiesItem::DefaultConfiguration(node)));
                        },
                        ENTITY_ELEMENT => {
                            let node = read_node(&mut self.reader, name, attrs)?;
                            return Ok(Some(EntitiesItem::Entity(node)));
                        },
                        _ => {
                            read_node(&mut self.reader, name, attrs)?;
                        },
                    }
                },
                Event::Empty(e) => {
                    let (name, attrs) = name_and_attrs(&e)?;
                    match name.as_str() {
                        DEFAULT_CONFIGURATION_ELEMENT => {
                            return Ok(Some(EntitiesItem::DefaultConfiguration(XmlNode {
                                name,
                                attrs,
                                ..XmlNode::default()
                            })));
                        },
                        // a self-closed entity surfaces like <entity></entity>
                        // and fails downstream for the missing data payload
                        ENTITY_ELEMENT => {
                            return Ok(Some(EntitiesItem::Entity(XmlNode {
                                name,
                                attrs,
                                ..XmlNode::default()
                            })));
                        },
                        _ => {},
                    }
                },
                Event::End(_) => {
                    self.in_entities = false;
                    return Ok(None);
                },
                Event::Eof => {
                    return Err(Error::MalformedDocument(
                        "unexpected end of document inside entities element".to_string(),
                    ));
                },
                _ => {},
            }
        }
    }
}

/// Returns the payload element inside an `entity`'s `data` wrapper.
pub fn entity_payload(entity: &XmlNode) -> Result<&XmlNode> {
    entity
        .child(DATA_ELEMENT)
        .and_then(|data| data.children.first())
        .ok_or_else(|| {
            Error::MalformedDocument("entity element carries no data payload".to_string())
        })
}

fn require_id(attrs: &[(String, String)], element: &str) -> Result<String> {
    attrs
        .iter()
        .find(|(key, _)| key == ID_ATTRIBUTE)
        .map(|(_, value)| value.clone())
        .ok_or_else(|| {
            Error::MalformedDocument(format!("'{element}' element has no id attribute"))
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    const DOCUMENT: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
        <configuration-export>\
          <validator id=\"deployed-plugins\"><plugin name=\"Platforms\" version=\"1.2\"/></validator>\
          <entities id=\"system-settings\">\
            <default-configuration>\
              <simple-property name=\"propertiesToImport\" value=\"A,B\"/>\
            </default-configuration>\
            <entity><data><systemSettings><entry key=\"A\">1</entry></systemSettings></data></entity>\
          </entities>\
          <entities id=\"metric-templates\"/>\
        </configuration-export>";

    #[test]
    fn walks_sections_and_items() {
        let mut parser = DocumentParser::new(DOCUMENT).unwrap();

        let Some(Section::Validator(validator)) = parser.next_section().unwrap() else {
            panic!("expected validator section");
        };
        assert_eq!(validator.attr("id"), Some("deployed-plugins"));
        assert_eq!(validator.children[0].attr("version"), Some("1.2"));

        let Some(Section::EntitiesStart { id }) = parser.next_section().unwrap() else {
            panic!("expected entities section");
        };
        assert_eq!(id, "system-settings");

        let Some(EntitiesItem::DefaultConfiguration(config)) =
            parser.next_entities_item().unwrap()
        else {
            panic!("expected default configuration");
        };
        assert_eq!(config.children[0].attr("name"), Some("propertiesToImport"));

        let Some(EntitiesItem::Entity(entity)) = parser.next_entities_item().unwrap() else {
            panic!("expected entity");
        };
        let payload = entity_payload(&entity).unwrap();
        assert_eq!(payload.name, "systemSettings");

        assert!(parser.next_entities_item().unwrap().is_none());

        let Some(Section::EntitiesStart { id }) = parser.next_section().unwrap() else {
            panic!("expected second entities section");
        };
        assert_eq!(id, "metric-templates");
        assert!(parser.next_entities_item().unwrap().is_none());

        assert!(parser.next_section().unwrap().is_none());
    }

    #[test]
    fn next_section_drains_unread_entities() {
        let mut parser = DocumentParser::new(DOCUMENT).unwrap();
        parser.next_section().unwrap(); // validator
        parser.next_section().unwrap(); // system-settings
        // skip straight to the next section without draining items
        let Some(Section::EntitiesStart { id }) = parser.next_section().unwrap() else {
            panic!("expected entities section");
        };
        assert_eq!(id, "metric-templates");
    }

    #[test]
    fn self_closed_entity_surfaces_missing_payload() {
        let doc = b"<configuration-export><entities id=\"system-settings\">\
                    <entity/></entities></configuration-export>";
        let mut parser = DocumentParser::new(&doc[..]).unwrap();
        let Some(Section::EntitiesStart { .. }) = parser.next_section().unwrap() else {
            panic!("expected entities section");
        };
        let Some(EntitiesItem::Entity(entity)) = parser.next_entities_item().unwrap() else {
            panic!("expected entity item");
        };
        assert!(matches!(
            entity_payload(&entity),
            Err(Error::MalformedDocument(_))
        ));
    }

    #[test]
    fn rejects_wrong_root() {
        let result = DocumentParser::new(&b"<export/>"[..]);
        assert!(matches!(result, Err(Error::MalformedDocument(_))));
    }

    #[test]
    fn entities_without_id_is_malformed() {
        let doc = b"<configuration-export><entities/></configuration-export>";
        let mut parser = DocumentParser::new(&doc[..]).unwrap();
        assert!(parser.next_section().is_err());
    }
}
