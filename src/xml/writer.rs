//! Streaming XML writer used by exporters and validators.

use crate::{Error, Result};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

/// Thin wrapper over [`quick_xml::Writer`] producing a byte buffer.
///
/// Exporters write one entity payload per writer; the export stream wraps
/// the buffered bytes in the document structure. Attribute and text values
/// are escaped on the way out.
pub struct ExportWriter {
    writer: Writer<Vec<u8>>,
}

impl ExportWriter {
    /// Creates a writer over an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            writer: Writer::new(Vec::new()),
        }
    }

    /// Writes the XML declaration.
    pub fn declaration(&mut self) -> Result<()> {
        self.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
    }

    /// Opens an element.
    pub fn start(&mut self, name: &str) -> Result<()> {
        self.write(Event::Start(BytesStart::new(name)))
    }

    /// Opens an element with attributes.
    pub fn start_with(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        self.write(Event::Start(Self::with_attrs(name, attrs)))
    }

    /// Writes an empty element.
    pub fn empty(&mut self, name: &str) -> Result<()> {
        self.write(Event::Empty(BytesStart::new(name)))
    }

    /// Writes an empty element with attributes.
    pub fn empty_with(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        self.write(Event::Empty(Self::with_attrs(name, attrs)))
    }

    /// Closes an element.
    pub fn end(&mut self, name: &str) -> Result<()> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    /// Writes text content.
    pub fn text(&mut self, text: &str) -> Result<()> {
        self.write(Event::Text(BytesText::new(text)))
    }

    /// Writes an element with text content.
    pub fn element(&mut self, name: &str, text: &str) -> Result<()> {
        self.start(name)?;
        self.text(text)?;
        self.end(name)
    }

    /// Writes an element with attributes and text content.
    pub fn element_with(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) -> Result<()> {
        self.start_with(name, attrs)?;
        self.text(text)?;
        self.end(name)
    }

    /// Splices pre-rendered XML into the output.
    ///
    /// The bytes must already be well-formed markup; no escaping happens.
    pub fn raw(&mut self, bytes: &[u8]) {
        self.writer.get_mut().extend_from_slice(bytes);
    }

    /// Consumes the writer and returns the rendered bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.writer.into_inner()
    }

    fn with_attrs<'a>(name: &'a str, attrs: &[(&'a str, &'a str)]) -> BytesStart<'a> {
        let mut element = BytesStart::new(name);
        for (key, value) in attrs {
            element.push_attribute((*key, *value));
        }
        element
    }

    fn write(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| Error::operation("write_xml", e))
    }
}

impl Default for ExportWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn writes_nested_elements() {
        let mut out = ExportWriter::new();
        out.start_with("systemSettings", &[]).unwrap();
        out.element_with("entry", &[("key", "CAM_BASE_URL")], "http://localhost:7080")
            .unwrap();
        out.end("systemSettings").unwrap();

        let text = String::from_utf8(out.into_bytes()).unwrap();
        assert_eq!(
            text,
            "<systemSettings><entry key=\"CAM_BASE_URL\">http://localhost:7080</entry>\
             </systemSettings>"
        );
    }

    #[test]
    fn escapes_attribute_values() {
        let mut out = ExportWriter::new();
        out.empty_with("metricTemplate", &[("metricName", "a<b&c")])
            .unwrap();
        let text = String::from_utf8(out.into_bytes()).unwrap();
        assert!(text.contains("a&lt;b&amp;c"));
    }
}
