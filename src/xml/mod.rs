//! Export document plumbing.
//!
//! Exporters and validators write their payloads through [`ExportWriter`];
//! importers and validators get theirs back as [`XmlNode`] trees, with entity
//! lists streamed one entity at a time by [`DocumentParser`].

mod node;
mod parser;
mod writer;

pub use node::XmlNode;
pub use parser::{DocumentParser, EntitiesItem, Section, entity_payload};
pub use writer::ExportWriter;

use crate::{Error, Result};
use flate2::bufread::GzDecoder;
use std::io::{self, BufRead, BufReader, Read};

/// Root element of the export document.
pub const ROOT_ELEMENT: &str = "configuration-export";
/// Element carrying one consistency validator's exported state.
pub const VALIDATOR_ELEMENT: &str = "validator";
/// Element carrying one synchronizer's entities.
pub const ENTITIES_ELEMENT: &str = "entities";
/// Element wrapping a single exported entity.
pub const ENTITY_ELEMENT: &str = "entity";
/// Element wrapping an entity's payload.
pub const DATA_ELEMENT: &str = "data";
/// Element carrying the importer's default configuration instance.
pub const DEFAULT_CONFIGURATION_ELEMENT: &str = "default-configuration";
/// Attribute identifying validators and synchronizers.
pub const ID_ATTRIBUTE: &str = "id";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A reader over an export document that auto-detects gzip framing.
///
/// Export always produces gzip by default, but plain XML documents are
/// accepted on the way in.
pub enum DocumentSource<R: BufRead> {
    /// The input is plain XML.
    Plain(R),
    /// The input is gzipped; decompressed transparently.
    Gzip(BufReader<GzDecoder<R>>),
}

impl<R: BufRead> DocumentSource<R> {
    /// Sniffs the gzip magic and wraps the input accordingly.
    pub fn detect(mut input: R) -> Result<Self> {
        let head = input
            .fill_buf()
            .map_err(|e| Error::operation("read_export", e))?;
        if head.starts_with(&GZIP_MAGIC) {
            Ok(Self::Gzip(BufReader::new(GzDecoder::new(input))))
        } else {
            Ok(Self::Plain(input))
        }
    }
}

impl<R: BufRead> Read for DocumentSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(r) => r.read(buf),
            Self::Gzip(r) => r.read(buf),
        }
    }
}

impl<R: BufRead> BufRead for DocumentSource<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            Self::Plain(r) => r.fill_buf(),
            Self::Gzip(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            Self::Plain(r) => r.consume(amt),
            Self::Gzip(r) => r.consume(amt),
        }
    }
}
