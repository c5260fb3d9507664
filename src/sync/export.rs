//! The streaming exporter.
//!
//! [`ExportingReader`] assembles the export document lazily: nothing is
//! generated until `read` needs bytes, and at most one entity payload is
//! buffered at a time. There is no background thread; the state machine
//! advances on the calling thread.

use super::registry::SyncRegistry;
use super::{ConsistencyValidator, DynExporter};
use crate::models::{ExporterMessages, ImportConfig};
use crate::xml::{
    DEFAULT_CONFIGURATION_ELEMENT, ENTITIES_ELEMENT, ENTITY_ELEMENT, DATA_ELEMENT, ExportWriter,
    ID_ATTRIBUTE, ROOT_ELEMENT, VALIDATOR_ELEMENT,
};
use crate::{Error, Result};
use flate2::Compression;
use flate2::read::GzEncoder;
use std::collections::{BTreeMap, VecDeque};
use std::io::{self, Read};
use std::sync::{Arc, Mutex};

/// Options controlling export output framing.
#[derive(Debug, Clone, Copy)]
pub struct ExportOptions {
    /// Whether to gzip the document (the default).
    pub compress: bool,
    /// Gzip compression level, 0-9.
    pub level: u32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            compress: true,
            level: 6,
        }
    }
}

/// Shared handle to the per-synchronizer export messages.
///
/// Messages are populated while the export stream is consumed and are
/// complete once the reader hits end of stream.
#[derive(Clone)]
pub struct ExportMessages {
    inner: Arc<Mutex<BTreeMap<String, ExporterMessages>>>,
}

impl ExportMessages {
    fn new(ids: impl Iterator<Item = String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(
                ids.map(|id| (id, ExporterMessages::default())).collect(),
            )),
        }
    }

    /// Returns a snapshot of the messages collected so far.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, ExporterMessages> {
        match self.inner.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn update(&self, id: &str, apply: impl FnOnce(&mut ExporterMessages)) {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        apply(guard.entry(id.to_string()).or_default());
    }
}

struct Slot {
    id: &'static str,
    exporter: Box<dyn DynExporter>,
    default_config: ImportConfig,
}

enum StreamState {
    Prolog,
    NextSynchronizer,
    Streaming,
    Closed,
}

/// The raw (uncompressed) document state machine.
struct DocumentStream {
    validators: Vec<Box<dyn ConsistencyValidator>>,
    slots: VecDeque<Slot>,
    current: Option<Slot>,
    state: StreamState,
    buf: Vec<u8>,
    pos: usize,
    messages: ExportMessages,
}

impl DocumentStream {
    fn new(registry: &SyncRegistry) -> Result<Self> {
        let mut slots = VecDeque::new();
        let mut validator_ids: Vec<&'static str> = Vec::new();
        for synchronizer in registry.synchronizers() {
            for id in synchronizer.required_validators() {
                if !validator_ids.contains(id) {
                    validator_ids.push(id);
                }
            }
            let default_config = synchronizer
                .importer()
                .configuration_definition()
                .default_config();
            slots.push_back(Slot {
                id: synchronizer.id(),
                exporter: synchronizer.exporter(),
                default_config,
            });
        }

        let mut validators = Vec::new();
        for id in validator_ids {
            let validator = registry.validator(id).ok_or_else(|| {
                Error::operation(
                    "export",
                    format!("required consistency validator '{id}' is not registered"),
                )
            })?;
            validators.push(validator);
        }

        let messages = ExportMessages::new(slots.iter().map(|s| s.id.to_string()));
        Ok(Self {
            validators,
            slots,
            current: None,
            state: StreamState::Prolog,
            buf: Vec::new(),
            pos: 0,
            messages,
        })
    }

    /// Runs one step of the state machine, refilling the byte buffer.
    fn step(&mut self) -> Result<()> {
        self.buf.clear();
        self.pos = 0;

        match self.state {
            StreamState::Prolog => {
                let mut out = ExportWriter::new();
                out.declaration()?;
                out.start(ROOT_ELEMENT)?;
                for validator in &self.validators {
                    out.start_with(VALIDATOR_ELEMENT, &[(ID_ATTRIBUTE, validator.id())])?;
                    validator.export_state(&mut out)?;
                    out.end(VALIDATOR_ELEMENT)?;
                }
                self.buf = out.into_bytes();
                self.state = StreamState::NextSynchronizer;
            },
            StreamState::NextSynchronizer => match self.slots.pop_front() {
                None => {
                    let mut out = ExportWriter::new();
                    out.end(ROOT_ELEMENT)?;
                    self.buf = out.into_bytes();
                    self.state = StreamState::Closed;
                },
                Some(mut slot) => {
                    let mut out = ExportWriter::new();
                    out.start_with(ENTITIES_ELEMENT, &[(ID_ATTRIBUTE, slot.id)])?;
                    slot.default_config
                        .write_xml(DEFAULT_CONFIGURATION_ELEMENT, &mut out)?;
                    slot.exporter.begin()?;
                    self.buf = out.into_bytes();
                    self.current = Some(slot);
                    self.state = StreamState::Streaming;
                },
            },
            StreamState::Streaming => self.stream_entity()?,
            StreamState::Closed => {},
        }
        Ok(())
    }

    fn stream_entity(&mut self) -> Result<()> {
        let Some(slot) = self.current.as_mut() else {
            self.state = StreamState::NextSynchronizer;
            return Ok(());
        };

        // An advance failure aborts the whole stream; a failure while
        // writing one entity only stops this exporter.
        if slot.exporter.advance()? {
            let mut payload = ExportWriter::new();
            match slot.exporter.write_pending(&mut payload) {
                Ok(note) => {
                    let mut out = ExportWriter::new();
                    out.start(ENTITY_ELEMENT)?;
                    out.start(DATA_ELEMENT)?;
                    out.raw(&payload.into_bytes());
                    out.end(DATA_ELEMENT)?;
                    out.end(ENTITY_ELEMENT)?;
                    self.buf = out.into_bytes();
                    self.messages.update(slot.id, |m| {
                        m.exported += 1;
                        if let Some(note) = note {
                            m.entity_notes.push(note);
                        }
                    });
                    metrics::counter!("confsync_entities_exported_total", "synchronizer" => slot.id)
                        .increment(1);
                },
                Err(e) => {
                    tracing::warn!(
                        synchronizer = slot.id,
                        error = %e,
                        "entity export failed, skipping remainder of this synchronizer"
                    );
                    metrics::counter!("confsync_export_errors_total", "synchronizer" => slot.id)
                        .increment(1);
                    self.messages.update(slot.id, |m| m.errors.push(e.to_string()));
                    self.finish_current()?;
                },
            }
        } else {
            self.finish_current()?;
        }
        Ok(())
    }

    /// Closes the current `entities` element and records exporter notes.
    fn finish_current(&mut self) -> Result<()> {
        if let Some(slot) = self.current.take() {
            let notes = slot.exporter.notes();
            self.messages.update(slot.id, |m| m.notes = notes);
            let mut out = ExportWriter::new();
            out.end(ENTITIES_ELEMENT)?;
            self.buf = out.into_bytes();
        }
        self.state = StreamState::NextSynchronizer;
        Ok(())
    }
}

impl Read for DocumentStream {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.buf.len() {
            if matches!(self.state, StreamState::Closed) {
                return Ok(0);
            }
            self.step().map_err(io::Error::other)?;
        }
        let n = (self.buf.len() - self.pos).min(out.len());
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

enum Body {
    Plain(DocumentStream),
    Gzip(GzEncoder<DocumentStream>),
}

/// A reader producing the export document.
///
/// Gzip framing is applied by default; see [`ExportOptions`].
pub struct ExportingReader {
    body: Body,
    messages: ExportMessages,
}

impl ExportingReader {
    pub(crate) fn new(registry: &SyncRegistry, options: &ExportOptions) -> Result<Self> {
        let stream = DocumentStream::new(registry)?;
        let messages = stream.messages.clone();
        let body = if options.compress {
            Body::Gzip(GzEncoder::new(
                stream,
                Compression::new(options.level.min(9)),
            ))
        } else {
            Body::Plain(stream)
        };
        Ok(Self { body, messages })
    }

    /// Returns the shared messages handle.
    #[must_use]
    pub fn messages(&self) -> ExportMessages {
        self.messages.clone()
    }
}

impl Read for ExportingReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        match &mut self.body {
            Body::Plain(stream) => stream.read(out),
            Body::Gzip(stream) => stream.read(out),
        }
    }
}
