//! Event sinks.
//!
//! The scanner hands every event of a cycle to an [`EventEmitter`] and calls
//! [`EventEmitter::flush`] once the cycle is complete. Only after `flush`
//! succeeds are the ids of removed groups returned to the free pool.

use std::fmt;
use std::io;

use crate::storage::EventLogWriter;
use crate::storage::model::EventRecord;

#[derive(Debug)]
pub enum EmitError {
    /// The sink's underlying writer failed.
    Io(io::Error),
    /// The record could not be encoded.
    Encode(String),
}

impl fmt::Display for EmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitError::Io(e) => write!(f, "emit I/O error: {}", e),
            EmitError::Encode(msg) => write!(f, "emit encode error: {}", msg),
        }
    }
}

impl std::error::Error for EmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EmitError::Io(e) => Some(e),
            EmitError::Encode(_) => None,
        }
    }
}

impl From<io::Error> for EmitError {
    fn from(e: io::Error) -> Self {
        EmitError::Io(e)
    }
}

impl From<postcard::Error> for EmitError {
    fn from(e: postcard::Error) -> Self {
        EmitError::Encode(e.to_string())
    }
}

#[cfg(feature = "json")]
impl From<serde_json::Error> for EmitError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            EmitError::Io(e.into())
        } else {
            EmitError::Encode(e.to_string())
        }
    }
}

/// Destination for change events.
pub trait EventEmitter {
    fn emit(&mut self, record: &EventRecord) -> Result<(), EmitError>;

    /// Makes everything emitted so far durable or visible downstream.
    fn flush(&mut self) -> Result<(), EmitError>;
}

impl<E: EventEmitter + ?Sized> EventEmitter for Box<E> {
    fn emit(&mut self, record: &EventRecord) -> Result<(), EmitError> {
        (**self).emit(record)
    }

    fn flush(&mut self) -> Result<(), EmitError> {
        (**self).flush()
    }
}

/// Collects records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<EventRecord>,
    pub flushes: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything collected so far.
    pub fn take(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.records)
    }
}

impl EventEmitter for MemorySink {
    fn emit(&mut self, record: &EventRecord) -> Result<(), EmitError> {
        self.records.push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EmitError> {
        self.flushes += 1;
        Ok(())
    }
}

/// Writes one JSON object per line.
#[cfg(feature = "json")]
pub struct JsonLinesSink<W: io::Write> {
    writer: W,
}

#[cfg(feature = "json")]
impl<W: io::Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(feature = "json")]
impl<W: io::Write> EventEmitter for JsonLinesSink<W> {
    fn emit(&mut self, record: &EventRecord) -> Result<(), EmitError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EmitError> {
        self.writer.flush()?;
        Ok(())
    }
}

impl EventEmitter for EventLogWriter {
    fn emit(&mut self, record: &EventRecord) -> Result<(), EmitError> {
        self.append(record)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EmitError> {
        self.sync()?;
        Ok(())
    }
}
