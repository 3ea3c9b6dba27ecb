//! Append-only event log.
//!
//! Frame layout (repeated until EOF):
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ length: u32 LE   (payload bytes)             │
//! │ crc32:  u32 LE   (of payload)                │
//! │ payload: postcard(EventRecord)               │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! A crash can leave a torn frame at the tail. Readers stop at the first frame
//! whose length or checksum does not match; on open, the writer truncates the
//! file back to the last valid frame before appending.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::storage::model::EventRecord;

pub const FRAME_HEADER_SIZE: usize = 8;
/// Upper bound for one payload; anything larger is treated as corruption.
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Encodes one record as a complete frame.
pub fn encode_frame(record: &EventRecord) -> Result<Vec<u8>, postcard::Error> {
    let payload = postcard::to_allocvec(record)?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Scans `data` for valid frames. Returns the payload ranges and the byte
/// offset just past the last valid frame.
fn scan_frames(data: &[u8]) -> (Vec<std::ops::Range<usize>>, usize) {
    let mut frames = Vec::new();
    let mut pos = 0usize;

    while pos + FRAME_HEADER_SIZE <= data.len() {
        let length = u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
        let crc = u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]]);

        let start = pos + FRAME_HEADER_SIZE;
        let end = start + length as usize;
        if length > MAX_FRAME_SIZE || end > data.len() {
            break;
        }
        if crc32fast::hash(&data[start..end]) != crc {
            break;
        }

        frames.push(start..end);
        pos = end;
    }

    (frames, pos)
}

/// Appends framed records to a log file.
pub struct EventLogWriter {
    path: PathBuf,
    file: File,
    frames_written: u64,
}

impl EventLogWriter {
    /// Opens (or creates) the log, dropping any torn tail first.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;

        let data = fs::read(&path)?;
        let (_, valid_end) = scan_frames(&data);
        if valid_end < data.len() {
            warn!(
                "Event log {}: {} garbage bytes after last valid frame, truncating",
                path.display(),
                data.len() - valid_end
            );
            file.set_len(valid_end as u64)?;
        }

        Ok(Self {
            path,
            file,
            frames_written: 0,
        })
    }

    pub fn append(&mut self, record: &EventRecord) -> io::Result<()> {
        let frame = encode_frame(record).map_err(io::Error::other)?;
        self.file.write_all(&frame)?;
        self.frames_written += 1;
        Ok(())
    }

    /// Flushes and fsyncs the file.
    pub fn sync(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frames appended through this writer.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

/// Decoded contents of a log file.
pub struct EventLogReader {
    pub records: Vec<EventRecord>,
    /// Bytes after the last valid frame (torn tail or corruption).
    pub trailing_garbage: usize,
    pub file_size: usize,
}

impl EventLogReader {
    pub fn open(path: &Path) -> io::Result<Self> {
        let data = fs::read(path)?;
        Self::from_bytes(&data)
    }

    pub fn from_bytes(data: &[u8]) -> io::Result<Self> {
        let (frames, valid_end) = scan_frames(data);
        let mut records = Vec::with_capacity(frames.len());
        for range in frames {
            let record: EventRecord =
                postcard::from_bytes(&data[range]).map_err(io::Error::other)?;
            records.push(record);
        }
        Ok(Self {
            records,
            trailing_garbage: data.len() - valid_end,
            file_size: data.len(),
        })
    }
}
