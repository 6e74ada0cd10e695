// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! File and datalist playback source.
//!
//! Replays recorded sonar data from a single file or a datalist: a text
//! file with one `path format [weight]` entry per line, `#` comments, and
//! nested datalists (negative format id). EOF on one file advances to the
//! next; exhausting the list ends the session normally.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::input::{FrameSource, ReadError, RecordKind, RecordMeta, SourceState};
use crate::record::kmall::{HeaderView, MIN_DATAGRAM_SIZE};
use crate::record::s7k::{FrameView, FRAME_CHECKSUM_SIZE, FRAME_HEADER_SIZE, MIN_FRAME_SIZE};

/// Maximum datalist nesting depth.
const MAX_DATALIST_DEPTH: usize = 10;

/// Largest record accepted from a file.
const MAX_FILE_RECORD: usize = 16 * 1024 * 1024;

/// On-disk record framing of a playback file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Back-to-back 7K data record frames.
    S7k,
    /// Back-to-back KMALL datagrams.
    Kmall,
}

impl FileFormat {
    /// Map an MBIO-style numeric format id.
    #[must_use]
    pub fn from_format_id(id: i32) -> Option<Self> {
        match id {
            88 | 89 => Some(Self::S7k),
            261 => Some(Self::Kmall),
            _ => None,
        }
    }
}

/// One playback entry.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: PathBuf,
    pub format: FileFormat,
    /// Datalist weighting (carried through, not interpreted here).
    pub weight: f64,
}

/// Internal control-flow outcome of a single-file read.
enum FileReadOutcome {
    /// Clean EOF or unrecoverable file damage: move on.
    NextFile,
    /// Record failed validation but the stream position is still sound.
    Malformed,
    /// No more entries.
    Exhausted,
}

/// Local file playback source.
pub struct FileSource {
    entries: Vec<FileEntry>,
    current: usize,
    reader: Option<BufReader<File>>,
    state: SourceState,
}

impl FileSource {
    /// Source over a single file.
    #[must_use]
    pub fn single(path: &Path, format: FileFormat) -> Self {
        Self {
            entries: vec![FileEntry {
                path: path.to_path_buf(),
                format,
                weight: 1.0,
            }],
            current: 0,
            reader: None,
            state: SourceState::Initialized,
        }
    }

    /// Source over a datalist file.
    pub fn from_datalist(path: &Path) -> Result<Self, ReadError> {
        let mut entries = Vec::new();
        collect_datalist(path, 0, &mut entries)?;
        if entries.is_empty() {
            log::warn!("[FILE] datalist {} holds no entries", path.display());
        }
        Ok(Self {
            entries,
            current: 0,
            reader: None,
            state: SourceState::Initialized,
        })
    }

    /// Entries remaining, including the one in progress.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.entries.len().saturating_sub(self.current)
    }

    fn advance(&mut self) {
        self.reader = None;
        self.current += 1;
    }

    fn read_from_current(&mut self, out: &mut Vec<u8>) -> Result<RecordMeta, FileReadOutcome> {
        let entry = self.entries.get(self.current).ok_or(FileReadOutcome::Exhausted)?;
        let format = entry.format;

        if self.reader.is_none() {
            let file = File::open(&entry.path).map_err(|e| {
                log::warn!("[FILE] cannot open {}: {e}", entry.path.display());
                FileReadOutcome::NextFile
            })?;
            log::info!("[FILE] reading {}", entry.path.display());
            self.reader = Some(BufReader::new(file));
            self.state = SourceState::Subscribed;
        }

        let reader = self.reader.as_mut().ok_or(FileReadOutcome::Exhausted)?;
        match format {
            FileFormat::Kmall => read_kmall_record(reader, out),
            FileFormat::S7k => read_s7k_record(reader, out),
        }
    }
}

impl FrameSource for FileSource {
    fn open(&mut self) -> Result<(), ReadError> {
        self.state = SourceState::Connected;
        Ok(())
    }

    fn read_record(&mut self, out: &mut Vec<u8>) -> Result<RecordMeta, ReadError> {
        loop {
            let before = out.len();
            match self.read_from_current(out) {
                Ok(meta) => return Ok(meta),
                Err(FileReadOutcome::Malformed) => {
                    out.truncate(before);
                    return Err(ReadError::Malformed);
                }
                Err(FileReadOutcome::NextFile) => {
                    out.truncate(before);
                    self.advance();
                }
                Err(FileReadOutcome::Exhausted) => {
                    out.truncate(before);
                    self.state = SourceState::Initialized;
                    return Err(ReadError::EndOfStream);
                }
            }
        }
    }

    fn close(&mut self) {
        self.reader = None;
        self.state = SourceState::Initialized;
    }

    fn state(&self) -> SourceState {
        self.state
    }
}

/// Read one KMALL datagram: leading length, body, trailing repeated length.
fn read_kmall_record(reader: &mut BufReader<File>, out: &mut Vec<u8>) -> Result<RecordMeta, FileReadOutcome> {
    let mut len_bytes = [0u8; 4];
    if !read_exact_or_eof(reader, &mut len_bytes)? {
        return Err(FileReadOutcome::NextFile);
    }
    let size = u32::from_le_bytes(len_bytes) as usize;
    if !(MIN_DATAGRAM_SIZE..=MAX_FILE_RECORD).contains(&size) {
        // length field unusable, cannot find the next record boundary
        return Err(FileReadOutcome::NextFile);
    }

    let mut record = vec![0u8; size];
    record[..4].copy_from_slice(&len_bytes);
    if !read_exact_or_eof(reader, &mut record[4..])? {
        return Err(FileReadOutcome::NextFile);
    }

    let hdr = HeaderView::new(&record);
    if !hdr.lengths_agree(&record) {
        return Err(FileReadOutcome::Malformed);
    }
    let meta = RecordMeta {
        kind: RecordKind::Kmall(hdr.kind()),
        len: record.len(),
        ts: hdr.timestamp(),
    };
    out.extend_from_slice(&record);
    Ok(meta)
}

/// Read one 7K frame and strip it to the record payload.
fn read_s7k_record(reader: &mut BufReader<File>, out: &mut Vec<u8>) -> Result<RecordMeta, FileReadOutcome> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    if !read_exact_or_eof(reader, &mut header)? {
        return Err(FileReadOutcome::NextFile);
    }

    let size = u32::from_le_bytes([header[8], header[9], header[10], header[11]]) as usize;
    if !(MIN_FRAME_SIZE..=MAX_FILE_RECORD).contains(&size) {
        return Err(FileReadOutcome::NextFile);
    }

    let mut frame = vec![0u8; size];
    frame[..FRAME_HEADER_SIZE].copy_from_slice(&header);
    if !read_exact_or_eof(reader, &mut frame[FRAME_HEADER_SIZE..])? {
        return Err(FileReadOutcome::NextFile);
    }

    let view = FrameView::new(&frame);
    if !view.is_valid() {
        // frame boundary held, so the next read can continue past it
        return Err(FileReadOutcome::Malformed);
    }
    let payload = &frame[FRAME_HEADER_SIZE..size - FRAME_CHECKSUM_SIZE];
    let meta = RecordMeta {
        kind: RecordKind::S7k(view.record_type()),
        len: payload.len(),
        ts: view.timestamp(),
    };
    out.extend_from_slice(payload);
    Ok(meta)
}

/// True on success, false on clean EOF before any byte.
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> Result<bool, FileReadOutcome> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(_) => Err(FileReadOutcome::NextFile),
    }
}

fn collect_datalist(path: &Path, depth: usize, entries: &mut Vec<FileEntry>) -> Result<(), ReadError> {
    if depth > MAX_DATALIST_DEPTH {
        log::warn!("[FILE] datalist nesting too deep at {}", path.display());
        return Ok(());
    }
    let file = File::open(path).map_err(ReadError::from)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    for line in BufReader::new(file).lines() {
        let line = line.map_err(ReadError::from)?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let Some(entry_path) = fields.next() else { continue };
        let format_id: i32 = match fields.next().and_then(|s| s.parse().ok()) {
            Some(v) => v,
            None => {
                log::warn!("[FILE] datalist entry missing format: {line}");
                continue;
            }
        };
        let weight: f64 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(1.0);

        let resolved = base.join(entry_path);
        if format_id < 0 {
            collect_datalist(&resolved, depth + 1, entries)?;
        } else if let Some(format) = FileFormat::from_format_id(format_id) {
            entries.push(FileEntry {
                path: resolved,
                format,
                weight,
            });
        } else {
            log::warn!("[FILE] unsupported format id {format_id} for {entry_path}");
        }
    }
    Ok(())
}
