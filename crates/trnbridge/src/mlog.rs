// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session-stamped append-only binary log.
//!
//! Holds the MB1 tee log (and the optional raw-record tee). Writes are
//! locked internally so a future multi-producer arrangement stays sound;
//! the controller remains the only writer today.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Append-only binary record log.
pub struct BinLog {
    path: PathBuf,
    file: Mutex<File>,
    bytes: AtomicU64,
    records: AtomicU64,
}

impl BinLog {
    /// Create `<dir>/<name>-<session>.<ext>`, creating `dir` as needed.
    pub fn create(dir: &Path, name: &str, session: &str, ext: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{name}-{session}.{ext}"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        log::info!("[LOG] opened {}", path.display());
        Ok(Self {
            path,
            file: Mutex::new(file),
            bytes: AtomicU64::new(0),
            records: AtomicU64::new(0),
        })
    }

    /// Open an explicitly-named record file (the `output` option).
    pub fn create_at(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        log::info!("[LOG] opened {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            bytes: AtomicU64::new(0),
            records: AtomicU64::new(0),
        })
    }

    /// Append one record.
    pub fn append(&self, record: &[u8]) -> std::io::Result<()> {
        let mut file = self.file.lock();
        file.write_all(record)?;
        self.bytes.fetch_add(record.len() as u64, Ordering::Relaxed);
        self.records.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes appended so far.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Records appended so far.
    #[must_use]
    pub fn records_written(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }
}

/// Session-stamped append-only text log (CSV-style TRN update records).
pub struct TextLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl TextLog {
    /// Create `<dir>/<name>-<session>.<ext>`, creating `dir` as needed.
    pub fn create(dir: &Path, name: &str, session: &str, ext: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{name}-{session}.{ext}"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        log::info!("[LOG] opened {}", path.display());
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Append one line (newline added here).
    pub fn append_line(&self, line: &str) -> std::io::Result<()> {
        let mut file = self.file.lock();
        writeln!(file, "{line}")
    }

    /// Log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
