// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Log output sinks.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use parking_lot::Mutex;

/// A destination for formatted log lines.
pub trait Output: Send + Sync {
    /// Write one formatted line.
    fn write(&self, level: log::Level, line: &str);

    /// Flush buffered output.
    fn flush(&self) {}
}

/// Stderr sink.
pub struct ConsoleOutput;

impl Output for ConsoleOutput {
    fn write(&self, _level: log::Level, line: &str) {
        eprintln!("{line}");
    }
}

/// Session log file sink.
pub struct FileOutput {
    file: Mutex<File>,
}

impl FileOutput {
    /// Open (append) the session message log at `path`.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl Output for FileOutput {
    fn write(&self, _level: log::Level, line: &str) {
        let mut file = self.file.lock();
        // a failed log write must never take the pipeline down
        let _ = writeln!(file, "{line}");
    }

    fn flush(&self) {
        let _ = self.file.lock().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_output_appends_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.log");
        let out = FileOutput::open(&path).expect("open");

        out.write(log::Level::Info, "INFO  first");
        out.write(log::Level::Warn, "WARN  second");
        out.flush();

        let content = std::fs::read_to_string(&path).expect("read");
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["INFO  first", "WARN  second"]);
    }
}
