// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP 7K frame stream adapter.
//!
//! Connects to a 7K center, subscribes to the fixed record set, and
//! delivers one data-record payload per read with frame headers stripped.
//! The stream carries no out-of-band delimiters, so a reader that loses
//! alignment (dropped bytes, mid-frame connect) hunts forward for the DRF
//! sync pattern; every byte discarded during the hunt is accumulated in the
//! sync-loss counter reported through statistics.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::input::{FrameSource, ReadError, RecordKind, RecordMeta, SourceState};
use crate::record::s7k::{
    self, FrameView, FRAME_CHECKSUM_SIZE, FRAME_HEADER_SIZE, MIN_FRAME_SIZE, SYNC_PATTERN,
};

/// Default 7K center port.
pub const DEFAULT_PORT: u16 = 7000;

/// Default internal frame buffer capacity (256 KiB).
pub const DEFAULT_CAPACITY: usize = 256 * 1024;

/// Default socket read timeout.
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

const RECV_CHUNK: usize = 16 * 1024;

/// TCP 7K frame stream source.
pub struct Reson7kSource {
    host: String,
    port: u16,
    capacity: usize,
    subscriptions: Vec<u32>,
    stream: Option<TcpStream>,
    state: SourceState,
    buf: Vec<u8>,
    sync_loss: u64,
    read_timeout: Duration,
}

impl Reson7kSource {
    /// Create a source for `host:port` with the standard subscription set.
    #[must_use]
    pub fn new(host: &str, port: u16, capacity: usize) -> Self {
        Self {
            host: host.to_string(),
            port,
            capacity: capacity.max(MIN_FRAME_SIZE),
            subscriptions: s7k::SUBSCRIPTION_SET.to_vec(),
            stream: None,
            state: SourceState::Initialized,
            buf: Vec::new(),
            sync_loss: 0,
            read_timeout: READ_TIMEOUT,
        }
    }

    /// Source with defaults for `host`.
    #[must_use]
    pub fn with_defaults(host: &str) -> Self {
        Self::new(host, DEFAULT_PORT, DEFAULT_CAPACITY)
    }

    /// Discard buffered stream state (called around reconnects).
    pub fn purge(&mut self) {
        self.buf.clear();
    }

    /// Align the buffer so a frame starts at offset zero (sync at 4).
    ///
    /// Returns false when more stream data is needed. Discarded bytes are
    /// added to the sync-loss counter.
    fn align(&mut self) -> bool {
        loop {
            if self.buf.len() < 8 {
                return false;
            }
            if rd_u32(&self.buf, 4) == SYNC_PATTERN {
                return true;
            }
            // Hunt for the next candidate sync window past the current one.
            match find_sync(&self.buf, 5) {
                Some(pos) => {
                    let drop = pos - 4;
                    self.buf.drain(..drop);
                    self.sync_loss += drop as u64;
                }
                None => {
                    // No candidate; keep a window's worth of tail bytes.
                    let keep = self.buf.len().min(7);
                    let drop = self.buf.len() - keep;
                    self.buf.drain(..drop);
                    self.sync_loss += drop as u64;
                    return false;
                }
            }
        }
    }

    /// Drop one leading byte after a false sync and re-align.
    fn skip_false_sync(&mut self) {
        if !self.buf.is_empty() {
            self.buf.drain(..1);
            self.sync_loss += 1;
        }
    }

    /// Extract the next complete, checksum-valid frame from the buffer.
    ///
    /// Appends the stripped payload to `out` and consumes the frame.
    /// Returns None when more stream data is needed; every byte discarded
    /// along the way lands in the sync-loss counter.
    fn take_frame(&mut self, out: &mut Vec<u8>) -> Option<RecordMeta> {
        loop {
            if !self.align() {
                return None;
            }
            let size = rd_u32(&self.buf, 8) as usize;
            if size < MIN_FRAME_SIZE || size > self.capacity {
                self.skip_false_sync();
                continue;
            }
            if self.buf.len() < size {
                return None;
            }
            let view = FrameView::new(&self.buf[..size]);
            if !view.is_valid() {
                self.skip_false_sync();
                continue;
            }
            let payload = &self.buf[FRAME_HEADER_SIZE..size - FRAME_CHECKSUM_SIZE];
            out.extend_from_slice(payload);
            let meta = RecordMeta {
                kind: RecordKind::S7k(view.record_type()),
                len: payload.len(),
                ts: view.timestamp(),
            };
            self.buf.drain(..size);
            return Some(meta);
        }
    }

    fn fill(&mut self) -> Result<(), ReadError> {
        let stream = self.stream.as_mut().ok_or(ReadError::Disconnected)?;
        let mut chunk = [0u8; RECV_CHUNK];
        match stream.read(&mut chunk) {
            Ok(0) => {
                log::info!("[7K] center closed connection");
                self.drop_connection();
                Err(ReadError::Disconnected)
            }
            Ok(n) => {
                self.buf.extend_from_slice(&chunk[..n]);
                Ok(())
            }
            Err(e) => {
                let err = ReadError::from(e);
                if err == ReadError::Disconnected {
                    self.drop_connection();
                }
                Err(err)
            }
        }
    }

    fn drop_connection(&mut self) {
        self.stream = None;
        self.state = SourceState::Initialized;
        self.purge();
    }

    fn subscribe(&mut self) -> Result<(), ReadError> {
        let frame = s7k::build_subscribe(&self.subscriptions, 0.0);
        let stream = self.stream.as_mut().ok_or(ReadError::Disconnected)?;
        stream.write_all(&frame)?;
        self.state = SourceState::Subscribed;
        log::info!(
            "[7K] subscribed {} record types at {}:{}",
            self.subscriptions.len(),
            self.host,
            self.port
        );
        Ok(())
    }
}

impl FrameSource for Reson7kSource {
    fn open(&mut self) -> Result<(), ReadError> {
        if self.stream.is_some() {
            return Ok(());
        }
        log::debug!("[7K] connecting to {}:{}", self.host, self.port);
        let stream = TcpStream::connect((self.host.as_str(), self.port))?;
        stream.set_read_timeout(Some(self.read_timeout))?;
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        self.state = SourceState::Connected;
        self.subscribe()
    }

    fn read_record(&mut self, out: &mut Vec<u8>) -> Result<RecordMeta, ReadError> {
        // Reconnection happens here, not in the controller: a disconnected
        // source re-opens and resubscribes on the next call.
        if self.stream.is_none() {
            if let Err(e) = self.open() {
                log::warn!("[7K] reconnect failed: {e}");
                return Err(e);
            }
        }

        loop {
            if let Some(meta) = self.take_frame(out) {
                return Ok(meta);
            }
            if self.buf.len() >= self.capacity {
                log::warn!(
                    "[7K] resync lost after {} bytes, purging stream buffer",
                    self.buf.len()
                );
                self.sync_loss += self.buf.len() as u64;
                self.purge();
                return Err(ReadError::ResyncLost);
            }
            self.fill()?;
        }
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            log::debug!("[7K] closed connection to {}:{}", self.host, self.port);
        }
        self.state = SourceState::Initialized;
        self.purge();
    }

    fn state(&self) -> SourceState {
        self.state
    }

    fn sync_loss_bytes(&self) -> u64 {
        self.sync_loss
    }
}

fn rd_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// First offset >= `from` where the sync pattern could start.
fn find_sync(buf: &[u8], from: usize) -> Option<usize> {
    if buf.len() < from + 4 {
        return None;
    }
    let pat = SYNC_PATTERN.to_le_bytes();
    (from..=buf.len() - 4).find(|&i| buf[i..i + 4] == pat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::s7k::{build_frame, build_sonar_settings, RECORD_SONAR_SETTINGS};

    /// Drive the framing path without a socket by feeding `buf` directly.
    fn parse_all(source: &mut Reson7kSource) -> Vec<(RecordMeta, Vec<u8>)> {
        let mut out = Vec::new();
        loop {
            let mut payload = Vec::new();
            match source.take_frame(&mut payload) {
                Some(meta) => out.push((meta, payload)),
                None => break,
            }
        }
        out
    }

    fn settings_frame(seq: u32) -> Vec<u8> {
        let payload = build_sonar_settings(seq, 210.0, 0.001, 30.0);
        build_frame(RECORD_SONAR_SETTINGS, 7125, seq, 100.0 + f64::from(seq), &payload)
    }

    #[test]
    fn test_clean_stream_parses_in_order() {
        let mut src = Reson7kSource::new("localhost", DEFAULT_PORT, DEFAULT_CAPACITY);
        for seq in 0..4 {
            src.buf.extend_from_slice(&settings_frame(seq));
        }
        let records = parse_all(&mut src);
        assert_eq!(records.len(), 4);
        for (seq, (meta, _)) in records.iter().enumerate() {
            assert_eq!(meta.kind, RecordKind::S7k(RECORD_SONAR_SETTINGS));
            assert!((meta.ts - (100.0 + seq as f64)).abs() < 1e-9);
        }
        assert_eq!(src.sync_loss_bytes(), 0);
    }

    #[test]
    fn test_resync_counts_injected_garbage() {
        let mut src = Reson7kSource::new("localhost", DEFAULT_PORT, DEFAULT_CAPACITY);
        let frame = settings_frame(1);

        // garbage free of 0xFF can never alias the sync pattern
        let garbage: Vec<u8> = (0..997).map(|i| (i % 251 + 1) as u8).collect();
        src.buf.extend_from_slice(&garbage);
        src.buf.extend_from_slice(&frame);

        let records = parse_all(&mut src);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1.len(), frame.len() - FRAME_HEADER_SIZE - FRAME_CHECKSUM_SIZE);
        assert_eq!(src.sync_loss_bytes(), garbage.len() as u64);
    }

    #[test]
    fn test_resync_random_garbage_lengths() {
        // any garbage prefix (sized at random, 0xFF excluded so the sync
        // pattern cannot alias) is counted exactly
        fastrand::seed(7);
        for _ in 0..16 {
            let mut src = Reson7kSource::new("localhost", DEFAULT_PORT, DEFAULT_CAPACITY);
            let glen = fastrand::usize(1..4096);
            let garbage: Vec<u8> = (0..glen)
                .map(|_| loop {
                    let b = fastrand::u8(..);
                    if b != 0xFF {
                        break b;
                    }
                })
                .collect();
            src.buf.extend_from_slice(&garbage);
            src.buf.extend_from_slice(&settings_frame(1));

            let records = parse_all(&mut src);
            assert_eq!(records.len(), 1);
            assert_eq!(src.sync_loss_bytes(), glen as u64);
        }
    }

    #[test]
    fn test_garbage_between_frames() {
        let mut src = Reson7kSource::new("localhost", DEFAULT_PORT, DEFAULT_CAPACITY);
        src.buf.extend_from_slice(&settings_frame(1));
        src.buf.extend_from_slice(&[0x42u8; 64]);
        src.buf.extend_from_slice(&settings_frame(2));

        let records = parse_all(&mut src);
        assert_eq!(records.len(), 2);
        assert_eq!(src.sync_loss_bytes(), 64);
    }

    #[test]
    fn test_corrupt_checksum_skipped() {
        let mut src = Reson7kSource::new("localhost", DEFAULT_PORT, DEFAULT_CAPACITY);
        let mut bad = settings_frame(1);
        let n = bad.len();
        bad[n - 1] ^= 0xFF; // checksum no longer matches
        src.buf.extend_from_slice(&bad);
        src.buf.extend_from_slice(&settings_frame(2));

        let records = parse_all(&mut src);
        assert_eq!(records.len(), 1);
        // the corrupt frame's bytes were consumed by the hunt
        assert!(src.sync_loss_bytes() > 0);
    }

    #[test]
    fn test_partial_frame_waits_for_more() {
        let mut src = Reson7kSource::new("localhost", DEFAULT_PORT, DEFAULT_CAPACITY);
        let frame = settings_frame(1);
        src.buf.extend_from_slice(&frame[..frame.len() / 2]);
        assert!(parse_all(&mut src).is_empty());
        src.buf.extend_from_slice(&frame[frame.len() / 2..]);
        assert_eq!(parse_all(&mut src).len(), 1);
    }
}
