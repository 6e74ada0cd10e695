// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! 7K frame and record layouts (Reson 7K center TCP stream).
//!
//! # Frame Format
//!
//! Every record travels in a data record frame (DRF), little-endian:
//!
//! ```text
//! +---------+--------+------------+----------+--------+----------+--------+--------+
//! | proto   | offset | sync       | size u32 | ts f64 | type u32 | dev    | seq    |
//! | u16 (5) | u16    | 0x0000FF00 |          |        |          | u32    | u32    |
//! +---------+--------+------------+----------+--------+----------+--------+--------+
//! | payload (size - 36 bytes)                                    | chk u32         |
//! +--------------------------------------------------------------+-----------------+
//! ```
//!
//! - `offset` is the byte offset of the payload from frame start (32)
//! - `size` is the total frame size including the trailing checksum
//! - `chk` is the unsigned byte sum of every preceding frame byte
//!
//! The stream has no out-of-band delimiters; a reader that loses alignment
//! scans forward for the sync pattern (see `input::reson7k`).

use super::{byte_sum, rd_f32, rd_f64, rd_u16, rd_u32};

/// DRF protocol version.
pub const PROTOCOL_VERSION: u16 = 5;

/// DRF sync pattern.
pub const SYNC_PATTERN: u32 = 0x0000_FF00;

/// DRF header size (payload offset).
pub const FRAME_HEADER_SIZE: usize = 32;

/// Trailing frame checksum size.
pub const FRAME_CHECKSUM_SIZE: usize = 4;

/// Smallest well-formed frame (header + checksum, empty payload).
pub const MIN_FRAME_SIZE: usize = FRAME_HEADER_SIZE + FRAME_CHECKSUM_SIZE;

// ===== Record type identifiers =====

/// Attitude record.
pub const RECORD_ATTITUDE: u32 = 1012;
/// Position record.
pub const RECORD_POSITION: u32 = 1003;
/// Depth record.
pub const RECORD_DEPTH: u32 = 1008;
/// Sonar settings record (carries the gain triple).
pub const RECORD_SONAR_SETTINGS: u32 = 7000;
/// Beam geometry record.
pub const RECORD_BEAM_GEOMETRY: u32 = 7004;
/// Raw detection record (carries bathymetry).
pub const RECORD_RAW_DETECTION: u32 = 7027;
/// Remote-control subscription request.
pub const RECORD_SUBSCRIBE: u32 = 7500;

/// Record types subscribed from the 7K center at connect/reconnect.
pub const SUBSCRIPTION_SET: [u32; 11] = [
    1003, 1006, 1008, 1010, 1012, 1013, 1015, 1016, 7000, 7004, 7027,
];

// ===== Frame view =====

/// Borrowed view over one complete DRF.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    buf: &'a [u8],
}

impl<'a> FrameView<'a> {
    /// Wrap a buffer starting at a frame boundary.
    ///
    /// The caller guarantees `buf` holds at least the declared frame size;
    /// the reader enforces this before constructing a view.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Declared total frame size including checksum.
    #[must_use]
    pub fn size(&self) -> usize {
        rd_u32(self.buf, 8) as usize
    }

    /// Frame timestamp, epoch seconds.
    #[must_use]
    pub fn timestamp(&self) -> f64 {
        rd_f64(self.buf, 12)
    }

    /// Record type identifier.
    #[must_use]
    pub fn record_type(&self) -> u32 {
        rd_u32(self.buf, 20)
    }

    /// Payload slice (frame headers stripped).
    #[must_use]
    pub fn payload(&self) -> &'a [u8] {
        &self.buf[FRAME_HEADER_SIZE..self.size() - FRAME_CHECKSUM_SIZE]
    }

    /// Validate the sync pattern, size bounds, and trailing checksum.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if self.buf.len() < MIN_FRAME_SIZE {
            return false;
        }
        if rd_u32(self.buf, 4) != SYNC_PATTERN {
            return false;
        }
        let size = self.size();
        if size < MIN_FRAME_SIZE || size > self.buf.len() {
            return false;
        }
        let stored = rd_u32(self.buf, size - FRAME_CHECKSUM_SIZE);
        stored == byte_sum(&self.buf[..size - FRAME_CHECKSUM_SIZE])
    }
}

/// Assemble a DRF around `payload`.
#[must_use]
pub fn build_frame(record_type: u32, device_id: u32, sequence: u32, ts: f64, payload: &[u8]) -> Vec<u8> {
    let size = FRAME_HEADER_SIZE + payload.len() + FRAME_CHECKSUM_SIZE;
    let mut buf = Vec::with_capacity(size);
    buf.extend_from_slice(&PROTOCOL_VERSION.to_le_bytes());
    buf.extend_from_slice(&(FRAME_HEADER_SIZE as u16).to_le_bytes());
    buf.extend_from_slice(&SYNC_PATTERN.to_le_bytes());
    buf.extend_from_slice(&(size as u32).to_le_bytes());
    buf.extend_from_slice(&ts.to_le_bytes());
    buf.extend_from_slice(&record_type.to_le_bytes());
    buf.extend_from_slice(&device_id.to_le_bytes());
    buf.extend_from_slice(&sequence.to_le_bytes());
    buf.extend_from_slice(payload);
    let chk = byte_sum(&buf);
    buf.extend_from_slice(&chk.to_le_bytes());
    buf
}

/// Build the subscription request sent to the 7K center.
///
/// Payload: record count u32 followed by one u32 per record type.
#[must_use]
pub fn build_subscribe(record_types: &[u32], ts: f64) -> Vec<u8> {
    let mut payload = Vec::with_capacity(4 + record_types.len() * 4);
    payload.extend_from_slice(&(record_types.len() as u32).to_le_bytes());
    for rt in record_types {
        payload.extend_from_slice(&rt.to_le_bytes());
    }
    build_frame(RECORD_SUBSCRIBE, 0, 0, ts, &payload)
}

// ===== Sonar settings (7000) =====

/// Borrowed view over a sonar-settings payload.
///
/// ```text
/// off 0  u32 ping_number
/// off 4  f32 frequency_hz
/// off 8  f32 tx_gain_db
/// off 12 f32 pulse_length_s
/// off 16 f32 rx_gain_db
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SonarSettingsView<'a> {
    buf: &'a [u8],
}

/// Sonar-settings payload size.
pub const SONAR_SETTINGS_SIZE: usize = 20;

impl<'a> SonarSettingsView<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    #[must_use]
    pub fn ping_number(&self) -> u32 {
        rd_u32(self.buf, 0)
    }

    #[must_use]
    pub fn tx_gain_db(&self) -> f32 {
        rd_f32(self.buf, 8)
    }

    #[must_use]
    pub fn pulse_length_s(&self) -> f32 {
        rd_f32(self.buf, 12)
    }

    #[must_use]
    pub fn rx_gain_db(&self) -> f32 {
        rd_f32(self.buf, 16)
    }
}

/// Build a sonar-settings payload.
#[must_use]
pub fn build_sonar_settings(ping_number: u32, tx_gain_db: f32, pulse_length_s: f32, rx_gain_db: f32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SONAR_SETTINGS_SIZE);
    buf.extend_from_slice(&ping_number.to_le_bytes());
    buf.extend_from_slice(&400_000.0f32.to_le_bytes());
    buf.extend_from_slice(&tx_gain_db.to_le_bytes());
    buf.extend_from_slice(&pulse_length_s.to_le_bytes());
    buf.extend_from_slice(&rx_gain_db.to_le_bytes());
    buf
}

// ===== Raw detection (7027) =====

/// One beam detection in a raw-detection record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// Sonar produced a detection on this beam.
    pub valid: bool,
    /// Sonar rejected the detection.
    pub sonar_flagged: bool,
    /// Depth below the transducer (m).
    pub depth_m: f32,
    /// Across-track offset (m).
    pub across_m: f32,
    /// Along-track offset (m).
    pub along_m: f32,
    /// Detection quality metric.
    pub quality: f32,
}

/// Raw-detection payload header size.
pub const RAW_DETECTION_FIXED: usize = 48;

/// Per-detection entry size.
pub const DETECTION_SIZE: usize = 20;

const DET_FLAG_VALID: u16 = 0x0001;
const DET_FLAG_SONAR: u16 = 0x0002;

/// Borrowed view over a raw-detection payload.
///
/// ```text
/// off 0  u32 ping_number
/// off 4  f64 latitude_deg
/// off 12 f64 longitude_deg
/// off 20 f32 heading_deg
/// off 24 f32 speed_mps
/// off 28 f32 roll_deg
/// off 32 f32 pitch_deg
/// off 36 f32 heave_m
/// off 40 f32 tx_depth_m
/// off 44 u32 n_detections
/// off 48 detections[n] x 20B: flags u16 | rsvd u16 | depth f32 | across f32 | along f32 | quality f32
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RawDetectionView<'a> {
    buf: &'a [u8],
}

impl<'a> RawDetectionView<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    #[must_use]
    pub fn ping_number(&self) -> u32 {
        rd_u32(self.buf, 0)
    }

    #[must_use]
    pub fn latitude_deg(&self) -> f64 {
        rd_f64(self.buf, 4)
    }

    #[must_use]
    pub fn longitude_deg(&self) -> f64 {
        rd_f64(self.buf, 12)
    }

    #[must_use]
    pub fn heading_deg(&self) -> f32 {
        rd_f32(self.buf, 20)
    }

    #[must_use]
    pub fn speed_mps(&self) -> f32 {
        rd_f32(self.buf, 24)
    }

    #[must_use]
    pub fn roll_deg(&self) -> f32 {
        rd_f32(self.buf, 28)
    }

    #[must_use]
    pub fn pitch_deg(&self) -> f32 {
        rd_f32(self.buf, 32)
    }

    #[must_use]
    pub fn heave_m(&self) -> f32 {
        rd_f32(self.buf, 36)
    }

    #[must_use]
    pub fn tx_depth_m(&self) -> f32 {
        rd_f32(self.buf, 40)
    }

    /// Number of beam detections carried.
    #[must_use]
    pub fn detection_count(&self) -> usize {
        rd_u32(self.buf, 44) as usize
    }

    /// Detection `i` (beam order).
    #[must_use]
    pub fn detection(&self, i: usize) -> Detection {
        let off = RAW_DETECTION_FIXED + i * DETECTION_SIZE;
        let flags = rd_u16(self.buf, off);
        Detection {
            valid: flags & DET_FLAG_VALID != 0,
            sonar_flagged: flags & DET_FLAG_SONAR != 0,
            depth_m: rd_f32(self.buf, off + 4),
            across_m: rd_f32(self.buf, off + 8),
            along_m: rd_f32(self.buf, off + 12),
            quality: rd_f32(self.buf, off + 16),
        }
    }

    /// Payload passes minimal structural validation.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.buf.len() >= RAW_DETECTION_FIXED
            && self.buf.len() >= RAW_DETECTION_FIXED + self.detection_count() * DETECTION_SIZE
    }
}

/// Build a raw-detection payload.
#[must_use]
pub fn build_raw_detection(
    ping_number: u32,
    latitude_deg: f64,
    longitude_deg: f64,
    heading_deg: f32,
    tx_depth_m: f32,
    detections: &[Detection],
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(RAW_DETECTION_FIXED + detections.len() * DETECTION_SIZE);
    buf.extend_from_slice(&ping_number.to_le_bytes());
    buf.extend_from_slice(&latitude_deg.to_le_bytes());
    buf.extend_from_slice(&longitude_deg.to_le_bytes());
    buf.extend_from_slice(&heading_deg.to_le_bytes());
    buf.extend_from_slice(&0.0f32.to_le_bytes()); // speed
    buf.extend_from_slice(&0.0f32.to_le_bytes()); // roll
    buf.extend_from_slice(&0.0f32.to_le_bytes()); // pitch
    buf.extend_from_slice(&0.0f32.to_le_bytes()); // heave
    buf.extend_from_slice(&tx_depth_m.to_le_bytes());
    buf.extend_from_slice(&(detections.len() as u32).to_le_bytes());
    for d in detections {
        let mut flags = 0u16;
        if d.valid {
            flags |= DET_FLAG_VALID;
        }
        if d.sonar_flagged {
            flags |= DET_FLAG_SONAR;
        }
        buf.extend_from_slice(&flags.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&d.depth_m.to_le_bytes());
        buf.extend_from_slice(&d.across_m.to_le_bytes());
        buf.extend_from_slice(&d.along_m.to_le_bytes());
        buf.extend_from_slice(&d.quality.to_le_bytes());
    }
    buf
}
