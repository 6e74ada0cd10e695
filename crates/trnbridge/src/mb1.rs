// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MB1 record encoding and decoding.
//!
//! MB1 is the compact per-ping sounding record published to subscribers and
//! appended to the binary log.
//!
//! # Wire Format
//!
//! All multi-byte fields little-endian.
//!
//! ```text
//! +-------+------+----------+--------+--------+--------+--------+--------+-------+--------+
//! | 'MB1' | 0x00 | size u32 | ts f64 | lat f64| lon f64| dep f64| hdg f64| ping  | nsnd   |
//! | (3B)  | (1B) |          |        |        |        |        |        | u32   | u32    |
//! +-------+------+----------+--------+--------+--------+--------+--------+-------+--------+
//! | soundings[nsnd] x 28B: beam u32 | along f64 | across f64 | depth f64 |  chk u32       |
//! +------------------------------------------------------------------------ --------------+
//! ```
//!
//! - `size` is the total record size including the trailing checksum
//! - latitude/longitude are stored in radians, heading in radians east of north
//! - `chk` is the unsigned byte sum of every byte preceding it, mod 2^32

use crate::ping::{Ping, SoundingFlag};

/// MB1 record magic bytes.
pub const MB1_MAGIC: [u8; 3] = *b"MB1";

/// Fixed header size in bytes.
pub const MB1_HEADER_SIZE: usize = 56;

/// Per-sounding size in bytes.
pub const MB1_SOUNDING_SIZE: usize = 28;

/// Trailing checksum size in bytes.
pub const MB1_CHECKSUM_SIZE: usize = 4;

/// Error during MB1 decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mb1Error {
    /// Magic bytes do not match.
    BadMagic,
    /// Buffer shorter than the declared record size (or the fixed header).
    Short,
    /// Byte-sum checksum mismatch.
    BadChecksum,
}

impl std::fmt::Display for Mb1Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadMagic => write!(f, "bad MB1 magic"),
            Self::Short => write!(f, "short MB1 record"),
            Self::BadChecksum => write!(f, "MB1 checksum mismatch"),
        }
    }
}

impl std::error::Error for Mb1Error {}

/// One selected sounding in an MB1 record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mb1Sounding {
    /// Original beam index.
    pub beam: u32,
    /// Along-track offset (m, +forward).
    pub along: f64,
    /// Across-track offset (m, +starboard).
    pub across: f64,
    /// Depth below the transducer (m, +down).
    pub depth: f64,
}

/// Decoded (or to-be-encoded) MB1 record.
///
/// Latitude/longitude/heading are radians, matching the wire form.
#[derive(Debug, Clone, PartialEq)]
pub struct Mb1 {
    /// Sensor timestamp, seconds since the epoch.
    pub ts: f64,
    /// Latitude, radians.
    pub lat: f64,
    /// Longitude, radians.
    pub lon: f64,
    /// Transducer depth below the waterline (m).
    pub depth: f64,
    /// Heading, radians east of north.
    pub hdg: f64,
    /// Ping sequence number.
    pub ping_number: u32,
    /// Selected soundings, original beam order.
    pub soundings: Vec<Mb1Sounding>,
}

impl Mb1 {
    /// Build an MB1 record from the process-slot ping.
    ///
    /// Takes every sounding whose filter flag is still [`SoundingFlag::Ok`];
    /// depths are reported below the transducer (bath minus sonar depth).
    #[must_use]
    pub fn from_ping(ping: &Ping) -> Self {
        let soundings = (0..ping.beam_count())
            .filter(|&j| ping.filter_flag(j) == SoundingFlag::Ok)
            .map(|j| Mb1Sounding {
                beam: j as u32,
                along: ping.along[j],
                across: ping.across[j],
                depth: ping.bath[j] - ping.sonar_depth,
            })
            .collect();

        Self {
            ts: ping.ts,
            lat: ping.lat.to_radians(),
            lon: ping.lon.to_radians(),
            depth: ping.sonar_depth,
            hdg: ping.heading,
            ping_number: ping.ping_number,
            soundings,
        }
    }

    /// Total encoded size of this record, including the checksum.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        MB1_HEADER_SIZE + self.soundings.len() * MB1_SOUNDING_SIZE + MB1_CHECKSUM_SIZE
    }

    /// Encode into a fresh byte vector.
    ///
    /// Total for any valid record: the output length always equals
    /// [`Mb1::encoded_size`].
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let size = self.encoded_size();
        let mut buf = Vec::with_capacity(size);

        buf.extend_from_slice(&MB1_MAGIC);
        buf.push(0);
        buf.extend_from_slice(&(size as u32).to_le_bytes());
        buf.extend_from_slice(&self.ts.to_le_bytes());
        buf.extend_from_slice(&self.lat.to_le_bytes());
        buf.extend_from_slice(&self.lon.to_le_bytes());
        buf.extend_from_slice(&self.depth.to_le_bytes());
        buf.extend_from_slice(&self.hdg.to_le_bytes());
        buf.extend_from_slice(&self.ping_number.to_le_bytes());
        buf.extend_from_slice(&(self.soundings.len() as u32).to_le_bytes());

        for s in &self.soundings {
            buf.extend_from_slice(&s.beam.to_le_bytes());
            buf.extend_from_slice(&s.along.to_le_bytes());
            buf.extend_from_slice(&s.across.to_le_bytes());
            buf.extend_from_slice(&s.depth.to_le_bytes());
        }

        let chk = checksum(&buf);
        buf.extend_from_slice(&chk.to_le_bytes());
        buf
    }

    /// Decode and validate an MB1 record.
    ///
    /// # Errors
    ///
    /// - [`Mb1Error::BadMagic`] if the leading bytes are not `MB1\0`
    /// - [`Mb1Error::Short`] if the buffer is shorter than the declared size
    /// - [`Mb1Error::BadChecksum`] if the byte-sum check fails
    pub fn decode(buf: &[u8]) -> Result<Self, Mb1Error> {
        if buf.len() < MB1_HEADER_SIZE + MB1_CHECKSUM_SIZE {
            return Err(Mb1Error::Short);
        }
        if buf[0..3] != MB1_MAGIC || buf[3] != 0 {
            return Err(Mb1Error::BadMagic);
        }

        let size = rd_u32(buf, 4) as usize;
        if size < MB1_HEADER_SIZE + MB1_CHECKSUM_SIZE || buf.len() < size {
            return Err(Mb1Error::Short);
        }

        let nsound = rd_u32(buf, 52) as usize;
        if size != MB1_HEADER_SIZE + nsound * MB1_SOUNDING_SIZE + MB1_CHECKSUM_SIZE {
            return Err(Mb1Error::Short);
        }

        let stored = rd_u32(buf, size - MB1_CHECKSUM_SIZE);
        if stored != checksum(&buf[..size - MB1_CHECKSUM_SIZE]) {
            return Err(Mb1Error::BadChecksum);
        }

        let mut soundings = Vec::with_capacity(nsound);
        let mut off = MB1_HEADER_SIZE;
        for _ in 0..nsound {
            soundings.push(Mb1Sounding {
                beam: rd_u32(buf, off),
                along: rd_f64(buf, off + 4),
                across: rd_f64(buf, off + 12),
                depth: rd_f64(buf, off + 20),
            });
            off += MB1_SOUNDING_SIZE;
        }

        Ok(Self {
            ts: rd_f64(buf, 8),
            lat: rd_f64(buf, 16),
            lon: rd_f64(buf, 24),
            depth: rd_f64(buf, 32),
            hdg: rd_f64(buf, 40),
            ping_number: rd_u32(buf, 48),
            soundings,
        })
    }
}

/// Unsigned byte sum, mod 2^32.
#[must_use]
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)))
}

fn rd_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn rd_f64(buf: &[u8], off: usize) -> f64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[off..off + 8]);
    f64::from_le_bytes(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Mb1 {
        Mb1 {
            ts: 1712345678.25,
            lat: 0.6428,
            lon: -2.1302,
            depth: 85.4,
            hdg: 1.5708,
            ping_number: 4242,
            soundings: vec![
                Mb1Sounding { beam: 3, along: 0.5, across: -12.25, depth: 102.75 },
                Mb1Sounding { beam: 7, along: 0.5, across: -4.5, depth: 101.5 },
                Mb1Sounding { beam: 11, along: 0.5, across: 3.25, depth: 101.0 },
                Mb1Sounding { beam: 15, along: 0.5, across: 11.0, depth: 102.25 },
            ],
        }
    }

    #[test]
    fn test_encoded_size() {
        let rec = sample();
        assert_eq!(rec.encoded_size(), 56 + 4 * 28 + 4);
        assert_eq!(rec.encode().len(), rec.encoded_size());
    }

    #[test]
    fn test_roundtrip() {
        let rec = sample();
        let bytes = rec.encode();
        let back = Mb1::decode(&bytes).expect("decode");
        assert_eq!(back, rec);
    }

    #[test]
    fn test_zero_sounding_record_valid() {
        let mut rec = sample();
        rec.soundings.clear();
        let bytes = rec.encode();
        assert_eq!(bytes.len(), MB1_HEADER_SIZE + MB1_CHECKSUM_SIZE);
        let back = Mb1::decode(&bytes).expect("decode");
        assert!(back.soundings.is_empty());
        assert_eq!(back.ping_number, rec.ping_number);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = sample().encode();
        bytes[0] = b'X';
        assert_eq!(Mb1::decode(&bytes), Err(Mb1Error::BadMagic));
    }

    #[test]
    fn test_short_buffer() {
        let bytes = sample().encode();
        assert_eq!(Mb1::decode(&bytes[..40]), Err(Mb1Error::Short));
    }

    #[test]
    fn test_flipped_byte_detected() {
        // Flip one payload byte; the byte-sum must catch it.
        let mut bytes = sample().encode();
        bytes[60] ^= 0x01;
        assert_eq!(Mb1::decode(&bytes), Err(Mb1Error::BadChecksum));
    }

    #[test]
    fn test_checksum_is_byte_sum() {
        let bytes = sample().encode();
        let n = bytes.len();
        let stored = u32::from_le_bytes([bytes[n - 4], bytes[n - 3], bytes[n - 2], bytes[n - 1]]);
        let sum: u32 = bytes[..n - 4]
            .iter()
            .fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)));
        assert_eq!(stored, sum);
    }
}
