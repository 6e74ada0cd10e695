// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! KMALL datagram layouts (Kongsberg multicast).
//!
//! # Datagram Format
//!
//! Every datagram is little-endian with a 20-byte common header, and every
//! M-family record carries a 4-byte partition block immediately after it:
//!
//! ```text
//! +----------+---------+-----+-------+-----------+----------+--------------+
//! | nbytes   | type    | ver | sysid | sounderid | time_sec | time_nanosec |
//! | u32      | [u8;4]  | u8  | u8    | u16       | u32      | u32          |
//! +----------+---------+-----+-------+-----------+----------+--------------+
//! | numOfDgms u16 | dgmNum u16 | body ... | nbytes u32 (repeated)          |
//! +----------------------------------------------------------------------- +
//! ```
//!
//! `nbytes` counts the whole datagram including the repeated trailing copy;
//! the two must agree or the datagram is malformed. Records larger than one
//! datagram are split across `numOfDgms` pieces sharing (time_sec,
//! time_nanosec, numOfDgms); reassembly is the adapter's job
//! (see `input::kmall`).

use super::{rd_f32, rd_f64, rd_u16, rd_u32, wr_u16, wr_u32};

/// Common datagram header size.
pub const HEADER_SIZE: usize = 20;

/// Partition block size (M-family records).
pub const PARTITION_SIZE: usize = 4;

/// Trailing repeated-length size.
pub const TRAILING_SIZE: usize = 4;

/// Smallest datagram this module will look at.
pub const MIN_DATAGRAM_SIZE: usize = HEADER_SIZE + PARTITION_SIZE + TRAILING_SIZE;

/// Datagram family, classified from the 4-byte type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatagramKind {
    /// Installation parameters.
    Iip,
    /// Runtime parameters.
    Iop,
    /// Position sensor data.
    Spo,
    /// Attitude (KM binary) sensor data.
    Skm,
    /// Sound velocity profile.
    Svp,
    /// Sound velocity at transducer.
    Svt,
    /// Clock.
    Scl,
    /// Depth sensor.
    Sde,
    /// Height sensor.
    Shi,
    /// Heading sensor.
    Sha,
    /// Multibeam range and depth (bathymetry).
    Mrz,
    /// Multibeam water column.
    Mwc,
    /// Position compatibility.
    Cpo,
    /// Heave compatibility.
    Che,
    /// MB-system extension.
    Xmb,
    /// Comment extension.
    Xmc,
    /// Pseudo-sidescan extension.
    Xms,
    /// Anything else.
    Unknown,
}

impl DatagramKind {
    /// Classify a 4-byte type tag.
    #[must_use]
    pub fn from_tag(tag: &[u8; 4]) -> Self {
        match tag {
            b"#IIP" => Self::Iip,
            b"#IOP" => Self::Iop,
            b"#SPO" => Self::Spo,
            b"#SKM" => Self::Skm,
            b"#SVP" => Self::Svp,
            b"#SVT" => Self::Svt,
            b"#SCL" => Self::Scl,
            b"#SDE" => Self::Sde,
            b"#SHI" => Self::Shi,
            b"#SHA" => Self::Sha,
            b"#MRZ" => Self::Mrz,
            b"#MWC" => Self::Mwc,
            b"#CPO" => Self::Cpo,
            b"#CHE" => Self::Che,
            b"#XMB" => Self::Xmb,
            b"#XMC" => Self::Xmc,
            b"#XMS" => Self::Xms,
            _ => Self::Unknown,
        }
    }

    /// True for the multi-datagram M-family records.
    #[must_use]
    pub fn is_partitioned(self) -> bool {
        matches!(self, Self::Mrz | Self::Mwc)
    }
}

// ===== Header / partition views =====

/// Borrowed view over the common datagram header.
#[derive(Debug, Clone, Copy)]
pub struct HeaderView<'a> {
    buf: &'a [u8],
}

impl<'a> HeaderView<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Declared datagram size including the trailing repeated length.
    #[must_use]
    pub fn num_bytes(&self) -> usize {
        rd_u32(self.buf, 0) as usize
    }

    /// Raw 4-byte type tag.
    #[must_use]
    pub fn type_tag(&self) -> [u8; 4] {
        [self.buf[4], self.buf[5], self.buf[6], self.buf[7]]
    }

    /// Classified datagram family.
    #[must_use]
    pub fn kind(&self) -> DatagramKind {
        DatagramKind::from_tag(&self.type_tag())
    }

    #[must_use]
    pub fn time_sec(&self) -> u32 {
        rd_u32(self.buf, 12)
    }

    #[must_use]
    pub fn time_nanosec(&self) -> u32 {
        rd_u32(self.buf, 16)
    }

    /// Header timestamp as epoch seconds.
    #[must_use]
    pub fn timestamp(&self) -> f64 {
        f64::from(self.time_sec()) + f64::from(self.time_nanosec()) * 1e-9
    }

    /// Partition fields (only meaningful for M-family records).
    #[must_use]
    pub fn partition(&self) -> (u16, u16) {
        (rd_u16(self.buf, HEADER_SIZE), rd_u16(self.buf, HEADER_SIZE + 2))
    }

    /// Leading length agrees with the trailing repeated length.
    #[must_use]
    pub fn lengths_agree(&self, datagram: &[u8]) -> bool {
        let n = self.num_bytes();
        n >= MIN_DATAGRAM_SIZE
            && n == datagram.len()
            && rd_u32(datagram, n - TRAILING_SIZE) as usize == n
    }
}

// ===== MRZ view =====

/// Per-beam sounding in an MRZ record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MrzSounding {
    /// 0 = OK, 1 = no detection, 2+ = sonar-rejected.
    pub detection: u8,
    /// Depth below the waterline (m).
    pub z_m: f32,
    /// Across-track offset (m).
    pub across_m: f32,
    /// Along-track offset (m).
    pub along_m: f32,
    /// Detection quality metric.
    pub quality: f32,
}

/// MRZ body offset from record start (header + partition).
pub const MRZ_BODY: usize = HEADER_SIZE + PARTITION_SIZE;

/// Fixed MRZ body size before the sounding array.
pub const MRZ_FIXED: usize = 60;

/// Per-sounding entry size.
pub const MRZ_SOUNDING_SIZE: usize = 20;

/// Borrowed view over a complete (reassembled) MRZ record.
///
/// ```text
/// body+0  u32 ping_number
/// body+4  f64 latitude_deg
/// body+12 f64 longitude_deg
/// body+20 f32 heading_deg
/// body+24 f32 speed_mps
/// body+28 f32 roll_deg
/// body+32 f32 pitch_deg
/// body+36 f32 heave_m
/// body+40 f32 tx_depth_m
/// body+44 f32 tx_gain_db
/// body+48 f32 pulse_length_s
/// body+52 f32 rx_gain_db
/// body+56 u16 n_soundings
/// body+58 u16 reserved
/// body+60 soundings[n] x 20B: det u8 | pad[3] | z f32 | across f32 | along f32 | quality f32
/// ```
#[derive(Debug, Clone, Copy)]
pub struct MrzView<'a> {
    buf: &'a [u8],
}

impl<'a> MrzView<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Header timestamp as epoch seconds.
    #[must_use]
    pub fn timestamp(&self) -> f64 {
        HeaderView::new(self.buf).timestamp()
    }

    #[must_use]
    pub fn ping_number(&self) -> u32 {
        rd_u32(self.buf, MRZ_BODY)
    }

    #[must_use]
    pub fn latitude_deg(&self) -> f64 {
        rd_f64(self.buf, MRZ_BODY + 4)
    }

    #[must_use]
    pub fn longitude_deg(&self) -> f64 {
        rd_f64(self.buf, MRZ_BODY + 12)
    }

    #[must_use]
    pub fn heading_deg(&self) -> f32 {
        rd_f32(self.buf, MRZ_BODY + 20)
    }

    #[must_use]
    pub fn speed_mps(&self) -> f32 {
        rd_f32(self.buf, MRZ_BODY + 24)
    }

    #[must_use]
    pub fn roll_deg(&self) -> f32 {
        rd_f32(self.buf, MRZ_BODY + 28)
    }

    #[must_use]
    pub fn pitch_deg(&self) -> f32 {
        rd_f32(self.buf, MRZ_BODY + 32)
    }

    #[must_use]
    pub fn heave_m(&self) -> f32 {
        rd_f32(self.buf, MRZ_BODY + 36)
    }

    #[must_use]
    pub fn tx_depth_m(&self) -> f32 {
        rd_f32(self.buf, MRZ_BODY + 40)
    }

    #[must_use]
    pub fn tx_gain_db(&self) -> f32 {
        rd_f32(self.buf, MRZ_BODY + 44)
    }

    #[must_use]
    pub fn pulse_length_s(&self) -> f32 {
        rd_f32(self.buf, MRZ_BODY + 48)
    }

    #[must_use]
    pub fn rx_gain_db(&self) -> f32 {
        rd_f32(self.buf, MRZ_BODY + 52)
    }

    /// Number of soundings carried.
    #[must_use]
    pub fn sounding_count(&self) -> usize {
        rd_u16(self.buf, MRZ_BODY + 56) as usize
    }

    /// Sounding `i` (beam order).
    #[must_use]
    pub fn sounding(&self, i: usize) -> MrzSounding {
        let off = MRZ_BODY + MRZ_FIXED + i * MRZ_SOUNDING_SIZE;
        MrzSounding {
            detection: self.buf[off],
            z_m: rd_f32(self.buf, off + 4),
            across_m: rd_f32(self.buf, off + 8),
            along_m: rd_f32(self.buf, off + 12),
            quality: rd_f32(self.buf, off + 16),
        }
    }

    /// Record passes minimal structural validation.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.buf.len() >= MRZ_BODY + MRZ_FIXED + TRAILING_SIZE
            && self.buf.len()
                >= MRZ_BODY + MRZ_FIXED + self.sounding_count() * MRZ_SOUNDING_SIZE + TRAILING_SIZE
    }
}

// ===== Synthesis =====

/// Ping-level fields for MRZ synthesis.
#[derive(Debug, Clone, Copy)]
pub struct MrzFields {
    pub ping_number: u32,
    pub time_sec: u32,
    pub time_nanosec: u32,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub heading_deg: f32,
    pub speed_mps: f32,
    pub roll_deg: f32,
    pub pitch_deg: f32,
    pub heave_m: f32,
    pub tx_depth_m: f32,
    pub tx_gain_db: f32,
    pub pulse_length_s: f32,
    pub rx_gain_db: f32,
}

impl Default for MrzFields {
    fn default() -> Self {
        Self {
            ping_number: 1,
            time_sec: 1_700_000_000,
            time_nanosec: 0,
            latitude_deg: 36.7,
            longitude_deg: -122.0,
            heading_deg: 0.0,
            speed_mps: 1.5,
            roll_deg: 0.0,
            pitch_deg: 0.0,
            heave_m: 0.0,
            tx_depth_m: 10.0,
            tx_gain_db: 0.0,
            pulse_length_s: 0.001,
            rx_gain_db: 20.0,
        }
    }
}

/// Build a complete single-datagram MRZ record (partition {1,1}).
#[must_use]
pub fn build_mrz(fields: &MrzFields, soundings: &[MrzSounding]) -> Vec<u8> {
    let size = MRZ_BODY + MRZ_FIXED + soundings.len() * MRZ_SOUNDING_SIZE + TRAILING_SIZE;
    let mut buf = Vec::with_capacity(size);

    buf.extend_from_slice(&(size as u32).to_le_bytes());
    buf.extend_from_slice(b"#MRZ");
    buf.push(1); // dgmVersion
    buf.push(0); // systemID
    buf.extend_from_slice(&2040u16.to_le_bytes()); // echoSounderID
    buf.extend_from_slice(&fields.time_sec.to_le_bytes());
    buf.extend_from_slice(&fields.time_nanosec.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // numOfDgms
    buf.extend_from_slice(&1u16.to_le_bytes()); // dgmNum

    buf.extend_from_slice(&fields.ping_number.to_le_bytes());
    buf.extend_from_slice(&fields.latitude_deg.to_le_bytes());
    buf.extend_from_slice(&fields.longitude_deg.to_le_bytes());
    buf.extend_from_slice(&fields.heading_deg.to_le_bytes());
    buf.extend_from_slice(&fields.speed_mps.to_le_bytes());
    buf.extend_from_slice(&fields.roll_deg.to_le_bytes());
    buf.extend_from_slice(&fields.pitch_deg.to_le_bytes());
    buf.extend_from_slice(&fields.heave_m.to_le_bytes());
    buf.extend_from_slice(&fields.tx_depth_m.to_le_bytes());
    buf.extend_from_slice(&fields.tx_gain_db.to_le_bytes());
    buf.extend_from_slice(&fields.pulse_length_s.to_le_bytes());
    buf.extend_from_slice(&fields.rx_gain_db.to_le_bytes());
    buf.extend_from_slice(&(soundings.len() as u16).to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());

    for s in soundings {
        buf.push(s.detection);
        buf.extend_from_slice(&[0u8; 3]);
        buf.extend_from_slice(&s.z_m.to_le_bytes());
        buf.extend_from_slice(&s.across_m.to_le_bytes());
        buf.extend_from_slice(&s.along_m.to_le_bytes());
        buf.extend_from_slice(&s.quality.to_le_bytes());
    }

    buf.extend_from_slice(&(size as u32).to_le_bytes());
    buf
}

/// Split a complete record into `n` partition datagrams.
///
/// Each piece replicates the record header with its own length, carries
/// partition {numOfDgms: n, dgmNum: i+1}, and its own trailing repeated
/// length, the way a sounder splits records that exceed the datagram size.
#[must_use]
pub fn partition_record(record: &[u8], n: usize) -> Vec<Vec<u8>> {
    assert!(n >= 1);
    let body = &record[MRZ_BODY..record.len() - TRAILING_SIZE];
    let chunk = body.len().div_ceil(n);

    let mut pieces = Vec::with_capacity(n);
    for (i, part) in body.chunks(chunk.max(1)).enumerate() {
        let size = MRZ_BODY + part.len() + TRAILING_SIZE;
        let mut piece = Vec::with_capacity(size);
        piece.extend_from_slice(&record[..MRZ_BODY]);
        piece.extend_from_slice(part);
        piece.extend_from_slice(&(size as u32).to_le_bytes());
        wr_u32(&mut piece, 0, size as u32);
        wr_u16(&mut piece, HEADER_SIZE, n as u16);
        wr_u16(&mut piece, HEADER_SIZE + 2, (i + 1) as u16);
        pieces.push(piece);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn soundings(n: usize) -> Vec<MrzSounding> {
        (0..n)
            .map(|i| MrzSounding {
                detection: 0,
                z_m: 100.0 + i as f32,
                across_m: i as f32 - (n / 2) as f32,
                along_m: 0.5,
                quality: 0.8,
            })
            .collect()
    }

    #[test]
    fn test_header_classification() {
        let rec = build_mrz(&MrzFields::default(), &soundings(4));
        let hdr = HeaderView::new(&rec);
        assert_eq!(hdr.kind(), DatagramKind::Mrz);
        assert!(hdr.kind().is_partitioned());
        assert_eq!(hdr.partition(), (1, 1));
        assert!(hdr.lengths_agree(&rec));
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(DatagramKind::from_tag(b"#ZZZ"), DatagramKind::Unknown);
        assert_eq!(DatagramKind::from_tag(b"#SKM"), DatagramKind::Skm);
        assert!(!DatagramKind::Skm.is_partitioned());
    }

    #[test]
    fn test_mrz_view_roundtrip() {
        let fields = MrzFields {
            ping_number: 99,
            tx_gain_db: -12.5,
            ..MrzFields::default()
        };
        let snd = soundings(8);
        let rec = build_mrz(&fields, &snd);
        let view = MrzView::new(&rec);

        assert!(view.is_well_formed());
        assert_eq!(view.ping_number(), 99);
        assert_eq!(view.sounding_count(), 8);
        assert!((view.tx_gain_db() - -12.5).abs() < 1e-6);
        for (i, s) in snd.iter().enumerate() {
            assert_eq!(view.sounding(i), *s);
        }
    }

    #[test]
    fn test_partition_pieces_individually_well_formed() {
        let rec = build_mrz(&MrzFields::default(), &soundings(32));
        let pieces = partition_record(&rec, 3);
        assert_eq!(pieces.len(), 3);
        for (i, p) in pieces.iter().enumerate() {
            let hdr = HeaderView::new(p);
            assert!(hdr.lengths_agree(p));
            assert_eq!(hdr.partition(), (3, (i + 1) as u16));
        }
        // pieces carry the full body exactly once
        let total: usize = pieces.iter().map(Vec::len).sum();
        assert_eq!(total, rec.len() + 2 * (MRZ_BODY + TRAILING_SIZE));
    }
}
