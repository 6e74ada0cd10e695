// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Normalized per-ping sounding data and the vendor-record extractor.
//!
//! A [`Ping`] is one sonar cycle: pose, gain triple, and three parallel
//! sounding arrays with a raw flag array (sensor-provided) and a filter flag
//! array (downgraded by the sounding filter). Filter downgrades never
//! overwrite sensor flags; downstream products read the filter array.

use crate::record::kmall::MrzView;
use crate::record::s7k::{SonarSettingsView, RawDetectionView};

/// Compile-time beam capacity.
pub const MAX_BEAMS: usize = 512;

/// Per-sounding validity flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoundingFlag {
    /// Usable sounding.
    #[default]
    Ok,
    /// No detection for this beam.
    Null,
    /// Rejected by the sonar.
    FlaggedSonar,
    /// Rejected by the downstream filter.
    FlaggedFilter,
}

impl SoundingFlag {
    /// True when the sounding may contribute to downstream products.
    #[inline]
    #[must_use]
    pub fn is_ok(self) -> bool {
        matches!(self, SoundingFlag::Ok)
    }
}

/// Transmit/receive gain triple reported by the sonar.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GainTriple {
    /// Transmit gain (dB).
    pub transmit: f64,
    /// Pulse length (s).
    pub pulse_length: f64,
    /// Receive gain (dB).
    pub receive: f64,
}

/// One normalized sonar sounding cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Ping {
    /// Monotonic ping sequence number.
    pub ping_number: u32,
    /// Sensor timestamp, seconds since the epoch (microsecond resolution).
    pub ts: f64,
    /// Latitude, decimal degrees WGS-84.
    pub lat: f64,
    /// Longitude, decimal degrees WGS-84.
    pub lon: f64,
    /// Heading, radians east of north.
    pub heading: f64,
    /// Transducer depth below the waterline (m).
    pub sonar_depth: f64,
    /// Speed over ground (m/s).
    pub speed: f64,
    /// Roll (rad).
    pub roll: f64,
    /// Pitch (rad).
    pub pitch: f64,
    /// Heave (m).
    pub heave: f64,
    /// Gain triple for reinit gating.
    pub gains: GainTriple,
    /// Bathymetry (depth below the waterline, m), one per beam.
    pub bath: Vec<f64>,
    /// Along-track offsets (m), one per beam.
    pub along: Vec<f64>,
    /// Across-track offsets (m), one per beam.
    pub across: Vec<f64>,
    /// Sensor-provided flags. Never modified after extraction.
    pub flag_raw: Vec<SoundingFlag>,
    /// Filter flags, cloned from `flag_raw` at extraction.
    pub flag_filter: Vec<SoundingFlag>,
    /// Ring bookkeeping: distance from the process slot (see `ring`).
    pub(crate) slot_count: i32,
}

impl Ping {
    /// Number of beams carried by this ping.
    #[inline]
    #[must_use]
    pub fn beam_count(&self) -> usize {
        self.bath.len()
    }

    /// Sensor-provided flag for beam `j`.
    #[inline]
    #[must_use]
    pub fn raw_flag(&self, j: usize) -> SoundingFlag {
        self.flag_raw[j]
    }

    /// Filter flag for beam `j`.
    #[inline]
    #[must_use]
    pub fn filter_flag(&self, j: usize) -> SoundingFlag {
        self.flag_filter[j]
    }

    /// Count of soundings still usable after filtering.
    #[must_use]
    pub fn ok_count(&self) -> usize {
        self.flag_filter.iter().filter(|f| f.is_ok()).count()
    }
}

// ===== Extraction =====

/// Converts vendor records into [`Ping`] values.
///
/// Holds the small amount of cross-record state the 7K family needs (gains
/// arrive in sonar-settings records, bathymetry in raw-detection records) and
/// applies the transmit-gain threshold rule: a ping whose transmit gain is
/// below the sonar-specific threshold has every OK sounding downgraded to
/// [`SoundingFlag::FlaggedSonar`] before the filter flags are cloned.
#[derive(Debug)]
pub struct PingExtractor {
    /// Transmit-gain threshold applied to 7K pings (dB).
    pub gain_threshold_7k: f64,
    /// Transmit-gain threshold applied to KMALL pings (dB).
    pub gain_threshold_kmall: f64,
    // latest 7K sonar settings, paired with raw detections by arrival order
    s7k_gains: Option<GainTriple>,
}

/// Default 7K transmit-gain threshold (dB).
pub const GAIN_THRESHOLD_7K_DFL: f64 = 200.0;

/// Default KMALL transmit-gain threshold (dB).
pub const GAIN_THRESHOLD_KMALL_DFL: f64 = -20.0;

impl Default for PingExtractor {
    fn default() -> Self {
        Self {
            gain_threshold_7k: GAIN_THRESHOLD_7K_DFL,
            gain_threshold_kmall: GAIN_THRESHOLD_KMALL_DFL,
            s7k_gains: None,
        }
    }
}

impl PingExtractor {
    /// Create an extractor with explicit thresholds.
    #[must_use]
    pub fn new(gain_threshold_7k: f64, gain_threshold_kmall: f64) -> Self {
        Self {
            gain_threshold_7k,
            gain_threshold_kmall,
            s7k_gains: None,
        }
    }

    /// Record the gain triple from a 7K sonar-settings record (type 7000).
    pub fn note_s7k_settings(&mut self, view: &SonarSettingsView<'_>) {
        self.s7k_gains = Some(GainTriple {
            transmit: f64::from(view.tx_gain_db()),
            pulse_length: f64::from(view.pulse_length_s()),
            receive: f64::from(view.rx_gain_db()),
        });
    }

    /// Build a ping from a 7K raw-detection record (type 7027).
    ///
    /// Uses the gain triple from the most recent sonar-settings record;
    /// zeroed gains when none has been seen yet.
    #[must_use]
    pub fn extract_s7k(&mut self, view: &RawDetectionView<'_>, ts: f64) -> Ping {
        let gains = self.s7k_gains.unwrap_or_default();
        let n = view.detection_count();

        let mut ping = Ping {
            ping_number: view.ping_number(),
            ts,
            lat: view.latitude_deg(),
            lon: view.longitude_deg(),
            heading: f64::from(view.heading_deg()).to_radians(),
            sonar_depth: f64::from(view.tx_depth_m()),
            speed: f64::from(view.speed_mps()),
            roll: f64::from(view.roll_deg()).to_radians(),
            pitch: f64::from(view.pitch_deg()).to_radians(),
            heave: f64::from(view.heave_m()),
            gains,
            bath: Vec::with_capacity(n),
            along: Vec::with_capacity(n),
            across: Vec::with_capacity(n),
            flag_raw: Vec::with_capacity(n),
            flag_filter: Vec::with_capacity(n),
            slot_count: 0,
        };

        for i in 0..n {
            let d = view.detection(i);
            ping.bath.push(f64::from(d.depth_m) + ping.sonar_depth);
            ping.across.push(f64::from(d.across_m));
            ping.along.push(f64::from(d.along_m));
            ping.flag_raw.push(if !d.valid {
                SoundingFlag::Null
            } else if d.sonar_flagged {
                SoundingFlag::FlaggedSonar
            } else {
                SoundingFlag::Ok
            });
        }

        self.finish(&mut ping, self.gain_threshold_7k);
        ping
    }

    /// Build a ping from a reassembled KMALL MRZ record.
    #[must_use]
    pub fn extract_mrz(&mut self, view: &MrzView<'_>) -> Ping {
        let n = view.sounding_count();

        let mut ping = Ping {
            ping_number: view.ping_number(),
            ts: view.timestamp(),
            lat: view.latitude_deg(),
            lon: view.longitude_deg(),
            heading: f64::from(view.heading_deg()).to_radians(),
            sonar_depth: f64::from(view.tx_depth_m()),
            speed: f64::from(view.speed_mps()),
            roll: f64::from(view.roll_deg()).to_radians(),
            pitch: f64::from(view.pitch_deg()).to_radians(),
            heave: f64::from(view.heave_m()),
            gains: GainTriple {
                transmit: f64::from(view.tx_gain_db()),
                pulse_length: f64::from(view.pulse_length_s()),
                receive: f64::from(view.rx_gain_db()),
            },
            bath: Vec::with_capacity(n),
            along: Vec::with_capacity(n),
            across: Vec::with_capacity(n),
            flag_raw: Vec::with_capacity(n),
            flag_filter: Vec::with_capacity(n),
            slot_count: 0,
        };

        for i in 0..n {
            let s = view.sounding(i);
            ping.bath.push(f64::from(s.z_m));
            ping.across.push(f64::from(s.across_m));
            ping.along.push(f64::from(s.along_m));
            ping.flag_raw.push(match s.detection {
                0 => SoundingFlag::Ok,
                1 => SoundingFlag::Null,
                _ => SoundingFlag::FlaggedSonar,
            });
        }

        self.finish(&mut ping, self.gain_threshold_kmall);
        ping
    }

    // Gain thresholding, then clone raw flags into the filter array. Order
    // matters: the threshold downgrade is a sensor-level judgment and must be
    // visible to the raw array the median filter samples.
    fn finish(&self, ping: &mut Ping, threshold: f64) {
        if ping.gains.transmit < threshold {
            for f in &mut ping.flag_raw {
                if f.is_ok() {
                    *f = SoundingFlag::FlaggedSonar;
                }
            }
        }
        ping.flag_filter = ping.flag_raw.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::s7k;

    fn detection(depth: f32, across: f32) -> s7k::Detection {
        s7k::Detection {
            valid: true,
            sonar_flagged: false,
            depth_m: depth,
            across_m: across,
            along_m: 0.4,
            quality: 0.0,
        }
    }

    #[test]
    fn test_extract_s7k_pairs_latest_gains() {
        let mut ex = PingExtractor::default();

        let settings = s7k::build_sonar_settings(77, 210.0, 0.002, 30.0);
        ex.note_s7k_settings(&s7k::SonarSettingsView::new(&settings));

        let rec = s7k::build_raw_detection(
            77,
            36.7,
            -122.1,
            90.0,
            10.0,
            &[detection(95.0, -3.0), detection(96.0, 3.0)],
        );
        let ping = ex.extract_s7k(&s7k::RawDetectionView::new(&rec), 1000.0);

        assert_eq!(ping.ping_number, 77);
        assert_eq!(ping.beam_count(), 2);
        assert!((ping.gains.transmit - 210.0).abs() < 1e-9);
        // bath is depth-below-transducer plus transducer depth
        assert!((ping.bath[0] - (95.0 + 10.0)).abs() < 1e-6);
        assert!(ping.raw_flag(0).is_ok());
        assert!(ping.filter_flag(0).is_ok());
    }

    #[test]
    fn test_low_gain_downgrades_ok_soundings() {
        let mut ex = PingExtractor::default();

        let settings = s7k::build_sonar_settings(78, 150.0, 0.002, 30.0);
        ex.note_s7k_settings(&s7k::SonarSettingsView::new(&settings));

        let mut dets = vec![detection(95.0, -3.0), detection(96.0, 3.0)];
        dets[1].valid = false;
        let rec = s7k::build_raw_detection(78, 36.7, -122.1, 90.0, 10.0, &dets);
        let ping = ex.extract_s7k(&s7k::RawDetectionView::new(&rec), 1000.0);

        // OK soundings downgraded to sonar-flagged; NULL stays NULL
        assert_eq!(ping.raw_flag(0), SoundingFlag::FlaggedSonar);
        assert_eq!(ping.raw_flag(1), SoundingFlag::Null);
        assert_eq!(ping.filter_flag(0), SoundingFlag::FlaggedSonar);
        assert_eq!(ping.ok_count(), 0);
    }

    #[test]
    fn test_filter_flags_are_a_copy() {
        let mut ex = PingExtractor::default();
        let settings = s7k::build_sonar_settings(79, 210.0, 0.002, 30.0);
        ex.note_s7k_settings(&s7k::SonarSettingsView::new(&settings));

        let rec = s7k::build_raw_detection(79, 0.0, 0.0, 0.0, 5.0, &[detection(50.0, 0.0)]);
        let mut ping = ex.extract_s7k(&s7k::RawDetectionView::new(&rec), 1.0);

        ping.flag_filter[0] = SoundingFlag::FlaggedFilter;
        assert_eq!(ping.raw_flag(0), SoundingFlag::Ok);
    }
}
