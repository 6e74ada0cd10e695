// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sounding selection: swath trim, decimation, along/across-track median.
//!
//! Runs once per process-ready ring step against the process-slot ping.
//! All rejection is expressed through the ping's filter flag array; sensor
//! flags are never modified, and a sounding whose raw flag is not OK can
//! never enter the selected set.

use crate::ping::SoundingFlag;
use crate::ring::PingRing;

/// Sounding filter parameters.
#[derive(Debug, Clone, Copy)]
pub struct FilterParams {
    /// Full swath width (degrees); soundings outside +/- half this angle
    /// from nadir are trimmed.
    pub swath_deg: f64,
    /// Target output sounding count K.
    pub n_out: usize,
    /// Across-track median neighborhood (beams).
    pub n_across: usize,
    /// Along-track median neighborhood (pings); equals the ring depth.
    pub n_along: usize,
    /// Median rejection threshold tau, fraction of the local median.
    pub threshold: f64,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            swath_deg: 90.0,
            n_out: 101,
            n_across: 1,
            n_along: 1,
            threshold: 0.5,
        }
    }
}

/// Per-step filter outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    /// First OK beam after swath trim (None when the trim left nothing).
    pub beam_start: Option<usize>,
    /// Last OK beam after swath trim.
    pub beam_end: Option<usize>,
    /// Soundings trimmed by the swath bound.
    pub trimmed: usize,
    /// Soundings dropped by decimation.
    pub decimated: usize,
    /// Soundings rejected by the median filter.
    pub median_flagged: usize,
    /// Soundings surviving all three stages.
    pub selected: usize,
}

/// Apply the filter to the current process slot.
///
/// Returns None when the ring has no process-ready slot (warm-up). A ping
/// whose swath trim leaves zero OK beams still yields an outcome with
/// `selected == 0`; the caller emits a zero-sounding record for it.
pub fn apply(params: &FilterParams, ring: &mut PingRing) -> Option<FilterOutcome> {
    let proc = ring.process_slot()?;
    let nbeams = proc.beam_count();
    let mut flags = proc.flag_filter.clone();
    let mut out = FilterOutcome::default();

    // --- swath trim ---
    let threshold_tangent = (0.5 * params.swath_deg.to_radians()).tan();
    let mut beam_start = nbeams;
    let mut beam_end = 0usize;
    for j in 0..nbeams {
        if !flags[j].is_ok() {
            continue;
        }
        let z = proc.bath[j] - proc.sonar_depth;
        let tangent = proc.across[j] / z;
        if !(tangent.abs() <= threshold_tangent) {
            flags[j] = SoundingFlag::FlaggedFilter;
            out.trimmed += 1;
        } else {
            beam_start = beam_start.min(j);
            beam_end = beam_end.max(j);
        }
    }

    if beam_start > beam_end {
        // nothing survived the trim; still a valid (empty) selection
        write_back(ring, flags);
        return Some(out);
    }
    out.beam_start = Some(beam_start);
    out.beam_end = Some(beam_end);

    // --- decimation stride ---
    let width = beam_end - beam_start + 1;
    let stride = width / params.n_out.max(1) + 1;

    // --- median filter over the along x across neighborhood ---
    let dj = params.n_across / 2;
    let n_total = params.n_along * params.n_across;
    let n_min = n_total / 2;
    let mut population: Vec<f64> = Vec::with_capacity(n_total);

    for j in beam_start..=beam_end {
        if (j - beam_start) % stride == 0 {
            if flags[j].is_ok() && n_total > 1 {
                population.clear();
                let jj0 = j.saturating_sub(dj).max(beam_start);
                let jj1 = (j + dj).min(beam_end);
                for p in ring.window() {
                    for jj in jj0..=jj1 {
                        if jj < p.beam_count() && p.raw_flag(jj).is_ok() {
                            population.push(p.bath[jj]);
                        }
                    }
                }
                population.sort_by(f64::total_cmp);

                // beams without enough neighbors to filter are rejected too
                let rejected = if population.len() < n_min.max(1) {
                    true
                } else {
                    let median = population[population.len() / 2];
                    (proc.bath[j] - median).abs() > params.threshold * median
                };
                if rejected {
                    flags[j] = SoundingFlag::FlaggedFilter;
                    out.median_flagged += 1;
                }
            }
            if flags[j].is_ok() {
                out.selected += 1;
            }
        } else if flags[j].is_ok() {
            flags[j] = SoundingFlag::FlaggedFilter;
            out.decimated += 1;
        }
    }

    write_back(ring, flags);
    Some(out)
}

fn write_back(ring: &mut PingRing, flags: Vec<SoundingFlag>) {
    if let Some(p) = ring.process_slot_mut() {
        p.flag_filter = flags;
    }
}
