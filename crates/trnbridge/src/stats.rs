// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pipeline event counters and cycle timing.
//!
//! Counters are plain fields bumped from the controller thread and emitted
//! through the log at the configured period. Flag bits select which
//! sections go out; a period of zero disables emission entirely.

use std::time::{Duration, Instant};

/// Statistics section selectors (`statflags` option).
pub mod flags {
    /// Event counters.
    pub const EVENTS: u32 = 0x1;
    /// Cycle timing.
    pub const TIMING: u32 = 0x2;
    /// Everything.
    pub const ALL: u32 = EVENTS | TIMING;
}

/// Running min/mean/max over recorded spans.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimingStat {
    pub n: u64,
    pub sum_s: f64,
    pub max_s: f64,
}

impl TimingStat {
    /// Record one span.
    pub fn record(&mut self, span: Duration) {
        let s = span.as_secs_f64();
        self.n += 1;
        self.sum_s += s;
        if s > self.max_s {
            self.max_s = s;
        }
    }

    /// Mean span in seconds (0 when empty).
    #[must_use]
    pub fn mean_s(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.sum_s / self.n as f64
        }
    }
}

/// Pipeline counters, one instance owned by the controller.
#[derive(Debug, Default)]
pub struct Stats {
    // cycle events
    pub mb_cycles: u64,
    pub mb_pub_n: u64,
    pub mb_log_n: u64,
    pub mb_connects: u64,
    pub mb_disconnects: u64,
    // sounding accounting
    pub soundings_read: u64,
    pub soundings_trimmed: u64,
    pub soundings_decimated: u64,
    pub soundings_flagged: u64,
    pub soundings_written: u64,
    // recoverable error counters (one per taxonomy kind)
    pub e_input_disconnect: u64,
    pub e_input_malformed: u64,
    pub e_resync_lost: u64,
    pub e_publish_send: u64,
    pub e_log_write: u64,
    pub e_estimator: u64,
    /// Bytes discarded hunting for frame sync (mirrored from the source).
    pub sync_loss_bytes: u64,
    // timing
    pub cycle_xt: TimingStat,
    pub trn_xt: TimingStat,
}

impl Stats {
    /// Emit selected sections through the log.
    pub fn emit(&self, flag_mask: u32) {
        if flag_mask & flags::EVENTS != 0 {
            log::info!(
                "[STAT] cycles {} pub {} log {} con {} dis {} sync_loss {}",
                self.mb_cycles,
                self.mb_pub_n,
                self.mb_log_n,
                self.mb_connects,
                self.mb_disconnects,
                self.sync_loss_bytes
            );
            log::info!(
                "[STAT] soundings read {} trim {} dec {} flag {} out {}",
                self.soundings_read,
                self.soundings_trimmed,
                self.soundings_decimated,
                self.soundings_flagged,
                self.soundings_written
            );
            log::info!(
                "[STAT] err disc {} malformed {} resync {} pub {} logwr {} est {}",
                self.e_input_disconnect,
                self.e_input_malformed,
                self.e_resync_lost,
                self.e_publish_send,
                self.e_log_write,
                self.e_estimator
            );
        }
        if flag_mask & flags::TIMING != 0 {
            log::info!(
                "[STAT] cycle_xt n {} mean {:.6}s max {:.6}s; trn_xt n {} mean {:.6}s max {:.6}s",
                self.cycle_xt.n,
                self.cycle_xt.mean_s(),
                self.cycle_xt.max_s,
                self.trn_xt.n,
                self.trn_xt.mean_s(),
                self.trn_xt.max_s
            );
        }
    }
}

/// Periodic emission schedule.
#[derive(Debug)]
pub struct StatSchedule {
    period: Duration,
    flag_mask: u32,
    last: Instant,
}

impl StatSchedule {
    /// Schedule with `period_sec` seconds between emissions; zero disables.
    #[must_use]
    pub fn new(period_sec: f64, flag_mask: u32) -> Self {
        Self {
            period: Duration::from_secs_f64(period_sec.max(0.0)),
            flag_mask,
            last: Instant::now(),
        }
    }

    /// Emit when the period elapsed.
    pub fn tick(&mut self, stats: &Stats, now: Instant) {
        if self.period.is_zero() || self.flag_mask == 0 {
            return;
        }
        if now.duration_since(self.last) >= self.period {
            stats.emit(self.flag_mask);
            self.last = now;
        }
    }
}
