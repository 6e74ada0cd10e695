// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Estimator cycle orchestration.
//!
//! All access to the TRN estimator funnels through here. Per MB1 cycle:
//! gain arming decides whether the estimator may be touched at all,
//! decimation gating decides whether this cycle fires, and a fired cycle
//! runs the motion/measurement updates in timestamp order, queries the
//! three estimates, and gates validity before anything is published.

use std::time::Instant;

use crate::mb1::Mb1;
use crate::trn::estimator::{EstimatorError, TrnEstimator};
use crate::trnu::TrnUpdate;

/// Validity gates applied to the MSE estimate before publication.
#[derive(Debug, Clone, Copy)]
pub struct TrnLimits {
    /// Maximum accepted northing covariance (m^2).
    pub max_northing_cov: f64,
    /// Maximum accepted easting covariance (m^2).
    pub max_easting_cov: f64,
    /// Maximum accepted |mse.n - pt.n| (m).
    pub max_northing_err: f64,
    /// Maximum accepted |mse.e - pt.e| (m).
    pub max_easting_err: f64,
}

impl Default for TrnLimits {
    fn default() -> Self {
        Self {
            max_northing_cov: 49.0,
            max_easting_cov: 49.0,
            max_northing_err: 50.0,
            max_easting_err: 50.0,
        }
    }
}

/// Orchestrator counters surfaced through periodic statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrnCounters {
    /// MB1 cycles seen.
    pub mb1_cycles: u32,
    /// Cycles that fired the estimator.
    pub processed: u64,
    /// Filter reinitializations requested.
    pub reinits: u64,
    /// One-shot gain-low events.
    pub gain_lo: u64,
    /// Estimator interaction failures.
    pub failures: u64,
}

/// Guards and drives the opaque estimator.
pub struct TrnOrchestrator {
    estimator: Box<dyn TrnEstimator>,
    utm_zone: u32,
    gain_threshold: f64,
    /// `trn-nombgain`: process regardless of transmit gain.
    ignore_gain: bool,
    /// Fire every decn-th cycle when > 0.
    decn: u32,
    /// Fire at most every decs seconds when > 0 (and decn == 0).
    decs: f64,
    limits: TrnLimits,
    /// Reinit latch; armed at start and re-armed by low gain.
    reinit_required: bool,
    dec_cycles: u32,
    last_fire: Option<Instant>,
    reinit_time: f64,
    pub counters: TrnCounters,
}

impl TrnOrchestrator {
    #[must_use]
    pub fn new(
        estimator: Box<dyn TrnEstimator>,
        utm_zone: u32,
        gain_threshold: f64,
        ignore_gain: bool,
        decn: u32,
        decs: f64,
        limits: TrnLimits,
    ) -> Self {
        Self {
            estimator,
            utm_zone,
            gain_threshold,
            ignore_gain,
            decn,
            decs,
            limits,
            reinit_required: true,
            dec_cycles: 0,
            last_fire: None,
            reinit_time: 0.0,
            counters: TrnCounters::default(),
        }
    }

    /// Direct estimator access for the request/reply server.
    pub fn estimator_mut(&mut self) -> &mut dyn TrnEstimator {
        self.estimator.as_mut()
    }

    /// Run one MB1 cycle.
    ///
    /// `now` is a single monotonic reading taken by the caller (used for
    /// time decimation); `wall` is the epoch-seconds production timestamp
    /// stamped into the update. Returns the update to fan out, or None for
    /// gated, gain-skipped, empty, or failed cycles.
    pub fn on_mb1(&mut self, mb1: &Mb1, tx_gain: f64, now: Instant, wall: f64) -> Option<TrnUpdate> {
        self.counters.mb1_cycles += 1;

        // --- reinit-on-gain arming ---
        if !self.ignore_gain && tx_gain < self.gain_threshold {
            if !self.reinit_required {
                // one-shot: log only on the transition into low gain
                log::info!("[TRN] transmit gain lo [{tx_gain:.2}]");
                self.counters.gain_lo += 1;
            }
            self.reinit_required = true;
            return None;
        }

        // a record with no soundings never reaches the estimator, not even
        // for the armed reinit
        if mb1.soundings.is_empty() {
            log::debug!("[TRN] empty sounding set, ping {}", mb1.ping_number);
            return None;
        }

        if self.reinit_required {
            self.estimator.reinit_filter(true);
            self.reinit_required = false;
            self.reinit_time = wall;
            self.counters.reinits += 1;
            log::info!("[TRN] filter reinit gain [{tx_gain:.2}]");
        }

        // --- decimation gating ---
        if !self.gate(now) {
            return None;
        }

        self.counters.processed += 1;
        match self.update(mb1, wall) {
            Ok(update) => Some(update),
            Err(e) => {
                log::warn!("[TRN] {e}");
                self.counters.failures += 1;
                None
            }
        }
    }

    /// Count/time decimation. Resets the relevant counter on fire.
    fn gate(&mut self, now: Instant) -> bool {
        if self.decn > 0 {
            self.dec_cycles += 1;
            if self.dec_cycles % self.decn == 0 {
                self.dec_cycles = 0;
                return true;
            }
            return false;
        }
        if self.decs > 0.0 {
            let fire = match self.last_fire {
                Some(prev) => now.duration_since(prev).as_secs_f64() > self.decs,
                None => true,
            };
            if fire {
                self.last_fire = Some(now);
            }
            return fire;
        }
        true
    }

    fn update(&mut self, mb1: &Mb1, wall: f64) -> Result<TrnUpdate, EstimatorError> {
        let meas = self.estimator.measurement_from_mb1(mb1, self.utm_zone)?;
        let pose = self.estimator.pose_from_mb1(mb1, self.utm_zone)?;

        // the estimator documents motion-before-measurement for a pose at
        // or before the measurement time; reversed otherwise
        if pose.time <= meas.time {
            self.estimator.motion_update(&pose)?;
            self.estimator.measurement_update(&meas)?;
        } else {
            self.estimator.measurement_update(&meas)?;
            self.estimator.motion_update(&pose)?;
        }
        let success = self.estimator.last_measurement_successful();

        let pt = self.estimator.estimate_point()?;
        let mle = self.estimator.estimate_mle()?;
        let mse = self.estimator.estimate_mse()?;

        let is_valid = mb1.ts > 0.0
            && mse.cov[0] <= self.limits.max_northing_cov
            && mse.cov[1] <= self.limits.max_easting_cov
            && (mse.n - pt.n).abs() <= self.limits.max_northing_err
            && (mse.e - pt.e).abs() <= self.limits.max_easting_err;

        Ok(TrnUpdate {
            pt,
            mle,
            mse,
            reinit_count: self.estimator.num_reinits(),
            reinit_time: self.reinit_time,
            filter_state: self.estimator.filter_state(),
            success,
            is_converged: self.estimator.is_converged(),
            is_valid,
            mb1_cycle: self.counters.mb1_cycles,
            ping_number: mb1.ping_number,
            mb1_time: mb1.ts,
            update_time: wall,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mb1::Mb1Sounding;
    use crate::trn::estimator::{Measurement, Pose, UpdateStage};
    use crate::trnu::Estimate;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type CallLog = Arc<Mutex<Vec<&'static str>>>;

    /// Scripted estimator that records every call.
    #[derive(Default)]
    struct ScriptedEstimator {
        reinit_calls: u32,
        motion_calls: u32,
        meas_calls: u32,
        order: CallLog,
        fail_measurement_build: bool,
        mse_cov: [f64; 4],
        mse_offset: f64,
        /// Pose timestamp offset relative to the measurement time.
        pose_time_offset: f64,
    }

    impl TrnEstimator for ScriptedEstimator {
        fn measurement_from_mb1(&self, mb1: &Mb1, _utm: u32) -> Result<Measurement, EstimatorError> {
            if self.fail_measurement_build {
                return Err(EstimatorError::new(UpdateStage::MeasurementBuild, "scripted"));
            }
            Ok(Measurement {
                time: mb1.ts,
                ping_number: mb1.ping_number,
                beams: mb1.soundings.iter().map(|s| (s.along, s.across, s.depth)).collect(),
            })
        }

        fn pose_from_mb1(&self, mb1: &Mb1, _utm: u32) -> Result<Pose, EstimatorError> {
            Ok(Pose {
                time: mb1.ts + self.pose_time_offset,
                n: 1000.0,
                e: 2000.0,
                z: mb1.depth,
                heading: mb1.hdg,
                speed: 1.0,
            })
        }

        fn motion_update(&mut self, _pose: &Pose) -> Result<(), EstimatorError> {
            self.motion_calls += 1;
            self.order.lock().unwrap().push("motion");
            Ok(())
        }

        fn measurement_update(&mut self, _meas: &Measurement) -> Result<(), EstimatorError> {
            self.meas_calls += 1;
            self.order.lock().unwrap().push("measurement");
            Ok(())
        }

        fn last_measurement_successful(&self) -> bool {
            true
        }

        fn estimate_point(&self) -> Result<Estimate, EstimatorError> {
            Ok(Estimate { time: 1.0, n: 1000.0, e: 2000.0, z: 50.0, cov: [1.0; 4] })
        }

        fn estimate_mle(&self) -> Result<Estimate, EstimatorError> {
            Ok(Estimate { time: 1.0, n: 1001.0, e: 2001.0, z: 50.0, cov: [2.0; 4] })
        }

        fn estimate_mse(&self) -> Result<Estimate, EstimatorError> {
            Ok(Estimate {
                time: 1.0,
                n: 1000.0 + self.mse_offset,
                e: 2000.0,
                z: 50.0,
                cov: self.mse_cov,
            })
        }

        fn reinit_filter(&mut self, _clear_history: bool) {
            self.reinit_calls += 1;
            self.order.lock().unwrap().push("reinit");
        }

        fn num_reinits(&self) -> u32 {
            self.reinit_calls
        }

        fn filter_state(&self) -> u32 {
            2
        }

        fn is_converged(&self) -> bool {
            true
        }
    }

    fn mb1(ping: u32) -> Mb1 {
        Mb1 {
            ts: 100.0 + f64::from(ping),
            lat: 0.64,
            lon: -2.13,
            depth: 85.0,
            hdg: 1.0,
            ping_number: ping,
            soundings: vec![Mb1Sounding { beam: 0, along: 0.1, across: -1.0, depth: 50.0 }],
        }
    }

    fn orchestrator(est: ScriptedEstimator, threshold: f64, decn: u32, decs: f64) -> TrnOrchestrator {
        TrnOrchestrator::new(Box::new(est), 10, threshold, false, decn, decs, TrnLimits::default())
    }

    fn counters_of(o: &TrnOrchestrator) -> TrnCounters {
        o.counters
    }

    #[test]
    fn test_gain_gated_reinit_scenario() {
        // threshold 200: three pings at 150, one at 250
        let mut o = orchestrator(ScriptedEstimator::default(), 200.0, 0, 0.0);
        let t = Instant::now();

        assert!(o.on_mb1(&mb1(1), 150.0, t, 1.0).is_none());
        assert!(o.on_mb1(&mb1(2), 150.0, t, 2.0).is_none());
        assert!(o.on_mb1(&mb1(3), 150.0, t, 3.0).is_none());
        let update = o.on_mb1(&mb1(4), 250.0, t, 4.0).expect("update on ping 4");

        let c = counters_of(&o);
        // the latch starts armed, so the first low-gain pings log nothing
        assert_eq!(c.gain_lo, 0);
        assert_eq!(c.reinits, 1);
        assert_eq!(c.processed, 1);
        assert_eq!(update.reinit_count, 1);
        assert_eq!(update.ping_number, 4);
    }

    #[test]
    fn test_gain_drop_after_update_logs_once() {
        let mut o = orchestrator(ScriptedEstimator::default(), 200.0, 0, 0.0);
        let t = Instant::now();

        assert!(o.on_mb1(&mb1(1), 250.0, t, 1.0).is_some());
        // M consecutive low cycles, then recovery: exactly one more reinit
        for p in 2..=5 {
            assert!(o.on_mb1(&mb1(p), 150.0, t, f64::from(p)).is_none());
        }
        assert!(o.on_mb1(&mb1(6), 250.0, t, 6.0).is_some());

        let c = counters_of(&o);
        assert_eq!(c.gain_lo, 1, "one-shot event on the transition");
        assert_eq!(c.reinits, 2);
    }

    #[test]
    fn test_ignore_gain_processes_low_gain() {
        let mut o = TrnOrchestrator::new(
            Box::new(ScriptedEstimator::default()),
            10,
            200.0,
            true, // trn-nombgain
            0,
            0.0,
            TrnLimits::default(),
        );
        let t = Instant::now();
        assert!(o.on_mb1(&mb1(1), 0.0, t, 1.0).is_some());
        assert_eq!(o.counters.reinits, 1);
    }

    #[test]
    fn test_count_decimation() {
        let mut o = orchestrator(ScriptedEstimator::default(), 200.0, 3, 0.0);
        let t = Instant::now();
        let mut fired = 0;
        for p in 1..=9 {
            if o.on_mb1(&mb1(p), 250.0, t, f64::from(p)).is_some() {
                fired += 1;
            }
        }
        assert_eq!(fired, 3, "every third cycle fires");
    }

    #[test]
    fn test_time_decimation_single_clock() {
        let mut o = orchestrator(ScriptedEstimator::default(), 200.0, 0, 0.5);
        let t0 = Instant::now();

        assert!(o.on_mb1(&mb1(1), 250.0, t0, 1.0).is_some(), "first cycle fires");
        assert!(o.on_mb1(&mb1(2), 250.0, t0 + Duration::from_millis(100), 2.0).is_none());
        assert!(o.on_mb1(&mb1(3), 250.0, t0 + Duration::from_millis(700), 3.0).is_some());
        // the fire time is the instant passed in, not a second clock read
        assert!(o.on_mb1(&mb1(4), 250.0, t0 + Duration::from_millis(1100), 4.0).is_none());
        assert!(o.on_mb1(&mb1(5), 250.0, t0 + Duration::from_millis(1300), 5.0).is_some());
    }

    #[test]
    fn test_update_ordering_motion_first() {
        // pose time == measurement time: motion strictly before measurement
        let log: CallLog = CallLog::default();
        let est = ScriptedEstimator { order: Arc::clone(&log), ..ScriptedEstimator::default() };
        let mut o = orchestrator(est, 200.0, 0, 0.0);
        o.on_mb1(&mb1(1), 250.0, Instant::now(), 1.0).expect("update");
        assert_eq!(&*log.lock().unwrap(), &["reinit", "motion", "measurement"]);
    }

    #[test]
    fn test_update_ordering_reversed_for_late_pose() {
        let log: CallLog = CallLog::default();
        let est = ScriptedEstimator {
            order: Arc::clone(&log),
            pose_time_offset: 0.5,
            ..ScriptedEstimator::default()
        };
        let mut o = orchestrator(est, 200.0, 0, 0.0);
        o.on_mb1(&mb1(1), 250.0, Instant::now(), 1.0).expect("update");
        assert_eq!(&*log.lock().unwrap(), &["reinit", "measurement", "motion"]);
    }

    #[test]
    fn test_zero_sounding_skips_estimator() {
        let mut o = orchestrator(ScriptedEstimator::default(), 200.0, 0, 0.0);
        let t = Instant::now();
        let mut rec = mb1(1);
        rec.soundings.clear();
        assert!(o.on_mb1(&rec, 250.0, t, 1.0).is_none());
        // no estimator interaction at all, not even the armed reinit
        assert_eq!(o.counters.processed, 0);
        assert_eq!(o.counters.reinits, 0);

        // the next populated ping runs the armed reinit plus an update
        assert!(o.on_mb1(&mb1(2), 250.0, t, 2.0).is_some());
        assert_eq!(o.counters.reinits, 1);
    }

    #[test]
    fn test_estimator_failure_publishes_nothing() {
        let est = ScriptedEstimator { fail_measurement_build: true, ..ScriptedEstimator::default() };
        let mut o = orchestrator(est, 200.0, 0, 0.0);
        let t = Instant::now();
        assert!(o.on_mb1(&mb1(1), 250.0, t, 1.0).is_none());
        assert_eq!(o.counters.failures, 1);
    }

    #[test]
    fn test_validity_gate() {
        // tight covariance: valid
        let est = ScriptedEstimator { mse_cov: [1.0, 1.0, 1.0, 0.0], ..ScriptedEstimator::default() };
        let mut o = orchestrator(est, 200.0, 0, 0.0);
        let update = o.on_mb1(&mb1(1), 250.0, Instant::now(), 1.0).expect("update");
        assert!(update.is_valid);

        // blown northing covariance: invalid
        let est = ScriptedEstimator { mse_cov: [500.0, 1.0, 1.0, 0.0], ..ScriptedEstimator::default() };
        let mut o = orchestrator(est, 200.0, 0, 0.0);
        let update = o.on_mb1(&mb1(1), 250.0, Instant::now(), 1.0).expect("update");
        assert!(!update.is_valid);

        // northing error beyond the limit: invalid
        let est = ScriptedEstimator {
            mse_cov: [1.0, 1.0, 1.0, 0.0],
            mse_offset: 100.0,
            ..ScriptedEstimator::default()
        };
        let mut o = orchestrator(est, 200.0, 0, 0.0);
        let update = o.on_mb1(&mb1(1), 250.0, Instant::now(), 1.0).expect("update");
        assert!(!update.is_valid);
    }
}
