// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Estimator capability interface.
//!
//! The particle/point-mass filter is an opaque collaborator; this trait
//! captures exactly the operations the bridge drives. Geodetic-to-UTM
//! projection is the estimator library's concern, so measurement and pose
//! construction from MB1 live behind the trait as well.

use crate::mb1::Mb1;
use crate::trnu::Estimate;

/// Stage at which an estimator interaction failed (drives the one-line
/// error log; nothing is published for a failed cycle).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStage {
    MeasurementBuild,
    PoseBuild,
    Motion,
    Measurement,
    EstimateQuery,
}

impl std::fmt::Display for UpdateStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MeasurementBuild => "measurement build",
            Self::PoseBuild => "pose build",
            Self::Motion => "motion update",
            Self::Measurement => "measurement update",
            Self::EstimateQuery => "estimate query",
        };
        write!(f, "{s}")
    }
}

/// Estimator interaction failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstimatorError {
    pub stage: UpdateStage,
    pub detail: String,
}

impl EstimatorError {
    #[must_use]
    pub fn new(stage: UpdateStage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for EstimatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "estimator {} failed: {}", self.stage, self.detail)
    }
}

impl std::error::Error for EstimatorError {}

/// Sonar measurement in the estimator's frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Measurement time, epoch seconds.
    pub time: f64,
    /// Originating ping number.
    pub ping_number: u32,
    /// Beam triples (along, across, depth below transducer).
    pub beams: Vec<(f64, f64, f64)>,
}

/// Vehicle pose in the estimator's frame (UTM).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Pose time, epoch seconds.
    pub time: f64,
    /// Northing (m).
    pub n: f64,
    /// Easting (m).
    pub e: f64,
    /// Depth (m, +down).
    pub z: f64,
    /// Heading, radians east of north.
    pub heading: f64,
    /// Speed over ground (m/s).
    pub speed: f64,
}

/// Capability set of the opaque TRN estimator.
pub trait TrnEstimator: Send {
    /// Build a measurement from an MB1 record in the given UTM zone.
    fn measurement_from_mb1(&self, mb1: &Mb1, utm_zone: u32) -> Result<Measurement, EstimatorError>;

    /// Build a pose from an MB1 record in the given UTM zone.
    fn pose_from_mb1(&self, mb1: &Mb1, utm_zone: u32) -> Result<Pose, EstimatorError>;

    /// Propagate the filter with a vehicle pose.
    fn motion_update(&mut self, pose: &Pose) -> Result<(), EstimatorError>;

    /// Correct the filter with a sonar measurement.
    fn measurement_update(&mut self, meas: &Measurement) -> Result<(), EstimatorError>;

    /// The last measurement was accepted by the filter.
    fn last_measurement_successful(&self) -> bool;

    /// Dead-reckoned point estimate.
    fn estimate_point(&self) -> Result<Estimate, EstimatorError>;

    /// Maximum-likelihood bias estimate.
    fn estimate_mle(&self) -> Result<Estimate, EstimatorError>;

    /// Minimum-mean-squared-error bias estimate.
    fn estimate_mse(&self) -> Result<Estimate, EstimatorError>;

    /// Reset filter state, optionally clearing estimate history.
    fn reinit_filter(&mut self, clear_history: bool);

    /// Reinitializations since construction.
    fn num_reinits(&self) -> u32;

    /// Opaque filter-state discriminant.
    fn filter_state(&self) -> u32;

    /// The filter reports convergence.
    fn is_converged(&self) -> bool;
}

// ===== Built-in dead-reckoning stand-in =====

/// Dead-reckoning estimator used for bring-up and bench runs when no
/// terrain filter library is linked.
///
/// Carries the pose forward unchanged, reports zero bias (MLE/MSE equal
/// the point estimate), and grows covariance per motion update. The
/// lat/lon-to-meters conversion is a spherical approximation; a real
/// deployment projects through the filter library instead.
#[derive(Debug, Default)]
pub struct DeadReckonEstimator {
    pose: Option<Pose>,
    reinits: u32,
    meas_updates: u32,
    motion_updates: u32,
    last_meas_ok: bool,
}

/// Mean earth radius (m) for the spherical stand-in projection.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Covariance growth per motion update (m^2).
const DR_COV_STEP: f64 = 0.25;

/// Measurement updates before the stand-in reports convergence.
const DR_CONVERGE_COUNT: u32 = 5;

impl DeadReckonEstimator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn drift_cov(&self) -> [f64; 4] {
        let grown = DR_COV_STEP * f64::from(self.motion_updates);
        [grown, grown, grown * 0.5, 0.0]
    }

    fn current_estimate(&self, stage: UpdateStage) -> Result<Estimate, EstimatorError> {
        let pose = self
            .pose
            .ok_or_else(|| EstimatorError::new(stage, "no pose yet"))?;
        Ok(Estimate {
            time: pose.time,
            n: pose.n,
            e: pose.e,
            z: pose.z,
            cov: self.drift_cov(),
        })
    }
}

impl TrnEstimator for DeadReckonEstimator {
    fn measurement_from_mb1(&self, mb1: &Mb1, _utm_zone: u32) -> Result<Measurement, EstimatorError> {
        if mb1.soundings.is_empty() {
            return Err(EstimatorError::new(UpdateStage::MeasurementBuild, "no soundings"));
        }
        Ok(Measurement {
            time: mb1.ts,
            ping_number: mb1.ping_number,
            beams: mb1
                .soundings
                .iter()
                .map(|s| (s.along, s.across, s.depth))
                .collect(),
        })
    }

    fn pose_from_mb1(&self, mb1: &Mb1, _utm_zone: u32) -> Result<Pose, EstimatorError> {
        if !mb1.lat.is_finite() || !mb1.lon.is_finite() {
            return Err(EstimatorError::new(UpdateStage::PoseBuild, "non-finite position"));
        }
        Ok(Pose {
            time: mb1.ts,
            n: mb1.lat * EARTH_RADIUS_M,
            e: mb1.lon * EARTH_RADIUS_M * mb1.lat.cos(),
            z: mb1.depth,
            heading: mb1.hdg,
            speed: 0.0,
        })
    }

    fn motion_update(&mut self, pose: &Pose) -> Result<(), EstimatorError> {
        self.pose = Some(*pose);
        self.motion_updates += 1;
        Ok(())
    }

    fn measurement_update(&mut self, meas: &Measurement) -> Result<(), EstimatorError> {
        self.last_meas_ok = !meas.beams.is_empty();
        if self.last_meas_ok {
            self.meas_updates += 1;
        }
        Ok(())
    }

    fn last_measurement_successful(&self) -> bool {
        self.last_meas_ok
    }

    fn estimate_point(&self) -> Result<Estimate, EstimatorError> {
        self.current_estimate(UpdateStage::EstimateQuery)
    }

    fn estimate_mle(&self) -> Result<Estimate, EstimatorError> {
        self.current_estimate(UpdateStage::EstimateQuery)
    }

    fn estimate_mse(&self) -> Result<Estimate, EstimatorError> {
        self.current_estimate(UpdateStage::EstimateQuery)
    }

    fn reinit_filter(&mut self, clear_history: bool) {
        self.reinits += 1;
        self.motion_updates = 0;
        self.meas_updates = 0;
        self.last_meas_ok = false;
        if clear_history {
            self.pose = None;
        }
    }

    fn num_reinits(&self) -> u32 {
        self.reinits
    }

    fn filter_state(&self) -> u32 {
        u32::from(self.pose.is_some())
    }

    fn is_converged(&self) -> bool {
        self.meas_updates >= DR_CONVERGE_COUNT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mb1::Mb1Sounding;

    fn mb1() -> Mb1 {
        Mb1 {
            ts: 50.0,
            lat: 0.64,
            lon: -2.13,
            depth: 80.0,
            hdg: 0.5,
            ping_number: 7,
            soundings: vec![Mb1Sounding { beam: 1, along: 0.2, across: 3.0, depth: 42.0 }],
        }
    }

    #[test]
    fn test_dead_reckon_cycle() {
        let mut est = DeadReckonEstimator::new();
        let rec = mb1();

        let meas = est.measurement_from_mb1(&rec, 10).expect("meas");
        let pose = est.pose_from_mb1(&rec, 10).expect("pose");
        assert_eq!(meas.beams.len(), 1);

        est.motion_update(&pose).expect("motion");
        est.measurement_update(&meas).expect("measurement");
        assert!(est.last_measurement_successful());

        let pt = est.estimate_point().expect("pt");
        assert!((pt.n - pose.n).abs() < 1e-9);
        assert!(pt.cov[0] > 0.0);
    }

    #[test]
    fn test_estimates_fail_before_first_pose() {
        let est = DeadReckonEstimator::new();
        let err = est.estimate_point().expect_err("no pose yet");
        assert_eq!(err.stage, UpdateStage::EstimateQuery);
    }

    #[test]
    fn test_reinit_clears_history() {
        let mut est = DeadReckonEstimator::new();
        let rec = mb1();
        let pose = est.pose_from_mb1(&rec, 10).expect("pose");
        est.motion_update(&pose).expect("motion");

        est.reinit_filter(true);
        assert_eq!(est.num_reinits(), 1);
        assert!(est.estimate_point().is_err());
    }

    #[test]
    fn test_convergence_after_enough_measurements() {
        let mut est = DeadReckonEstimator::new();
        let rec = mb1();
        let pose = est.pose_from_mb1(&rec, 10).expect("pose");
        let meas = est.measurement_from_mb1(&rec, 10).expect("meas");
        est.motion_update(&pose).expect("motion");

        assert!(!est.is_converged());
        for _ in 0..DR_CONVERGE_COUNT {
            est.measurement_update(&meas).expect("measurement");
        }
        assert!(est.is_converged());
    }
}

