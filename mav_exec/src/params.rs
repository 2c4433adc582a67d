//! # MAV Executable Parameters
//!
//! This module provides parameters for the MAV executable, loaded from
//! `mav_exec.toml`, and builds the localisation components from them.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::cam::CameraBackend;
use crate::estimator::{EstimatorConfig, EstimatorParams};
use crate::loc::{LandmarkRecord, PoseChainer};
use crate::pattern::{Pattern, PatternCodec, PatternDictionary, PatternError};
use crate::tag_det::{CameraIntrinsics, DetectorParams, TagGeometry};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MavExecParams {

    /// Width of the camera frames in pixels
    pub frame_width: u32,

    /// Height of the camera frames in pixels
    pub frame_height: u32,

    /// Every pattern the printed tag set contains, in canonical orientation
    pub candidate_patterns: Vec<Pattern>,

    /// Pattern of the tag defining the world frame
    pub seed_pattern: Pattern,

    /// Period of the control loop
    pub control_period_ms: u64,

    /// Time after which the executable stops, runs until killed if not set
    #[serde(default)]
    pub run_duration_s: Option<f64>,

    /// The camera to read frames from
    pub camera: CameraBackend,

    /// Calibration of the camera
    pub intrinsics: CameraIntrinsics,

    /// Dimensions of the printed tags
    pub geometry: TagGeometry,

    /// Tag detector tuning
    pub detector: DetectorParams,

    /// Acquisition loop timing and read retry policy
    pub estimator: EstimatorParams,

    /// Landmarks whose world poses are known before flight
    #[serde(default)]
    pub landmarks: Vec<LandmarkRecord>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("Invalid tag grid: {0}")]
    InvalidGrid(PatternError),

    #[error("Tag geometry dimensions must be positive")]
    InvalidGeometry,

    #[error("Camera intrinsics and frame size must be positive")]
    InvalidCamera,

    #[error("The control period must be positive")]
    InvalidControlPeriod,

    #[error("No candidate patterns were given")]
    NoCandidatePatterns,

    #[error("Pattern {0:#x} does not fit in the tag grid")]
    PatternOutOfRange(Pattern),

    #[error("Pattern {0:#x} is not one of the candidate patterns")]
    NotACandidate(Pattern),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MavExecParams {

    /// Check the parameters are usable, returning the pattern codec for the
    /// tag grid.
    pub fn validate(&self) -> Result<PatternCodec, ParamsError> {
        let codec = PatternCodec::new(self.geometry.grid_size)
            .map_err(ParamsError::InvalidGrid)?;

        if !self.geometry.is_valid() {
            return Err(ParamsError::InvalidGeometry)
        }

        let i = &self.intrinsics;
        if self.frame_width == 0 || self.frame_height == 0 || i.fx <= 0.0 || i.fy <= 0.0 {
            return Err(ParamsError::InvalidCamera)
        }

        if self.control_period_ms == 0 {
            return Err(ParamsError::InvalidControlPeriod)
        }

        if self.candidate_patterns.is_empty() {
            return Err(ParamsError::NoCandidatePatterns)
        }

        if let Some(p) = self.candidate_patterns.iter().find(|p| **p & !codec.mask() != 0) {
            return Err(ParamsError::PatternOutOfRange(*p))
        }

        let landmarks = self.landmarks.iter().map(|l| l.pattern);
        for p in std::iter::once(self.seed_pattern).chain(landmarks) {
            if !self.candidate_patterns.contains(&p) {
                return Err(ParamsError::NotACandidate(p))
            }
        }

        Ok(codec)
    }

    /// Build the estimator configuration, validating the parameters first.
    pub fn estimator_config(&self) -> Result<EstimatorConfig, ParamsError> {
        let codec = self.validate()?;

        let mut chainer = PoseChainer::new(codec, self.seed_pattern);
        for l in self.landmarks.iter() {
            chainer.add_landmark(l.pattern, l.to_transform());
        }

        Ok(EstimatorConfig {
            intrinsics: self.intrinsics,
            geometry: self.geometry,
            detector: self.detector,
            candidates: PatternDictionary::from_patterns(codec, &self.candidate_patterns),
            chainer,
            params: self.estimator,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
