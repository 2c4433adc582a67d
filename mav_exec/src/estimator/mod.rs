//! # Pose estimator
//!
//! The acquisition loop of the localisation system. Frames are read from the
//! image source and undistorted, tags are detected and chained through the
//! landmark map, and the resulting camera pose is published on the
//! `PoseChannel` for the control loop.
//!
//! The estimator runs on its own thread started by `PoseEstimator::spawn`.
//! The landmark map is only touched from that thread, and is handed back by
//! `EstimatorHandle::join` once the loop has stopped.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod channel;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use image::GrayImage;
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use util::archive::{ArchiveError, Archived, Archiver};
use util::session;

use crate::cam::{CamError, ImageSource, Undistorter};
use crate::loc::{find_3d_pose, Pose3D, PoseChainer};
use crate::pattern::PatternDictionary;
use crate::tag_det::{CameraIntrinsics, DetectorParams, TagDetector, TagGeometry};
pub use channel::PoseChannel;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Timing and failure handling of the acquisition loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimatorParams {
    /// Sleep after publishing a pose, capping the loop rate
    pub publish_sleep_ms: u64,

    /// Delay before retrying after a failed frame read
    pub read_retry_delay_ms: u64,

    /// Number of consecutive failed reads tolerated before the loop gives up
    pub max_consecutive_read_failures: usize,
}

/// Everything needed to build an estimator besides its image source.
#[derive(Debug, Clone)]
pub struct EstimatorConfig {
    pub intrinsics: CameraIntrinsics,
    pub geometry: TagGeometry,
    pub detector: DetectorParams,

    /// Every pattern the tag set may present, used to resolve orientation
    pub candidates: PatternDictionary,

    /// Chainer holding the seed and any pre-surveyed landmarks
    pub chainer: PoseChainer,

    pub params: EstimatorParams,
}

pub struct PoseEstimator {
    source: Box<dyn ImageSource + Send>,
    frame_size: (u32, u32),
    undistorter: Option<Undistorter>,
    detector: TagDetector,
    candidates: PatternDictionary,
    chainer: PoseChainer,
    params: EstimatorParams,

    arch: Option<Archiver>,
    last_pose: Option<Pose3D>,

    frames_processed: u64,
    poses_published: u64,
}

/// Handle on a running estimator thread.
pub struct EstimatorHandle {
    stop: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    join_handle: JoinHandle<Result<PoseEstimator, EstimatorError>>,
}

/// Archived form of a published pose.
#[derive(Debug, Clone, Copy, Serialize)]
struct PoseRecord {
    time_s: f64,
    x: f64,
    y: f64,
    z: f64,
    psi: f64,
    theta: f64,
    phi: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("Cannot open the image source: {0}")]
    OpenError(CamError),

    #[error("{0} consecutive frame reads failed, last error: {1}")]
    TooManyReadFailures(usize, CamError),

    #[error("The estimator thread panicked")]
    ThreadPanicked,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for EstimatorParams {
    fn default() -> Self {
        Self {
            publish_sleep_ms: 5,
            read_retry_delay_ms: 100,
            max_consecutive_read_failures: 10,
        }
    }
}

impl PoseEstimator {
    /// Open the image source and build the estimator.
    ///
    /// Failing to open the source is fatal.
    pub fn new(
        mut source: Box<dyn ImageSource + Send>,
        config: EstimatorConfig
    ) -> Result<Self, EstimatorError> {
        let frame_size = source.open().map_err(EstimatorError::OpenError)?;

        let undistorter = if config.intrinsics.has_distortion() {
            debug!("Building undistortion map for {}x{} frames", frame_size.0, frame_size.1);
            Some(Undistorter::new(&config.intrinsics, frame_size.0, frame_size.1))
        }
        else {
            None
        };

        Ok(Self {
            source,
            frame_size,
            undistorter,
            detector: TagDetector::new(config.geometry, config.intrinsics, config.detector),
            candidates: config.candidates,
            chainer: config.chainer,
            params: config.params,
            arch: None,
            last_pose: None,
            frames_processed: 0,
            poses_published: 0,
        })
    }

    /// Archive every published pose with the given archiver.
    pub fn with_archiver(mut self, arch: Archiver) -> Self {
        self.arch = Some(arch);
        self
    }

    pub fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }

    pub fn chainer(&self) -> &PoseChainer {
        &self.chainer
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn poses_published(&self) -> u64 {
        self.poses_published
    }

    /// Consume the estimator, returning the chainer and its landmark map.
    pub fn into_chainer(self) -> PoseChainer {
        self.chainer
    }

    /// Read the next frame and undistort it.
    pub fn acquire(&mut self) -> Result<GrayImage, CamError> {
        let frame = self.source.read_frame()?;

        if frame.dimensions() != self.frame_size {
            return Err(CamError::FrameSizeMismatch {
                expected: self.frame_size,
                found: frame.dimensions(),
            })
        }

        match self.undistorter {
            Some(ref u) => u.apply(&frame),
            None => Ok(frame)
        }
    }

    /// Run the vision pipeline on an undistorted frame, returning the camera
    /// pose in the world frame if a known tag was seen.
    ///
    /// Unknown tags seen alongside a known one are added to the landmark map.
    pub fn process_frame(&mut self, image: &GrayImage) -> Option<Pose3D> {
        self.frames_processed += 1;

        let tags = self.detector.find_candidate_tags(image, &self.candidates);
        trace!("Frame {}: {} candidate tags", self.frames_processed, tags.len());

        let cam_to_world = self.chainer.process(tags)?;

        Some(find_3d_pose(&cam_to_world.rotation_matrix(), &cam_to_world.translation))
    }

    /// Start the acquisition loop on a new thread, publishing on `channel`.
    pub fn spawn(self, channel: Arc<PoseChannel>) -> EstimatorHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));

        let stop_clone = stop.clone();
        let finished_clone = finished.clone();

        let join_handle = thread::spawn(move || {
            let result = self.run(channel, stop_clone);
            finished_clone.store(true, Ordering::Relaxed);
            result
        });

        EstimatorHandle { stop, finished, join_handle }
    }

    /// The acquisition loop, run until stopped or the source runs out.
    fn run(
        mut self,
        channel: Arc<PoseChannel>,
        stop: Arc<AtomicBool>
    ) -> Result<Self, EstimatorError> {
        info!("Pose estimator started");

        let mut consecutive_failures = 0usize;

        while !stop.load(Ordering::Relaxed) {
            let frame = match self.acquire() {
                Ok(f) => {
                    consecutive_failures = 0;
                    f
                },
                Err(CamError::EndOfStream) => {
                    info!("Image source has no more frames");
                    break;
                },
                Err(e) => {
                    consecutive_failures += 1;

                    if consecutive_failures > self.params.max_consecutive_read_failures {
                        error!("Giving up after {} failed frame reads: {}", consecutive_failures, e);
                        return Err(EstimatorError::TooManyReadFailures(consecutive_failures, e))
                    }

                    warn!("Frame read failed ({} in a row): {}", consecutive_failures, e);
                    thread::sleep(Duration::from_millis(self.params.read_retry_delay_ms));
                    continue;
                }
            };

            let num_landmarks = self.chainer.landmarks().len();

            let pose = self.process_frame(&frame);

            // Snapshot the map whenever it grows
            if self.chainer.landmarks().len() != num_landmarks {
                session::save_with_timestamp(
                    "landmarks/landmarks.json",
                    self.chainer.landmarks().to_records()
                );
            }

            if let Some(pose) = pose {
                trace!("Publishing pose {}", pose);

                channel.publish(pose);
                self.poses_published += 1;
                self.last_pose = Some(pose);

                if let Err(e) = self.write() {
                    warn!("Could not archive pose: {}", e);
                }

                thread::sleep(Duration::from_millis(self.params.publish_sleep_ms));
            }
        }

        info!(
            "Pose estimator stopped after {} frames, {} poses published, {} landmarks known",
            self.frames_processed,
            self.poses_published,
            self.chainer.landmarks().len()
        );

        Ok(self)
    }
}

impl Archived for PoseEstimator {
    fn write(&mut self) -> Result<(), ArchiveError> {
        let (arch, pose) = match (self.arch.as_mut(), self.last_pose) {
            (Some(a), Some(p)) => (a, p),
            _ => return Ok(())
        };

        arch.serialise(PoseRecord {
            time_s: session::get_elapsed_seconds(),
            x: pose.x,
            y: pose.y,
            z: pose.z,
            psi: pose.psi,
            theta: pose.theta,
            phi: pose.phi,
        })
    }
}

impl EstimatorHandle {
    /// Ask the loop to stop at the start of its next iteration.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Returns true once the loop has exited, either because it was stopped,
    /// the source ran out of frames or it failed.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }

    /// Wait for the loop to exit, returning the estimator.
    pub fn join(self) -> Result<PoseEstimator, EstimatorError> {
        match self.join_handle.join() {
            Ok(r) => r,
            Err(_) => Err(EstimatorError::ThreadPanicked)
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::pattern::PatternCodec;
    use crate::test_utils::{self, MemorySource, SceneRenderer};

    fn config(renderer: &SceneRenderer) -> EstimatorConfig {
        let codec = PatternCodec::new(3).unwrap();

        EstimatorConfig {
            intrinsics: renderer.intrinsics,
            geometry: renderer.geometry,
            detector: DetectorParams::default(),
            candidates: PatternDictionary::from_patterns(codec, &test_utils::PATTERNS),
            chainer: PoseChainer::new(codec, test_utils::SEED),
            params: EstimatorParams {
                publish_sleep_ms: 0,
                read_retry_delay_ms: 0,
                max_consecutive_read_failures: 3,
            },
        }
    }

    fn read_error() -> CamError {
        CamError::CaptureError(std::io::Error::new(std::io::ErrorKind::Other, "dropped frame"))
    }

    /// Source repeating a single frame forever.
    struct RepeatSource(GrayImage);

    impl ImageSource for RepeatSource {
        fn open(&mut self) -> Result<(u32, u32), CamError> {
            Ok(self.0.dimensions())
        }

        fn read_frame(&mut self) -> Result<GrayImage, CamError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_single_seed_frame() {
        let renderer = SceneRenderer::default();
        let l = renderer.geometry.outer_side();

        // Seed tag centred beneath the camera
        let frame = renderer.render(&[(test_utils::SEED, test_utils::tag_below(-l / 2.0, -l / 2.0, 45.0))]);
        let source = MemorySource::new(vec![Ok(frame)], renderer.width, renderer.height);

        let channel = Arc::new(PoseChannel::new());
        let estimator = PoseEstimator::new(Box::new(source), config(&renderer)).unwrap();
        let estimator = estimator.spawn(channel.clone()).join().unwrap();

        assert_eq!(estimator.frames_processed(), 1);
        assert_eq!(estimator.poses_published(), 1);
        assert!(channel.data_available());

        // The world frame is the seed tag's frame, whose z axis points away
        // from the camera, so the camera sits above its centre at negative z
        let pose = channel.get_pose();
        assert!((pose.x - l / 2.0).abs() < 1.0, "{}", pose);
        assert!((pose.y - l / 2.0).abs() < 1.0, "{}", pose);
        assert!((pose.z + 45.0).abs() < 1.0, "{}", pose);
        assert!(pose.psi.abs() < 0.05, "{}", pose);
        assert!(pose.theta.abs() < 0.05, "{}", pose);
        assert!(pose.phi.abs() < 0.05, "{}", pose);
    }

    #[test]
    fn test_no_known_tag_publishes_nothing() {
        let renderer = SceneRenderer::default();
        let frame = renderer.render(&[(test_utils::PATTERNS[1], test_utils::tag_below(-7.0, -7.0, 45.0))]);
        let source = MemorySource::new(vec![Ok(frame)], renderer.width, renderer.height);

        let channel = Arc::new(PoseChannel::new());
        let estimator = PoseEstimator::new(Box::new(source), config(&renderer))
            .unwrap()
            .spawn(channel.clone())
            .join()
            .unwrap();

        assert_eq!(estimator.frames_processed(), 1);
        assert_eq!(estimator.poses_published(), 0);
        assert!(!channel.data_available());

        // The unseen-with-seed tag is not registered
        assert_eq!(estimator.chainer().landmarks().len(), 1);
    }

    #[test]
    fn test_transient_read_failures() {
        let renderer = SceneRenderer::default();
        let l = renderer.geometry.outer_side();
        let frame = renderer.render(&[(test_utils::SEED, test_utils::tag_below(-l / 2.0, -l / 2.0, 45.0))]);

        let source = MemorySource::new(
            vec![
                Err(read_error()),
                Err(read_error()),
                Ok(GrayImage::new(32, 32)),
                Ok(frame),
            ],
            renderer.width,
            renderer.height
        );

        let channel = Arc::new(PoseChannel::new());
        let estimator = PoseEstimator::new(Box::new(source), config(&renderer))
            .unwrap()
            .spawn(channel.clone())
            .join()
            .unwrap();

        // Wrong-sized frame counts as a failed read rather than a frame
        assert_eq!(estimator.frames_processed(), 1);
        assert_eq!(estimator.poses_published(), 1);
    }

    #[test]
    fn test_too_many_read_failures() {
        let renderer = SceneRenderer::default();
        let source = MemorySource::new(
            (0..4).map(|_| Err(read_error())).collect(),
            renderer.width,
            renderer.height
        );

        let channel = Arc::new(PoseChannel::new());
        let result = PoseEstimator::new(Box::new(source), config(&renderer))
            .unwrap()
            .spawn(channel)
            .join();

        match result {
            Err(EstimatorError::TooManyReadFailures(n, _)) => assert_eq!(n, 4),
            _ => panic!("Expected the loop to give up")
        }
    }

    #[test]
    fn test_open_failure_is_fatal() {
        struct Unplugged;

        impl ImageSource for Unplugged {
            fn open(&mut self) -> Result<(u32, u32), CamError> {
                Err(CamError::NotOpen)
            }

            fn read_frame(&mut self) -> Result<GrayImage, CamError> {
                Err(CamError::NotOpen)
            }
        }

        let renderer = SceneRenderer::default();
        assert!(matches!(
            PoseEstimator::new(Box::new(Unplugged), config(&renderer)),
            Err(EstimatorError::OpenError(_))
        ));
    }

    #[test]
    fn test_stop() {
        let renderer = SceneRenderer::default();
        let l = renderer.geometry.outer_side();
        let frame = renderer.render(&[(test_utils::SEED, test_utils::tag_below(-l / 2.0, -l / 2.0, 45.0))]);

        let channel = Arc::new(PoseChannel::new());
        let handle = PoseEstimator::new(Box::new(RepeatSource(frame)), config(&renderer))
            .unwrap()
            .spawn(channel.clone());

        while !channel.data_available() {
            thread::sleep(Duration::from_millis(5));
        }

        assert!(!handle.is_finished());
        handle.stop();
        let estimator = handle.join().unwrap();
        assert!(estimator.poses_published() >= 1);
    }

    #[test]
    fn test_pose_archive() {
        let renderer = SceneRenderer::default();
        let l = renderer.geometry.outer_side();
        let frame = renderer.render(&[(test_utils::SEED, test_utils::tag_below(-l / 2.0, -l / 2.0, 45.0))]);
        let source = MemorySource::new(vec![Ok(frame.clone()), Ok(frame)], renderer.width, renderer.height);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poses.csv");

        PoseEstimator::new(Box::new(source), config(&renderer))
            .unwrap()
            .with_archiver(Archiver::from_file_path(&path).unwrap())
            .spawn(Arc::new(PoseChannel::new()))
            .join()
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "time_s,x,y,z,psi,theta,phi");
    }
}
