//! # Camera module
//!
//! Image sources feeding the localisation loop. All sources implement
//! `ImageSource`; which one is used is chosen by the `mav_exec.toml`
//! parameters at startup.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod file_seq;
pub mod undistort;
#[cfg(feature = "v4l")]
pub mod v4l;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::path::PathBuf;

use image::GrayImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use file_seq::FileSequenceSource;
pub use undistort::Undistorter;
#[cfg(feature = "v4l")]
pub use self::v4l::V4lCamera;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A source of grayscale frames.
pub trait ImageSource {
    /// Open the source, returning the frame size as `(width, height)`.
    ///
    /// Failing to open is fatal for the localisation loop.
    fn open(&mut self) -> Result<(u32, u32), CamError>;

    /// Read the next frame, blocking until one is available.
    fn read_frame(&mut self) -> Result<GrayImage, CamError>;
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The camera backend to use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CameraBackend {
    /// Video4Linux device, for example `/dev/video0`
    V4l {
        device: String,
    },

    /// Directory of image files replayed in name order
    FileSequence {
        directory: PathBuf,

        /// Restart from the first file once all have been read
        #[serde(default)]
        looping: bool,
    },
}

#[derive(Debug, Error)]
pub enum CamError {
    #[error("Cannot open camera device {0}: {1}")]
    DeviceOpenError(String, std::io::Error),

    #[error("Cannot start camera capture: {0}")]
    StartError(String),

    #[error("Frame capture failed: {0}")]
    CaptureError(std::io::Error),

    #[error("Cannot decode frame: {0}")]
    DecodeError(image::ImageError),

    #[error("Cannot read the image directory {0:?}: {1}")]
    DirectoryError(PathBuf, std::io::Error),

    #[error("No image files found in {0:?}")]
    NoFrames(PathBuf),

    #[error("Expected a {expected:?} frame but got {found:?}")]
    FrameSizeMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },

    #[error("Camera backend `{0}` is not available in this build")]
    BackendUnavailable(String),

    #[error("The image source has not been opened")]
    NotOpen,

    #[error("The image source has no more frames")]
    EndOfStream,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Create the image source for a backend, with the given requested frame
/// size.
pub fn create_source(
    backend: &CameraBackend,
    frame_size: (u32, u32)
) -> Result<Box<dyn ImageSource + Send>, CamError> {
    match backend {
        CameraBackend::FileSequence { directory, looping } => {
            Ok(Box::new(FileSequenceSource::new(directory.clone(), *looping)))
        },
        #[cfg(feature = "v4l")]
        CameraBackend::V4l { device } => {
            Ok(Box::new(V4lCamera::new(device, frame_size)))
        },
        #[cfg(not(feature = "v4l"))]
        CameraBackend::V4l { .. } => {
            let _ = frame_size;
            Err(CamError::BackendUnavailable(String::from("v4l")))
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
