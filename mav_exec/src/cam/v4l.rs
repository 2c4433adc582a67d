//! # Video4Linux camera
//!
//! Captures MJPG frames from a V4L device and converts them to grayscale.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use image::GrayImage;
use log::{info, warn};
use rscam::{Camera, Config};

use super::{CamError, ImageSource};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Frame interval requested from the device, as (numerator, denominator)
/// seconds.
const FRAME_INTERVAL: (u32, u32) = (1, 30);

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

pub struct V4lCamera {
    device: String,
    resolution: (u32, u32),
    camera: Option<Camera>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl V4lCamera {
    pub fn new(device: &str, resolution: (u32, u32)) -> Self {
        Self {
            device: String::from(device),
            resolution,
            camera: None,
        }
    }
}

impl ImageSource for V4lCamera {
    fn open(&mut self) -> Result<(u32, u32), CamError> {
        let mut camera = Camera::new(&self.device)
            .map_err(|e| CamError::DeviceOpenError(self.device.clone(), e))?;

        camera.start(&Config {
            interval: FRAME_INTERVAL,
            resolution: self.resolution,
            format: b"MJPG",
            ..Default::default()
        }).map_err(|e| CamError::StartError(format!("{}", e)))?;

        info!(
            "Camera {} started at {}x{}",
            self.device, self.resolution.0, self.resolution.1
        );

        self.camera = Some(camera);

        Ok(self.resolution)
    }

    fn read_frame(&mut self) -> Result<GrayImage, CamError> {
        let camera = match self.camera {
            Some(ref c) => c,
            None => return Err(CamError::NotOpen)
        };

        let frame = camera.capture().map_err(CamError::CaptureError)?;

        let img = image::load_from_memory_with_format(&frame, image::ImageFormat::Jpeg)
            .map_err(CamError::DecodeError)?
            .to_luma8();

        if img.dimensions() != self.resolution {
            warn!(
                "Camera {} returned a {:?} frame, expected {:?}",
                self.device, img.dimensions(), self.resolution
            );
            return Err(CamError::FrameSizeMismatch {
                expected: self.resolution,
                found: img.dimensions(),
            })
        }

        Ok(img)
    }
}
