//! # File sequence source
//!
//! Replays a directory of image files as camera frames, for ground testing
//! against recorded flights.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::path::PathBuf;

use image::GrayImage;
use log::{debug, info};

use super::{CamError, ImageSource};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// File extensions recognised as frames.
const FRAME_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "pgm"];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

pub struct FileSequenceSource {
    directory: PathBuf,
    looping: bool,
    paths: Vec<PathBuf>,
    next: usize,
    opened: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl FileSequenceSource {
    pub fn new(directory: PathBuf, looping: bool) -> Self {
        Self {
            directory,
            looping,
            paths: Vec::new(),
            next: 0,
            opened: false,
        }
    }

    /// Number of frames in the sequence, zero before opening.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn load(&self, idx: usize) -> Result<GrayImage, CamError> {
        debug!("Loading frame {:?}", self.paths[idx]);

        image::open(&self.paths[idx])
            .map(|i| i.to_luma8())
            .map_err(CamError::DecodeError)
    }
}

impl ImageSource for FileSequenceSource {
    fn open(&mut self) -> Result<(u32, u32), CamError> {
        let entries = std::fs::read_dir(&self.directory)
            .map_err(|e| CamError::DirectoryError(self.directory.clone(), e))?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| CamError::DirectoryError(self.directory.clone(), e))?
                .path();

            let is_frame = path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| FRAME_EXTENSIONS.contains(&e.to_lowercase().as_str()));

            if is_frame {
                paths.push(path);
            }
        }

        if paths.is_empty() {
            return Err(CamError::NoFrames(self.directory.clone()))
        }

        paths.sort();
        self.paths = paths;
        self.next = 0;
        self.opened = true;

        let dims = self.load(0)?.dimensions();

        info!(
            "Opened file sequence {:?}: {} frames of {}x{}",
            self.directory, self.paths.len(), dims.0, dims.1
        );

        Ok(dims)
    }

    fn read_frame(&mut self) -> Result<GrayImage, CamError> {
        if !self.opened {
            return Err(CamError::NotOpen)
        }

        if self.next >= self.paths.len() {
            if self.looping {
                self.next = 0;
            }
            else {
                return Err(CamError::EndOfStream)
            }
        }

        let idx = self.next;
        self.next += 1;

        self.load(idx)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
