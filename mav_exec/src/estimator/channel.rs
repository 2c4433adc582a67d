//! # Pose channel
//!
//! Hands poses from the acquisition thread to the control loop. The consumer
//! always receives the most recently published pose. Older poses that were
//! never read are dropped when it does.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex
};

use util::raise_error;

use crate::loc::Pose3D;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Single producer, single consumer pose channel.
#[derive(Debug, Default)]
pub struct PoseChannel {
    poses: Mutex<Vec<Pose3D>>,
    new_data: AtomicBool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PoseChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new pose.
    pub fn publish(&self, pose: Pose3D) {
        self.poses
            .lock()
            .expect("PoseChannel: poses mutex poisoned")
            .push(pose);

        self.new_data.store(true, Ordering::Release);
    }

    /// Returns true if a pose has been published since the last read.
    ///
    /// Does not take the lock, so the result may be briefly out of date.
    pub fn data_available(&self) -> bool {
        self.new_data.load(Ordering::Acquire)
    }

    /// Take the most recent pose, discarding any older unread ones.
    ///
    /// # Panics
    ///
    /// The channel must not be empty: only call this after `data_available`
    /// has returned true. Use `try_get_pose` where the channel may be empty.
    pub fn get_pose(&self) -> Pose3D {
        match self.try_get_pose() {
            Some(p) => p,
            None => raise_error!("get_pose called on an empty pose channel")
        }
    }

    /// Take the most recent pose if there is one, discarding any older
    /// unread ones.
    pub fn try_get_pose(&self) -> Option<Pose3D> {
        let mut poses = self.poses
            .lock()
            .expect("PoseChannel: poses mutex poisoned");

        let pose = poses.pop();
        poses.clear();
        self.new_data.store(false, Ordering::Release);

        pose
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
