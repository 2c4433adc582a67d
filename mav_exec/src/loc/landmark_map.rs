//! # Landmark map
//!
//! Stores the pose of every localised tag in the world frame, keyed by the
//! tag's canonical pattern. The map is seeded with a single tag at the world
//! origin and grows as new tags are seen alongside known ones.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::collections::HashMap;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::transform::RigidTransform;
use crate::pattern::Pattern;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct LandmarkMap {
    /// Tag to world transform of each landmark
    landmarks: HashMap<Pattern, RigidTransform>,
}

/// Serialised form of a single landmark, as stored in parameter files and
/// saved at the end of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkRecord {
    pub pattern: Pattern,

    /// Tag to world rotation as an axis-angle vector
    pub axis_angle: [f64; 3],

    /// Tag origin in the world frame
    pub translation: [f64; 3],
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LandmarkMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a map holding only the seed landmark, whose frame defines the
    /// world frame.
    pub fn with_seed(seed: Pattern) -> Self {
        let mut map = Self::new();
        map.insert(seed, RigidTransform::identity());
        map
    }

    /// Insert or replace the pose of a landmark.
    pub fn insert(&mut self, pattern: Pattern, tag_to_world: RigidTransform) {
        self.landmarks.insert(pattern, tag_to_world);
    }

    /// Get the tag to world transform of a landmark.
    pub fn get(&self, pattern: Pattern) -> Option<&RigidTransform> {
        self.landmarks.get(&pattern)
    }

    pub fn contains(&self, pattern: Pattern) -> bool {
        self.landmarks.contains_key(&pattern)
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Pattern, &RigidTransform)> {
        self.landmarks.iter()
    }

    /// Convert the map into records sorted by pattern.
    pub fn to_records(&self) -> Vec<LandmarkRecord> {
        let mut records: Vec<LandmarkRecord> = self.landmarks
            .iter()
            .map(|(p, t)| LandmarkRecord::new(*p, t))
            .collect();

        records.sort_by_key(|r| r.pattern);
        records
    }
}

impl LandmarkRecord {
    pub fn new(pattern: Pattern, tag_to_world: &RigidTransform) -> Self {
        let r = tag_to_world.axis_angle();
        let t = tag_to_world.translation;

        Self {
            pattern,
            axis_angle: [r.x, r.y, r.z],
            translation: [t.x, t.y, t.z],
        }
    }

    pub fn to_transform(&self) -> RigidTransform {
        RigidTransform::from_axis_angle(
            Vector3::from(self.axis_angle),
            Vector3::from(self.translation),
        )
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_seed() {
        let map = LandmarkMap::with_seed(0x1a2);

        assert_eq!(map.len(), 1);
        assert_eq!(map.get(0x1a2), Some(&RigidTransform::identity()));
        assert!(map.get(0x154).is_none());
    }

    #[test]
    fn test_records() {
        let mut map = LandmarkMap::with_seed(0x1a2);
        let t = RigidTransform::from_axis_angle(
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(20.0, 1.0, 0.0),
        );
        map.insert(0x154, t);

        let records = map.to_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].pattern, 0x154);
        assert_eq!(records[1].pattern, 0x1a2);
        assert!(records[0].to_transform().approx_eq(&t, 1e-12, 1e-12));

        let json = serde_json::to_string(&records).unwrap();
        let back: Vec<LandmarkRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, records);
    }

    #[test]
    fn test_record_json_exact() {
        // Values one ulp off a short decimal must survive a save and load
        let record = LandmarkRecord {
            pattern: 0x154,
            axis_angle: [0.0, 1e-17, 0.9999999999999999],
            translation: [20.000000000000004, -0.30000000000000004, 1.0 / 3.0],
        };

        let json = serde_json::to_string(&record).unwrap();
        let back: LandmarkRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
