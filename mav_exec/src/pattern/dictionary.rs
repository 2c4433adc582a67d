//! # Pattern dictionary
//!
//! Maps every rotation of every registered pattern back to the canonical
//! pattern and the rotation which produced it.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::collections::{HashMap, HashSet};
use serde::{Deserialize, Serialize};

use super::codec::{Pattern, PatternCodec, NULL_PATTERN};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A canonical pattern and the number of quarter turns which take it to an
/// observed pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rotation {
    pub pattern: Pattern,
    pub angle: u8,
}

/// Registry of patterns keyed by every rotation of each pattern.
///
/// If two registered patterns share a rotation, or a pattern is rotationally
/// symmetric, the last inserted entry for that key wins. The set of
/// registered canonical patterns is kept whole regardless.
#[derive(Debug, Clone)]
pub struct PatternDictionary {
    codec: PatternCodec,
    entries: HashMap<Pattern, Rotation>,
    canonical: HashSet<Pattern>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Rotation {
    /// The record returned when an observed pattern is not registered.
    pub const NULL: Rotation = Rotation {
        pattern: NULL_PATTERN,
        angle: 0,
    };

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

impl PatternDictionary {
    /// Create an empty dictionary.
    pub fn new(codec: PatternCodec) -> Self {
        Self {
            codec,
            entries: HashMap::new(),
            canonical: HashSet::new(),
        }
    }

    /// Create a dictionary holding the given canonical patterns.
    pub fn from_patterns(codec: PatternCodec, patterns: &[Pattern]) -> Self {
        let mut dict = Self::new(codec);
        for p in patterns {
            dict.add(*p);
        }
        dict
    }

    pub fn codec(&self) -> &PatternCodec {
        &self.codec
    }

    /// Register a canonical pattern along with its four rotations.
    ///
    /// Adding the same pattern again rewrites the same entries.
    pub fn add(&mut self, pattern: Pattern) {
        self.canonical.insert(pattern);
        for angle in 0..4u8 {
            self.entries.insert(
                self.codec.rotate(pattern, angle as i32),
                Rotation { pattern, angle },
            );
        }
    }

    /// Find the canonical pattern and rotation for an observed pattern.
    ///
    /// Only exact matches are found, otherwise `Rotation::NULL` is returned.
    pub fn find_matching_pattern(&self, observed: Pattern) -> Rotation {
        self.entries
            .get(&observed)
            .copied()
            .unwrap_or(Rotation::NULL)
    }

    /// Returns true if the given pattern has been registered as canonical.
    pub fn contains(&self, canonical: Pattern) -> bool {
        self.canonical.contains(&canonical)
    }

    /// Number of keys (rotations) stored.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
