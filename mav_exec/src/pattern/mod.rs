//! # Fiducial patterns
//!
//! Tags carry an N×N grid of filled and empty cells. This module encodes
//! those grids as integer bitmasks, computes their 90° rotations, and keeps
//! dictionaries which resolve an observed grid to its canonical pattern and
//! orientation.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod codec;
pub mod dictionary;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use codec::{Pattern, PatternCodec, PatternError, NULL_PATTERN};
pub use dictionary::{PatternDictionary, Rotation};
