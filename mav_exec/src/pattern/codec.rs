//! # Pattern codec
//!
//! Bit `(i, j)` of a pattern is cell `(i, j)` of the tag grid, where `i`
//! counts rows from the bottom of the printed tag and `j` counts columns
//! from the left. Only the low N² bits of a pattern are meaningful.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// The pattern used to indicate "no match".
pub const NULL_PATTERN: Pattern = 0;

/// Number of bits available in a pattern.
pub const PATTERN_BITS: usize = 64;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A tag grid packed into a bitmask.
pub type Pattern = u64;

/// Encoder for patterns of a fixed grid size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternCodec {
    n: usize,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum PatternError {
    #[error(
        "Grid size {0} is invalid, expected at least 1 and a cell count no \
         larger than {}", PATTERN_BITS
    )]
    InvalidGridSize(usize),

    #[error("Expected a {expected}x{expected} grid, found row {row} with {found} cells")]
    InvalidGridShape {
        expected: usize,
        row: usize,
        found: usize
    },

    #[error("Expected {expected} rows in the grid, found {found}")]
    InvalidRowCount {
        expected: usize,
        found: usize
    }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PatternCodec {
    /// Create a codec for an `n` by `n` grid.
    pub fn new(n: usize) -> Result<Self, PatternError> {
        if n == 0 || n * n > PATTERN_BITS {
            return Err(PatternError::InvalidGridSize(n))
        }

        Ok(Self { n })
    }

    /// Grid size of the patterns this codec handles.
    pub fn grid_size(&self) -> usize {
        self.n
    }

    /// Mask covering the meaningful bits of a pattern.
    pub fn mask(&self) -> Pattern {
        let cells = self.n * self.n;
        if cells == PATTERN_BITS {
            Pattern::MAX
        }
        else {
            (1 << cells) - 1
        }
    }

    /// Index of the bit storing cell `(i, j)`.
    ///
    /// Callers must keep `i` and `j` below the grid size.
    fn shift(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < self.n && j < self.n, "cell ({}, {}) out of grid", i, j);

        self.n * self.n - 1 - j - self.n * i
    }

    /// Get the state of cell `(i, j)`.
    pub fn get(&self, pattern: Pattern, i: usize, j: usize) -> bool {
        (pattern >> self.shift(i, j)) & 1 == 1
    }

    /// Fill cell `(i, j)`.
    pub fn set(&self, pattern: Pattern, i: usize, j: usize) -> Pattern {
        pattern | (1 << self.shift(i, j))
    }

    /// Empty cell `(i, j)`.
    pub fn clear(&self, pattern: Pattern, i: usize, j: usize) -> Pattern {
        pattern & !(1 << self.shift(i, j))
    }

    /// Set cell `(i, j)` to the given state.
    pub fn set_to(&self, pattern: Pattern, i: usize, j: usize, filled: bool) -> Pattern {
        if filled {
            self.set(pattern, i, j)
        }
        else {
            self.clear(pattern, i, j)
        }
    }

    /// Rotate a pattern by `angle` multiples of 90°.
    ///
    /// Any integer is accepted, negative multiples rotate the other way.
    pub fn rotate(&self, pattern: Pattern, angle: i32) -> Pattern {
        let n = self.n;
        let angle = normalise_angle(angle);

        if angle == 0 {
            return pattern & self.mask()
        }

        let mut rotated = NULL_PATTERN;

        for i in 0..n {
            for j in 0..n {
                let (si, sj) = match angle {
                    1 => (j, n - 1 - i),
                    2 => (n - 1 - i, n - 1 - j),
                    _ => (n - 1 - j, i)
                };

                if self.get(pattern, si, sj) {
                    rotated = self.set(rotated, i, j);
                }
            }
        }

        rotated
    }

    /// Returns true if `a` is `b` under any of the four rotations.
    pub fn are_equivalent(&self, a: Pattern, b: Pattern) -> bool {
        (0..4).any(|k| self.rotate(b, k) == a & self.mask())
    }

    /// Build a pattern from a grid given as printed, top row first.
    pub fn create_pattern<R: AsRef<[bool]>>(&self, rows: &[R]) -> Result<Pattern, PatternError> {
        let n = self.n;

        if rows.len() != n {
            return Err(PatternError::InvalidRowCount {
                expected: n,
                found: rows.len()
            })
        }

        let mut pattern = NULL_PATTERN;

        for (row_idx, row) in rows.iter().enumerate() {
            let row = row.as_ref();

            if row.len() != n {
                return Err(PatternError::InvalidGridShape {
                    expected: n,
                    row: row_idx,
                    found: row.len()
                })
            }

            // Printed rows run top to bottom, grid rows bottom to top
            let i = n - 1 - row_idx;
            for (j, filled) in row.iter().enumerate() {
                pattern = self.set_to(pattern, i, j, *filled);
            }
        }

        Ok(pattern)
    }

    /// Render the grid top row first, `#` for filled cells.
    pub fn format(&self, pattern: Pattern) -> String {
        let mut s = String::with_capacity(self.n * (self.n + 1));

        for i in (0..self.n).rev() {
            for j in 0..self.n {
                s.push(if self.get(pattern, i, j) { '#' } else { '.' });
            }
            if i > 0 {
                s.push('\n');
            }
        }

        s
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Map any rotation multiple into `0..4`.
fn normalise_angle(angle: i32) -> i32 {
    angle.rem_euclid(4)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
