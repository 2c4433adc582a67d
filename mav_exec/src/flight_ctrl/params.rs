//! Flight control parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for flight control
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Params {
    /// Pitch controller, driven by the x position error
    pub pitch: PidGains,

    /// Roll controller, driven by the y position error
    pub roll: PidGains,

    /// Throttle controller, driven by the z position error
    pub throttle: PidGains,
}

/// Gains of a single axis controller
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    /// Proportional gain
    pub k_p: f64,

    /// Integral gain
    pub k_i: f64,

    /// Limit on the magnitude of the integral accumulation
    pub windup_guard: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            k_p: 1.0,
            k_i: 1.0,
            windup_guard: 100.0,
        }
    }
}
