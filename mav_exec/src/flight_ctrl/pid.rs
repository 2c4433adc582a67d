//! # PID controller
//!
//! Proportional-integral controller used for each flight axis. The
//! derivative term is not used on this vehicle.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;

use super::params::PidGains;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A PI controller with a windup guard on the integral.
#[derive(Debug, Serialize, Clone)]
pub struct PidController {
    /// Proportional gain
    k_p: f64,

    /// Integral gain
    k_i: f64,

    /// Limit on the magnitude of the integral accumulation
    windup_guard: f64,

    /// The integral accumulation
    integral: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidController {

    /// Create a new controller with the given gains.
    pub fn new(k_p: f64, k_i: f64, windup_guard: f64) -> Self {
        Self {
            k_p,
            k_i,
            windup_guard: windup_guard.abs(),
            integral: 0f64,
        }
    }

    pub fn from_gains(gains: &PidGains) -> Self {
        Self::new(gains.k_p, gains.k_i, gains.windup_guard)
    }

    /// Get the value of the controller driving `current` towards `target`.
    ///
    /// The integral only accumulates while in flight, and is zeroed while on
    /// the ground so that the vehicle does not take off with a stored
    /// demand.
    pub fn get(&mut self, target: f64, current: f64, dt_s: f64, in_flight: bool) -> f64 {
        let error = target - current;

        if in_flight {
            self.integral += error * dt_s;
        }
        else {
            self.integral = 0f64;
        }

        self.integral = util::maths::clamp(&self.integral, &-self.windup_guard, &self.windup_guard);

        self.k_p * error + self.k_i * self.integral
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// Zero the integral accumulation.
    pub fn reset(&mut self) {
        self.integral = 0f64;
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
