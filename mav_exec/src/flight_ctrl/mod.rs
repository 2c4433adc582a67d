//! # Flight control module
//!
//! Consumes the poses published by the estimator and holds the vehicle at
//! the position it was in when it took off. Each axis has its own PI
//! controller: pitch for x, roll for y and throttle for z.
//!
//! Demands are produced every control cycle, whether or not a new pose has
//! arrived, using the last known position.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod pid;
mod state;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use params::{Params, PidGains};
pub use pid::PidController;
pub use state::{FlightCtrl, InputData, OutputData, StatusReport};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use thiserror::Error;

use util::{archive::ArchiveError, params::LoadError};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum FlightCtrlError {
    #[error("Cannot load the flight control parameters: {0}")]
    ParamLoadError(LoadError),

    #[error("Cannot create the flight control archive: {0}")]
    ArchiveError(ArchiveError),

    #[error("Invalid control time step: {0} s")]
    InvalidTimeStep(f64),
}
