//! # Cyclic modules
//!
//! Modules driven at a fixed rate by the main loop, such as the flight
//! controller, are initialised once against the session and then stepped
//! with fresh input every cycle.

use crate::session::Session;

/// State of a cyclic module.
pub trait State {
    type InitData;
    type InitError;

    type InputData;
    type OutputData;

    /// Non-fatal conditions noticed during a step.
    type StatusReport;
    type ProcError;

    /// Load parameters and open any archives in the session.
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>;

    /// Run one cycle.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>;
}
