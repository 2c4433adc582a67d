//! Implementations for the FlightCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{info, trace};
use nalgebra::Vector3;
use serde::Serialize;

use super::{FlightCtrlError, Params, PidController};
use crate::loc::Pose3D;
use util::{
    archive::{ArchiveError, Archived, Archiver},
    module::State,
    params,
    session::{self, Session}
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Flight control module state
pub struct FlightCtrl {
    pitch_ctrl: PidController,
    roll_ctrl: PidController,
    throttle_ctrl: PidController,

    /// Position held while in flight, latched on take off
    set_point: Option<Vector3<f64>>,

    /// Last known position
    position: Option<Vector3<f64>>,

    prev_in_flight: bool,

    output: Option<OutputData>,
    arch_output: Option<Archiver>,
}

/// Input data to flight control.
#[derive(Debug, Default, Clone, Copy)]
pub struct InputData {
    /// Newly published pose, or `None` if there was none this cycle
    pub pose: Option<Pose3D>,

    /// True while the vehicle is flying
    pub in_flight: bool,

    /// Time since the previous cycle
    pub dt_s: f64,
}

/// Attitude and throttle demands.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct OutputData {
    pub pitch: f64,
    pub roll: f64,
    pub throttle: f64,
}

/// Status report for flight control processing.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct StatusReport {
    /// A new pose was used this cycle
    pub pose_updated: bool,

    /// The set point was latched this cycle
    pub set_point_latched: bool,

    /// No position is known yet, so zero demands were output
    pub no_position: bool,
}

/// Archived form of the output.
#[derive(Serialize)]
struct OutputRecord {
    time_s: f64,
    pitch: f64,
    roll: f64,
    throttle: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for FlightCtrl {
    fn default() -> Self {
        Self::new(&Params::default())
    }
}

impl FlightCtrl {
    /// Create the module from already loaded parameters, without archiving.
    pub fn new(params: &Params) -> Self {
        Self {
            pitch_ctrl: PidController::from_gains(&params.pitch),
            roll_ctrl: PidController::from_gains(&params.roll),
            throttle_ctrl: PidController::from_gains(&params.throttle),
            set_point: None,
            position: None,
            prev_in_flight: false,
            output: None,
            arch_output: None,
        }
    }

    pub fn set_point(&self) -> Option<Vector3<f64>> {
        self.set_point
    }
}

impl State for FlightCtrl {
    type InitData = &'static str;
    type InitError = FlightCtrlError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = FlightCtrlError;

    /// Initialise the FlightCtrl module.
    ///
    /// Expected init data is the path to the parameter file
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>
    {
        let params: Params = params::load(init_data)
            .map_err(FlightCtrlError::ParamLoadError)?;

        *self = Self::new(&params);

        self.arch_output = Some(
            Archiver::from_path(session, "flight_ctrl_output.csv")
                .map_err(FlightCtrlError::ArchiveError)?
        );

        Ok(())
    }

    /// Perform cyclic processing of flight control.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        let mut report = StatusReport::default();

        if !input_data.dt_s.is_finite() || input_data.dt_s < 0.0 {
            return Err(FlightCtrlError::InvalidTimeStep(input_data.dt_s))
        }

        if let Some(pose) = input_data.pose {
            self.position = Some(pose.position());
            report.pose_updated = true;
        }

        // Hold the position at take off
        if input_data.in_flight && !self.prev_in_flight {
            self.set_point = self.position;
            report.set_point_latched = true;

            if let Some(sp) = self.set_point {
                info!("Holding position [{:.2}, {:.2}, {:.2}]", sp.x, sp.y, sp.z);
            }
        }
        self.prev_in_flight = input_data.in_flight;

        let output = match (self.set_point, self.position) {
            (Some(sp), Some(pos)) => {
                let dt = input_data.dt_s;
                let f = input_data.in_flight;

                OutputData {
                    pitch: self.pitch_ctrl.get(sp.x, pos.x, dt, f),
                    roll: self.roll_ctrl.get(sp.y, pos.y, dt, f),
                    throttle: self.throttle_ctrl.get(sp.z, pos.z, dt, f),
                }
            },
            _ => {
                report.no_position = true;
                OutputData::default()
            }
        };

        trace!("FlightCtrl output: {:?}", output);

        self.output = Some(output);

        Ok((output, report))
    }
}

impl Archived for FlightCtrl {
    fn write(&mut self) -> Result<(), ArchiveError> {
        let (arch, output) = match (self.arch_output.as_mut(), self.output) {
            (Some(a), Some(o)) => (a, o),
            _ => return Ok(())
        };

        arch.serialise(OutputRecord {
            time_s: session::get_elapsed_seconds(),
            pitch: output.pitch,
            roll: output.roll,
            throttle: output.throttle,
        })
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::flight_ctrl::PidGains;

    fn p_only() -> Params {
        let gains = PidGains { k_p: 2.0, k_i: 0.0, windup_guard: 1.0 };
        Params { pitch: gains, roll: gains, throttle: gains }
    }

    fn pose(x: f64, y: f64, z: f64) -> Option<Pose3D> {
        Some(Pose3D { x, y, z, ..Default::default() })
    }

    #[test]
    fn test_no_position() {
        let mut fc = FlightCtrl::new(&p_only());

        let (out, report) = fc.proc(&InputData { pose: None, in_flight: true, dt_s: 0.01 }).unwrap();
        assert_eq!(out, OutputData::default());
        assert!(report.no_position);
        assert!(fc.set_point().is_none());
    }

    #[test]
    fn test_set_point_latched_on_take_off() {
        let mut fc = FlightCtrl::new(&p_only());

        // On the ground, the set point is not yet latched
        let (out, _) = fc.proc(&InputData { pose: pose(1.0, 2.0, -40.0), in_flight: false, dt_s: 0.01 }).unwrap();
        assert_eq!(out, OutputData::default());

        let (out, report) = fc.proc(&InputData { pose: None, in_flight: true, dt_s: 0.01 }).unwrap();
        assert!(report.set_point_latched);
        assert_eq!(fc.set_point(), Some(Vector3::new(1.0, 2.0, -40.0)));
        assert_eq!(out, OutputData::default());

        // Drift away from the set point
        let (out, report) = fc.proc(&InputData { pose: pose(2.0, 1.0, -40.5), in_flight: true, dt_s: 0.01 }).unwrap();
        assert!(!report.set_point_latched);
        assert!(report.pose_updated);
        assert!((out.pitch + 2.0).abs() < 1e-12);
        assert!((out.roll - 2.0).abs() < 1e-12);
        assert!((out.throttle - 1.0).abs() < 1e-12);

        // Set point holds through the flight, even with no new poses
        let (out2, _) = fc.proc(&InputData { pose: None, in_flight: true, dt_s: 0.01 }).unwrap();
        assert_eq!(out, out2);
        assert_eq!(fc.set_point(), Some(Vector3::new(1.0, 2.0, -40.0)));
    }

    #[test]
    fn test_relatch_after_landing() {
        let mut fc = FlightCtrl::new(&p_only());

        fc.proc(&InputData { pose: pose(1.0, 1.0, 1.0), in_flight: true, dt_s: 0.01 }).unwrap();
        fc.proc(&InputData { pose: pose(5.0, 5.0, 5.0), in_flight: false, dt_s: 0.01 }).unwrap();
        fc.proc(&InputData { pose: None, in_flight: true, dt_s: 0.01 }).unwrap();

        assert_eq!(fc.set_point(), Some(Vector3::new(5.0, 5.0, 5.0)));
    }

    #[test]
    fn test_invalid_time_step() {
        let mut fc = FlightCtrl::default();

        for dt in &[-1.0, f64::NAN, f64::INFINITY] {
            match fc.proc(&InputData { pose: None, in_flight: false, dt_s: *dt }) {
                Err(FlightCtrlError::InvalidTimeStep(_)) => (),
                _ => panic!("Expected dt {} to be rejected", dt)
            }
        }
    }

    #[test]
    fn test_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fc.csv");

        let mut fc = FlightCtrl::new(&p_only());
        fc.arch_output = Some(Archiver::from_file_path(&path).unwrap());

        // Nothing to write before the first cycle
        fc.write().unwrap();

        fc.proc(&InputData { pose: pose(1.0, 1.0, 1.0), in_flight: true, dt_s: 0.01 }).unwrap();
        fc.write().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "time_s,pitch,roll,throttle");
    }
}
