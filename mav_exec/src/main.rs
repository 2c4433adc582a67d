//! Main MAV executable entry point.
//!
//! # Architecture
//!
//! The executable runs two threads:
//!
//!     - The pose estimator, which reads camera frames, localises the camera
//!       against the tag landmarks and publishes the resulting pose.
//!     - The control loop (this thread), which polls for new poses at a fixed
//!       period and runs flight control on them.
//!
//! The two only share the pose channel. When the run duration expires, or
//! the estimator stops, the estimator is joined and the landmark map it built
//! is saved into the session.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{Report, eyre::WrapErr};
use log::{debug, info, warn};
use std::env;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use mav_lib::{
    cam,
    estimator::{PoseChannel, PoseEstimator},
    flight_ctrl::{FlightCtrl, InputData as FlightCtrlInput},
    params::MavExecParams,
};
use util::{
    archive::{Archived, Archiver},
    host,
    logger::{logger_init, LogLevels},
    module::State,
    session::Session,
    time,
};

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {

    // ---- EARLY INITIALISATION ----

    color_eyre::install()?;

    // Initialise session
    let session = Session::new(
        "mav_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger, the level spec may be given as the only argument
    let levels = match env::args().nth(1) {
        Some(spec) => LogLevels::parse(&spec).wrap_err("Invalid log level argument")?,
        None => LogLevels::default()
    };
    logger_init(&levels, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("MAV Localisation Executable\n");
    info!(
        "Software root: {:?}",
        host::get_sw_root().wrap_err("Failed to get the software root")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params: MavExecParams = util::params::load(
        "mav_exec.toml"
    ).wrap_err("Could not load exec params")?;

    let config = params.estimator_config()
        .wrap_err("Invalid exec params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let mut flight_ctrl = FlightCtrl::default();
    flight_ctrl.init("flight_ctrl.toml", &session)
        .wrap_err("Failed to initialise FlightCtrl")?;
    info!("FlightCtrl init complete");

    let source = cam::create_source(
        &params.camera,
        (params.frame_width, params.frame_height)
    ).wrap_err("Failed to create the image source")?;

    let estimator = PoseEstimator::new(source, config)
        .wrap_err("Failed to initialise the pose estimator")?
        .with_archiver(
            Archiver::from_path(&session, "poses.csv")
                .wrap_err("Failed to create the pose archive")?
        );
    info!(
        "PoseEstimator init complete, frames are {}x{}",
        estimator.frame_size().0,
        estimator.frame_size().1
    );

    info!("Module initialisation complete\n");

    // ---- START ESTIMATOR ----

    let channel = Arc::new(PoseChannel::new());
    let estimator_handle = estimator.spawn(channel.clone());

    // ---- MAIN LOOP ----

    info!("Beginning main loop\n");

    let cycle_period = Duration::from_millis(params.control_period_ms);
    let run_start = Instant::now();
    let mut prev_cycle_start = run_start;

    // Without the flight switch the vehicle counts as flying from the first
    // pose onwards
    let mut in_flight = false;

    loop {
        let cycle_start = Instant::now();

        if let Some(d) = params.run_duration_s {
            if run_start.elapsed().as_secs_f64() >= d {
                info!("Run duration of {:.1} s reached", d);
                break;
            }
        }

        if estimator_handle.is_finished() {
            warn!("Pose estimator has stopped");
            break;
        }

        // ---- POSE ACQUISITION ----

        let pose = if channel.data_available() {
            channel.try_get_pose()
        }
        else {
            None
        };

        if let Some(p) = pose {
            debug!("New pose: {}", p);
            in_flight = true;
        }

        // ---- FLIGHT CONTROL ----

        let input = FlightCtrlInput {
            pose,
            in_flight,
            dt_s: (cycle_start - prev_cycle_start).as_secs_f64(),
        };
        prev_cycle_start = cycle_start;

        let (output, report) = flight_ctrl.proc(&input)
            .wrap_err("Error during FlightCtrl processing")?;

        if report.set_point_latched {
            info!("FlightCtrl set point latched");
        }
        if report.pose_updated {
            debug!("FlightCtrl demands: {:?}", output);
        }

        if let Err(e) = flight_ctrl.write() {
            warn!("Could not archive FlightCtrl output: {}", e);
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start;

        match cycle_period.checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => warn!(
                "Cycle overran by {:.3} ms",
                time::std_duration_to_millis(cycle_dur - cycle_period)
            )
        }
    }

    // ---- SHUTDOWN ----

    estimator_handle.stop();
    let estimator = estimator_handle.join()
        .wrap_err("The pose estimator failed")?;

    let landmarks = estimator.into_chainer().into_landmarks();
    info!("Saving {} landmarks", landmarks.len());
    session.save("landmarks.json", landmarks.to_records());

    info!("End of execution");

    session.exit();

    Ok(())
}
