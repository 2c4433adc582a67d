//! # Logger
//!
//! Log output goes to stdout and to the session's log file through a single
//! fern dispatch. Levels are given as a default plus optional overrides per
//! module path, written `debug,mav_lib::tag_det=info`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use colored::{ColoredString, Colorize};
use log::{info, Level};
use thiserror::Error;

use crate::session::{self, Session};

pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Default level and per module overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLevels {
    pub default: LevelFilter,
    pub targets: Vec<(String, LevelFilter)>,
}

#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("The default log level must include INFO, found `{0}`")]
    InvalidMinLogLevel(LevelFilter),

    #[error("Unrecognised log level `{0}`")]
    UnknownLevelName(String),

    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("The logger could not be installed: {0}")]
    FernInitError(log::SetLoggerError)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for LogLevels {
    /// Debug everywhere except the per candidate output of the detector.
    fn default() -> Self {
        Self {
            default: LevelFilter::Debug,
            targets: vec![(String::from("mav_lib::tag_det"), LevelFilter::Info)],
        }
    }
}

impl LogLevels {
    /// Parse a level spec such as `trace` or `debug,mav_lib::tag_det=info`.
    ///
    /// A spec without a bare level keeps the default level of `info`.
    pub fn parse(spec: &str) -> Result<Self, LoggerInitError> {
        let mut levels = Self {
            default: LevelFilter::Info,
            targets: Vec::new(),
        };

        for item in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match item.find('=') {
                Some(i) => {
                    let level = level_from_str(&item[i + 1..])?;
                    levels.targets.push((String::from(item[..i].trim()), level));
                },
                None => levels.default = level_from_str(item)?
            }
        }

        Ok(levels)
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Install the logger for this run.
///
/// Must be called at most once, after the session has been created. The
/// default level may not be quieter than `INFO`.
pub fn logger_init(levels: &LogLevels, session: &Session) -> Result<(), LoggerInitError> {
    if levels.default < Level::Info {
        return Err(LoggerInitError::InvalidMinLogLevel(levels.default))
    }

    let log_file = fern::log_file(session.log_file_path.clone())
        .map_err(LoggerInitError::LogFileInitError)?;

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            // Module path only at debug and below, where the volume is
            let elapsed = session::get_elapsed_seconds();
            if record.level() > Level::Info {
                out.finish(format_args!(
                    "[{:10.6} {}] {}: {}",
                    elapsed, level_tag(record.level()), record.target(), message
                ))
            }
            else {
                out.finish(format_args!(
                    "[{:10.6} {}] {}",
                    elapsed, level_tag(record.level()), message
                ))
            }
        })
        .level(levels.default);

    for (target, level) in levels.targets.iter() {
        dispatch = dispatch.level_for(target.clone(), *level);
    }

    dispatch
        .chain(std::io::stdout())
        .chain(log_file)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;

    info!("Logging to {:?} since {}", session.log_file_path, session::get_epoch());
    info!("Log level {:?}, overrides {:?}", levels.default, levels.targets);

    Ok(())
}

/// Parse a single level name, case insensitive.
pub fn level_from_str(name: &str) -> Result<LevelFilter, LoggerInitError> {
    name.trim()
        .parse::<LevelFilter>()
        .map_err(|_| LoggerInitError::UnknownLevelName(String::from(name)))
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn level_tag(level: Level) -> ColoredString {
    match level {
        Level::Trace => "TRC".dimmed().italic(),
        Level::Debug => "DBG".dimmed(),
        Level::Info  => "INF".normal(),
        Level::Warn  => "WRN".yellow(),
        Level::Error => "ERR".red().bold()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_level_from_str() {
        assert_eq!(level_from_str("debug").unwrap(), LevelFilter::Debug);
        assert_eq!(level_from_str("TRACE").unwrap(), LevelFilter::Trace);
        assert!(level_from_str("loud").is_err());
    }

    #[test]
    fn test_parse_levels() {
        let levels = LogLevels::parse("trace, mav_lib::tag_det=warn").unwrap();
        assert_eq!(levels.default, LevelFilter::Trace);
        assert_eq!(
            levels.targets,
            vec![(String::from("mav_lib::tag_det"), LevelFilter::Warn)]
        );

        // Overrides alone keep the default level
        let levels = LogLevels::parse("mav_lib::estimator=trace").unwrap();
        assert_eq!(levels.default, LevelFilter::Info);
        assert_eq!(levels.targets.len(), 1);

        assert!(LogLevels::parse("debug,mav_lib=shout").is_err());
    }
}
