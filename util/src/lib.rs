//! Shared services of the MAV localisation software: sessions, logging,
//! parameter files and CSV archives.

pub mod archive;
pub mod host;
pub mod logger;
pub mod maths;
pub mod module;
pub mod params;
pub mod session;
pub mod time;

/// Log the message as an error and panic with it.
///
/// Reserved for broken preconditions, anything recoverable should return an
/// error instead.
#[macro_export]
macro_rules! raise_error {
    ($($arg:tt)+) => ({
        let msg = std::format!($($arg)+);
        log::error!("{}", msg);
        std::panic!("{}", msg);
    });
}
