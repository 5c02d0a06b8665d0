use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, ErrorKind>;

/// Possible errors when interacting with `blockcheck_lib`
///
/// Probe outcomes are deliberately *not* errors; they are data
/// ([`crate::ProbeStatus`]) and get aggregated at the evaluation boundary.
/// Everything here is either a setup problem or an engine-lifecycle failure.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Any form of I/O error occurred while reading from a given path.
    #[error("Failed to read from path: `{}`, reason: {1}", .0.display())]
    IoError(PathBuf, std::io::Error),
    /// The given string cannot be parsed into a probe target
    #[error("Cannot parse `{0}` as a probe target (expected `host` or `host/path`)")]
    InvalidTarget(String),
    /// The engine binary could not be spawned at all
    #[error("Failed to spawn engine process: {0}")]
    EngineSpawn(std::io::Error),
    /// The engine wrote to stderr (or exited) before printing its readiness
    /// marker. The captured stderr is attached for diagnostics.
    #[error("Engine crashed before readiness: {0}")]
    EngineCrashed(String),
    /// The engine printed neither the readiness marker nor any stderr within
    /// the startup timeout
    #[error("Engine did not become ready within {0:?}")]
    EngineStartTimeout(Duration),
    /// HTTP/3 probing was requested but the configured curl binary does not
    /// support it
    #[error("The configured curl binary has no HTTP/3 support")]
    Http3Unsupported,
}

impl From<(PathBuf, std::io::Error)> for ErrorKind {
    fn from(value: (PathBuf, std::io::Error)) -> Self {
        Self::IoError(value.0, value.1)
    }
}
