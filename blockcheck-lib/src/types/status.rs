use std::fmt::Display;
use std::time::Duration;

use http::StatusCode;

const ICON_OK: &str = "✔";
const ICON_ERROR: &str = "✗";
const ICON_TIMEOUT: &str = "⧖";

/// Classification of a single probe attempt.
///
/// Anything that is not `Ok` counts as failure for strategy evaluation, but
/// the variants are kept distinct because they tell the operator very
/// different things: a timeout carries no signal either way, while an HTTP
/// 400 or a suspicious redirect is evidence that the circumvention attempt
/// itself was detected or malformed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProbeStatus {
    /// The endpoint answered with an acceptable 2xx/3xx status
    Ok(StatusCode),
    /// The request exceeded its total timeout
    Timeout,
    /// The hostname could not be resolved
    Unresolved,
    /// HTTP 400, the signature of the engine's fake packets reaching the
    /// real server instead of the DPI box
    MalformedFakes,
    /// A redirect pointing off-site, which is usually DPI-injected content
    SuspiciousRedirect(String),
    /// Any other transport or HTTP failure, with the raw diagnostic
    Error(String),
}

impl ProbeStatus {
    #[inline]
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, ProbeStatus::Ok(_))
    }

    #[inline]
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, ProbeStatus::Timeout)
    }

    /// Return a unicode icon to visualize the status
    #[must_use]
    pub const fn icon(&self) -> &str {
        match self {
            ProbeStatus::Ok(_) => ICON_OK,
            ProbeStatus::Timeout => ICON_TIMEOUT,
            _ => ICON_ERROR,
        }
    }
}

impl Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeStatus::Ok(code) => write!(f, "{code}"),
            ProbeStatus::Timeout => f.write_str("Operation timed out"),
            ProbeStatus::Unresolved => f.write_str("Could not resolve host"),
            ProbeStatus::MalformedFakes => {
                f.write_str("HTTP 400: Bad Request. Likely server receives fakes.")
            }
            ProbeStatus::SuspiciousRedirect(location) => {
                write!(f, "Suspicious redirection to: {location}")
            }
            ProbeStatus::Error(details) => f.write_str(details),
        }
    }
}

/// Outcome of one probe against one target. Produced once, immutable.
///
/// `elapsed` is only meaningful when the status is a success; failed probes
/// carry whatever time passed before the failure surfaced.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// Hostname that was probed
    pub host: String,
    /// Classified outcome
    pub status: ProbeStatus,
    /// End-to-end time around the request
    pub elapsed: Duration,
}

impl ProbeResult {
    #[must_use]
    pub(crate) fn new(host: &str, status: ProbeStatus, elapsed: Duration) -> Self {
        Self {
            host: host.to_string(),
            status,
            elapsed,
        }
    }
}

impl Display for ProbeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.status.icon(), self.host, self.status)
    }
}
