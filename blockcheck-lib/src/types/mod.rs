mod error;
mod protocol;
mod report;
mod rule;
mod status;
mod strategy;
mod target;

pub use error::{ErrorKind, Result};
pub use protocol::{Protocol, TlsVersion};
pub use report::{Report, ReportEntry};
pub use rule::Rule;
pub use status::{ProbeResult, ProbeStatus};
pub use strategy::{desync_key, Strategy};
pub use target::ProbeTarget;
