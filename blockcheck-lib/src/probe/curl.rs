//! HTTP/3 probes via the system `curl` binary.
//!
//! QUIC probing is delegated to curl built with HTTP/3 support. The
//! write-out format keeps parsing trivial: status code, transport-measured
//! total time, and the redirect location, one per line.

use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;

use http::StatusCode;
use tokio::process::Command;

use crate::types::{ProbeStatus, ProbeTarget};

use super::ProbeConfig;

const WRITE_OUT: &str = "%{http_code}\n%{time_total}\n%{redirect_url}";

const EXIT_COULD_NOT_RESOLVE: i32 = 6;
const EXIT_TIMED_OUT: i32 = 28;

const NULL_DEVICE: &str = if cfg!(windows) { "NUL" } else { "/dev/null" };

/// Whether the installed curl advertises HTTP/3 support
pub async fn curl_supports_http3() -> bool {
    let output = Command::new("curl")
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .await;
    match output {
        Ok(output) => String::from_utf8_lossy(&output.stdout)
            .to_lowercase()
            .contains("http3"),
        Err(e) => {
            log::debug!("curl not available: {e}");
            false
        }
    }
}

pub(super) async fn perform(
    target: &ProbeTarget,
    addr: IpAddr,
    config: &ProbeConfig,
) -> (ProbeStatus, Duration) {
    let port = target.port();
    let pin = format!("{}:{port}:{addr}:{port}", target.host());
    let output = Command::new("curl")
        .args([
            "--silent",
            "--show-error",
            "--head",
            "--http3-only",
            "--user-agent",
            super::USER_AGENT,
            "--max-time",
            &format!("{:.3}", config.timeout.as_secs_f64()),
            "--connect-to",
            &pin,
            "--output",
            NULL_DEVICE,
            "--write-out",
            WRITE_OUT,
            &target.url(),
        ])
        .stdin(Stdio::null())
        .output()
        .await;

    let output = match output {
        Ok(output) => output,
        Err(e) => return (ProbeStatus::Error(format!("curl: {e}")), Duration::ZERO),
    };

    match output.status.code() {
        Some(0) => parse_write_out(&String::from_utf8_lossy(&output.stdout), target, config),
        Some(EXIT_TIMED_OUT) => (ProbeStatus::Timeout, config.timeout),
        Some(EXIT_COULD_NOT_RESOLVE) => (ProbeStatus::Unresolved, Duration::ZERO),
        code => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() {
                format!("curl exited with {code:?}")
            } else {
                stderr.trim().to_string()
            };
            (ProbeStatus::Error(detail), Duration::ZERO)
        }
    }
}

fn parse_write_out(
    stdout: &str,
    target: &ProbeTarget,
    config: &ProbeConfig,
) -> (ProbeStatus, Duration) {
    let mut lines = stdout.lines();
    let code = lines.next().unwrap_or_default().trim();
    let time = lines
        .next()
        .and_then(|line| line.trim().parse::<f64>().ok())
        .map_or(Duration::ZERO, Duration::from_secs_f64);
    let redirect = lines.next().map(str::trim).filter(|s| !s.is_empty());

    let Some(status) = code
        .parse::<u16>()
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
    else {
        return (
            ProbeStatus::Error(format!("unparseable curl status: {code}")),
            time,
        );
    };

    (
        super::classify(
            status,
            redirect,
            target.root_domain(),
            config.accept_redirects,
        ),
        time,
    )
}
