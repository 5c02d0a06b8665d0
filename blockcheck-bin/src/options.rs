use std::path::PathBuf;
use std::time::Duration;

use clap::builder::{PossibleValuesParser, TypedValueParser};
use clap::{Args, Parser, Subcommand};
use strum::VariantNames;

use blockcheck_lib::{Protocol, TlsVersion};

/// Default file holding the candidate strategies, one per line
pub(crate) const DEFAULT_CATALOG_FILE: &str = "strategies.txt";

/// Domain the original preset tooling checks by default
const DEFAULT_DOMAIN: &str = "rutracker.org/forum/index.php";

/// Default file the scan summary is written to
const DEFAULT_REPORT_FILE: &str = "result.txt";

/// Clap parser for [`Protocol`] driven by the strum variant names
fn protocol_parser() -> impl TypedValueParser<Value = Protocol> {
    PossibleValuesParser::new(Protocol::VARIANTS)
        .map(|v| v.parse::<Protocol>().expect("invalid protocol variant"))
}

#[derive(Debug, Parser)]
#[command(
    name = "blockcheck",
    version,
    about = "Searches for working DPI-circumvention strategies for the winws engine"
)]
pub(crate) struct BlockcheckOptions {
    #[command(flatten)]
    pub(crate) config: Config,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Args)]
pub(crate) struct Config {
    /// Path to the engine binary
    #[arg(long, global = true, env = "BLOCKCHECK_ENGINE", default_value = "winws.exe")]
    pub(crate) engine: PathBuf,

    /// Working directory for the engine process
    #[arg(long, global = true)]
    pub(crate) engine_dir: Option<PathBuf>,

    /// Strategy catalog file
    #[arg(long, global = true, default_value = DEFAULT_CATALOG_FILE)]
    pub(crate) catalog: PathBuf,

    /// Domain to probe; repeat the flag to probe several
    #[arg(long = "domain", global = true, default_value = DEFAULT_DOMAIN)]
    pub(crate) domains: Vec<String>,

    /// IP-set file passed to the engine instead of a domain hostlist
    #[arg(long, global = true)]
    pub(crate) ipset: Option<PathBuf>,

    /// Per-probe timeout in seconds
    #[arg(long, global = true, default_value_t = 1.5)]
    pub(crate) timeout: f64,

    /// Engine startup timeout in seconds
    #[arg(long, global = true, default_value_t = 5.0)]
    pub(crate) start_timeout: f64,

    /// Probe rounds per strategy trial; only the fastest timing per domain
    /// is kept
    #[arg(long, global = true, default_value_t = 1)]
    pub(crate) repeats: u32,

    /// Treat any redirect as success instead of flagging off-domain ones
    #[arg(long, global = true)]
    pub(crate) accept_redirects: bool,

    /// Pin HTTPS probes to one TLS version (TLSv1_2 or TLSv1_3)
    #[arg(long, global = true)]
    pub(crate) tls: Option<TlsVersion>,

    /// File the scan summary is written to in addition to stdout
    #[arg(long, global = true, default_value = DEFAULT_REPORT_FILE)]
    pub(crate) report_file: PathBuf,

    #[command(flatten)]
    pub(crate) verbose: crate::verbosity::Verbosity,
}

impl Config {
    pub(crate) fn probe_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }

    pub(crate) fn engine_start_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.start_timeout)
    }
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Try every catalog strategy and report the working ones per protocol
    Scan {
        /// Protocol families to scan; all three by default
        #[arg(long = "protocol", value_parser = protocol_parser())]
        protocols: Vec<Protocol>,
    },
    /// Re-test a preset rules file and propose replacements for failing rules
    Tune {
        /// TOML rules file produced by the preset parser
        #[arg(long)]
        rules: PathBuf,

        /// Write the adjusted rules to this file instead of only reporting
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        BlockcheckOptions::command().debug_assert();
    }

    #[test]
    fn test_scan_defaults() {
        let opts = BlockcheckOptions::parse_from(["blockcheck", "scan"]);
        assert_eq!(opts.config.domains, vec![DEFAULT_DOMAIN.to_string()]);
        assert_eq!(opts.config.repeats, 1);
        assert!(matches!(opts.command, Command::Scan { ref protocols } if protocols.is_empty()));
    }

    #[test]
    fn test_protocol_parsing() {
        let opts = BlockcheckOptions::parse_from([
            "blockcheck",
            "scan",
            "--protocol",
            "https",
            "--protocol",
            "http3",
        ]);
        match opts.command {
            Command::Scan { protocols } => {
                assert_eq!(protocols, vec![Protocol::Https, Protocol::Http3]);
            }
            Command::Tune { .. } => panic!("expected scan"),
        }
    }

    #[test]
    fn test_tls_pin_parsing() {
        let opts = BlockcheckOptions::parse_from([
            "blockcheck",
            "scan",
            "--tls",
            "TLSv1_3",
        ]);
        assert_eq!(opts.config.tls, Some(TlsVersion::V1_3));
    }
}
