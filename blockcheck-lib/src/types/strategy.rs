use std::fmt::Display;
use std::path::Path;

use super::Protocol;

/// Prefix of the engine option naming the desync technique, e.g.
/// `--dpi-desync=fake,disorder2`
const DESYNC_OPT: &str = "--dpi-desync=";

/// Extract the desync technique key from a list of engine argument tokens.
///
/// Interchangeable strategies share this key; the alternative search only
/// ever swaps a strategy for another one with the same key.
#[must_use]
pub fn desync_key(tokens: &[String]) -> Option<String> {
    tokens
        .iter()
        .find_map(|token| token.strip_prefix(DESYNC_OPT))
        .map(ToString::to_string)
}

/// One concrete set of engine arguments implementing a desync technique for
/// a protocol. Loaded from the catalog, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    protocol: Protocol,
    args: Vec<String>,
}

impl Strategy {
    #[must_use]
    pub fn new(protocol: Protocol, args: Vec<String>) -> Self {
        Self { protocol, args }
    }

    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// The raw argument tokens, without protocol filter or target selector
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The desync technique key, if the strategy names one
    #[must_use]
    pub fn desync_key(&self) -> Option<String> {
        desync_key(&self.args)
    }

    /// Display name: the argument tokens with windivert filter noise dropped
    #[must_use]
    pub fn name(&self) -> String {
        self.args
            .iter()
            .filter(|arg| !arg.starts_with("--wf-"))
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Build the full engine argument list for this strategy: protocol
    /// filter, then the target selector (an IP-set file if given, otherwise
    /// the domain hostlist), then the strategy's own tokens.
    ///
    /// Domain specs may carry a probe path (`host/path`); the hostlist only
    /// takes bare domains, so paths are stripped and duplicates dropped.
    ///
    /// This is a pure function of its inputs; nothing about the strategy is
    /// mutated.
    #[must_use]
    pub fn command(&self, domains: &[String], ipset: Option<&Path>) -> Vec<String> {
        let mut command = self.protocol.filter_args();
        match ipset {
            Some(path) => command.push(format!("--ipset={}", path.display())),
            None => command.push(format!("--hostlist-domains={}", hostlist(domains))),
        }
        command.extend(self.args.iter().cloned());
        command
    }
}

/// Comma-joined hostlist of the bare domains, first occurrence wins
fn hostlist(domains: &[String]) -> String {
    let mut hosts: Vec<&str> = Vec::new();
    for domain in domains {
        let host = domain.split('/').next().unwrap_or(domain);
        if !hosts.contains(&host) {
            hosts.push(host);
        }
    }
    hosts.join(",")
}

impl Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} : {}", self.protocol, self.args.join(" "))
    }
}
