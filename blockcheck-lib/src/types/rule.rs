use serde::{Deserialize, Serialize};

use super::{desync_key, Protocol};

/// Argument prefixes that belong to a rule's target selector rather than to
/// its strategy.
const PREFIX_OPTS: [&str; 4] = ["--filter-", "--hostlist", "--ipset", "--wf-"];

/// One segment of a user preset: a target selector (prefix arguments) paired
/// with strategy arguments. Parsed once from external input and read-only
/// during evaluation; the search may *output* a replacement for the strategy
/// part, but never mutates the rule itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Filter/target selector tokens (`--filter-tcp=443`, `--hostlist=...`)
    pub prefix_args: Vec<String>,
    /// The strategy tokens the rule currently carries
    pub strategy_args: Vec<String>,
}

impl Rule {
    /// Split a flat token list into a rule, sorting selector tokens into
    /// `prefix_args` and everything else into `strategy_args`.
    #[must_use]
    pub fn from_tokens(tokens: Vec<String>) -> Self {
        let (prefix_args, strategy_args) = tokens
            .into_iter()
            .partition(|token| PREFIX_OPTS.iter().any(|prefix| token.starts_with(prefix)));
        Self {
            prefix_args,
            strategy_args,
        }
    }

    /// Protocol inferred from the rule's filter tokens. Understands both the
    /// per-rule `--filter-*` form used in presets and the global `--wf-*`
    /// form the command builder emits.
    #[must_use]
    pub fn protocol(&self) -> Option<Protocol> {
        for token in &self.prefix_args {
            let Some(filter) = token
                .strip_prefix("--filter-")
                .or_else(|| token.strip_prefix("--wf-"))
            else {
                continue;
            };
            if filter_has_port(filter, "tcp", 80) {
                return Some(Protocol::Http);
            }
            if filter_has_port(filter, "tcp", 443) {
                return Some(Protocol::Https);
            }
            if filter_has_port(filter, "udp", 443) {
                return Some(Protocol::Http3);
            }
        }
        None
    }

    /// The desync technique key from the rule's strategy tokens
    #[must_use]
    pub fn desync_key(&self) -> Option<String> {
        desync_key(&self.strategy_args)
    }

    /// Orthogonal tuning parameters (currently the repeat-count override)
    /// that a replacement strategy must not silently drop.
    #[must_use]
    pub fn carried_params(&self) -> Vec<&String> {
        self.strategy_args
            .iter()
            .filter(|token| token.starts_with("--dpi-desync-repeats"))
            .collect()
    }
}

/// True when `filter` (e.g. `tcp=80` or `tcp=443,444-445`) names the
/// transport and its port list contains `port` exactly or as a range
/// start. Matching the bare digit prefix would also catch `tcp=8080`.
fn filter_has_port(filter: &str, transport: &str, port: u16) -> bool {
    let Some(ports) = filter
        .strip_prefix(transport)
        .and_then(|rest| rest.strip_prefix('='))
    else {
        return false;
    };
    let port = port.to_string();
    ports.split(',').any(|entry| {
        entry == port
            || entry
                .strip_prefix(port.as_str())
                .is_some_and(|rest| rest.starts_with('-'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(args: &[&str]) -> Vec<String> {
        args.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_split_prefix_and_strategy() {
        let rule = Rule::from_tokens(tokens(&[
            "--filter-tcp=443",
            "--hostlist=lists/general.txt",
            "--dpi-desync=fake",
            "--dpi-desync-ttl=4",
        ]));
        assert_eq!(
            rule.prefix_args,
            tokens(&["--filter-tcp=443", "--hostlist=lists/general.txt"])
        );
        assert_eq!(
            rule.strategy_args,
            tokens(&["--dpi-desync=fake", "--dpi-desync-ttl=4"])
        );
    }

    #[test]
    fn test_protocol_inference() {
        let http = Rule::from_tokens(tokens(&["--filter-tcp=80", "--dpi-desync=split2"]));
        assert_eq!(http.protocol(), Some(Protocol::Http));

        let http3 = Rule::from_tokens(tokens(&["--filter-udp=443", "--dpi-desync=fake"]));
        assert_eq!(http3.protocol(), Some(Protocol::Http3));

        let unknown = Rule::from_tokens(tokens(&["--dpi-desync=fake"]));
        assert_eq!(unknown.protocol(), None);
    }

    #[test]
    fn test_port_lists_and_ranges_are_matched() {
        // Presets commonly write `--filter-tcp=443-444` or port lists
        let list = Rule::from_tokens(tokens(&["--filter-tcp=443,444", "--dpi-desync=fake"]));
        assert_eq!(list.protocol(), Some(Protocol::Https));

        let range = Rule::from_tokens(tokens(&["--filter-tcp=80-90", "--dpi-desync=fake"]));
        assert_eq!(range.protocol(), Some(Protocol::Http));
    }

    #[test]
    fn test_longer_ports_are_not_misread() {
        let alt_http = Rule::from_tokens(tokens(&["--filter-tcp=8080", "--dpi-desync=fake"]));
        assert_eq!(alt_http.protocol(), None);

        let alt_tls = Rule::from_tokens(tokens(&["--filter-tcp=4430", "--dpi-desync=fake"]));
        assert_eq!(alt_tls.protocol(), None);
    }

    #[test]
    fn test_carried_params() {
        let rule = Rule::from_tokens(tokens(&[
            "--filter-udp=443",
            "--dpi-desync=fake",
            "--dpi-desync-repeats=6",
        ]));
        assert_eq!(rule.carried_params(), [&"--dpi-desync-repeats=6".to_string()]);
        assert_eq!(rule.desync_key().as_deref(), Some("fake"));
    }
}
