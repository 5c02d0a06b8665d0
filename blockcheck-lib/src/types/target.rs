use std::fmt::Display;

use super::{ErrorKind, Protocol, Result, TlsVersion};

/// One endpoint to probe: a hostname (optionally with a path suffix), a
/// port, a protocol, and an optional TLS version constraint.
///
/// Immutable once constructed. The hostname is what gets resolved and what
/// ends up in `Host`/SNI; the connection itself is pinned to the resolved
/// address by the prober.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProbeTarget {
    host: String,
    path: Option<String>,
    port: u16,
    protocol: Protocol,
    tls: Option<TlsVersion>,
}

impl ProbeTarget {
    /// Parse a `host` or `host/path` spec into a target probing the
    /// protocol's conventional port.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidTarget`] when the host part is empty or
    /// the spec carries a URL scheme.
    pub fn new(spec: &str, protocol: Protocol) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() || spec.contains("://") || spec.contains(char::is_whitespace) {
            return Err(ErrorKind::InvalidTarget(spec.to_string()));
        }
        let (host, path) = match spec.split_once('/') {
            Some((host, path)) => (host, Some(format!("/{path}"))),
            None => (spec, None),
        };
        if host.is_empty() {
            return Err(ErrorKind::InvalidTarget(spec.to_string()));
        }
        Ok(Self {
            host: host.to_string(),
            path,
            port: protocol.default_port(),
            protocol,
            tls: None,
        })
    }

    /// Constrain the TLS version used for the probe handshake
    #[must_use]
    pub fn with_tls(mut self, tls: TlsVersion) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Probe a non-standard port (mostly useful for tests)
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    #[must_use]
    pub const fn tls(&self) -> Option<TlsVersion> {
        self.tls
    }

    /// The URL this target probes. The port is spelled out whenever it
    /// differs from the scheme default so that pinned connections reach the
    /// right socket.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = self.protocol.scheme();
        let path = self.path.as_deref().unwrap_or("");
        if self.port == self.protocol.default_port() {
            format!("{scheme}://{}{path}", self.host)
        } else {
            format!("{scheme}://{}:{}{path}", self.host, self.port)
        }
    }

    /// The registrable root of the hostname, approximated as its last two
    /// DNS labels. Used to decide whether a redirect stays on the probed
    /// site or leads somewhere else entirely.
    #[must_use]
    pub fn root_domain(&self) -> &str {
        let mut dots = self.host.rmatch_indices('.');
        let _tld = dots.next();
        match dots.next() {
            Some((idx, _)) => &self.host[idx + 1..],
            None => &self.host,
        }
    }
}

impl Display for ProbeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_host_only() {
        let target = ProbeTarget::new("rutracker.org", Protocol::Http).unwrap();
        assert_eq!(target.host(), "rutracker.org");
        assert_eq!(target.port(), 80);
        assert_eq!(target.url(), "http://rutracker.org");
    }

    #[test]
    fn test_parse_host_with_path() {
        let target = ProbeTarget::new("rutracker.org/forum/index.php", Protocol::Https).unwrap();
        assert_eq!(target.host(), "rutracker.org");
        assert_eq!(target.url(), "https://rutracker.org/forum/index.php");
    }

    #[test]
    fn test_rejects_schemes_and_empty() {
        assert!(ProbeTarget::new("https://rutracker.org", Protocol::Https).is_err());
        assert!(ProbeTarget::new("", Protocol::Https).is_err());
        assert!(ProbeTarget::new("/forum", Protocol::Https).is_err());
    }

    #[test]
    fn test_custom_port_in_url() {
        let target = ProbeTarget::new("example.com", Protocol::Http)
            .unwrap()
            .with_port(8080);
        assert_eq!(target.url(), "http://example.com:8080");
    }

    #[test]
    fn test_root_domain() {
        let target = ProbeTarget::new("www.youtube.com", Protocol::Https).unwrap();
        assert_eq!(target.root_domain(), "youtube.com");

        let target = ProbeTarget::new("localhost", Protocol::Http).unwrap();
        assert_eq!(target.root_domain(), "localhost");
    }
}
