//! Strategy catalog loading.
//!
//! A catalog is a plain text file of candidate strategies, one per line, in
//! the form `<protocol> : <argument tokens>`. Lines starting with `#` and
//! blank lines are skipped; malformed lines are logged and dropped rather
//! than failing the whole load.

use std::path::Path;
use std::str::FromStr;

use crate::types::{Protocol, Result, Strategy};

/// In-memory collection of candidate strategies, in file order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    strategies: Vec<Strategy>,
}

impl Catalog {
    /// Load a catalog from a file.
    ///
    /// # Errors
    ///
    /// [`crate::ErrorKind::IoError`] if the file cannot be read.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| (path.to_path_buf(), e))?;
        Ok(Self::parse(&text))
    }

    /// Parse catalog text, skipping comments, blank lines, and lines that
    /// do not name a known protocol.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut strategies = Vec::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((protocol, args)) = line.split_once(':') else {
                log::warn!("catalog line {}: no protocol separator", number + 1);
                continue;
            };
            let Ok(protocol) = Protocol::from_str(protocol.trim()) else {
                log::warn!(
                    "catalog line {}: unknown protocol {:?}",
                    number + 1,
                    protocol.trim()
                );
                continue;
            };
            let args: Vec<String> =
                args.split_whitespace().map(ToString::to_string).collect();
            if args.is_empty() {
                log::warn!("catalog line {}: empty strategy", number + 1);
                continue;
            }
            strategies.push(Strategy::new(protocol, args));
        }
        Self { strategies }
    }

    /// All strategies for one protocol, in catalog order
    pub fn strategies(&self, protocol: Protocol) -> impl Iterator<Item = &Strategy> {
        self.strategies
            .iter()
            .filter(move |strategy| strategy.protocol() == protocol)
    }

    /// Candidate replacements: strategies sharing both the protocol and the
    /// desync technique key, in catalog order
    #[must_use]
    pub fn candidates(&self, protocol: Protocol, desync_key: &str) -> Vec<&Strategy> {
        self.strategies(protocol)
            .filter(|strategy| strategy.desync_key().as_deref() == Some(desync_key))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
