use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use crate::resolver::CacheStats;

use super::Protocol;

/// One successful strategy with its measured time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    /// Display name of the strategy
    pub strategy: String,
    /// Mean probe time measured during evaluation
    pub time: Duration,
}

/// Collects successful strategies per protocol during a scan and renders
/// the final summary: per protocol, successes sorted ascending by time,
/// plus the resolver cache counters.
#[derive(Debug, Default)]
pub struct Report {
    entries: BTreeMap<Protocol, Vec<ReportEntry>>,
}

impl Report {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, protocol: Protocol, strategy: String, time: Duration) {
        self.entries
            .entry(protocol)
            .or_default()
            .push(ReportEntry { strategy, time });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    /// Successful entries for a protocol, sorted ascending by time
    #[must_use]
    pub fn sorted(&self, protocol: Protocol) -> Vec<ReportEntry> {
        let mut entries = self.entries.get(&protocol).cloned().unwrap_or_default();
        entries.sort_by_key(|entry| entry.time);
        entries
    }

    /// Render the textual summary written to the report file
    #[must_use]
    pub fn render(&self, domains: &[String], stats: &CacheStats) -> String {
        let joined = domains.join(", ");
        let mut out = format!("SUMMARY for {joined}\n{}\n\n", "=".repeat(8 + joined.len()));

        for (&protocol, _) in &self.entries {
            let entries = self.sorted(protocol);
            if entries.is_empty() {
                continue;
            }
            let _ = writeln!(
                out,
                "# Successful {protocol} strategies (sorted by speed):"
            );
            for entry in entries {
                let _ = writeln!(
                    out,
                    "  (Time: {:.3}s) {}",
                    entry.time.as_secs_f64(),
                    entry.strategy
                );
            }
            out.push('\n');
        }

        let _ = writeln!(
            out,
            "Resolver cache: {} hits, {} misses",
            stats.hits, stats.misses
        );
        out
    }
}
