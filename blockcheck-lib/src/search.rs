//! Best-alternative search over a preset's rules.
//!
//! For every rule the search answers one question: does the rule's current
//! strategy still work, and if not, which catalog candidate with the same
//! desync technique is the fastest working replacement? Verdicts are cached
//! per (protocol, technique) for the duration of one run, so a technique
//! shared by several rules is only ever tested once.

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::path::Path;
use std::time::Duration;

use crate::catalog::Catalog;
use crate::evaluator::{Evaluate, Evaluation};
use crate::types::{ProbeTarget, Protocol, Rule, Strategy};

/// Decision for one rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The current strategy still works; keep the rule as-is
    Unchanged {
        avg_time: Duration,
    },
    /// The current strategy failed and a working replacement was found
    Replaced {
        /// Replacement strategy tokens, carried tuning parameters included
        args: Vec<String>,
        avg_time: Duration,
    },
    /// The current strategy failed and no catalog candidate worked
    NoReplacement {
        /// Diagnostic from the original strategy's failed trial
        reason: String,
    },
    /// The rule could not be tested at all (no protocol or technique key)
    Skipped {
        reason: String,
    },
}

impl Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Unchanged { avg_time } => {
                write!(f, "unchanged ({:.3}s)", avg_time.as_secs_f64())
            }
            Verdict::Replaced { args, avg_time } => {
                write!(f, "replaced ({:.3}s): {}", avg_time.as_secs_f64(), args.join(" "))
            }
            Verdict::NoReplacement { reason } => write!(f, "no replacement: {reason}"),
            Verdict::Skipped { reason } => write!(f, "skipped: {reason}"),
        }
    }
}

/// One rule together with its verdict
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub rule: Rule,
    pub verdict: Verdict,
}

/// Everything one search run produced, in rule order
#[derive(Debug, Clone, Default)]
pub struct SearchReport {
    pub outcomes: Vec<SearchOutcome>,
}

impl SearchReport {
    /// Rules whose strategy should be swapped out
    pub fn replacements(&self) -> impl Iterator<Item = &SearchOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome.verdict, Verdict::Replaced { .. }))
    }
}

/// Verdict as cached: per technique, independent of any one rule's carried
/// parameters.
#[derive(Debug, Clone)]
enum CachedVerdict {
    Unchanged(Duration),
    Replacement(Vec<String>, Duration),
    NoReplacement(String),
}

/// Searches replacement strategies for failing preset rules.
///
/// Generic over [`Evaluate`] so the trial machinery can be swapped out in
/// tests.
pub struct StrategySearch<E> {
    evaluator: E,
    catalog: Catalog,
    cache: HashMap<(Protocol, String), CachedVerdict>,
    repeats: u32,
}

impl<E: Evaluate> StrategySearch<E> {
    #[must_use]
    pub fn new(evaluator: E, catalog: Catalog) -> Self {
        Self {
            evaluator,
            catalog,
            cache: HashMap::new(),
            repeats: 1,
        }
    }

    /// Probe every target this many times per trial
    #[must_use]
    pub const fn with_repeats(mut self, repeats: u32) -> Self {
        self.repeats = repeats;
        self
    }

    /// Run the search over `rules`, probing `domains`.
    ///
    /// `ipset` switches the engine's target selector from a domain hostlist
    /// to a pre-built IP range file.
    pub async fn run(
        &mut self,
        rules: &[Rule],
        domains: &[String],
        ipset: Option<&Path>,
    ) -> SearchReport {
        let mut report = SearchReport::default();
        for rule in rules {
            let verdict = self.decide(rule, domains, ipset).await;
            log::info!("rule [{}]: {verdict}", rule.strategy_args.join(" "));
            report.outcomes.push(SearchOutcome {
                rule: rule.clone(),
                verdict,
            });
        }
        report
    }

    async fn decide(
        &mut self,
        rule: &Rule,
        domains: &[String],
        ipset: Option<&Path>,
    ) -> Verdict {
        let Some(protocol) = rule.protocol() else {
            return Verdict::Skipped {
                reason: "no protocol filter in rule".to_string(),
            };
        };
        let Some(key) = rule.desync_key() else {
            return Verdict::Skipped {
                reason: "no desync technique in rule".to_string(),
            };
        };

        let targets = match build_targets(domains, protocol) {
            Ok(targets) => targets,
            Err(reason) => return Verdict::Skipped { reason },
        };

        if let Some(cached) = self.cache.get(&(protocol, key.clone())) {
            log::debug!("cached verdict for ({protocol}, {key})");
            return apply_cached(cached, rule);
        }

        let current = Strategy::new(protocol, rule.strategy_args.clone());
        let evaluation = self
            .evaluator
            .evaluate(&targets, &current.command(domains, ipset), self.repeats)
            .await;

        let cached = match evaluation {
            Evaluation::Success { avg_time } => CachedVerdict::Unchanged(avg_time),
            Evaluation::Failure { .. } => {
                let reason = evaluation.to_string();
                log::info!("current strategy failed ({reason}), trying alternatives");
                self.find_replacement(&targets, protocol, &key, domains, ipset)
                    .await
                    .map_or(CachedVerdict::NoReplacement(reason), |(args, time)| {
                        CachedVerdict::Replacement(args, time)
                    })
            }
        };
        let verdict = apply_cached(&cached, rule);
        self.cache.insert((protocol, key), cached);
        verdict
    }

    /// Evaluate every candidate sharing the technique key and keep the
    /// fastest success. No early exit: a working-but-slow candidate must
    /// not shadow a faster one later in the catalog.
    async fn find_replacement(
        &mut self,
        targets: &[ProbeTarget],
        protocol: Protocol,
        key: &str,
        domains: &[String],
        ipset: Option<&Path>,
    ) -> Option<(Vec<String>, Duration)> {
        let candidates: Vec<Strategy> = self
            .catalog
            .candidates(protocol, key)
            .into_iter()
            .cloned()
            .collect();
        let mut best: Option<(Vec<String>, Duration)> = None;
        for candidate in candidates {
            let evaluation = self
                .evaluator
                .evaluate(targets, &candidate.command(domains, ipset), self.repeats)
                .await;
            log::debug!("candidate [{}]: {evaluation}", candidate.name());
            if let Evaluation::Success { avg_time } = evaluation {
                // Strict comparison keeps the earlier candidate on a tie.
                let better = best
                    .as_ref()
                    .map_or(true, |(_, best_time)| avg_time < *best_time);
                if better {
                    best = Some((candidate.args().to_vec(), avg_time));
                }
            }
        }
        best
    }
}

fn build_targets(domains: &[String], protocol: Protocol) -> Result<Vec<ProbeTarget>, String> {
    domains
        .iter()
        .map(|domain| {
            ProbeTarget::new(domain, protocol).map_err(|e| e.to_string())
        })
        .collect()
}

/// Turn a cached technique-level verdict into a rule-level one, re-appending
/// the rule's carried tuning parameters when the replacement lacks them.
fn apply_cached(cached: &CachedVerdict, rule: &Rule) -> Verdict {
    match cached {
        CachedVerdict::Unchanged(avg_time) => Verdict::Unchanged {
            avg_time: *avg_time,
        },
        CachedVerdict::Replacement(args, avg_time) => {
            let mut args = args.clone();
            for param in rule.carried_params() {
                let name = param.split('=').next().unwrap_or(param);
                if !args.iter().any(|token| token.starts_with(name)) {
                    args.push(param.clone());
                }
            }
            Verdict::Replaced {
                args,
                avg_time: *avg_time,
            }
        }
        CachedVerdict::NoReplacement(reason) => Verdict::NoReplacement {
            reason: reason.clone(),
        },
    }
}
