//! `blockcheck-lib` searches for working DPI-circumvention configurations
//! for an external packet-manipulation engine. It drives the engine through
//! candidate command-line strategies and probes live HTTP/HTTPS/HTTP3
//! endpoints to see whether each strategy restores access to a blocked
//! domain.
//!
//! The building blocks are exposed individually so that callers can compose
//! their own flows:
//!
//! ```no_run
//! use std::sync::Arc;
//! use blockcheck_lib::{
//!     Catalog, Evaluate, ProbeConfig, ProbeTarget, Prober, Protocol,
//!     RateLimiter, ResolutionCache, StrategyEvaluator, Supervisor,
//!     SupervisorConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> blockcheck_lib::Result<()> {
//!     let catalog = Catalog::from_path("strategies.txt".as_ref())?;
//!     let prober = Arc::new(Prober::new(
//!         ProbeConfig::default(),
//!         Arc::new(RateLimiter::default()),
//!         Arc::new(ResolutionCache::default()),
//!     ));
//!     let supervisor = Supervisor::new(SupervisorConfig::new("winws.exe".into()));
//!     let mut evaluator = StrategyEvaluator::new(supervisor, prober);
//!
//!     let domains = vec!["rutracker.org".to_string()];
//!     let targets = vec![ProbeTarget::new("rutracker.org", Protocol::Https)?];
//!     for strategy in catalog.strategies(Protocol::Https) {
//!         let evaluation = evaluator
//!             .evaluate(&targets, &strategy.command(&domains, None), 1)
//!             .await;
//!         println!("{}: {evaluation}", strategy.name());
//!     }
//!     Ok(())
//! }
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod catalog;
mod evaluator;
mod probe;
mod ratelimit;
mod resolver;
mod search;
mod supervisor;
mod types;

#[cfg(test)]
#[macro_use]
pub mod test_utils;

pub use catalog::Catalog;
pub use evaluator::{Evaluate, Evaluation, StrategyEvaluator};
pub use probe::{ProbeConfig, Prober, curl_supports_http3};
pub use ratelimit::RateLimiter;
pub use resolver::{CacheStats, Lookup, ResolutionCache, SystemLookup, DEFAULT_DNS_TTL};
pub use probe::DEFAULT_PROBE_TIMEOUT;
pub use search::{SearchOutcome, SearchReport, StrategySearch, Verdict};
pub use supervisor::{Supervisor, SupervisorConfig, DEFAULT_READY_MARKER};
pub use types::*;
