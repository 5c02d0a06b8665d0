//! Trial of one strategy: engine up, probe every target, engine down.
//!
//! A trial round fires one probe per target through a bounded worker pool
//! and fails fast: the first failed probe decides the round, outstanding
//! probes are dropped and their late results ignored. With repeats, only
//! the fastest successful timing per target is kept.

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::StreamExt;

use crate::probe::Prober;
use crate::supervisor::Supervisor;
use crate::types::ProbeTarget;

/// Number of probes in flight at once within one round
pub const DEFAULT_PROBE_WORKERS: usize = 10;

/// Outcome of evaluating one strategy against a target set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// Every probe on every repeat succeeded
    Success {
        /// Mean of the per-target best timings
        avg_time: Duration,
    },
    /// Some probe failed, or the engine never became ready
    Failure {
        /// Human-readable diagnostic of the failing probe or start error
        reason: String,
        /// Engine stderr, when the engine itself misbehaved
        engine_stderr: Option<String>,
    },
}

impl Evaluation {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Evaluation::Success { .. })
    }

    #[must_use]
    pub const fn avg_time(&self) -> Option<Duration> {
        match self {
            Evaluation::Success { avg_time } => Some(*avg_time),
            Evaluation::Failure { .. } => None,
        }
    }
}

impl Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evaluation::Success { avg_time } => {
                write!(f, "works (avg {:.3}s)", avg_time.as_secs_f64())
            }
            Evaluation::Failure {
                reason,
                engine_stderr,
            } => match engine_stderr {
                // Engine diagnostics beat probe diagnostics when both exist.
                Some(stderr) if !stderr.trim().is_empty() => {
                    write!(f, "engine failure: {}", stderr.trim())
                }
                _ => write!(f, "{reason}"),
            },
        }
    }
}

/// Seam for the search layer; lets tests script evaluation outcomes
/// without spawning processes or sockets.
#[async_trait]
pub trait Evaluate: Send {
    async fn evaluate(
        &mut self,
        targets: &[ProbeTarget],
        args: &[String],
        repeats: u32,
    ) -> Evaluation;
}

/// Evaluates engine argument lists by probing real targets through a
/// supervised engine process.
pub struct StrategyEvaluator {
    supervisor: Supervisor,
    prober: Arc<Prober>,
    workers: usize,
}

impl StrategyEvaluator {
    #[must_use]
    pub fn new(supervisor: Supervisor, prober: Arc<Prober>) -> Self {
        Self {
            supervisor,
            prober,
            workers: DEFAULT_PROBE_WORKERS,
        }
    }

    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    async fn run_rounds(&self, targets: &[ProbeTarget], repeats: u32) -> Evaluation {
        // Keyed by the full target, not the hostname: one domain may be
        // probed as several targets (per TLS version) and each keeps its
        // own best timing.
        let mut best: HashMap<&ProbeTarget, Duration> = HashMap::new();
        for round in 0..repeats.max(1) {
            log::debug!("probe round {} of {}", round + 1, repeats.max(1));
            let probes: Vec<_> = targets
                .iter()
                .map(|target| async move { (target, self.prober.perform(target).await) })
                .collect();
            let mut probes = futures::stream::iter(probes).buffer_unordered(self.workers);

            while let Some((target, result)) = probes.next().await {
                if !result.status.is_success() {
                    // Dropping the stream cancels the in-flight probes.
                    return Evaluation::Failure {
                        reason: result.to_string(),
                        engine_stderr: None,
                    };
                }
                best.entry(target)
                    .and_modify(|time| *time = (*time).min(result.elapsed))
                    .or_insert(result.elapsed);
            }
        }

        let total: Duration = best.values().sum();
        let avg_time = total / u32::try_from(best.len().max(1)).unwrap_or(u32::MAX);
        Evaluation::Success { avg_time }
    }
}

#[async_trait]
impl Evaluate for StrategyEvaluator {
    /// Start the engine with `args`, probe all targets `repeats` times, and
    /// stop the engine again on every exit path.
    ///
    /// An engine start failure short-circuits the trial with the captured
    /// stderr attached; that diagnostic is more actionable than the probe
    /// failures that would follow.
    async fn evaluate(
        &mut self,
        targets: &[ProbeTarget],
        args: &[String],
        repeats: u32,
    ) -> Evaluation {
        if let Err(e) = self.supervisor.start(args).await {
            let stderr = self.supervisor.stderr_text();
            return Evaluation::Failure {
                reason: e.to_string(),
                engine_stderr: (!stderr.trim().is_empty()).then_some(stderr),
            };
        }

        let evaluation = self.run_rounds(targets, repeats).await;
        self.supervisor.stop().await;
        evaluation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_server;
    use crate::probe::ProbeConfig;
    use crate::ratelimit::RateLimiter;
    use crate::resolver::ResolutionCache;
    use crate::supervisor::SupervisorConfig;
    use crate::types::Protocol;
    use http::StatusCode;
    use std::path::PathBuf;

    fn ready_script() -> Vec<String> {
        vec![
            "-c".to_string(),
            "echo 'windivert initialized. capture is started.'; sleep 10".to_string(),
        ]
    }

    fn evaluator() -> StrategyEvaluator {
        let config = SupervisorConfig {
            start_timeout: Duration::from_secs(3),
            stop_grace: Duration::from_millis(500),
            ..SupervisorConfig::new(PathBuf::from("sh"))
        };
        let prober = Prober::new(
            ProbeConfig {
                timeout: Duration::from_millis(500),
                ..ProbeConfig::default()
            },
            Arc::new(RateLimiter::default()),
            Arc::new(ResolutionCache::default()),
        );
        StrategyEvaluator::new(Supervisor::new(config), Arc::new(prober))
    }

    fn local_target(server: &wiremock::MockServer) -> ProbeTarget {
        ProbeTarget::new("127.0.0.1", Protocol::Http)
            .unwrap()
            .with_port(server.address().port())
    }

    #[tokio::test]
    async fn test_successful_trial() {
        let server = mock_server!(StatusCode::OK);
        let mut evaluator = evaluator();

        let evaluation = evaluator
            .evaluate(&[local_target(&server)], &ready_script(), 1)
            .await;
        assert!(evaluation.is_success());
        assert!(evaluation.avg_time().is_some());
    }

    #[tokio::test]
    async fn test_failed_probe_fails_trial() {
        let server = mock_server!(StatusCode::BAD_REQUEST);
        let mut evaluator = evaluator();

        let evaluation = evaluator
            .evaluate(&[local_target(&server)], &ready_script(), 1)
            .await;
        match evaluation {
            Evaluation::Failure {
                reason,
                engine_stderr,
            } => {
                assert!(reason.contains("fakes"));
                assert!(engine_stderr.is_none());
            }
            Evaluation::Success { .. } => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_engine_crash_attaches_stderr() {
        let mut evaluator = evaluator();
        let args = vec![
            "-c".to_string(),
            "echo 'no permission to install driver' >&2; sleep 10".to_string(),
        ];

        let evaluation = evaluator.evaluate(&[], &args, 1).await;
        match evaluation {
            Evaluation::Failure { engine_stderr, .. } => {
                let stderr = engine_stderr.unwrap();
                assert!(stderr.contains("no permission"));
            }
            Evaluation::Success { .. } => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_fast_failure_wins_over_slow_success() {
        // One target answers 400 instantly, the other would succeed after a
        // delay longer than the whole trial should take.
        let failing = mock_server!(StatusCode::BAD_REQUEST);
        let slow = mock_server!(
            StatusCode::OK,
            set_delay(std::time::Duration::from_secs(3))
        );
        let mut evaluator = evaluator();

        let start = std::time::Instant::now();
        let evaluation = evaluator
            .evaluate(
                &[local_target(&failing), local_target(&slow)],
                &ready_script(),
                1,
            )
            .await;
        assert!(start.elapsed() < Duration::from_secs(2));
        match evaluation {
            Evaluation::Failure { reason, .. } => assert!(reason.contains("fakes")),
            Evaluation::Success { .. } => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_same_host_targets_average_separately() {
        // Two targets on the same host (as the per-TLS-version fan-out
        // produces) must both contribute to the average instead of
        // collapsing into one per-host entry.
        let instant = mock_server!(StatusCode::OK);
        let delayed = mock_server!(
            StatusCode::OK,
            set_delay(std::time::Duration::from_millis(300))
        );
        let mut evaluator = evaluator();

        let evaluation = evaluator
            .evaluate(
                &[local_target(&instant), local_target(&delayed)],
                &ready_script(),
                1,
            )
            .await;
        let avg_time = evaluation.avg_time().expect("trial should succeed");
        assert!(
            avg_time >= Duration::from_millis(150),
            "avg {avg_time:?} ignores the slower same-host target"
        );
    }

    #[tokio::test]
    async fn test_repeats_keep_fastest_timing() {
        let server = mock_server!(StatusCode::OK);
        let mut evaluator = evaluator();

        let evaluation = evaluator
            .evaluate(&[local_target(&server)], &ready_script(), 3)
            .await;
        assert!(evaluation.is_success());
    }
}
