use std::sync::Arc;

use anyhow::Result;

use blockcheck_lib::{
    ProbeConfig, ProbeTarget, Prober, Protocol, RateLimiter, ResolutionCache,
    StrategyEvaluator, Supervisor, SupervisorConfig, TlsVersion,
};

use crate::options::Config;

mod scan;
mod tune;

pub(crate) use scan::scan;
pub(crate) use tune::tune;

/// Wire up the shared probing infrastructure and the engine supervisor
/// from the CLI configuration.
pub(crate) fn build_evaluator(
    config: &Config,
) -> (StrategyEvaluator, Arc<Prober>, Arc<ResolutionCache>) {
    let cache = Arc::new(ResolutionCache::default());
    let prober = Arc::new(Prober::new(
        ProbeConfig {
            timeout: config.probe_timeout(),
            accept_redirects: config.accept_redirects,
        },
        Arc::new(RateLimiter::default()),
        Arc::clone(&cache),
    ));

    let supervisor_config = SupervisorConfig {
        workdir: config.engine_dir.clone(),
        start_timeout: config.engine_start_timeout(),
        ..SupervisorConfig::new(config.engine.clone())
    };
    let evaluator =
        StrategyEvaluator::new(Supervisor::new(supervisor_config), Arc::clone(&prober));
    (evaluator, prober, cache)
}

/// Probe targets for the configured domains. HTTPS without an explicit
/// `--tls` pin is probed at both TLS 1.2 and TLS 1.3; a strategy only
/// counts as working when it serves both handshakes.
pub(crate) fn build_targets(config: &Config, protocol: Protocol) -> Result<Vec<ProbeTarget>> {
    let mut targets = Vec::new();
    for domain in &config.domains {
        let target = ProbeTarget::new(domain, protocol)?;
        match (protocol, config.tls) {
            (Protocol::Https, Some(tls)) => targets.push(target.with_tls(tls)),
            (Protocol::Https, None) => {
                targets.push(target.clone().with_tls(TlsVersion::V1_2));
                targets.push(target.with_tls(TlsVersion::V1_3));
            }
            _ => targets.push(target),
        }
    }
    Ok(targets)
}
