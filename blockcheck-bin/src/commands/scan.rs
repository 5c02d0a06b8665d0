use anyhow::{Context, Result};
use console::style;
use strum::IntoEnumIterator;

use blockcheck_lib::{
    curl_supports_http3, Catalog, ErrorKind, Evaluate, ProbeResult, ProbeTarget, Prober,
    Protocol, Report,
};

use crate::options::Config;
use crate::ExitCode;

use super::{build_evaluator, build_targets};

/// Try every catalog strategy for the requested protocols and print a
/// per-protocol summary of the working ones, fastest first.
pub(crate) async fn scan(config: &Config, protocols: &[Protocol]) -> Result<ExitCode> {
    let catalog = Catalog::from_path(&config.catalog)
        .context("cannot load the strategy catalog")?;

    let mut protocols: Vec<Protocol> = if protocols.is_empty() {
        Protocol::iter().collect()
    } else {
        protocols.to_vec()
    };
    if protocols.contains(&Protocol::Http3) && !curl_supports_http3().await {
        if protocols.len() == 1 {
            return Err(ErrorKind::Http3Unsupported.into());
        }
        log::warn!("installed curl lacks HTTP/3 support, skipping http3 strategies");
        protocols.retain(|protocol| *protocol != Protocol::Http3);
    }

    let (mut evaluator, prober, cache) = build_evaluator(config);
    let mut report = Report::new();
    let mut tested_any = false;

    for protocol in protocols {
        let targets = build_targets(config, protocol)?;
        if baseline(&prober, protocol, &targets).await {
            println!(
                "  {} all targets accessible without the engine, skipping {protocol} strategies",
                style("✔").green()
            );
            continue;
        }

        let candidates: Vec<_> = catalog.strategies(protocol).collect();
        if candidates.is_empty() {
            log::info!("no {protocol} strategies in the catalog");
            continue;
        }
        tested_any = true;
        println!(
            "{}",
            style(format!("Testing {} {protocol} strategies", candidates.len())).bold()
        );

        for strategy in candidates {
            let evaluation = evaluator
                .evaluate(
                    &targets,
                    &strategy.command(&config.domains, config.ipset.as_deref()),
                    config.repeats,
                )
                .await;

            if let Some(avg_time) = evaluation.avg_time() {
                println!("  {} {}", style("✔").green(), strategy.name());
                report.add(protocol, strategy.name(), avg_time);
            } else {
                println!(
                    "  {} {}: {evaluation}",
                    style("✗").red(),
                    strategy.name()
                );
            }
        }
    }

    let summary = report.render(&config.domains, &cache.stats());
    println!("\n{summary}");
    if let Err(e) = std::fs::write(&config.report_file, &summary) {
        log::warn!(
            "cannot write the summary to {}: {e}",
            config.report_file.display()
        );
    }

    Ok(if report.is_empty() && tested_any {
        ExitCode::NoWorkingStrategy
    } else {
        ExitCode::Success
    })
}

/// Probe the targets without the engine running and report whether every
/// one of them is already reachable. An unblocked protocol needs no
/// strategy at all, so its sweep is skipped.
async fn baseline(prober: &Prober, protocol: Protocol, targets: &[ProbeTarget]) -> bool {
    println!(
        "{}",
        style(format!("Baseline {protocol} accessibility (engine off)")).bold()
    );
    let mut results = Vec::with_capacity(targets.len());
    for target in targets {
        let result = prober.perform(target).await;
        if result.status.is_success() {
            println!("  {result} ({:.3}s)", result.elapsed.as_secs_f64());
        } else {
            println!("  {result}");
        }
        results.push(result);
    }
    all_accessible(&results)
}

fn all_accessible(results: &[ProbeResult]) -> bool {
    !results.is_empty() && results.iter().all(|result| result.status.is_success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockcheck_lib::ProbeStatus;
    use http::StatusCode;
    use std::time::Duration;

    fn result(host: &str, status: ProbeStatus) -> ProbeResult {
        ProbeResult {
            host: host.to_string(),
            status,
            elapsed: Duration::from_millis(100),
        }
    }

    #[test]
    fn test_all_accessible_requires_every_target() {
        assert!(all_accessible(&[
            result("a.org", ProbeStatus::Ok(StatusCode::OK)),
            result("b.org", ProbeStatus::Ok(StatusCode::FOUND)),
        ]));
        assert!(!all_accessible(&[
            result("a.org", ProbeStatus::Ok(StatusCode::OK)),
            result("b.org", ProbeStatus::Timeout),
        ]));
        assert!(!all_accessible(&[]));
    }
}
