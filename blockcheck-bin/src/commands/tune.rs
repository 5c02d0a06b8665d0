use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use serde::{Deserialize, Serialize};

use blockcheck_lib::{Catalog, Rule, StrategySearch, Verdict};

use crate::options::Config;
use crate::ExitCode;

use super::build_evaluator;

/// On-disk rule list, as produced by the preset parser
#[derive(Debug, Default, Serialize, Deserialize)]
struct RulesFile {
    #[serde(rename = "rule", default)]
    rules: Vec<Rule>,
}

/// Re-test every rule of a preset and propose replacements for the failing
/// ones. With `--output`, write the adjusted rule list back to disk.
pub(crate) async fn tune(
    config: &Config,
    rules_path: &Path,
    output: Option<&Path>,
) -> Result<ExitCode> {
    let text = fs::read_to_string(rules_path)
        .with_context(|| format!("cannot read rules file `{}`", rules_path.display()))?;
    let rules: RulesFile = toml::from_str(&text)
        .with_context(|| format!("invalid rules file `{}`", rules_path.display()))?;
    let catalog = Catalog::from_path(&config.catalog)
        .context("cannot load the strategy catalog")?;

    let (evaluator, _prober, cache) = build_evaluator(config);
    let mut search = StrategySearch::new(evaluator, catalog).with_repeats(config.repeats);
    let report = search
        .run(&rules.rules, &config.domains, config.ipset.as_deref())
        .await;

    let mut adjusted = RulesFile::default();
    let mut unresolved = 0usize;
    for outcome in &report.outcomes {
        let label = outcome.rule.strategy_args.join(" ");
        let rule = match &outcome.verdict {
            Verdict::Unchanged { avg_time } => {
                println!(
                    "{} {label} ({:.3}s)",
                    style("keep").green(),
                    avg_time.as_secs_f64()
                );
                outcome.rule.clone()
            }
            Verdict::Replaced { args, avg_time } => {
                println!(
                    "{} {label} -> {} ({:.3}s)",
                    style("swap").yellow(),
                    args.join(" "),
                    avg_time.as_secs_f64()
                );
                Rule {
                    prefix_args: outcome.rule.prefix_args.clone(),
                    strategy_args: args.clone(),
                }
            }
            Verdict::NoReplacement { reason } => {
                unresolved += 1;
                println!("{} {label}: {reason}", style("dead").red());
                outcome.rule.clone()
            }
            Verdict::Skipped { reason } => {
                println!("{} {label}: {reason}", style("skip").dim());
                outcome.rule.clone()
            }
        };
        adjusted.rules.push(rule);
    }

    if let Some(path) = output {
        let rendered =
            toml::to_string_pretty(&adjusted).context("cannot serialize adjusted rules")?;
        fs::write(path, rendered)
            .with_context(|| format!("cannot write `{}`", path.display()))?;
        println!("Adjusted rules written to {}", path.display());
    }

    let stats = cache.stats();
    println!("Resolver cache: {} hits, {} misses", stats.hits, stats.misses);

    Ok(if unresolved > 0 {
        ExitCode::NoWorkingStrategy
    } else {
        ExitCode::Success
    })
}
