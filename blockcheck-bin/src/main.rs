//! `blockcheck` searches for working DPI-circumvention strategies for the
//! winws packet engine.
//!
//! The binary is a wrapper around `blockcheck-lib`, which provides the
//! engine supervision, probing, and search machinery.
//!
//! Scan a strategy catalog against the default domain:
//!
//! ```sh
//! blockcheck scan --catalog strategies.txt
//! ```
//!
//! Only HTTPS, probing a different site:
//!
//! ```sh
//! blockcheck scan --protocol https --domain example.org
//! ```
//!
//! Re-test a preset's rules and write back working replacements:
//!
//! ```sh
//! blockcheck tune --rules preset.toml --output adjusted.toml
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]

use anyhow::Result;
use clap::Parser;

use crate::logging::init_logging;
use crate::options::{BlockcheckOptions, Command};

mod commands;
mod logging;
mod options;
mod verbosity;

/// A C-like enum that can be cast to `i32` and used as process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    // NOTE: exit code 1 is used for any `Result::Err` bubbled up to `main()`
    // using the `?` operator.
    #[allow(unused)]
    UnexpectedFailure = 1,
    /// The run finished, but no working strategy (or replacement) was found
    NoWorkingStrategy = 2,
}

fn main() -> Result<()> {
    // std::process::exit doesn't guarantee that all destructors will be run,
    // therefore we wrap the main code in another function to ensure that.
    // See: https://doc.rust-lang.org/stable/std/process/fn.exit.html
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

fn run_main() -> Result<i32> {
    let opts = BlockcheckOptions::parse();
    init_logging(&opts.config.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let exit_code = runtime.block_on(run(&opts))?;
    Ok(exit_code as i32)
}

async fn run(opts: &BlockcheckOptions) -> Result<ExitCode> {
    match &opts.command {
        Command::Scan { protocols } => commands::scan(&opts.config, protocols).await,
        Command::Tune { rules, output } => {
            commands::tune(&opts.config, rules, output.as_deref()).await
        }
    }
}
