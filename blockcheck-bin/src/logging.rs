use std::io::Write;

use console::Style;
use env_logger::{Builder, Env};
use log::{Level, LevelFilter};

use crate::verbosity::Verbosity;

fn color_for_level(level: Level) -> Style {
    match level {
        Level::Error => Style::new().red(),
        Level::Warn => Style::new().yellow(),
        Level::Info => Style::new().green(),
        Level::Debug => Style::new().blue(),
        Level::Trace => Style::new().dim(),
    }
}

/// Initialize the logging system with the given verbosity level.
///
/// `RUST_LOG`, when set, overrides the CLI flags.
pub(crate) fn init_logging(verbose: &Verbosity) {
    let env = Env::default().filter_or("RUST_LOG", "warn");

    let mut builder = Builder::from_env(env);
    builder
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false);

    if std::env::var("RUST_LOG").is_err() {
        let level_filter = verbose.log_level_filter();
        builder.filter_level(LevelFilter::Warn);
        builder
            .filter_module("blockcheck", level_filter)
            .filter_module("blockcheck_lib", level_filter);
    }

    builder.format(|buf, record| {
        let level = record.level();
        let color = color_for_level(level);
        writeln!(
            buf,
            "{} {}",
            color.apply_to(format!("[{level}]")),
            record.args()
        )
    });

    builder.init();
}
