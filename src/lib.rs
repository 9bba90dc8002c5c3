//! dupfind - Concurrent duplicate file finder
//!
//! Walks a directory tree, hashes every qualifying file under a bounded
//! concurrency limit, and reports groups of byte-identical files. Two
//! scheduling strategies are available: a walker/worker pipeline joined by
//! bounded queues, and a recursive fan-out on a dedicated thread pool.

pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod signal;

use std::io::{self, IsTerminal, Write};
use std::sync::Arc;

use anyhow::Context;

use crate::cli::Cli;
use crate::config::Config;
use crate::duplicates::DuplicateFinder;
use crate::error::ExitCode;
use crate::output::{JsonReporter, OutputFormat, TextReporter};
use crate::progress::Progress;

/// Run the application, writing the report to stdout.
///
/// # Errors
///
/// Returns an error for invalid configuration, an unusable scan root, a
/// fatal traversal error, or an interrupted run. Use
/// [`ExitCode::for_error`] to map it to a process exit code.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    let stdout = io::stdout();
    let color = !cli.no_color && stdout.is_terminal();
    let mut handle = stdout.lock();
    run_with_writer(cli, &mut handle, color)
}

/// Run the application, writing the report to `writer`.
///
/// # Errors
///
/// See [`run_app`].
pub fn run_with_writer<W: Write>(cli: Cli, writer: &mut W, color: bool) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.merge_cli(&cli).context("Invalid command-line options")?;
    log::debug!("Effective configuration: {config:?}");

    let handler = signal::install_handler()?;
    let mut finder_config = config.finder_config().with_shutdown_flag(handler.flag());
    if config.progress && io::stderr().is_terminal() {
        finder_config = finder_config.with_progress_callback(Arc::new(Progress::new(cli.quiet)));
    }

    let finder = DuplicateFinder::new(finder_config);
    let (map, mut summary) = finder.find_duplicates(&cli.path)?;
    let groups = map.duplicate_groups();

    match config.output {
        OutputFormat::Text => TextReporter::new(color)
            .write_report(writer, &groups, &summary)
            .context("Failed to write report")?,
        OutputFormat::Json => JsonReporter::new(&groups, &summary, ExitCode::Success)
            .write_to(writer, true)
            .context("Failed to write report")?,
    }
    writer.flush()?;
    summary.mark_reported();
    log::debug!("Run finished in state {:?}", summary.state);

    Ok(ExitCode::Success)
}

/// Whether errors should be reported as JSON for these arguments.
///
/// Without `--output` the format comes from the config file and
/// environment. A configuration that fails to load means text.
#[must_use]
pub fn wants_json_errors(cli: &Cli) -> bool {
    let output = match cli.output {
        Some(output) => output,
        None => match Config::load(cli.config.as_deref()) {
            Ok(config) => config.output,
            Err(_) => OutputFormat::Text,
        },
    };
    output == OutputFormat::Json
}
