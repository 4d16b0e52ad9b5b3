use std::io;
use std::process::ExitCode;

use clap::crate_version;
use ngx_https::config::{self, Tool};
use ngx_https::{inserter, logging, report, site_file};

fn main() -> ExitCode {
    // Loads configuration from command-line, YAML or environment sources
    let config = match config::load(Tool::Insert) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error loading configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    logging::setup_logging(&config.logging);
    tracing::debug!(version = crate_version!(), site_config = %config.site_config.display(), "starting");

    let stamp = site_file::executable_timestamp();
    match inserter::run(&config, stamp, &mut io::stdout().lock()) {
        Ok(outcome) => {
            tracing::debug!(
                outcome = outcome.kind(),
                wrote_output = outcome.is_inserted(),
                "finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::debug!(error = ?err, "run aborted");
            for line in report::describe_failure(&err, env!("CARGO_BIN_NAME")) {
                eprintln!("{line}");
            }
            ExitCode::FAILURE
        }
    }
}
