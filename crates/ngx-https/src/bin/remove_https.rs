use std::io;
use std::process::ExitCode;

use clap::crate_version;
use ngx_https::config::{self, Tool};
use ngx_https::remover::{self, Verdict};
use ngx_https::{logging, report};

fn main() -> ExitCode {
    // Loads configuration from command-line, YAML or environment sources
    let config = match config::load(Tool::Remove) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error loading configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    logging::setup_logging(&config.logging);
    tracing::debug!(version = crate_version!(), site_config = %config.site_config.display(), "starting");

    match remover::run(&config, &mut io::stdout().lock()) {
        Ok(removal) => {
            tracing::debug!(
                removed = removal.count(Verdict::RemovedUnverified),
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
