//! Drops HTTPS `server` blocks that were added before a certificate existed.
//!
//! nginx refuses to start with a `listen 443 ssl` block that has no
//! `ssl_certificate`, so such blocks are removed and certbot is left to add a
//! verified one.

use std::io::Write;

use crate::config::{Config, Tool};
use crate::report::{self, NextSteps};
use crate::server_block::{split_server_blocks, ServerBlock};
use crate::site_file;

/// What happened to a single server block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Kept,
    /// Listens on 443 without an `ssl_certificate` directive
    RemovedUnverified,
    /// Never closed its braces, dropped without notice
    DroppedIncomplete,
}

impl Verdict {
    /// Incomplete blocks are only dropped when they are not unverified HTTPS
    pub fn of(block: &ServerBlock) -> Self {
        if block.is_unverified_https() {
            Verdict::RemovedUnverified
        } else if block.complete {
            Verdict::Kept
        } else {
            Verdict::DroppedIncomplete
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    /// Surviving blocks joined by a blank line, with a trailing newline
    pub config: String,
    pub verdicts: Vec<Verdict>,
}

impl Removal {
    pub fn count(&self, verdict: Verdict) -> usize {
        self.verdicts.iter().filter(|v| **v == verdict).count()
    }
}

/// Rebuilds `config` from its server blocks, leaving out unverified HTTPS
/// blocks and any block whose braces never balanced.
pub fn remove_unverified_https(config: &str) -> Removal {
    let blocks = split_server_blocks(config);
    let verdicts: Vec<Verdict> = blocks.iter().map(Verdict::of).collect();

    let kept: Vec<&str> = blocks
        .iter()
        .zip(&verdicts)
        .filter(|(_, verdict)| **verdict == Verdict::Kept)
        .map(|(block, _)| block.text.as_str())
        .collect();

    let mut joined = kept.join("\n\n");
    joined.push('\n');

    Removal {
        config: joined,
        verdicts,
    }
}

/// Runs the remover end to end: read, back up, filter, write, report.
pub fn run(config: &Config, console: &mut impl Write) -> anyhow::Result<Removal> {
    let paths = config.paths_for(Tool::Remove);

    report::banner(console, "Remove HTTPS block without SSL certificate")?;

    writeln!(console, "1. Reading config from: {}", config.site_config.display())?;
    let original = site_file::read_site_config(&config.site_config)?;

    writeln!(console, "2. Backing up config to: {}", paths.backup.display())?;
    site_file::write_copy(&paths.backup, &original)?;

    writeln!(console, "3. Removing HTTPS blocks without SSL certificate...")?;
    let removal = remove_unverified_https(&original);
    for verdict in &removal.verdicts {
        if *verdict == Verdict::RemovedUnverified {
            writeln!(console, "   Found an HTTPS block without SSL certificate, removing it...")?;
        }
    }

    tracing::info!(
        kept = removal.count(Verdict::Kept),
        removed = removal.count(Verdict::RemovedUnverified),
        incomplete = removal.count(Verdict::DroppedIncomplete),
        "server blocks filtered"
    );

    writeln!(console, "4. Writing new config to: {}", paths.output.display())?;
    site_file::write_copy(&paths.output, &removal.config)?;
    writeln!(console, "   New config file created")?;
    writeln!(console)?;

    if removal.config == original {
        writeln!(console, "Config unchanged (no HTTPS block without SSL certificate)")?;
    } else {
        writeln!(console, "Removed HTTPS block without SSL certificate")?;
    }
    writeln!(console)?;

    NextSteps::new(config, Tool::Remove).write_to(console)?;

    Ok(removal)
}
