use once_cell::sync::Lazy;
use regex::Regex;

/// A line that opens a `server` context (leading whitespace allowed)
static SERVER_OPEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*server\s*\{").expect("server block pattern is a valid regex")
});

/// A `server { ... }` slice of an nginx site configuration.
///
/// This is not a grammar-aware parse: blocks are found by counting `{` and `}`
/// per line, so braces inside quoted strings or comments will confuse it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerBlock {
    /// The raw lines of the block joined with `\n` (no trailing newline)
    pub text: String,

    /// Whether the brace balance closed before the end of input
    /// (or before the next `server {` line interrupted the block)
    pub complete: bool,
}

impl ServerBlock {
    fn new(lines: &[&str], balance: i64) -> Self {
        Self {
            text: lines.join("\n"),
            complete: balance == 0,
        }
    }

    /// A block that listens on 443 but carries no `ssl_certificate` directive.
    ///
    /// The check is a plain substring test, so `ssl_certificate_key` or a
    /// commented-out `# ssl_certificate` line also counts as having one.
    pub fn is_unverified_https(&self) -> bool {
        listens_on_443(&self.text) && !self.text.contains("ssl_certificate")
    }
}

/// Substring test used by both tools to detect an HTTPS listener
pub fn listens_on_443(text: &str) -> bool {
    // `listen 443 ssl` is covered by the shorter needle
    text.contains("listen 443")
}

/// Count of `{` minus count of `}` on a single line
pub(crate) fn brace_delta(line: &str) -> i64 {
    line.chars().fold(0, |acc, c| match c {
        '{' => acc + 1,
        '}' => acc - 1,
        _ => acc,
    })
}

/// Splits a configuration into its `server` blocks, in order.
///
/// Lines outside any server block are discarded. A block that is still open
/// when the next `server {` line or the end of input is reached is recorded
/// with `complete` reflecting whether its running balance happened to be zero.
pub fn split_server_blocks(config: &str) -> Vec<ServerBlock> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut balance: i64 = 0;
    let mut inside = false;

    for line in config.split('\n') {
        if SERVER_OPEN.is_match(line) {
            if inside {
                blocks.push(ServerBlock::new(&current, balance));
            }

            // the opening line itself is never checked for a zero balance
            inside = true;
            current = vec![line];
            balance = brace_delta(line);
            continue;
        }

        if !inside {
            continue;
        }

        current.push(line);
        balance += brace_delta(line);

        if balance == 0 {
            blocks.push(ServerBlock::new(&current, balance));
            current.clear();
            inside = false;
        }
    }

    if inside {
        blocks.push(ServerBlock::new(&current, balance));
    }

    blocks
}
