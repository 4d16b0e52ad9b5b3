use std::path::{Path, PathBuf};

use clap::{Args, Parser, ValueEnum};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment, Provider,
};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::level_filters::LevelFilter;

pub mod validate;

/// Directory searched for `ngx-https.yml`/`ngx-https.yaml` when no path is given
pub const DEFAULT_CONFIG_DIR: &str = "/etc/ngx-https";

/// Which of the two tools is running; selects its output section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Insert,
    Remove,
}

impl Tool {
    pub fn section(self) -> &'static str {
        match self {
            Tool::Insert => "insert",
            Tool::Remove => "remove",
        }
    }
}

/// Where a tool writes its backup and its transformed copy
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    /// The transformed configuration, left for the operator to review
    pub output: PathBuf,

    /// Copy of the original configuration. Only the inserter expands a
    /// `{timestamp}` placeholder here; the remover rejects one.
    pub backup: PathBuf,
}

impl OutputPaths {
    fn insert_defaults() -> Self {
        Self {
            output: PathBuf::from("/tmp/n8n-nginx-new.conf"),
            backup: PathBuf::from("/tmp/n8n-nginx-backup-{timestamp}.conf"),
        }
    }

    fn remove_defaults() -> Self {
        Self {
            output: PathBuf::from("/tmp/n8n-nginx-fixed.conf"),
            backup: PathBuf::from("/tmp/n8n-nginx-backup.conf"),
        }
    }
}

/// The site the HTTPS block is generated for
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Site {
    /// Used for `server_name`, the certbot domain and the smoke test URL
    pub server_name: String,

    /// Backend serving `/api/` and `/uploads/` (ex: `http://localhost:5000`)
    pub backend_upstream: String,

    /// Application serving every other path (ex: `http://127.0.0.1:5678`)
    pub app_upstream: String,

    /// Path requested over HTTPS in the final checklist step
    pub smoke_test_path: String,
}

impl Default for Site {
    fn default() -> Self {
        Self {
            server_name: "n8n.aidocmanageagent.io.vn".to_string(),
            backend_upstream: "http://localhost:5000".to_string(),
            app_upstream: "http://127.0.0.1:5678".to_string(),
            smoke_test_path: "/api/document/get-from-postgres/doc_1766741636080_ubk9wvp5u"
                .to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Trace,
}

/// Transforms our custom `LogLevel` enum into a `tracing::level_filters::LevelFilter`
/// enum used by the `tracing` crate.
impl From<&LogLevel> for LevelFilter {
    fn from(val: &LogLevel) -> Self {
        match val {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Logging {
    /// The level of logging to be used.
    #[serde(deserialize_with = "log_level_deser")]
    pub level: LogLevel,

    /// The format of the log output (logs go to stderr)
    #[serde(deserialize_with = "log_format_deser")]
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            format: LogFormat::Pretty,
        }
    }
}

/// The resolved settings for a run.
/// A settings file (YAML or through ENV) will be parsed into this struct.
/// Example:
///
/// ```yaml
/// site_config: "/etc/nginx/sites-available/n8n"
/// insert:
///   output: "/tmp/n8n-nginx-new.conf"
///   backup: "/tmp/n8n-nginx-backup-{timestamp}.conf"
/// remove:
///   output: "/tmp/n8n-nginx-fixed.conf"
///   backup: "/tmp/n8n-nginx-backup.conf"
/// site:
///   server_name: "n8n.aidocmanageagent.io.vn"
///   backend_upstream: "http://localhost:5000"
///   app_upstream: "http://127.0.0.1:5678"
/// logging:
///   level: "INFO"
///   format: "json"
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// The live nginx site configuration. Only ever read.
    pub site_config: PathBuf,

    pub insert: OutputPaths,

    pub remove: OutputPaths,

    pub site: Site,

    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            site_config: PathBuf::from("/etc/nginx/sites-available/n8n"),
            insert: OutputPaths::insert_defaults(),
            remove: OutputPaths::remove_defaults(),
            site: Site::default(),
            logging: Logging::default(),
        }
    }
}

impl Config {
    pub fn paths_for(&self, tool: Tool) -> &OutputPaths {
        match tool {
            Tool::Insert => &self.insert,
            Tool::Remove => &self.remove,
        }
    }
}

/// Implement the `Provider` trait for the `Config` struct.
/// This allows the `Config` struct to be used as a configuration provider with *defaults*.
impl Provider for Config {
    fn metadata(&self) -> figment::Metadata {
        figment::Metadata::named("ngx-https")
    }

    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        Serialized::defaults(Config::default()).data()
    }
}

#[derive(Debug, Default, Args)]
pub struct LogArgs {
    /// The level of logging to be used
    #[arg(long = "log.level", value_enum)]
    pub level: Option<LogLevel>,

    /// The format of the log output
    #[arg(long = "log.format", value_enum)]
    pub format: Option<LogFormat>,
}

/// Command-line flags shared by both tools. Every flag is optional and only
/// overrides the settings file and environment when given.
#[derive(Debug, Default, Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// The PATH to the settings file, or a directory containing
    /// `ngx-https.yml` or `ngx-https.yaml`
    #[arg(short, long)]
    pub config_path: Option<PathBuf>,

    /// The nginx site configuration to read
    #[arg(long)]
    pub site_config: Option<PathBuf>,

    /// Where to write the transformed configuration
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Where to write the backup (`add-nginx-https` replaces `{timestamp}`)
    #[arg(long)]
    pub backup: Option<PathBuf>,

    /// Domain used for the generated block and the certbot command
    #[arg(long)]
    pub server_name: Option<String>,

    #[command(flatten)]
    pub log: LogArgs,
}

impl Cli {
    /// Layers the explicitly given flags on top of `figment`.
    /// `--output` and `--backup` land in the running tool's own section.
    fn merge_into(&self, mut figment: Figment, tool: Tool) -> Figment {
        let section = tool.section();

        if let Some(path) = &self.site_config {
            figment = figment.merge(Serialized::default("site_config", path));
        }
        if let Some(path) = &self.output {
            figment = figment.merge(Serialized::default(&format!("{section}.output"), path));
        }
        if let Some(path) = &self.backup {
            figment = figment.merge(Serialized::default(&format!("{section}.backup"), path));
        }
        if let Some(name) = &self.server_name {
            figment = figment.merge(Serialized::default("site.server_name", name));
        }
        if let Some(level) = &self.log.level {
            figment = figment.merge(Serialized::default("logging.level", level));
        }
        if let Some(format) = &self.log.format {
            figment = figment.merge(Serialized::default("logging.format", format));
        }

        figment
    }
}

/// Load the configuration for `tool` from the command line, the settings
/// file(s) and the environment, in increasing order of precedence:
/// defaults, settings file, `NGX_HTTPS_*` variables, command-line flags.
///
/// Nested keys can be separated by double underscores (__) in the environment variables.
/// E.g. `NGX_HTTPS_REMOVE__OUTPUT=/tmp/fixed.conf` will set the `output` key in the
/// `remove` section.
pub fn load(tool: Tool) -> Result<Config, figment::Error> {
    let cli = Cli::parse();

    let path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR));

    load_from_path(&path, &cli, tool)
}

/// Load configuration from a specific path, used for testing and internal logic
pub fn load_from_path(
    config_path: &Path,
    cli: &Cli,
    tool: Tool,
) -> Result<Config, figment::Error> {
    let mut figment = Figment::new().merge(Config::default());

    if config_path.is_file() {
        figment = figment.merge(Yaml::file(config_path));
    } else {
        // Missing files are skipped by figment
        figment = figment
            .merge(Yaml::file(config_path.join("ngx-https.yml")))
            .merge(Yaml::file(config_path.join("ngx-https.yaml")));
    }

    figment = figment.merge(Env::prefixed("NGX_HTTPS_").split("__"));

    let config: Config = cli.merge_into(figment, tool).extract()?;

    // validate configuration and throw error upwards
    validate::check_config(&config, tool).map_err(|err| figment::Error::from(err.to_string()))?;

    Ok(config)
}

/// Deserialize function to convert a string to a `LogLevel` Enum
fn log_level_deser<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    match s.to_lowercase().as_str() {
        "debug" => Ok(LogLevel::Debug),
        "info" => Ok(LogLevel::Info),
        "warn" => Ok(LogLevel::Warn),
        "error" => Ok(LogLevel::Error),
        "trace" => Ok(LogLevel::Trace),
        _ => Err(serde::de::Error::custom(
            "expected one of DEBUG, INFO, WARN, ERROR, TRACE",
        )),
    }
}

/// Deserialize function to convert a string to a `LogFormat` Enum
fn log_format_deser<'de, D>(deserializer: D) -> Result<LogFormat, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    match s.to_lowercase().as_str() {
        "json" => Ok(LogFormat::Json),
        "pretty" => Ok(LogFormat::Pretty),
        _ => Err(serde::de::Error::custom("expected one of: json, pretty")),
    }
}
