//! Appends an HTTPS `server` block to a site that only serves plain HTTP.
//!
//! The block is spliced in textually after the last `}` of the file and ships
//! with its SSL directives commented out, so `certbot --nginx` can fill them in
//! once a certificate has been issued.

use std::io::Write;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{Config, Site, Tool};
use crate::report::{self, NextSteps};
use crate::server_block::listens_on_443;
use crate::site_file;

/// From the first `listen 443` to the next `}` sitting at the start of a line
static HTTPS_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?ms)listen 443.*?^\}").expect("https section pattern is a valid regex")
});

/// Result of checking a configuration for an existing HTTPS block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// An HTTPS block with a `location /api/` is already present
    AlreadyConfigured,

    /// An HTTPS block exists but has no `location /api/`; it has to be edited by hand
    MissingApiLocation,

    /// `listen 443` appears but no closing brace at column 0 follows it
    HttpsSectionNotFound,

    /// The configuration has no `}` at all, so there is nowhere to splice
    NoClosingBrace,

    /// The new configuration, with the HTTPS block spliced in
    Inserted(String),
}

impl InsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InsertOutcome::AlreadyConfigured => "already_configured",
            InsertOutcome::MissingApiLocation => "missing_api_location",
            InsertOutcome::HttpsSectionNotFound => "https_section_not_found",
            InsertOutcome::NoClosingBrace => "no_closing_brace",
            InsertOutcome::Inserted(_) => "inserted",
        }
    }
}

/// The HTTPS server block that gets appended to the site
#[derive(Debug, Clone)]
pub struct HttpsTemplate<'a> {
    pub server_name: &'a str,
    pub backend_upstream: &'a str,
    pub app_upstream: &'a str,
}

impl<'a> From<&'a Site> for HttpsTemplate<'a> {
    fn from(site: &'a Site) -> Self {
        Self {
            server_name: &site.server_name,
            backend_upstream: &site.backend_upstream,
            app_upstream: &site.app_upstream,
        }
    }
}

impl HttpsTemplate<'_> {
    /// Renders the block. It starts with a newline and ends with `}\n`.
    ///
    /// `/uploads/` and `/api/` go to the backend and must stay ahead of the
    /// catch-all `/`, which goes to the app.
    pub fn render(&self) -> String {
        let name = self.server_name;
        let backend = self.backend_upstream.trim_end_matches('/');
        let app = self.app_upstream;

        format!(
            r#"
# HTTPS Server Block
server {{
    listen 443 ssl http2;
    server_name {name};

    # SSL configuration (added by certbot when running: sudo certbot --nginx -d {name})
    # ssl_certificate /etc/letsencrypt/live/{name}/fullchain.pem;
    # ssl_certificate_key /etc/letsencrypt/live/{name}/privkey.pem;
    # include /etc/letsencrypt/options-ssl-nginx.conf;
    # ssl_dhparam /etc/letsencrypt/ssl-dhparams.pem;

    # Proxy /uploads/ to the backend
    location /uploads/ {{
        proxy_pass {backend}/uploads/;
        proxy_http_version 1.1;
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
        proxy_read_timeout 300s;
        proxy_connect_timeout 75s;
    }}

    # Proxy /api/ to the backend (must come before location /)
    location /api/ {{
        proxy_pass {backend};
        proxy_http_version 1.1;
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
    }}

    # Everything else goes to the app
    location / {{
        proxy_pass {app};
        proxy_http_version 1.1;
        proxy_set_header Upgrade $http_upgrade;
        proxy_set_header Connection 'upgrade';
        proxy_set_header Host $host;
        proxy_cache_bypass $http_upgrade;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
    }}
}}
"#
        )
    }
}

pub fn has_https_block(config: &str) -> bool {
    listens_on_443(config)
}

/// The slice from the first `listen 443` through the next line-leading `}`
pub fn https_section(config: &str) -> Option<&str> {
    HTTPS_SECTION.find(config).map(|m| m.as_str())
}

/// Inserts `block` right after the last `}` in `config`.
///
/// Nothing before the splice point changes. Whether that brace really closes
/// the HTTP server block is not checked.
pub fn splice_after_last_brace(config: &str, block: &str) -> Option<String> {
    let end = config.rfind('}')? + 1;

    let mut spliced = String::with_capacity(config.len() + block.len());
    spliced.push_str(&config[..end]);
    spliced.push_str(block);
    spliced.push_str(&config[end..]);

    Some(spliced)
}

/// Decides what to do with `config` without touching the filesystem
pub fn plan(config: &str, template: &HttpsTemplate<'_>) -> InsertOutcome {
    if has_https_block(config) {
        return match https_section(config) {
            Some(section) if section.contains("location /api/") => InsertOutcome::AlreadyConfigured,
            Some(_) => InsertOutcome::MissingApiLocation,
            None => InsertOutcome::HttpsSectionNotFound,
        };
    }

    match splice_after_last_brace(config, &template.render()) {
        Some(spliced) => InsertOutcome::Inserted(spliced),
        None => InsertOutcome::NoClosingBrace,
    }
}

/// Runs the inserter end to end: read, back up, plan, write, report.
///
/// `stamp` fills the `{timestamp}` placeholder of the backup path.
pub fn run(
    config: &Config,
    stamp: i64,
    console: &mut impl Write,
) -> anyhow::Result<InsertOutcome> {
    let paths = config.paths_for(Tool::Insert);
    let backup = site_file::render_backup_path(&paths.backup, stamp);

    report::banner(console, "Add HTTPS server block to nginx config")?;

    writeln!(console, "1. Reading config from: {}", config.site_config.display())?;
    let original = site_file::read_site_config(&config.site_config)?;

    writeln!(console, "2. Backing up config to: {}", backup.display())?;
    site_file::write_copy(&backup, &original)?;
    writeln!(console, "   Backup written")?;
    writeln!(console)?;

    let outcome = plan(&original, &HttpsTemplate::from(&config.site));
    tracing::debug!(outcome = outcome.kind(), "planned https insertion");

    match &outcome {
        InsertOutcome::AlreadyConfigured => {
            writeln!(console, "An HTTPS server block already exists in the config.")?;
            writeln!(console, "   location /api/ is present in the HTTPS block")?;
            writeln!(console)?;
            writeln!(console, "Config is already correct, nothing to change.")?;
        }
        InsertOutcome::MissingApiLocation => {
            writeln!(console, "An HTTPS server block already exists in the config.")?;
            writeln!(console, "   location /api/ is missing from the HTTPS block")?;
            writeln!(
                console,
                "   Add location /api/ to the HTTPS server block in {} by hand",
                config.site_config.display()
            )?;
        }
        InsertOutcome::HttpsSectionNotFound => {
            tracing::warn!(
                path = %config.site_config.display(),
                "listen 443 found but no closing brace at column 0 follows it"
            );
            writeln!(console, "An HTTPS listener exists in the config.")?;
            writeln!(
                console,
                "   Warning: could not locate the HTTPS server block section, nothing written"
            )?;
        }
        InsertOutcome::NoClosingBrace => {
            tracing::warn!(
                path = %config.site_config.display(),
                "no closing brace found, cannot locate the HTTP server block"
            );
            writeln!(console, "3. Adding HTTPS server block...")?;
            writeln!(console, "   Could not find the HTTP server block, nothing written")?;
        }
        InsertOutcome::Inserted(updated) => {
            writeln!(console, "3. Adding HTTPS server block...")?;
            writeln!(console, "4. Writing new config to: {}", paths.output.display())?;
            site_file::write_copy(&paths.output, updated)?;
            writeln!(console, "   New config file created")?;
            writeln!(console)?;
            writeln!(console, "Done!")?;
            writeln!(console)?;

            tracing::info!(
                output = %paths.output.display(),
                added_bytes = updated.len() - original.len(),
                "https server block inserted"
            );

            NextSteps::new(config, Tool::Insert).write_to(console)?;
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::*;

    const HTTP_ONLY: &str = "server {\n    listen 80;\n    server_name n8n.example.test;\n\n    location / {\n        proxy_pass http://127.0.0.1:5678;\n    }\n}\n";

    fn site() -> Site {
        Site::default()
    }

    #[test]
    fn test_template_contains_fixed_directives() {
        let site = site();
        let block = HttpsTemplate::from(&site).render();

        assert!(block.starts_with("\n# HTTPS Server Block\nserver {\n"));
        assert!(block.ends_with("}\n"));
        assert!(block.contains("listen 443 ssl http2;"));
        assert!(block.contains("server_name n8n.aidocmanageagent.io.vn;"));
        assert!(block.contains("proxy_pass http://localhost:5000/uploads/;"));
        assert!(block.contains("proxy_pass http://localhost:5000;"));
        assert!(block.contains("proxy_pass http://127.0.0.1:5678;"));
        assert!(block.contains(
            "    # ssl_certificate /etc/letsencrypt/live/n8n.aidocmanageagent.io.vn/fullchain.pem;"
        ));

        let uploads = block.find("location /uploads/").unwrap();
        let api = block.find("location /api/").unwrap();
        let root = block.find("location / {").unwrap();
        assert!(uploads < api && api < root);
    }

    #[test]
    fn test_template_is_brace_balanced() {
        let site = site();
        let block = HttpsTemplate::from(&site).render();
        let balance: i64 = block.lines().map(crate::server_block::brace_delta).sum();

        assert_eq!(balance, 0);
    }

    #[test]
    fn test_plan_inserts_after_last_brace() {
        let site = site();
        let template = HttpsTemplate::from(&site);

        let InsertOutcome::Inserted(updated) = plan(HTTP_ONLY, &template) else {
            panic!("expected an insertion");
        };

        let splice_at = HTTP_ONLY.rfind('}').unwrap() + 1;
        assert_eq!(&updated[..splice_at], &HTTP_ONLY[..splice_at]);
        assert_eq!(
            updated,
            format!("{}{}\n", &HTTP_ONLY[..splice_at], template.render())
        );
    }

    #[test]
    fn test_plan_splices_before_trailing_text() {
        let site = site();
        let template = HttpsTemplate::from(&site);
        let config = "server {\n    listen 80;\n}\n# end of site\n";

        let InsertOutcome::Inserted(updated) = plan(config, &template) else {
            panic!("expected an insertion");
        };

        assert!(updated.starts_with("server {\n    listen 80;\n}\n# HTTPS Server Block"));
        assert!(updated.ends_with("}\n\n# end of site\n"));
    }

    #[test]
    fn test_plan_already_configured() {
        let site = site();
        let config = "server {\n    listen 443 ssl;\n    location /api/ {\n        proxy_pass http://localhost:5000;\n    }\n}\n";

        assert_eq!(
            plan(config, &HttpsTemplate::from(&site)),
            InsertOutcome::AlreadyConfigured
        );
    }

    #[test]
    fn test_plan_missing_api_location() {
        let site = site();
        let config = "server {\n    listen 443 ssl;\n    location / {\n        proxy_pass http://127.0.0.1:5678;\n    }\n}\nserver {\n    location /api/ {\n    }\n}\n";

        // the /api/ location lives in a later block, outside the https section
        assert_eq!(
            plan(config, &HttpsTemplate::from(&site)),
            InsertOutcome::MissingApiLocation
        );
    }

    #[test]
    fn test_plan_section_not_found_when_braces_are_indented() {
        let site = site();
        let config = "http {\n    server {\n        listen 443 ssl;\n    }\n    }";

        assert_eq!(
            plan(config, &HttpsTemplate::from(&site)),
            InsertOutcome::HttpsSectionNotFound
        );
    }

    #[test]
    fn test_plan_no_closing_brace() {
        let site = site();

        assert_eq!(
            plan("listen 80;\n", &HttpsTemplate::from(&site)),
            InsertOutcome::NoClosingBrace
        );
        assert_eq!(
            plan("", &HttpsTemplate::from(&site)),
            InsertOutcome::NoClosingBrace
        );
    }

    #[test]
    fn test_https_section_stops_at_first_column_zero_brace() {
        let config = "server {\n  listen 443;\n  location / {\n  }\n}\nserver {\n}\n";

        assert_eq!(
            https_section(config),
            Some("listen 443;\n  location / {\n  }\n}")
        );
    }

    fn test_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.site_config = dir.join("site.conf");
        config.insert.output = dir.join("new.conf");
        config.insert.backup = dir.join("backup-{timestamp}.conf");
        config
    }

    #[test]
    fn test_run_writes_backup_and_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        fs::write(&config.site_config, HTTP_ONLY).unwrap();

        let mut console = Vec::new();
        let outcome = run(&config, 1_700_000_000, &mut console).unwrap();

        assert!(outcome.is_inserted());
        assert_eq!(
            fs::read_to_string(dir.path().join("backup-1700000000.conf")).unwrap(),
            HTTP_ONLY
        );

        let written = fs::read_to_string(&config.insert.output).unwrap();
        assert!(written.starts_with(HTTP_ONLY.trim_end()));
        assert!(written.contains("listen 443 ssl http2;"));

        // the live file is left alone
        assert_eq!(fs::read_to_string(&config.site_config).unwrap(), HTTP_ONLY);

        let console = String::from_utf8(console).unwrap();
        assert!(console.contains("sudo nginx -t"));
        assert!(console.contains("sudo certbot --nginx -d n8n.aidocmanageagent.io.vn"));
    }

    #[test]
    fn test_run_already_configured_only_backs_up() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let existing = "server {\n    listen 443 ssl;\n    location /api/ {\n    }\n}\n";
        fs::write(&config.site_config, existing).unwrap();

        let mut console = Vec::new();
        let outcome = run(&config, 42, &mut console).unwrap();

        assert_eq!(outcome, InsertOutcome::AlreadyConfigured);
        assert_eq!(
            fs::read_to_string(dir.path().join("backup-42.conf")).unwrap(),
            existing
        );
        assert!(!config.insert.output.exists());
        assert!(String::from_utf8(console)
            .unwrap()
            .contains("Config is already correct"));
    }

    #[test]
    fn test_run_missing_site_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let err = run(&config, 1, &mut Vec::new()).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<site_file::SiteFileError>(),
            Some(site_file::SiteFileError::NotFound { .. })
        ));
        assert!(!dir.path().join("backup-1.conf").exists());
    }

    #[test]
    fn test_run_soft_outcomes_write_no_output() {
        let cases = [
            ("server {\n    listen 443 ssl;\n}\n", InsertOutcome::MissingApiLocation),
            ("  server {\n  listen 443;\n  }", InsertOutcome::HttpsSectionNotFound),
            ("listen 80;\n", InsertOutcome::NoClosingBrace),
        ];

        for (existing, expected) in cases {
            let dir = tempfile::tempdir().unwrap();
            let config = test_config(dir.path());
            fs::write(&config.site_config, existing).unwrap();

            let outcome = run(&config, 7, &mut Vec::new()).unwrap();

            assert_eq!(outcome, expected);
            assert_eq!(
                fs::read_to_string(dir.path().join("backup-7.conf")).unwrap(),
                existing
            );
            assert!(!config.insert.output.exists(), "{expected:?}");
        }
    }

    #[test]
    fn test_run_backup_failure_aborts_before_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.insert.backup = dir.path().join("missing").join("backup.conf");
        fs::write(&config.site_config, HTTP_ONLY).unwrap();

        let err = run(&config, 1, &mut Vec::new()).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<site_file::SiteFileError>(),
            Some(site_file::SiteFileError::Write { .. })
        ));
        assert!(!config.insert.output.exists());
    }
}
