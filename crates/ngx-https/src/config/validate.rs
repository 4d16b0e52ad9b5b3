use anyhow::anyhow;

use super::{Config, Tool};
use crate::site_file::TIMESTAMP_PLACEHOLDER;

/// given a Config struct, validate the values to ensure
/// that a run can never write over the live site configuration
pub fn check_config(config: &Config, tool: Tool) -> Result<(), anyhow::Error> {
    if config.site_config.as_os_str().is_empty() {
        return Err(anyhow!("site_config cannot be empty"));
    }

    let section = tool.section();
    let paths = config.paths_for(tool);

    for (key, path) in [("output", &paths.output), ("backup", &paths.backup)] {
        if path.as_os_str().is_empty() {
            return Err(anyhow!("{section}.{key} cannot be empty"));
        }

        if path == &config.site_config {
            return Err(anyhow!(
                "{section}.{key} cannot be the site config itself ({})",
                config.site_config.display()
            ));
        }
    }

    // the remover writes its backup path verbatim
    if tool == Tool::Remove && paths.backup.to_string_lossy().contains(TIMESTAMP_PLACEHOLDER) {
        return Err(anyhow!(
            "remove.backup cannot contain {TIMESTAMP_PLACEHOLDER}, only insert.backup is expanded"
        ));
    }

    if paths.output == paths.backup {
        return Err(anyhow!("{section}.output and {section}.backup must differ"));
    }

    let server_name = &config.site.server_name;
    if server_name.is_empty() {
        return Err(anyhow!("site.server_name cannot be empty"));
    }

    if server_name
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, ';' | '{' | '}'))
    {
        return Err(anyhow!(
            "site.server_name must be a single name without whitespace, ';' or braces"
        ));
    }

    for (key, upstream) in [
        ("backend_upstream", &config.site.backend_upstream),
        ("app_upstream", &config.site.app_upstream),
    ] {
        if !(upstream.starts_with("http://") || upstream.starts_with("https://")) {
            return Err(anyhow!("site.{key} must start with http:// or https://"));
        }
    }

    Ok(())
}
