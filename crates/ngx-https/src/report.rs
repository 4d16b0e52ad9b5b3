//! Operator-facing console output.
//!
//! Neither tool touches the live configuration, so every run ends with the
//! manual steps an operator follows to validate and deploy the output.

use std::io::{self, Write};
use std::path::Path;

use crate::config::{Config, Tool};
use crate::site_file::SiteFileError;

pub fn banner(out: &mut impl Write, title: &str) -> io::Result<()> {
    writeln!(out, "{title}")?;
    writeln!(out, "{}", "=".repeat(50))?;
    writeln!(out)
}

/// The checklist printed after an output file has been written
#[derive(Debug)]
pub struct NextSteps<'a> {
    tool: Tool,
    output: &'a Path,
    site_config: &'a Path,
    server_name: &'a str,
    smoke_test_path: &'a str,
}

impl<'a> NextSteps<'a> {
    pub fn new(config: &'a Config, tool: Tool) -> Self {
        Self {
            tool,
            output: &config.paths_for(tool).output,
            site_config: &config.site_config,
            server_name: &config.site.server_name,
            smoke_test_path: &config.site.smoke_test_path,
        }
    }

    pub fn lines(&self) -> Vec<String> {
        let output = self.output.display();
        let site_config = self.site_config.display();
        let certbot = format!("sudo certbot --nginx -d {}", self.server_name);

        let mut lines = vec![
            "Next steps:".to_string(),
            "   1. Check the new config:".to_string(),
            format!("      cat {output}"),
            String::new(),
            "   2. Test the config:".to_string(),
            "      sudo nginx -t".to_string(),
            String::new(),
            "   3. If it passes, copy it into place:".to_string(),
            format!("      sudo cp {output} {site_config}"),
            String::new(),
            "   4. Reload nginx:".to_string(),
            "      sudo systemctl reload nginx".to_string(),
            String::new(),
        ];

        match self.tool {
            Tool::Insert => lines.extend([
                "   5. Set up SSL (if not done yet):".to_string(),
                format!("      {certbot}"),
                String::new(),
                "   6. Test the API:".to_string(),
                format!("      curl https://{}{}", self.server_name, self.smoke_test_path),
            ]),
            Tool::Remove => lines.extend([
                "   5. Set up SSL with certbot (certbot adds the HTTPS block itself):".to_string(),
                format!("      {certbot}"),
                String::new(),
                "   Certbot will:".to_string(),
                "   - issue the SSL certificate".to_string(),
                "   - add an HTTPS server block with location /api/".to_string(),
                "   - reload nginx".to_string(),
            ]),
        }

        lines
    }

    pub fn write_to(&self, out: &mut impl Write) -> io::Result<()> {
        for line in self.lines() {
            writeln!(out, "{line}")?;
        }
        Ok(())
    }
}

/// Human guidance for a run that could not complete
pub fn describe_failure(err: &anyhow::Error, program: &str) -> Vec<String> {
    match err.downcast_ref::<SiteFileError>() {
        Some(SiteFileError::PermissionDenied { .. }) => vec![
            "No permission to read the file. Run with sudo:".to_string(),
            format!("   sudo {program}"),
        ],
        Some(SiteFileError::NotFound { path }) => {
            vec![format!("File does not exist: {}", path.display())]
        }
        _ => vec![format!("Error: {err:#}")],
    }
}
