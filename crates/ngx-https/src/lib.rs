//! Helpers for moving an nginx site to HTTPS by hand.
//!
//! Two tools share this crate:
//!
//! * `add-nginx-https` appends an HTTPS server block, with its SSL directives
//!   commented out, after the last closing brace of the site config.
//! * `fix-nginx-remove-https` drops HTTPS server blocks that have no
//!   `ssl_certificate`, so `certbot --nginx` can add a verified one.
//!
//! Both read the live config, back it up, and write the result to a side file
//! for the operator to review. The live config is never written.

pub mod config;
pub mod inserter;
pub mod logging;
pub mod remover;
pub mod report;
pub mod server_block;
pub mod site_file;
