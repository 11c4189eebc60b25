//! Hosts command implementation

use anyhow::Result;

use crate::output::format_hosts;
use ht_core::config::ConsoleConfig;

/// List the inventory, optionally filtered by tag
pub fn hosts_command(config: &ConsoleConfig, tags: &[String], json: bool) -> Result<()> {
    let hosts = config.hosts_with_tags(tags);

    if json {
        println!("{}", serde_json::to_string_pretty(&hosts)?);
    } else {
        println!("{}", format_hosts(&hosts));
    }

    Ok(())
}
