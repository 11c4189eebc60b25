//! Check command implementation

use anyhow::{Context, Result};

use crate::output::{print_error, print_success};
use ht_core::config::ConsoleConfig;
use ht_core::types::ChainSpec;
use ht_engine::{ConnectionManager, SshTransport};

/// Resolve `chain` hop by hop and report every established prefix
pub async fn check_command(config: &ConsoleConfig, chain: &str) -> Result<()> {
    let chain = ChainSpec::parse(chain)?;
    let transport = SshTransport::from_config(config).context("No usable credentials")?;
    let manager = ConnectionManager::new(transport);

    let result = manager.resolve(&chain).await;

    for prefix in manager.cached_prefixes() {
        print_success(&format!("{} reachable", prefix));
    }

    let outcome = match result {
        Ok(_) => {
            print_success(&format!("{} is reachable through {} hop(s)", chain.target(), chain.len()));
            Ok(())
        }
        Err(e) => {
            if let Some(prefix) = e.failing_prefix() {
                print_error(&format!("{} unreachable", prefix));
            }
            Err(e).context(format!("Failed to resolve {}", chain))
        }
    };

    manager.shutdown().await;
    outcome
}
