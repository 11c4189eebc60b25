//! Run command implementation

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::join_all;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::console::LineLayout;
use crate::output::{format_results, print_error, print_info, print_warning};
use ht_core::config::ConsoleConfig;
use ht_core::traits::Transport;
use ht_engine::{ConnectionManager, HostRegistry, SshTransport};

/// One host to add for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub chain: String,
    pub title: String,
}

/// Parsed `run` arguments
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Explicit chains; the inventory is ignored when any are given
    pub hosts: Vec<String>,
    /// Inventory tag filter
    pub tags: Vec<String>,
    /// Print regex matches instead of streaming output
    pub grep: Option<String>,
    /// Command words, joined with spaces
    pub command: Vec<String>,
    /// Print a per-host summary table at the end
    pub summary: bool,
}

/// Hosts selected by `options`: explicit chains, else the tagged inventory
pub fn select_targets(config: &ConsoleConfig, options: &RunOptions) -> Vec<Target> {
    if !options.hosts.is_empty() {
        return options
            .hosts
            .iter()
            .map(|chain| Target {
                chain: chain.clone(),
                title: chain.clone(),
            })
            .collect();
    }

    config
        .hosts_with_tags(&options.tags)
        .into_iter()
        .map(|entry| Target {
            chain: entry.chain.clone(),
            title: entry.title().to_string(),
        })
        .collect()
}

/// Add every target, run the command on all of them at once and tear down
pub async fn run_command(config: &ConsoleConfig, options: RunOptions) -> Result<()> {
    let command = options.command.join(" ");
    if command.trim().is_empty() {
        anyhow::bail!("No command given");
    }

    let grep = options
        .grep
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("Invalid --grep pattern")?;

    let targets = select_targets(config, &options);
    if targets.is_empty() {
        anyhow::bail!("No hosts selected; pass --host or add [[hosts]] to the config");
    }

    let transport = SshTransport::from_config(config).context("No usable credentials")?;
    let connections = Arc::new(ConnectionManager::new(transport));
    let registry = Arc::new(HostRegistry::new(
        Arc::clone(&connections),
        Arc::new(LineLayout::stdout()),
        config.log_dir.clone(),
        config.default_size,
    ));

    let added = add_targets(&registry, &targets).await;
    let outcome = if added == 0 {
        Err(anyhow::anyhow!("No host could be reached"))
    } else {
        execute(&registry, &command, grep.as_ref(), options.summary, targets.len() - added).await
    };

    registry.remove_all().await;
    connections.shutdown().await;
    outcome
}

/// Add all targets concurrently; returns how many were added
async fn add_targets<T: Transport>(registry: &HostRegistry<T>, targets: &[Target]) -> usize {
    let results = join_all(
        targets
            .iter()
            .map(|target| registry.add_host(&target.chain, &target.title)),
    )
    .await;

    let mut added = 0;
    for (target, result) in targets.iter().zip(results) {
        match result {
            Ok(_) => added += 1,
            Err(e) => print_error(&format!("{}: {}", target.title, e)),
        }
    }
    added
}

async fn execute<T: Transport>(
    registry: &Arc<HostRegistry<T>>,
    command: &str,
    grep: Option<&Regex>,
    summary: bool,
    mut failed: usize,
) -> Result<()> {
    print_info(&format!("Running on {} host(s): {}", registry.len(), command));

    let interrupted = CancellationToken::new();
    let watcher = {
        let registry = Arc::clone(registry);
        let interrupted = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                print_warning("Interrupted; stopping output from every host");
                interrupted.cancel();
                registry.cancel_all().await;
            }
        })
    };

    match grep {
        Some(regex) => {
            let sessions = registry.list_hosts();
            let results = join_all(
                sessions
                    .iter()
                    .map(|session| session.run_matching(command, regex)),
            )
            .await;

            for (session, result) in sessions.iter().zip(results) {
                match result {
                    Ok(matches) => {
                        for groups in matches {
                            println!("{}\t{}", session.title(), groups.join("\t"));
                        }
                    }
                    Err(e) => {
                        failed += 1;
                        print_error(&format!("{}: {}", session.title(), e));
                    }
                }
            }
        }
        None => {
            let results = registry.run_all(command).await;
            for (title, result) in &results {
                if let Err(e) = result {
                    failed += 1;
                    print_error(&format!("{}: {}", title, e));
                }
            }
            if summary {
                eprintln!("{}", format_results(&results));
            }
        }
    }

    watcher.abort();

    if interrupted.is_cancelled() {
        anyhow::bail!("Interrupted");
    }
    if failed > 0 {
        anyhow::bail!("{} host(s) failed", failed);
    }
    Ok(())
}
