//! Output formatting utilities for the CLI
//!
//! Tables for the host inventory and run results, plus colored status
//! messages.

use tabled::{settings::Style, Table, Tabled};

use ht_core::config::HostEntry;
use ht_core::error::SessionError;
use ht_engine::RunOutcome;

/// Format inventory entries as an ASCII table
///
/// Returns "No hosts configured" if the list is empty.
pub fn format_hosts(hosts: &[&HostEntry]) -> String {
    if hosts.is_empty() {
        return "No hosts configured".to_string();
    }

    #[derive(Tabled)]
    struct HostRow {
        #[tabled(rename = "TITLE")]
        title: String,
        #[tabled(rename = "CHAIN")]
        chain: String,
        #[tabled(rename = "HOPS")]
        hops: String,
        #[tabled(rename = "TAGS")]
        tags: String,
    }

    let rows: Vec<HostRow> = hosts
        .iter()
        .map(|h| HostRow {
            title: h.title().to_string(),
            chain: h.chain.clone(),
            hops: h
                .chain_spec()
                .map(|c| c.len().to_string())
                .unwrap_or_else(|_| "invalid".to_string()),
            tags: if h.tags.is_empty() {
                "-".to_string()
            } else {
                h.tags.join(",")
            },
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format per-host run results as an ASCII table
pub fn format_results(results: &[(String, Result<RunOutcome, SessionError>)]) -> String {
    #[derive(Tabled)]
    struct ResultRow {
        #[tabled(rename = "HOST")]
        host: String,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "BYTES")]
        bytes: String,
    }

    let rows: Vec<ResultRow> = results
        .iter()
        .map(|(host, result)| match result {
            Ok(outcome) => ResultRow {
                host: host.clone(),
                status: if outcome.cancelled { "cancelled" } else { "ok" }.to_string(),
                bytes: outcome.bytes.to_string(),
            },
            Err(e) => ResultRow {
                host: host.clone(),
                status: format!("failed: {}", e),
                bytes: "-".to_string(),
            },
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Print a success message in green with a checkmark prefix
///
/// Outputs to stderr so it never mixes with host output on stdout.
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow with a warning symbol prefix
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan with an info symbol prefix
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
