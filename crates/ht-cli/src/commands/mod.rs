//! CLI command implementations

mod check;
mod config;
mod hosts;
mod run;

pub use check::check_command;
pub use config::{config_init, config_path, config_show, load_console_config, resolve_config_path};
pub use hosts::hosts_command;
pub use run::{run_command, select_targets, RunOptions, Target};
