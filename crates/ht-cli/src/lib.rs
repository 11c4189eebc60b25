//! hopterm CLI library
//!
//! This module exposes the console's commands, its line-oriented live
//! view and its output helpers for use by the binary and by tests.

pub mod commands;
pub mod console;
pub mod output;
