//! ht-core: Core abstractions and configuration for hopterm
//!
//! This crate provides the chain/hop address types, the error taxonomy,
//! the console configuration, and the traits that decouple the session
//! engine from its transport and display collaborators.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::HtError;
pub use types::{ChainSpec, HopAddress, TerminalSize};
