//! Connection management

mod manager;

pub use manager::ConnectionManager;
