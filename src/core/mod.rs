// Public modules
pub mod action;
pub mod collab;
pub mod config;
pub mod env;
pub mod error;
pub mod expand;
pub mod freeze;
pub mod step;
pub mod steps;
pub mod version;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
