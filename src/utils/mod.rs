//! Generic utility primitives with zero domain knowledge.
//!
//! - `artifact` - Artifact globbing, archiving, and tree copies
//! - `command` - Command execution with error handling
//! - `io` - File I/O with consistent error handling

pub mod artifact;
pub mod command;
pub mod io;
