/// Macro for prefixed status logging, one line per message.
///
/// Usage:
/// ```ignore
/// log_status!("Executing build step: {}", step_name);
/// log_status!("Tagging image: {}", tag);
/// ```
#[macro_export]
macro_rules! log_status {
    ($($arg:tt)*) => {
        println!("[vjer] {}", format_args!($($arg)*));
    };
}

/// Macro for the banner form of [`log_status!`], used at action
/// boundaries.
#[macro_export]
macro_rules! log_banner {
    ($($arg:tt)*) => {{
        println!("[vjer] {}", "=".repeat(60));
        println!("[vjer] {}", format_args!($($arg)*));
        println!("[vjer] {}", "=".repeat(60));
    }};
}

pub mod core;
pub mod utils;

// Re-export everything from core for ergonomic library use
// Users can write `vjer::config` instead of `vjer::core::config`
pub use core::*;
pub use utils::*;
