//! Command-line interface for mfk.

mod commands;
pub mod helpers;
pub mod progress;

pub use commands::{is_verbose, run};
