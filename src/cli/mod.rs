//! Command-line surface.

mod commands;
mod helpers;

pub use commands::{is_verbose, run};
