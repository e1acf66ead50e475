//! Command-line interface.

mod commands;
mod output;

pub use commands::run;
pub use output::Envelope;

/// Peek at argv before clap runs so logging can be configured first.
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}
