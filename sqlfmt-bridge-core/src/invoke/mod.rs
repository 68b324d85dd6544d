//! Running sqlfmt: settings-to-flags mapping and the process runner.

mod args;
mod runner;

pub use args::build_args;
pub use runner::{run_formatter, FormatError, Formatted, DEFAULT_FORMAT_TIMEOUT};
