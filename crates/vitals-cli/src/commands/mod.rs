//! Command implementations for the CLI.

mod scan;
mod watch;

pub use scan::cmd_scan;
pub use watch::{WatchArgs, cmd_watch};
