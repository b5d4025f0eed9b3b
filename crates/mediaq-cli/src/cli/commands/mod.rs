//! CLI command handlers, one file per subcommand.

mod cancel;
mod checksum;
mod fetch;
mod run;

pub use cancel::run_cancel;
pub use checksum::run_checksum;
pub use fetch::run_fetch;
pub use run::run_queue;
