// ABOUTME: Command module aggregator for the skiff CLI.
// ABOUTME: Each subcommand lives in its own file and shares the connection helpers.

mod connection;
mod deploy;
mod exec;
mod logs;
mod rollback;
mod status;

pub use connection::load_config;
pub use deploy::deploy;
pub use exec::{exec_command, shell};
pub use logs::{LogsOptions, logs};
pub use rollback::rollback;
pub use status::status;
