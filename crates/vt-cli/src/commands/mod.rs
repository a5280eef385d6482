//! CLI command implementations

mod config;
mod ssh;

pub use config::{config_init, config_path, config_show};
pub use ssh::{ssh_command, SetupReport};
