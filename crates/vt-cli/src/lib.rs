//! vm-tunnel CLI
//!
//! Provides the `vm-tunnel` binary: the API client, the `ssh` and `config`
//! commands, and terminal output helpers.

pub mod api;
pub mod commands;
pub mod output;
