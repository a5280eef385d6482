//! vt-core: Core types and building blocks for vm-tunnel
//!
//! This crate provides the error taxonomy, configuration, SSH key handling,
//! endpoint resolution and the remote collaborator traits used by the
//! tunnel and CLI crates.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod exec;
pub mod keys;
pub mod types;

pub use endpoint::{resolve_domain, FallbackPolicy, RemoteEndpoint};
pub use error::BridgeError;
pub use exec::{ExecOutput, ExecRequest, RemoteExec, VmLookup};
pub use keys::Identity;
pub use types::{BootstrapState, OutputFormat, SessionConfig, VmInfo};
