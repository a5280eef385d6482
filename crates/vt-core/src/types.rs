//! Core type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Output format for reports printed by the CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// Machine-readable JSON
    Json,
}

/// Input describing one connection attempt
///
/// Built once from command-line input and threaded through every step by
/// reference; nothing mutates it afterwards.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Target VM identifier
    pub vm_id: String,
    /// Caller-supplied private key (None = generate an ephemeral key)
    pub identity_file: Option<PathBuf>,
    /// `-L` value (`localport:host:remoteport`)
    pub local_forward: Option<String>,
    /// `-R` value (`remoteport:host:localport`)
    pub remote_forward: Option<String>,
    /// Bootstrap the VM but don't connect
    pub setup_only: bool,
    /// Format of the setup-only report
    pub output: OutputFormat,
}

impl SessionConfig {
    /// Create a config for an interactive session with an ephemeral key
    pub fn new(vm_id: impl Into<String>) -> Self {
        Self {
            vm_id: vm_id.into(),
            ..Default::default()
        }
    }
}

/// Remote-side readiness of the tunnel services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapState {
    /// sshd and the relay were already running; only the key was injected
    ServicesRunning,
    /// The setup script ran and started both services
    ServicesInstalled,
}

impl std::fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BootstrapState::ServicesRunning => write!(f, "services already running"),
            BootstrapState::ServicesInstalled => write!(f, "services installed"),
        }
    }
}

/// VM metadata needed to reach it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmInfo {
    /// Session identifier used for remote exec calls
    pub session_id: String,
    /// Live view URL (may be empty)
    #[serde(default)]
    pub live_view_url: String,
    /// CDP WebSocket URL (may be empty)
    #[serde(default)]
    pub cdp_ws_url: String,
}
