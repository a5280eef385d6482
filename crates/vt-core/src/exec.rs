//! Remote collaborator traits
//!
//! The bridge never opens its own command channel to the VM. Every remote
//! script goes through [`RemoteExec`], and VM metadata comes from
//! [`VmLookup`].

use async_trait::async_trait;
use std::time::Duration;

use crate::error::ExecError;
use crate::types::VmInfo;

/// A command to run on the VM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    /// Program to run
    pub command: String,
    /// Program arguments
    pub args: Vec<String>,
    /// Run as root
    pub as_root: bool,
    /// Remote-side timeout
    pub timeout: Option<Duration>,
}

impl ExecRequest {
    /// Run `script` through `/bin/bash -c`
    pub fn bash(script: impl Into<String>) -> Self {
        Self {
            command: "/bin/bash".to_string(),
            args: vec!["-c".to_string(), script.into()],
            as_root: false,
            timeout: None,
        }
    }

    /// Run as root
    pub fn as_root(mut self) -> Self {
        self.as_root = true;
        self
    }

    /// Set the remote-side timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The script body when this is a `bash -c` request
    pub fn script(&self) -> Option<&str> {
        match self.args.as_slice() {
            [flag, script] if flag == "-c" => Some(script.as_str()),
            _ => None,
        }
    }
}

/// Captured result of a remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl ExecOutput {
    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout decoded lossily as UTF-8
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stderr decoded lossily as UTF-8
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Executes commands on a VM
#[async_trait]
pub trait RemoteExec: Send + Sync {
    /// Run a command in the VM identified by `session_id`
    async fn exec(&self, session_id: &str, request: ExecRequest) -> Result<ExecOutput, ExecError>;
}

/// Looks up VM metadata by identifier
#[async_trait]
pub trait VmLookup: Send + Sync {
    /// Fetch connection metadata for `vm_id`
    async fn get_vm(&self, vm_id: &str) -> Result<VmInfo, ExecError>;
}
