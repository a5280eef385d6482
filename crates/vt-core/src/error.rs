//! Core error types for vm-tunnel

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the vm-tunnel bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Key material error
    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    /// Endpoint resolution error
    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    /// Remote exec error
    #[error("Remote exec error: {0}")]
    Exec(#[from] ExecError),

    /// Remote bootstrap error
    #[error("Bootstrap error: {0}")]
    Bootstrap(#[from] BootstrapError),

    /// SSH session error
    #[error("{0}")]
    Session(#[from] SessionError),

    /// Local environment error
    #[error("{0}")]
    Environment(#[from] EnvironmentError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Key generation and loading errors
#[derive(Error, Debug)]
pub enum KeyError {
    /// Ed25519 key generation failed
    #[error("Failed to generate ed25519 key: {0}")]
    Generate(#[source] ssh_key::Error),

    /// Key could not be encoded in OpenSSH format
    #[error("Failed to encode key: {0}")]
    Encode(#[source] ssh_key::Error),

    /// The `.pub` sibling of a caller-supplied identity is missing
    #[error("Public key {} not found (ensure the .pub file exists alongside the private key)", .0.display())]
    MissingPublicKey(PathBuf),

    /// A caller-supplied private key is readable by group or others
    #[error("Private key {} has mode {mode:03o}; ssh refuses keys readable by others (run `chmod 600 {}`)", path.display(), path.display())]
    TooOpen { path: PathBuf, mode: u32 },

    /// The public key file could not be parsed
    #[error("Invalid public key in {}: {source}", path.display())]
    InvalidPublicKey {
        path: PathBuf,
        #[source]
        source: ssh_key::Error,
    },

    /// Temp key file handling failed
    #[error("Failed to {action} key file: {source}")]
    TempFile {
        action: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// I/O error reading a key
    #[error("Failed to read key {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Endpoint resolution errors
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Neither endpoint source is present
    #[error("VM has no live view URL and no CDP WebSocket URL - cannot determine VM domain")]
    NoEndpoint,

    /// The URL itself could not be parsed
    #[error("Failed to parse {source_name} '{url}': {reason}")]
    InvalidUrl {
        source_name: &'static str,
        url: String,
        reason: String,
    },

    /// A step of the extraction produced nothing usable
    #[error("Failed to extract VM domain from {source_name} ({step}): {reason}")]
    Extraction {
        source_name: &'static str,
        step: &'static str,
        reason: String,
    },

    /// The extracted value is not a DNS hostname
    #[error("Resolved VM domain '{hostname}' from {source_name} is not a valid hostname")]
    InvalidHostname {
        source_name: &'static str,
        hostname: String,
    },
}

/// Remote exec collaborator errors
#[derive(Error, Debug)]
pub enum ExecError {
    /// Transport or API failure
    #[error("Request failed: {0}")]
    Request(String),

    /// The API answered with an error status
    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response could not be decoded
    #[error("Invalid response: {0}")]
    Decode(String),

    /// The VM was not found
    #[error("VM not found: {0}")]
    NotFound(String),
}

/// Remote bootstrap errors
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// The exec call for a script failed
    #[error("{script} exec failed: {source}")]
    Exec {
        script: &'static str,
        #[source]
        source: ExecError,
    },

    /// The setup script exited non-zero
    #[error("setup script failed (exit {exit_code}):\nstdout: {stdout}\nstderr: {stderr}")]
    SetupFailed {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// Appending the public key exited non-zero
    #[error("key injection failed (exit {exit_code}):\nstdout: {stdout}\nstderr: {stderr}")]
    KeyInjection {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// A script did not finish within its timeout
    #[error("{script} timed out after {secs}s")]
    Timeout { script: &'static str, secs: u64 },

    /// The overall bootstrap deadline passed
    #[error("bootstrap deadline of {0}s exceeded")]
    DeadlineExceeded(u64),

    /// The caller cancelled the bootstrap
    #[error("bootstrap cancelled")]
    Cancelled,
}

/// SSH session errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// ssh exited with 255, the generic connection failure code
    #[error(
        "SSH connection failed (exit 255). Check that:\n  1. {relay} is installed and working\n  2. The VM is still running\n  3. Port {port} is accessible on the VM"
    )]
    ConnectionFailed { relay: String, port: u16 },

    /// ssh exited unsuccessfully for any other reason
    #[error("SSH session ended with error: {0}")]
    Exited(std::process::ExitStatus),

    /// A signal arrived after setup but before ssh was started
    #[error("Interrupted before the SSH session started")]
    Interrupted,

    /// The ssh process could not be spawned or awaited
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Local environment errors
#[derive(Error, Debug)]
pub enum EnvironmentError {
    /// The WebSocket relay client is not installed
    #[error(
        "{0} is required but not found in PATH\n\nInstall websocat:\n  macOS:   brew install websocat\n  Linux:   curl -fsSL https://github.com/vi/websocat/releases/download/v1.13.0/websocat.x86_64-unknown-linux-musl -o /usr/local/bin/websocat && chmod +x /usr/local/bin/websocat\n  Windows: Download from https://github.com/vi/websocat/releases"
    )]
    RelayMissing(String),

    /// The OpenSSH client is not installed
    #[error("{0} is required but not found in PATH (install an OpenSSH client)")]
    SshMissing(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failed_lists_causes() {
        let err = SessionError::ConnectionFailed {
            relay: "websocat".to_string(),
            port: 2222,
        };
        let msg = err.to_string();
        assert!(msg.contains("websocat is installed"));
        assert!(msg.contains("still running"));
        assert!(msg.contains("Port 2222"));
    }

    #[test]
    fn test_setup_failed_carries_streams() {
        let err = BootstrapError::SetupFailed {
            exit_code: 100,
            stdout: "Installing openssh-server...".to_string(),
            stderr: "E: Unable to locate package".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("exit 100"));
        assert!(msg.contains("Installing openssh-server..."));
        assert!(msg.contains("E: Unable to locate package"));
    }

    #[test]
    fn test_missing_public_key_names_path() {
        let err = KeyError::MissingPublicKey(PathBuf::from("/home/me/.ssh/id_ed25519.pub"));
        assert!(err.to_string().contains("/home/me/.ssh/id_ed25519.pub"));
    }

    #[test]
    fn test_bridge_error_wraps_sources() {
        let err: BridgeError = EnvironmentError::RelayMissing("websocat".to_string()).into();
        assert!(err.to_string().starts_with("websocat is required but not found in PATH"));

        let err: BridgeError = ResolveError::NoEndpoint.into();
        assert!(matches!(err, BridgeError::Resolve(ResolveError::NoEndpoint)));
    }
}
