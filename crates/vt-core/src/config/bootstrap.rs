//! Remote bootstrap settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Settings for preparing sshd and the relay on the VM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapSettings {
    /// Timeout for the "already running?" probe
    #[serde(with = "duration_secs")]
    pub probe_timeout: Duration,

    /// Timeout for the setup script (may include a package install)
    #[serde(with = "duration_secs")]
    pub setup_timeout: Duration,

    /// Timeout for appending the public key
    #[serde(with = "duration_secs")]
    pub inject_timeout: Duration,

    /// Overall deadline for probe + setup
    #[serde(with = "duration_secs")]
    pub bootstrap_deadline: Duration,

    /// Supervisor program name for sshd
    pub sshd_service: String,

    /// Supervisor program name for the relay
    pub relay_service: String,

    /// Where the setup script downloads the relay from when it is absent
    pub relay_download_url: String,

    /// Install path of the relay binary on the VM
    pub remote_relay_path: String,

    /// Name of the sshd config fragment under /etc/ssh/sshd_config.d
    pub sshd_config_name: String,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(10),
            setup_timeout: Duration::from_secs(120),
            inject_timeout: Duration::from_secs(30),
            bootstrap_deadline: Duration::from_secs(180),
            sshd_service: "sshd".to_string(),
            relay_service: "websocat-ssh".to_string(),
            relay_download_url:
                "https://github.com/vi/websocat/releases/download/v1.13.0/websocat.x86_64-unknown-linux-musl"
                    .to_string(),
            remote_relay_path: "/usr/local/bin/websocat".to_string(),
            sshd_config_name: "vm-tunnel.conf".to_string(),
        }
    }
}
