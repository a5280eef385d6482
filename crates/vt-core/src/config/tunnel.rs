//! Local tunnel settings

use serde::{Deserialize, Serialize};

/// Settings for the local ssh client and WebSocket relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelSettings {
    /// OpenSSH client binary
    pub ssh_binary: String,

    /// WebSocket relay client binary (websocat-compatible)
    pub relay_binary: String,

    /// Port the relay listens on inside the VM
    pub bridge_port: u16,

    /// Account to log in as
    pub ssh_user: String,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            ssh_binary: "ssh".to_string(),
            relay_binary: "websocat".to_string(),
            bridge_port: 2222,
            ssh_user: "root".to_string(),
        }
    }
}

impl TunnelSettings {
    /// WebSocket URL of the relay on `hostname`
    pub fn relay_url(&self, hostname: &str) -> String {
        format!("wss://{}:{}", hostname, self.bridge_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_url() {
        let settings = TunnelSettings::default();
        assert_eq!(
            settings.relay_url("vm-abc.example.live"),
            "wss://vm-abc.example.live:2222"
        );
    }
}
