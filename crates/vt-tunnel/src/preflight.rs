//! Local environment checks
//!
//! A missing relay would otherwise only show up as an opaque ProxyCommand
//! failure, so both binaries are looked up before anything else happens.

use std::path::PathBuf;

use vt_core::config::TunnelSettings;
use vt_core::error::EnvironmentError;

/// Paths of the local binaries a session needs
#[derive(Debug, Clone)]
pub struct LocalBinaries {
    pub ssh: PathBuf,
    pub relay: PathBuf,
}

/// Find the relay client and ssh on `PATH`
pub fn check_binaries(settings: &TunnelSettings) -> Result<LocalBinaries, EnvironmentError> {
    let relay = which::which(&settings.relay_binary)
        .map_err(|_| EnvironmentError::RelayMissing(settings.relay_binary.clone()))?;
    let ssh = which::which(&settings.ssh_binary)
        .map_err(|_| EnvironmentError::SshMissing(settings.ssh_binary.clone()))?;

    tracing::debug!("Using ssh at {:?}, relay at {:?}", ssh, relay);
    Ok(LocalBinaries { ssh, relay })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_relay_has_install_hints() {
        let settings = TunnelSettings {
            relay_binary: "vm-tunnel-no-such-relay".to_string(),
            ..Default::default()
        };
        let err = check_binaries(&settings).unwrap_err();
        assert!(matches!(err, EnvironmentError::RelayMissing(_)));
        let msg = err.to_string();
        assert!(msg.contains("vm-tunnel-no-such-relay is required but not found in PATH"));
        assert!(msg.contains("brew install websocat"));
        assert!(msg.contains("Windows"));
    }

    #[cfg(unix)]
    #[test]
    fn test_relay_checked_before_ssh() {
        let settings = TunnelSettings {
            relay_binary: "vm-tunnel-no-such-relay".to_string(),
            ssh_binary: "vm-tunnel-no-such-ssh".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            check_binaries(&settings),
            Err(EnvironmentError::RelayMissing(_))
        ));

        let settings = TunnelSettings {
            relay_binary: "sh".to_string(),
            ssh_binary: "vm-tunnel-no-such-ssh".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            check_binaries(&settings),
            Err(EnvironmentError::SshMissing(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_found_binaries() {
        let settings = TunnelSettings {
            relay_binary: "sh".to_string(),
            ssh_binary: "sh".to_string(),
            ..Default::default()
        };
        let found = check_binaries(&settings).unwrap();
        assert!(found.relay.is_absolute());
    }
}
