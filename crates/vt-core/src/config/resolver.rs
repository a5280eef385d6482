//! Endpoint resolution settings

use serde::{Deserialize, Serialize};

/// Endpoint resolution settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Use the URL's raw hostname when its embedded token can't be decoded.
    ///
    /// Older backends issued tokens this tool can't read. Off by default,
    /// since the raw hostname may be a load balancer rather than the VM.
    pub allow_legacy_hostname_fallback: bool,
}
