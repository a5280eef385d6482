//! VM API settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Where to reach the VM API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the API
    pub base_url: String,

    /// HTTP request timeout, on top of any remote exec timeout
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.onkernel.com".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}
