//! Serde helpers shared by the configuration types

/// Serialize a `Duration` as whole seconds
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Settings {
///     #[serde(with = "vt_core::config::serde_utils::duration_secs")]
///     probe_timeout: Duration,
/// }
/// ```
pub mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Timeouts {
        #[serde(with = "duration_secs")]
        probe: Duration,
    }

    #[test]
    fn test_duration_secs_toml() {
        let parsed: Timeouts = toml::from_str("probe = 45").unwrap();
        assert_eq!(parsed.probe, Duration::from_secs(45));
        assert_eq!(toml::to_string(&parsed).unwrap().trim(), "probe = 45");
    }

    #[test]
    fn test_duration_secs_rejects_negative() {
        assert!(toml::from_str::<Timeouts>("probe = -1").is_err());
    }
}
