//! VM endpoint resolution
//!
//! Connection metadata carries either the VM's real hostname directly, or a
//! proxy URL with a signed token (`?jwt=header.payload.signature`) whose
//! payload names the VM in `session.fqdn`. The token is decoded but not
//! verified; TLS to the issuing proxy is what makes it trustworthy.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use reqwest::Url;
use serde::Deserialize;

use crate::error::ResolveError;

/// Query parameter carrying the signed token
const TOKEN_PARAM: &str = "jwt";

/// Which URL the hostname came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointSource {
    LiveView,
    Cdp,
}

impl EndpointSource {
    /// Name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            EndpointSource::LiveView => "live view URL",
            EndpointSource::Cdp => "CDP WebSocket URL",
        }
    }
}

/// How the hostname was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Host component of the URL
    DirectHostname,
    /// `session.fqdn` claim of the embedded token
    SignedToken,
    /// Host component used because the token was unreadable
    LegacyFallback,
}

/// What to do when an embedded token can't be decoded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Fail
    #[default]
    Strict,
    /// Use the URL's own hostname and log a warning
    AllowRawHostname,
}

impl FallbackPolicy {
    pub fn from_config(allow_legacy_hostname_fallback: bool) -> Self {
        if allow_legacy_hostname_fallback {
            FallbackPolicy::AllowRawHostname
        } else {
            FallbackPolicy::Strict
        }
    }
}

/// A resolved, routable VM hostname
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    pub hostname: String,
    pub strategy: Strategy,
    pub source: EndpointSource,
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    #[serde(default)]
    session: Option<SessionClaims>,
}

#[derive(Debug, Deserialize)]
struct SessionClaims {
    #[serde(default)]
    fqdn: Option<String>,
}

/// Resolve the VM hostname from its live view URL or CDP URL
///
/// The live view URL wins when both are present. Empty strings count as
/// absent.
pub fn resolve_domain(
    live_view_url: &str,
    cdp_url: &str,
    policy: FallbackPolicy,
) -> Result<RemoteEndpoint, ResolveError> {
    let (url, source) = if !live_view_url.trim().is_empty() {
        (live_view_url.trim(), EndpointSource::LiveView)
    } else if !cdp_url.trim().is_empty() {
        (cdp_url.trim(), EndpointSource::Cdp)
    } else {
        return Err(ResolveError::NoEndpoint);
    };

    let endpoint = resolve_url(url, source, policy)?;
    if !is_valid_hostname(&endpoint.hostname) {
        return Err(ResolveError::InvalidHostname {
            source_name: source.name(),
            hostname: endpoint.hostname,
        });
    }

    tracing::debug!(
        "Resolved VM domain {} from {} ({:?})",
        endpoint.hostname,
        source.name(),
        endpoint.strategy
    );
    Ok(endpoint)
}

fn resolve_url(
    raw: &str,
    source: EndpointSource,
    policy: FallbackPolicy,
) -> Result<RemoteEndpoint, ResolveError> {
    let url = Url::parse(raw).map_err(|e| ResolveError::InvalidUrl {
        source_name: source.name(),
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    let token = url
        .query_pairs()
        .find(|(key, _)| key == TOKEN_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty());

    let Some(token) = token else {
        return Ok(RemoteEndpoint {
            hostname: raw_hostname(&url, source)?,
            strategy: Strategy::DirectHostname,
            source,
        });
    };

    match decode_claims(&token, source) {
        Ok(claims) => {
            let fqdn = claims
                .session
                .and_then(|s| s.fqdn)
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .ok_or_else(|| ResolveError::Extraction {
                    source_name: source.name(),
                    step: "session.fqdn claim",
                    reason: "token payload has no session.fqdn".to_string(),
                })?;
            Ok(RemoteEndpoint {
                hostname: fqdn,
                strategy: Strategy::SignedToken,
                source,
            })
        }
        Err(err) if policy == FallbackPolicy::AllowRawHostname => {
            let hostname = raw_hostname(&url, source)?;
            tracing::warn!(
                "Could not decode token in {} ({}); falling back to raw hostname {}. \
                 This may not be the VM itself.",
                source.name(),
                err,
                hostname
            );
            Ok(RemoteEndpoint {
                hostname,
                strategy: Strategy::LegacyFallback,
                source,
            })
        }
        Err(err) => Err(err),
    }
}

fn raw_hostname(url: &Url, source: EndpointSource) -> Result<String, ResolveError> {
    url.host_str()
        .map(|h| h.trim_end_matches('.').to_string())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ResolveError::Extraction {
            source_name: source.name(),
            step: "hostname",
            reason: format!("no hostname in URL: {}", url),
        })
}

/// Decode the payload segment of a `header.payload.signature` token
fn decode_claims(token: &str, source: EndpointSource) -> Result<TokenClaims, ResolveError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(ResolveError::Extraction {
            source_name: source.name(),
            step: "token format",
            reason: format!("expected 3 dot-separated parts, found {}", parts.len()),
        });
    }

    // Accept padded input and the standard alphabet as well
    let payload: String = parts[1]
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            c => c,
        })
        .collect();

    let decoded = URL_SAFE_NO_PAD
        .decode(payload.as_bytes())
        .map_err(|e| ResolveError::Extraction {
            source_name: source.name(),
            step: "payload decoding",
            reason: e.to_string(),
        })?;

    serde_json::from_slice(&decoded).map_err(|e| ResolveError::Extraction {
        source_name: source.name(),
        step: "payload JSON",
        reason: e.to_string(),
    })
}

/// Check DNS hostname syntax (RFC 1123 labels)
pub fn is_valid_hostname(hostname: &str) -> bool {
    let hostname = hostname.strip_suffix('.').unwrap_or(hostname);
    if hostname.is_empty() || hostname.len() > 253 {
        return false;
    }

    hostname.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_payload(payload: &str) -> String {
        format!(
            "eyJhbGciOiJIUzI1NiJ9.{}.c2lnbmF0dXJl",
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    fn cdp_url(token: &str) -> String {
        format!("wss://proxy.lb.example.dev:8443/browser/cdp?jwt={}", token)
    }

    #[test]
    fn test_direct_hostname() {
        let ep = resolve_domain(
            "https://vm-abc123.example.live/path",
            "",
            FallbackPolicy::Strict,
        )
        .unwrap();
        assert_eq!(ep.hostname, "vm-abc123.example.live");
        assert_eq!(ep.strategy, Strategy::DirectHostname);
        assert_eq!(ep.source, EndpointSource::LiveView);

        let again = resolve_domain(
            "https://vm-abc123.example.live/path",
            "",
            FallbackPolicy::Strict,
        )
        .unwrap();
        assert_eq!(ep, again);
    }

    #[test]
    fn test_signed_token() {
        let url = cdp_url(&token_with_payload(r#"{"session":{"fqdn":"vm-real.internal"}}"#));
        let ep = resolve_domain("", &url, FallbackPolicy::Strict).unwrap();
        assert_eq!(ep.hostname, "vm-real.internal");
        assert_eq!(ep.strategy, Strategy::SignedToken);
        assert_eq!(ep.source, EndpointSource::Cdp);
    }

    #[test]
    fn test_signed_token_padded_payload() {
        let padded = base64::engine::general_purpose::URL_SAFE
            .encode(r#"{"session":{"fqdn":"vm-x.internal"}}"#);
        let token = format!("aGVhZGVy.{}.c2ln", padded);
        // '=' must be percent-encoded inside a query value
        let url = cdp_url(&token.replace('=', "%3D"));
        let ep = resolve_domain("", &url, FallbackPolicy::Strict).unwrap();
        assert_eq!(ep.hostname, "vm-x.internal");
    }

    #[test]
    fn test_live_view_preferred() {
        let url = cdp_url(&token_with_payload(r#"{"session":{"fqdn":"vm-real.internal"}}"#));
        let ep = resolve_domain("https://vm-live.example.live", &url, FallbackPolicy::Strict)
            .unwrap();
        assert_eq!(ep.hostname, "vm-live.example.live");
    }

    #[test]
    fn test_both_missing() {
        let err = resolve_domain("", "  ", FallbackPolicy::Strict).unwrap_err();
        assert!(matches!(err, ResolveError::NoEndpoint));
        let msg = err.to_string();
        assert!(msg.contains("live view URL"));
        assert!(msg.contains("CDP WebSocket URL"));
    }

    #[test]
    fn test_missing_claim_names_step() {
        let url = cdp_url(&token_with_payload(r#"{"session":{}}"#));
        let err = resolve_domain("", &url, FallbackPolicy::AllowRawHostname).unwrap_err();
        match err {
            ResolveError::Extraction {
                source_name, step, ..
            } => {
                assert_eq!(source_name, "CDP WebSocket URL");
                assert_eq!(step, "session.fqdn claim");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_token_strict() {
        let err = resolve_domain("", &cdp_url("not-a-token"), FallbackPolicy::Strict).unwrap_err();
        assert!(err.to_string().contains("token format"));

        let err = resolve_domain("", &cdp_url("a.!!!.c"), FallbackPolicy::Strict).unwrap_err();
        assert!(err.to_string().contains("payload decoding"));

        let bad_json = format!("a.{}.c", URL_SAFE_NO_PAD.encode("not json"));
        let err = resolve_domain("", &cdp_url(&bad_json), FallbackPolicy::Strict).unwrap_err();
        assert!(err.to_string().contains("payload JSON"));
    }

    #[test]
    fn test_malformed_token_legacy_fallback() {
        let ep = resolve_domain(
            "",
            &cdp_url("not-a-token"),
            FallbackPolicy::AllowRawHostname,
        )
        .unwrap();
        assert_eq!(ep.hostname, "proxy.lb.example.dev");
        assert_eq!(ep.strategy, Strategy::LegacyFallback);
    }

    #[test]
    fn test_invalid_url() {
        let err = resolve_domain("not a url", "", FallbackPolicy::Strict).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidUrl { source_name: "live view URL", .. }));
    }

    #[test]
    fn test_url_without_host() {
        let err = resolve_domain("", "unix:/run/cdp.sock", FallbackPolicy::Strict).unwrap_err();
        assert!(err.to_string().contains("hostname"));
    }

    #[test]
    fn test_claim_must_be_hostname() {
        let url = cdp_url(&token_with_payload(r#"{"session":{"fqdn":"evil host;rm -rf"}}"#));
        let err = resolve_domain("", &url, FallbackPolicy::Strict).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidHostname { .. }));
    }

    #[test]
    fn test_is_valid_hostname() {
        assert!(is_valid_hostname("vm-abc123.example.live"));
        assert!(is_valid_hostname("localhost"));
        assert!(is_valid_hostname("a.b.c."));
        assert!(!is_valid_hostname(""));
        assert!(!is_valid_hostname("-bad.example"));
        assert!(!is_valid_hostname("bad-.example"));
        assert!(!is_valid_hostname("a..b"));
        assert!(!is_valid_hostname("under_score.example"));
        assert!(!is_valid_hostname(&"a".repeat(64)));
    }
}
