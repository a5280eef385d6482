//! HTTP client for the VM API
//!
//! Implements [`VmLookup`] and [`RemoteExec`] on top of `reqwest`. Command
//! output comes back base64 encoded and is decoded here, so callers only
//! ever see raw bytes.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as base64;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use vt_core::config::ApiConfig;
use vt_core::error::ExecError;
use vt_core::{ExecOutput, ExecRequest, RemoteExec, VmInfo, VmLookup};

#[derive(Debug, Deserialize)]
struct BrowserResponse {
    session_id: String,
    #[serde(default)]
    browser_live_view_url: Option<String>,
    #[serde(default)]
    cdp_ws_url: Option<String>,
}

impl From<BrowserResponse> for VmInfo {
    fn from(b: BrowserResponse) -> Self {
        VmInfo {
            session_id: b.session_id,
            live_view_url: b.browser_live_view_url.unwrap_or_default(),
            cdp_ws_url: b.cdp_ws_url.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ExecBody<'a> {
    command: &'a str,
    args: &'a [String],
    as_root: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_sec: Option<u64>,
}

impl<'a> From<&'a ExecRequest> for ExecBody<'a> {
    fn from(req: &'a ExecRequest) -> Self {
        ExecBody {
            command: &req.command,
            args: &req.args,
            as_root: req.as_root,
            timeout_sec: req.timeout.map(|t| t.as_secs().max(1)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ExecResponse {
    #[serde(default)]
    exit_code: i32,
    #[serde(default)]
    stdout_b64: Option<String>,
    #[serde(default)]
    stderr_b64: Option<String>,
}

impl ExecResponse {
    fn decode(self) -> Result<ExecOutput, ExecError> {
        Ok(ExecOutput {
            stdout: decode_stream("stdout", self.stdout_b64)?,
            stderr: decode_stream("stderr", self.stderr_b64)?,
            exit_code: self.exit_code,
        })
    }
}

fn decode_stream(name: &str, encoded: Option<String>) -> Result<Vec<u8>, ExecError> {
    match encoded.as_deref() {
        None | Some("") => Ok(Vec::new()),
        Some(data) => base64
            .decode(data)
            .map_err(|e| ExecError::Decode(format!("{} is not valid base64: {}", name, e))),
    }
}

/// Client for the VM API
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    request_timeout: Duration,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, api_key: Option<String>) -> Result<Self, ExecError> {
        let http = Client::builder()
            .user_agent(concat!("vm-tunnel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExecError::Request(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            request_timeout: config.request_timeout,
        })
    }

    fn browser_url(&self, id: &str) -> String {
        format!("{}/browsers/{}", self.base_url, id)
    }

    fn exec_url(&self, id: &str) -> String {
        format!("{}/process/exec", self.browser_url(id))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        id: &str,
    ) -> Result<T, ExecError> {
        let res = self
            .authorize(builder)
            .send()
            .await
            .map_err(|e| ExecError::Request(e.to_string()))?;

        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ExecError::NotFound(id.to_string()));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ExecError::Status {
                status: status.as_u16(),
                body,
            });
        }

        res.json()
            .await
            .map_err(|e| ExecError::Decode(e.to_string()))
    }
}

#[async_trait]
impl VmLookup for ApiClient {
    async fn get_vm(&self, vm_id: &str) -> Result<VmInfo, ExecError> {
        tracing::debug!("GET {}", self.browser_url(vm_id));
        let builder = self
            .http
            .get(self.browser_url(vm_id))
            .timeout(self.request_timeout);
        let browser: BrowserResponse = self.send(builder, vm_id).await?;
        Ok(browser.into())
    }
}

#[async_trait]
impl RemoteExec for ApiClient {
    async fn exec(&self, session_id: &str, request: ExecRequest) -> Result<ExecOutput, ExecError> {
        let url = self.exec_url(session_id);
        tracing::debug!("POST {} ({})", url, request.command);

        let timeout = request.timeout.unwrap_or_default() + self.request_timeout;
        let builder = self
            .http
            .post(url)
            .timeout(timeout)
            .json(&ExecBody::from(&request));
        let response: ExecResponse = self.send(builder, session_id).await?;
        response.decode()
    }
}
