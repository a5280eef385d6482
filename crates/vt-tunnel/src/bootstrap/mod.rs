//! Remote bootstrap
//!
//! Makes sure sshd and the WebSocket relay are running on the VM and that
//! the session's public key is authorized. Safe to run on every connection:
//! a cheap probe decides between the full setup script and a key-only
//! append.

mod scripts;

pub use scripts::{escape_single_quoted, KeyInjectScript, ProbeScript, SetupScript};

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use vt_core::config::BootstrapSettings;
use vt_core::error::BootstrapError;
use vt_core::{BootstrapState, ExecOutput, ExecRequest, RemoteExec};

/// Extra local wait on top of a script's remote timeout
const LOCAL_TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// Prepares a VM for tunnel sessions
pub struct Bootstrapper<'a, E: RemoteExec + ?Sized> {
    exec: &'a E,
    settings: &'a BootstrapSettings,
    bridge_port: u16,
}

impl<'a, E: RemoteExec + ?Sized> Bootstrapper<'a, E> {
    /// Create a bootstrapper using `exec` for all remote calls
    pub fn new(exec: &'a E, settings: &'a BootstrapSettings, bridge_port: u16) -> Self {
        Self {
            exec,
            settings,
            bridge_port,
        }
    }

    /// Ensure services are up and `public_key` is authorized
    ///
    /// Probe and setup share one deadline (`bootstrap_deadline`) and both
    /// stop early when `cancel` fires.
    pub async fn bootstrap(
        &self,
        session_id: &str,
        public_key: &str,
        cancel: &CancellationToken,
    ) -> Result<BootstrapState, BootstrapError> {
        let deadline = Instant::now() + self.settings.bootstrap_deadline;

        if self.probe(session_id, deadline, cancel).await? {
            tracing::info!("SSH services already running, injecting key");
            self.inject_key(session_id, public_key, deadline, cancel)
                .await?;
            return Ok(BootstrapState::ServicesRunning);
        }

        tracing::info!("Running SSH setup script on VM");
        self.setup(session_id, public_key, deadline, cancel).await?;
        Ok(BootstrapState::ServicesInstalled)
    }

    /// Whether both services already report RUNNING
    ///
    /// Anything short of a clean RUNNING answer counts as not running.
    /// Cancellation and the overall deadline still abort.
    async fn probe(
        &self,
        session_id: &str,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<bool, BootstrapError> {
        let script = ProbeScript {
            sshd_service: &self.settings.sshd_service,
            relay_service: &self.settings.relay_service,
        };
        let request = ExecRequest::bash(script.to_string())
            .as_root()
            .with_timeout(self.settings.probe_timeout);

        match self.run("probe script", session_id, request, deadline, cancel).await {
            Ok(output) if output.success() => {
                let status = output.stdout_lossy();
                tracing::debug!("Probe answered {:?}", status.trim());
                Ok(status.trim() == scripts::RUNNING)
            }
            Ok(output) => {
                tracing::debug!(
                    "Probe exited {} (will run setup): {}",
                    output.exit_code,
                    output.stderr_lossy().trim()
                );
                Ok(false)
            }
            Err(e @ (BootstrapError::Cancelled | BootstrapError::DeadlineExceeded(_))) => Err(e),
            Err(e) => {
                tracing::debug!("Check services failed (will run setup): {}", e);
                Ok(false)
            }
        }
    }

    async fn inject_key(
        &self,
        session_id: &str,
        public_key: &str,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<(), BootstrapError> {
        let script = KeyInjectScript { public_key };
        let request = ExecRequest::bash(script.to_string())
            .as_root()
            .with_timeout(self.settings.inject_timeout);

        let output = self
            .run("key injection", session_id, request, deadline, cancel)
            .await?;
        if !output.success() {
            return Err(BootstrapError::KeyInjection {
                exit_code: output.exit_code,
                stdout: output.stdout_lossy(),
                stderr: output.stderr_lossy(),
            });
        }
        Ok(())
    }

    async fn setup(
        &self,
        session_id: &str,
        public_key: &str,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<(), BootstrapError> {
        let script = SetupScript {
            public_key,
            bridge_port: self.bridge_port,
            sshd_service: &self.settings.sshd_service,
            relay_service: &self.settings.relay_service,
            relay_download_url: &self.settings.relay_download_url,
            remote_relay_path: &self.settings.remote_relay_path,
            sshd_config_name: &self.settings.sshd_config_name,
        };
        let request = ExecRequest::bash(script.to_string())
            .as_root()
            .with_timeout(self.settings.setup_timeout);

        let output = self
            .run("setup script", session_id, request, deadline, cancel)
            .await?;
        if !output.success() {
            return Err(BootstrapError::SetupFailed {
                exit_code: output.exit_code,
                stdout: output.stdout_lossy(),
                stderr: output.stderr_lossy(),
            });
        }

        tracing::debug!("Setup output:\n{}", output.stdout_lossy());
        Ok(())
    }

    /// Run one remote call, bounded by its timeout, the deadline and `cancel`
    async fn run(
        &self,
        script: &'static str,
        session_id: &str,
        request: ExecRequest,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput, BootstrapError> {
        let timeout = request.timeout.unwrap_or(self.settings.probe_timeout);
        let call = tokio::time::timeout(
            timeout + LOCAL_TIMEOUT_GRACE,
            self.exec.exec(session_id, request),
        );

        tokio::select! {
            biased;

            _ = cancel.cancelled() => Err(BootstrapError::Cancelled),

            _ = tokio::time::sleep_until(deadline) => Err(BootstrapError::DeadlineExceeded(
                self.settings.bootstrap_deadline.as_secs(),
            )),

            result = call => match result {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(source)) => Err(BootstrapError::Exec { script, source }),
                Err(_) => Err(BootstrapError::Timeout {
                    script,
                    secs: timeout.as_secs(),
                }),
            },
        }
    }
}
