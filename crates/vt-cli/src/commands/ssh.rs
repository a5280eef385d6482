//! The `ssh` command
//!
//! Resolves the VM, prepares a key, bootstraps the remote services and then
//! either prints the manual connection command (`--setup-only`) or hands the
//! terminal to ssh until the session ends.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::output::{print_info, print_success, print_warning, write_json};
use vt_core::config::ConfigFile;
use vt_core::error::SessionError;
use vt_core::{
    resolve_domain, BootstrapState, BridgeError, FallbackPolicy, Identity, OutputFormat,
    RemoteEndpoint, RemoteExec, SessionConfig, VmLookup,
};
use vt_tunnel::{check_binaries, Bootstrapper, SignalListener, Supervisor, TunnelCommand};

/// What `--setup-only` reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupReport {
    pub vm_id: String,
    pub vm_domain: String,
    pub key_file: PathBuf,
    pub ssh_command: String,
    pub bootstrap: BootstrapState,
}

/// A bootstrapped VM and the command that reaches it
///
/// Holds the identity, so an ephemeral key file lives exactly as long as
/// this value.
#[derive(Debug)]
pub(crate) struct PreparedSession {
    pub identity: Identity,
    pub endpoint: RemoteEndpoint,
    pub command: TunnelCommand,
    pub state: BootstrapState,
}

/// Run `vm-tunnel ssh`, writing the `--setup-only` report to `out`
pub async fn ssh_command<C, W>(
    client: &C,
    session: &SessionConfig,
    config: &ConfigFile,
    cancel: &CancellationToken,
    out: &mut W,
) -> Result<()>
where
    C: VmLookup + RemoteExec,
    W: Write,
{
    // One listener for the whole session; see `vt_tunnel::supervisor`.
    let mut signals = SignalListener::install().context("Failed to install signal handlers")?;

    let prepared = prepare_session(client, session, config, cancel, &mut signals)
        .await
        .map_err(describe)?;

    if session.setup_only {
        if signals.try_recv().is_some() {
            return Err(SessionError::Interrupted.into());
        }
        let report = SetupReport {
            vm_id: session.vm_id.clone(),
            vm_domain: prepared.endpoint.hostname.clone(),
            key_file: prepared.identity.key_path().to_path_buf(),
            ssh_command: prepared.command.display(),
            bootstrap: prepared.state,
        };
        write_setup_report(out, &report, session.output)?;
        if prepared.identity.is_ephemeral() {
            print_warning(
                "The ephemeral key is deleted when vm-tunnel exits; use -i <key> for a reusable identity",
            );
        }
        return Ok(());
    }

    print_info("Connecting via SSH...");
    Supervisor::new(&config.tunnel)
        .run(&prepared.command, signals)
        .await?;

    tracing::debug!("Session ended, releasing {:?}", prepared.identity.key_path());
    Ok(())
}

/// Everything up to, but not including, starting ssh
///
/// A signal on `signals` while the VM is looked up or bootstrapped aborts
/// the setup.
pub(crate) async fn prepare_session<C>(
    client: &C,
    session: &SessionConfig,
    config: &ConfigFile,
    cancel: &CancellationToken,
    signals: &mut SignalListener,
) -> Result<PreparedSession, BridgeError>
where
    C: VmLookup + RemoteExec,
{
    let binaries = check_binaries(&config.tunnel)?;

    print_info(&format!("Getting VM {} info...", session.vm_id));
    let vm = tokio::select! {
        vm = client.get_vm(&session.vm_id) => vm?,
        Some(signal) = signals.recv() => {
            tracing::info!("Received {:?}, aborting...", signal);
            return Err(SessionError::Interrupted.into());
        }
    };

    let policy = FallbackPolicy::from_config(config.resolver.allow_legacy_hostname_fallback);
    let endpoint = resolve_domain(&vm.live_view_url, &vm.cdp_ws_url, policy)?;
    print_info(&format!("VM domain: {}", endpoint.hostname));

    let identity = Identity::prepare(session.identity_file.as_deref(), &vm.session_id)?;

    print_info("Setting up SSH services on VM...");
    let bootstrapper = Bootstrapper::new(client, &config.bootstrap, config.tunnel.bridge_port);
    let state = {
        let bootstrap = bootstrapper.bootstrap(&vm.session_id, identity.public_key(), cancel);
        tokio::pin!(bootstrap);
        tokio::select! {
            state = &mut bootstrap => state,
            Some(signal) = signals.recv() => {
                tracing::info!("Received {:?}, aborting setup...", signal);
                cancel.cancel();
                bootstrap.await
            }
        }
    }?;
    print_success(&format!("SSH services running on VM ({})", state));

    let command =
        TunnelCommand::build(&endpoint.hostname, identity.key_path(), session, &config.tunnel)
            .with_program(binaries.ssh);

    Ok(PreparedSession {
        identity,
        endpoint,
        command,
        state,
    })
}

/// Attach the step that failed to a setup error
fn describe(err: BridgeError) -> anyhow::Error {
    match err {
        BridgeError::Exec(e) => anyhow::Error::new(e).context("Failed to get VM"),
        BridgeError::Resolve(e) => anyhow::Error::new(e).context("Failed to extract VM domain"),
        BridgeError::Key(e) => anyhow::Error::new(e).context("Failed to prepare SSH key"),
        BridgeError::Bootstrap(e) => anyhow::Error::new(e).context("Failed to setup SSH on VM"),
        other => other.into(),
    }
}

fn write_setup_report<W: Write>(out: &mut W, report: &SetupReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => write_json(out, report).context("Failed to write setup report")?,
        OutputFormat::Text => {
            print_info("--setup-only specified, not connecting.");
            print_info("To connect manually:");
            writeln!(out, "  {}", report.ssh_command).context("Failed to write setup report")?;
        }
    }
    Ok(())
}
