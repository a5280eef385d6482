//! ssh process supervision
//!
//! The child shares the controlling terminal with us. SIGINT and SIGTERM
//! delivered to this process are forwarded to the child unchanged, and the
//! child's exit status is mapped to a `SessionError`.
//!
//! A `SignalListener` is installed once per session, before the remote
//! setup starts, and handed to the supervisor afterwards. Once installed the
//! default Ctrl+C behaviour is gone for the life of the process, so every
//! phase has to read from the same listener or the signal is lost.

use std::process::ExitStatus;

use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use vt_core::config::TunnelSettings;
use vt_core::error::SessionError;

use crate::command::TunnelCommand;

/// Signals forwarded to the ssh child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardSignal {
    Interrupt,
    Terminate,
}

impl ForwardSignal {
    #[cfg(unix)]
    fn as_raw(self) -> libc::c_int {
        match self {
            Self::Interrupt => libc::SIGINT,
            Self::Terminate => libc::SIGTERM,
        }
    }
}

/// Session-wide subscription to SIGINT and SIGTERM
pub struct SignalListener {
    rx: mpsc::Receiver<ForwardSignal>,
    _guard: Option<ListenerGuard>,
}

impl SignalListener {
    /// Install the OS handlers and start listening
    pub fn install() -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel(8);
        let handle = spawn_signal_listener(tx)?;
        Ok(Self {
            rx,
            _guard: Some(ListenerGuard(handle)),
        })
    }

    /// Listen on a channel fed by the caller instead of the OS
    pub fn from_receiver(rx: mpsc::Receiver<ForwardSignal>) -> Self {
        Self { rx, _guard: None }
    }

    /// Wait for the next signal; `None` once the source is gone
    pub async fn recv(&mut self) -> Option<ForwardSignal> {
        self.rx.recv().await
    }

    /// A signal that already arrived, if any
    pub fn try_recv(&mut self) -> Option<ForwardSignal> {
        self.rx.try_recv().ok()
    }
}

impl std::fmt::Debug for SignalListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalListener")
            .field("os", &self._guard.is_some())
            .finish()
    }
}

/// Runs one ssh child to completion
#[derive(Debug, Clone)]
pub struct Supervisor {
    program: String,
    relay_binary: String,
    bridge_port: u16,
}

impl Supervisor {
    pub fn new(settings: &TunnelSettings) -> Self {
        Self {
            program: settings.ssh_binary.clone(),
            relay_binary: settings.relay_binary.clone(),
            bridge_port: settings.bridge_port,
        }
    }

    /// Run the tunnel command, forwarding signals from `signals` until it exits
    ///
    /// A signal that arrived before this call means the user gave up during
    /// setup; ssh is not started at all.
    pub async fn run(
        &self,
        command: &TunnelCommand,
        mut signals: SignalListener,
    ) -> Result<(), SessionError> {
        if let Some(signal) = signals.try_recv() {
            tracing::info!("Received {:?} before ssh started", signal);
            return Err(SessionError::Interrupted);
        }
        self.run_with_signals(command.to_command(), signals).await
    }

    /// Run an arbitrary command under OS signal forwarding
    pub async fn run_command(&self, command: Command) -> Result<(), SessionError> {
        // Handlers are installed before spawning so no signal slips past.
        let signals = SignalListener::install().map_err(|source| SessionError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        self.run_with_signals(command, signals).await
    }

    /// Spawn `command` and forward every signal received on `signals`
    ///
    /// Returns once the child exits. A closed channel stops forwarding but
    /// not the wait.
    pub async fn run_with_signals(
        &self,
        mut command: Command,
        mut signals: SignalListener,
    ) -> Result<(), SessionError> {
        let mut child = command.spawn().map_err(|source| SessionError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        tracing::debug!("Started {} (pid {:?})", self.program, child.id());

        let status = loop {
            tokio::select! {
                status = child.wait() => {
                    break status.map_err(|source| SessionError::Spawn {
                        program: self.program.clone(),
                        source,
                    })?;
                }
                Some(signal) = signals.recv() => {
                    match child.id() {
                        Some(pid) => forward(pid, signal),
                        None => tracing::debug!("Child already reaped, dropping {:?}", signal),
                    }
                }
            }
        };

        tracing::debug!("{} exited with {}", self.program, status);
        classify_exit(status, &self.relay_binary, self.bridge_port)
    }
}

/// Map the child's exit status to the session result
pub fn classify_exit(status: ExitStatus, relay: &str, port: u16) -> Result<(), SessionError> {
    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(255) => Err(SessionError::ConnectionFailed {
            relay: relay.to_string(),
            port,
        }),
        _ => Err(SessionError::Exited(status)),
    }
}

/// Aborts the listener task on every exit path
struct ListenerGuard(JoinHandle<()>);

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(unix)]
fn forward(pid: u32, signal: ForwardSignal) {
    tracing::debug!("Forwarding {:?} to pid {}", signal, pid);
    // SAFETY: kill has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid as libc::pid_t, signal.as_raw()) };
    if rc != 0 {
        tracing::warn!(
            "Failed to forward {:?} to pid {}: {}",
            signal,
            pid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn forward(pid: u32, signal: ForwardSignal) {
    // The console delivers Ctrl+C to the whole process group already.
    tracing::debug!("Not forwarding {:?} to pid {} on this platform", signal, pid);
}

#[cfg(unix)]
fn spawn_signal_listener(tx: mpsc::Sender<ForwardSignal>) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                Some(()) = interrupt.recv() => ForwardSignal::Interrupt,
                Some(()) = terminate.recv() => ForwardSignal::Terminate,
                else => break,
            };
            if tx.send(received).await.is_err() {
                break;
            }
        }
    }))
}

#[cfg(not(unix))]
fn spawn_signal_listener(tx: mpsc::Sender<ForwardSignal>) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(ForwardSignal::Interrupt).await.is_err() {
                break;
            }
        }
    }))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::path::Path;
    use std::time::Duration;

    fn supervisor() -> Supervisor {
        Supervisor::new(&TunnelSettings {
            ssh_binary: "sh".to_string(),
            ..Default::default()
        })
    }

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    async fn wait_for(path: &Path) {
        for _ in 0..200 {
            if path.exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("{} never appeared", path.display());
    }

    #[test]
    fn test_classify_success() {
        assert!(classify_exit(ExitStatus::from_raw(0), "websocat", 2222).is_ok());
    }

    #[test]
    fn test_classify_255_is_connection_failure() {
        let err = classify_exit(ExitStatus::from_raw(255 << 8), "websocat", 2222).unwrap_err();
        assert!(matches!(err, SessionError::ConnectionFailed { port: 2222, .. }));
        let msg = err.to_string();
        assert!(msg.contains("websocat is installed and working"));
        assert!(msg.contains("Port 2222 is accessible"));
    }

    #[test]
    fn test_classify_other_exit() {
        let err = classify_exit(ExitStatus::from_raw(1 << 8), "websocat", 2222).unwrap_err();
        assert!(matches!(err, SessionError::Exited(_)));
        let msg = err.to_string();
        assert!(msg.starts_with("SSH session ended with error"));
        assert!(!msg.contains("Check that"));
    }

    fn channel() -> (mpsc::Sender<ForwardSignal>, SignalListener) {
        let (tx, rx) = mpsc::channel(4);
        (tx, SignalListener::from_receiver(rx))
    }

    #[tokio::test]
    async fn test_exit_codes_from_child() {
        let (_tx, rx) = channel();
        assert!(supervisor().run_with_signals(sh("exit 0"), rx).await.is_ok());

        let (_tx, rx) = channel();
        let err = supervisor()
            .run_with_signals(sh("exit 255"), rx)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::ConnectionFailed { .. }));

        let (_tx, rx) = channel();
        let err = supervisor()
            .run_with_signals(sh("exit 3"), rx)
            .await
            .unwrap_err();
        match err {
            SessionError::Exited(status) => assert_eq!(status.code(), Some(3)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let (_tx, rx) = channel();
        let err = supervisor()
            .run_with_signals(Command::new("/nonexistent/vm-tunnel-ssh"), rx)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_signal_forwarded_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("signals");
        let ready = dir.path().join("ready");

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(r#"trap 'echo INT >> "$1"; exit 130' INT; echo ready > "$2"; while true; do sleep 0.05; done"#)
            .arg("sh")
            .arg(&marker)
            .arg(&ready);

        let (tx, rx) = channel();
        let run = tokio::spawn(async move { supervisor().run_with_signals(cmd, rx).await });

        wait_for(&ready).await;
        tx.send(ForwardSignal::Interrupt).await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(10), run)
            .await
            .expect("child did not exit after SIGINT")
            .unwrap();
        match result {
            Err(SessionError::Exited(status)) => assert_eq!(status.code(), Some(130)),
            other => panic!("unexpected result: {other:?}"),
        }

        let recorded = std::fs::read_to_string(&marker).unwrap();
        assert_eq!(recorded.lines().collect::<Vec<_>>(), vec!["INT"]);
    }

    #[tokio::test]
    async fn test_closed_channel_still_waits() {
        let (tx, rx) = channel();
        drop(tx);
        assert!(supervisor()
            .run_with_signals(sh("sleep 0.1; exit 0"), rx)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_signal_during_setup_prevents_spawn() {
        let command = TunnelCommand::build(
            "vm.example",
            Path::new("/tmp/key"),
            &vt_core::SessionConfig::new("x"),
            &TunnelSettings::default(),
        )
        .with_program("/nonexistent/vm-tunnel-ssh");

        let (tx, rx) = channel();
        tx.send(ForwardSignal::Interrupt).await.unwrap();

        // Spawning would fail with `Spawn`; the pending signal wins first.
        let err = supervisor().run(&command, rx).await.unwrap_err();
        assert!(matches!(err, SessionError::Interrupted));
    }
}
