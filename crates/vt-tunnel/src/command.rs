//! ssh invocation with a WebSocket relay as its transport
//!
//! The relay runs as ssh's `ProxyCommand`, so the hostname ssh itself sees
//! is always `localhost`. Host key checking is off for the same reason; TLS
//! on the relay connection authenticates the endpoint.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use vt_core::config::TunnelSettings;
use vt_core::SessionConfig;

/// A fully assembled ssh invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelCommand {
    program: PathBuf,
    args: Vec<OsString>,
    relay_binary: String,
    bridge_port: u16,
}

impl TunnelCommand {
    /// Build the ssh command for `hostname` authenticating with `key_file`
    ///
    /// Forward specs are passed to ssh untouched; ssh reports bad syntax.
    pub fn build(
        hostname: &str,
        key_file: &Path,
        config: &SessionConfig,
        settings: &TunnelSettings,
    ) -> Self {
        let proxy = format!(
            "ProxyCommand={} --binary {}",
            shell_quote(&settings.relay_binary),
            settings.relay_url(hostname)
        );

        let mut args: Vec<OsString> = vec![
            "-o".into(),
            proxy.into(),
            "-o".into(),
            "StrictHostKeyChecking=no".into(),
            "-o".into(),
            "UserKnownHostsFile=/dev/null".into(),
            "-o".into(),
            "LogLevel=ERROR".into(),
            "-o".into(),
            "IdentitiesOnly=yes".into(),
            "-o".into(),
            "IdentityAgent=none".into(),
            "-i".into(),
            key_file.as_os_str().to_owned(),
        ];

        if let Some(spec) = config.local_forward.as_deref().filter(|s| !s.is_empty()) {
            args.push("-L".into());
            args.push(spec.into());
        }
        if let Some(spec) = config.remote_forward.as_deref().filter(|s| !s.is_empty()) {
            args.push("-R".into());
            args.push(spec.into());
        }

        args.push(format!("{}@localhost", settings.ssh_user).into());

        Self {
            program: PathBuf::from(&settings.ssh_binary),
            args,
            relay_binary: settings.relay_binary.clone(),
            bridge_port: settings.bridge_port,
        }
    }

    /// Run `program` instead of the configured ssh name
    ///
    /// Used with the path `check_binaries` resolved, so the binary that was
    /// checked is the one that runs.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Program that will be run
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments passed to the program
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Relay binary named in the ProxyCommand
    pub fn relay_binary(&self) -> &str {
        &self.relay_binary
    }

    /// Port the relay connects to
    pub fn bridge_port(&self) -> u16 {
        self.bridge_port
    }

    /// A `tokio::process::Command` wired to the controlling terminal
    pub fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        cmd
    }

    /// Shell-quoted command line for copy and paste
    pub fn display(&self) -> String {
        std::iter::once(self.program.to_string_lossy())
            .chain(self.args.iter().map(|a| a.to_string_lossy()))
            .map(|a| shell_quote(&a))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Quote `arg` for a POSIX shell if it needs it
fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r#"'"'"'"#))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(cmd: &TunnelCommand) -> Vec<String> {
        cmd.args()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_base_command() {
        let config = SessionConfig::new("abc123");
        let cmd = TunnelCommand::build(
            "vm-abc.example.live",
            Path::new("/tmp/key"),
            &config,
            &TunnelSettings::default(),
        );

        assert_eq!(cmd.program(), Path::new("ssh"));
        let args = args_of(&cmd);
        assert_eq!(
            &args[..2],
            &[
                "-o".to_string(),
                "ProxyCommand=websocat --binary wss://vm-abc.example.live:2222".to_string()
            ]
        );
        assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
        assert!(args.contains(&"UserKnownHostsFile=/dev/null".to_string()));
        assert!(args.contains(&"LogLevel=ERROR".to_string()));
        assert!(args.contains(&"IdentitiesOnly=yes".to_string()));
        assert!(!args.contains(&"-L".to_string()));
        assert!(!args.contains(&"-R".to_string()));
        assert_eq!(args.last().unwrap(), "root@localhost");
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "/tmp/key");
    }

    #[test]
    fn test_forwards_passed_through() {
        let config = SessionConfig {
            local_forward: Some("5432:localhost:5432".to_string()),
            remote_forward: Some("not even valid".to_string()),
            ..SessionConfig::new("abc123")
        };
        let cmd = TunnelCommand::build(
            "vm.example",
            Path::new("/tmp/key"),
            &config,
            &TunnelSettings::default(),
        );

        let args = args_of(&cmd);
        let l = args.iter().position(|a| a == "-L").unwrap();
        assert_eq!(args[l + 1], "5432:localhost:5432");
        let r = args.iter().position(|a| a == "-R").unwrap();
        assert_eq!(args[r + 1], "not even valid");
        assert!(l < r);
        assert_eq!(args.last().unwrap(), "root@localhost");
    }

    #[test]
    fn test_custom_settings() {
        let settings = TunnelSettings {
            ssh_binary: "/usr/bin/ssh".to_string(),
            relay_binary: "/opt/websocat".to_string(),
            bridge_port: 8022,
            ssh_user: "admin".to_string(),
        };
        let cmd = TunnelCommand::build(
            "vm.example",
            Path::new("/keys/id"),
            &SessionConfig::new("x"),
            &settings,
        );

        let args = args_of(&cmd);
        assert_eq!(cmd.program(), Path::new("/usr/bin/ssh"));
        assert_eq!(
            args[1],
            "ProxyCommand=/opt/websocat --binary wss://vm.example:8022"
        );
        assert_eq!(args.last().unwrap(), "admin@localhost");
        assert_eq!(cmd.bridge_port(), 8022);
        assert_eq!(cmd.relay_binary(), "/opt/websocat");
    }

    #[test]
    fn test_display_quotes_proxy_command() {
        let cmd = TunnelCommand::build(
            "vm.example",
            Path::new("/tmp/my key"),
            &SessionConfig::new("x"),
            &TunnelSettings::default(),
        );
        let line = cmd.display();
        assert!(line.starts_with("ssh -o 'ProxyCommand=websocat --binary wss://vm.example:2222'"));
        assert!(line.contains("-i '/tmp/my key'"));
        assert!(line.ends_with("root@localhost"));
    }

    #[test]
    fn test_relay_path_with_spaces_is_quoted() {
        let settings = TunnelSettings {
            relay_binary: "/opt/my tools/websocat".to_string(),
            ..Default::default()
        };
        let cmd = TunnelCommand::build(
            "vm.example",
            Path::new("/tmp/key"),
            &SessionConfig::new("x"),
            &settings,
        );

        let args = args_of(&cmd);
        assert_eq!(
            args[1],
            "ProxyCommand='/opt/my tools/websocat' --binary wss://vm.example:2222"
        );
        // still the unquoted name for error messages
        assert_eq!(cmd.relay_binary(), "/opt/my tools/websocat");
    }

    #[test]
    fn test_resolved_program_is_run() {
        let cmd = TunnelCommand::build(
            "vm.example",
            Path::new("/tmp/key"),
            &SessionConfig::new("x"),
            &TunnelSettings::default(),
        )
        .with_program("/usr/local/bin/ssh");

        assert_eq!(cmd.program(), Path::new("/usr/local/bin/ssh"));
        assert_eq!(cmd.to_command().as_std().get_program(), "/usr/local/bin/ssh");
        assert!(cmd.display().starts_with("/usr/local/bin/ssh -o "));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain-arg"), "plain-arg");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r#"'it'"'"'s'"#);
    }
}
