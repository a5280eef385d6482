//! Remote shell scripts
//!
//! Each script is a small struct with one field per value it interpolates,
//! rendered through `Display`. Values that end up inside single quotes go
//! through [`escape_single_quoted`].

use std::fmt;

/// Sentinel printed by the probe when both services are up
pub const RUNNING: &str = "RUNNING";

/// Sentinel printed by the probe otherwise
pub const NOT_RUNNING: &str = "NOT_RUNNING";

/// Escape `value` for use inside a single-quoted shell string
///
/// Each `'` becomes `'"'"'`: close the quote, emit a double-quoted `'`,
/// reopen.
pub fn escape_single_quoted(value: &str) -> String {
    value.replace('\'', r#"'"'"'"#)
}

/// Checks whether sshd and the relay are both RUNNING under supervisord
#[derive(Debug, Clone)]
pub struct ProbeScript<'a> {
    pub sshd_service: &'a str,
    pub relay_service: &'a str,
}

impl fmt::Display for ProbeScript<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"#!/bin/bash
sshd_status=$(supervisorctl status '{sshd}' 2>/dev/null | grep -c RUNNING || echo 0)
relay_status=$(supervisorctl status '{relay}' 2>/dev/null | grep -c RUNNING || echo 0)

if [ "$sshd_status" = "1" ] && [ "$relay_status" = "1" ]; then
    echo "{running}"
else
    echo "{not_running}"
fi
"#,
            sshd = escape_single_quoted(self.sshd_service),
            relay = escape_single_quoted(self.relay_service),
            running = RUNNING,
            not_running = NOT_RUNNING,
        )
    }
}

/// Appends a public key to root's authorized_keys
#[derive(Debug, Clone)]
pub struct KeyInjectScript<'a> {
    pub public_key: &'a str,
}

impl fmt::Display for KeyInjectScript<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mkdir -p /root/.ssh && chmod 700 /root/.ssh && echo '{}' >> /root/.ssh/authorized_keys && chmod 600 /root/.ssh/authorized_keys",
            escape_single_quoted(self.public_key.trim())
        )
    }
}

/// Installs, configures and starts sshd and the WebSocket relay
#[derive(Debug, Clone)]
pub struct SetupScript<'a> {
    pub public_key: &'a str,
    pub bridge_port: u16,
    pub sshd_service: &'a str,
    pub relay_service: &'a str,
    pub relay_download_url: &'a str,
    pub remote_relay_path: &'a str,
    pub sshd_config_name: &'a str,
}

impl fmt::Display for SetupScript<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"#!/bin/bash
set -e

echo "=== Setting up SSH services on VM ==="

if ! command -v sshd &>/dev/null; then
    echo "Installing openssh-server..."
    apt-get update -qq
    apt-get install -y --no-install-recommends openssh-server
fi

echo "Creating sshd directories..."
mkdir -p /run/sshd
chmod 755 /run/sshd

echo "Configuring sshd..."
mkdir -p /etc/ssh/sshd_config.d
cat > '/etc/ssh/sshd_config.d/{sshd_conf}' << 'SSHD_EOF'
GatewayPorts yes
TCPKeepAlive yes
PermitRootLogin prohibit-password
PasswordAuthentication no
PubkeyAuthentication yes
SSHD_EOF

if [ ! -x '{relay_path}' ]; then
    echo "Installing websocat..."
    curl -fsSL '{relay_url}' -o '{relay_path}'
    chmod +x '{relay_path}'
fi

mkdir -p /var/log/supervisord

echo "Creating supervisor configs..."
mkdir -p /etc/supervisor/conf.d/services
cat > '/etc/supervisor/conf.d/services/{sshd_quoted}.conf' << 'SUPER_EOF'
[program:{sshd}]
command=/usr/sbin/sshd -D -e
autostart=false
autorestart=true
startsecs=2
stdout_logfile=/var/log/supervisord/{sshd}
redirect_stderr=true
SUPER_EOF

cat > '/etc/supervisor/conf.d/services/{relay_quoted}.conf' << 'SUPER_EOF'
[program:{relay}]
command={relay_path} --binary ws-l:0.0.0.0:{port} tcp:127.0.0.1:22
autostart=false
autorestart=true
startsecs=2
stdout_logfile=/var/log/supervisord/{relay}
redirect_stderr=true
SUPER_EOF

echo "Injecting SSH public key..."
mkdir -p /root/.ssh && chmod 700 /root/.ssh
echo '{key}' >> /root/.ssh/authorized_keys
chmod 600 /root/.ssh/authorized_keys

if [ ! -f /etc/ssh/ssh_host_ed25519_key ]; then
    echo "Generating SSH host keys..."
    ssh-keygen -A
fi

echo "Starting SSH services..."
supervisorctl reread
supervisorctl update
supervisorctl start '{sshd_quoted}' '{relay_quoted}'

echo "=== SSH setup complete ==="
"#,
            sshd_conf = escape_single_quoted(self.sshd_config_name),
            relay_path = escape_single_quoted(self.remote_relay_path),
            relay_url = escape_single_quoted(self.relay_download_url),
            sshd = self.sshd_service,
            relay = self.relay_service,
            sshd_quoted = escape_single_quoted(self.sshd_service),
            relay_quoted = escape_single_quoted(self.relay_service),
            port = self.bridge_port,
            key = escape_single_quoted(self.public_key.trim()),
        )
    }
}
