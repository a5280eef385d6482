//! SSH key material for tunnel sessions
//!
//! A session either generates an ephemeral ed25519 key, written to a
//! self-deleting temp file, or borrows a caller-owned identity file and its
//! `.pub` sibling. Only ed25519 is ever generated.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use rand::rngs::OsRng;
use ssh_key::{Algorithm, HashAlg, LineEnding, PrivateKey, PublicKey};
use tempfile::TempPath;

use crate::error::KeyError;

/// Comment attached to generated public keys
const KEY_COMMENT: &str = "vm-tunnel-ephemeral";

/// Temp file name prefix for ephemeral private keys
const TEMP_KEY_PREFIX: &str = "vm-tunnel";

/// An SSH keypair in OpenSSH encodings
#[derive(Clone)]
pub struct KeyPair {
    /// Private key, OpenSSH PEM
    pub private_key_pem: String,
    /// Public key, `authorized_keys` line
    pub public_key_openssh: String,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("private_key_pem", &"<redacted>")
            .field("public_key_openssh", &self.public_key_openssh)
            .finish()
    }
}

/// Generate an ed25519 keypair suitable for OpenSSH
pub fn generate_key_pair() -> Result<KeyPair, KeyError> {
    let private = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).map_err(KeyError::Generate)?;

    let mut public = private.public_key().clone();
    public.set_comment(KEY_COMMENT);
    let public_key_openssh = public.to_openssh().map_err(KeyError::Encode)?;

    let private_key_pem = private
        .to_openssh(LineEnding::LF)
        .map_err(KeyError::Encode)?
        .to_string();

    Ok(KeyPair {
        private_key_pem,
        public_key_openssh: public_key_openssh.trim().to_string(),
    })
}

/// SHA256 fingerprint of an `authorized_keys` line, for logging
pub fn fingerprint(public_key_openssh: &str) -> Option<String> {
    PublicKey::from_openssh(public_key_openssh.trim())
        .ok()
        .map(|key| key.fingerprint(HashAlg::Sha256).to_string())
}

/// A private key written to a temp file, deleted when dropped
#[derive(Debug)]
pub struct TempKeyFile {
    path: TempPath,
}

impl TempKeyFile {
    /// Path to the key file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write `private_key_pem` to a fresh owner-only temp file
///
/// The file is created with mode 0600 and that mode is set again before any
/// key bytes are written. `session_label` becomes part of the file name.
pub fn write_temp_key(private_key_pem: &str, session_label: &str) -> Result<TempKeyFile, KeyError> {
    let prefix = format!("{}-{}-", TEMP_KEY_PREFIX, sanitize_label(session_label));

    let mut file = tempfile::Builder::new()
        .prefix(&prefix)
        .tempfile()
        .map_err(|source| KeyError::TempFile {
            action: "create temp",
            source,
        })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|source| KeyError::TempFile {
                action: "set permissions on",
                source,
            })?;
    }

    file.write_all(private_key_pem.as_bytes())
        .and_then(|_| file.as_file().sync_all())
        .map_err(|source| KeyError::TempFile {
            action: "write",
            source,
        })?;

    // Dropping the handle keeps the path; TempPath removes it on drop
    let path = file.into_temp_path();
    tracing::debug!("Temp key file: {}", path.display());

    Ok(TempKeyFile { path })
}

/// Keep a label usable as part of a file name
fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();

    if cleaned.is_empty() {
        "session".to_string()
    } else {
        cleaned
    }
}

/// Path of the `.pub` sibling of a private key
pub fn public_key_path(identity_file: &Path) -> PathBuf {
    let mut path = identity_file.as_os_str().to_owned();
    path.push(".pub");
    PathBuf::from(path)
}

/// Read the public key belonging to a caller-supplied identity
///
/// The private key must be owner-only. The caller's files are only read,
/// never modified.
pub fn load_public_key(identity_file: &Path) -> Result<String, KeyError> {
    if !identity_file.exists() {
        return Err(KeyError::Read {
            path: identity_file.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        });
    }
    ensure_owner_only(identity_file)?;

    let pub_path = public_key_path(identity_file);
    let content = match fs::read_to_string(&pub_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(KeyError::MissingPublicKey(pub_path));
        }
        Err(source) => {
            return Err(KeyError::Read {
                path: pub_path,
                source,
            })
        }
    };

    let line = content.trim();
    PublicKey::from_openssh(line).map_err(|source| KeyError::InvalidPublicKey {
        path: pub_path.clone(),
        source,
    })?;

    Ok(line.to_string())
}

/// Refuse private keys readable by group or others
///
/// ssh rejects such keys itself, but only after the VM has been set up and
/// with a generic exit 255.
#[cfg(unix)]
fn ensure_owner_only(path: &Path) -> Result<(), KeyError> {
    use std::os::unix::fs::PermissionsExt;
    let meta = fs::metadata(path).map_err(|source| KeyError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mode = meta.permissions().mode() & 0o777;
    if mode & 0o077 != 0 {
        return Err(KeyError::TooOpen {
            path: path.to_path_buf(),
            mode,
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn ensure_owner_only(_path: &Path) -> Result<(), KeyError> {
    Ok(())
}

/// The key a session authenticates with
#[derive(Debug)]
pub enum Identity {
    /// Generated for this session; the file goes away with this value
    Ephemeral {
        key_file: TempKeyFile,
        public_key: String,
    },
    /// Owned by the caller
    Provided {
        key_path: PathBuf,
        public_key: String,
    },
}

impl Identity {
    /// Load `identity_file` if given, otherwise generate an ephemeral key
    pub fn prepare(identity_file: Option<&Path>, session_label: &str) -> Result<Self, KeyError> {
        match identity_file {
            Some(path) => {
                tracing::info!("Using SSH key: {}", path.display());
                let public_key = load_public_key(path)?;
                Ok(Identity::Provided {
                    key_path: path.to_path_buf(),
                    public_key,
                })
            }
            None => {
                tracing::info!("Generating ephemeral SSH keypair");
                let pair = generate_key_pair()?;
                let key_file = write_temp_key(&pair.private_key_pem, session_label)?;
                tracing::debug!(
                    "Ephemeral key {} at {:?}",
                    fingerprint(&pair.public_key_openssh).unwrap_or_default(),
                    key_file.path()
                );
                Ok(Identity::Ephemeral {
                    key_file,
                    public_key: pair.public_key_openssh,
                })
            }
        }
    }

    /// Private key path to hand to ssh
    pub fn key_path(&self) -> &Path {
        match self {
            Identity::Ephemeral { key_file, .. } => key_file.path(),
            Identity::Provided { key_path, .. } => key_path,
        }
    }

    /// Public key to authorize on the VM
    pub fn public_key(&self) -> &str {
        match self {
            Identity::Ephemeral { public_key, .. } | Identity::Provided { public_key, .. } => {
                public_key
            }
        }
    }

    /// Whether the key file is removed when the session ends
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Identity::Ephemeral { .. })
    }
}
