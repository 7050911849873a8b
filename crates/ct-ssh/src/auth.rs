//! Authentication candidate selection

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use russh_keys::key::KeyPair;

use crate::descriptor::ConnectionDescriptor;

/// One authentication method to try, in priority order
pub enum AuthCandidate {
    /// A decoded private key
    PublicKey {
        /// Where the key came from, for logs
        label: String,
        key: Arc<KeyPair>,
    },
    /// The descriptor's password
    Password,
    /// Keyboard-interactive, answering every prompt with the password
    KeyboardInteractive,
}

impl AuthCandidate {
    /// Short method name for logs
    pub fn method(&self) -> &'static str {
        match self {
            AuthCandidate::PublicKey { .. } => "publickey",
            AuthCandidate::Password => "password",
            AuthCandidate::KeyboardInteractive => "keyboard-interactive",
        }
    }
}

impl fmt::Debug for AuthCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthCandidate::PublicKey { label, .. } => write!(f, "PublicKey({})", label),
            other => f.write_str(other.method()),
        }
    }
}

/// Private keys tried when the caller did not supply one
pub fn default_key_paths() -> Vec<PathBuf> {
    let Some(home) = dirs::home_dir() else {
        return Vec::new();
    };
    ["id_ed25519", "id_ecdsa", "id_rsa"]
        .iter()
        .map(|name| home.join(".ssh").join(name))
        .collect()
}

/// Assemble the candidates for `descriptor`
///
/// Order: supplied key, password, keyboard-interactive, then keys from
/// `default_paths` (only when no key was supplied). An empty password adds
/// no password-based candidates. Keys that fail to load are skipped.
pub fn auth_candidates(descriptor: &ConnectionDescriptor, default_paths: &[PathBuf]) -> Vec<AuthCandidate> {
    let mut candidates = Vec::new();
    let host = descriptor.host();

    if let Some(raw) = descriptor.private_key() {
        match decode_key(raw) {
            Ok(key) => candidates.push(AuthCandidate::PublicKey {
                label: "supplied key".to_string(),
                key: Arc::new(key),
            }),
            Err(e) => tracing::debug!(%host, "Skipping supplied key: {}", e),
        }
    }

    if !descriptor.password().is_empty() {
        candidates.push(AuthCandidate::Password);
        candidates.push(AuthCandidate::KeyboardInteractive);
    }

    if descriptor.private_key().is_none() {
        for path in default_paths.iter().filter(|p| p.exists()) {
            match load_key(path) {
                Ok(key) => candidates.push(AuthCandidate::PublicKey {
                    label: path.display().to_string(),
                    key: Arc::new(key),
                }),
                Err(e) => tracing::debug!(%host, "Skipping key {}: {}", path.display(), e),
            }
        }
    }

    candidates
}

fn decode_key(raw: &[u8]) -> Result<KeyPair, String> {
    let text = std::str::from_utf8(raw).map_err(|_| "key is not valid UTF-8".to_string())?;
    russh_keys::decode_secret_key(text, None).map_err(|e| e.to_string())
}

fn load_key(path: &Path) -> Result<KeyPair, String> {
    russh_keys::load_secret_key(path, None).map_err(|e| e.to_string())
}
