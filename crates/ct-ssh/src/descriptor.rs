//! Per-host connection parameters

use std::fmt;
use std::time::Duration;

use ct_core::HostName;

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default bound on TCP dial, key exchange and authentication
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything needed to reach and authenticate against one host
///
/// Immutable once built; secrets are redacted from `Debug` output.
#[derive(Clone)]
pub struct ConnectionDescriptor {
    host: HostName,
    port: u16,
    username: String,
    password: String,
    private_key: Option<Vec<u8>>,
    timeout: Duration,
}

impl ConnectionDescriptor {
    /// Create a descriptor with the default port and timeout and no secrets
    pub fn new(host: impl Into<HostName>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            username: username.into(),
            password: String::new(),
            private_key: None,
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the password (also used for keyboard-interactive prompts)
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set raw private key bytes (PEM or OpenSSH format)
    pub fn with_private_key(mut self, key: Vec<u8>) -> Self {
        self.private_key = Some(key);
        self
    }

    /// Set the handshake timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn host(&self) -> &HostName {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn private_key(&self) -> Option<&[u8]> {
        self.private_key.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `host:port` for log lines
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "<redacted>" })
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Credentials shared by every host in one connect attempt
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Raw private key bytes
    pub private_key: Option<Vec<u8>>,
    /// Whether `private_key` should be offered at all
    pub use_key: bool,
}

impl Credentials {
    /// Build one descriptor per host, in host order
    pub fn descriptors_for<I, H>(&self, hosts: I, port: u16, timeout: Duration) -> Vec<ConnectionDescriptor>
    where
        I: IntoIterator<Item = H>,
        H: Into<HostName>,
    {
        hosts
            .into_iter()
            .map(|host| {
                let mut descriptor = ConnectionDescriptor::new(host, self.username.clone())
                    .with_port(port)
                    .with_password(self.password.clone())
                    .with_timeout(timeout);
                if self.use_key {
                    if let Some(key) = &self.private_key {
                        descriptor = descriptor.with_private_key(key.clone());
                    }
                }
                descriptor
            })
            .collect()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("use_key", &self.use_key)
            .finish_non_exhaustive()
    }
}
