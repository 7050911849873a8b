//! Core error types for cluster-term
//!
//! Shutdown races (double close, a session that already ended, a peer that
//! hung up first) are classified by kind through the `is_benign` helpers so
//! teardown paths can suppress them without matching on message text.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Connection-level errors, reported per host
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// TCP dial or SSH key exchange failed
    #[error("Failed to connect to {host}: {message}")]
    Dial { host: String, message: String },

    /// Handshake did not complete within the configured timeout
    #[error("Connection to {host} timed out after {timeout:?}")]
    Timeout { host: String, timeout: Duration },

    /// No key or password was available to try
    #[error("No authentication methods available for {host}")]
    NoAuthMethods { host: String },

    /// Every authentication candidate was rejected
    #[error("Authentication failed for {user}@{host}")]
    AuthenticationFailed { host: String, user: String },

    /// Operation requires an established connection
    #[error("Not connected")]
    NotConnected,

    /// Error reported by the SSH transport after the handshake
    #[error("SSH error: {0}")]
    Ssh(String),
}

impl ConnectionError {
    /// Whether this error only means the connection was already gone
    pub fn is_benign(&self) -> bool {
        matches!(self, ConnectionError::NotConnected)
    }
}

/// Session-level errors (session, pty and pipe setup, shell lifecycle)
#[derive(Error, Debug)]
pub enum SessionError {
    /// Opening the session channel failed
    #[error("Session setup failed: {0}")]
    Setup(String),

    /// Pseudo-terminal request failed or was rejected
    #[error("PTY request failed: {0}")]
    Pty(String),

    /// Input/output pipes could not be obtained
    #[error("Session pipes unavailable: {0}")]
    Pipes(String),

    /// Shell request failed or was rejected
    #[error("Shell request failed: {0}")]
    Shell(String),

    /// Window size change failed
    #[error("Window change failed: {0}")]
    WindowChange(String),

    /// Session has already ended or been closed
    #[error("Session already closed")]
    AlreadyClosed,

    /// Owning connection is not connected
    #[error("Not connected")]
    NotConnected,

    /// I/O error on a session stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SessionError {
    /// Whether this error only means the session was already gone
    pub fn is_benign(&self) -> bool {
        match self {
            SessionError::AlreadyClosed | SessionError::NotConnected => true,
            SessionError::Io(e) => is_benign_io(e),
            _ => false,
        }
    }
}

/// Whether an I/O error is end-of-stream class (peer gone, pipe closed)
pub fn is_benign_io(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
    )
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
