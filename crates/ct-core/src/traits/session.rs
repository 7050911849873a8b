//! Session traits

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::SessionError;
use crate::types::TerminalSize;

/// Write end feeding a session's standard input
pub type InputPipe = Box<dyn AsyncWrite + Send + Unpin>;

/// Read end carrying a session's terminal output
pub type OutputPipe = Box<dyn AsyncRead + Send + Unpin>;

/// One remote shell execution context
#[async_trait]
pub trait ShellSession: Send + Sync {
    /// Request an interactive pseudo-terminal with input echo enabled
    async fn request_pty(&self, term: &str, size: TerminalSize) -> Result<(), SessionError>;

    /// Hand out the input/output pipes; succeeds once per session
    fn take_pipes(&self) -> Result<(InputPipe, OutputPipe), SessionError>;

    /// Start the remote shell and wait until it exits
    ///
    /// Returns the exit status when the remote side reported one.
    async fn run_shell(&self) -> Result<Option<u32>, SessionError>;

    /// Propagate a terminal size change
    async fn window_change(&self, size: TerminalSize) -> Result<(), SessionError>;

    /// Close the session
    ///
    /// Returns `SessionError::AlreadyClosed` when the session had already
    /// ended; callers treat that as success.
    async fn close(&self) -> Result<(), SessionError>;
}
