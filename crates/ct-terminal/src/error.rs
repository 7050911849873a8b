//! Terminal error types

use ct_mux::MuxError;
use thiserror::Error;

/// Errors raised by the multiplexed terminal
#[derive(Error, Debug)]
pub enum TerminalError {
    /// Not a single session could be set up
    #[error("No sessions could be started")]
    NoSessions,

    /// Input was written after close
    #[error("Terminal is closed")]
    Closed,

    /// Teardown finished with non-benign failures
    #[error("Failed to close terminal: {}", failures.join("; "))]
    Close { failures: Vec<String> },
}

impl From<MuxError> for TerminalError {
    fn from(e: MuxError) -> Self {
        match e {
            MuxError::Closed => TerminalError::Closed,
            MuxError::Close { failures } => TerminalError::Close { failures },
        }
    }
}
