//! Multiplexer error types

use thiserror::Error;

/// Errors raised by the fan-out/fan-in halves
#[derive(Error, Debug)]
pub enum MuxError {
    /// The multiplexer was closed
    #[error("Multiplexer is closed")]
    Closed,

    /// Closing one or more pipes failed with a non-benign error
    #[error("Failed to close {} pipe(s): {}", failures.len(), failures.join("; "))]
    Close { failures: Vec<String> },
}
