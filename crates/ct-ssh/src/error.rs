//! SSH layer error types

use thiserror::Error;

use ct_core::is_benign_io;

/// Errors from bulk registry operations
#[derive(Error, Debug)]
pub enum RegistryError {
    /// One or more connections failed to close cleanly
    #[error("Failed to close {} connection(s): {}", failures.len(), failures.join("; "))]
    Close { failures: Vec<String> },
}

/// Whether a russh error only means the transport was already gone
pub fn is_benign_ssh(error: &russh::Error) -> bool {
    match error {
        russh::Error::Disconnect | russh::Error::HUP | russh::Error::SendError => true,
        russh::Error::IO(e) => is_benign_io(e),
        _ => false,
    }
}
