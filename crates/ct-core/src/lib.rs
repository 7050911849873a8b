//! ct-core: Core abstractions and configuration for cluster-term
//!
//! This crate provides the shared types, error taxonomy, session traits and
//! configuration structures used by the multiplexer, the SSH layer, the
//! multiplexed terminal and the CLI.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{is_benign_io, ConfigError, ConnectionError, SessionError};
pub use types::{HostName, TerminalSize};
