//! ct-ssh: SSH connections for cluster-term
//!
//! This crate opens authenticated SSH connections to many hosts in parallel
//! and exposes interactive shell sessions over them:
//! - [`ConnectionDescriptor`]: immutable per-host connection parameters
//! - [`RemoteConnection`]: one authenticated client plus its active session
//! - [`SshSession`]: a shell channel exposed as input/output pipes
//! - [`ConnectionRegistry`]: parallel connect with a per-host result stream
//!
//! Host identity is not verified, see [`HOST_KEY_VERIFICATION_DISABLED`].

pub mod auth;
pub mod connection;
pub mod descriptor;
pub mod error;
pub mod registry;
pub mod session;

pub use auth::{auth_candidates, default_key_paths, AuthCandidate};
pub use connection::{RemoteConnection, HOST_KEY_VERIFICATION_DISABLED};
pub use descriptor::{ConnectionDescriptor, Credentials, DEFAULT_CONNECT_TIMEOUT, DEFAULT_SSH_PORT};
pub use error::{is_benign_ssh, RegistryError};
pub use registry::{ConnectResult, ConnectionRegistry};
pub use session::SshSession;
