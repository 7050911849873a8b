//! Connection traits

use std::sync::Arc;

use async_trait::async_trait;

use super::ShellSession;
use crate::error::SessionError;
use crate::types::HostName;

/// An authenticated link to one remote host that can open shell sessions
///
/// The multiplexed terminal only sees this trait, so it can be driven by
/// real SSH connections or by in-memory fakes.
#[async_trait]
pub trait RemoteHost: Send + Sync {
    /// Host this connection was opened against
    fn host(&self) -> &HostName;

    /// Whether the most recent handshake succeeded and the link is still held
    async fn is_connected(&self) -> bool;

    /// Open a new session bound to this connection
    async fn create_session(&self) -> Result<Arc<dyn ShellSession>, SessionError>;
}
