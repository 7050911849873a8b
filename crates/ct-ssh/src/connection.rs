//! Authenticated SSH connection to one host

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Handle, KeyboardInteractiveAuthResponse};
use russh::Disconnect;
use russh_keys::key::PublicKey;
use tokio::sync::Mutex;

use ct_core::traits::{RemoteHost, ShellSession};
use ct_core::{ConnectionError, HostName, SessionError};

use crate::auth::{auth_candidates, default_key_paths, AuthCandidate};
use crate::descriptor::ConnectionDescriptor;
use crate::error::is_benign_ssh;
use crate::session::SshSession;

/// Server host keys are accepted without verification.
///
/// Every connection logs the presented fingerprint at `warn` level, and the
/// CLI prints a notice before connecting.
pub const HOST_KEY_VERIFICATION_DISABLED: bool = true;

/// Upper bound on keyboard-interactive challenge rounds
const MAX_KEYBOARD_INTERACTIVE_ROUNDS: usize = 8;

/// russh client callbacks
pub struct ClientHandler {
    host: HostName,
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        tracing::warn!(
            host = %self.host,
            "Accepting unverified host key {}",
            server_public_key.fingerprint()
        );
        Ok(true)
    }
}

struct ConnectionState {
    client: Option<Arc<Handle<ClientHandler>>>,
    session: Option<Arc<SshSession>>,
    connected: bool,
    last_error: Option<String>,
    /// Bumped by `close`; work started under an older epoch is discarded
    epoch: u64,
}

/// One host's SSH client and its active session
///
/// `connected` is true exactly when a client handle is held and the most
/// recent handshake succeeded. The state lock is never held across network
/// I/O; handshakes are serialized by a separate lock.
pub struct RemoteConnection {
    descriptor: ConnectionDescriptor,
    key_paths: Vec<PathBuf>,
    state: Mutex<ConnectionState>,
    connecting: Mutex<()>,
}

impl RemoteConnection {
    /// Create an unconnected connection for `descriptor`
    pub fn new(descriptor: ConnectionDescriptor) -> Self {
        Self {
            descriptor,
            key_paths: default_key_paths(),
            state: Mutex::new(ConnectionState {
                client: None,
                session: None,
                connected: false,
                last_error: None,
                epoch: 0,
            }),
            connecting: Mutex::new(()),
        }
    }

    /// Replace the on-disk keys tried when the descriptor carries none
    pub fn with_key_paths(mut self, key_paths: Vec<PathBuf>) -> Self {
        self.key_paths = key_paths;
        self
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn host(&self) -> &HostName {
        self.descriptor.host()
    }

    /// Dial, exchange keys and authenticate within the descriptor timeout
    ///
    /// A no-op when already connected. A `close` that lands while the
    /// handshake is in flight wins: the new client is disconnected and
    /// `NotConnected` is returned.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let _connecting = self.connecting.lock().await;
        let epoch = {
            let state = self.state.lock().await;
            if state.connected {
                return Ok(());
            }
            state.epoch
        };

        let result = self.handshake().await;

        let mut state = self.state.lock().await;
        match result {
            Ok(client) if state.epoch != epoch => {
                drop(state);
                tracing::debug!(host = %self.host(), "Closed while connecting, dropping new client");
                let _ = client.disconnect(Disconnect::ByApplication, "", "en").await;
                Err(ConnectionError::NotConnected)
            }
            Ok(client) => {
                tracing::info!(host = %self.host(), "Connected as {}", self.descriptor.username());
                state.client = Some(Arc::new(client));
                state.connected = true;
                state.last_error = None;
                Ok(())
            }
            Err(e) => {
                tracing::debug!(host = %self.host(), "Connect failed: {}", e);
                state.connected = false;
                state.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn handshake(&self) -> Result<Handle<ClientHandler>, ConnectionError> {
        let candidates = auth_candidates(&self.descriptor, &self.key_paths);
        if candidates.is_empty() {
            return Err(ConnectionError::NoAuthMethods {
                host: self.host().to_string(),
            });
        }

        let timeout = self.descriptor.timeout();
        tokio::time::timeout(timeout, self.dial_and_authenticate(&candidates))
            .await
            .map_err(|_| ConnectionError::Timeout {
                host: self.host().to_string(),
                timeout,
            })?
    }

    async fn dial_and_authenticate(
        &self,
        candidates: &[AuthCandidate],
    ) -> Result<Handle<ClientHandler>, ConnectionError> {
        let host = self.host();
        let config = Arc::new(client::Config::default());
        let handler = ClientHandler { host: host.clone() };

        tracing::debug!(%host, "Dialing {}", self.descriptor.address());
        let mut client = client::connect(config, (host.as_str(), self.descriptor.port()), handler)
            .await
            .map_err(|e| ConnectionError::Dial {
                host: host.to_string(),
                message: e.to_string(),
            })?;

        for candidate in candidates {
            let accepted = self
                .try_candidate(&mut client, candidate)
                .await
                .map_err(|e| ConnectionError::Ssh(e.to_string()))?;
            if accepted {
                tracing::debug!(%host, method = candidate.method(), "Authenticated");
                return Ok(client);
            }
            tracing::debug!(%host, "Rejected: {:?}", candidate);
        }

        let _ = client.disconnect(Disconnect::ByApplication, "", "en").await;
        Err(ConnectionError::AuthenticationFailed {
            host: host.to_string(),
            user: self.descriptor.username().to_string(),
        })
    }

    async fn try_candidate(
        &self,
        client: &mut Handle<ClientHandler>,
        candidate: &AuthCandidate,
    ) -> Result<bool, russh::Error> {
        let user = self.descriptor.username();
        match candidate {
            AuthCandidate::PublicKey { key, .. } => {
                client.authenticate_publickey(user, Arc::clone(key)).await
            }
            AuthCandidate::Password => {
                client.authenticate_password(user, self.descriptor.password()).await
            }
            AuthCandidate::KeyboardInteractive => self.keyboard_interactive(client).await,
        }
    }

    /// Answer every prompt with the password
    async fn keyboard_interactive(&self, client: &mut Handle<ClientHandler>) -> Result<bool, russh::Error> {
        let password = self.descriptor.password();
        let mut response = client
            .authenticate_keyboard_interactive_start(self.descriptor.username(), None::<String>)
            .await?;

        for _ in 0..MAX_KEYBOARD_INTERACTIVE_ROUNDS {
            match response {
                KeyboardInteractiveAuthResponse::Success => return Ok(true),
                KeyboardInteractiveAuthResponse::Failure => return Ok(false),
                KeyboardInteractiveAuthResponse::InfoRequest { prompts, .. } => {
                    let answers = prompts.iter().map(|_| password.to_string()).collect();
                    response = client.authenticate_keyboard_interactive_respond(answers).await?;
                }
            }
        }
        Ok(false)
    }

    /// Open a shell session on the authenticated client
    pub async fn open_session(&self) -> Result<Arc<SshSession>, SessionError> {
        let (client, epoch) = {
            let state = self.state.lock().await;
            if !state.connected {
                return Err(SessionError::NotConnected);
            }
            let client = state.client.as_ref().ok_or(SessionError::NotConnected)?;
            (Arc::clone(client), state.epoch)
        };

        let channel = client
            .channel_open_session()
            .await
            .map_err(|e| SessionError::Setup(e.to_string()))?;
        tracing::debug!(host = %self.host(), "Session channel opened");
        let session = SshSession::spawn(self.host().clone(), channel);

        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            drop(state);
            let _ = session.close().await;
            return Err(SessionError::NotConnected);
        }
        state.session = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Whether the handshake succeeded and the transport is still up
    pub async fn is_connected(&self) -> bool {
        let state = self.state.lock().await;
        state.connected && state.client.as_ref().is_some_and(|c| !c.is_closed())
    }

    /// Most recent connect failure, if any
    pub async fn last_error(&self) -> Option<String> {
        self.state.lock().await.last_error.clone()
    }

    /// Close the active session, then disconnect
    ///
    /// Either may be absent. Already-closed conditions count as success and a
    /// second call is a no-op.
    pub async fn close(&self) -> Result<(), ConnectionError> {
        let mut state = self.state.lock().await;
        let session = state.session.take();
        let client = state.client.take();
        state.connected = false;
        state.epoch += 1;
        drop(state);

        let host = self.host();
        let mut failure = None;

        if let Some(session) = session {
            match session.close().await {
                Ok(()) => {}
                Err(e) if e.is_benign() => tracing::debug!(%host, "Session already closed"),
                Err(e) => {
                    tracing::warn!(%host, "Failed to close session: {}", e);
                    failure = Some(ConnectionError::Ssh(e.to_string()));
                }
            }
        }

        if let Some(client) = client {
            match client.disconnect(Disconnect::ByApplication, "", "en").await {
                Ok(()) => tracing::debug!(%host, "Disconnected"),
                Err(e) if is_benign_ssh(&e) => tracing::debug!(%host, "Transport already gone"),
                Err(e) => {
                    tracing::warn!(%host, "Failed to disconnect: {}", e);
                    failure.get_or_insert(ConnectionError::Ssh(e.to_string()));
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for RemoteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConnection")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RemoteHost for RemoteConnection {
    fn host(&self) -> &HostName {
        self.descriptor.host()
    }

    async fn is_connected(&self) -> bool {
        RemoteConnection::is_connected(self).await
    }

    async fn create_session(&self) -> Result<Arc<dyn ShellSession>, SessionError> {
        let session: Arc<dyn ShellSession> = self.open_session().await?;
        Ok(session)
    }
}
