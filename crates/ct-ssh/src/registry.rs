//! Parallel connection orchestration
//!
//! Connects to many hosts at once and keeps the ones that succeeded.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::mpsc;

use ct_core::{ConnectionError, HostName};

use crate::connection::RemoteConnection;
use crate::descriptor::ConnectionDescriptor;
use crate::error::RegistryError;

/// Outcome of one connect attempt
#[derive(Debug)]
pub struct ConnectResult {
    pub host: HostName,
    /// Present on success
    pub connection: Option<Arc<RemoteConnection>>,
    /// Present on failure
    pub error: Option<ConnectionError>,
}

impl ConnectResult {
    pub fn is_success(&self) -> bool {
        self.connection.is_some()
    }
}

/// Connected hosts, keyed by host name
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<HostName, Arc<RemoteConnection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to every descriptor in parallel
    ///
    /// Yields exactly one result per descriptor, in completion order; the
    /// stream ends once every attempt has reported. Successful connections
    /// are registered under their host; an earlier entry for the same host
    /// is closed and replaced.
    pub fn connect_multiple(self: &Arc<Self>, descriptors: Vec<ConnectionDescriptor>) -> mpsc::Receiver<ConnectResult> {
        let (tx, rx) = mpsc::channel(descriptors.len().max(1));
        tracing::info!("Connecting to {} host(s)", descriptors.len());

        for descriptor in descriptors {
            let connection = Arc::new(RemoteConnection::new(descriptor));
            self.spawn_connect(connection, tx.clone());
        }

        rx
    }

    /// Same as [`connect_multiple`](Self::connect_multiple) for prepared connections
    pub fn connect_all(self: &Arc<Self>, connections: Vec<RemoteConnection>) -> mpsc::Receiver<ConnectResult> {
        let (tx, rx) = mpsc::channel(connections.len().max(1));
        for connection in connections {
            self.spawn_connect(Arc::new(connection), tx.clone());
        }
        rx
    }

    fn spawn_connect(self: &Arc<Self>, connection: Arc<RemoteConnection>, tx: mpsc::Sender<ConnectResult>) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let host = connection.host().clone();
            let result = match connection.connect().await {
                Ok(()) => {
                    registry.register(Arc::clone(&connection)).await;
                    ConnectResult {
                        host,
                        connection: Some(connection),
                        error: None,
                    }
                }
                Err(e) => {
                    tracing::warn!(%host, "Connection failed: {}", e);
                    ConnectResult {
                        host,
                        connection: None,
                        error: Some(e),
                    }
                }
            };
            if tx.send(result).await.is_err() {
                tracing::debug!("Result receiver dropped");
            }
        });
    }

    /// Register `connection` under its host, closing the one it replaces
    async fn register(&self, connection: Arc<RemoteConnection>) {
        let host = connection.host().clone();
        let Some(displaced) = self.connections.insert(host.clone(), connection) else {
            return;
        };
        tracing::debug!(%host, "Replacing earlier connection to the same host");
        if let Err(e) = displaced.close().await {
            tracing::warn!(%host, "Failed to close replaced connection: {}", e);
        }
    }

    pub fn get(&self, host: &HostName) -> Option<Arc<RemoteConnection>> {
        self.connections.get(host).map(|entry| Arc::clone(entry.value()))
    }

    /// Registered hosts, sorted
    pub fn hosts(&self) -> Vec<HostName> {
        let mut hosts: Vec<_> = self.connections.iter().map(|entry| entry.key().clone()).collect();
        hosts.sort();
        hosts
    }

    /// Registered connections in host order
    pub fn connections(&self) -> Vec<Arc<RemoteConnection>> {
        self.hosts().iter().filter_map(|host| self.get(host)).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Close every registered connection and clear the registry
    ///
    /// Individual failures do not stop the others; they are reported together.
    pub async fn close_all(&self) -> Result<(), RegistryError> {
        let connections: Vec<_> = self
            .connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.connections.clear();

        if connections.is_empty() {
            return Ok(());
        }
        tracing::info!("Closing {} connection(s)", connections.len());

        let results = join_all(connections.iter().map(|conn| conn.close())).await;
        let failures: Vec<String> = connections
            .iter()
            .zip(results)
            .filter_map(|(conn, result)| result.err().map(|e| format!("{}: {}", conn.host(), e)))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::Close { failures })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_one_result_per_descriptor() {
        let registry = Arc::new(ConnectionRegistry::new());
        let descriptors = vec![
            ConnectionDescriptor::new("a", "ops"),
            ConnectionDescriptor::new("b", "ops"),
            ConnectionDescriptor::new("c", "ops"),
        ];
        let connections = descriptors
            .into_iter()
            .map(|d| RemoteConnection::new(d).with_key_paths(Vec::new()))
            .collect();

        let mut rx = registry.connect_all(connections);
        let mut hosts = Vec::new();
        while let Some(result) = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap() {
            assert!(!result.is_success());
            assert!(matches!(result.error, Some(ConnectionError::NoAuthMethods { .. })));
            hosts.push(result.host.to_string());
        }
        hosts.sort();
        assert_eq!(hosts, ["a", "b", "c"]);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_empty_input_closes_stream() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut rx = registry.connect_multiple(Vec::new());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_all_on_empty_registry() {
        let registry = ConnectionRegistry::new();
        registry.close_all().await.unwrap();
        registry.close_all().await.unwrap();
        assert!(registry.hosts().is_empty());
    }
}
