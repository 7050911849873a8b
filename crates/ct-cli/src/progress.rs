//! Connect progress collection

use std::sync::Arc;

use tokio::sync::mpsc;

use ct_core::HostName;
use ct_ssh::{ConnectResult, RemoteConnection};

/// Final state of one host after the connect phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOutcome {
    pub host: HostName,
    /// Failure message; `None` when connected
    pub error: Option<String>,
}

impl HostOutcome {
    pub fn is_connected(&self) -> bool {
        self.error.is_none()
    }
}

/// Connections that succeeded plus every host's outcome
pub struct Collected {
    /// Successful connections, in the order the hosts were requested
    pub connections: Vec<Arc<RemoteConnection>>,
    /// One outcome per result, in the order the hosts were requested
    pub outcomes: Vec<HostOutcome>,
}

/// Drain the result stream, calling `on_result` as each host reports
///
/// `on_result` receives the result and how many hosts have reported so far.
/// Both returned lists follow `order`, so the last requested host that
/// connected becomes the last terminal session.
pub async fn collect_connections<F>(
    mut results: mpsc::Receiver<ConnectResult>,
    order: &[HostName],
    mut on_result: F,
) -> Collected
where
    F: FnMut(&ConnectResult, usize),
{
    let mut connections = Vec::new();
    let mut outcomes = Vec::new();
    let mut reported = 0;

    while let Some(result) = results.recv().await {
        reported += 1;
        on_result(&result, reported);

        outcomes.push(HostOutcome {
            host: result.host.clone(),
            error: result.error.as_ref().map(ToString::to_string),
        });
        if let Some(connection) = result.connection {
            connections.push(connection);
        }
    }

    let rank = |host: &HostName| order.iter().position(|h| h == host).unwrap_or(usize::MAX);
    connections.sort_by_key(|c| rank(c.host()));
    outcomes.sort_by_key(|o| rank(&o.host));

    Collected {
        connections,
        outcomes,
    }
}
