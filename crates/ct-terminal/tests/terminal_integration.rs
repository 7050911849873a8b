//! Multiplexed terminal over real SSH sessions

#[path = "../../ct-ssh/tests/common/mod.rs"]
mod common;

use std::sync::Arc;
use std::time::Duration;

use ct_core::traits::RemoteHost;
use ct_core::{HostName, TerminalSize};
use ct_ssh::{ConnectionDescriptor, ConnectionRegistry, RemoteConnection};
use ct_terminal::{MultiplexedTerminal, SessionEvent, TerminalOptions};

fn connection(host: &str, port: u16, password: &str) -> RemoteConnection {
    let descriptor = ConnectionDescriptor::new(host, common::USER)
        .with_port(port)
        .with_password(password)
        .with_timeout(Duration::from_secs(10));
    RemoteConnection::new(descriptor).with_key_paths(Vec::new())
}

#[tokio::test]
async fn test_terminal_over_surviving_hosts() {
    let (addr, recorder) = common::spawn_server().await;
    let port = addr.port();

    let registry = Arc::new(ConnectionRegistry::new());
    let mut rx = registry.connect_all(vec![
        connection("127.0.0.1", port, common::PASSWORD),
        connection("127.0.0.1", port, "wrong"),
        connection("localhost", port, common::PASSWORD),
    ]);

    let mut survivors: Vec<Arc<dyn RemoteHost>> = Vec::new();
    let mut results = 0;
    while let Some(result) = tokio::time::timeout(Duration::from_secs(20), rx.recv()).await.unwrap() {
        results += 1;
        if let Some(conn) = result.connection {
            survivors.push(conn);
        }
    }
    assert_eq!(results, 3);
    survivors.sort_by(|a, b| a.host().cmp(b.host()));

    let terminal = MultiplexedTerminal::new(survivors, TerminalOptions::default())
        .await
        .unwrap();
    assert_eq!(terminal.session_count(), 2);
    assert_eq!(
        terminal.hosts(),
        vec![HostName::new("127.0.0.1"), HostName::new("localhost")]
    );
    let mut events = terminal.events().unwrap();

    // Each shell greets with a prompt
    let mut greeted = Vec::new();
    while greeted.len() < 2 {
        let chunk = tokio::time::timeout(Duration::from_secs(5), terminal.recv_chunk())
            .await
            .unwrap()
            .unwrap();
        if chunk.data.starts_with(common::PROMPT) && !greeted.contains(&chunk.index) {
            greeted.push(chunk.index);
        }
    }

    terminal.write(b"ping\r").unwrap();
    let mut echoed = Vec::new();
    while echoed.len() < 2 {
        let chunk = tokio::time::timeout(Duration::from_secs(5), terminal.recv_chunk())
            .await
            .unwrap()
            .unwrap();
        if chunk.data.windows(4).any(|w| w == b"ping") && !echoed.contains(&chunk.index) {
            echoed.push(chunk.index);
        }
    }

    assert_eq!(terminal.propagate_resize(TerminalSize::new(40, 120)).await.len(), 2);

    terminal.write(b"exit\r").unwrap();
    let mut ended = 0;
    while ended < 2 {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        if let SessionEvent::Ended { exit_status, .. } = event {
            assert_eq!(exit_status, Some(0));
            ended += 1;
        }
    }
    assert_eq!(terminal.active_count(), 0);
    assert_eq!(recorder.ptys.lock().len(), 2);
    assert_eq!(recorder.resizes.lock().len(), 2);

    terminal.close().await.unwrap();
    terminal.close().await.unwrap();
    registry.close_all().await.unwrap();
}
