//! Connect command implementation

use std::sync::Arc;

use anyhow::{Context, Result};

use ct_core::config::ClientConfig;
use ct_core::traits::RemoteHost;
use ct_ssh::ConnectionRegistry;
use ct_terminal::{MultiplexedTerminal, TerminalOptions};

use crate::commands::ConnectArgs;
use crate::credentials::{self, Target};
use crate::output::{print_error, print_event, print_host_key_notice, print_info, print_progress, print_success, print_warning};
use crate::progress::collect_connections;
use crate::surface::{self, SurfaceExit};

/// Resolve the target and ask for a password when nothing else can authenticate
pub(crate) async fn prepare_target(args: &ConnectArgs, config: &ClientConfig) -> Result<Target> {
    let mut target = credentials::resolve(args, config)?;

    if credentials::needs_prompt(args, &target) {
        let prompt = format!("Password for {}: ", target.credentials.username);
        let password = tokio::task::spawn_blocking(move || credentials::prompt_password(&prompt))
            .await
            .context("Password prompt task failed")??;
        target.credentials.password = password;
    }

    Ok(target)
}

/// Connect to every host and run one interactive terminal over the survivors
pub async fn connect_command(args: &ConnectArgs, config: &ClientConfig) -> Result<()> {
    let target = prepare_target(args, config).await?;
    let total = target.hosts.len();

    print_host_key_notice();
    print_info(&format!("Connecting to {} host(s)...", total));

    let registry = Arc::new(ConnectionRegistry::new());
    let results = registry.connect_multiple(target.descriptors());
    let collected = collect_connections(results, &target.hosts, |result, reported| {
        print_progress(result, reported, total)
    })
    .await;

    if collected.connections.is_empty() {
        anyhow::bail!("No host accepted the connection");
    }
    let failed = total - collected.connections.len();
    if failed > 0 {
        print_warning(&format!("Continuing without {} unreachable host(s)", failed));
    }

    let mut options = TerminalOptions {
        term: target.term.clone(),
        completion_window: target.completion_window,
        ..TerminalOptions::default()
    };
    if let Some(size) = surface::local_size() {
        options.size = size;
    }

    let hosts: Vec<Arc<dyn RemoteHost>> = collected
        .connections
        .into_iter()
        .map(|c| c as Arc<dyn RemoteHost>)
        .collect();
    let terminal = match MultiplexedTerminal::new(hosts, options).await {
        Ok(terminal) => terminal,
        Err(e) => {
            registry.close_all().await.ok();
            return Err(e).context("Failed to start remote shells");
        }
    };
    let mut events = terminal.events();

    print_info(&format!(
        "Typing into {} session(s). Press Ctrl+] to detach",
        terminal.session_count()
    ));

    let outcome = surface::run(&terminal).await;

    if let Err(e) = terminal.close().await {
        print_error(&format!("Failed to close sessions: {}", e));
    }
    if let Err(e) = registry.close_all().await {
        print_error(&format!("Failed to close connections: {}", e));
    }

    if let Some(events) = events.as_mut() {
        while let Ok(event) = events.try_recv() {
            print_event(&event);
        }
    }

    match outcome? {
        SurfaceExit::Detached => print_success("Detached from all sessions"),
        SurfaceExit::OutputEnded => print_success("All sessions ended"),
    }
    Ok(())
}
