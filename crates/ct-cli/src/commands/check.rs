//! Check command: connect to every host, report, disconnect

use std::sync::Arc;

use anyhow::Result;

use ct_core::config::ClientConfig;
use ct_ssh::ConnectionRegistry;

use crate::commands::connect::prepare_target;
use crate::commands::ConnectArgs;
use crate::output::{format_results, print_error, print_host_key_notice, print_progress};
use crate::progress::collect_connections;

/// Report which hosts accept the connection without opening shells
pub async fn check_command(args: &ConnectArgs, config: &ClientConfig) -> Result<()> {
    let target = prepare_target(args, config).await?;
    let total = target.hosts.len();

    print_host_key_notice();

    let registry = Arc::new(ConnectionRegistry::new());
    let results = registry.connect_multiple(target.descriptors());
    let collected = collect_connections(results, &target.hosts, |result, reported| {
        print_progress(result, reported, total)
    })
    .await;

    println!("{}", format_results(&collected.outcomes));

    if let Err(e) = registry.close_all().await {
        print_error(&format!("Failed to close connections: {}", e));
    }

    if collected.connections.is_empty() {
        anyhow::bail!("No host accepted the connection");
    }
    Ok(())
}
