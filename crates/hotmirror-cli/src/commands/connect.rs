//! Connect command implementation.

use std::net::{IpAddr, SocketAddr};

use anyhow::{bail, Context, Result};
use tokio::sync::broadcast;

use hotmirror_core::config::Config;
use hotmirror_core::event;
use hotmirror_core::sync::{connection, SyncConfig, SyncController};

use super::ConnectArgs;
use crate::ui::{parse_duration, print_event};

/// Run the connect command.
pub async fn run(args: ConnectArgs) -> Result<()> {
    let config = super::load_config();

    let address = match &args.address {
        Some(address) => resolve_address(address, config.network.client_port),
        None => find_host(&config, &args).await?,
    };

    let mut sync_config = SyncConfig::from_config(&config);
    if let Some(sandbox) = args.sandbox {
        sync_config.sandbox_root = sandbox;
    }

    if !args.json {
        println!();
        println!("  Sandbox: {}", sync_config.sandbox_root.display());
        println!("  Press Ctrl+C to disconnect.");
        println!();
    }

    let (events_tx, mut events_rx) = event::channel();
    let json = args.json;
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            print_event(&event, json);
        }
    });

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("received Ctrl+C, disconnecting");
            let _ = shutdown_tx.send(());
        }
    });

    let mut controller = SyncController::new(sync_config, events_tx);
    let result = connection::connect(&mut controller, &address, shutdown_rx).await;

    drop(controller);
    if let Err(e) = printer.await {
        tracing::debug!(error = %e, "event printer task failed");
    }

    result.with_context(|| format!("Connection to {} failed", address))
}

/// Discover hosts and pick the first one.
async fn find_host(config: &Config, args: &ConnectArgs) -> Result<String> {
    let duration = match &args.duration {
        Some(d) => parse_duration(d)
            .context("Invalid duration format. Use formats like '500ms', '3s', '1m'")?,
        None => config.discovery.scan_duration,
    };

    if !args.json {
        println!();
        println!("  Looking for hosts...");
    }

    let hosts = super::scan::discover(config, duration).await?;
    let Some(host) = hosts.first() else {
        bail!(
            "No hosts found on the network.\n\
             Pass an address explicitly: hotmirror connect <ADDR>"
        );
    };

    if !args.json {
        println!("  Found {} ({})", host.id, host.address);
        if hosts.len() > 1 {
            println!(
                "  {} other host(s) available; run 'hotmirror scan' to list them.",
                hosts.len() - 1
            );
        }
    }

    Ok(host.address.to_string())
}

/// Add the default client port to a bare IP address.
fn resolve_address(input: &str, client_port: u16) -> String {
    let trimmed = input.trim();
    trimmed.parse::<IpAddr>().map_or_else(
        |_| trimmed.to_string(),
        |ip| SocketAddr::new(ip, client_port).to_string(),
    )
}
