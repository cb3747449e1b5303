//! Scan command implementation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use hotmirror_core::config::Config;
use hotmirror_core::discovery::{
    DiscoveredHost, DiscoveryRegistry, DiscoverySettings, DiscoveryService,
};

use super::ScanArgs;
use crate::ui::{format_duration, parse_duration, truncate_string};

/// Run the scan command.
pub async fn run(args: ScanArgs) -> Result<()> {
    let config = super::load_config();

    let duration = match &args.duration {
        Some(d) => parse_duration(d)
            .context("Invalid duration format. Use formats like '500ms', '3s', '1m'")?,
        None => config.discovery.scan_duration,
    };

    if !args.json {
        println!();
        println!("Scanning for hosts ({})...", format_duration(duration));
        println!();
    }

    let hosts = discover(&config, duration).await?;

    if args.json {
        output_json_hosts(&hosts)?;
    } else {
        display_hosts(&hosts);
    }

    Ok(())
}

/// Listen for beacons for `duration` and return every host heard.
pub async fn discover(config: &Config, duration: Duration) -> Result<Vec<DiscoveredHost>> {
    let registry = DiscoveryRegistry::new(
        config.network.beacon_marker.clone(),
        config.network.client_port,
    )
    .shared();

    let service = DiscoveryService::start(
        DiscoverySettings::from_config(config),
        Arc::clone(&registry),
    )
    .context("Failed to start discovery listener")?;

    tokio::time::sleep(duration).await;
    service.shutdown().await;

    let hosts = registry.lock().await.hosts();
    Ok(hosts)
}

/// Output hosts as JSON.
fn output_json_hosts(hosts: &[DiscoveredHost]) -> Result<()> {
    let output = serde_json::json!({ "hosts": hosts });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Display hosts as text table.
fn display_hosts(hosts: &[DiscoveredHost]) {
    println!("Hosts on Network:");
    println!("{}", "─".repeat(60));
    println!("  {:24}  {:30}", "Host", "Address");
    println!("{}", "─".repeat(60));

    if hosts.is_empty() {
        println!("  (no hosts found)");
        println!("{}", "─".repeat(60));
        return;
    }

    for host in hosts {
        println!(
            "  {:24}  {:30}",
            truncate_string(&host.id, 24),
            host.address
        );
    }

    println!("{}", "─".repeat(60));
}
