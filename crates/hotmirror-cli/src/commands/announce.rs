//! Announce command implementation.
//!
//! Sends the same beacons a host does, which makes it possible to check
//! discovery between two machines without running a host.

use anyhow::{Context, Result};

use hotmirror_core::discovery::beacon::BeaconTargets;
use hotmirror_core::discovery::{Beacon, BeaconBroadcaster};

use super::AnnounceArgs;
use crate::ui::{format_duration, parse_duration};

/// Run the announce command.
pub async fn run(args: AnnounceArgs) -> Result<()> {
    let config = super::load_config();

    let interval = match &args.interval {
        Some(i) => parse_duration(i)
            .filter(|d| !d.is_zero())
            .context("Invalid interval. Use formats like '250ms', '1s'")?,
        None => config.discovery.beacon_interval,
    };
    let id = args.id.unwrap_or_else(|| config.general.host_id.clone());

    let targets = BeaconTargets::new(
        config.network.ipv4_group,
        config.network.ipv6.then_some(config.network.ipv6_group),
        config.network.discovery_port,
    );
    let broadcaster = BeaconBroadcaster::new(targets).context("Failed to create beacon sender")?;

    println!();
    println!(
        "  Announcing '{}' every {} on port {}",
        id,
        format_duration(interval),
        config.network.discovery_port
    );
    println!("  Press Ctrl+C to stop.");
    println!();

    broadcaster
        .start(Beacon::new(id), &config.network.beacon_marker, interval)
        .await;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    broadcaster.stop().await;
    println!("  Stopped.");
    Ok(())
}
