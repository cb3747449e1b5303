//! Host discovery over UDP multicast.
//!
//! Hosts announce themselves with small beacon datagrams sent to a fixed
//! multicast group on each IP family:
//!
//! ```text
//! HOTMIRROR_HOST<id>studio-mac</id>
//! ```
//!
//! A preview client listens on both groups ([`DiscoveryService`]) and feeds
//! what it hears into a [`DiscoveryRegistry`], which keeps one entry per
//! host address and tells the UI when the list changes.
//!
//! ## Architecture
//!
//! ```text
//!  IPv4 listener task ──┐
//!                       ├──► Arc<Mutex<DiscoveryRegistry>> ──► HostsChanged
//!  IPv6 listener task ──┘
//! ```
//!
//! Each listener drains every datagram that is ready before taking the lock,
//! so a burst of beacons produces at most one notification.

pub mod beacon;
pub mod listener;

use std::collections::BTreeMap;
use std::net::{SocketAddr, SocketAddrV6};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::event::{self, EventSender, MirrorEvent};

pub use beacon::{Beacon, BeaconBroadcaster};
pub use listener::{DiscoverySettings, DiscoveryService};

/// Registry shared between listener tasks.
pub type SharedRegistry = Arc<Mutex<DiscoveryRegistry>>;

/// A host heard on the network.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DiscoveredHost {
    /// Where to open the WebSocket connection
    pub address: SocketAddr,
    /// Identity the host announced
    pub id: String,
}

/// Hosts seen so far, keyed by address.
#[derive(Debug)]
pub struct DiscoveryRegistry {
    hosts: BTreeMap<SocketAddr, String>,
    marker: String,
    client_port: u16,
    events: Option<EventSender>,
}

impl DiscoveryRegistry {
    /// Create an empty registry.
    ///
    /// `marker` is the prefix a datagram must start with and `client_port`
    /// the port used for every host's connection address.
    pub fn new(marker: impl Into<String>, client_port: u16) -> Self {
        Self {
            hosts: BTreeMap::new(),
            marker: marker.into(),
            client_port,
            events: None,
        }
    }

    /// Publish [`MirrorEvent::HostsChanged`] on `events` after each
    /// changing batch.
    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Wrap into the shared form listener tasks use.
    pub fn shared(self) -> SharedRegistry {
        Arc::new(Mutex::new(self))
    }

    /// Record one datagram. Returns whether the host list changed.
    ///
    /// Datagrams without the marker or an `id` are ignored. IPv4-mapped IPv6
    /// senders are recorded under their IPv4 address; other IPv6 senders
    /// keep their scope id so link-local hosts stay reachable.
    pub fn ingest(&mut self, sender: SocketAddr, datagram: &[u8]) -> bool {
        let Some(beacon) = Beacon::parse(&self.marker, datagram) else {
            return false;
        };

        let address = self.host_address(sender);
        match self.hosts.get(&address) {
            Some(id) if *id == beacon.id => false,
            previous => {
                tracing::debug!(
                    %address,
                    id = %beacon.id,
                    replaced = ?previous,
                    "host beacon recorded"
                );
                self.hosts.insert(address, beacon.id);
                true
            }
        }
    }

    /// Connection address for a beacon sent from `sender`.
    fn host_address(&self, sender: SocketAddr) -> SocketAddr {
        match sender {
            SocketAddr::V4(v4) => SocketAddr::new((*v4.ip()).into(), self.client_port),
            SocketAddr::V6(v6) => match v6.ip().to_ipv4_mapped() {
                Some(v4) => SocketAddr::new(v4.into(), self.client_port),
                None => SocketAddrV6::new(*v6.ip(), self.client_port, 0, v6.scope_id()).into(),
            },
        }
    }

    /// Record a batch of datagrams and publish the host list once if any of
    /// them changed it. Returns whether it changed.
    pub fn ingest_batch<'a, I>(&mut self, datagrams: I) -> bool
    where
        I: IntoIterator<Item = (SocketAddr, &'a [u8])>,
    {
        let mut changed = false;
        for (sender, datagram) in datagrams {
            changed |= self.ingest(sender, datagram);
        }

        if changed {
            tracing::info!(hosts = self.hosts.len(), "host list updated");
            if let Some(events) = &self.events {
                event::emit(events, MirrorEvent::HostsChanged { hosts: self.hosts() });
            }
        }
        changed
    }

    /// Every known host, sorted by address.
    pub fn hosts(&self) -> Vec<DiscoveredHost> {
        self.hosts
            .iter()
            .map(|(address, id)| DiscoveredHost {
                address: *address,
                id: id.clone(),
            })
            .collect()
    }

    /// Number of known hosts.
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Whether no host has been seen.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}
