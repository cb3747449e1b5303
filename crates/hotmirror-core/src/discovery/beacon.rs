//! Host beacons.
//!
//! A beacon is the marker string immediately followed by an `<id>` field.
//! Hosts send one to each multicast group on a fixed interval; clients only
//! ever parse them. [`BeaconBroadcaster`] is the sending side, used by the
//! `announce` command to stand in for a host when testing a network.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{broadcast, Mutex};

use crate::error::{Error, Result};
use crate::protocol::extract_field;

/// A parsed host beacon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beacon {
    /// Host identity
    pub id: String,
}

impl Beacon {
    /// Create a beacon for `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Datagram bytes for this beacon.
    pub fn encode(&self, marker: &str) -> Vec<u8> {
        format!("{marker}<id>{}</id>", self.id).into_bytes()
    }

    /// Parse a datagram. `None` unless it starts with `marker` and carries a
    /// non-empty `id`.
    pub fn parse(marker: &str, datagram: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(datagram).ok()?;
        if !text.starts_with(marker) {
            return None;
        }
        extract_field(text, "id", marker.len())
            .filter(|id| !id.is_empty())
            .map(Self::new)
    }
}

/// Where beacons are sent.
#[derive(Debug, Clone, Copy)]
pub struct BeaconTargets {
    /// IPv4 group and port
    pub ipv4: SocketAddrV4,
    /// IPv6 group and port, if IPv6 is enabled
    pub ipv6: Option<SocketAddrV6>,
}

impl BeaconTargets {
    /// Targets for the given groups on `port`.
    pub fn new(ipv4_group: Ipv4Addr, ipv6_group: Option<Ipv6Addr>, port: u16) -> Self {
        Self {
            ipv4: SocketAddrV4::new(ipv4_group, port),
            ipv6: ipv6_group.map(|group| SocketAddrV6::new(group, port, 0, 0)),
        }
    }
}

/// Periodically multicasts a beacon on both families.
#[derive(Debug)]
pub struct BeaconBroadcaster {
    socket_v4: Arc<UdpSocket>,
    socket_v6: Option<Arc<UdpSocket>>,
    targets: BeaconTargets,
    shutdown_tx: broadcast::Sender<()>,
    is_active: Arc<Mutex<bool>>,
}

impl BeaconBroadcaster {
    /// Create a broadcaster sending to `targets`.
    ///
    /// # Errors
    ///
    /// Returns an error if the IPv4 socket cannot be created. An IPv6 socket
    /// failure only disables IPv6 beacons.
    pub fn new(targets: BeaconTargets) -> Result<Self> {
        let socket_v4 = sender_v4().map_err(|e| Error::DiscoveryBind(format!("IPv4 sender: {e}")))?;

        let socket_v6 = match targets.ipv6 {
            Some(_) => match sender_v6() {
                Ok(socket) => Some(Arc::new(socket)),
                Err(e) => {
                    tracing::warn!(error = %e, "IPv6 beacon socket unavailable, sending IPv4 only");
                    None
                }
            },
            None => None,
        };

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            socket_v4: Arc::new(socket_v4),
            socket_v6,
            targets,
            shutdown_tx,
            is_active: Arc::new(Mutex::new(false)),
        })
    }

    /// Start sending `beacon` every `interval`. Does nothing if already
    /// running.
    pub async fn start(&self, beacon: Beacon, marker: &str, interval: Duration) {
        let mut is_active = self.is_active.lock().await;
        if *is_active {
            return;
        }
        *is_active = true;
        drop(is_active);

        let datagram = beacon.encode(marker);
        let socket_v4 = Arc::clone(&self.socket_v4);
        let socket_v6 = self.socket_v6.clone();
        let targets = self.targets;
        let is_active = Arc::clone(&self.is_active);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                if let Err(e) = socket_v4.send_to(&datagram, targets.ipv4).await {
                    tracing::warn!(target = %targets.ipv4, error = %e, "failed to send beacon");
                }
                if let (Some(socket), Some(target)) = (&socket_v6, targets.ipv6) {
                    if let Err(e) = socket.send_to(&datagram, SocketAddr::V6(target)).await {
                        tracing::debug!(%target, error = %e, "failed to send IPv6 beacon");
                    }
                }

                tokio::select! {
                    () = tokio::time::sleep(interval) => {}
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("beacon broadcaster received shutdown signal");
                        break;
                    }
                }
            }

            *is_active.lock().await = false;
        });
    }

    /// Stop broadcasting and wait for the task to exit.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(());
        while *self.is_active.lock().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Check if currently broadcasting.
    pub async fn is_broadcasting(&self) -> bool {
        *self.is_active.lock().await
    }
}

fn sender_v4() -> std::io::Result<UdpSocket> {
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_multicast_loop_v4(true)?;
    socket.set_multicast_ttl_v4(1)?;

    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

fn sender_v6() -> std::io::Result<UdpSocket> {
    let socket = socket2::Socket::new(
        socket2::Domain::IPV6,
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )?;

    socket.set_only_v6(true)?;
    socket.set_reuse_address(true)?;
    socket.set_multicast_loop_v6(true)?;

    let addr = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0);
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}
