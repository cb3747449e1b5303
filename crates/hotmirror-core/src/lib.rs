//! # Hotmirror Core Library
//!
//! `hotmirror-core` is the remote synchronization and discovery engine behind
//! Hotmirror. A host machine pushes a declarative UI project over a persistent
//! WebSocket connection; this crate mirrors it into a local sandbox and tells
//! the preview runtime which file to reload.
//!
//! ## Modules
//!
//! - [`config`] - Configuration management
//! - [`discovery`] - Multicast beacon listening, broadcasting and the host registry
//! - [`error`] - Error type shared by every module
//! - [`event`] - Notifications sent to the UI runtime
//! - [`import`] - Single-flight background extraction of project archives
//! - [`mirror`] - Remote-to-local path mapping and sandboxed file writes
//! - [`protocol`] - Tag-delimited control messages and the binary bulk frame
//! - [`sync`] - The sync controller state machine and connection driver
//!
//! ## Example
//!
//! ```rust,ignore
//! use hotmirror_core::config::Config;
//! use hotmirror_core::sync::{connection, SyncConfig, SyncController};
//!
//! let config = Config::load()?;
//! let (events_tx, mut events) = hotmirror_core::event::channel();
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
//!
//! tokio::spawn(async move {
//!     let mut controller = SyncController::new(SyncConfig::from_config(&config), events_tx);
//!     connection::connect(&mut controller, "192.168.1.20:52580", shutdown_rx).await
//! });
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod discovery;
pub mod error;
pub mod event;
pub mod import;
pub mod mirror;
pub mod protocol;
pub mod sync;

pub use error::{Error, Result};

use std::net::{Ipv4Addr, Ipv6Addr};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default discovery port (UDP)
pub const DEFAULT_DISCOVERY_PORT: u16 = 45454;

/// Default IPv4 multicast group for host beacons
pub const DEFAULT_IPV4_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 43, 21);

/// Default IPv6 multicast group for host beacons
pub const DEFAULT_IPV6_GROUP: Ipv6Addr = Ipv6Addr::new(0xff12, 0, 0, 0, 0, 0, 0, 0x2115);

/// Default port the host serves WebSocket clients on
pub const DEFAULT_CLIENT_PORT: u16 = 52580;

/// Prefix every host beacon datagram starts with
pub const BEACON_MARKER: &str = "HOTMIRROR_HOST";

/// Default cap on a bulk frame payload (256 MiB)
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 256 * 1024 * 1024;

/// Default number of control messages held while an import runs
pub const DEFAULT_CONTROL_QUEUE_CAPACITY: usize = 1024;
