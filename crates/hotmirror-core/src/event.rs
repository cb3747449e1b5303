//! Notifications for the UI runtime.
//!
//! The engine never calls into the UI directly. Everything the UI needs to
//! react to is sent as a [`MirrorEvent`] over an unbounded tokio channel.

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::discovery::DiscoveredHost;

/// Sending half handed to the controller and the discovery registry.
pub type EventSender = mpsc::UnboundedSender<MirrorEvent>;

/// Receiving half owned by the UI runtime.
pub type EventReceiver = mpsc::UnboundedReceiver<MirrorEvent>;

/// Create an event channel.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Something the UI runtime should react to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MirrorEvent {
    /// File the UI should load; `None` clears it.
    ///
    /// A new file is always announced as `None` followed by `Some`, so
    /// reloading the same path still reaches the UI.
    CurrentFileChanged {
        /// Local path, or `None` to clear
        path: Option<PathBuf>,
    },
    /// Local directory of the active project changed
    CurrentFolderChanged {
        /// Local project directory
        path: PathBuf,
    },
    /// Human-readable status line
    StatusChanged {
        /// Message text
        message: String,
    },
    /// An import started or finished
    ProcessingChanged {
        /// Whether an import is running
        processing: bool,
    },
    /// The list of discovered hosts changed
    HostsChanged {
        /// Every known host, sorted by address
        hosts: Vec<DiscoveredHost>,
    },
    /// Opaque JSON from the host
    JsonMessage {
        /// JSON text, untouched
        json: String,
    },
    /// Cached components must be dropped before files change
    ClearComponentCache,
}

/// Send `event`, logging instead of failing when nobody is listening.
pub(crate) fn emit(sender: &EventSender, event: MirrorEvent) {
    if let Err(e) = sender.send(event) {
        tracing::debug!(event = ?e.0, "event receiver dropped");
    }
}
