//! Project mirroring driven by a host connection.
//!
//! This module turns the frames a host sends into files in the local sandbox
//! and notifications for the UI runtime.
//!
//! ## Features
//!
//! - Folder and file changes written straight into the mirror
//! - Bulk project imports on a background task
//! - Control messages held while an import runs, then replayed in order
//! - Two-step current-file notifications so the UI always reloads
//!
//! ## States
//!
//! ```text
//!          binary frame
//!   Idle ───────────────► Importing ──┐ control message: queued
//!    ▲                        │       │ binary frame: dropped
//!    └────────────────────────┘ ◄─────┘
//!      import finished: apply embedded folder change, replay queue
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use hotmirror_core::sync::{SyncConfig, SyncController, connection};
//!
//! let (events_tx, mut events) = hotmirror_core::event::channel();
//! let mut controller = SyncController::new(SyncConfig::from_config(&config), events_tx);
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
//! connection::connect(&mut controller, "192.168.1.20:52580", shutdown_rx).await?;
//! ```

use std::path::PathBuf;

use crate::config::Config;
use crate::protocol::frame::FrameVersion;

pub mod connection;
pub mod controller;

pub use controller::{ProjectWorkspace, SyncController};

/// Settings for a [`SyncController`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory projects are mirrored under
    pub sandbox_root: PathBuf,

    /// Bulk frame layout spoken by the host
    pub frame_version: FrameVersion,

    /// Largest payload a bulk frame may declare
    pub max_payload_size: usize,

    /// Control messages held while an import runs
    pub control_queue_capacity: usize,

    /// Bulk frames held while an import runs (0 drops them)
    pub bulk_queue_capacity: usize,
}

impl SyncConfig {
    /// Settings taken from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Self {
        Self {
            sandbox_root: config.sandbox_root(),
            frame_version: config.import.frame_version,
            max_payload_size: config.import.max_payload_size,
            control_queue_capacity: config.import.control_queue_capacity,
            bulk_queue_capacity: config.import.bulk_queue_capacity,
        }
    }

    /// Default settings with an explicit sandbox.
    pub fn with_sandbox(sandbox_root: impl Into<PathBuf>) -> Self {
        Self {
            sandbox_root: sandbox_root.into(),
            ..Self::default()
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Messages are applied as they arrive
    Idle,
    /// An import is running; control messages are queued
    Importing,
}
