//! Common test utilities for `Hotmirror` integration tests.
//!
//! This module provides shared functionality for integration tests.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU16, Ordering};

use hotmirror_core::event::{EventReceiver, MirrorEvent};
use hotmirror_core::protocol::frame::{BulkTransferFrame, FrameVersion};

/// Base port for tests, incremented for each test to avoid conflicts.
static TEST_PORT_COUNTER: AtomicU16 = AtomicU16::new(45600);

/// Create a temporary directory for test files.
///
/// The directory will be automatically cleaned up when the returned
/// `TempDir` is dropped.
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test file with the given content.
pub fn create_test_file(dir: &std::path::Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Get a unique UDP port so parallel tests do not collide.
pub fn get_test_port() -> u16 {
    TEST_PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Build an in-memory zip archive from `(name, content)` pairs.
pub fn zip_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for (name, content) in entries {
        zip.start_file(*name, options).expect("Failed to start zip entry");
        zip.write_all(content.as_bytes())
            .expect("Failed to write zip entry");
    }

    zip.finish().expect("Failed to finish zip").into_inner()
}

/// Encode a bulk frame carrying a zip of `entries`.
pub fn bulk_frame(project: &str, entries: &[(&str, &str)], folder_change: Option<&str>) -> Vec<u8> {
    let mut frame = BulkTransferFrame::new(project, zip_archive(entries));
    if let Some(message) = folder_change {
        frame = frame.with_folder_change(message);
    }
    frame
        .encode(FrameVersion::Embedded)
        .expect("Failed to encode bulk frame")
}

/// Take every event currently queued.
pub fn collect_events(rx: &mut EventReceiver) -> Vec<MirrorEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

/// Status messages among `events`.
pub fn status_messages(events: &[MirrorEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            MirrorEvent::StatusChanged { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

/// Every file under `dir`, relative to it, sorted.
pub fn list_files(dir: &std::path::Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(dir)
                .ok()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    files.sort();
    files
}
