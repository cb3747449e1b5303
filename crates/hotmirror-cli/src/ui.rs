//! UI utilities for Hotmirror CLI.

use std::time::Duration;

use hotmirror_core::event::MirrorEvent;

/// Parse a duration string like "500ms", "30s", "5m", or "1h".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(num_str) = s.strip_suffix("ms") {
        let num: u64 = num_str.parse().ok()?;
        Some(Duration::from_millis(num))
    } else if let Some(num_str) = s.strip_suffix('m') {
        let num: u64 = num_str.parse().ok()?;
        num.checked_mul(60).map(Duration::from_secs)
    } else if let Some(num_str) = s.strip_suffix('s') {
        let num: u64 = num_str.parse().ok()?;
        Some(Duration::from_secs(num))
    } else if let Some(num_str) = s.strip_suffix('h') {
        let num: u64 = num_str.parse().ok()?;
        num.checked_mul(3600).map(Duration::from_secs)
    } else {
        None
    }
}

/// Format a duration the way [`parse_duration`] reads it.
pub fn format_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// One-line description of an event, or `None` for events with nothing to
/// show a person.
pub fn describe_event(event: &MirrorEvent) -> Option<String> {
    match event {
        MirrorEvent::StatusChanged { message } => Some(format!("  {}", message)),
        MirrorEvent::CurrentFolderChanged { path } => {
            Some(format!("  Project:      {}", path.display()))
        }
        MirrorEvent::CurrentFileChanged { path: Some(path) } => {
            Some(format!("  Current file: {}", path.display()))
        }
        MirrorEvent::HostsChanged { hosts } => Some(format!("  Hosts known:  {}", hosts.len())),
        MirrorEvent::JsonMessage { json } => Some(format!("  Data:         {}", json)),
        MirrorEvent::CurrentFileChanged { path: None }
        | MirrorEvent::ProcessingChanged { .. }
        | MirrorEvent::ClearComponentCache => None,
    }
}

/// Print an event to stdout, as a JSON line when `json` is set.
pub fn print_event(event: &MirrorEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!(error = %e, "failed to serialize event"),
        }
    } else if let Some(line) = describe_event(event) {
        println!("{}", line);
    }
}

/// Truncate a string to fit within a maximum width.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len - 1).collect();
        format!("{}…", truncated)
    }
}
