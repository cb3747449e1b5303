//! The sync controller state machine.
//!
//! [`SyncController`] owns the project workspace, the import pipeline and
//! the queues that hold traffic while an import runs. It is driven by the
//! connection loop in [`super::connection`]: every inbound frame goes to
//! [`SyncController::handle_text`] or [`SyncController::handle_binary`], and
//! a finished import goes to [`SyncController::finish_import`].
//!
//! Nothing here returns an error to the caller. Failures become
//! [`MirrorEvent::StatusChanged`] events and the controller carries on.

use std::collections::VecDeque;
use std::path::PathBuf;

use super::{SyncConfig, SyncState};
use crate::error::{Error, Result};
use crate::event::{self, EventSender, MirrorEvent};
use crate::import::{ImportOutcome, ImportPipeline};
use crate::mirror::LocalMirror;
use crate::protocol::frame::BulkTransferFrame;
use crate::protocol::{ControlMessage, FileChange, FolderChange};

/// The project currently mirrored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectWorkspace {
    /// Project folder as named by the host. `None` after an import that
    /// did not name it, until a later path reveals it.
    pub remote_folder: Option<String>,
    /// `<sandbox>/projects/<name>`
    pub local_project_path: PathBuf,
    /// File the UI was last told to show
    pub current_file: Option<PathBuf>,
}

impl ProjectWorkspace {
    fn new(remote_folder: Option<String>, local_project_path: PathBuf) -> Self {
        Self {
            remote_folder,
            local_project_path,
            current_file: None,
        }
    }
}

/// A frame held back while an import runs.
#[derive(Debug)]
enum Pending {
    Control(String),
    Bulk(Vec<u8>),
}

/// Traffic held back while an import runs, in arrival order.
#[derive(Debug, Default)]
struct PendingQueue {
    items: VecDeque<Pending>,
    control: usize,
    bulk: usize,
}

impl PendingQueue {
    fn push(&mut self, item: Pending) {
        match item {
            Pending::Control(_) => self.control += 1,
            Pending::Bulk(_) => self.bulk += 1,
        }
        self.items.push_back(item);
    }

    fn pop(&mut self) -> Option<Pending> {
        let item = self.items.pop_front()?;
        match item {
            Pending::Control(_) => self.control -= 1,
            Pending::Bulk(_) => self.bulk -= 1,
        }
        Some(item)
    }
}

/// Applies host traffic to the local mirror.
#[derive(Debug)]
pub struct SyncController {
    config: SyncConfig,
    mirror: LocalMirror,
    pipeline: ImportPipeline,
    workspace: Option<ProjectWorkspace>,
    pending: PendingQueue,
    events: EventSender,
}

impl SyncController {
    /// Create an idle controller publishing to `events`.
    pub fn new(config: SyncConfig, events: EventSender) -> Self {
        let mirror = LocalMirror::new(config.sandbox_root.clone());
        Self {
            pipeline: ImportPipeline::new(mirror.clone()),
            mirror,
            config,
            workspace: None,
            pending: PendingQueue::default(),
            events,
        }
    }

    /// Current state.
    pub fn state(&self) -> SyncState {
        if self.pipeline.is_running() {
            SyncState::Importing
        } else {
            SyncState::Idle
        }
    }

    /// Whether an import is running.
    pub fn is_importing(&self) -> bool {
        self.pipeline.is_running()
    }

    /// The active project, once one has been established.
    pub fn workspace(&self) -> Option<&ProjectWorkspace> {
        self.workspace.as_ref()
    }

    /// The mirror files are written through.
    pub fn mirror(&self) -> &LocalMirror {
        &self.mirror
    }

    /// Control messages waiting for the import to finish.
    pub fn queued_control(&self) -> usize {
        self.pending.control
    }

    /// Bulk frames waiting for the import to finish.
    pub fn queued_bulk(&self) -> usize {
        self.pending.bulk
    }

    /// Publish a status line.
    pub fn publish_status(&self, message: impl Into<String>) {
        event::emit(
            &self.events,
            MirrorEvent::StatusChanged {
                message: message.into(),
            },
        );
    }

    /// Handle an inbound text frame.
    pub fn handle_text(&mut self, text: &str) {
        if !self.is_importing() {
            self.apply_text(text);
            return;
        }

        if self.pending.control >= self.config.control_queue_capacity {
            tracing::warn!(
                capacity = self.config.control_queue_capacity,
                "control queue full during import, dropping message"
            );
            self.publish_status("Too many changes during import; some were dropped");
            return;
        }

        self.pending.push(Pending::Control(text.to_string()));
        tracing::debug!(queued = self.pending.control, "queued control message during import");
    }

    /// Handle an inbound binary frame.
    pub fn handle_binary(&mut self, data: Vec<u8>) {
        if !self.is_importing() {
            self.start_import(&data);
            return;
        }

        if self.pending.bulk < self.config.bulk_queue_capacity {
            self.pending.push(Pending::Bulk(data));
            tracing::debug!(queued = self.pending.bulk, "queued bulk frame during import");
        } else {
            tracing::warn!(bytes = data.len(), "import in progress, dropping bulk frame");
        }
    }

    /// Wait for the running import. `None` when idle.
    ///
    /// Cancel safe: the job keeps running if this future is dropped.
    pub async fn wait_import(&mut self) -> Option<Result<ImportOutcome>> {
        self.pipeline.wait().await
    }

    /// Apply the result of an import and replay whatever was queued.
    ///
    /// `ProcessingChanged { processing: false }` goes out last, once the
    /// replay has finished without starting another import.
    pub fn finish_import(&mut self, result: Result<ImportOutcome>) {
        match result {
            Ok(outcome) => {
                event::emit(&self.events, MirrorEvent::ClearComponentCache);
                if !self.adopt_workspace(None, outcome.project_dir.clone()) {
                    event::emit(
                        &self.events,
                        MirrorEvent::CurrentFolderChanged {
                            path: outcome.project_dir.clone(),
                        },
                    );
                }
                self.publish_status(format!(
                    "Imported project '{}' ({} files)",
                    outcome.project_name, outcome.files_extracted
                ));

                if let Some(message) = outcome.embedded_folder_change {
                    self.apply_text(&message);
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "project import failed");
                self.publish_status(format!("Import failed: {e}"));
            }
        }

        self.drain_pending();
        if !self.is_importing() {
            event::emit(&self.events, MirrorEvent::ProcessingChanged { processing: false });
        }
    }

    /// Replay queued frames in arrival order until one starts an import.
    fn drain_pending(&mut self) {
        while !self.is_importing() {
            match self.pending.pop() {
                Some(Pending::Control(text)) => self.apply_text(&text),
                Some(Pending::Bulk(data)) => self.start_import(&data),
                None => break,
            }
        }
    }

    fn start_import(&mut self, data: &[u8]) {
        let frame = match BulkTransferFrame::decode(
            data,
            self.config.frame_version,
            self.config.max_payload_size,
        ) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(bytes = data.len(), error = %e, "discarding bulk frame");
                self.report_error(&e);
                return;
            }
        };

        let project_name = frame.project_name.clone();
        if self.pipeline.submit(frame).is_err() {
            self.report_error(&Error::ImportBusy);
            return;
        }

        event::emit(&self.events, MirrorEvent::ProcessingChanged { processing: true });
        self.publish_status(format!("Importing project '{project_name}'"));
    }

    fn apply_text(&mut self, text: &str) {
        let message = match ControlMessage::decode(text) {
            Ok(message) => message,
            Err(Error::UnknownMessageType(kind)) => {
                tracing::debug!(%kind, "ignoring unknown message type");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed control message");
                self.report_error(&e);
                return;
            }
        };

        let kind = message.kind();
        tracing::debug!(%kind, "applying control message");

        let result = match message {
            ControlMessage::FolderChange(change) => self.apply_folder_change(change),
            ControlMessage::FileChange(change) => self.apply_file_change(change),
            ControlMessage::Data { json } => {
                event::emit(&self.events, MirrorEvent::JsonMessage { json });
                Ok(())
            }
        };

        if let Err(e) = result {
            tracing::warn!(%kind, error = %e, "control message failed");
            self.report_error(&e);
        }
    }

    fn apply_folder_change(&mut self, change: FolderChange) -> Result<()> {
        event::emit(&self.events, MirrorEvent::ClearComponentCache);

        let project_path = self.mirror.project_path_for(&change.folder)?;
        self.mirror.ensure_dir(&project_path)?;
        self.adopt_workspace(Some(change.folder.clone()), project_path.clone());

        let total = change.edits.len();
        let mut failed = 0usize;
        let mut first_error = None;

        for edit in &change.edits {
            let written = self
                .mirror
                .local_path_for(&edit.remote_path, &change.folder, &project_path)
                .and_then(|path| self.mirror.write_file(&path, &edit.content));

            if let Err(e) = written {
                tracing::warn!(file = %edit.remote_path, error = %e, "failed to mirror file");
                failed += 1;
                first_error.get_or_insert(e);
            }
        }

        tracing::info!(
            folder = %change.folder,
            files = total - failed,
            failed,
            "folder change applied"
        );

        if let Some(current) = &change.current_file {
            if let Err(e) = self.set_current_file(current) {
                self.report_error(&e);
            }
        }

        match first_error {
            Some(e) => self.publish_status(format!(
                "{failed} of {total} files could not be written: {e}"
            )),
            None => self.publish_status(format!("Synced {total} files")),
        }
        Ok(())
    }

    fn apply_file_change(&mut self, change: FileChange) -> Result<()> {
        event::emit(&self.events, MirrorEvent::ClearComponentCache);

        let path = self.resolve_remote(&change.edit.remote_path)?;
        self.mirror.write_file(&path, &change.edit.content)?;
        tracing::debug!(file = %path.display(), bytes = change.edit.content.len(), "file change applied");

        if let Some(current) = &change.current_file {
            self.set_current_file(current)?;
        }
        Ok(())
    }

    /// Install a workspace for `project_path`. Returns whether it replaced
    /// the previous one.
    ///
    /// Keeping the same project keeps its known folder unless a new one is
    /// given.
    fn adopt_workspace(&mut self, remote_folder: Option<String>, project_path: PathBuf) -> bool {
        if let Some(workspace) = self
            .workspace
            .as_mut()
            .filter(|ws| ws.local_project_path == project_path)
        {
            if remote_folder.is_some() {
                workspace.remote_folder = remote_folder;
            }
            return false;
        }

        tracing::info!(project = %project_path.display(), "active project changed");
        self.workspace = Some(ProjectWorkspace::new(remote_folder, project_path.clone()));
        event::emit(
            &self.events,
            MirrorEvent::CurrentFolderChanged { path: project_path },
        );
        true
    }

    /// Map a remote file into the active project.
    ///
    /// While the host folder is unknown it is learned from the first path
    /// that contains a directory named after the project.
    fn resolve_remote(&mut self, remote_file: &str) -> Result<PathBuf> {
        let workspace = self.workspace.as_mut().ok_or(Error::NoActiveProject)?;

        if workspace.remote_folder.is_none() {
            let project_name = workspace
                .local_project_path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default();
            if let Some(folder) = LocalMirror::folder_for_project(remote_file, project_name) {
                tracing::info!(%folder, "learned remote project folder");
                workspace.remote_folder = Some(folder);
            }
        }

        self.mirror.local_path_for(
            remote_file,
            workspace.remote_folder.as_deref().unwrap_or_default(),
            &workspace.local_project_path,
        )
    }

    fn set_current_file(&mut self, remote_file: &str) -> Result<()> {
        let path = self.resolve_remote(remote_file)?;
        if let Some(workspace) = self.workspace.as_mut() {
            workspace.current_file = Some(path.clone());
        }

        event::emit(&self.events, MirrorEvent::CurrentFileChanged { path: None });
        event::emit(&self.events, MirrorEvent::CurrentFileChanged { path: Some(path) });
        Ok(())
    }

    fn report_error(&self, error: &Error) {
        self.publish_status(error.to_string());
        event::emit(
            &self.events,
            MirrorEvent::ProcessingChanged {
                processing: self.is_importing(),
            },
        );
    }
}
