//! Background import of bulk project transfers.
//!
//! A [`BulkTransferFrame`] carries a zipped project. Importing it means
//! clearing the project's directory, writing the archive next to it,
//! extracting it, and removing the archive again. That is slow blocking I/O,
//! so it runs on tokio's blocking pool while the connection keeps reading.
//!
//! The pipeline is single-flight: [`ImportPipeline::submit`] refuses a second
//! frame until the result of the first has been taken with
//! [`ImportPipeline::wait`].
//!
//! ```rust,ignore
//! let mut pipeline = ImportPipeline::new(LocalMirror::new(sandbox));
//! pipeline.submit(frame).map_err(|_| Error::ImportBusy)?;
//! let outcome = pipeline.wait().await.expect("job was submitted")?;
//! println!("extracted {} files", outcome.files_extracted);
//! ```

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::mirror::LocalMirror;
use crate::protocol::frame::BulkTransferFrame;

/// Name of the temporary archive written inside the project directory.
pub const ARCHIVE_FILE_NAME: &str = ".hotmirror-import.zip";

/// Result of a finished import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    /// Project name from the frame
    pub project_name: String,
    /// Directory the archive was extracted into
    pub project_dir: PathBuf,
    /// Folder change to apply now that the files exist
    pub embedded_folder_change: Option<String>,
    /// Number of regular files written
    pub files_extracted: usize,
}

#[derive(Debug)]
enum JobState {
    Idle,
    Running(JoinHandle<Result<ImportOutcome>>),
}

/// Runs at most one import at a time.
#[derive(Debug)]
pub struct ImportPipeline {
    mirror: LocalMirror,
    state: JobState,
}

impl ImportPipeline {
    /// Create an idle pipeline writing through `mirror`.
    pub fn new(mirror: LocalMirror) -> Self {
        Self {
            mirror,
            state: JobState::Idle,
        }
    }

    /// Whether a job has been submitted and its result not yet taken.
    pub fn is_running(&self) -> bool {
        matches!(self.state, JobState::Running(_))
    }

    /// Start importing `frame` in the background.
    ///
    /// # Errors
    ///
    /// Hands the frame back if a job is already running.
    pub fn submit(&mut self, frame: BulkTransferFrame) -> std::result::Result<(), BulkTransferFrame> {
        if self.is_running() {
            return Err(frame);
        }

        let mirror = self.mirror.clone();
        tracing::info!(
            project = %frame.project_name,
            bytes = frame.payload.len(),
            "starting project import"
        );
        let handle = tokio::task::spawn_blocking(move || run_import(&mirror, frame));
        self.state = JobState::Running(handle);
        Ok(())
    }

    /// Wait for the running job and return the pipeline to idle.
    ///
    /// Returns `None` when no job is running. Dropping the future before it
    /// completes leaves the job running; calling `wait` again picks it up.
    pub async fn wait(&mut self) -> Option<Result<ImportOutcome>> {
        let JobState::Running(handle) = &mut self.state else {
            return None;
        };

        let joined = handle.await;
        self.state = JobState::Idle;
        Some(joined.unwrap_or_else(|e| Err(Error::Internal(format!("import task failed: {e}")))))
    }
}

/// The import job body. Blocking.
fn run_import(mirror: &LocalMirror, frame: BulkTransferFrame) -> Result<ImportOutcome> {
    let BulkTransferFrame {
        project_name,
        embedded_folder_change,
        payload,
    } = frame;

    let project_dir = mirror.project_dir(&project_name)?;

    if !mirror.is_empty_dir(&project_dir)? {
        mirror.purge_directory(&project_dir)?;
    }
    mirror.ensure_dir(&project_dir)?;

    let archive_path = project_dir.join(ARCHIVE_FILE_NAME);
    mirror.write_file(&archive_path, &payload)?;
    drop(payload);

    let extracted = extract_archive(&archive_path, &project_dir);

    if let Err(e) = std::fs::remove_file(&archive_path) {
        tracing::warn!(archive = %archive_path.display(), error = %e, "failed to remove import archive");
    }

    let files_extracted = extracted?;
    tracing::info!(
        project = %project_name,
        files = files_extracted,
        dir = %project_dir.display(),
        "project import finished"
    );

    Ok(ImportOutcome {
        project_name,
        project_dir,
        embedded_folder_change,
        files_extracted,
    })
}

/// Extract every entry of the zip at `archive_path` into `dest`.
///
/// Entries whose names would land outside `dest` fail the extraction. Files
/// written before a failure stay on disk.
fn extract_archive(archive_path: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(archive_path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| Error::Extraction(format!("unreadable archive: {e}")))?;

    let mut files = 0;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| Error::Extraction(format!("entry {index}: {e}")))?;

        let Some(relative) = entry.enclosed_name() else {
            return Err(Error::Extraction(format!(
                "entry '{}' escapes the project directory",
                entry.name()
            )));
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)
            .map_err(|e| Error::Extraction(format!("entry '{}': {e}", entry.name())))?;
        files += 1;
    }

    Ok(files)
}
