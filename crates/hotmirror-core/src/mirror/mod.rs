//! Local mirror of remote projects.
//!
//! Every project pushed by a host lands in `<sandbox>/projects/<name>`, where
//! `<name>` is the last segment of the host's project folder. Remote file
//! paths are mapped into that directory segment by segment; anything that
//! would climb out of it is rejected with [`Error::InvalidPath`].
//!
//! All operations here are synchronous filesystem calls. The sync controller
//! uses them for small control-message writes and the import job uses them
//! from tokio's blocking pool.

use std::fs;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Directory under the sandbox root holding one subdirectory per project.
pub const PROJECTS_DIR: &str = "projects";

/// Scheme prefix hosts may put in front of paths.
const FILE_SCHEME: &str = "file://";

/// Maps remote paths into the sandbox and performs the writes.
#[derive(Debug, Clone)]
pub struct LocalMirror {
    sandbox_root: PathBuf,
}

impl LocalMirror {
    /// Create a mirror rooted at `sandbox_root`.
    ///
    /// Nothing is created on disk until the first write.
    pub fn new(sandbox_root: impl Into<PathBuf>) -> Self {
        Self {
            sandbox_root: sandbox_root.into(),
        }
    }

    /// The sandbox root.
    pub fn sandbox_root(&self) -> &Path {
        &self.sandbox_root
    }

    /// `<sandbox>/projects`.
    pub fn projects_root(&self) -> PathBuf {
        self.sandbox_root.join(PROJECTS_DIR)
    }

    /// Directory for a project by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] unless `name` is a single plain path
    /// segment.
    pub fn project_dir(&self, name: &str) -> Result<PathBuf> {
        let segment = normal_segment(name)
            .ok_or_else(|| Error::InvalidPath(format!("invalid project name '{name}'")))?;
        Ok(self.projects_root().join(segment))
    }

    /// Directory for the project a remote folder belongs to.
    ///
    /// Uses the last non-empty segment of `remote_folder`, so `/srv/proj/`
    /// and `file:///srv/proj` both map to `<sandbox>/projects/proj`.
    pub fn project_path_for(&self, remote_folder: &str) -> Result<PathBuf> {
        let folder = strip_scheme(remote_folder);
        let name = folder
            .split(['/', '\\'])
            .filter(|segment| !segment.is_empty())
            .last()
            .ok_or_else(|| {
                Error::InvalidPath(format!("no project name in folder '{remote_folder}'"))
            })?;
        self.project_dir(name)
    }

    /// Map a remote file into `project_path`.
    ///
    /// Strips the scheme, then the `remote_folder` prefix, then one leading
    /// separator, and joins what remains onto `project_path`. Empty and `.`
    /// segments are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] if a segment is `..`, a drive prefix
    /// or otherwise not a plain name, or if nothing is left to name a file.
    pub fn local_path_for(
        &self,
        remote_file: &str,
        remote_folder: &str,
        project_path: &Path,
    ) -> Result<PathBuf> {
        let file = strip_scheme(remote_file);
        let folder = strip_scheme(remote_folder).trim_end_matches(['/', '\\']);

        let relative = match file.strip_prefix(folder) {
            Some(rest) if !folder.is_empty() && at_segment_boundary(rest) => rest,
            _ => file,
        };
        let relative = relative.strip_prefix(['/', '\\']).unwrap_or(relative);

        let mut local = project_path.to_path_buf();
        let mut depth = 0usize;
        for segment in relative.split(['/', '\\']) {
            if segment.is_empty() || segment == "." {
                continue;
            }
            let part = normal_segment(segment).ok_or_else(|| {
                Error::InvalidPath(format!("'{remote_file}' escapes the project directory"))
            })?;
            local.push(part);
            depth += 1;
        }

        if depth == 0 {
            return Err(Error::InvalidPath(format!(
                "'{remote_file}' does not name a file inside '{remote_folder}'"
            )));
        }
        Ok(local)
    }

    /// Host folder of a project, recovered from one of its file paths.
    ///
    /// Returns everything up to and including the last directory segment
    /// named `project_name`, so `/Users/dev/demo/ui/Main.qml` with project
    /// `demo` gives `/Users/dev/demo`. `None` when no directory segment
    /// matches.
    pub fn folder_for_project(remote_file: &str, project_name: &str) -> Option<String> {
        let file = strip_scheme(remote_file);
        let mut start = 0;
        let mut end = None;

        for (idx, c) in file.char_indices() {
            if c == '/' || c == '\\' {
                if &file[start..idx] == project_name {
                    end = Some(idx);
                }
                start = idx + c.len_utf8();
            }
        }

        end.map(|end| file[..end].to_string())
    }

    /// Create `path` and its parents.
    pub fn ensure_dir(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    /// Write `content` to `path`, creating parent directories and replacing
    /// any existing file.
    pub fn write_file(&self, path: &Path, content: impl AsRef<[u8]>) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Read a mirrored file back as text.
    pub fn read_file(&self, path: &Path) -> Result<String> {
        Ok(fs::read_to_string(path)?)
    }

    /// Whether `path` is missing or an empty directory.
    pub fn is_empty_dir(&self, path: &Path) -> Result<bool> {
        match fs::read_dir(path) {
            Ok(mut entries) => Ok(entries.next().is_none()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove every regular file under `path`, then prune emptied
    /// subdirectories.
    ///
    /// Keeps going after a failed removal and reports the first failure once
    /// the whole tree has been visited. Returns the number of files removed.
    pub fn purge_directory(&self, path: &Path) -> Result<usize> {
        let mut removed = 0;
        let mut first_error: Option<Error> = None;
        let mut dirs = Vec::new();

        for entry in WalkDir::new(path).min_depth(1).contents_first(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unable to walk directory");
                    first_error.get_or_insert_with(|| Error::Io(e.into()));
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                dirs.push(entry.into_path());
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(file = %entry.path().display(), error = %e, "unable to remove file");
                    first_error.get_or_insert(Error::Io(e));
                }
            }
        }

        for dir in dirs {
            if let Err(e) = fs::remove_dir(&dir) {
                tracing::debug!(dir = %dir.display(), error = %e, "directory left in place");
            }
        }

        tracing::debug!(path = %path.display(), removed, "purged directory");
        first_error.map_or(Ok(removed), Err)
    }
}

fn strip_scheme(path: &str) -> &str {
    path.strip_prefix(FILE_SCHEME).unwrap_or(path)
}

fn at_segment_boundary(rest: &str) -> bool {
    rest.is_empty() || rest.starts_with(['/', '\\'])
}

/// `segment` if it is exactly one plain path component.
fn normal_segment(segment: &str) -> Option<&str> {
    if segment.contains(['/', '\\']) {
        return None;
    }
    let mut components = Path::new(segment).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Some(segment),
        _ => None,
    }
}
