//! Cat command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};

use hotmirror_core::mirror::LocalMirror;

use super::CatArgs;

/// Run the cat command.
pub fn run(args: &CatArgs) -> Result<()> {
    let sandbox = args
        .sandbox
        .clone()
        .unwrap_or_else(|| super::load_config().sandbox_root());

    let content = read_mirrored(sandbox, &args.project, &args.path)?;
    print!("{}", content);
    Ok(())
}

/// Read `path` from the mirrored `project` under `sandbox`.
fn read_mirrored(sandbox: PathBuf, project: &str, path: &str) -> Result<String> {
    let mirror = LocalMirror::new(sandbox);

    let project_dir = mirror
        .project_dir(project)
        .with_context(|| format!("Invalid project name '{}'", project))?;
    let file = mirror
        .local_path_for(path, "", &project_dir)
        .with_context(|| format!("Invalid file path '{}'", path))?;

    mirror
        .read_file(&file)
        .with_context(|| format!("Failed to read {}", file.display()))
}
