use std::fs;
use std::path::Path;

use anyhow::Context;
use log::info;

/// `git init` command.
pub fn invoke() -> anyhow::Result<()> {
    create_git_dirs(None).context("creating git directories")?;
    println!("Initialized git directory");
    Ok(())
}

/// Lays out an empty repository's `.git` directory under `dir` (or the
/// current directory when `None`). Shared with `clone`, which needs the
/// same skeleton before it starts writing objects.
pub fn create_git_dirs(dir: Option<&Path>) -> anyhow::Result<()> {
    let git_dir = match dir {
        Some(dir) => dir.join(".git"),
        None => Path::new(".git").to_path_buf(),
    };

    fs::create_dir_all(&git_dir)?;
    fs::create_dir_all(git_dir.join("objects"))?;
    fs::create_dir_all(git_dir.join("refs/heads"))?;
    fs::create_dir_all(git_dir.join("refs/tags"))?;
    fs::write(git_dir.join("HEAD"), "ref: refs/heads/master\n")?;

    info!("initialized git directory at {}", git_dir.display());
    Ok(())
}
