//! Clone orchestrator: composes ref discovery, the fetch request builder,
//! the side-band demultiplexer, the packfile decoder, and checkout into a
//! single `clone <url> [<dir>]` command.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::info;
use reqwest::blocking::Client;
use reqwest::{header, StatusCode};

use crate::commands;
use crate::error::GitError;
use crate::pack;
use crate::refs;
use crate::{checkout, fetch, sideband};

const SERVICE_NAME: &str = "git-upload-pack";
const USER_AGENT: &str = concat!("gitkit/", env!("CARGO_PKG_VERSION"));

/// `git clone <url> [<dir>]` command.
pub fn invoke(repository_url: &str, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let repository_url = repository_url.trim_end_matches('/');
    let dir = dir.unwrap_or_else(|| default_target_dir(repository_url));

    anyhow::ensure!(
        !dir.exists(),
        GitError::PreconditionFailed(format!("destination path '{}' already exists", dir.display()))
    );

    println!("Cloning into '{}'...", dir.display());

    commands::init::create_git_dirs(Some(dir.as_path()))
        .with_context(|| format!("initializing git directory in '{}'", dir.display()))?;

    let ref_map = refs::discover(repository_url).context("discovering refs")?;
    let (target_id, default_branch) = ref_map.resolve_head().context("resolving HEAD")?;

    let pack = fetch_pack(repository_url, &target_id).context("fetching pack")?;

    let report = pack::decode(&pack, Some(dir.as_path())).context("decoding pack")?;
    info!(
        "received {} objects, resolved {} deltas, skipped {} OFS_DELTA, {} other errors (trailer checksum ok: {})",
        report.written.len(),
        report.resolved_deltas,
        report.skipped_ofs_deltas,
        report.skipped_errors,
        report.checksum_ok
    );

    write_refs(dir.as_path(), &target_id, default_branch.as_deref())
        .context("writing refs and HEAD")?;

    checkout::checkout(&target_id, dir.as_path()).context("checking out working tree")?;

    println!(
        "Received {} objects, resolved {} deltas.",
        report.written.len(),
        report.resolved_deltas
    );

    Ok(())
}

/// The default clone directory: the URL's last path segment, minus a
/// trailing `.git`.
fn default_target_dir(repository_url: &str) -> PathBuf {
    let name = repository_url.rsplit('/').next().unwrap_or(repository_url);
    let name = name.strip_suffix(".git").unwrap_or(name);
    PathBuf::from(name)
}

/// Negotiates and retrieves the pack for `target_id`: builds the
/// `want`/`done` body, POSTs it, and demultiplexes the side-band
/// response into a raw pack byte stream.
fn fetch_pack(repository_url: &str, target_id: &str) -> anyhow::Result<bytes::Bytes> {
    let url = format!("{repository_url}/{SERVICE_NAME}");
    let body = fetch::build_request(&[target_id.to_string()])?;

    let client = Client::new();
    let resp = client
        .post(&url)
        .header(header::USER_AGENT, USER_AGENT)
        .header(
            header::CONTENT_TYPE,
            "application/x-git-upload-pack-request",
        )
        .header(header::ACCEPT, "application/x-git-upload-pack-result")
        .body(body)
        .send()
        .map_err(|e| GitError::Transport(format!("POST {url}: {e}")))?;

    let status = resp.status();
    if status != StatusCode::OK {
        anyhow::bail!(GitError::Transport(format!("POST {url} returned {status}")));
    }

    let body = resp
        .bytes()
        .map_err(|e| GitError::Transport(format!("reading pack response body: {e}")))?;

    sideband::demux(body)
}

/// Writes the default branch ref (if any) and repoints `HEAD`, either
/// symbolically at that branch or directly at `target_id` for a detached
/// clone. Runs only after every pack object has already been written to
/// the store, and writes the branch ref before repointing `HEAD` at it.
fn write_refs(dir: &Path, target_id: &str, default_branch: Option<&str>) -> anyhow::Result<()> {
    let git_dir = dir.join(".git");

    match default_branch {
        Some(branch) => {
            let ref_path = git_dir.join(branch);
            if let Some(parent) = ref_path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating ref directory {}", parent.display()))?;
            }
            fs::write(&ref_path, format!("{target_id}\n"))
                .with_context(|| format!("writing ref {}", ref_path.display()))?;

            fs::write(git_dir.join("HEAD"), format!("ref: {branch}\n"))
                .context("writing HEAD")?;
        }
        None => {
            fs::write(git_dir.join("HEAD"), format!("{target_id}\n")).context("writing HEAD")?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_target_dir_strips_dot_git_suffix() {
        assert_eq!(
            default_target_dir("https://github.com/example/gitkit.git"),
            PathBuf::from("gitkit")
        );
        assert_eq!(
            default_target_dir("https://github.com/example/gitkit"),
            PathBuf::from("gitkit")
        );
    }

    #[test]
    fn write_refs_points_head_at_default_branch() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join(".git")).unwrap();

        let id = "a".repeat(40);
        write_refs(root, &id, Some("refs/heads/main")).unwrap();

        assert_eq!(
            fs::read_to_string(root.join(".git/HEAD")).unwrap(),
            "ref: refs/heads/main\n"
        );
        assert_eq!(
            fs::read_to_string(root.join(".git/refs/heads/main")).unwrap(),
            format!("{id}\n")
        );
    }

    #[test]
    fn write_refs_detached_head_is_direct_identity() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join(".git")).unwrap();

        let id = "b".repeat(40);
        write_refs(root, &id, None).unwrap();

        assert_eq!(
            fs::read_to_string(root.join(".git/HEAD")).unwrap(),
            format!("{id}\n")
        );
    }
}
