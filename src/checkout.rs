//! Checkout: recursively materializes a commit's tree into a working
//! directory, reading tree and blob objects out of the object store.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::{bail, ensure, Context};
use log::warn;

use crate::error::GitError;
use crate::object::{self, ObjectType};

const MODE_TREE: &str = "40000";
const MODE_FILE: &str = "100644";
const MODE_EXEC: &str = "100755";
const MODE_SYMLINK: &str = "120000";

/// Walks `commit_id`'s root tree and writes its contents under `dest`.
pub fn checkout(commit_id: &str, dest: &Path) -> anyhow::Result<()> {
    let (typ, payload) = object::read_object(commit_id, Some(dest))
        .with_context(|| format!("reading commit {commit_id} for checkout"))?;
    ensure!(
        typ == ObjectType::Commit,
        GitError::Protocol(format!("{commit_id} does not refer to a commit"))
    );

    let tree_id = find_tree_line(&payload)?;
    checkout_tree(&tree_id, dest, dest);
    Ok(())
}

fn find_tree_line(commit_payload: &[u8]) -> anyhow::Result<String> {
    for line in commit_payload.split(|&b| b == b'\n') {
        if let Some(rest) = line.strip_prefix(b"tree ") {
            let id = std::str::from_utf8(rest)
                .map_err(|_| GitError::Protocol("commit's tree line is not UTF-8".into()))?;
            ensure!(
                id.len() == 40 && id.bytes().all(|b| b.is_ascii_hexdigit()),
                GitError::Protocol(format!("malformed tree id '{id}' in commit"))
            );
            return Ok(id.to_string());
        }
    }
    bail!(GitError::Protocol("commit has no 'tree' line".into()))
}

/// Recursively expands `tree_id` into `current_dir`. A missing tree or
/// blob is logged and that entry (or whole subtree) is skipped instead
/// of aborting the checkout.
fn checkout_tree(tree_id: &str, clone_dir: &Path, current_dir: &Path) {
    let (typ, payload) = match object::read_object(tree_id, Some(clone_dir)) {
        Ok(v) => v,
        Err(e) => {
            warn!(
                "{}",
                GitError::CheckoutMissing {
                    kind: "tree".into(),
                    id: tree_id.to_string(),
                    reason: format!("{e:#}"),
                }
            );
            return;
        }
    };

    if typ != ObjectType::Tree {
        warn!("checkout: {tree_id} is a {typ}, not a tree, skipping");
        return;
    }

    let mut rest = &payload[..];
    while !rest.is_empty() {
        let Some(nul) = rest.iter().position(|&b| b == 0) else {
            warn!("checkout: tree {tree_id} has a truncated entry, stopping");
            break;
        };

        let Ok(header) = std::str::from_utf8(&rest[..nul]) else {
            warn!("checkout: tree {tree_id} entry header is not UTF-8, stopping");
            break;
        };
        let Some((mode, name)) = header.split_once(' ') else {
            warn!("checkout: tree {tree_id} entry '{header}' has no mode separator, stopping");
            break;
        };

        rest = &rest[nul + 1..];
        if rest.len() < 20 {
            warn!("checkout: tree {tree_id} entry '{name}' is missing its identity, stopping");
            break;
        }
        let entry_id = hex::encode(&rest[..20]);
        rest = &rest[20..];

        let path = current_dir.join(name);
        match mode {
            MODE_TREE => {
                if let Err(e) = fs::create_dir_all(&path) {
                    warn!("checkout: creating directory {}: {e}", path.display());
                    continue;
                }
                checkout_tree(&entry_id, clone_dir, &path);
            }
            MODE_FILE | MODE_EXEC | MODE_SYMLINK => write_blob(&entry_id, clone_dir, &path, mode),
            other => warn!("checkout: unrecognized mode '{other}' for {}", path.display()),
        }
    }
}

fn write_blob(blob_id: &str, clone_dir: &Path, path: &Path, mode: &str) {
    let (typ, content) = match object::read_object(blob_id, Some(clone_dir)) {
        Ok(v) => v,
        Err(e) => {
            warn!(
                "{} (materializing {})",
                GitError::CheckoutMissing {
                    kind: "blob".into(),
                    id: blob_id.to_string(),
                    reason: format!("{e:#}"),
                },
                path.display()
            );
            return;
        }
    };

    if typ != ObjectType::Blob {
        warn!("checkout: {blob_id} is a {typ}, not a blob, skipping {}", path.display());
        return;
    }

    // Mode 120000 is a symlink in real git; this materializes it as a
    // plain file containing the link target bytes rather than creating
    // an actual symlink, to avoid cross-platform symlink handling.
    if let Err(e) = fs::write(path, &content) {
        warn!("checkout: writing {}: {e}", path.display());
        return;
    }

    let perms = if mode == MODE_EXEC { 0o755 } else { 0o644 };
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(perms)) {
        warn!("checkout: chmod {:o} on {}: {e}", perms, path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::write_object;

    fn tree_entry(mode: &str, name: &str, id: &[u8; 20]) -> Vec<u8> {
        let mut entry = Vec::new();
        entry.extend(mode.as_bytes());
        entry.push(b' ');
        entry.extend(name.as_bytes());
        entry.push(0);
        entry.extend(id);
        entry
    }

    #[test]
    fn materializes_file_and_subtree_with_modes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join(".git/objects")).unwrap();

        let file_content = b"hi\n".to_vec();
        let file_id = write_object(ObjectType::Blob, &file_content, Some(root)).unwrap();

        let exec_content = b"#!/bin/sh\necho hi\n".to_vec();
        let exec_id = write_object(ObjectType::Blob, &exec_content, Some(root)).unwrap();

        let mut sub_tree_body = Vec::new();
        sub_tree_body.extend(tree_entry(MODE_FILE, "inner.txt", &file_id));
        let sub_tree_id = write_object(ObjectType::Tree, &sub_tree_body, Some(root)).unwrap();

        let mut root_tree_body = Vec::new();
        root_tree_body.extend(tree_entry(MODE_FILE, "README", &file_id));
        root_tree_body.extend(tree_entry(MODE_EXEC, "run.sh", &exec_id));
        root_tree_body.extend(tree_entry(MODE_TREE, "subdir", &sub_tree_id));
        let root_tree_id = write_object(ObjectType::Tree, &root_tree_body, Some(root)).unwrap();

        let commit_body = format!("tree {}\nauthor a <a@a> 0 +0000\ncommitter a <a@a> 0 +0000\n\nmsg\n", hex::encode(root_tree_id));
        let commit_id = write_object(ObjectType::Commit, commit_body.as_bytes(), Some(root)).unwrap();

        checkout(&hex::encode(commit_id), root).unwrap();

        assert_eq!(fs::read(root.join("README")).unwrap(), file_content);
        assert_eq!(fs::read(root.join("subdir/inner.txt")).unwrap(), file_content);

        let run_perms = fs::metadata(root.join("run.sh")).unwrap().permissions();
        assert_eq!(run_perms.mode() & 0o777, 0o755);

        let readme_perms = fs::metadata(root.join("README")).unwrap().permissions();
        assert_eq!(readme_perms.mode() & 0o777, 0o644);
    }

    #[test]
    fn missing_blob_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join(".git/objects")).unwrap();

        let missing_id = [0xaa; 20];
        let tree_body = tree_entry(MODE_FILE, "gone.txt", &missing_id);
        let tree_id = write_object(ObjectType::Tree, &tree_body, Some(root)).unwrap();

        let commit_body = format!("tree {}\n\nmsg\n", hex::encode(tree_id));
        let commit_id = write_object(ObjectType::Commit, commit_body.as_bytes(), Some(root)).unwrap();

        // Should not panic or return an error; the missing entry is just skipped.
        checkout(&hex::encode(commit_id), root).unwrap();
        assert!(!root.join("gone.txt").exists());
    }
}
