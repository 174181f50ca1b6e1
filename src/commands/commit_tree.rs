use std::fmt::Write;
use std::fs;

use anyhow::Context;

use crate::object::{self, ObjectFile, ObjectType};

const FALLBACK_NAME: &str = "gitkit";
const FALLBACK_EMAIL: &str = "gitkit@localhost";

/// `git commit-tree <tree> [-p <parent>] -m <message>` command.
pub fn invoke(
    tree_hash: &str,
    message: &str,
    parent_hash: Option<String>,
) -> anyhow::Result<[u8; 20]> {
    let tree_path = object::hash_to_path(tree_hash, None);
    fs::metadata(&tree_path)
        .with_context(|| format!("tree object does not exist: {}", tree_path.display()))?;

    let mut commit = String::new();
    writeln!(commit, "tree {tree_hash}")?;

    if let Some(parent_hash) = parent_hash {
        writeln!(commit, "parent {parent_hash}")?;
    }

    let time = std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .context("current system time is before UNIX epoch")?;

    let (author_name, author_email) = identity("GIT_AUTHOR_NAME", "GIT_AUTHOR_EMAIL");
    let (committer_name, committer_email) = identity("GIT_COMMITTER_NAME", "GIT_COMMITTER_EMAIL");

    writeln!(
        commit,
        "author {author_name} <{author_email}> {} +0000",
        time.as_secs()
    )?;
    writeln!(
        commit,
        "committer {committer_name} <{committer_email}> {} +0000",
        time.as_secs()
    )?;
    writeln!(commit, "\n{message}")?;

    let object = ObjectFile::from_bytes(ObjectType::Commit, commit.into_bytes());
    object.write(None)
}

/// Reads the author/committer identity from the environment, falling
/// back to a placeholder identity when unset since this core has no
/// `.git/config` layer to resolve one from.
fn identity(name_var: &str, email_var: &str) -> (String, String) {
    let name = std::env::var(name_var).unwrap_or_else(|_| FALLBACK_NAME.to_string());
    let email = std::env::var(email_var).unwrap_or_else(|_| FALLBACK_EMAIL.to_string());
    (name, email)
}
