use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::Context;

use crate::object::{ObjectFile, ObjectType};

use super::hash_object;

/// `git write-tree` command.
pub fn invoke() -> anyhow::Result<()> {
    let Some(hash) = write_tree_for(Path::new(".")).context("construct root tree object")? else {
        anyhow::bail!("asked to make tree object for empty tree");
    };

    println!("{}", hex::encode(hash));

    Ok(())
}

fn write_tree_for(path: &Path) -> anyhow::Result<Option<[u8; 20]>> {
    let mut entries = Vec::new();
    let dir = fs::read_dir(path).context("opening a directory")?;

    for entry in dir {
        let entry = entry.with_context(|| format!("bad directory entry in {}", path.display()))?;

        let file_name = entry.file_name();
        let metadata = entry.metadata().context("metadata for directory entry")?;

        if file_name == ".git" || file_name == "target" {
            continue;
        }

        entries.push((entry, file_name, metadata));
    }

    entries.sort_unstable_by(|a, b| {
        let mut aname = a.1.as_encoded_bytes().to_vec();
        let mut bname = b.1.as_encoded_bytes().to_vec();
        if a.2.is_dir() {
            aname.push(b'/');
        }
        if b.2.is_dir() {
            bname.push(b'/');
        }
        aname.cmp(&bname)
    });

    let mut tree = Vec::new();
    for (entry, file_name, metadata) in entries {
        let mode: &str = if metadata.is_dir() {
            "40000"
        } else if metadata.is_symlink() {
            "120000"
        } else if metadata.permissions().mode() & 0o111 != 0 {
            "100755"
        } else {
            "100644"
        };

        let hash = if metadata.is_dir() {
            if let Some(hash) = write_tree_for(&entry.path())? {
                hash
            } else {
                // empty directory, skip it
                continue;
            }
        } else {
            hash_object::invoke(&entry.path(), true, ObjectType::Blob)?
        };

        // <mode> <name>\0<20_byte_sha>
        tree.extend(mode.as_bytes());
        tree.push(b' ');
        tree.extend(file_name.as_encoded_bytes());
        tree.push(0);
        tree.extend(hash);
    }

    if tree.is_empty() {
        return Ok(None);
    }

    let tree_object = ObjectFile::from_bytes(ObjectType::Tree, tree);
    let hash = tree_object.write(None)?;

    Ok(Some(hash))
}
