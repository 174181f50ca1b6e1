use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::object::{ObjectFile, ObjectType};

/// `git hash-object [-w] [-t <type>]` command.
pub fn invoke(path: impl AsRef<Path>, write: bool, typ: ObjectType) -> anyhow::Result<[u8; 20]> {
    let path = path.as_ref();
    let content = fs::read(path).with_context(|| format!("reading file {}", path.display()))?;
    let mut object = ObjectFile::from_bytes(typ, content);

    let hash = if write {
        object.write(None)?
    } else {
        object.hash()?
    };

    Ok(hash)
}
