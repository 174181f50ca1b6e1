use std::ffi::CStr;
use std::fmt;
use std::fs::{self, File};
use std::io::{prelude::*, BufReader, Cursor};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, ensure, Context};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha1::{Digest, Sha1};

use crate::error::GitError;

const OBJECTS_DIR: &str = "objects";

/// The four object kinds a loose object can be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Commit => "commit",
            ObjectType::Tree => "tree",
            ObjectType::Blob => "blob",
            ObjectType::Tag => "tag",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s {
            "commit" => ObjectType::Commit,
            "tree" => ObjectType::Tree,
            "blob" => ObjectType::Blob,
            "tag" => ObjectType::Tag,
            other => bail!("unknown object type '{other}'"),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub typ: ObjectType,
    pub size: usize,
}

/// A handle onto an object's content, generic over how that content is
/// being read: a freshly-read file off disk for `hash-object`, an
/// in-memory buffer assembled by `write-tree`/`commit-tree`, or a
/// zlib-inflating reader positioned just past the header for `cat-file`
/// and `ls-tree`.
pub struct ObjectFile<R> {
    pub header: Header,
    pub reader: R,
}

impl ObjectFile<Cursor<Vec<u8>>> {
    /// Builds an object from a file's raw bytes, as `blob`.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content =
            fs::read(path).with_context(|| format!("reading file {}", path.display()))?;
        Ok(Self::from_bytes(ObjectType::Blob, content))
    }

    /// Builds an in-memory object of the given kind directly from bytes,
    /// the way `write-tree` assembles a tree body and `commit-tree`
    /// assembles a commit body before writing either out.
    pub fn from_bytes(typ: ObjectType, content: Vec<u8>) -> Self {
        Self {
            header: Header {
                typ,
                size: content.len(),
            },
            reader: Cursor::new(content),
        }
    }
}

impl ObjectFile<BufReader<ZlibDecoder<File>>> {
    /// Opens a loose object by id under `<dir>/.git/objects/` (or the
    /// ambient `.git/objects` when `dir` is `None`), reads its header,
    /// and leaves `reader` positioned at the start of the content.
    pub fn read(id: &str, dir: Option<&Path>) -> anyhow::Result<Self> {
        let path = hash_to_path(id, dir);
        let f = File::open(&path)
            .map_err(|_| GitError::CorruptObject {
                id: id.to_owned(),
                reason: "object not found".into(),
            })
            .with_context(|| format!("opening object file {}", path.display()))?;

        let mut decoder = BufReader::new(ZlibDecoder::new(f));

        let mut buf = Vec::new();
        decoder
            .read_until(0, &mut buf)
            .with_context(|| format!("reading object header for {id}"))?;
        ensure!(
            buf.last() == Some(&0),
            GitError::CorruptObject {
                id: id.to_owned(),
                reason: "missing NUL after header".into(),
            }
        );

        let header_str = CStr::from_bytes_with_nul(&buf)
            .map_err(|_| GitError::CorruptObject {
                id: id.to_owned(),
                reason: "header is not a valid C string".into(),
            })?
            .to_str()
            .map_err(|_| GitError::CorruptObject {
                id: id.to_owned(),
                reason: "header is not valid UTF-8".into(),
            })?;

        let (typ, size) = header_str
            .split_once(' ')
            .ok_or_else(|| GitError::CorruptObject {
                id: id.to_owned(),
                reason: format!("malformed header '{header_str}'"),
            })?;

        let typ: ObjectType = typ.parse().map_err(|_| GitError::CorruptObject {
            id: id.to_owned(),
            reason: format!("unknown object type '{typ}'"),
        })?;

        let size: usize = size.parse().map_err(|_| GitError::CorruptObject {
            id: id.to_owned(),
            reason: format!("non-numeric size '{size}'"),
        })?;

        Ok(Self {
            header: Header { typ, size },
            reader: decoder,
        })
    }
}

impl<R: Read> ObjectFile<R> {
    /// Computes this object's identity without writing it.
    pub fn hash(&mut self) -> anyhow::Result<[u8; 20]> {
        let mut content = Vec::new();
        self.reader
            .read_to_end(&mut content)
            .context("reading object content to compute its hash")?;
        Ok(hash_object(self.header.typ, &content))
    }

    /// Writes this object into the store, skipping the write if the
    /// identity already exists on disk (idempotent by construction).
    pub fn write(mut self, dir: Option<&Path>) -> anyhow::Result<[u8; 20]> {
        let mut content = Vec::new();
        self.reader
            .read_to_end(&mut content)
            .context("reading object content before writing")?;
        write_object(self.header.typ, &content, dir)
    }
}

/// `SHA1("<kind> <len>\0" || payload)`.
pub fn hash_object(typ: ObjectType, payload: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(typ.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(payload.len().to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(payload);
    hasher.finalize().into()
}

/// Computes `(kind, payload)`'s identity, and unless an object with that
/// identity is already present, zlib-deflates the framed form and writes
/// it to its loose-object path. Used directly by the pack decoder, which
/// works with fully-materialized payloads rather than streaming readers.
pub fn write_object(
    typ: ObjectType,
    payload: &[u8],
    dir: Option<&Path>,
) -> anyhow::Result<[u8; 20]> {
    let id = hash_object(typ, payload);
    let id_hex = hex::encode(id);
    let path = hash_to_path(&id_hex, dir);

    if path.exists() {
        return Ok(id);
    }

    let parent = path.parent().expect("object path always has a parent");
    fs::create_dir_all(parent)
        .with_context(|| format!("creating object directory {}", parent.display()))?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(typ.as_str().as_bytes())?;
    encoder.write_all(b" ")?;
    encoder.write_all(payload.len().to_string().as_bytes())?;
    encoder.write_all(b"\0")?;
    encoder.write_all(payload)?;
    let compressed = encoder.finish().context("finishing zlib stream")?;

    // Write to a temp file in the same directory first, then rename, so a
    // reader never observes a partially-written object file.
    let tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("creating temp file in {}", parent.display()))?;
    fs::write(tmp.path(), &compressed).context("writing compressed object bytes")?;
    tmp.persist(&path)
        .with_context(|| format!("finalizing object file {}", path.display()))?;

    Ok(id)
}

/// Reads and inflates a whole object into memory by its identity. Used by the
/// pack decoder to resolve `REF_DELTA` bases and by checkout to read
/// trees/blobs/commits.
pub fn read_object(id: &str, dir: Option<&Path>) -> anyhow::Result<(ObjectType, Vec<u8>)> {
    let mut object = ObjectFile::<BufReader<ZlibDecoder<File>>>::read(id, dir)?;
    let mut payload = Vec::with_capacity(object.header.size);
    object
        .reader
        .read_to_end(&mut payload)
        .with_context(|| format!("reading object content for {id}"))?;

    ensure!(
        payload.len() == object.header.size,
        GitError::CorruptObject {
            id: id.to_owned(),
            reason: format!(
                "declared size {} does not match inflated length {}",
                object.header.size,
                payload.len()
            ),
        }
    );

    Ok((object.header.typ, payload))
}

pub fn hash_to_path(id: &str, dir: Option<&Path>) -> PathBuf {
    let (prefix, rest) = id.split_at(2);
    let mut path = match dir {
        Some(dir) => dir.join(".git").join(OBJECTS_DIR),
        None => PathBuf::from(".git").join(OBJECTS_DIR),
    };
    path.push(prefix);
    path.push(rest);
    path
}
