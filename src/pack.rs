//! Packfile decoder: parses the `PACK` header, each object's
//! variable-length header and zlib body, resolves `REF_DELTA` objects
//! against the object store, and validates the trailing SHA-1.

use std::io::Read;
use std::path::Path;

use anyhow::{bail, ensure};
use flate2::read::ZlibDecoder;
use log::warn;
use sha1::{Digest, Sha1};

use crate::delta;
use crate::error::GitError;
use crate::object::{self, ObjectType};

const TYPE_COMMIT: u8 = 1;
const TYPE_TREE: u8 = 2;
const TYPE_BLOB: u8 = 3;
const TYPE_TAG: u8 = 4;
const TYPE_OFS_DELTA: u8 = 6;
const TYPE_REF_DELTA: u8 = 7;

#[derive(Debug, Default)]
pub struct DecodeReport {
    /// Identities of objects written to the store during this decode
    /// (non-delta objects and resolved `REF_DELTA`s).
    pub written: Vec<(ObjectType, String)>,
    pub resolved_deltas: usize,
    pub skipped_ofs_deltas: usize,
    pub skipped_errors: usize,
    pub checksum_ok: bool,
}

/// Decodes a full pack byte sequence, writing resolved objects into the
/// store rooted at `dir` (or the ambient `.git` when `None`).
pub fn decode(pack: &[u8], dir: Option<&Path>) -> anyhow::Result<DecodeReport> {
    ensure!(
        pack.len() >= 12,
        GitError::Protocol("pack is shorter than its own header".into())
    );

    if &pack[0..4] != b"PACK" {
        warn!("pack is missing the 'PACK' signature, continuing anyway");
    }

    let version = u32::from_be_bytes(pack[4..8].try_into().unwrap());
    if version != 2 {
        warn!("pack declares version {version}, expected 2");
    }

    let count = u32::from_be_bytes(pack[8..12].try_into().unwrap());

    let mut report = DecodeReport::default();
    let mut pos = 12usize;
    let body_end = pack.len().saturating_sub(20);

    for i in 0..count {
        if pos >= body_end {
            warn!("pack truncated after {i} of {count} declared objects");
            break;
        }

        let (type_code, declared_size, header_len) = read_object_header(&pack[pos..])?;
        pos += header_len;

        match type_code {
            TYPE_COMMIT | TYPE_TREE | TYPE_BLOB | TYPE_TAG => {
                let typ = type_from_code(type_code)?;
                let (payload, consumed) = inflate_at(&pack[pos..])?;
                pos += consumed;

                if payload.len() != declared_size {
                    warn!(
                        "object {i} declared size {declared_size} but inflated to {}, skipping",
                        payload.len()
                    );
                    report.skipped_errors += 1;
                    continue;
                }

                let id = object::write_object(typ, &payload, dir)?;
                report.written.push((typ, hex::encode(id)));
            }
            TYPE_OFS_DELTA => {
                let (_negative_offset, offset_len) = read_ofs_delta_offset(&pack[pos..])?;
                pos += offset_len;
                let (_discarded, consumed) = inflate_at(&pack[pos..])?;
                pos += consumed;
                warn!("{}", GitError::UnsupportedObject(format!("OBJ_OFS_DELTA at object {i}")));
                report.skipped_ofs_deltas += 1;
            }
            TYPE_REF_DELTA => {
                ensure!(
                    pack.len() >= pos + 20,
                    GitError::Protocol("pack truncated inside REF_DELTA base id".into())
                );
                let base_id = hex::encode(&pack[pos..pos + 20]);
                pos += 20;

                let (delta_bytes, consumed) = inflate_at(&pack[pos..])?;
                pos += consumed;

                match resolve_ref_delta(&base_id, &delta_bytes, dir) {
                    Ok((typ, id)) => {
                        report.written.push((typ, id));
                        report.resolved_deltas += 1;
                    }
                    Err(e) => {
                        warn!("skipping REF_DELTA against {base_id}: {e:#}");
                        report.skipped_errors += 1;
                    }
                }
            }
            other => bail!(GitError::Protocol(format!("unknown pack object type {other}"))),
        }
    }

    report.checksum_ok = verify_trailer(pack);
    if !report.checksum_ok {
        warn!("pack trailer checksum did not match (non-fatal)");
    }

    Ok(report)
}

fn resolve_ref_delta(
    base_id: &str,
    delta_bytes: &[u8],
    dir: Option<&Path>,
) -> anyhow::Result<(ObjectType, String)> {
    let (base_type, base_payload) = object::read_object(base_id, dir)
        .map_err(|_| GitError::BaseMissing(base_id.to_string()))?;
    let target = delta::apply(&base_payload, delta_bytes)?;
    let id = object::write_object(base_type, &target, dir)?;
    Ok((base_type, hex::encode(id)))
}

fn type_from_code(code: u8) -> anyhow::Result<ObjectType> {
    Ok(match code {
        TYPE_COMMIT => ObjectType::Commit,
        TYPE_TREE => ObjectType::Tree,
        TYPE_BLOB => ObjectType::Blob,
        TYPE_TAG => ObjectType::Tag,
        other => bail!(GitError::Protocol(format!("unexpected object type code {other}"))),
    })
}

/// Per-object variable-length header: byte 0's top bit is a continuation
/// flag, the next 3 bits are the type, and the low 4 bits are the first 4
/// bits of the inflated size; each continuation byte contributes 7 more
/// bits at shift 4, 11, 18, ...
fn read_object_header(buf: &[u8]) -> anyhow::Result<(u8, usize, usize)> {
    ensure!(
        !buf.is_empty(),
        GitError::Protocol("pack truncated before object header".into())
    );

    let b0 = buf[0];
    let type_code = (b0 >> 4) & 0x07;
    let mut size = (b0 & 0x0f) as usize;
    let mut shift = 4u32;
    let mut i = 1usize;
    let mut cont = b0 & 0x80 != 0;

    while cont {
        ensure!(
            i < buf.len(),
            GitError::Protocol("pack truncated inside object size varint".into())
        );
        let b = buf[i];
        i += 1;
        size |= ((b & 0x7f) as usize)
            .checked_shl(shift)
            .ok_or_else(|| GitError::Protocol("object size varint overflow".into()))?;
        shift += 7;
        cont = b & 0x80 != 0;
    }

    Ok((type_code, size, i))
}

/// `OFS_DELTA`'s distinct negative-offset varint: initial value is the
/// low 7 bits of the first byte; each continuation byte folds in as
/// `((value + 1) << 7) | low7`.
fn read_ofs_delta_offset(buf: &[u8]) -> anyhow::Result<(u64, usize)> {
    ensure!(
        !buf.is_empty(),
        GitError::Protocol("pack truncated before OFS_DELTA offset".into())
    );
    let mut i = 0usize;
    let b0 = buf[i];
    i += 1;
    let mut value = (b0 & 0x7f) as u64;
    let mut cont = b0 & 0x80 != 0;

    while cont {
        ensure!(
            i < buf.len(),
            GitError::Protocol("pack truncated inside OFS_DELTA offset varint".into())
        );
        let b = buf[i];
        i += 1;
        value = ((value + 1) << 7) | (b & 0x7f) as u64;
        cont = b & 0x80 != 0;
    }

    Ok((value, i))
}

/// Inflates a zlib stream starting at `buf[0]`, returning the inflated
/// bytes and the exact number of *compressed* input bytes consumed so the
/// caller can advance its cursor precisely.
fn inflate_at(buf: &[u8]) -> anyhow::Result<(Vec<u8>, usize)> {
    let mut decoder = ZlibDecoder::new(buf);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| GitError::Protocol(format!("inflating object body: {e}")))?;
    let consumed = decoder.total_in() as usize;
    Ok((out, consumed))
}

fn verify_trailer(pack: &[u8]) -> bool {
    if pack.len() < 20 {
        return false;
    }
    let (body, trailer) = pack.split_at(pack.len() - 20);
    let mut hasher = Sha1::new();
    hasher.update(body);
    let computed: [u8; 20] = hasher.finalize().into();
    computed == trailer
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn object_header_byte(type_code: u8, size: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut b0 = (type_code << 4) | ((size & 0x0f) as u8);
        let mut size = size >> 4;
        if size > 0 {
            b0 |= 0x80;
        }
        out.push(b0);
        while size > 0 {
            let mut b = (size & 0x7f) as u8;
            size >>= 7;
            if size > 0 {
                b |= 0x80;
            }
            out.push(b);
        }
        out
    }

    fn build_pack(objects: &[(u8, Vec<u8>)]) -> Vec<u8> {
        let mut pack = Vec::new();
        pack.extend(b"PACK");
        pack.extend(2u32.to_be_bytes());
        pack.extend((objects.len() as u32).to_be_bytes());
        for (type_code, payload) in objects {
            pack.extend(object_header_byte(*type_code, payload.len()));
            pack.extend(zlib(payload));
        }
        let mut hasher = Sha1::new();
        hasher.update(&pack);
        pack.extend(hasher.finalize());
        pack
    }

    #[test]
    fn decodes_non_delta_objects_and_verifies_trailer() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git/objects")).unwrap();

        let pack = build_pack(&[(TYPE_BLOB, b"hello".to_vec())]);
        let report = decode(&pack, Some(dir.path())).unwrap();

        assert_eq!(report.written.len(), 1);
        assert!(report.checksum_ok);
        assert_eq!(report.resolved_deltas, 0);
    }

    #[test]
    fn resolves_ref_delta_against_just_written_base() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git/objects")).unwrap();

        let base_payload = b"foo".to_vec();
        let base_id = object::write_object(ObjectType::Blob, &base_payload, Some(dir.path())).unwrap();
        let base_id_hex = hex::encode(base_id);

        // Delta: source size 3, target size 6, copy all of base (offset 0,
        // size 3) then insert "bar".
        let mut delta_payload = vec![0x03, 0x06];
        delta_payload.push(0x80 | 0x10); // copy, one size byte, no offset bytes (offset 0)
        delta_payload.push(0x03); // size = 3
        delta_payload.push(0x03); // insert 3 bytes
        delta_payload.extend(b"bar");

        let mut pack = Vec::new();
        pack.extend(b"PACK");
        pack.extend(2u32.to_be_bytes());
        pack.extend(1u32.to_be_bytes());
        pack.extend(object_header_byte(TYPE_REF_DELTA, delta_payload.len()));
        pack.extend(hex::decode(&base_id_hex).unwrap());
        pack.extend(zlib(&delta_payload));
        let mut hasher = Sha1::new();
        hasher.update(&pack);
        pack.extend(hasher.finalize());

        let report = decode(&pack, Some(dir.path())).unwrap();
        assert_eq!(report.resolved_deltas, 1);

        let (_typ, new_id) = &report.written[0];
        let (typ, payload) = object::read_object(new_id, Some(dir.path())).unwrap();
        assert_eq!(typ, ObjectType::Blob);
        assert_eq!(payload, b"foobar");
    }

    #[test]
    fn ref_delta_with_missing_base_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git/objects")).unwrap();

        let delta_payload = vec![0x00, 0x00];
        let mut pack = Vec::new();
        pack.extend(b"PACK");
        pack.extend(2u32.to_be_bytes());
        pack.extend(1u32.to_be_bytes());
        pack.extend(object_header_byte(TYPE_REF_DELTA, delta_payload.len()));
        pack.extend([0xaa; 20]);
        pack.extend(zlib(&delta_payload));
        let mut hasher = Sha1::new();
        hasher.update(&pack);
        pack.extend(hasher.finalize());

        let report = decode(&pack, Some(dir.path())).unwrap();
        assert_eq!(report.written.len(), 0);
        assert_eq!(report.skipped_errors, 1);
    }
}
