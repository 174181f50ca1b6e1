//! pkt-line framing: `<4-hex-ascii length>` followed by `length - 4` bytes
//! of payload, or the literal `0000` flush marker.

use anyhow::{ensure, Context};
use bytes::{Buf, Bytes};

use crate::error::GitError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    Data(Bytes),
    Flush,
}

impl PktLine {
    pub fn is_flush(&self) -> bool {
        matches!(self, PktLine::Flush)
    }
}

/// Encodes a single payload as one pkt-line: the 4-hex-digit length of
/// `payload.len() + 4`, lowercase, zero-padded, followed by the payload.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.extend(format!("{:04x}", payload.len() + 4).into_bytes());
    out.extend_from_slice(payload);
    out
}

/// The literal flush packet.
pub fn flush() -> Vec<u8> {
    b"0000".to_vec()
}

/// Reads a single pkt-line off the front of `buf`, advancing it past the
/// frame. `buf` must contain at least the 4-byte length prefix.
pub fn read_one(buf: &mut Bytes) -> anyhow::Result<PktLine> {
    ensure!(
        buf.remaining() >= 4,
        GitError::Protocol("pkt-line truncated before length prefix".into())
    );

    let len_bytes = buf.copy_to_bytes(4);
    let len_str = std::str::from_utf8(&len_bytes)
        .map_err(|_| GitError::Protocol("pkt-line length is not ASCII".into()))?;
    let len = u16::from_str_radix(len_str, 16)
        .map_err(|_| GitError::Protocol(format!("invalid pkt-line length '{len_str}'")))?
        as usize;

    if len == 0 {
        return Ok(PktLine::Flush);
    }

    ensure!(
        len >= 4,
        GitError::Protocol(format!("pkt-line length {len} is shorter than its own header"))
    );
    let payload_len = len - 4;
    ensure!(
        buf.remaining() >= payload_len,
        GitError::Protocol("pkt-line payload shorter than declared length".into())
    );

    Ok(PktLine::Data(buf.copy_to_bytes(payload_len)))
}

/// Reads pkt-lines until (and not including) a flush packet, which is
/// consumed and not returned.
pub fn read_until_flush(buf: &mut Bytes) -> anyhow::Result<Vec<Bytes>> {
    let mut lines = Vec::new();
    loop {
        match read_one(buf).context("reading pkt-line stream")? {
            PktLine::Flush => break,
            PktLine::Data(data) => lines.push(data),
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_payloads() {
        for payload in [
            &b""[..],
            b"a",
            b"# service=git-upload-pack\n",
            &vec![b'x'; 1000],
        ] {
            let encoded = encode(payload);
            let mut bytes = Bytes::from(encoded);
            let decoded = read_one(&mut bytes).unwrap();
            assert_eq!(decoded, PktLine::Data(Bytes::copy_from_slice(payload)));
            assert_eq!(bytes.remaining(), 0);
        }
    }

    #[test]
    fn flush_packet_decodes_to_flush() {
        let mut bytes = Bytes::from_static(b"0000");
        assert_eq!(read_one(&mut bytes).unwrap(), PktLine::Flush);
    }

    #[test]
    fn read_until_flush_stops_before_flush() {
        let mut data = Vec::new();
        data.extend(encode(b"one"));
        data.extend(encode(b"two"));
        data.extend(flush());
        data.extend(encode(b"three"));

        let mut bytes = Bytes::from(data);
        let lines = read_until_flush(&mut bytes).unwrap();
        assert_eq!(lines, vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);
        // "three" pkt-line remains unread.
        assert_eq!(bytes.remaining(), 9);
    }

    #[test]
    fn truncated_length_is_protocol_error() {
        let mut bytes = Bytes::from_static(b"001");
        assert!(read_one(&mut bytes).is_err());
    }
}
