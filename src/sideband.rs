//! Side-band demultiplexer: splits the pack stream out of a
//! side-band-64k-framed `git-upload-pack` response, routing progress and
//! error bands to the diagnostic log instead of the pack buffer.

use anyhow::{bail, Context};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::{info, warn};

use crate::error::GitError;
use crate::pktline::{self, PktLine};

const BAND_PACK: u8 = 1;
const BAND_PROGRESS: u8 = 2;
const BAND_ERROR: u8 = 3;

/// Demultiplexes `body` (the full response to the `POST
/// .../git-upload-pack` request) into a contiguous pack byte stream.
///
/// Tolerates a remote that sends unframed pack data directly, with no
/// side-band negotiated, or a literal `PACK` signature appearing before
/// any band indicator is seen.
pub fn demux(mut body: Bytes) -> anyhow::Result<Bytes> {
    let mut pack = BytesMut::new();
    let mut error_messages = Vec::new();
    let mut saw_pack = false;

    while !body.is_empty() {
        // A pragmatic tolerance: some responses put the literal PACK
        // signature directly on the wire without any side-band framing
        // at all. Detect that before attempting to parse a pkt-line.
        if !saw_pack && body.starts_with(b"PACK") {
            pack.put(body.clone());
            saw_pack = true;
            break;
        }

        match pktline::read_one(&mut body).context("reading side-band pkt-line")? {
            PktLine::Flush => {
                if saw_pack {
                    break;
                }
                continue;
            }
            PktLine::Data(mut data) => {
                if data.is_empty() {
                    continue;
                }

                // Some servers precede the pack with a bare NAK/ACK line
                // that carries no band indicator at all when multi_ack
                // was not negotiated; tolerate and skip it.
                if data.starts_with(b"NAK") || data.starts_with(b"ACK") {
                    continue;
                }

                let band = data.get_u8();

                match band {
                    BAND_PACK => {
                        saw_pack = true;
                        pack.put(data);
                    }
                    BAND_PROGRESS => {
                        info!("remote: {}", String::from_utf8_lossy(&data).trim_end());
                    }
                    BAND_ERROR => {
                        let msg = String::from_utf8_lossy(&data).trim_end().to_string();
                        warn!("remote error: {msg}");
                        error_messages.push(msg);
                    }
                    other => {
                        bail!(GitError::Protocol(format!(
                            "unknown side-band indicator {other}"
                        )));
                    }
                }
            }
        }
    }

    if !saw_pack {
        bail!(GitError::Protocol(format!(
            "no PACK signature observed in response{}",
            if error_messages.is_empty() {
                String::new()
            } else {
                format!("; remote reported: {}", error_messages.join("; "))
            }
        )));
    }

    Ok(pack.freeze())
}
