//! Ref discovery: `GET <url>/info/refs?service=git-upload-pack`,
//! parsed as a pkt-line stream into a map from ref name to either a direct
//! 40-hex identity or a symbolic `"ref: <name>"` pointer.

use std::collections::BTreeMap;

use anyhow::Context;
use bytes::Bytes;
use log::debug;
use reqwest::blocking::Client;
use reqwest::StatusCode;

use crate::error::GitError;
use crate::pktline::{self, PktLine};

pub const SERVICE: &str = "git-upload-pack";
const USER_AGENT: &str = concat!("gitkit/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefValue {
    Direct(String),
    Symbolic(String),
}

#[derive(Debug, Default)]
pub struct RefMap {
    pub refs: BTreeMap<String, RefValue>,
}

impl RefMap {
    /// Resolves `HEAD`, following at most one level of symbolic
    /// indirection (real `HEAD`s never point at another symref), to the
    /// commit it identifies and, if `HEAD` was symbolic, the branch name.
    pub fn resolve_head(&self) -> anyhow::Result<(String, Option<String>)> {
        match self.refs.get("HEAD") {
            Some(RefValue::Direct(id)) => Ok((id.clone(), None)),
            Some(RefValue::Symbolic(target)) => {
                let name = target
                    .strip_prefix("ref: ")
                    .unwrap_or(target)
                    .trim()
                    .to_string();
                match self.refs.get(&name) {
                    Some(RefValue::Direct(id)) => Ok((id.clone(), Some(name))),
                    _ => anyhow::bail!(GitError::Protocol(format!(
                        "HEAD points at unknown ref '{name}'"
                    ))),
                }
            }
            None => anyhow::bail!(GitError::Protocol("remote advertised no HEAD".into())),
        }
    }
}

/// Issues the ref-discovery GET and parses the response.
pub fn discover(base_url: &str) -> anyhow::Result<RefMap> {
    let url = format!("{base_url}/info/refs?service={SERVICE}");

    let client = Client::new();
    let resp = client
        .get(&url)
        .header("User-Agent", USER_AGENT)
        .send()
        .map_err(|e| GitError::Transport(format!("GET {url}: {e}")))?;

    let status = resp.status();
    if status != StatusCode::OK {
        anyhow::bail!(GitError::Transport(format!("GET {url} returned {status}")));
    }

    let body = resp
        .bytes()
        .map_err(|e| GitError::Transport(format!("reading ref advertisement body: {e}")))?;

    parse_advertisement(body)
}

fn parse_advertisement(body: Bytes) -> anyhow::Result<RefMap> {
    let mut buf = body;

    let first = pktline::read_one(&mut buf).context("reading first pkt-line of advertisement")?;

    let mut ref_lines: Vec<Bytes> = Vec::new();
    match first {
        PktLine::Flush => {}
        PktLine::Data(line) if line.starts_with(b"# service=") => {
            // The service announcement is conventionally followed by its
            // own flush packet; tolerate servers that omit it.
            let mut lookahead = buf.clone();
            if let Ok(PktLine::Flush) = pktline::read_one(&mut lookahead) {
                buf = lookahead;
            }
            ref_lines = pktline::read_until_flush(&mut buf)?;
        }
        PktLine::Data(line) => {
            ref_lines.push(line);
            ref_lines.extend(pktline::read_until_flush(&mut buf)?);
        }
    }

    let mut refs = BTreeMap::new();
    for (i, line) in ref_lines.iter().enumerate() {
        let line = std::str::from_utf8(line)
            .map_err(|_| GitError::Protocol("ref advertisement line is not UTF-8".into()))?
            .trim_end_matches('\n');

        // A malformed first line without a space simply fails to parse
        // as a ref and is skipped with a warning rather than aborting
        // discovery outright.
        let (info, caps) = match line.split_once('\0') {
            Some((info, caps)) => (info, Some(caps)),
            None => (line, None),
        };

        let Some((id, name)) = info.split_once(' ') else {
            debug!("ref advertisement line {i} has no space separator, skipping: {info:?}");
            continue;
        };

        refs.insert(name.to_string(), RefValue::Direct(id.to_string()));

        if let Some(caps) = caps {
            for cap in caps.split_whitespace() {
                if let Some(rest) = cap.strip_prefix("symref=") {
                    if let Some((sym_name, target)) = rest.split_once(':') {
                        refs.insert(
                            sym_name.to_string(),
                            RefValue::Symbolic(format!("ref: {target}\n")),
                        );
                    }
                }
            }
        }
    }

    Ok(RefMap { refs })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkt(data: &[u8]) -> Vec<u8> {
        pktline::encode(data)
    }

    #[test]
    fn parses_service_announcement_and_symref() {
        let mut body = Vec::new();
        body.extend(pkt(b"# service=git-upload-pack\n"));
        body.extend(pktline::flush());
        body.extend(pkt(b"6c073b08f7987018cbb2cb9a5747c84913b3608e HEAD\0symref=HEAD:refs/heads/main agent=git/2.0\n"));
        body.extend(pkt(b"6c073b08f7987018cbb2cb9a5747c84913b3608e refs/heads/main\n"));
        body.extend(pktline::flush());

        let map = parse_advertisement(Bytes::from(body)).unwrap();
        assert_eq!(
            map.refs.get("refs/heads/main"),
            Some(&RefValue::Direct(
                "6c073b08f7987018cbb2cb9a5747c84913b3608e".into()
            ))
        );
        assert_eq!(
            map.refs.get("HEAD"),
            Some(&RefValue::Symbolic("ref: refs/heads/main\n".into()))
        );

        let (id, branch) = map.resolve_head().unwrap();
        assert_eq!(id, "6c073b08f7987018cbb2cb9a5747c84913b3608e");
        assert_eq!(branch.as_deref(), Some("refs/heads/main"));
    }

    #[test]
    fn detached_head_is_direct() {
        let mut body = Vec::new();
        body.extend(pkt(b"# service=git-upload-pack\n"));
        body.extend(pktline::flush());
        body.extend(pkt(
            b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa HEAD\0agent=git/2.0\n",
        ));
        body.extend(pktline::flush());

        let map = parse_advertisement(Bytes::from(body)).unwrap();
        let (id, branch) = map.resolve_head().unwrap();
        assert_eq!(id, "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        assert_eq!(branch, None);
    }
}
