//! Fetch request builder: the `want`/`done` negotiation body sent to
//! `git-upload-pack`.

use anyhow::ensure;

use crate::pktline;

const USER_AGENT: &str = concat!("gitkit/", env!("CARGO_PKG_VERSION"));

/// Builds the negotiation body for a non-empty set of wanted identities.
/// The capability string on the first `want` line is part of the wire
/// contract: declaring `side-band-64k` is what makes the response a
/// multiplexed stream (see `sideband`), and `thin-pack`/`ofs-delta` are
/// declared for conventional compatibility even though this core's
/// decoder only resolves `REF_DELTA` (see design notes on `OFS_DELTA`).
pub fn build_request(wants: &[String]) -> anyhow::Result<Vec<u8>> {
    ensure!(!wants.is_empty(), "fetch request requires at least one want");

    let mut body = Vec::new();

    let first = format!(
        "want {} multi_ack_detailed side-band-64k thin-pack ofs-delta agent={USER_AGENT}\n",
        wants[0]
    );
    body.extend(pktline::encode(first.as_bytes()));

    for id in &wants[1..] {
        body.extend(pktline::encode(format!("want {id}\n").as_bytes()));
    }

    body.extend(pktline::flush());
    body.extend(pktline::encode(b"done\n"));
    body.extend(pktline::flush());

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_want_carries_capabilities() {
        let body = build_request(&["a".repeat(40)]).unwrap();
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("side-band-64k"));
        assert!(text.contains("thin-pack"));
        assert!(text.contains("ofs-delta"));
        assert!(text.ends_with("0000"));
        assert!(text.contains("0009done\n"));
    }

    #[test]
    fn additional_wants_have_no_capabilities() {
        let body = build_request(&["a".repeat(40), "b".repeat(40)]).unwrap();
        let text = String::from_utf8(body).unwrap();
        assert_eq!(text.matches("side-band-64k").count(), 1);
        assert!(text.contains(&format!("want {}\n", "b".repeat(40))));
    }

    #[test]
    fn empty_wants_rejected() {
        assert!(build_request(&[]).is_err());
    }
}
