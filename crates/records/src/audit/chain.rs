//! HMAC-SHA-256 hash chain over audit events.
//!
//! `hash(n) = HMAC(chain_key, prev_hash(n) || fields(n))` with
//! `prev_hash(n) = hash(n - 1)` and [`GENESIS_HASH`] for the first event.
//! Each field is framed as a presence byte plus a big-endian length so no
//! two distinct events encode to the same input.

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// `prev_hash` of the first event in the chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

pub type ChainMac = Hmac<Sha256>;

/// The hashed columns of one event, in storage form.
#[derive(Debug, Clone, Copy)]
pub struct LinkFields<'a> {
    pub actor_id: Option<i64>,
    pub action: &'a str,
    pub resource_type: &'a str,
    pub resource_id: Option<&'a str>,
    pub metadata: &'a str,
    pub timestamp: &'a str,
}

/// Hex-encoded chain hash for `fields` following `prev_hash`.
///
/// `mac` is the keyed prototype held by the recorder; it is cloned, not consumed.
pub fn link_hash(mac: &ChainMac, prev_hash: &str, fields: &LinkFields<'_>) -> String {
    hex::encode(link_mac(mac, prev_hash, fields).finalize().into_bytes())
}

/// Whether `stored_hash` is the chain hash for `fields` following `prev_hash`.
///
/// The comparison runs in constant time. Only the lowercase hex form that
/// [`link_hash`] writes can match.
pub fn verify_link(
    mac: &ChainMac,
    prev_hash: &str,
    fields: &LinkFields<'_>,
    stored_hash: &str,
) -> bool {
    if stored_hash.bytes().any(|b| b.is_ascii_uppercase()) {
        return false;
    }
    let Ok(stored) = hex::decode(stored_hash) else {
        return false;
    };
    link_mac(mac, prev_hash, fields).verify_slice(&stored).is_ok()
}

fn link_mac(mac: &ChainMac, prev_hash: &str, fields: &LinkFields<'_>) -> ChainMac {
    let mut mac = mac.clone();
    frame(&mut mac, Some(prev_hash.as_bytes()));
    let actor = fields.actor_id.map(|id| id.to_be_bytes());
    frame(&mut mac, actor.as_ref().map(|b| &b[..]));
    frame(&mut mac, Some(fields.action.as_bytes()));
    frame(&mut mac, Some(fields.resource_type.as_bytes()));
    frame(&mut mac, fields.resource_id.map(str::as_bytes));
    frame(&mut mac, Some(fields.metadata.as_bytes()));
    frame(&mut mac, Some(fields.timestamp.as_bytes()));
    mac
}

fn frame(mac: &mut ChainMac, value: Option<&[u8]>) {
    match value {
        None => mac.update(&[0]),
        Some(bytes) => {
            mac.update(&[1]);
            mac.update(&(bytes.len() as u64).to_be_bytes());
            mac.update(bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(key: &[u8]) -> ChainMac {
        ChainMac::new_from_slice(key).unwrap()
    }

    fn fields<'a>(resource_id: Option<&'a str>, metadata: &'a str) -> LinkFields<'a> {
        LinkFields {
            actor_id: Some(1),
            action: "read",
            resource_type: "patient",
            resource_id,
            metadata,
            timestamp: "2026-10-19T08:00:00.000000Z",
        }
    }

    #[test]
    fn deterministic_for_same_input() {
        let m = mac(b"k");
        let f = fields(Some("4"), "{}");
        assert_eq!(link_hash(&m, GENESIS_HASH, &f), link_hash(&m, GENESIS_HASH, &f));
        assert_eq!(link_hash(&m, GENESIS_HASH, &f).len(), 64);
    }

    #[test]
    fn sensitive_to_every_input() {
        let m = mac(b"k");
        let base = link_hash(&m, GENESIS_HASH, &fields(Some("4"), "{}"));
        assert_ne!(base, link_hash(&m, "ff", &fields(Some("4"), "{}")));
        assert_ne!(base, link_hash(&m, GENESIS_HASH, &fields(Some("5"), "{}")));
        assert_ne!(base, link_hash(&m, GENESIS_HASH, &fields(None, "{}")));
        assert_ne!(base, link_hash(&m, GENESIS_HASH, &fields(Some("4"), "{\"a\":1}")));
        assert_ne!(base, link_hash(&mac(b"other"), GENESIS_HASH, &fields(Some("4"), "{}")));
    }

    #[test]
    fn absent_and_empty_are_distinct() {
        let m = mac(b"k");
        assert_ne!(
            link_hash(&m, GENESIS_HASH, &fields(None, "{}")),
            link_hash(&m, GENESIS_HASH, &fields(Some(""), "{}"))
        );
    }

    #[test]
    fn verify_link_accepts_only_the_matching_hash() {
        let m = mac(b"k");
        let f = fields(Some("4"), "{}");
        let hash = link_hash(&m, GENESIS_HASH, &f);
        assert!(verify_link(&m, GENESIS_HASH, &f, &hash));

        let mut flipped = hash.clone().into_bytes();
        flipped[63] = if flipped[63] == b'0' { b'1' } else { b'0' };
        let flipped = String::from_utf8(flipped).unwrap();
        assert!(!verify_link(&m, GENESIS_HASH, &f, &flipped));

        assert!(!verify_link(&m, GENESIS_HASH, &f, &hash[..62]));
        assert!(!verify_link(&m, GENESIS_HASH, &f, "not hex"));
        assert!(!verify_link(&m, GENESIS_HASH, &f, &hash.to_uppercase()));
        assert!(!verify_link(&m, GENESIS_HASH, &fields(None, "{}"), &hash));
    }
}
