//! Key encodings for the MVCC column families.
//!
//! ## Versioned keys (data and write CFs)
//!
//! ```text
//!   [memcomparable(user_key)] [be(!ts): 8 bytes]
//! ```
//!
//! The user key is encoded in 8-byte groups, each followed by a marker byte
//! (`0xFF` for a full group with more data, `0xF7 + n` for the final group
//! holding `n` meaningful bytes). Group encoding keeps all versions of one
//! user key contiguous even when another user key is a byte-prefix of it.
//! The timestamp is bit-inverted before the big-endian append, so larger
//! timestamps sort first: a forward seek at `encode(key, T)` lands on the
//! newest version with `ts <= T`.
//!
//! ## Raw keys
//!
//! Client-visible raw-KV keys carry a one-byte namespace tag `w`. Region
//! ranges are expressed in the tagged space as well, so ranges stored by the
//! coordinator and keys routed by clients always compare in the same space.

use basalt_common::error::EngineError;

const GROUP_SIZE: usize = 8;
const GROUP_FULL_MARKER: u8 = 0xFF;
const GROUP_EMPTY_MARKER: u8 = 0xF7;

/// Namespace tag for client raw-KV keys.
pub const RAW_KEY_TAG: u8 = b'w';

/// Largest timestamp; used as the seek bound for "newest visible" lookups.
pub const MAX_TS: u64 = u64::MAX;

/// Encode a user key into the memcomparable group form.
pub fn encode_bytes(key: &[u8]) -> Vec<u8> {
    let groups = key.len() / GROUP_SIZE + 1;
    let mut buf = Vec::with_capacity(groups * (GROUP_SIZE + 1));
    for chunk in key.chunks(GROUP_SIZE) {
        if chunk.len() == GROUP_SIZE {
            buf.extend_from_slice(chunk);
            buf.push(GROUP_FULL_MARKER);
        } else {
            buf.extend_from_slice(chunk);
            buf.extend(std::iter::repeat(0u8).take(GROUP_SIZE - chunk.len()));
            buf.push(GROUP_EMPTY_MARKER + chunk.len() as u8);
        }
    }
    if key.len() % GROUP_SIZE == 0 {
        buf.extend(std::iter::repeat(0u8).take(GROUP_SIZE));
        buf.push(GROUP_EMPTY_MARKER);
    }
    buf
}

/// Decode a memcomparable group form back into the user key. Returns the key
/// and the number of encoded bytes consumed.
pub fn decode_bytes(encoded: &[u8]) -> Result<(Vec<u8>, usize), EngineError> {
    let mut key = Vec::new();
    let mut offset = 0;
    loop {
        if encoded.len() < offset + GROUP_SIZE + 1 {
            return Err(EngineError::Corruption {
                cf: "write",
                key: encoded.to_vec(),
                reason: "truncated key group".into(),
            });
        }
        let group = &encoded[offset..offset + GROUP_SIZE];
        let marker = encoded[offset + GROUP_SIZE];
        offset += GROUP_SIZE + 1;
        if marker == GROUP_FULL_MARKER {
            key.extend_from_slice(group);
            continue;
        }
        let valid = marker.wrapping_sub(GROUP_EMPTY_MARKER) as usize;
        if valid > GROUP_SIZE {
            return Err(EngineError::Corruption {
                cf: "write",
                key: encoded.to_vec(),
                reason: format!("bad group marker {marker:#x}"),
            });
        }
        key.extend_from_slice(&group[..valid]);
        return Ok((key, offset));
    }
}

/// Encode a versioned key for the data or write CF.
pub fn encode_txn_key(user_key: &[u8], ts: u64) -> Vec<u8> {
    let mut buf = encode_bytes(user_key);
    buf.extend_from_slice(&(!ts).to_be_bytes());
    buf
}

/// Decode a versioned key into `(user_key, ts)`.
pub fn decode_txn_key(encoded: &[u8]) -> Result<(Vec<u8>, u64), EngineError> {
    let (user_key, consumed) = decode_bytes(encoded)?;
    let rest = &encoded[consumed..];
    if rest.len() != 8 {
        return Err(EngineError::Corruption {
            cf: "write",
            key: encoded.to_vec(),
            reason: format!("expected 8 trailing ts bytes, got {}", rest.len()),
        });
    }
    let mut ts_bytes = [0u8; 8];
    ts_bytes.copy_from_slice(rest);
    Ok((user_key, !u64::from_be_bytes(ts_bytes)))
}

/// Prefix a raw user key with the client namespace tag.
pub fn encode_raw_key(key: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(key.len() + 1);
    buf.push(RAW_KEY_TAG);
    buf.extend_from_slice(key);
    buf
}

/// The smallest key strictly greater than `key`: `key + '\0'`. Used to form
/// an exclusive upper bound from an inclusive one.
pub fn prefix_next(key: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(key.len() + 1);
    buf.extend_from_slice(key);
    buf.push(0);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_roundtrip() {
        for key in [
            b"".as_slice(),
            b"a",
            b"12345678",
            b"123456789",
            b"0123456789abcdef",
        ] {
            let enc = encode_bytes(key);
            let (dec, consumed) = decode_bytes(&enc).unwrap();
            assert_eq!(dec, key);
            assert_eq!(consumed, enc.len());
        }
    }

    #[test]
    fn txn_key_roundtrip() {
        let enc = encode_txn_key(b"user", 42);
        let (key, ts) = decode_txn_key(&enc).unwrap();
        assert_eq!(key, b"user");
        assert_eq!(ts, 42);
    }

    #[test]
    fn newer_timestamps_sort_first() {
        let k10 = encode_txn_key(b"k", 10);
        let k20 = encode_txn_key(b"k", 20);
        let k30 = encode_txn_key(b"k", 30);
        assert!(k30 < k20);
        assert!(k20 < k10);
    }

    #[test]
    fn versions_of_prefix_related_keys_stay_grouped() {
        // All versions of "a" must sort strictly before all versions of
        // "ab", otherwise scans interleave user keys.
        let a_new = encode_txn_key(b"a", u64::MAX);
        let a_old = encode_txn_key(b"a", 0);
        let ab_new = encode_txn_key(b"ab", u64::MAX);
        assert!(a_new < a_old);
        assert!(a_old < ab_new);

        let long = encode_txn_key(b"12345678", 5);
        let longer = encode_txn_key(b"123456789", 5);
        assert!(long < longer);
    }

    #[test]
    fn user_key_order_is_preserved() {
        let mut keys: Vec<&[u8]> = vec![b"", b"a", b"a\x00", b"ab", b"b", b"12345678"];
        keys.sort();
        let encoded: Vec<Vec<u8>> = keys.iter().map(|k| encode_bytes(k)).collect();
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(encoded, sorted);
    }

    #[test]
    fn prefix_next_is_adjacent() {
        let next = prefix_next(b"p");
        assert!(next.as_slice() > b"p".as_slice());
        assert_eq!(next, b"p\x00");
    }

    #[test]
    fn raw_key_carries_namespace_tag() {
        assert_eq!(encode_raw_key(b"k"), b"wk");
    }

    #[test]
    fn bad_group_marker_is_corruption() {
        let mut enc = encode_bytes(b"abc");
        let last = enc.len() - 1;
        enc[last] = 0x42;
        assert!(decode_bytes(&enc).is_err());
    }
}
