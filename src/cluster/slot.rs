//! Cluster slot calculation.
//!
//! Keys map to one of 16384 slots through CRC16 (XMODEM variant) modulo
//! 16384. A non-empty `{...}` hash tag narrows the hashed input so related
//! keys land on the same slot.

use crc::{Crc, CRC_16_XMODEM};

/// Number of hash slots in a cluster.
pub const SLOT_COUNT: u16 = 16384;

/// Highest valid slot.
pub const MAX_SLOT: u16 = SLOT_COUNT - 1;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// CRC16/XMODEM of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Calculates the cluster slot for a given key.
///
/// If the key contains `{...}`, only the content inside the braces
/// is used for hashing (hash tags).
///
/// # Examples
///
/// ```
/// use shardwire::cluster::key_slot;
///
/// assert_eq!(key_slot("foo"), 12182);
/// assert_eq!(key_slot("{user1000}.following"), key_slot("{user1000}.followers"));
/// assert_ne!(key_slot("user1000"), key_slot("user2000"));
/// ```
pub fn key_slot(key: impl AsRef<[u8]>) -> u16 {
    crc16(extract_hash_tag(key.as_ref())) % SLOT_COUNT
}

/// Extracts the hash tag from a key.
///
/// - `{user1000}.following` → `user1000`
/// - `foo{bar}baz` → `bar`
/// - `foo{}{bar}` → whole key (the first pair is empty)
/// - `foo` → whole key
pub(crate) fn extract_hash_tag(key: &[u8]) -> &[u8] {
    if let Some(start) = key.iter().position(|&b| b == b'{') {
        let tag_start = start + 1;
        if let Some(len) = key[tag_start..].iter().position(|&b| b == b'}') {
            if len > 0 {
                return &key[tag_start..tag_start + len];
            }
        }
    }

    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_check_value() {
        assert_eq!(crc16(b"123456789"), 0x31C3);
    }

    #[test]
    fn test_key_slot_regression_vector() {
        let expected = [9207, 13270, 949, 5012, 9075, 13138, 817, 4880, 8959, 13022];
        for (i, slot) in expected.iter().enumerate() {
            assert_eq!(key_slot(format!("key:00{}", i)), *slot, "key:00{}", i);
        }
        assert_eq!(key_slot("foo"), 12182);
    }

    #[test]
    fn test_key_slot_with_hash_tag() {
        assert_eq!(key_slot("foo{tag}bar"), key_slot("{tag}"));
        assert_eq!(key_slot("{tag}"), 8338);

        let slot1 = key_slot("{user1000}.following");
        let slot2 = key_slot("{user1000}.followers");
        assert_eq!(slot1, slot2);
    }

    #[test]
    fn test_key_slot_hash_tag_vs_no_tag() {
        let with_tag = key_slot("{user}1000");
        let without_tag = key_slot("user1000");
        assert_ne!(with_tag, without_tag);
        assert_eq!(with_tag, key_slot("{user}2000"));
    }

    #[test]
    fn test_extract_hash_tag_simple() {
        assert_eq!(extract_hash_tag(b"foo{bar}"), b"bar");
        assert_eq!(extract_hash_tag(b"prefix{tag}suffix"), b"tag");
        assert_eq!(extract_hash_tag(b"simple_key"), b"simple_key");
    }

    #[test]
    fn test_extract_hash_tag_empty() {
        assert_eq!(extract_hash_tag(b"foo{}bar"), b"foo{}bar");
        assert_eq!(extract_hash_tag(b"foo{}{bar}"), b"foo{}{bar}");
        assert_eq!(extract_hash_tag(b"{}"), b"{}");
    }

    #[test]
    fn test_extract_hash_tag_multiple_braces() {
        assert_eq!(extract_hash_tag(b"foo{bar}{baz}"), b"bar");
        assert_eq!(extract_hash_tag(b"{a}{b}{c}"), b"a");
        assert_eq!(extract_hash_tag(b"{{a}}"), b"{a");
    }

    #[test]
    fn test_extract_hash_tag_unmatched() {
        assert_eq!(extract_hash_tag(b"foo{bar"), b"foo{bar");
        assert_eq!(extract_hash_tag(b"foo}bar"), b"foo}bar");
        assert_eq!(extract_hash_tag(b"{"), b"{");
    }

    #[test]
    fn test_key_slot_binary_key() {
        let slot = key_slot(&b"\x00\xff\r\n"[..]);
        assert!(slot < SLOT_COUNT);
        assert_eq!(slot, key_slot(vec![0u8, 0xff, b'\r', b'\n']));
    }

    #[test]
    fn test_key_slot_distribution() {
        let mut slots = std::collections::HashSet::new();
        for i in 0..100 {
            slots.insert(key_slot(format!("key{}", i)));
        }
        assert!(slots.len() >= 50, "Keys should distribute across slots");
    }
}
