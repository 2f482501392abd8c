//! Key hashing strategies.
//!
//! Slot routing uses [`Crc16Hash`]; the consistent-hash ring uses
//! [`Md5Hash`] for keys and [`ring_points`] for its virtual nodes. Both are
//! fixed to little-endian word order so results are identical on every
//! platform.

use md5::{Digest, Md5};

use crate::cluster::slot::key_slot;

/// Deterministic key → integer hash.
pub trait HashGenerator: Send + Sync {
    /// Hashes a key.
    fn hash(&self, key: &[u8]) -> u32;
}

/// Cluster slot of the key: CRC16 with hash tags, reduced modulo 16384.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc16Hash;

impl HashGenerator for Crc16Hash {
    fn hash(&self, key: &[u8]) -> u32 {
        u32::from(key_slot(key))
    }
}

/// First little-endian 32-bit word of the key's MD5 digest.
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5Hash;

impl HashGenerator for Md5Hash {
    fn hash(&self, key: &[u8]) -> u32 {
        let digest = Md5::digest(key);
        u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
    }
}

/// The four ring positions of virtual node `index` of `node`: the MD5
/// digest of `"<node>-<index>"` split into little-endian 32-bit words.
pub fn ring_points(node: &str, index: usize) -> [u32; 4] {
    let digest = Md5::digest(format!("{}-{}", node, index).as_bytes());
    let mut points = [0u32; 4];
    for (point, word) in points.iter_mut().zip(digest.chunks_exact(4)) {
        *point = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
    }
    points
}
