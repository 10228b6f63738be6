//! Hash Operations
//!
//! SHA-1 is the only digest the card uses: PIN hashes, the KDF chain,
//! the ledger chain hash, and challenge digests.

use digest::Digest;
use sha1::Sha1;

/// SHA-1 output length in bytes
pub const SHA1_LEN: usize = 20;

/// Hash Operations
pub struct HashOperations;

impl HashOperations {
    /// Compute SHA-1 hash
    pub fn sha1(data: &[u8]) -> [u8; SHA1_LEN] {
        Self::sha1_parts(&[data])
    }

    /// SHA-1 over the concatenation of `parts`, without building the buffer
    pub fn sha1_parts(parts: &[&[u8]]) -> [u8; SHA1_LEN] {
        let mut hasher = Sha1::new();
        for part in parts {
            hasher.update(part);
        }
        hasher.finalize().into()
    }
}
