//! PIN-to-key derivation
//!
//! An iterated-hash construction for a platform that offers a digest but no
//! MAC primitive:
//!
//! ```text
//! T1 = SHA1(secret || salt || BE32(1))
//! Ti = SHA1(secret || T(i-1))          for i = 2..=iterations
//! K  = (T1 ^ T2 ^ ... ^ Tn)[..16]
//! ```
//!
//! Using a different iteration count than the one used at wrap time yields a
//! different key without any error.

use zeroize::Zeroizing;

use super::hash::{HashOperations, SHA1_LEN};
use crate::error::CryptoError;

/// Derived key length (AES-128)
pub const DERIVED_KEY_LEN: usize = 16;

/// Production iteration count
pub const KDF_ITERATIONS: u32 = 1000;

/// Derive a 16-byte symmetric key from `secret` and `salt`
pub fn derive(
    secret: &[u8],
    salt: &[u8],
    iterations: u32,
) -> Result<Zeroizing<[u8; DERIVED_KEY_LEN]>, CryptoError> {
    if iterations == 0 {
        return Err(CryptoError::KdfIterations);
    }

    let mut block: Zeroizing<[u8; SHA1_LEN]> =
        Zeroizing::new(HashOperations::sha1_parts(&[secret, salt, &1u32.to_be_bytes()]));
    let mut acc: Zeroizing<[u8; SHA1_LEN]> = block.clone();

    for _ in 1..iterations {
        *block = HashOperations::sha1_parts(&[secret, &block[..]]);
        acc.iter_mut().zip(block.iter()).for_each(|(a, b)| *a ^= b);
    }

    let mut key = Zeroizing::new([0u8; DERIVED_KEY_LEN]);
    key.copy_from_slice(&acc[..DERIVED_KEY_LEN]);
    Ok(key)
}
