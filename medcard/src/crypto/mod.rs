//! Cryptographic Operations
//!
//! SHA-1 helpers, the PIN-to-key derivation, AES-128 ECB, and RSA.

pub mod aes;
pub mod hash;
pub mod kdf;
pub mod rsa;

pub use self::aes::AesOperations;
pub use self::hash::HashOperations;
pub use self::kdf::{derive, DERIVED_KEY_LEN, KDF_ITERATIONS};
pub use self::rsa::{RsaComponents, RsaOperations};

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::CryptoError;

/// Fill a fixed buffer from the OS random source
pub fn random_bytes<const N: usize>() -> Result<[u8; N], CryptoError> {
    let mut out = [0u8; N];
    OsRng.try_fill_bytes(&mut out).map_err(|_| CryptoError::Random)?;
    Ok(out)
}
