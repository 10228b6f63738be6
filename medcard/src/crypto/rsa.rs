//! RSA Operations
//!
//! Key generation and the challenge-signing transform used for card
//! authenticity proofs. Signing hashes the challenge with SHA-1, frames the
//! digest in a PKCS#1 v1.5 block-type-01 block without a DigestInfo prefix,
//! and raises it to the private exponent. Verification is the mirror image:
//! raise to the public exponent and compare the recovered digest.

use log::debug;
use rand::rngs::OsRng;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use super::hash::{HashOperations, SHA1_LEN};
use crate::apdu::{push_lv16, PayloadReader};
use crate::error::CryptoError;

/// Minimum number of FF filler bytes in a block-type-01 frame
const MIN_FILLER: usize = 8;

/// Raw big-endian key components, as persisted on the card
pub struct RsaComponents {
    pub n: Vec<u8>,
    pub e: Vec<u8>,
    pub d: Zeroizing<Vec<u8>>,
    pub p: Zeroizing<Vec<u8>>,
    pub q: Zeroizing<Vec<u8>>,
}

/// RSA Operations
pub struct RsaOperations;

impl RsaOperations {
    /// Generate a new RSA key pair
    pub fn generate_keypair(bits: usize) -> Result<RsaPrivateKey, CryptoError> {
        debug!("Generating RSA-{} keypair", bits);
        RsaPrivateKey::new(&mut OsRng, bits).map_err(|_| CryptoError::KeyGeneration)
    }

    /// Split a private key into its storable components
    pub fn split_private_key(key: &RsaPrivateKey) -> Result<RsaComponents, CryptoError> {
        let primes = key.primes();
        if primes.len() != 2 {
            return Err(CryptoError::KeyPairMissing);
        }
        Ok(RsaComponents {
            n: key.n().to_bytes_be(),
            e: key.e().to_bytes_be(),
            d: Zeroizing::new(key.d().to_bytes_be()),
            p: Zeroizing::new(primes[0].to_bytes_be()),
            q: Zeroizing::new(primes[1].to_bytes_be()),
        })
    }

    /// Rebuild a private key from stored components
    pub fn join_private_key(parts: &RsaComponents) -> Result<RsaPrivateKey, CryptoError> {
        RsaPrivateKey::from_components(
            BigUint::from_bytes_be(&parts.n),
            BigUint::from_bytes_be(&parts.e),
            BigUint::from_bytes_be(&parts.d),
            vec![
                BigUint::from_bytes_be(&parts.p),
                BigUint::from_bytes_be(&parts.q),
            ],
        )
        .map_err(|_| CryptoError::KeyPairMissing)
    }

    /// Encode a public key as `n_len(2) || n || e_len(2) || e`
    pub fn encode_public_key(n: &[u8], e: &[u8]) -> Vec<u8> {
        let mut data = Vec::with_capacity(4 + n.len() + e.len());
        push_lv16(&mut data, n);
        push_lv16(&mut data, e);
        data
    }

    /// Split encoded public key data into modulus and exponent
    pub fn decode_public_key(public_key_data: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
        let mut reader = PayloadReader::new(public_key_data);
        let n = reader.take_lv16().ok()?.to_vec();
        let e = reader.take_lv16().ok()?.to_vec();
        reader.finish().ok()?;
        if n.is_empty() || e.is_empty() {
            return None;
        }
        Some((n, e))
    }

    /// Sign a challenge: SHA-1, block-type-01 framing, then m^d mod n
    pub fn sign_challenge(private_key: &RsaPrivateKey, challenge: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let key_size = private_key.size();
        let digest = HashOperations::sha1(challenge);
        let padded = Self::frame_digest(&digest, key_size)?;

        let m = BigUint::from_bytes_be(&padded);
        let signature = m.modpow(private_key.d(), private_key.n());

        Ok(Self::left_pad(signature.to_bytes_be(), key_size))
    }

    /// Recover the digest embedded in a signature using the public key
    pub fn recover_digest(n: &[u8], e: &[u8], signature: &[u8]) -> Option<[u8; SHA1_LEN]> {
        let modulus = BigUint::from_bytes_be(n);
        let exponent = BigUint::from_bytes_be(e);
        let key_size = n.iter().skip_while(|&&b| b == 0).count();

        let s = BigUint::from_bytes_be(signature);
        if signature.len() != key_size || s >= modulus {
            return None;
        }

        let frame = Self::left_pad(s.modpow(&exponent, &modulus).to_bytes_be(), key_size);
        Self::unframe_digest(&frame)
    }

    /// Check that `signature` is the card's signature over `challenge`
    pub fn verify_challenge(n: &[u8], e: &[u8], challenge: &[u8], signature: &[u8]) -> bool {
        match Self::recover_digest(n, e, signature) {
            Some(recovered) => recovered[..].ct_eq(&HashOperations::sha1(challenge)[..]).into(),
            None => false,
        }
    }

    /// `00 01 FF..FF 00 digest`
    fn frame_digest(digest: &[u8], key_size: usize) -> Result<Vec<u8>, CryptoError> {
        if digest.len() + 3 + MIN_FILLER > key_size {
            return Err(CryptoError::Signature);
        }

        let filler = key_size - digest.len() - 3;
        let mut padded = Vec::with_capacity(key_size);
        padded.push(0x00);
        padded.push(0x01);
        padded.extend(std::iter::repeat(0xFF).take(filler));
        padded.push(0x00);
        padded.extend_from_slice(digest);
        Ok(padded)
    }

    fn unframe_digest(frame: &[u8]) -> Option<[u8; SHA1_LEN]> {
        let body = frame.strip_prefix(&[0x00, 0x01])?;
        let filler = body.iter().take_while(|&&b| b == 0xFF).count();
        if filler < MIN_FILLER {
            return None;
        }
        let digest = body[filler..].strip_prefix(&[0x00])?;
        digest.try_into().ok()
    }

    fn left_pad(mut bytes: Vec<u8>, len: usize) -> Vec<u8> {
        if bytes.len() < len {
            let mut padded = vec![0u8; len - bytes.len()];
            padded.append(&mut bytes);
            return padded;
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    // Key generation dominates test time; share one key.
    fn test_key() -> &'static RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| RsaOperations::generate_keypair(1024).unwrap())
    }

    #[test]
    fn test_signature_length_matches_modulus() {
        let sig = RsaOperations::sign_challenge(test_key(), b"nonce-0001").unwrap();
        assert_eq!(sig.len(), 128);
    }

    #[test]
    fn test_sign_then_verify() {
        let key = test_key();
        let parts = RsaOperations::split_private_key(key).unwrap();
        let sig = RsaOperations::sign_challenge(key, b"nonce-0001").unwrap();

        assert!(RsaOperations::verify_challenge(&parts.n, &parts.e, b"nonce-0001", &sig));
        assert!(!RsaOperations::verify_challenge(&parts.n, &parts.e, b"nonce-0002", &sig));

        let mut tampered = sig.clone();
        tampered[64] ^= 0x01;
        assert!(!RsaOperations::verify_challenge(&parts.n, &parts.e, b"nonce-0001", &tampered));
    }

    #[test]
    fn test_recovered_frame_has_no_digest_info() {
        let key = test_key();
        let parts = RsaOperations::split_private_key(key).unwrap();
        let sig = RsaOperations::sign_challenge(key, b"abc").unwrap();

        let digest = RsaOperations::recover_digest(&parts.n, &parts.e, &sig).unwrap();
        assert_eq!(hex::encode(digest), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_components_roundtrip() {
        let key = test_key();
        let parts = RsaOperations::split_private_key(key).unwrap();
        let rebuilt = RsaOperations::join_private_key(&parts).unwrap();
        assert_eq!(&rebuilt, key);
    }

    #[test]
    fn test_public_key_encoding() {
        let parts = RsaOperations::split_private_key(test_key()).unwrap();
        let encoded = RsaOperations::encode_public_key(&parts.n, &parts.e);
        assert_eq!(&encoded[..2], &[0x00, 0x80]);

        let (n, e) = RsaOperations::decode_public_key(&encoded).unwrap();
        assert_eq!(n, parts.n);
        assert_eq!(e, vec![0x01, 0x00, 0x01]);
        assert!(RsaOperations::decode_public_key(&encoded[..10]).is_none());
    }
}
