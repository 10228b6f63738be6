//! Asymmetric identity
//!
//! The card's RSA key pair, generated on the card. Only the public half is
//! ever exported; the private half is used for challenge signatures.

use log::info;

use crate::card::state::KeyPairData;
use crate::crypto::{RsaComponents, RsaOperations};
use crate::error::{CardError, CryptoError, Result};

/// Longest challenge accepted for signing
pub const MAX_CHALLENGE_LEN: usize = 255;

fn fixed<const N: usize>(bytes: &[u8]) -> std::result::Result<heapless::Vec<u8, N>, CryptoError> {
    heapless::Vec::from_slice(bytes).map_err(|_| CryptoError::KeyGeneration)
}

impl KeyPairData {
    /// Generate a fresh key pair
    pub fn generate(bits: usize) -> std::result::Result<Self, CryptoError> {
        let key = RsaOperations::generate_keypair(bits)?;
        let parts = RsaOperations::split_private_key(&key)?;
        let keypair = Self {
            modulus: fixed(&parts.n)?,
            public_exponent: fixed(&parts.e)?,
            private_exponent: fixed(&parts.d)?,
            prime_p: fixed(&parts.p)?,
            prime_q: fixed(&parts.q)?,
        };
        info!("Generated RSA-{} identity key", bits);
        Ok(keypair)
    }

    /// `lv16(modulus) || lv16(exponent)`
    pub fn public_key(&self) -> Vec<u8> {
        RsaOperations::encode_public_key(&self.modulus, &self.public_exponent)
    }

    /// Sign a challenge with the private key
    pub fn sign(&self, challenge: &[u8]) -> std::result::Result<Vec<u8>, CryptoError> {
        let parts = RsaComponents {
            n: self.modulus.to_vec(),
            e: self.public_exponent.to_vec(),
            d: self.private_exponent.to_vec().into(),
            p: self.prime_p.to_vec().into(),
            q: self.prime_q.to_vec().into(),
        };
        let key = RsaOperations::join_private_key(&parts)?;
        RsaOperations::sign_challenge(&key, challenge).map_err(|_| CryptoError::Signature)
    }
}

/// Export the public key, if one has been generated
pub fn export_public_key(keypair: Option<&KeyPairData>) -> Result<Vec<u8>> {
    keypair
        .map(KeyPairData::public_key)
        .ok_or(CardError::Crypto(CryptoError::KeyPairMissing))
}

/// Sign a 1..=255 byte challenge
pub fn sign_challenge(keypair: Option<&KeyPairData>, challenge: &[u8]) -> Result<Vec<u8>> {
    if challenge.is_empty() || challenge.len() > MAX_CHALLENGE_LEN {
        return Err(CardError::WrongLength);
    }
    let keypair = keypair.ok_or(CryptoError::KeyPairMissing)?;
    Ok(keypair.sign(challenge)?)
}
