//! AES-128 Operations
//!
//! ECB mode only: single-block key wrapping and block-aligned record
//! encryption. Padding is the caller's concern.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use log::debug;
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// AES-128 Operations
pub struct AesOperations;

impl AesOperations {
    /// Block size for AES
    pub const BLOCK_SIZE: usize = 16;

    /// Key size for AES-128
    pub const KEY_SIZE: usize = 16;

    /// Encrypt a single block with AES-128-ECB
    pub fn encrypt_block(key: &[u8; 16], plaintext: &[u8; 16]) -> [u8; 16] {
        let cipher = Aes128::new(GenericArray::from_slice(key));
        let mut block = GenericArray::clone_from_slice(plaintext);
        cipher.encrypt_block(&mut block);
        block.into()
    }

    /// Decrypt a single block with AES-128-ECB
    pub fn decrypt_block(key: &[u8; 16], ciphertext: &[u8; 16]) -> Zeroizing<[u8; 16]> {
        let cipher = Aes128::new(GenericArray::from_slice(key));
        let mut block = GenericArray::clone_from_slice(ciphertext);
        cipher.decrypt_block(&mut block);
        Zeroizing::new(block.into())
    }

    /// Encrypt block-aligned data with AES-128-ECB
    pub fn encrypt_ecb(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = Self::cipher(key, plaintext.len())?;
        debug!("AES-ECB encrypting {} bytes", plaintext.len());

        let mut result = Vec::with_capacity(plaintext.len());
        for chunk in plaintext.chunks(Self::BLOCK_SIZE) {
            let mut block = GenericArray::clone_from_slice(chunk);
            cipher.encrypt_block(&mut block);
            result.extend_from_slice(&block);
        }
        Ok(result)
    }

    /// Decrypt block-aligned data with AES-128-ECB
    pub fn decrypt_ecb(key: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let cipher = Self::cipher(key, ciphertext.len())?;
        debug!("AES-ECB decrypting {} bytes", ciphertext.len());

        let mut result = Zeroizing::new(Vec::with_capacity(ciphertext.len()));
        for chunk in ciphertext.chunks(Self::BLOCK_SIZE) {
            let mut block = GenericArray::clone_from_slice(chunk);
            cipher.decrypt_block(&mut block);
            result.extend_from_slice(&block);
        }
        Ok(result)
    }

    fn cipher(key: &[u8], data_len: usize) -> Result<Aes128, CryptoError> {
        if key.len() != Self::KEY_SIZE || data_len % Self::BLOCK_SIZE != 0 {
            return Err(CryptoError::Cipher);
        }
        Aes128::new_from_slice(key).map_err(|_| CryptoError::Cipher)
    }
}
