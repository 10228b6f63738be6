//! Data vault
//!
//! The patient record and the balance, each encrypted with AES-128-ECB under
//! the unwrapped master key. The balance lives in its own block so ledger
//! updates never touch the record ciphertext.

use zeroize::Zeroizing;

use crate::card::state::{
    DataVaultBlob, BALANCE_BLOCK_LEN, MASTER_KEY_LEN, RECORD_CAPACITY,
};
use crate::crypto::AesOperations;
use crate::error::{CardError, CryptoError, Result};

const BLOCK: usize = AesOperations::BLOCK_SIZE;

/// Pad to a multiple of the block size; aligned input gains a full block
pub fn pad(data: &[u8]) -> Zeroizing<Vec<u8>> {
    let pad_len = BLOCK - data.len() % BLOCK;
    let mut padded = Zeroizing::new(Vec::with_capacity(data.len() + pad_len));
    padded.extend_from_slice(data);
    padded.resize(data.len() + pad_len, pad_len as u8);
    padded
}

/// Remove padding if the tail is well formed, otherwise return `data` as is
pub fn strip_padding(data: &[u8]) -> &[u8] {
    let Some(&last) = data.last() else {
        return data;
    };
    let pad_len = last as usize;
    if pad_len == 0 || pad_len > BLOCK || pad_len > data.len() {
        return data;
    }

    let (body, tail) = data.split_at(data.len() - pad_len);
    if tail.iter().all(|&b| b == last) {
        body
    } else {
        data
    }
}

/// Encrypts and decrypts vault contents under a master key
pub struct DataVault<'a> {
    master_key: &'a [u8; MASTER_KEY_LEN],
}

impl<'a> DataVault<'a> {
    pub fn new(master_key: &'a [u8; MASTER_KEY_LEN]) -> Self {
        Self { master_key }
    }

    pub fn encrypt_record(&self, plaintext: &[u8]) -> Result<DataVaultBlob> {
        if plaintext.len() > RECORD_CAPACITY {
            return Err(CardError::RecordTooLarge);
        }

        let padded = pad(plaintext);
        let ciphertext = AesOperations::encrypt_ecb(self.master_key, &padded)?;
        Ok(DataVaultBlob {
            ciphertext: heapless::Vec::from_slice(&ciphertext)
                .map_err(|_| CardError::RecordTooLarge)?,
            plaintext_len: plaintext.len() as u16,
        })
    }

    /// Decrypt a record, checking the result against its stored length
    pub fn decrypt_record(&self, blob: &DataVaultBlob) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let decrypted = AesOperations::decrypt_ecb(self.master_key, &blob.ciphertext)?;
        let record = strip_padding(&decrypted);
        if record.len() != blob.plaintext_len as usize {
            return Err(CryptoError::Padding);
        }
        Ok(Zeroizing::new(record.to_vec()))
    }

    /// `value(4, BE) || 12 zero bytes`, encrypted
    pub fn encrypt_balance(&self, balance: i32) -> [u8; BALANCE_BLOCK_LEN] {
        let mut block = Zeroizing::new([0u8; BALANCE_BLOCK_LEN]);
        block[..4].copy_from_slice(&balance.to_be_bytes());
        AesOperations::encrypt_block(self.master_key, &block)
    }

    /// Decrypt the balance block; a bad tail or negative value means the key
    /// is wrong or the block was tampered with
    pub fn decrypt_balance(&self, block: &[u8; BALANCE_BLOCK_LEN]) -> Result<i32, CryptoError> {
        let plain = AesOperations::decrypt_block(self.master_key, block);
        let value = i32::from_be_bytes([plain[0], plain[1], plain[2], plain[3]]);
        if value < 0 || plain[4..].iter().any(|&b| b != 0) {
            return Err(CryptoError::Integrity);
        }
        Ok(value)
    }
}
