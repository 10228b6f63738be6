//! Parsers for structured card responses

use crate::apdu::PayloadReader;
use crate::crypto::hash::SHA1_LEN;
use crate::crypto::RsaOperations;

use super::HostError;

/// RSA public key as exported by the card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub modulus: Vec<u8>,
    pub exponent: Vec<u8>,
}

impl PublicKey {
    /// Parse `lv16(n) || lv16(e)`
    pub fn parse(data: &[u8]) -> Result<Self, HostError> {
        let (modulus, exponent) =
            RsaOperations::decode_public_key(data).ok_or(HostError::Malformed("public key"))?;
        Ok(Self { modulus, exponent })
    }

    /// Modulus size in bits, ignoring leading zero bytes
    pub fn bits(&self) -> usize {
        match self.modulus.iter().position(|&b| b != 0) {
            Some(i) => (self.modulus.len() - i) * 8 - self.modulus[i].leading_zeros() as usize,
            None => 0,
        }
    }

    pub fn verify(&self, challenge: &[u8], signature: &[u8]) -> bool {
        RsaOperations::verify_challenge(&self.modulus, &self.exponent, challenge, signature)
    }
}

/// Check a challenge signature against an exported public key
pub fn verify_challenge_signature(
    public_key: &[u8],
    challenge: &[u8],
    signature: &[u8],
) -> Result<(), HostError> {
    if PublicKey::parse(public_key)?.verify(challenge, signature) {
        Ok(())
    } else {
        Err(HostError::BadSignature)
    }
}

/// Reply to VERIFY & READ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub record: Vec<u8>,
    pub balance: i32,
}

impl AccountSnapshot {
    pub fn parse(data: &[u8]) -> Result<Self, HostError> {
        let mut reader = PayloadReader::new(data);
        let record = reader.take_lv16()?.to_vec();
        let balance = reader.take_i32()?;
        reader.finish()?;
        Ok(Self { record, balance })
    }
}

/// Reply to CREDIT and DEBIT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub sequence: u16,
    pub balance: i32,
    pub chain_hash: [u8; SHA1_LEN],
}

impl TransactionReceipt {
    pub fn parse(data: &[u8]) -> Result<Self, HostError> {
        let mut reader = PayloadReader::new(data);
        let sequence = u16::from_be_bytes(reader.take_array()?);
        let balance = reader.take_i32()?;
        let chain_hash = reader.take_array()?;
        reader.finish()?;
        Ok(Self {
            sequence,
            balance,
            chain_hash,
        })
    }
}

/// Reply to READ LEDGER STATUS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerStatus {
    pub sequence: u16,
    pub chain_hash: [u8; SHA1_LEN],
}

impl LedgerStatus {
    pub fn parse(data: &[u8]) -> Result<Self, HostError> {
        let mut reader = PayloadReader::new(data);
        let sequence = u16::from_be_bytes(reader.take_array()?);
        let chain_hash = reader.take_array()?;
        reader.finish()?;
        Ok(Self {
            sequence,
            chain_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apdu::push_lv16;

    #[test]
    fn test_account_snapshot() {
        let mut data = Vec::new();
        push_lv16(&mut data, b"blood type O+");
        data.extend_from_slice(&70_000i32.to_be_bytes());

        let snapshot = AccountSnapshot::parse(&data).unwrap();
        assert_eq!(snapshot.record, b"blood type O+");
        assert_eq!(snapshot.balance, 70_000);

        data.push(0x00);
        assert!(AccountSnapshot::parse(&data).is_err());
    }

    #[test]
    fn test_receipt() {
        let mut data = hex::decode("0002000111700000").unwrap();
        data.truncate(6);
        data.extend_from_slice(&[0xAB; SHA1_LEN]);

        let receipt = TransactionReceipt::parse(&data).unwrap();
        assert_eq!(receipt.sequence, 2);
        assert_eq!(receipt.balance, 0x0001_1170);
        assert_eq!(receipt.chain_hash, [0xAB; SHA1_LEN]);
        assert!(TransactionReceipt::parse(&data[..25]).is_err());
    }

    #[test]
    fn test_ledger_status() {
        let mut data = vec![0x00, 0x00];
        data.extend_from_slice(&[0u8; SHA1_LEN]);
        let status = LedgerStatus::parse(&data).unwrap();
        assert_eq!(status.sequence, 0);
        assert_eq!(status.chain_hash, [0u8; SHA1_LEN]);
    }

    #[test]
    fn test_public_key_bits() {
        let mut data = Vec::new();
        push_lv16(&mut data, &[0x00, 0x80, 0x00]);
        push_lv16(&mut data, &[0x01, 0x00, 0x01]);
        let key = PublicKey::parse(&data).unwrap();
        assert_eq!(key.bits(), 16);
        assert_eq!(key.exponent, vec![0x01, 0x00, 0x01]);

        assert_eq!(PublicKey::parse(&data[..4]), Err(HostError::Malformed("public key")));
    }
}
