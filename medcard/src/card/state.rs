//! Persistent card state
//!
//! One struct per card type, written as a whole on every commit. Byte fields
//! are serialized as base64 strings; variable-length fields use fixed-capacity
//! vectors so the worst-case footprint of a card is known up front.

use heapless::Vec as FixedVec;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::hash::SHA1_LEN;

pub const CARD_ID_LEN: usize = 16;
pub const SALT_LEN: usize = 16;
pub const MASTER_KEY_LEN: usize = 16;
pub const BALANCE_BLOCK_LEN: usize = 16;

/// Largest patient record, in plaintext bytes
pub const RECORD_CAPACITY: usize = 256;
/// Padding always adds at least one byte, so a full record needs one more block
pub const RECORD_CIPHERTEXT_CAPACITY: usize = RECORD_CAPACITY + 16;

/// Key component capacities (moduli up to 2048 bits)
pub const MAX_MODULUS_LEN: usize = 256;
pub const MAX_PRIME_LEN: usize = MAX_MODULUS_LEN / 2;
pub const MAX_EXPONENT_LEN: usize = 8;

/// Base64 serde for byte arrays and fixed-capacity byte vectors
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&STANDARD.encode(bytes.as_ref()))
    }

    pub(super) fn decode<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        if s.is_empty() {
            return Ok(Vec::new());
        }
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }

    pub mod array {
        use serde::Deserializer;

        pub use super::serialize;

        pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
        where
            D: Deserializer<'de>,
        {
            let bytes = super::decode(deserializer)?;
            let len = bytes.len();
            bytes
                .try_into()
                .map_err(|_| serde::de::Error::invalid_length(len, &"fixed-size byte field"))
        }
    }

    pub mod fixed_vec {
        use serde::Deserializer;

        pub use super::serialize;

        pub fn deserialize<'de, D, const N: usize>(
            deserializer: D,
        ) -> Result<heapless::Vec<u8, N>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let bytes = super::decode(deserializer)?;
            heapless::Vec::from_slice(&bytes)
                .map_err(|_| serde::de::Error::invalid_length(bytes.len(), &"field within capacity"))
        }
    }
}

/// A card's persistent state, stored as one JSON file
pub trait PersistentState: Serialize + DeserializeOwned + Default + Clone {
    const FILE_NAME: &'static str;
}

/// Salted PIN hash plus its retry counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinCredential {
    #[serde(with = "base64_bytes::array")]
    pub hash: [u8; SHA1_LEN],
    #[serde(with = "base64_bytes::array")]
    pub salt: [u8; SALT_LEN],
    pub retries: u8,
    pub max_retries: u8,
    pub locked: bool,
}

impl PinCredential {
    /// A credential that matches no PIN until one is set
    pub fn unset(max_retries: u8) -> Self {
        Self {
            hash: [0u8; SHA1_LEN],
            salt: [0u8; SALT_LEN],
            retries: max_retries,
            max_retries,
            locked: false,
        }
    }
}

/// The master secret under its two independent wrappings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedMasterKey {
    #[serde(with = "base64_bytes::array")]
    pub holder: [u8; MASTER_KEY_LEN],
    #[serde(with = "base64_bytes::array")]
    pub admin: [u8; MASTER_KEY_LEN],
}

/// Encrypted patient record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataVaultBlob {
    #[serde(with = "base64_bytes::fixed_vec")]
    pub ciphertext: FixedVec<u8, RECORD_CIPHERTEXT_CAPACITY>,
    pub plaintext_len: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    pub sequence: u16,
    #[serde(with = "base64_bytes::array")]
    pub chain_hash: [u8; SHA1_LEN],
}

impl Default for LedgerState {
    fn default() -> Self {
        Self {
            sequence: 0,
            chain_hash: [0u8; SHA1_LEN],
        }
    }
}

/// RSA key components, big-endian
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPairData {
    #[serde(with = "base64_bytes::fixed_vec")]
    pub modulus: FixedVec<u8, MAX_MODULUS_LEN>,
    #[serde(with = "base64_bytes::fixed_vec")]
    pub public_exponent: FixedVec<u8, MAX_EXPONENT_LEN>,
    #[serde(with = "base64_bytes::fixed_vec")]
    pub private_exponent: FixedVec<u8, MAX_MODULUS_LEN>,
    #[serde(with = "base64_bytes::fixed_vec")]
    pub prime_p: FixedVec<u8, MAX_PRIME_LEN>,
    #[serde(with = "base64_bytes::fixed_vec")]
    pub prime_q: FixedVec<u8, MAX_PRIME_LEN>,
}

impl Zeroize for KeyPairData {
    fn zeroize(&mut self) {
        self.private_exponent[..].zeroize();
        self.prime_p[..].zeroize();
        self.prime_q[..].zeroize();
        self.private_exponent.clear();
        self.prime_p.clear();
        self.prime_q.clear();
    }
}

// Every staged copy of a card state carries the private half
impl Drop for KeyPairData {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ZeroizeOnDrop for KeyPairData {}

/// Administrator identity card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityState {
    pub initialized: bool,
    #[serde(with = "base64_bytes::array")]
    pub card_id: [u8; CARD_ID_LEN],
    pub pin: PinCredential,
    pub keypair: Option<KeyPairData>,
}

impl IdentityState {
    pub const MAX_PIN_RETRIES: u8 = 3;
}

impl Default for IdentityState {
    fn default() -> Self {
        Self {
            initialized: false,
            card_id: [0u8; CARD_ID_LEN],
            pin: PinCredential::unset(Self::MAX_PIN_RETRIES),
            keypair: None,
        }
    }
}

impl PersistentState for IdentityState {
    const FILE_NAME: &'static str = "identity_card.json";
}

/// Patient account card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub issued: bool,
    #[serde(with = "base64_bytes::array")]
    pub card_id: [u8; CARD_ID_LEN],
    pub holder_pin: PinCredential,
    /// Remaining administrator-reset attempts
    pub admin_reset_retries: u8,
    pub master_key: WrappedMasterKey,
    pub record: DataVaultBlob,
    #[serde(with = "base64_bytes::array")]
    pub balance: [u8; BALANCE_BLOCK_LEN],
    pub ledger: LedgerState,
    pub keypair: Option<KeyPairData>,
}

impl AccountState {
    pub const MAX_HOLDER_RETRIES: u8 = 5;
    pub const MAX_ADMIN_RESET_RETRIES: u8 = 3;
}

impl Default for AccountState {
    fn default() -> Self {
        Self {
            issued: false,
            card_id: [0u8; CARD_ID_LEN],
            holder_pin: PinCredential::unset(Self::MAX_HOLDER_RETRIES),
            admin_reset_retries: Self::MAX_ADMIN_RESET_RETRIES,
            master_key: WrappedMasterKey::default(),
            record: DataVaultBlob::default(),
            balance: [0u8; BALANCE_BLOCK_LEN],
            ledger: LedgerState::default(),
            keypair: None,
        }
    }
}

impl PersistentState for AccountState {
    const FILE_NAME: &'static str = "account_card.json";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_state_serialization() {
        let mut state = AccountState::default();
        state.issued = true;
        state.card_id = [0x5A; CARD_ID_LEN];
        state.record.ciphertext.extend_from_slice(&[0xAB; 32]).unwrap();
        state.record.plaintext_len = 20;
        state.ledger.sequence = 7;

        let json = serde_json::to_string(&state).unwrap();
        let parsed: AccountState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn test_base64_serialization() {
        let mut state = IdentityState::default();
        state.card_id[..4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"3q2+7wAAAAAAAAAAAAAAAA==\"")); // DEADBEEF + 12 zero bytes
    }

    #[test]
    fn test_wrong_length_array_rejected() {
        let json = serde_json::to_string(&IdentityState::default())
            .unwrap()
            .replace("\"AAAAAAAAAAAAAAAAAAAAAA==\"", "\"AAAA\"");
        assert!(serde_json::from_str::<IdentityState>(&json).is_err());
    }

    #[test]
    fn test_keypair_zeroize_wipes_private_half() {
        let mut keypair = KeyPairData {
            modulus: FixedVec::from_slice(&[0xC5; 64]).unwrap(),
            public_exponent: FixedVec::from_slice(&[0x01, 0x00, 0x01]).unwrap(),
            private_exponent: FixedVec::from_slice(&[0x3D; 64]).unwrap(),
            prime_p: FixedVec::from_slice(&[0xF1; 32]).unwrap(),
            prime_q: FixedVec::from_slice(&[0xE7; 32]).unwrap(),
        };
        let staged = keypair.clone();
        drop(staged);
        assert_eq!(keypair.private_exponent.len(), 64);

        keypair.zeroize();
        assert!(keypair.private_exponent.is_empty());
        assert!(keypair.prime_p.is_empty());
        assert!(keypair.prime_q.is_empty());
        assert_eq!(keypair.modulus.len(), 64);
    }

    #[test]
    fn test_defaults() {
        let account = AccountState::default();
        assert!(!account.issued);
        assert_eq!(account.holder_pin.retries, 5);
        assert_eq!(account.admin_reset_retries, 3);
        assert_eq!(account.ledger.chain_hash, [0u8; 20]);

        let identity = IdentityState::default();
        assert_eq!(identity.pin.max_retries, 3);
        assert!(identity.keypair.is_none());
    }
}
