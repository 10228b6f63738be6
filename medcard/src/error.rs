//! Card error kinds and their status-word mapping
//!
//! Subsystems return `CardError`; only the applet dispatcher turns it into a
//! status word via [`CardError::status_word`].

use thiserror::Error;

use crate::apdu::{APDUError, SW};
use crate::card::storage::StoreError;
use crate::card::state::RECORD_CAPACITY;

/// Failures of a cryptographic primitive or of key material
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    #[error("AES operation failed: bad key or block length")]
    Cipher,

    #[error("record padding does not match the stored length")]
    Padding,

    #[error("decrypted block failed its integrity check")]
    Integrity,

    #[error("key derivation needs at least one iteration")]
    KdfIterations,

    #[error("key pair has not been generated")]
    KeyPairMissing,

    #[error("RSA key generation failed")]
    KeyGeneration,

    #[error("RSA private-key transform failed")]
    Signature,

    #[error("random source failed")]
    Random,
}

impl CryptoError {
    pub fn status_word(&self) -> u16 {
        match self {
            CryptoError::Cipher => SW::CIPHER_FAILURE,
            CryptoError::Padding => SW::PADDING_MISMATCH,
            CryptoError::Integrity => SW::INTEGRITY_FAILURE,
            CryptoError::KdfIterations => SW::KDF_FAILURE,
            CryptoError::KeyPairMissing => SW::KEY_PAIR_MISSING,
            CryptoError::KeyGeneration => SW::KEY_GENERATION_FAILURE,
            CryptoError::Signature => SW::SIGNATURE_FAILURE,
            CryptoError::Random => SW::RANDOM_FAILURE,
        }
    }
}

/// Everything a card command can fail with
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CardError {
    // Input validation: nothing has been touched
    #[error("wrong command length")]
    WrongLength,

    #[error("malformed command data")]
    InvalidData,

    #[error("record exceeds {} bytes", RECORD_CAPACITY)]
    RecordTooLarge,

    #[error("amount must be a positive 32-bit integer")]
    InvalidAmount,

    #[error("amount exceeds current balance")]
    InsufficientBalance,

    #[error("credit would overflow the balance")]
    BalanceOverflow,

    #[error("transaction sequence exhausted")]
    SequenceExhausted,

    #[error("wrong P1/P2")]
    WrongP1P2,

    #[error("instruction {0:#04X} not supported")]
    InsNotSupported(u8),

    #[error("class {0:#04X} not supported")]
    ClaNotSupported(u8),

    // Authentication and lifecycle
    #[error("wrong PIN, {0} retries remaining")]
    WrongPin(u8),

    #[error("PIN blocked")]
    PinBlocked,

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("card has not been issued")]
    NotIssued,

    #[error("card has already been issued")]
    AlreadyIssued,

    #[error("no response data pending")]
    NoPendingResponse,

    // Internal
    #[error("crypto: {0}")]
    Crypto(#[from] CryptoError),

    #[error("storage: {0}")]
    Storage(String),
}

impl CardError {
    /// The status word reported to the terminal
    pub fn status_word(&self) -> u16 {
        match self {
            CardError::WrongLength => SW::WRONG_LENGTH,
            CardError::InvalidData | CardError::InvalidAmount => SW::WRONG_DATA,
            CardError::RecordTooLarge => SW::NOT_ENOUGH_MEMORY,
            CardError::InsufficientBalance => SW::INSUFFICIENT_BALANCE,
            CardError::BalanceOverflow => SW::BALANCE_OVERFLOW,
            CardError::SequenceExhausted => SW::SEQUENCE_EXHAUSTED,
            CardError::WrongP1P2 => SW::WRONG_P1_P2,
            CardError::InsNotSupported(_) => SW::INS_NOT_SUPPORTED,
            CardError::ClaNotSupported(_) => SW::CLA_NOT_SUPPORTED,
            CardError::WrongPin(retries) => SW::counter_warning(*retries),
            CardError::PinBlocked => SW::AUTH_METHOD_BLOCKED,
            CardError::AuthenticationRequired => SW::SECURITY_STATUS_NOT_SATISFIED,
            CardError::NotIssued | CardError::AlreadyIssued | CardError::NoPendingResponse => {
                SW::CONDITIONS_NOT_SATISFIED
            }
            CardError::Crypto(e) => e.status_word(),
            CardError::Storage(_) => SW::STORAGE_FAILURE,
        }
    }
}

impl From<APDUError> for CardError {
    fn from(e: APDUError) -> Self {
        match e {
            APDUError::TooShort(_)
            | APDUError::InvalidLength
            | APDUError::InvalidExtendedFormat => CardError::WrongLength,
            APDUError::Truncated { .. } | APDUError::TrailingBytes(_) => CardError::InvalidData,
        }
    }
}

impl From<StoreError> for CardError {
    fn from(e: StoreError) -> Self {
        CardError::Storage(e.to_string())
    }
}

pub type Result<T, E = CardError> = std::result::Result<T, E>;
