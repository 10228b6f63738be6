//! PIN verification and retry counters
//!
//! A PIN is stored as `SHA1(pin || salt)` next to its salt. Every wrong
//! guess costs one retry; the guess that uses up the last retry locks the
//! credential, and a locked credential rejects even the correct PIN.

use log::{info, warn};
use subtle::ConstantTimeEq;

use crate::card::state::{PinCredential, SALT_LEN};
use crate::crypto::hash::{HashOperations, SHA1_LEN};
use crate::crypto::random_bytes;
use crate::error::{CardError, CryptoError, Result};

pub const MIN_PIN_LEN: usize = 1;
pub const MAX_PIN_LEN: usize = 16;

/// Outcome of a PIN check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinStatus {
    Verified,
    Rejected { remaining: u8 },
    Locked,
}

impl PinStatus {
    pub fn into_result(self) -> Result<()> {
        match self {
            PinStatus::Verified => Ok(()),
            PinStatus::Rejected { remaining } => Err(CardError::WrongPin(remaining)),
            PinStatus::Locked => Err(CardError::PinBlocked),
        }
    }
}

/// PIN Manager handles PIN verification and management
pub struct PinManager;

impl PinManager {
    /// 1 to 16 ASCII digits
    pub fn check_format(pin: &[u8]) -> Result<()> {
        let len_ok = (MIN_PIN_LEN..=MAX_PIN_LEN).contains(&pin.len());
        if len_ok && pin.iter().all(u8::is_ascii_digit) {
            Ok(())
        } else {
            Err(CardError::InvalidData)
        }
    }

    pub fn hash_pin(pin: &[u8], salt: &[u8; SALT_LEN]) -> [u8; SHA1_LEN] {
        HashOperations::sha1_parts(&[pin, salt])
    }

    /// Verify a PIN, updating the retry counter
    ///
    /// The caller must persist `credential` whatever the outcome.
    pub fn verify(credential: &mut PinCredential, pin: &[u8]) -> PinStatus {
        if credential.locked || credential.retries == 0 {
            credential.locked = true;
            return PinStatus::Locked;
        }

        let candidate = Self::hash_pin(pin, &credential.salt);
        if bool::from(candidate[..].ct_eq(&credential.hash[..])) {
            credential.retries = credential.max_retries;
            return PinStatus::Verified;
        }

        credential.retries -= 1;
        if credential.retries == 0 {
            credential.locked = true;
            info!("PIN locked after {} failed attempts", credential.max_retries);
        } else {
            warn!("Wrong PIN, {} retries remaining", credential.retries);
        }
        PinStatus::Rejected {
            remaining: credential.retries,
        }
    }

    /// Report the counter without consuming a retry
    pub fn status(credential: &PinCredential) -> PinStatus {
        if credential.locked || credential.retries == 0 {
            PinStatus::Locked
        } else {
            PinStatus::Rejected {
                remaining: credential.retries,
            }
        }
    }

    /// Store a new PIN under a fresh salt and restore the full retry count
    pub fn set_pin(credential: &mut PinCredential, pin: &[u8]) -> std::result::Result<(), CryptoError> {
        let salt = random_bytes::<SALT_LEN>()?;
        Self::set_pin_with_salt(credential, pin, salt);
        Ok(())
    }

    /// Store a new PIN under a caller-chosen salt
    pub fn set_pin_with_salt(credential: &mut PinCredential, pin: &[u8], salt: [u8; SALT_LEN]) {
        credential.hash = Self::hash_pin(pin, &salt);
        credential.salt = salt;
        credential.retries = credential.max_retries;
        credential.locked = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(pin: &[u8], max_retries: u8) -> PinCredential {
        let mut cred = PinCredential::unset(max_retries);
        PinManager::set_pin(&mut cred, pin).unwrap();
        cred
    }

    #[test]
    fn test_hash_is_salted_sha1() {
        let salt = [0x07u8; SALT_LEN];
        let mut input = b"123456".to_vec();
        input.extend_from_slice(&salt);
        assert_eq!(PinManager::hash_pin(b"123456", &salt), HashOperations::sha1(&input));
    }

    #[test]
    fn test_verify_correct_pin() {
        let mut cred = credential(b"123456", 5);
        assert_eq!(PinManager::verify(&mut cred, b"123456"), PinStatus::Verified);
        assert_eq!(cred.retries, 5);
    }

    #[test]
    fn test_wrong_pin_decrements_and_success_resets() {
        let mut cred = credential(b"123456", 5);
        assert_eq!(
            PinManager::verify(&mut cred, b"000000"),
            PinStatus::Rejected { remaining: 4 }
        );
        assert_eq!(
            PinManager::verify(&mut cred, b"000000"),
            PinStatus::Rejected { remaining: 3 }
        );
        assert_eq!(PinManager::verify(&mut cred, b"123456"), PinStatus::Verified);
        assert_eq!(cred.retries, 5);
    }

    #[test]
    fn test_lockout_after_max_attempts() {
        let mut cred = credential(b"123456", 3);
        for remaining in [2, 1, 0] {
            assert_eq!(
                PinManager::verify(&mut cred, b"000000"),
                PinStatus::Rejected { remaining }
            );
        }
        assert!(cred.locked);
        assert_eq!(PinManager::verify(&mut cred, b"123456"), PinStatus::Locked);
        assert_eq!(PinManager::status(&cred), PinStatus::Locked);
        assert_eq!(cred.retries, 0);
    }

    #[test]
    fn test_set_pin_unlocks_with_fresh_salt() {
        let mut cred = credential(b"123456", 3);
        let old_salt = cred.salt;
        for _ in 0..3 {
            PinManager::verify(&mut cred, b"999999");
        }
        assert!(cred.locked);

        PinManager::set_pin(&mut cred, b"111111").unwrap();
        assert!(!cred.locked);
        assert_ne!(cred.salt, old_salt);
        assert_eq!(PinManager::verify(&mut cred, b"123456"), PinStatus::Rejected { remaining: 2 });
        assert_eq!(PinManager::verify(&mut cred, b"111111"), PinStatus::Verified);
    }

    #[test]
    fn test_unset_credential_matches_nothing() {
        let mut cred = PinCredential::unset(3);
        assert_eq!(PinManager::verify(&mut cred, b""), PinStatus::Rejected { remaining: 2 });
    }

    #[test]
    fn test_check_format() {
        assert!(PinManager::check_format(b"1").is_ok());
        assert!(PinManager::check_format(b"1234567890123456").is_ok());
        assert_eq!(PinManager::check_format(b""), Err(CardError::InvalidData));
        assert_eq!(PinManager::check_format(b"12345678901234567"), Err(CardError::InvalidData));
        assert_eq!(PinManager::check_format(b"12a4"), Err(CardError::InvalidData));
    }

    #[test]
    fn test_status_does_not_consume_retry() {
        let cred = credential(b"123456", 5);
        assert_eq!(PinManager::status(&cred), PinStatus::Rejected { remaining: 5 });
        assert_eq!(cred.retries, 5);
    }
}
