//! Master-key vault
//!
//! One 16-byte master secret stored under two named wrappings. Each slot is a
//! single AES-128 block encrypted under a key derived from that slot's PIN
//! with the card identifier as salt. Unwrapping with the wrong PIN does not
//! fail here; it yields a wrong key that fails wherever it is used next.

use std::fmt;

use log::debug;
use zeroize::Zeroizing;

use crate::card::state::{WrappedMasterKey, CARD_ID_LEN, MASTER_KEY_LEN};
use crate::crypto::{derive, random_bytes, AesOperations};
use crate::error::CryptoError;

/// Master key in cleartext, wiped on drop
pub type MasterKey = Zeroizing<[u8; MASTER_KEY_LEN]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySlot {
    /// Recoverable with the holder's PIN
    Holder,
    /// Recoverable with the administrator-reset PIN
    Admin,
}

impl fmt::Display for KeySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySlot::Holder => write!(f, "holder"),
            KeySlot::Admin => write!(f, "admin"),
        }
    }
}

impl WrappedMasterKey {
    pub fn slot(&self, slot: KeySlot) -> &[u8; MASTER_KEY_LEN] {
        match slot {
            KeySlot::Holder => &self.holder,
            KeySlot::Admin => &self.admin,
        }
    }

    fn slot_mut(&mut self, slot: KeySlot) -> &mut [u8; MASTER_KEY_LEN] {
        match slot {
            KeySlot::Holder => &mut self.holder,
            KeySlot::Admin => &mut self.admin,
        }
    }
}

/// Wraps and unwraps the master key for one card
pub struct KeyVault<'a> {
    card_id: &'a [u8; CARD_ID_LEN],
    iterations: u32,
}

impl<'a> KeyVault<'a> {
    pub fn new(card_id: &'a [u8; CARD_ID_LEN], iterations: u32) -> Self {
        Self { card_id, iterations }
    }

    /// Draw a fresh master key from the OS random source
    pub fn generate_master_key() -> Result<MasterKey, CryptoError> {
        Ok(Zeroizing::new(random_bytes::<MASTER_KEY_LEN>()?))
    }

    /// Encrypt `master_key` into `slot` under a key derived from `pin`
    pub fn wrap(
        &self,
        wrapped: &mut WrappedMasterKey,
        slot: KeySlot,
        pin: &[u8],
        master_key: &[u8; MASTER_KEY_LEN],
    ) -> Result<(), CryptoError> {
        let kek = derive(pin, self.card_id, self.iterations)?;
        *wrapped.slot_mut(slot) = AesOperations::encrypt_block(&kek, master_key);
        debug!("Wrapped master key into {} slot", slot);
        Ok(())
    }

    /// Decrypt `slot` under a key derived from `pin`
    pub fn unwrap(
        &self,
        wrapped: &WrappedMasterKey,
        slot: KeySlot,
        pin: &[u8],
    ) -> Result<MasterKey, CryptoError> {
        let kek = derive(pin, self.card_id, self.iterations)?;
        Ok(AesOperations::decrypt_block(&kek, wrapped.slot(slot)))
    }

    /// Recover the master key through `from` and store it in `to` under a new PIN
    pub fn rewrap(
        &self,
        wrapped: &mut WrappedMasterKey,
        from: (KeySlot, &[u8]),
        to: (KeySlot, &[u8]),
    ) -> Result<MasterKey, CryptoError> {
        let master_key = self.unwrap(wrapped, from.0, from.1)?;
        self.wrap(wrapped, to.0, to.1, &master_key)?;
        Ok(master_key)
    }
}
