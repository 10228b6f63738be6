//! Administrator identity applet
//!
//! Holds an administrator's PIN, a card identifier, and an RSA key pair used
//! to prove the card's identity to the administration terminal.

use log::info;

use super::{
    expect_flag_param, expect_no_data, expect_params, pin_status_query, require_auth, CardApplet,
};
use crate::apdu::{ins, PayloadReader, APDU};
use crate::card::state::{IdentityState, KeyPairData, PinCredential, CARD_ID_LEN, SALT_LEN};
use crate::card::{CardDataStore, Session};
use crate::config::CardConfig;
use crate::crypto::random_bytes;
use crate::error::{CardError, CryptoError, Result};
use crate::identity;
use crate::pin::{PinManager, PinStatus};

/// "\xF0HOSPAD"
pub const IDENTITY_AID: &[u8] = &[0xF0, 0x48, 0x4F, 0x53, 0x50, 0x41, 0x44];
pub const IDENTITY_CLA: u8 = 0x80;

pub struct IdentityApplet {
    store: CardDataStore<IdentityState>,
    session: Session,
    config: CardConfig,
}

impl IdentityApplet {
    pub fn new(store: CardDataStore<IdentityState>, config: CardConfig) -> Self {
        Self {
            store,
            session: Session::new(),
            config,
        }
    }

    pub fn state(&self) -> &IdentityState {
        self.store.state()
    }

    fn require_initialized(&self) -> Result<()> {
        if self.store.state().initialized {
            Ok(())
        } else {
            Err(CardError::NotIssued)
        }
    }

    /// INITIALIZE: `lv8(pin) || salt(16)`, P1=01 forces a new key pair
    ///
    /// Also the recovery path for a locked card: the PIN credential is
    /// replaced wholesale, while the identifier survives.
    fn handle_initialize(&mut self, cmd: &APDU) -> Result<Vec<u8>> {
        let rotate = expect_flag_param(cmd)?;
        let reinit = self.store.state().initialized;

        let mut reader = PayloadReader::new(&cmd.data);
        let pin = reader.take_lv8()?;
        let salt: [u8; SALT_LEN] = reader.take_array()?;
        reader.finish()?;
        PinManager::check_format(pin)?;

        let mut staged = self.store.stage();
        if !reinit {
            staged.card_id = random_bytes::<CARD_ID_LEN>()?;
            if staged.card_id == [0u8; CARD_ID_LEN] {
                return Err(CryptoError::Random.into());
            }
        }

        staged.pin = PinCredential::unset(self.config.admin_pin_retries);
        PinManager::set_pin_with_salt(&mut staged.pin, pin, salt);

        if rotate || staged.keypair.is_none() {
            staged.keypair = Some(KeyPairData::generate(self.config.rsa_bits)?);
        }
        staged.initialized = true;

        self.store.commit(staged)?;
        self.session.clear();
        info!(
            "Identity card {} (key pair {})",
            if reinit { "re-initialized" } else { "initialized" },
            if rotate { "rotated" } else { "kept" }
        );
        Ok(Vec::new())
    }

    fn handle_verify(&mut self, cmd: &APDU) -> Result<Vec<u8>> {
        expect_params(cmd, 0x00, 0x00)?;
        self.require_initialized()?;
        if cmd.data.is_empty() {
            return pin_status_query(&self.session, &self.store.state().pin);
        }
        PinManager::check_format(&cmd.data)?;

        let mut staged = self.store.stage();
        let status = PinManager::verify(&mut staged.pin, &cmd.data);
        if staged.pin != self.store.state().pin {
            self.store.commit(staged)?;
        }
        if status == PinStatus::Verified {
            self.session.authenticate(None);
        } else {
            self.session.clear();
        }
        status.into_result().map(|()| Vec::new())
    }

    fn handle_sign(&mut self, cmd: &APDU) -> Result<Vec<u8>> {
        expect_params(cmd, 0x00, 0x00)?;
        self.require_initialized()?;
        require_auth(&self.session)?;
        identity::sign_challenge(self.store.state().keypair.as_ref(), &cmd.data)
    }

    fn handle_export_public_key(&self, cmd: &APDU) -> Result<Vec<u8>> {
        expect_params(cmd, 0x00, 0x00)?;
        expect_no_data(cmd)?;
        self.require_initialized()?;
        identity::export_public_key(self.store.state().keypair.as_ref())
    }

    fn handle_read_identifier(&self, cmd: &APDU) -> Result<Vec<u8>> {
        expect_params(cmd, 0x00, 0x00)?;
        expect_no_data(cmd)?;
        self.require_initialized()?;
        Ok(self.store.state().card_id.to_vec())
    }
}

impl CardApplet for IdentityApplet {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn aid(&self) -> &'static [u8] {
        IDENTITY_AID
    }

    fn cla(&self) -> u8 {
        IDENTITY_CLA
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    fn handle(&mut self, cmd: &APDU) -> Result<Vec<u8>> {
        match cmd.ins {
            ins::INITIALIZE => self.handle_initialize(cmd),
            ins::VERIFY_PIN => self.handle_verify(cmd),
            ins::SIGN_CHALLENGE => self.handle_sign(cmd),
            ins::EXPORT_PUBLIC_KEY => self.handle_export_public_key(cmd),
            ins::READ_IDENTIFIER => self.handle_read_identifier(cmd),
            other => Err(CardError::InsNotSupported(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apdu::push_lv8;
    use crate::applet::process_apdu;
    use crate::crypto::RsaOperations;
    use tempfile::TempDir;

    fn applet(dir: &TempDir) -> IdentityApplet {
        let config = CardConfig::with_storage_dir(dir.path());
        let mut store = CardDataStore::new(config.storage_dir.clone());
        store.load().unwrap();
        IdentityApplet::new(store, config)
    }

    fn init_cmd(pin: &[u8], p1: u8) -> APDU {
        let mut data = Vec::new();
        push_lv8(&mut data, pin);
        data.extend_from_slice(&[0x5C; SALT_LEN]);
        APDU::with_data(IDENTITY_CLA, ins::INITIALIZE, p1, 0, data)
    }

    fn verify_cmd(pin: &[u8]) -> APDU {
        APDU::with_data(IDENTITY_CLA, ins::VERIFY_PIN, 0, 0, pin.to_vec())
    }

    #[test]
    fn test_commands_before_initialize() {
        let dir = TempDir::new().unwrap();
        let mut card = applet(&dir);
        assert_eq!(process_apdu(&mut card, &verify_cmd(b"1234")).sw(), 0x6985);
        assert_eq!(
            process_apdu(&mut card, &APDU::new(IDENTITY_CLA, ins::READ_IDENTIFIER, 0, 0)).sw(),
            0x6985
        );
    }

    #[test]
    fn test_initialize_verify_sign() {
        let dir = TempDir::new().unwrap();
        let mut card = applet(&dir);

        assert_eq!(process_apdu(&mut card, &init_cmd(b"2468", 0)).sw(), 0x9000);
        assert_eq!(card.state().pin.salt, [0x5C; SALT_LEN]);
        assert_ne!(card.state().card_id, [0u8; CARD_ID_LEN]);

        let sign = APDU::with_data(IDENTITY_CLA, ins::SIGN_CHALLENGE, 0, 0, b"challenge".to_vec());
        assert_eq!(process_apdu(&mut card, &sign).sw(), 0x6982);

        assert_eq!(process_apdu(&mut card, &verify_cmd(b"2468")).sw(), 0x9000);
        let sig = process_apdu(&mut card, &sign);
        assert_eq!(sig.sw(), 0x9000);

        let public = process_apdu(&mut card, &APDU::new(IDENTITY_CLA, ins::EXPORT_PUBLIC_KEY, 0, 0));
        let (n, e) = RsaOperations::decode_public_key(&public.data).unwrap();
        assert!(RsaOperations::verify_challenge(&n, &e, b"challenge", &sig.data));
    }

    #[test]
    fn test_reinitialize_keeps_identifier() {
        let dir = TempDir::new().unwrap();
        let mut card = applet(&dir);
        process_apdu(&mut card, &init_cmd(b"2468", 0));
        let card_id = card.state().card_id;
        let modulus = card.state().keypair.as_ref().unwrap().modulus.clone();

        assert_eq!(process_apdu(&mut card, &verify_cmd(b"2468")).sw(), 0x9000);
        assert_eq!(process_apdu(&mut card, &init_cmd(b"1357", 0)).sw(), 0x9000);
        assert_eq!(card.state().card_id, card_id);
        assert_eq!(card.state().keypair.as_ref().unwrap().modulus, modulus);

        // Session is dropped by re-initialization
        let sign = APDU::with_data(IDENTITY_CLA, ins::SIGN_CHALLENGE, 0, 0, b"x".to_vec());
        assert_eq!(process_apdu(&mut card, &sign).sw(), 0x6982);

        assert_eq!(process_apdu(&mut card, &init_cmd(b"1357", 1)).sw(), 0x9000);
        assert_ne!(card.state().keypair.as_ref().unwrap().modulus, modulus);
        assert_eq!(process_apdu(&mut card, &verify_cmd(b"1357")).sw(), 0x9000);
    }

    #[test]
    fn test_reinitialize_unlocks() {
        let dir = TempDir::new().unwrap();
        let mut card = applet(&dir);
        process_apdu(&mut card, &init_cmd(b"2468", 0));
        let card_id = card.state().card_id;

        for _ in 0..3 {
            process_apdu(&mut card, &verify_cmd(b"0000"));
        }
        assert_eq!(process_apdu(&mut card, &verify_cmd(b"2468")).sw(), 0x6983);

        assert_eq!(process_apdu(&mut card, &init_cmd(b"1357", 0)).sw(), 0x9000);
        let pin = &card.state().pin;
        assert!(!pin.locked);
        assert_eq!(pin.retries, 3);
        assert_eq!(card.state().card_id, card_id);
        assert_eq!(process_apdu(&mut card, &verify_cmd(b"1357")).sw(), 0x9000);
    }

    #[test]
    fn test_lockout_and_status_query() {
        let dir = TempDir::new().unwrap();
        let mut card = applet(&dir);
        process_apdu(&mut card, &init_cmd(b"2468", 0));

        assert_eq!(process_apdu(&mut card, &verify_cmd(b"")).sw(), 0x63C3);
        assert_eq!(process_apdu(&mut card, &verify_cmd(b"0000")).sw(), 0x63C2);
        assert_eq!(process_apdu(&mut card, &verify_cmd(b"0000")).sw(), 0x63C1);
        assert_eq!(process_apdu(&mut card, &verify_cmd(b"0000")).sw(), 0x63C0);
        assert_eq!(process_apdu(&mut card, &verify_cmd(b"2468")).sw(), 0x6983);
        assert_eq!(process_apdu(&mut card, &verify_cmd(b"")).sw(), 0x6983);

        // Counter survives a reload
        let reloaded = applet(&dir);
        assert!(reloaded.state().pin.locked);
    }

    #[test]
    fn test_bad_pin_format_keeps_counter() {
        let dir = TempDir::new().unwrap();
        let mut card = applet(&dir);
        process_apdu(&mut card, &init_cmd(b"2468", 0));

        assert_eq!(process_apdu(&mut card, &verify_cmd(b"24a8")).sw(), 0x6A80);
        assert_eq!(card.state().pin.retries, 3);
        assert_eq!(process_apdu(&mut card, &init_cmd(b"", 0)).sw(), 0x6A80);
    }

    #[test]
    fn test_unsupported_instruction() {
        let dir = TempDir::new().unwrap();
        let mut card = applet(&dir);
        let resp = process_apdu(&mut card, &APDU::new(IDENTITY_CLA, ins::CREDIT, 0, 0));
        assert_eq!(resp.sw(), 0x6D00);
    }
}
