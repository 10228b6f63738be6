//! Patient account applet
//!
//! Issued once with a patient record, two PINs, and an opening balance.
//! The holder PIN unlocks the master key for the session; the
//! administrator-reset PIN recovers the same key through its own wrapping
//! when the holder is locked out.
//!
//! Every handler mutates a staged copy of the account and commits it in one
//! write. Wrong PINs are the one failure that commits: the decremented
//! counter is persisted before the error is returned.

use log::info;

use super::{
    expect_flag_param, expect_no_data, expect_params, pin_status_query, require_auth, CardApplet,
};
use crate::apdu::{ins, push_lv16, PayloadReader, APDU};
use crate::card::state::{
    AccountState, KeyPairData, LedgerState, PinCredential, CARD_ID_LEN, RECORD_CAPACITY,
};
use crate::card::{CardDataStore, Session};
use crate::config::CardConfig;
use crate::error::{CardError, CryptoError, Result};
use crate::identity;
use crate::ledger::{self, TransactionKind};
use crate::pin::PinManager;
use crate::vault::key_vault::MasterKey;
use crate::vault::{DataVault, KeySlot, KeyVault};

/// "\xF0HOSPPT"
pub const ACCOUNT_AID: &[u8] = &[0xF0, 0x48, 0x4F, 0x53, 0x50, 0x50, 0x54];
pub const ACCOUNT_CLA: u8 = 0xA0;

pub struct AccountApplet {
    store: CardDataStore<AccountState>,
    session: Session,
    config: CardConfig,
}

impl AccountApplet {
    pub fn new(store: CardDataStore<AccountState>, config: CardConfig) -> Self {
        Self {
            store,
            session: Session::new(),
            config,
        }
    }

    pub fn state(&self) -> &AccountState {
        self.store.state()
    }

    fn require_issued(&self) -> Result<()> {
        if self.store.state().issued {
            Ok(())
        } else {
            Err(CardError::NotIssued)
        }
    }

    /// Master key cached by the last successful holder verification
    fn session_key(&self) -> Result<&[u8; 16]> {
        require_auth(&self.session)?;
        self.session
            .master_key()
            .ok_or(CardError::AuthenticationRequired)
    }

    /// Unwrap a slot and prove the key by opening the balance block
    fn unlock(&self, account: &AccountState, slot: KeySlot, pin: &[u8]) -> Result<MasterKey> {
        let vault = KeyVault::new(&account.card_id, self.config.kdf_iterations);
        let master_key = vault.unwrap(&account.master_key, slot, pin)?;
        DataVault::new(&master_key).decrypt_balance(&account.balance)?;
        Ok(master_key)
    }

    /// Check the holder PIN and recover the master key
    ///
    /// A wrong PIN is committed and ends the session; on success the staged
    /// state (with its counter restored) is returned uncommitted.
    fn verify_holder(&mut self, pin: &[u8]) -> Result<(AccountState, MasterKey)> {
        let mut staged = self.store.stage();
        if let Err(e) = PinManager::verify(&mut staged.holder_pin, pin).into_result() {
            self.store.commit(staged)?;
            self.session.clear();
            return Err(e);
        }

        let master_key = self.unlock(&staged, KeySlot::Holder, pin)?;
        Ok((staged, master_key))
    }

    /// ISSUE: `id(16) lv16(record) lv8(holder_pin) lv8(admin_pin) balance(4)`
    fn handle_issue(&mut self, cmd: &APDU) -> Result<Vec<u8>> {
        expect_params(cmd, 0x00, 0x00)?;
        if self.store.state().issued {
            return Err(CardError::AlreadyIssued);
        }

        let mut reader = PayloadReader::new(&cmd.data);
        let card_id: [u8; CARD_ID_LEN] = reader.take_array()?;
        let record = reader.take_lv16()?;
        let holder_pin = reader.take_lv8()?;
        let admin_pin = reader.take_lv8()?;
        let balance = reader.take_i32()?;
        reader.finish()?;

        if card_id == [0u8; CARD_ID_LEN] {
            return Err(CardError::InvalidData);
        }
        if record.len() > RECORD_CAPACITY {
            return Err(CardError::RecordTooLarge);
        }
        PinManager::check_format(holder_pin)?;
        PinManager::check_format(admin_pin)?;
        if balance < 0 {
            return Err(CardError::InvalidAmount);
        }

        let master_key = KeyVault::generate_master_key()?;
        let vault = KeyVault::new(&card_id, self.config.kdf_iterations);
        let data = DataVault::new(&master_key);

        let mut staged = AccountState {
            issued: true,
            card_id,
            holder_pin: PinCredential::unset(self.config.holder_pin_retries),
            admin_reset_retries: self.config.admin_reset_retries,
            record: data.encrypt_record(record)?,
            balance: data.encrypt_balance(balance),
            ledger: LedgerState::default(),
            keypair: Some(KeyPairData::generate(self.config.rsa_bits)?),
            ..AccountState::default()
        };
        PinManager::set_pin(&mut staged.holder_pin, holder_pin)?;
        vault.wrap(&mut staged.master_key, KeySlot::Holder, holder_pin, &master_key)?;
        vault.wrap(&mut staged.master_key, KeySlot::Admin, admin_pin, &master_key)?;

        let public_key = identity::export_public_key(staged.keypair.as_ref())?;
        self.store.commit(staged)?;
        self.session.clear();
        info!("Account issued ({} record bytes, opening balance {})", record.len(), balance);
        Ok(public_key)
    }

    fn handle_verify(&mut self, cmd: &APDU) -> Result<Vec<u8>> {
        expect_params(cmd, 0x00, 0x00)?;
        self.require_issued()?;
        if cmd.data.is_empty() {
            return pin_status_query(&self.session, &self.store.state().holder_pin);
        }
        PinManager::check_format(&cmd.data)?;

        let (staged, master_key) = self.verify_holder(&cmd.data)?;
        self.store.commit(staged)?;
        self.session.authenticate(Some(master_key));
        Ok(Vec::new())
    }

    /// VERIFY & READ: holder PIN in, `lv16(record) || balance(4)` out
    fn handle_verify_and_read(&mut self, cmd: &APDU) -> Result<Vec<u8>> {
        expect_params(cmd, 0x00, 0x00)?;
        self.require_issued()?;
        PinManager::check_format(&cmd.data)?;

        let (staged, master_key) = self.verify_holder(&cmd.data)?;
        let data = DataVault::new(&master_key);
        let record = data.decrypt_record(&staged.record)?;
        let balance = data.decrypt_balance(&staged.balance)?;

        let mut out = Vec::with_capacity(2 + record.len() + 4);
        push_lv16(&mut out, &record);
        out.extend_from_slice(&balance.to_be_bytes());

        self.store.commit(staged)?;
        self.session.authenticate(Some(master_key));
        Ok(out)
    }

    fn handle_update_record(&mut self, cmd: &APDU) -> Result<Vec<u8>> {
        expect_params(cmd, 0x00, 0x00)?;
        self.require_issued()?;
        let master_key = self.session_key()?;
        if cmd.data.len() > RECORD_CAPACITY {
            return Err(CardError::RecordTooLarge);
        }

        let mut staged = self.store.stage();
        staged.record = DataVault::new(master_key).encrypt_record(&cmd.data)?;
        self.store.commit(staged)?;
        info!("Patient record updated ({} bytes)", cmd.data.len());
        Ok(Vec::new())
    }

    /// CHANGE PIN: `lv8(old) || lv8(new)`
    fn handle_change_pin(&mut self, cmd: &APDU) -> Result<Vec<u8>> {
        expect_params(cmd, 0x00, 0x00)?;
        self.require_issued()?;

        let mut reader = PayloadReader::new(&cmd.data);
        let old_pin = reader.take_lv8()?;
        let new_pin = reader.take_lv8()?;
        reader.finish()?;
        PinManager::check_format(old_pin)?;
        PinManager::check_format(new_pin)?;

        let (mut staged, master_key) = self.verify_holder(old_pin)?;
        let vault = KeyVault::new(&staged.card_id, self.config.kdf_iterations);
        vault.wrap(&mut staged.master_key, KeySlot::Holder, new_pin, &master_key)?;
        PinManager::set_pin(&mut staged.holder_pin, new_pin)?;

        self.store.commit(staged)?;
        self.session.authenticate(Some(master_key));
        info!("Holder PIN changed");
        Ok(Vec::new())
    }

    /// ADMIN RESET: `lv8(admin_pin) || lv8(new_holder_pin)`, P1=01 also
    /// rotates the key pair and returns the new public key
    fn handle_admin_reset(&mut self, cmd: &APDU) -> Result<Vec<u8>> {
        let rotate = expect_flag_param(cmd)?;
        self.require_issued()?;

        let mut reader = PayloadReader::new(&cmd.data);
        let admin_pin = reader.take_lv8()?;
        let new_pin = reader.take_lv8()?;
        reader.finish()?;
        PinManager::check_format(admin_pin)?;
        PinManager::check_format(new_pin)?;

        // The session never survives an administrator reset
        self.session.clear();

        let mut staged = self.store.stage();
        if staged.admin_reset_retries == 0 {
            return Err(CardError::PinBlocked);
        }

        let master_key = match self.unlock(&staged, KeySlot::Admin, admin_pin) {
            Ok(key) => key,
            Err(CardError::Crypto(CryptoError::Integrity)) => {
                staged.admin_reset_retries -= 1;
                let remaining = staged.admin_reset_retries;
                self.store.commit(staged)?;
                if remaining == 0 {
                    info!("Administrator reset path blocked");
                }
                return Err(CardError::WrongPin(remaining));
            }
            Err(e) => return Err(e),
        };

        staged.admin_reset_retries = self.config.admin_reset_retries;
        let vault = KeyVault::new(&staged.card_id, self.config.kdf_iterations);
        vault.wrap(&mut staged.master_key, KeySlot::Holder, new_pin, &master_key)?;
        PinManager::set_pin(&mut staged.holder_pin, new_pin)?;

        let response = if rotate {
            staged.keypair = Some(KeyPairData::generate(self.config.rsa_bits)?);
            identity::export_public_key(staged.keypair.as_ref())?
        } else {
            Vec::new()
        };

        self.store.commit(staged)?;
        info!("Holder PIN reset by administrator{}", if rotate { ", key pair rotated" } else { "" });
        Ok(response)
    }

    fn handle_transaction(&mut self, cmd: &APDU, kind: TransactionKind) -> Result<Vec<u8>> {
        expect_params(cmd, 0x00, 0x00)?;
        self.require_issued()?;
        let master_key = self.session_key()?;
        if self.store.state().holder_pin.locked {
            return Err(CardError::PinBlocked);
        }

        let mut reader = PayloadReader::new(&cmd.data);
        let amount = reader.take_i32().map_err(|_| CardError::WrongLength)?;
        reader.finish().map_err(|_| CardError::WrongLength)?;

        let mut staged = self.store.stage();
        let record = ledger::post(&mut staged, &DataVault::new(master_key), kind, amount)?;
        self.store.commit(staged)?;
        Ok(record.to_response())
    }

    fn handle_ledger_status(&self, cmd: &APDU) -> Result<Vec<u8>> {
        expect_params(cmd, 0x00, 0x00)?;
        expect_no_data(cmd)?;
        self.require_issued()?;
        Ok(ledger::status_response(&self.store.state().ledger))
    }

    fn handle_sign(&mut self, cmd: &APDU) -> Result<Vec<u8>> {
        expect_params(cmd, 0x00, 0x00)?;
        self.require_issued()?;
        require_auth(&self.session)?;
        identity::sign_challenge(self.store.state().keypair.as_ref(), &cmd.data)
    }

    fn handle_export_public_key(&self, cmd: &APDU) -> Result<Vec<u8>> {
        expect_params(cmd, 0x00, 0x00)?;
        expect_no_data(cmd)?;
        self.require_issued()?;
        identity::export_public_key(self.store.state().keypair.as_ref())
    }

    fn handle_read_identifier(&self, cmd: &APDU) -> Result<Vec<u8>> {
        expect_params(cmd, 0x00, 0x00)?;
        expect_no_data(cmd)?;
        self.require_issued()?;
        Ok(self.store.state().card_id.to_vec())
    }
}

impl CardApplet for AccountApplet {
    fn name(&self) -> &'static str {
        "account"
    }

    fn aid(&self) -> &'static [u8] {
        ACCOUNT_AID
    }

    fn cla(&self) -> u8 {
        ACCOUNT_CLA
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    fn handle(&mut self, cmd: &APDU) -> Result<Vec<u8>> {
        match cmd.ins {
            ins::ISSUE_ACCOUNT => self.handle_issue(cmd),
            ins::VERIFY_PIN => self.handle_verify(cmd),
            ins::VERIFY_AND_READ => self.handle_verify_and_read(cmd),
            ins::UPDATE_RECORD => self.handle_update_record(cmd),
            ins::CHANGE_PIN => self.handle_change_pin(cmd),
            ins::ADMIN_RESET_PIN => self.handle_admin_reset(cmd),
            ins::CREDIT => self.handle_transaction(cmd, TransactionKind::Credit),
            ins::DEBIT => self.handle_transaction(cmd, TransactionKind::Debit),
            ins::LEDGER_STATUS => self.handle_ledger_status(cmd),
            ins::SIGN_CHALLENGE => self.handle_sign(cmd),
            ins::EXPORT_PUBLIC_KEY => self.handle_export_public_key(cmd),
            ins::READ_IDENTIFIER => self.handle_read_identifier(cmd),
            other => Err(CardError::InsNotSupported(other)),
        }
    }
}
