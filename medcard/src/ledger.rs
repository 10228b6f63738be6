//! Transaction ledger
//!
//! Every committed credit or debit advances a 16-bit sequence counter and
//! extends a SHA-1 hash chain:
//!
//! ```text
//! hash' = SHA1(hash || seq(2) || type(1) || amount(4) || new_balance(4))
//! ```
//!
//! The chain starts from 20 zero bytes at sequence 0. A transaction walks
//! validate amount, compute balance, append hash, then writes the results
//! into the staged account state; nothing is written if an earlier step
//! fails.

use log::info;

use crate::card::state::{AccountState, LedgerState};
use crate::crypto::hash::{HashOperations, SHA1_LEN};
use crate::error::{CardError, Result};
use crate::vault::DataVault;

pub const GENESIS_HASH: [u8; SHA1_LEN] = [0u8; SHA1_LEN];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransactionKind {
    Credit = 0x01,
    Debit = 0x02,
}

impl TransactionKind {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// One committed ledger entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub sequence: u16,
    pub kind: TransactionKind,
    pub amount: i32,
    pub new_balance: i32,
    pub chain_hash: [u8; SHA1_LEN],
}

impl TransactionRecord {
    /// `sequence(2) || balance(4) || chain_hash(20)`
    pub fn to_response(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + 4 + SHA1_LEN);
        out.extend_from_slice(&self.sequence.to_be_bytes());
        out.extend_from_slice(&self.new_balance.to_be_bytes());
        out.extend_from_slice(&self.chain_hash);
        out
    }
}

/// Extend the chain by one entry
pub fn chain_hash(
    prev: &[u8; SHA1_LEN],
    sequence: u16,
    kind: TransactionKind,
    amount: i32,
    new_balance: i32,
) -> [u8; SHA1_LEN] {
    HashOperations::sha1_parts(&[
        prev,
        &sequence.to_be_bytes(),
        &[kind.code()],
        &amount.to_be_bytes(),
        &new_balance.to_be_bytes(),
    ])
}

/// Amounts are strictly positive
pub fn validate_amount(amount: i32) -> Result<()> {
    if amount <= 0 {
        return Err(CardError::InvalidAmount);
    }
    Ok(())
}

/// Balance after applying `amount`, refusing to go negative or overflow
pub fn next_balance(kind: TransactionKind, balance: i32, amount: i32) -> Result<i32> {
    match kind {
        TransactionKind::Credit => balance
            .checked_add(amount)
            .ok_or(CardError::BalanceOverflow),
        TransactionKind::Debit if amount > balance => Err(CardError::InsufficientBalance),
        TransactionKind::Debit => Ok(balance - amount),
    }
}

/// Reply to a ledger status query: `sequence(2) || chain_hash(20)`
pub fn status_response(ledger: &LedgerState) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + SHA1_LEN);
    out.extend_from_slice(&ledger.sequence.to_be_bytes());
    out.extend_from_slice(&ledger.chain_hash);
    out
}

/// Run one transaction against a staged account
pub fn post(
    account: &mut AccountState,
    vault: &DataVault<'_>,
    kind: TransactionKind,
    amount: i32,
) -> Result<TransactionRecord> {
    validate_amount(amount)?;

    let balance = vault.decrypt_balance(&account.balance)?;
    let new_balance = next_balance(kind, balance, amount)?;

    let sequence = account
        .ledger
        .sequence
        .checked_add(1)
        .ok_or(CardError::SequenceExhausted)?;
    let hash = chain_hash(&account.ledger.chain_hash, sequence, kind, amount, new_balance);

    account.balance = vault.encrypt_balance(new_balance);
    account.ledger = LedgerState {
        sequence,
        chain_hash: hash,
    };

    info!("Ledger {:?} #{} committed", kind, sequence);
    Ok(TransactionRecord {
        sequence,
        kind,
        amount,
        new_balance,
        chain_hash: hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::state::MASTER_KEY_LEN;

    const KEY: [u8; MASTER_KEY_LEN] = [0x77; MASTER_KEY_LEN];

    fn account(balance: i32) -> AccountState {
        let mut account = AccountState::default();
        account.issued = true;
        account.balance = DataVault::new(&KEY).encrypt_balance(balance);
        account
    }

    #[test]
    fn test_chain_hash_layout() {
        let mut preimage = GENESIS_HASH.to_vec();
        preimage.extend_from_slice(&[0x00, 0x01, 0x01]);
        preimage.extend_from_slice(&hex::decode("000186a0000186a0").unwrap());
        assert_eq!(preimage.len(), 31);

        let expected = HashOperations::sha1(&preimage);
        assert_eq!(
            chain_hash(&GENESIS_HASH, 1, TransactionKind::Credit, 100000, 100000),
            expected
        );
    }

    #[test]
    fn test_credit_then_debit() {
        let vault = DataVault::new(&KEY);
        let mut acct = account(0);

        let credit = post(&mut acct, &vault, TransactionKind::Credit, 100000).unwrap();
        assert_eq!(credit.sequence, 1);
        assert_eq!(credit.new_balance, 100000);

        let debit = post(&mut acct, &vault, TransactionKind::Debit, 30000).unwrap();
        assert_eq!(debit.sequence, 2);
        assert_eq!(debit.new_balance, 70000);
        assert_eq!(
            debit.chain_hash,
            chain_hash(&credit.chain_hash, 2, TransactionKind::Debit, 30000, 70000)
        );
        assert_eq!(acct.ledger.chain_hash, debit.chain_hash);
        assert_eq!(vault.decrypt_balance(&acct.balance), Ok(70000));
    }

    #[test]
    fn test_rejections_leave_state_untouched() {
        let vault = DataVault::new(&KEY);
        let mut acct = account(500);
        let before = acct.clone();

        assert_eq!(
            post(&mut acct, &vault, TransactionKind::Debit, 999_999_999),
            Err(CardError::InsufficientBalance)
        );
        assert_eq!(
            post(&mut acct, &vault, TransactionKind::Credit, 0),
            Err(CardError::InvalidAmount)
        );
        assert_eq!(
            post(&mut acct, &vault, TransactionKind::Debit, -5),
            Err(CardError::InvalidAmount)
        );
        assert_eq!(
            post(&mut acct, &vault, TransactionKind::Credit, i32::MAX),
            Err(CardError::BalanceOverflow)
        );
        assert_eq!(acct, before);
    }

    #[test]
    fn test_credit_to_exact_maximum() {
        let vault = DataVault::new(&KEY);
        let mut acct = account(i32::MAX - 10);
        let record = post(&mut acct, &vault, TransactionKind::Credit, 10).unwrap();
        assert_eq!(record.new_balance, i32::MAX);
    }

    #[test]
    fn test_debit_to_zero() {
        let vault = DataVault::new(&KEY);
        let mut acct = account(42);
        assert_eq!(post(&mut acct, &vault, TransactionKind::Debit, 42).unwrap().new_balance, 0);
    }

    #[test]
    fn test_sequence_exhaustion() {
        let vault = DataVault::new(&KEY);
        let mut acct = account(10);
        acct.ledger.sequence = u16::MAX - 1;

        assert_eq!(post(&mut acct, &vault, TransactionKind::Credit, 1).unwrap().sequence, u16::MAX);
        let before = acct.clone();
        assert_eq!(
            post(&mut acct, &vault, TransactionKind::Credit, 1),
            Err(CardError::SequenceExhausted)
        );
        assert_eq!(acct, before);
    }

    #[test]
    fn test_status_response() {
        let ledger = LedgerState {
            sequence: 2,
            chain_hash: [0xAB; SHA1_LEN],
        };
        let out = status_response(&ledger);
        assert_eq!(&out[..2], &[0x00, 0x02]);
        assert_eq!(&out[2..], &[0xAB; SHA1_LEN]);
    }
}
