//! Ledger reconciliation
//!
//! The card only keeps the head of its hash chain. A back office that has
//! logged every transaction it sent can rebuild the chain from the opening
//! balance and compare the result with what the card reports; any edited,
//! dropped, or reordered entry changes the head.

use crate::crypto::hash::SHA1_LEN;
use crate::ledger::{self, TransactionKind, TransactionRecord, GENESIS_HASH};

use super::responses::{LedgerStatus, TransactionReceipt};
use super::HostError;

/// Running recomputation of a card's ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerReplay {
    sequence: u16,
    chain_hash: [u8; SHA1_LEN],
    balance: i32,
}

impl LedgerReplay {
    /// Start from a freshly issued card
    pub fn new(opening_balance: i32) -> Self {
        Self {
            sequence: 0,
            chain_hash: GENESIS_HASH,
            balance: opening_balance,
        }
    }

    /// Replay an ordered list of transactions
    pub fn replay<'a, I>(opening_balance: i32, records: I) -> Result<Self, HostError>
    where
        I: IntoIterator<Item = &'a TransactionRecord>,
    {
        let mut replay = Self::new(opening_balance);
        for record in records {
            replay.apply(record)?;
        }
        Ok(replay)
    }

    /// Check one logged transaction and advance past it
    pub fn apply(&mut self, record: &TransactionRecord) -> Result<(), HostError> {
        let expected = self.sequence.wrapping_add(1);
        if record.sequence != expected {
            return Err(HostError::SequenceGap {
                expected,
                found: record.sequence,
            });
        }

        let new_balance = ledger::validate_amount(record.amount)
            .and_then(|()| ledger::next_balance(record.kind, self.balance, record.amount))
            .map_err(|_| HostError::BalanceMismatch(record.sequence))?;
        if new_balance != record.new_balance {
            return Err(HostError::BalanceMismatch(record.sequence));
        }

        let hash = ledger::chain_hash(
            &self.chain_hash,
            record.sequence,
            record.kind,
            record.amount,
            record.new_balance,
        );
        if hash != record.chain_hash {
            return Err(HostError::ChainMismatch(record.sequence));
        }

        self.sequence = record.sequence;
        self.chain_hash = hash;
        self.balance = new_balance;
        Ok(())
    }

    /// Build the log entry for a transaction the card just acknowledged
    pub fn record(
        kind: TransactionKind,
        amount: i32,
        receipt: &TransactionReceipt,
    ) -> TransactionRecord {
        TransactionRecord {
            sequence: receipt.sequence,
            kind,
            amount,
            new_balance: receipt.balance,
            chain_hash: receipt.chain_hash,
        }
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn chain_hash(&self) -> &[u8; SHA1_LEN] {
        &self.chain_hash
    }

    pub fn balance(&self) -> i32 {
        self.balance
    }

    /// Whether the card's reported head agrees with the replayed one
    pub fn matches(&self, status: &LedgerStatus) -> bool {
        status.sequence == self.sequence && status.chain_hash == self.chain_hash
    }
}
