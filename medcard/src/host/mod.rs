//! Off-card helpers
//!
//! What an issuing station or back office needs to talk to the card: command
//! builders, parsers for the structured replies, the signature check for
//! challenge-response authentication, and ledger reconciliation.

pub mod commands;
mod replay;
mod responses;

pub use replay::LedgerReplay;
pub use responses::{
    verify_challenge_signature, AccountSnapshot, LedgerStatus, PublicKey, TransactionReceipt,
};

use log::debug;
use thiserror::Error;

use crate::apdu::{APDUError, Response, APDU, SW};
use crate::VirtualCard;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("card returned status {0:04X}")]
    Status(u16),

    #[error("malformed {0}")]
    Malformed(&'static str),

    #[error("response payload: {0}")]
    Payload(#[from] APDUError),

    #[error("signature does not verify")]
    BadSignature,

    #[error("ledger sequence gap: expected {expected}, found {found}")]
    SequenceGap { expected: u16, found: u16 },

    #[error("ledger entry {0} does not follow from the previous balance")]
    BalanceMismatch(u16),

    #[error("ledger entry {0} breaks the hash chain")]
    ChainMismatch(u16),
}

impl HostError {
    /// The status word, if the card rejected the command
    pub fn status_word(&self) -> Option<u16> {
        match self {
            HostError::Status(sw) => Some(*sw),
            _ => None,
        }
    }
}

/// Send one command and collect its full reply
///
/// Follows `61xx` with GET RESPONSE until the card is done, then turns
/// anything other than `9000` into [`HostError::Status`].
pub fn exchange(card: &mut VirtualCard, cmd: &APDU) -> Result<Vec<u8>, HostError> {
    let mut response = transmit(card, cmd)?;
    let mut data = Vec::new();

    while let Some(remaining) = response.available_response() {
        data.append(&mut response.data);
        let le = if remaining == 0 { 256 } else { remaining as u32 };
        debug!("Fetching {} chained response bytes", le);
        response = transmit(card, &commands::get_response(le))?;
    }

    if response.sw() != SW::SUCCESS {
        return Err(HostError::Status(response.sw()));
    }
    data.append(&mut response.data);
    Ok(data)
}

fn transmit(card: &mut VirtualCard, cmd: &APDU) -> Result<Response, HostError> {
    Response::from_bytes(&card.transmit(&cmd.to_bytes())).ok_or(HostError::Malformed("response"))
}
