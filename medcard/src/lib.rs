//! Virtual hospital smart card
//!
//! One card body, two personalities: an administrator identity card that
//! holds a signing key behind a PIN, and a patient account card that keeps an
//! encrypted medical record, an encrypted balance, and a hash-chained
//! transaction ledger.
//!
//! [`VirtualCard`] plays the part of the card's runtime: it answers power
//! events with an ATR, routes SELECT by AID, and hands every other command to
//! the hosted applet. Host-side helpers for building commands and checking
//! responses live in [`host`].

pub mod apdu;
pub mod applet;
pub mod card;
pub mod config;
pub mod crypto;
pub mod error;
pub mod host;
pub mod identity;
pub mod ledger;
pub mod pin;
pub mod vault;

use std::fmt;

use log::{debug, info, warn};
use thiserror::Error;

use apdu::{ins, parse_apdu, Response, APDU, SW};
use applet::{
    AccountApplet, CardApplet, IdentityApplet, ACCOUNT_AID, ACCOUNT_CLA, IDENTITY_AID, IDENTITY_CLA,
};
use card::{card_atr, AccountState, CardDataStore, IdentityState, StoreError};
use config::{CardConfig, ConfigError};

/// The two card personalities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardKind {
    Identity,
    Account,
}

impl CardKind {
    pub fn aid(self) -> &'static [u8] {
        match self {
            CardKind::Identity => IDENTITY_AID,
            CardKind::Account => ACCOUNT_AID,
        }
    }

    pub fn cla(self) -> u8 {
        match self {
            CardKind::Identity => IDENTITY_CLA,
            CardKind::Account => ACCOUNT_CLA,
        }
    }

    /// Last historical byte of the ATR
    pub fn atr_tag(self) -> u8 {
        match self {
            CardKind::Identity => 0x01,
            CardKind::Account => 0x02,
        }
    }
}

impl fmt::Display for CardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardKind::Identity => write!(f, "identity"),
            CardKind::Account => write!(f, "account"),
        }
    }
}

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A card body hosting a single applet
pub struct VirtualCard {
    kind: CardKind,
    applet: Box<dyn CardApplet>,
    selected: bool,
    atr: Vec<u8>,
    powered: bool,
}

impl VirtualCard {
    /// Load the card of `kind` from the configured storage directory
    pub fn open(kind: CardKind, config: CardConfig) -> Result<Self, OpenError> {
        config.validate()?;

        let applet: Box<dyn CardApplet> = match kind {
            CardKind::Identity => {
                let mut store: CardDataStore<IdentityState> =
                    CardDataStore::new(config.storage_dir.clone());
                store.load()?;
                Box::new(IdentityApplet::new(store, config))
            }
            CardKind::Account => {
                let mut store: CardDataStore<AccountState> =
                    CardDataStore::new(config.storage_dir.clone());
                store.load()?;
                Box::new(AccountApplet::new(store, config))
            }
        };

        info!("Opened {} card", kind);
        Ok(Self {
            kind,
            applet,
            selected: false,
            atr: card_atr(kind.atr_tag()),
            powered: false,
        })
    }

    pub fn kind(&self) -> CardKind {
        self.kind
    }

    pub fn atr(&self) -> &[u8] {
        &self.atr
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    /// Power on the card, returning its ATR
    pub fn power_on(&mut self) -> Vec<u8> {
        self.powered = true;
        self.deselect();
        info!("Virtual card powered on");
        self.atr.clone()
    }

    pub fn power_off(&mut self) {
        self.powered = false;
        self.deselect();
        info!("Virtual card powered off");
    }

    /// Warm reset
    pub fn reset(&mut self) -> Vec<u8> {
        self.deselect();
        self.powered = true;
        info!("Virtual card reset");
        self.atr.clone()
    }

    /// Process a raw command APDU, returning `data || SW1 SW2`
    pub fn transmit(&mut self, apdu_bytes: &[u8]) -> Vec<u8> {
        if !self.powered {
            return Response::error(SW::CONDITIONS_NOT_SATISFIED).to_bytes();
        }

        let cmd = match parse_apdu(apdu_bytes) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("Failed to parse APDU: {}", e);
                return Response::error(SW::WRONG_LENGTH).to_bytes();
            }
        };

        self.process_apdu(&cmd).to_bytes()
    }

    /// Process a parsed command APDU
    pub fn process_apdu(&mut self, cmd: &APDU) -> Response {
        if !self.powered {
            return Response::error(SW::CONDITIONS_NOT_SATISFIED);
        }

        debug!(
            "Processing APDU: CLA={:02X} INS={:02X} P1={:02X} P2={:02X} Lc={}",
            cmd.cla,
            cmd.ins,
            cmd.p1,
            cmd.p2,
            cmd.data.len()
        );

        if cmd.ins == ins::SELECT {
            return self.handle_select(cmd);
        }

        if !self.selected {
            return Response::error(SW::CONDITIONS_NOT_SATISFIED);
        }
        applet::process_apdu(self.applet.as_mut(), cmd)
    }

    fn handle_select(&mut self, cmd: &APDU) -> Response {
        if cmd.cla != 0x00 && cmd.cla != self.applet.cla() {
            return Response::error(SW::CLA_NOT_SUPPORTED);
        }
        if cmd.p1 != 0x04 {
            // Only SELECT by DF name is supported
            return Response::error(SW::INS_NOT_SUPPORTED);
        }

        // Selecting anything, found or not, ends the current session
        self.deselect();

        if cmd.data.as_slice() == self.applet.aid() {
            self.selected = true;
            info!("Selected {} applet", self.applet.name());
            return Response::ok();
        }

        debug!("Unknown AID: {}", hex::encode_upper(&cmd.data));
        Response::error(SW::FILE_NOT_FOUND)
    }

    fn deselect(&mut self) {
        self.selected = false;
        self.applet.clear_session();
    }
}
