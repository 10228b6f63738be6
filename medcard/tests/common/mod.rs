#![allow(dead_code)]

use medcard::config::CardConfig;
use medcard::host::{self, commands, HostError};
use medcard::{CardKind, VirtualCard};
use tempfile::TempDir;

pub const CARD_ID: [u8; 16] = [
    0x3C, 0x11, 0x8E, 0x02, 0x5A, 0x47, 0x90, 0xD1, 0x0B, 0x66, 0x2F, 0x71, 0xE4, 0x09, 0xA8, 0x5D,
];

/// Small keys keep key generation out of the way
pub fn test_config(dir: &TempDir) -> CardConfig {
    let mut config = CardConfig::with_storage_dir(dir.path());
    config.rsa_bits = 512;
    config
}

/// A powered card with its applet selected
pub fn open_card(kind: CardKind, config: &CardConfig) -> VirtualCard {
    let mut card = VirtualCard::open(kind, config.clone()).unwrap();
    card.power_on();
    host::exchange(&mut card, &commands::select(kind)).unwrap();
    card
}

/// Status word of a command the card is expected to refuse
pub fn rejected(card: &mut VirtualCard, cmd: &medcard::apdu::APDU) -> u16 {
    match host::exchange(card, cmd) {
        Err(HostError::Status(sw)) => sw,
        other => panic!("expected a status word, got {:?}", other),
    }
}
