//! Command builders
//!
//! One function per instruction. Payloads are laid out exactly as the
//! applets parse them; [`APDU::to_bytes`] switches to the extended form when
//! a payload outgrows a short frame.

use crate::apdu::{ins, push_lv16, push_lv8, APDU};
use crate::card::state::{CARD_ID_LEN, SALT_LEN};
use crate::CardKind;

/// SELECT by AID, interindustry class
pub fn select(kind: CardKind) -> APDU {
    APDU::with_data(0x00, ins::SELECT, 0x04, 0x00, kind.aid().to_vec())
}

/// Fetch the next chunk of a chained response
pub fn get_response(le: u32) -> APDU {
    APDU::new(0x00, ins::GET_RESPONSE, 0x00, 0x00).with_le(le)
}

pub fn verify_pin(kind: CardKind, pin: &[u8]) -> APDU {
    APDU::with_data(kind.cla(), ins::VERIFY_PIN, 0x00, 0x00, pin.to_vec())
}

/// VERIFY without data: report the retry counter without spending one
pub fn pin_status(kind: CardKind) -> APDU {
    APDU::new(kind.cla(), ins::VERIFY_PIN, 0x00, 0x00)
}

pub fn sign_challenge(kind: CardKind, challenge: &[u8]) -> APDU {
    APDU::with_data(kind.cla(), ins::SIGN_CHALLENGE, 0x00, 0x00, challenge.to_vec())
}

pub fn export_public_key(kind: CardKind) -> APDU {
    APDU::new(kind.cla(), ins::EXPORT_PUBLIC_KEY, 0x00, 0x00)
}

pub fn read_identifier(kind: CardKind) -> APDU {
    APDU::new(kind.cla(), ins::READ_IDENTIFIER, 0x00, 0x00)
}

/// Initialize the identity card; `rotate_key` forces a new key pair
pub fn initialize(pin: &[u8], salt: &[u8; SALT_LEN], rotate_key: bool) -> APDU {
    let mut data = Vec::with_capacity(1 + pin.len() + SALT_LEN);
    push_lv8(&mut data, pin);
    data.extend_from_slice(salt);
    APDU::with_data(
        CardKind::Identity.cla(),
        ins::INITIALIZE,
        rotate_key as u8,
        0x00,
        data,
    )
}

/// Issue the account card
pub fn issue_account(
    card_id: &[u8; CARD_ID_LEN],
    record: &[u8],
    holder_pin: &[u8],
    admin_pin: &[u8],
    opening_balance: i32,
) -> APDU {
    let mut data = Vec::with_capacity(CARD_ID_LEN + 2 + record.len() + 2 + 32 + 4);
    data.extend_from_slice(card_id);
    push_lv16(&mut data, record);
    push_lv8(&mut data, holder_pin);
    push_lv8(&mut data, admin_pin);
    data.extend_from_slice(&opening_balance.to_be_bytes());
    APDU::with_data(CardKind::Account.cla(), ins::ISSUE_ACCOUNT, 0x00, 0x00, data)
}

pub fn verify_and_read(pin: &[u8]) -> APDU {
    APDU::with_data(CardKind::Account.cla(), ins::VERIFY_AND_READ, 0x00, 0x00, pin.to_vec())
}

pub fn update_record(record: &[u8]) -> APDU {
    APDU::with_data(CardKind::Account.cla(), ins::UPDATE_RECORD, 0x00, 0x00, record.to_vec())
}

pub fn change_pin(old_pin: &[u8], new_pin: &[u8]) -> APDU {
    let mut data = Vec::new();
    push_lv8(&mut data, old_pin);
    push_lv8(&mut data, new_pin);
    APDU::with_data(CardKind::Account.cla(), ins::CHANGE_PIN, 0x00, 0x00, data)
}

/// Reset the holder PIN with the administrator-reset PIN
pub fn admin_reset_pin(admin_pin: &[u8], new_holder_pin: &[u8], rotate_key: bool) -> APDU {
    let mut data = Vec::new();
    push_lv8(&mut data, admin_pin);
    push_lv8(&mut data, new_holder_pin);
    APDU::with_data(
        CardKind::Account.cla(),
        ins::ADMIN_RESET_PIN,
        rotate_key as u8,
        0x00,
        data,
    )
}

pub fn credit(amount: i32) -> APDU {
    APDU::with_data(
        CardKind::Account.cla(),
        ins::CREDIT,
        0x00,
        0x00,
        amount.to_be_bytes().to_vec(),
    )
}

pub fn debit(amount: i32) -> APDU {
    APDU::with_data(
        CardKind::Account.cla(),
        ins::DEBIT,
        0x00,
        0x00,
        amount.to_be_bytes().to_vec(),
    )
}

pub fn ledger_status() -> APDU {
    APDU::new(CardKind::Account.cla(), ins::LEDGER_STATUS, 0x00, 0x00)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apdu::parse_apdu;

    #[test]
    fn test_select_bytes() {
        assert_eq!(
            hex::encode_upper(select(CardKind::Account).to_bytes()),
            "00A4040007F0484F53505054"
        );
        assert_eq!(
            hex::encode_upper(select(CardKind::Identity).to_bytes()),
            "00A4040007F0484F53504144"
        );
    }

    #[test]
    fn test_credit_bytes() {
        assert_eq!(hex::encode_upper(credit(100_000).to_bytes()), "A0E2000004000186A0");
    }

    #[test]
    fn test_issue_layout() {
        let id = [0x11u8; CARD_ID_LEN];
        let cmd = issue_account(&id, b"rec", b"123456", b"654321", 0);
        let mut expected = id.to_vec();
        expected.extend_from_slice(&hex::decode("0003726563").unwrap());
        expected.extend_from_slice(b"\x06123456\x06654321");
        expected.extend_from_slice(&[0, 0, 0, 0]);
        assert_eq!(cmd.data, expected);
        assert_eq!(cmd.cla, 0xA0);
    }

    #[test]
    fn test_large_record_uses_extended_frame() {
        let cmd = update_record(&[0x42; 256]);
        let bytes = cmd.to_bytes();
        assert_eq!(&bytes[..7], &[0xA0, 0xD6, 0x00, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(parse_apdu(&bytes).unwrap(), cmd);
    }

    #[test]
    fn test_rotation_flag() {
        assert_eq!(admin_reset_pin(b"1", b"2", true).p1, 0x01);
        assert_eq!(initialize(b"1234", &[0u8; SALT_LEN], false).p1, 0x00);
    }
}
