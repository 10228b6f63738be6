//! APDU (Application Protocol Data Unit) handling
//!
//! Command parsing and serialization for ISO 7816-4 frames, the response
//! type returned by the applets, status words, and a reader for the
//! length-prefixed fields carried inside command payloads.
//!
//! # Example
//! ```ignore
//! use medcard::apdu::{parse_apdu, Response};
//!
//! // VERIFY PIN "123456" on the patient account applet
//! let raw = &[0xA0, 0x20, 0x00, 0x00, 0x06, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36];
//! let apdu = parse_apdu(raw).unwrap();
//! assert_eq!(apdu.ins, 0x20);
//! ```

mod payload;
mod response;
mod status;

pub use payload::{push_lv16, push_lv8, PayloadReader};
pub use response::Response;
pub use status::SW;

use thiserror::Error;

/// Errors that can occur during APDU parsing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum APDUError {
    #[error("APDU too short: expected at least 4 bytes, got {0}")]
    TooShort(usize),

    #[error("Invalid APDU length")]
    InvalidLength,

    #[error("Invalid extended APDU format")]
    InvalidExtendedFormat,

    #[error("payload truncated: needed {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("{0} unexpected trailing payload bytes")]
    TrailingBytes(usize),
}

/// A parsed APDU command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct APDU {
    /// Class byte (CLA)
    pub cla: u8,
    /// Instruction byte (INS)
    pub ins: u8,
    /// Parameter 1 (P1)
    pub p1: u8,
    /// Parameter 2 (P2)
    pub p2: u8,
    /// Command data (may be empty)
    pub data: Vec<u8>,
    /// Expected response length (Le), None if not specified
    pub le: Option<u32>,
}

impl APDU {
    /// Create a new APDU with just the header (CLA, INS, P1, P2)
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self::with_data(cla, ins, p1, p2, Vec::new())
    }

    /// Create a new APDU with data
    pub fn with_data(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data,
            le: None,
        }
    }

    /// Set the expected response length
    pub fn with_le(mut self, le: u32) -> Self {
        self.le = Some(le);
        self
    }

    /// Serialize to wire bytes
    ///
    /// Uses the short form when Lc fits in one byte and Le is at most 256,
    /// otherwise the extended form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![self.cla, self.ins, self.p1, self.p2];
        let extended = self.data.len() > 255 || self.le.map_or(false, |le| le > 256);

        if !extended {
            if !self.data.is_empty() {
                out.push(self.data.len() as u8);
                out.extend_from_slice(&self.data);
            }
            if let Some(le) = self.le {
                out.push(if le == 256 { 0 } else { le as u8 });
            }
            return out;
        }

        out.push(0x00);
        if !self.data.is_empty() {
            out.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
            out.extend_from_slice(&self.data);
        }
        if let Some(le) = self.le {
            let le = if le >= 65536 { 0 } else { le as u16 };
            out.extend_from_slice(&le.to_be_bytes());
        }
        out
    }
}

/// Parse raw bytes into an APDU
///
/// Supports both short and extended APDU formats:
/// - Short: CLA INS P1 P2 [Lc Data] [Le]
/// - Extended: CLA INS P1 P2 00 Lc1 Lc2 Data [Le1 Le2]
pub fn parse_apdu(data: &[u8]) -> Result<APDU, APDUError> {
    if data.len() < 4 {
        return Err(APDUError::TooShort(data.len()));
    }

    let (cla, ins, p1, p2) = (data[0], data[1], data[2], data[3]);
    let body = &data[4..];

    if body.is_empty() {
        return Ok(APDU::new(cla, ins, p1, p2));
    }

    // A leading 00 followed by at least two bytes marks the extended form,
    // provided the declared Lc is consistent with what follows
    if body[0] == 0x00 && body.len() > 2 {
        let ext = &body[1..];
        let lc = u16::from_be_bytes([ext[0], ext[1]]) as usize;
        let consistent = ext.len() == 2 || ext.len() == 2 + lc || ext.len() == 2 + lc + 2;
        if consistent {
            return parse_extended_apdu(cla, ins, p1, p2, ext);
        }
    }

    parse_short_apdu(cla, ins, p1, p2, body)
}

/// Parse short format APDU (Lc/Le up to 255 bytes)
fn parse_short_apdu(cla: u8, ins: u8, p1: u8, p2: u8, body: &[u8]) -> Result<APDU, APDUError> {
    let short_le = |b: u8| if b == 0 { 256 } else { b as u32 };

    // Case 2: Le only
    if body.len() == 1 {
        return Ok(APDU::new(cla, ins, p1, p2).with_le(short_le(body[0])));
    }

    let lc = body[0] as usize;
    let mut apdu = match body.get(1..1 + lc) {
        Some(payload) => APDU::with_data(cla, ins, p1, p2, payload.to_vec()),
        None => return Err(APDUError::InvalidLength),
    };

    match body.len() - 1 - lc {
        // Case 3: Lc + Data
        0 => Ok(apdu),
        // Case 4: Lc + Data + Le
        1 => {
            apdu.le = Some(short_le(body[1 + lc]));
            Ok(apdu)
        }
        _ => Err(APDUError::InvalidLength),
    }
}

/// Parse extended format APDU (Lc/Le up to 65535 bytes)
fn parse_extended_apdu(cla: u8, ins: u8, p1: u8, p2: u8, ext: &[u8]) -> Result<APDU, APDUError> {
    let extended_le = |w: u32| if w == 0 { 65536 } else { w };
    let first_word = u16::from_be_bytes([ext[0], ext[1]]) as u32;

    // Case 2E: extended Le only
    if ext.len() == 2 {
        return Ok(APDU::new(cla, ins, p1, p2).with_le(extended_le(first_word)));
    }

    let lc = first_word as usize;
    if ext.len() < 2 + lc {
        return Err(APDUError::InvalidLength);
    }
    let mut apdu = APDU::with_data(cla, ins, p1, p2, ext[2..2 + lc].to_vec());

    match ext.len() - 2 - lc {
        // Case 3E
        0 => Ok(apdu),
        // Case 4E
        2 => {
            let le = u16::from_be_bytes([ext[2 + lc], ext[3 + lc]]) as u32;
            apdu.le = Some(extended_le(le));
            Ok(apdu)
        }
        _ => Err(APDUError::InvalidExtendedFormat),
    }
}

/// Instruction bytes understood by the hospital card applets
pub mod ins {
    pub const SELECT: u8 = 0xA4;
    pub const GET_RESPONSE: u8 = 0xC0;

    pub const VERIFY_PIN: u8 = 0x20;
    pub const SIGN_CHALLENGE: u8 = 0x88;
    pub const EXPORT_PUBLIC_KEY: u8 = 0xB4;
    pub const READ_IDENTIFIER: u8 = 0xCA;

    /// Administrator identity applet
    pub const INITIALIZE: u8 = 0x10;

    /// Patient account applet
    pub const ISSUE_ACCOUNT: u8 = 0x12;
    pub const VERIFY_AND_READ: u8 = 0x22;
    pub const CHANGE_PIN: u8 = 0x24;
    pub const ADMIN_RESET_PIN: u8 = 0x2C;
    pub const UPDATE_RECORD: u8 = 0xD6;
    pub const CREDIT: u8 = 0xE2;
    pub const DEBIT: u8 = 0xE4;
    pub const LEDGER_STATUS: u8 = 0xE6;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case1_no_data_no_le() {
        let apdu = parse_apdu(&[0xA0, ins::LEDGER_STATUS, 0x00, 0x00]).unwrap();
        assert_eq!(apdu.cla, 0xA0);
        assert_eq!(apdu.ins, 0xE6);
        assert!(apdu.data.is_empty());
        assert!(apdu.le.is_none());
    }

    #[test]
    fn test_case2_le_only() {
        let apdu = parse_apdu(&[0x80, 0xCA, 0x00, 0x00, 0x00]).unwrap();
        assert!(apdu.data.is_empty());
        assert_eq!(apdu.le, Some(256));
    }

    #[test]
    fn test_case3_lc_data() {
        let apdu = parse_apdu(&[0xA0, 0x20, 0x00, 0x00, 0x06, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36]).unwrap();
        assert_eq!(apdu.data, b"123456".to_vec());
        assert!(apdu.le.is_none());
    }

    #[test]
    fn test_case4_lc_data_le() {
        let apdu = parse_apdu(&[0xA0, 0xE2, 0x00, 0x00, 0x04, 0x00, 0x01, 0x86, 0xA0, 0x1A]).unwrap();
        assert_eq!(apdu.data, vec![0x00, 0x01, 0x86, 0xA0]);
        assert_eq!(apdu.le, Some(26));
    }

    #[test]
    fn test_extended_lc() {
        let payload = vec![0x42u8; 300];
        let raw = APDU::with_data(0xA0, ins::ISSUE_ACCOUNT, 0, 0, payload.clone()).to_bytes();
        assert_eq!(&raw[4..7], &[0x00, 0x01, 0x2C]);

        let apdu = parse_apdu(&raw).unwrap();
        assert_eq!(apdu.data, payload);
        assert!(apdu.le.is_none());
    }

    #[test]
    fn test_to_bytes_short_roundtrip() {
        let cmd = APDU::with_data(0xA0, ins::DEBIT, 0, 0, vec![0, 0, 0x75, 0x30]).with_le(256);
        let raw = cmd.to_bytes();
        assert_eq!(raw, vec![0xA0, 0xE4, 0x00, 0x00, 0x04, 0x00, 0x00, 0x75, 0x30, 0x00]);
        assert_eq!(parse_apdu(&raw).unwrap(), cmd);
    }

    #[test]
    fn test_inconsistent_lc() {
        assert_eq!(
            parse_apdu(&[0xA0, 0x20, 0x00, 0x00, 0x05, 0x31, 0x32]),
            Err(APDUError::InvalidLength)
        );
    }

    #[test]
    fn test_too_short() {
        assert!(matches!(
            parse_apdu(&[0x00, 0xA4, 0x04]),
            Err(APDUError::TooShort(3))
        ));
    }
}
