//! Status Word (SW) constants for APDU responses
//!
//! ISO 7816-4 status words plus the proprietary 6A8x and 6Fxx values the
//! hospital card uses for ledger and crypto failures.

/// Status Word constants
pub struct SW;

impl SW {
    // Success
    pub const SUCCESS: u16 = 0x9000;

    // Checking errors (67xx, 69xx, 6Axx, 6Bxx, 6Dxx, 6Exx)
    pub const WRONG_LENGTH: u16 = 0x6700;

    pub const SECURITY_STATUS_NOT_SATISFIED: u16 = 0x6982;
    pub const AUTH_METHOD_BLOCKED: u16 = 0x6983;
    pub const CONDITIONS_NOT_SATISFIED: u16 = 0x6985;

    pub const WRONG_DATA: u16 = 0x6A80;
    pub const FILE_NOT_FOUND: u16 = 0x6A82;
    pub const NOT_ENOUGH_MEMORY: u16 = 0x6A84;

    // Ledger range violations (proprietary, 6A8B..6A8D)
    pub const INSUFFICIENT_BALANCE: u16 = 0x6A8B;
    pub const BALANCE_OVERFLOW: u16 = 0x6A8C;
    pub const SEQUENCE_EXHAUSTED: u16 = 0x6A8D;

    pub const WRONG_P1_P2: u16 = 0x6B00;
    pub const INS_NOT_SUPPORTED: u16 = 0x6D00;
    pub const CLA_NOT_SUPPORTED: u16 = 0x6E00;

    // Internal failures, sub-ranged by primitive
    pub const CIPHER_FAILURE: u16 = 0x6F10;
    pub const PADDING_MISMATCH: u16 = 0x6F11;
    pub const INTEGRITY_FAILURE: u16 = 0x6F12;
    pub const KDF_FAILURE: u16 = 0x6F20;
    pub const KEY_PAIR_MISSING: u16 = 0x6F30;
    pub const KEY_GENERATION_FAILURE: u16 = 0x6F31;
    pub const SIGNATURE_FAILURE: u16 = 0x6F32;
    pub const RANDOM_FAILURE: u16 = 0x6F40;
    pub const STORAGE_FAILURE: u16 = 0x6F50;

    /// Create a "more data available" status word (61xx)
    /// The low byte indicates how many more bytes are available
    #[inline]
    pub fn bytes_remaining(remaining: u8) -> u16 {
        0x6100 | (remaining as u16)
    }

    /// Create a warning with counter (63Cx)
    /// Used to indicate PIN retry count remaining
    #[inline]
    pub fn counter_warning(retries: u8) -> u16 {
        0x63C0 | ((retries & 0x0F) as u16)
    }

    /// Check if a status word indicates success (9000 or 61xx)
    #[inline]
    pub fn is_success(sw: u16) -> bool {
        sw == Self::SUCCESS || (sw & 0xFF00) == 0x6100
    }

    /// Check if a status word is a counter warning (63Cx)
    #[inline]
    pub fn is_counter_warning(sw: u16) -> bool {
        (sw & 0xFFF0) == 0x63C0
    }

    /// Extract retry count from counter warning (63Cx)
    #[inline]
    pub fn get_retry_count(sw: u16) -> Option<u8> {
        if Self::is_counter_warning(sw) {
            Some((sw & 0x0F) as u8)
        } else {
            None
        }
    }

    /// True for the 6Fxx internal-failure range
    #[inline]
    pub fn is_internal_failure(sw: u16) -> bool {
        (sw & 0xFF00) == 0x6F00
    }
}
