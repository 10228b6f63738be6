//! Card applets
//!
//! Each card type hosts one applet. The code here is shared by both: class
//! byte checks, GET RESPONSE chaining, the error-to-status-word boundary, and
//! small guards used by the command handlers.

pub mod account;
pub mod identity;

pub use account::{AccountApplet, ACCOUNT_AID, ACCOUNT_CLA};
pub use identity::{IdentityApplet, IDENTITY_AID, IDENTITY_CLA};

use log::{debug, warn};

use crate::apdu::{ins, Response, APDU};
use crate::card::state::PinCredential;
use crate::card::Session;
use crate::error::{CardError, Result};
use crate::pin::PinManager;

/// Default response size when the command carries no Le
const DEFAULT_LE: usize = 256;

/// An applet as seen by the virtual card
pub trait CardApplet {
    fn name(&self) -> &'static str;

    /// Application identifier matched by SELECT
    fn aid(&self) -> &'static [u8];

    /// Proprietary class byte for this card type
    fn cla(&self) -> u8;

    fn session_mut(&mut self) -> &mut Session;

    /// Run one command, returning response data
    fn handle(&mut self, cmd: &APDU) -> Result<Vec<u8>>;

    /// Called on selection, deselection, power loss, and reset
    fn clear_session(&mut self) {
        self.session_mut().clear();
    }
}

/// Process a command for the selected applet
///
/// This is the only place a `CardError` becomes a status word.
pub fn process_apdu(applet: &mut dyn CardApplet, cmd: &APDU) -> Response {
    let result = if cmd.ins == ins::GET_RESPONSE {
        check_cla(applet, cmd, true).and_then(|()| get_response(applet.session_mut(), cmd))
    } else {
        applet.session_mut().discard_pending();
        check_cla(applet, cmd, false).and_then(|()| applet.handle(cmd))
    };

    match result {
        Ok(data) => create_response(applet.session_mut(), cmd, data),
        Err(e) => {
            warn!("{}: INS {:02X} rejected: {}", applet.name(), cmd.ins, e);
            Response::error(e.status_word())
        }
    }
}

fn check_cla(applet: &dyn CardApplet, cmd: &APDU, interindustry_ok: bool) -> Result<()> {
    if cmd.cla == applet.cla() || (interindustry_ok && cmd.cla == 0x00) {
        Ok(())
    } else {
        Err(CardError::ClaNotSupported(cmd.cla))
    }
}

/// Return the next chunk of a chained response
fn get_response(session: &mut Session, cmd: &APDU) -> Result<Vec<u8>> {
    if !session.has_pending() {
        return Err(CardError::NoPendingResponse);
    }
    let le = cmd.le.map_or(DEFAULT_LE, |le| le as usize);
    Ok(session.take_pending(le))
}

/// Send `data`, chaining through GET RESPONSE if it exceeds Le
fn create_response(session: &mut Session, cmd: &APDU, mut data: Vec<u8>) -> Response {
    let max_response = cmd.le.map_or(DEFAULT_LE, |le| le as usize);

    if data.len() > max_response {
        let rest = data.split_off(max_response);
        session.set_pending(rest);
    }

    match session.pending_len() {
        0 => Response::success(data),
        remaining => {
            debug!("{} response bytes waiting for GET RESPONSE", remaining);
            // 6100 means "256 or more"
            let sw2 = if remaining > 0xFF { 0 } else { remaining as u8 };
            Response::more_data(data, sw2)
        }
    }
}

pub(crate) fn expect_params(cmd: &APDU, p1: u8, p2: u8) -> Result<()> {
    if cmd.p1 == p1 && cmd.p2 == p2 {
        Ok(())
    } else {
        Err(CardError::WrongP1P2)
    }
}

/// P1 of 00 or 01, P2 of 00; returns whether P1 was 01
pub(crate) fn expect_flag_param(cmd: &APDU) -> Result<bool> {
    match (cmd.p1, cmd.p2) {
        (0x00, 0x00) => Ok(false),
        (0x01, 0x00) => Ok(true),
        _ => Err(CardError::WrongP1P2),
    }
}

pub(crate) fn expect_no_data(cmd: &APDU) -> Result<()> {
    if cmd.data.is_empty() {
        Ok(())
    } else {
        Err(CardError::WrongLength)
    }
}

pub(crate) fn require_auth(session: &Session) -> Result<()> {
    if session.is_authenticated() {
        Ok(())
    } else {
        Err(CardError::AuthenticationRequired)
    }
}

/// VERIFY with no data: report status without spending a retry
pub(crate) fn pin_status_query(session: &Session, credential: &PinCredential) -> Result<Vec<u8>> {
    if session.is_authenticated() {
        return Ok(Vec::new());
    }
    PinManager::status(credential)
        .into_result()
        .map(|()| Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoApplet {
        session: Session,
    }

    impl CardApplet for EchoApplet {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn aid(&self) -> &'static [u8] {
            &[0xF0, 0x00]
        }

        fn cla(&self) -> u8 {
            0xB0
        }

        fn session_mut(&mut self) -> &mut Session {
            &mut self.session
        }

        fn handle(&mut self, cmd: &APDU) -> Result<Vec<u8>> {
            match cmd.ins {
                0x01 => Ok(vec![0x5A; 600]),
                0x02 => Err(CardError::InsufficientBalance),
                ins => Err(CardError::InsNotSupported(ins)),
            }
        }
    }

    fn echo() -> EchoApplet {
        EchoApplet {
            session: Session::new(),
        }
    }

    #[test]
    fn test_errors_become_status_words() {
        let mut applet = echo();
        let resp = process_apdu(&mut applet, &APDU::new(0xB0, 0x02, 0, 0));
        assert_eq!(resp.sw(), 0x6A8B);
        let resp = process_apdu(&mut applet, &APDU::new(0xB0, 0x7F, 0, 0));
        assert_eq!(resp.sw(), 0x6D00);
    }

    #[test]
    fn test_wrong_class() {
        let mut applet = echo();
        assert_eq!(process_apdu(&mut applet, &APDU::new(0x00, 0x01, 0, 0)).sw(), 0x6E00);
        assert_eq!(process_apdu(&mut applet, &APDU::new(0x80, 0x01, 0, 0)).sw(), 0x6E00);
    }

    #[test]
    fn test_response_chaining() {
        let mut applet = echo();

        let first = process_apdu(&mut applet, &APDU::new(0xB0, 0x01, 0, 0));
        assert_eq!(first.data.len(), 256);
        assert_eq!(first.sw(), 0x6100); // 344 remaining: more than 255

        let second = process_apdu(&mut applet, &APDU::new(0x00, ins::GET_RESPONSE, 0, 0).with_le(256));
        assert_eq!(second.data.len(), 256);
        assert_eq!(second.sw(), 0x6158); // 88 remaining

        let third = process_apdu(&mut applet, &APDU::new(0xB0, ins::GET_RESPONSE, 0, 0).with_le(88));
        assert_eq!(third.data.len(), 88);
        assert_eq!(third.sw(), 0x9000);

        let none = process_apdu(&mut applet, &APDU::new(0x00, ins::GET_RESPONSE, 0, 0));
        assert_eq!(none.sw(), 0x6985);
    }

    #[test]
    fn test_new_command_discards_pending() {
        let mut applet = echo();
        process_apdu(&mut applet, &APDU::new(0xB0, 0x01, 0, 0));
        process_apdu(&mut applet, &APDU::new(0xB0, 0x02, 0, 0));
        assert_eq!(
            process_apdu(&mut applet, &APDU::new(0x00, ins::GET_RESPONSE, 0, 0)).sw(),
            0x6985
        );
    }

    #[test]
    fn test_extended_le_avoids_chaining() {
        let mut applet = echo();
        let resp = process_apdu(&mut applet, &APDU::new(0xB0, 0x01, 0, 0).with_le(65536));
        assert_eq!(resp.data.len(), 600);
        assert_eq!(resp.sw(), 0x9000);
    }
}
