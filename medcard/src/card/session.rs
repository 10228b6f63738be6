//! Transient session state
//!
//! Lives only in volatile memory: the authentication flag, the unwrapped
//! master key cached after a successful holder PIN, and response bytes
//! waiting for GET RESPONSE. All of it is wiped on selection, deselection,
//! power loss, reset, and lock.

use zeroize::Zeroizing;

use super::state::MASTER_KEY_LEN;

#[derive(Default)]
pub struct Session {
    authenticated: bool,
    master_key: Option<Zeroizing<[u8; MASTER_KEY_LEN]>>,
    pending: Zeroizing<Vec<u8>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the PIN holder as verified, optionally caching the master key
    pub fn authenticate(&mut self, master_key: Option<Zeroizing<[u8; MASTER_KEY_LEN]>>) {
        self.authenticated = true;
        self.master_key = master_key;
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn master_key(&self) -> Option<&[u8; MASTER_KEY_LEN]> {
        self.master_key.as_deref()
    }

    /// Queue response bytes for GET RESPONSE, replacing anything pending
    pub fn set_pending(&mut self, data: Vec<u8>) {
        self.pending = Zeroizing::new(data);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Remove up to `max` bytes from the front of the pending buffer
    pub fn take_pending(&mut self, max: usize) -> Vec<u8> {
        let n = max.min(self.pending.len());
        self.pending.drain(..n).collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop queued response bytes
    pub fn discard_pending(&mut self) {
        self.pending = Zeroizing::new(Vec::new());
    }

    /// Forget everything (selection, power cycle, reset, lock)
    pub fn clear(&mut self) {
        self.authenticated = false;
        self.master_key = None;
        self.discard_pending();
    }
}
