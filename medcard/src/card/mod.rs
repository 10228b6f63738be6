//! Card state, storage, and session

pub mod atr;
pub mod session;
pub mod state;
pub mod storage;

pub use atr::{build_atr, card_atr};
pub use session::Session;
pub use state::{
    AccountState, DataVaultBlob, IdentityState, KeyPairData, LedgerState, PersistentState,
    PinCredential, WrappedMasterKey,
};
pub use storage::{CardDataStore, StoreError};
