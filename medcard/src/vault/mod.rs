//! Master-key vault and data vault

pub mod data_vault;
pub mod key_vault;

pub use data_vault::DataVault;
pub use key_vault::{KeySlot, KeyVault};
