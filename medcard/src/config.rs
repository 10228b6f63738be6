//! Card configuration
//!
//! Operational parameters that are fixed for a deployment: where state files
//! live, the KDF iteration count, the RSA modulus size, and retry limits.

use std::path::PathBuf;

use thiserror::Error;

use crate::card::state::{AccountState, IdentityState, MAX_MODULUS_LEN};
use crate::crypto::KDF_ITERATIONS;

pub const STORAGE_DIR_ENV: &str = "MEDCARD_STORAGE_DIR";
pub const DEFAULT_RSA_BITS: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("KDF iteration count must be at least 1")]
    KdfIterations,

    #[error("RSA modulus of {0} bits is outside 512..={max}", max = MAX_MODULUS_LEN * 8)]
    RsaBits(usize),

    #[error("retry limit {0} is outside 1..=15")]
    RetryLimit(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardConfig {
    pub storage_dir: PathBuf,
    pub kdf_iterations: u32,
    pub rsa_bits: usize,
    pub admin_pin_retries: u8,
    pub holder_pin_retries: u8,
    pub admin_reset_retries: u8,
}

impl CardConfig {
    /// Storage directory from the environment, else `~/.medcard`
    pub fn default_storage_dir() -> PathBuf {
        if let Ok(path) = std::env::var(STORAGE_DIR_ENV) {
            return PathBuf::from(path);
        }
        if let Some(home) = dirs::home_dir() {
            return home.join(".medcard");
        }
        PathBuf::from("/var/lib/medcard")
    }

    pub fn with_storage_dir(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kdf_iterations == 0 {
            return Err(ConfigError::KdfIterations);
        }
        if !(512..=MAX_MODULUS_LEN * 8).contains(&self.rsa_bits) {
            return Err(ConfigError::RsaBits(self.rsa_bits));
        }
        for limit in [
            self.admin_pin_retries,
            self.holder_pin_retries,
            self.admin_reset_retries,
        ] {
            if !(1..=15).contains(&limit) {
                return Err(ConfigError::RetryLimit(limit));
            }
        }
        Ok(())
    }
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            storage_dir: Self::default_storage_dir(),
            kdf_iterations: KDF_ITERATIONS,
            rsa_bits: DEFAULT_RSA_BITS,
            admin_pin_retries: IdentityState::MAX_PIN_RETRIES,
            holder_pin_retries: AccountState::MAX_HOLDER_RETRIES,
            admin_reset_retries: AccountState::MAX_ADMIN_RESET_RETRIES,
        }
    }
}
