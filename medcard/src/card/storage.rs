//! Card state storage
//!
//! Each card keeps its whole state in one JSON file. Commands never write
//! fields in place: they mutate a staged copy and [`CardDataStore::commit`]
//! writes it to a temporary file that is then renamed over the old one, so a
//! failed write leaves the previous state intact.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;

use super::state::PersistentState;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("card state in {path} is unreadable: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize card state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Handles persistent storage of one card's state
pub struct CardDataStore<S: PersistentState> {
    storage_dir: PathBuf,
    state_file: PathBuf,
    state: S,
}

impl<S: PersistentState> CardDataStore<S> {
    /// Create a store rooted at `storage_dir`, holding default state until loaded
    pub fn new(storage_dir: PathBuf) -> Self {
        let state_file = storage_dir.join(S::FILE_NAME);
        Self {
            storage_dir,
            state_file,
            state: S::default(),
        }
    }

    /// Load card state from storage
    ///
    /// Returns true if state was loaded, false if no state file exists yet
    /// and the card starts blank. A file that exists but cannot be parsed is
    /// an error; the card refuses to start rather than silently resetting.
    pub fn load(&mut self) -> Result<bool, StoreError> {
        if !self.state_file.exists() {
            info!("No existing card state at {:?}, starting blank", self.state_file);
            self.state = S::default();
            return Ok(false);
        }

        let content = fs::read_to_string(&self.state_file).map_err(|source| StoreError::Io {
            path: self.state_file.clone(),
            source,
        })?;

        self.state = serde_json::from_str(&content).map_err(|source| {
            warn!("Failed to parse card state: {}", source);
            StoreError::Corrupt {
                path: self.state_file.clone(),
                source,
            }
        })?;
        info!("Loaded card state from {:?}", self.state_file);
        Ok(true)
    }

    /// Replace the persisted state with `staged`
    ///
    /// The in-memory state only changes once the new file is in place.
    pub fn commit(&mut self, staged: S) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&staged)?;

        self.ensure_storage_dir()?;
        let tmp_file = self.state_file.with_extension("json.tmp");
        Self::write_synced(&tmp_file, json.as_bytes()).map_err(|source| {
            warn!("Failed to write card state: {}", source);
            let _ = fs::remove_file(&tmp_file);
            StoreError::Io {
                path: tmp_file.clone(),
                source,
            }
        })?;

        fs::rename(&tmp_file, &self.state_file).map_err(|source| {
            warn!("Failed to replace card state: {}", source);
            StoreError::Io {
                path: self.state_file.clone(),
                source,
            }
        })?;

        debug!("Committed card state to {:?}", self.state_file);
        self.state = staged;
        Ok(())
    }

    /// A copy of the current state for a command to mutate
    pub fn stage(&self) -> S {
        self.state.clone()
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    fn ensure_storage_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.storage_dir).map_err(|source| StoreError::Io {
            path: self.storage_dir.clone(),
            source,
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&self.storage_dir, fs::Permissions::from_mode(0o700));
        }
        Ok(())
    }

    fn write_synced(path: &Path, contents: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(contents)?;
        file.sync_all()
    }
}
