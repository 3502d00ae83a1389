//! Identity store: the local member's profile, held in memory and mirrored
//! to durable key-value storage.
//!
//! The store is an owned context object. Open it once at startup (which reads
//! the durable copy) and pass it to whatever needs the active profile; `save`
//! and `clear` are the only writers.

mod kv;

pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};

use thiserror::Error;

use crate::models::{Profile, ProfileError};

/// Storage key holding the serialized profile.
pub const PROFILE_KEY: &str = "chore-sync.profile";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored data is unreadable: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error("storage lock poisoned")]
    Poisoned,
}

pub struct IdentityStore<K> {
    storage: K,
    current: Option<Profile>,
}

impl<K: KeyValueStore> IdentityStore<K> {
    /// Open the store and restore the persisted profile, if any.
    pub fn open(storage: K) -> Result<Self, IdentityError> {
        let mut store = Self {
            storage,
            current: None,
        };
        store.load()?;
        Ok(store)
    }

    /// Re-read the durable copy and hold it as the current profile.
    ///
    /// An unreadable or invalid stored profile is treated as absent.
    pub fn load(&mut self) -> Result<Option<Profile>, IdentityError> {
        let profile = match self.storage.get(PROFILE_KEY)? {
            None => None,
            Some(raw) => match serde_json::from_str::<Profile>(&raw) {
                Ok(profile) if profile.validate().is_ok() => Some(profile),
                Ok(_) => {
                    tracing::warn!("Stored profile is incomplete, ignoring it");
                    None
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Stored profile is unreadable, ignoring it");
                    None
                }
            },
        };

        self.current = profile.clone();
        Ok(profile)
    }

    /// Persist `profile` and make it the current one.
    pub fn save(&mut self, profile: Profile) -> Result<(), IdentityError> {
        profile.validate()?;
        let raw = serde_json::to_string(&profile)?;
        self.storage.set(PROFILE_KEY, &raw)?;

        tracing::info!(
            family_code = %profile.family_code,
            role = %profile.role,
            "Saved profile"
        );
        self.current = Some(profile);
        Ok(())
    }

    /// Forget the profile on this device ("switch" member).
    pub fn clear(&mut self) -> Result<(), IdentityError> {
        self.storage.remove(PROFILE_KEY)?;
        self.current = None;
        tracing::info!("Cleared profile");
        Ok(())
    }

    pub fn current(&self) -> Option<&Profile> {
        self.current.as_ref()
    }
}
