//! Durable user preferences: active persona, private mode, current session.
//!
//! A single record keyed under `prefs/current`; missing or corrupt data loads
//! as the defaults so a wiped or hand-edited store never blocks startup.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ArchiveError;
use crate::memos::MemoStore;
use crate::persona::Persona;

/// Session every message belongs to unless the user switches away.
pub const DEFAULT_SESSION: &str = "عام";

const PREFS_KEY: &str = "prefs/current";

fn default_session() -> String {
    DEFAULT_SESSION.to_string()
}

/// The persisted preference record. Every field has a default so partial
/// records from older stores still load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub persona: Persona,
    #[serde(default)]
    pub private_mode: bool,
    #[serde(default = "default_session")]
    pub session: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            persona: Persona::default(),
            private_mode: false,
            session: default_session(),
        }
    }
}

/// Sled-backed store for the preference record. Shares its database with the
/// memo store so one file on disk carries both.
pub struct PreferenceStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl PreferenceStore {
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let db = sled::open(path)?;
        let tree = db.open_tree("prefs")?;
        Ok(Self { db, tree })
    }

    /// Loads the current record, falling back to defaults when the key is
    /// absent or the stored bytes no longer parse.
    pub fn load(&self) -> Result<Preferences, ArchiveError> {
        match self.tree.get(PREFS_KEY)? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(prefs) => Ok(prefs),
                Err(err) => {
                    warn!(target: "lilly::prefs", error = %err, "stored preferences unreadable, using defaults");
                    Ok(Preferences::default())
                }
            },
            None => Ok(Preferences::default()),
        }
    }

    pub fn save(&self, prefs: &Preferences) -> Result<(), ArchiveError> {
        let bytes = serde_json::to_vec(prefs)?;
        self.tree.insert(PREFS_KEY, bytes)?;
        self.tree.flush()?;
        Ok(())
    }

    /// Opens the memo store backed by the same database file.
    pub fn memos(&self) -> Result<Arc<MemoStore>, ArchiveError> {
        Ok(Arc::new(MemoStore::with_db(self.db.clone())?))
    }
}
