//! Short free-text memos, stored newest-last in their own sled tree.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ArchiveError;
use crate::now_ms;

/// One memo line with its capture time (epoch millis).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memo {
    pub text: String,
    pub ts: i64,
}

/// Append-only memo list. Keys sort by timestamp then insertion id so
/// iteration order is capture order.
pub struct MemoStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl MemoStore {
    pub fn with_db(db: sled::Db) -> Result<Self, ArchiveError> {
        let tree = db.open_tree("memos")?;
        Ok(Self { db, tree })
    }

    pub fn add(&self, text: &str) -> Result<Memo, ArchiveError> {
        let memo = Memo {
            text: text.trim().to_string(),
            ts: now_ms(),
        };
        let id = self.db.generate_id()?;
        let key = format!("{:020}_{:020}", memo.ts.max(0) as u64, id);
        self.tree.insert(key.as_bytes(), serde_json::to_vec(&memo)?)?;
        Ok(memo)
    }

    /// All memos, oldest first.
    pub fn list(&self) -> Result<Vec<Memo>, ArchiveError> {
        let mut memos = Vec::new();
        for entry in self.tree.iter() {
            let (_, bytes) = entry?;
            memos.push(serde_json::from_slice(&bytes)?);
        }
        Ok(memos)
    }

    pub fn clear(&self) -> Result<(), ArchiveError> {
        self.tree.clear()?;
        info!(target: "lilly::memos", "memo list cleared");
        Ok(())
    }
}
