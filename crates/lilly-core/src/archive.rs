//! The message archive: a Sled-backed append-only chat log.
//!
//! Two trees back the archive: `messages` (big-endian message id → JSON record)
//! and `session_ts` (composite `{session}\0{ts}{id}` index → id) so per-session
//! recent-message retrieval walks only matching records instead of filtering
//! the whole log post-hoc.
//!
//! Records are immutable once stored; the only bulk mutations are [`MessageArchive::purge`]
//! and [`MessageArchive::import_all`]. While private mode is active, `append`
//! reports success without writing.

use crate::error::ArchiveError;
use crate::now_ms;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

const MESSAGES_TREE: &str = "messages";
const SESSION_INDEX_TREE: &str = "session_ts";

/// Hard cap on index entries inspected per `recent` call. Tunable.
pub const RECENT_SCAN_CAP: usize = 500;

/// Who wrote a message. The wire/storage form is lowercase; `"lilly"` is
/// accepted on import for archives exported by the original web client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    #[default]
    #[serde(alias = "lilly")]
    Assistant,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        }
    }
}

/// A stored chat message. The id is assigned by the store and is unique and
/// monotonically increasing, so id order is insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub session: String,
    pub sender: Sender,
    pub text: String,
    /// Epoch milliseconds.
    pub ts: i64,
}

/// A message to append. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session: String,
    pub sender: Sender,
    pub text: String,
    pub ts: i64,
}

impl NewMessage {
    pub fn now(session: impl Into<String>, sender: Sender, text: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            sender,
            text: text.into(),
            ts: now_ms(),
        }
    }
}

/// Outcome of an append: either a stored record id, or a deliberate skip
/// because private mode is active (reported as success, nothing written).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Append {
    Stored(u64),
    Skipped,
}

/// Portable record for export/import: ids are never part of the contract and
/// are always reassigned on import. Missing fields get defaults (session →
/// the default session, sender → assistant, ts → now).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PortableMessage {
    #[serde(default = "default_session")]
    session: String,
    #[serde(default)]
    sender: Sender,
    #[serde(default)]
    text: String,
    #[serde(default = "crate::now_ms")]
    ts: i64,
}

fn default_session() -> String {
    crate::prefs::DEFAULT_SESSION.to_string()
}

/// The local durable message log.
pub struct MessageArchive {
    db: sled::Db,
    messages: sled::Tree,
    session_index: sled::Tree,
    /// Private-mode gate: while set, `append` is a no-op that reports success.
    /// Mirrored from [`crate::prefs::Preferences`] by the owning component.
    private_mode: AtomicBool,
}

/// Composite index key: `{session}\0{ts:020}{id:020}`. Zero-padded decimal so
/// lexicographic tree order is (session, ts, id) order.
fn index_key(session: &str, ts: i64, id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(session.len() + 42);
    key.extend_from_slice(session.as_bytes());
    key.push(0);
    key.extend_from_slice(format!("{:020}{:020}", ts.max(0) as u64, id).as_bytes());
    key
}

fn session_prefix(session: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(session.len() + 1);
    prefix.extend_from_slice(session.as_bytes());
    prefix.push(0);
    prefix
}

impl MessageArchive {
    /// Opens or creates the archive at the given path.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        let db = sled::open(path)?;
        let messages = db.open_tree(MESSAGES_TREE)?;
        let session_index = db.open_tree(SESSION_INDEX_TREE)?;
        Ok(Self {
            db,
            messages,
            session_index,
            private_mode: AtomicBool::new(false),
        })
    }

    /// Sets the private-mode gate. While on, `append` skips all writes.
    pub fn set_private_mode(&self, on: bool) {
        self.private_mode.store(on, Ordering::Release);
    }

    pub fn is_private(&self) -> bool {
        self.private_mode.load(Ordering::Acquire)
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Inserts a new immutable record, or skips it (still success) while
    /// private mode is active.
    pub fn append(&self, msg: &NewMessage) -> Result<Append, ArchiveError> {
        if self.is_private() {
            tracing::debug!(
                target: "lilly::archive",
                session = %msg.session,
                "private mode active; message not persisted"
            );
            return Ok(Append::Skipped);
        }
        let id = self.db.generate_id()?;
        let record = Message {
            id,
            session: msg.session.clone(),
            sender: msg.sender,
            text: msg.text.clone(),
            ts: msg.ts,
        };
        self.messages
            .insert(id.to_be_bytes(), serde_json::to_vec(&record)?)?;
        self.session_index
            .insert(index_key(&msg.session, msg.ts, id), id.to_be_bytes().to_vec())?;
        tracing::debug!(
            target: "lilly::archive",
            id,
            session = %msg.session,
            sender = msg.sender.as_str(),
            bytes = msg.text.len(),
            "message archived"
        );
        Ok(Append::Stored(id))
    }

    fn get_by_id_bytes(&self, id_bytes: &[u8]) -> Result<Option<Message>, ArchiveError> {
        match self.messages.get(id_bytes)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Returns at most `limit` most-recent messages for `session`, oldest →
    /// newest. Walks the composite index newest-backward and stops after
    /// `limit` matches or [`RECENT_SCAN_CAP`] inspected entries.
    pub fn recent(&self, session: &str, limit: usize) -> Result<Vec<Message>, ArchiveError> {
        let mut found = Vec::new();
        let mut inspected = 0usize;
        for item in self.session_index.scan_prefix(session_prefix(session)).rev() {
            if found.len() >= limit || inspected >= RECENT_SCAN_CAP {
                break;
            }
            inspected += 1;
            let (_, id_bytes) = item?;
            if let Some(record) = self.get_by_id_bytes(&id_bytes)? {
                found.push(record);
            }
        }
        found.reverse();
        Ok(found)
    }

    /// Case-insensitive substring search over message text across all
    /// sessions, newest-first by timestamp, at most `max` results. An empty
    /// or whitespace-only query matches nothing.
    ///
    /// Insertion order and timestamp order can disagree after an import of
    /// older records, so matches are gathered first and ordered by (ts, id)
    /// descending before the cap applies.
    pub fn search(&self, query: &str, max: usize) -> Result<Vec<Message>, ArchiveError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let mut results = Vec::new();
        for item in self.messages.iter() {
            let (_, bytes) = item?;
            let record: Message = serde_json::from_slice(&bytes)?;
            if record.text.to_lowercase().contains(&needle) {
                results.push(record);
            }
        }
        results.sort_by(|a, b| (b.ts, b.id).cmp(&(a.ts, a.id)));
        results.truncate(max);
        Ok(results)
    }

    /// Serializes every record, oldest → newest, to a portable JSON array of
    /// `{session, sender, text, ts}` objects.
    pub fn export_all(&self) -> Result<Vec<u8>, ArchiveError> {
        let mut records = Vec::new();
        for item in self.messages.iter() {
            let (_, bytes) = item?;
            let record: Message = serde_json::from_slice(&bytes)?;
            records.push(PortableMessage {
                session: record.session,
                sender: record.sender,
                text: record.text,
                ts: record.ts,
            });
        }
        Ok(serde_json::to_vec_pretty(&records)?)
    }

    /// Parses a portable JSON array and appends each record as new with a
    /// fresh id. Runs regardless of private mode (import is an explicit user
    /// action, not a chat turn). Each insert commits independently, so a
    /// storage failure mid-way may leave a partial set; a parse failure
    /// imports nothing. Returns the number of records inserted.
    pub fn import_all(&self, bytes: &[u8]) -> Result<usize, ArchiveError> {
        let records: Vec<PortableMessage> =
            serde_json::from_slice(bytes).map_err(|_| ArchiveError::ImportFormat)?;
        let mut inserted = 0usize;
        for portable in records {
            let id = self.db.generate_id()?;
            let record = Message {
                id,
                session: portable.session,
                sender: portable.sender,
                text: portable.text,
                ts: portable.ts,
            };
            self.messages
                .insert(id.to_be_bytes(), serde_json::to_vec(&record)?)?;
            self.session_index
                .insert(index_key(&record.session, record.ts, id), id.to_be_bytes().to_vec())?;
            inserted += 1;
        }
        tracing::info!(target: "lilly::archive", inserted, "archive import complete");
        Ok(inserted)
    }

    /// Deletes all records unconditionally. Calling it on an empty archive is
    /// not an error.
    pub fn purge(&self) -> Result<(), ArchiveError> {
        self.messages.clear()?;
        self.session_index.clear()?;
        tracing::info!(target: "lilly::archive", "archive purged");
        Ok(())
    }
}
