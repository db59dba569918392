//! Lilly core: the client-side domain for the Lilly personal assistant.
//!
//! - [`archive`] — the local message archive (Sled): append-only chat log with
//!   session-scoped recent retrieval, substring search, export/import, purge.
//! - [`prefs`] / [`memos`] — persona settings, private mode, and free-text memos,
//!   persisted locally and loaded once at startup.
//! - [`persona`] — the deterministic persona → system-prompt mapping shared with
//!   the gateway.
//! - [`controller`] — turn-taking for a chat session (Idle → Sending → Idle with
//!   double-submit suppression) over an [`controller::AssistantBackend`].
//! - [`bridge`] — the OpenAI-compatible completion client used by the gateway.
//! - [`client`] — the reqwest client the console uses to talk to the gateway.
//!
//! The remote server is stateless with respect to everything in this crate:
//! it receives only the current message text, persona, and session name per
//! request and retains nothing.

pub mod archive;
pub mod bridge;
pub mod client;
pub mod controller;
pub mod error;
pub mod memos;
pub mod persona;
pub mod prefs;

pub use archive::{Append, Message, MessageArchive, NewMessage, Sender, RECENT_SCAN_CAP};
pub use bridge::{CompletionBridge, UpstreamError, DEFAULT_MODEL};
pub use client::GatewayClient;
pub use controller::{AssistantBackend, BackendError, ChatLine, ChatSessionController, TurnOutcome, REQUEST_TIMEOUT};
pub use error::ArchiveError;
pub use memos::{Memo, MemoStore};
pub use persona::{system_prompt, Lang, Persona, PersonaWire, Style, Tone};
pub use prefs::{PreferenceStore, Preferences, DEFAULT_SESSION};

/// Unix timestamp in milliseconds. Storage and wire records use epoch millis.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
