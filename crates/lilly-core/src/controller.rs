//! One chat turn end to end: archive the user line, call the backend with a
//! timeout, archive whatever comes back (reply or apology), return it.
//!
//! A single in-flight flag serializes turns. Every failure path still produces
//! exactly one archived assistant line so the transcript always reads as
//! alternating user/assistant pairs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::archive::{MessageArchive, NewMessage, Sender};
use crate::error::ArchiveError;
use crate::persona::Persona;
use crate::prefs::Preferences;

/// How long a turn may wait for the backend before giving up with an apology.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(25);

const TIMEOUT_APOLOGY: &str = "مامي، الخادم بطيء الآن ولم يصلني رد. أعيدي المحاولة بعد قليل.";

/// Failure reaching or understanding the backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Could not reach the backend at all.
    #[error("backend unreachable: {0}")]
    Network(String),
    /// The backend answered with a structured error message.
    #[error("backend error: {message}")]
    Server { message: String },
    /// The backend answered with something we could not interpret.
    #[error("unusable backend reply (HTTP {status})")]
    BadReply { status: u16 },
}

impl BackendError {
    /// The Arabic line to show (and archive) for this failure.
    pub fn user_message(&self) -> String {
        match self {
            BackendError::Network(_) => "مامي، لا يوجد اتصال بالخادم الآن.".to_string(),
            BackendError::Server { message } => format!("مامي، حدث خطأ من الخادم: {}", message),
            BackendError::BadReply { status } => {
                format!("مامي، لم أفهم رد الخادم. (HTTP {})", status)
            }
        }
    }
}

/// Whatever produces assistant replies: the real gateway client in the
/// console, a canned backend in tests.
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    async fn complete(
        &self,
        message: &str,
        persona: &Persona,
        session: &str,
    ) -> Result<String, BackendError>;
}

/// One rendered line of the transcript.
#[derive(Debug, Clone)]
pub struct ChatLine {
    pub sender: Sender,
    pub text: String,
    pub ts: i64,
}

/// Result of submitting one user line.
#[derive(Debug)]
pub enum TurnOutcome {
    /// The assistant line to render (already archived).
    Reply(ChatLine),
    /// A previous turn is still in flight; nothing was sent or archived.
    Busy,
    /// The input was blank after trimming; nothing was sent or archived.
    Empty,
}

/// Drives chat turns against an [`AssistantBackend`], keeping the archive and
/// the in-flight flag consistent.
pub struct ChatSessionController {
    archive: Arc<MessageArchive>,
    prefs: Arc<RwLock<Preferences>>,
    backend: Arc<dyn AssistantBackend>,
    in_flight: AtomicBool,
}

impl ChatSessionController {
    pub fn new(
        archive: Arc<MessageArchive>,
        prefs: Arc<RwLock<Preferences>>,
        backend: Arc<dyn AssistantBackend>,
    ) -> Self {
        Self {
            archive,
            prefs,
            backend,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn archive(&self) -> &Arc<MessageArchive> {
        &self.archive
    }

    pub fn prefs(&self) -> &Arc<RwLock<Preferences>> {
        &self.prefs
    }

    /// Submit one user line. Archives it, asks the backend, archives the
    /// assistant line, and returns it. On any backend failure or timeout the
    /// assistant line is the matching apology instead of a reply.
    pub async fn submit(&self, input: &str) -> Result<TurnOutcome, ArchiveError> {
        let text = input.trim();
        if text.is_empty() {
            return Ok(TurnOutcome::Empty);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(target: "lilly::controller", "turn rejected, previous turn still in flight");
            return Ok(TurnOutcome::Busy);
        }

        let (persona, session) = {
            let prefs = self.prefs.read().await;
            (prefs.persona, prefs.session.clone())
        };

        if let Err(err) = self
            .archive
            .append(&NewMessage::now(session.as_str(), Sender::User, text))
        {
            self.in_flight.store(false, Ordering::SeqCst);
            return Err(err);
        }

        let reply_text = match tokio::time::timeout(
            REQUEST_TIMEOUT,
            self.backend.complete(text, &persona, &session),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => {
                warn!(target: "lilly::controller", error = %err, "backend turn failed");
                err.user_message()
            }
            Err(_) => {
                warn!(target: "lilly::controller", "backend turn timed out");
                TIMEOUT_APOLOGY.to_string()
            }
        };

        let line = NewMessage::now(session.as_str(), Sender::Assistant, reply_text.as_str());
        let archived = self.archive.append(&line);
        self.in_flight.store(false, Ordering::SeqCst);
        archived?;

        Ok(TurnOutcome::Reply(ChatLine {
            sender: Sender::Assistant,
            text: reply_text,
            ts: line.ts,
        }))
    }
}
