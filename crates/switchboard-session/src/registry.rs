//! Shared registries for live call state.
//!
//! One entry per live call, created on setup, mutated by the owning
//! connection's task, removed on disconnect or after termination. The maps
//! themselves are shared with the watchdog timers, so every mutation goes
//! through a write lock; none of the lock holds span an `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use switchboard_types::{AnswerValue, SessionStatus, TerminationReason, Turn};

/// Mutable per-call questionnaire state.
#[derive(Debug)]
pub(crate) struct QuestionnaireSession {
    /// Next unanswered question ordinal; monotonically non-decreasing.
    pub question_index: usize,
    /// Question id → normalized answer.
    pub answers: BTreeMap<String, AnswerValue>,
    /// Consecutive invalid answers for the *current* question only.
    pub invalid_attempts: u32,
    pub status: SessionStatus,
    pub termination_reason: TerminationReason,
    /// Terminal latch: once set, no further mutation or termination side
    /// effect may occur.
    pub terminated: bool,
    /// At most one live timer; replacing it cancels the previous one.
    watchdog: Option<JoinHandle<()>>,
    /// Bumped on every arm/cancel; a firing timer must present the matching
    /// epoch to be allowed to finalize.
    watchdog_epoch: u64,
}

impl QuestionnaireSession {
    fn new() -> Self {
        Self {
            question_index: 0,
            answers: BTreeMap::new(),
            invalid_attempts: 0,
            status: SessionStatus::InProgress,
            termination_reason: TerminationReason::None,
            terminated: false,
            watchdog: None,
            watchdog_epoch: 0,
        }
    }

    pub(crate) fn abort_watchdog(&mut self) {
        if let Some(handle) = self.watchdog.take() {
            handle.abort();
        }
        self.watchdog_epoch += 1;
    }
}

/// Read-only copy of a session's observable state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub question_index: usize,
    pub answers: BTreeMap<String, AnswerValue>,
    pub invalid_attempts: u32,
    pub status: SessionStatus,
    pub termination_reason: TerminationReason,
    pub terminated: bool,
}

/// Process-wide map from call identifier to questionnaire session.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, QuestionnaireSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fresh session for a call, discarding any prior state for
    /// the same identifier (idempotent reset). A replaced session's watchdog
    /// is cancelled so the old timer cannot fire against the new session.
    pub async fn create(&self, call_sid: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(old) = sessions.get_mut(call_sid) {
            old.abort_watchdog();
            tracing::info!(call_sid = %call_sid, "replacing existing session on setup");
        }
        sessions.insert(call_sid.to_string(), QuestionnaireSession::new());
    }

    /// Removes a session, cancelling any pending watchdog. A disconnect must
    /// leave no dangling timer.
    pub async fn remove(&self, call_sid: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(mut session) = sessions.remove(call_sid) {
            session.abort_watchdog();
        }
    }

    pub async fn contains(&self, call_sid: &str) -> bool {
        self.sessions.read().await.contains_key(call_sid)
    }

    /// Returns a copy of the session's observable state.
    pub async fn snapshot(&self, call_sid: &str) -> Option<SessionSnapshot> {
        let sessions = self.sessions.read().await;
        sessions.get(call_sid).map(|s| SessionSnapshot {
            question_index: s.question_index,
            answers: s.answers.clone(),
            invalid_attempts: s.invalid_attempts,
            status: s.status,
            termination_reason: s.termination_reason,
            terminated: s.terminated,
        })
    }

    /// Runs `f` against the live session under the write lock.
    ///
    /// Returns `None` if the session is missing or already terminated:
    /// every mutating operation on an unknown or finished call is a guarded
    /// no-op for the caller to log.
    pub(crate) async fn with_live_session<T>(
        &self,
        call_sid: &str,
        f: impl FnOnce(&mut QuestionnaireSession) -> T,
    ) -> Option<T> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(call_sid)?;
        if session.terminated {
            return None;
        }
        Some(f(session))
    }

    /// Cancels any pending watchdog for the call and invalidates its epoch.
    pub(crate) async fn cancel_watchdog(&self, call_sid: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(call_sid) {
            session.abort_watchdog();
        }
    }

    /// Prepares to arm a new watchdog: cancels the previous timer and
    /// returns the epoch the new timer must present when it fires. Returns
    /// `None` for missing or terminated sessions.
    pub(crate) async fn rearm_watchdog(&self, call_sid: &str) -> Option<u64> {
        self.with_live_session(call_sid, |session| {
            session.abort_watchdog();
            session.watchdog_epoch
        })
        .await
    }

    /// Attaches a spawned timer to the session if the epoch is still
    /// current; otherwise aborts it immediately.
    pub(crate) async fn attach_watchdog(&self, call_sid: &str, epoch: u64, handle: JoinHandle<()>) {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(call_sid) {
            Some(session) if !session.terminated && session.watchdog_epoch == epoch => {
                session.watchdog = Some(handle);
            }
            _ => handle.abort(),
        }
    }

    /// Atomically sets the terminal latch.
    ///
    /// Returns the answers to persist if the latch was newly set, `None` if
    /// the session is missing, already terminated, or `only_if_epoch` no
    /// longer matches (a stale watchdog firing).
    pub(crate) async fn begin_finalize(
        &self,
        call_sid: &str,
        status: SessionStatus,
        reason: TerminationReason,
        only_if_epoch: Option<u64>,
    ) -> Option<BTreeMap<String, AnswerValue>> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(call_sid)?;
        if session.terminated {
            return None;
        }
        if let Some(epoch) = only_if_epoch {
            if session.watchdog_epoch != epoch {
                return None;
            }
        }
        session.terminated = true;
        session.status = status;
        session.termination_reason = reason;
        session.abort_watchdog();
        Some(session.answers.clone())
    }
}

/// Process-wide map from call identifier to free-form conversation.
#[derive(Clone, Default)]
pub struct ConversationRegistry {
    conversations: Arc<RwLock<HashMap<String, Vec<Turn>>>>,
}

impl ConversationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the conversation to a single system turn.
    pub async fn create(&self, call_sid: &str, system_prompt: &str) {
        let mut conversations = self.conversations.write().await;
        conversations.insert(call_sid.to_string(), vec![Turn::system(system_prompt)]);
    }

    pub async fn remove(&self, call_sid: &str) {
        self.conversations.write().await.remove(call_sid);
    }

    pub async fn turns(&self, call_sid: &str) -> Option<Vec<Turn>> {
        self.conversations.read().await.get(call_sid).cloned()
    }

    /// Runs `f` against the conversation under the write lock, creating it
    /// with the system turn first if missing.
    pub(crate) async fn with_conversation<T>(
        &self,
        call_sid: &str,
        system_prompt: &str,
        f: impl FnOnce(&mut Vec<Turn>) -> T,
    ) -> T {
        let mut conversations = self.conversations.write().await;
        let turns = conversations
            .entry(call_sid.to_string())
            .or_insert_with(|| vec![Turn::system(system_prompt)]);
        f(turns)
    }

    /// Runs `f` against an existing conversation only.
    pub(crate) async fn with_existing<T>(
        &self,
        call_sid: &str,
        f: impl FnOnce(&mut Vec<Turn>) -> T,
    ) -> Option<T> {
        let mut conversations = self.conversations.write().await;
        conversations.get_mut(call_sid).map(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_is_an_idempotent_reset() {
        let registry = SessionRegistry::new();
        registry.create("CA1").await;
        registry
            .with_live_session("CA1", |s| {
                s.question_index = 3;
                s.invalid_attempts = 2;
            })
            .await
            .expect("session should be live");

        registry.create("CA1").await;
        let snapshot = registry.snapshot("CA1").await.expect("session exists");
        assert_eq!(snapshot.question_index, 0);
        assert_eq!(snapshot.invalid_attempts, 0);
        assert!(!snapshot.terminated);
    }

    #[tokio::test]
    async fn begin_finalize_latches_exactly_once() {
        let registry = SessionRegistry::new();
        registry.create("CA1").await;

        let first = registry
            .begin_finalize(
                "CA1",
                SessionStatus::Completed,
                TerminationReason::Completed,
                None,
            )
            .await;
        assert!(first.is_some());

        let second = registry
            .begin_finalize(
                "CA1",
                SessionStatus::Terminated,
                TerminationReason::Silence,
                None,
            )
            .await;
        assert!(second.is_none(), "latch must absorb the second finalize");

        let snapshot = registry.snapshot("CA1").await.expect("session exists");
        assert_eq!(snapshot.status, SessionStatus::Completed);
        assert_eq!(snapshot.termination_reason, TerminationReason::Completed);
        assert!(snapshot.terminated);
    }

    #[tokio::test]
    async fn stale_epoch_cannot_finalize() {
        let registry = SessionRegistry::new();
        registry.create("CA1").await;

        let epoch = registry.rearm_watchdog("CA1").await.expect("live session");
        // A prompt arrives: the watchdog is cancelled and the epoch moves on.
        registry.cancel_watchdog("CA1").await;

        let result = registry
            .begin_finalize(
                "CA1",
                SessionStatus::Terminated,
                TerminationReason::Silence,
                Some(epoch),
            )
            .await;
        assert!(result.is_none(), "stale watchdog must not finalize");
        let snapshot = registry.snapshot("CA1").await.expect("session exists");
        assert!(!snapshot.terminated);
    }

    #[tokio::test]
    async fn mutations_on_unknown_calls_are_noops() {
        let registry = SessionRegistry::new();
        assert!(registry.with_live_session("CA9", |_| ()).await.is_none());
        assert!(registry.rearm_watchdog("CA9").await.is_none());
        registry.cancel_watchdog("CA9").await;
        registry.remove("CA9").await;
    }

    #[tokio::test]
    async fn conversation_starts_with_the_system_turn() {
        let registry = ConversationRegistry::new();
        registry.create("CA1", "be helpful").await;
        let turns = registry.turns("CA1").await.expect("conversation exists");
        assert_eq!(turns, vec![Turn::system("be helpful")]);

        registry
            .with_conversation("CA1", "be helpful", |turns| {
                turns.push(Turn::user("hi"));
            })
            .await;
        let turns = registry.turns("CA1").await.expect("conversation exists");
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], Turn::system("be helpful"));
    }
}
