//! Per-user sessions and the store that serializes access to them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::state::{SessionState, SurveyState};
use super::steps::StepId;

/// Answers collected so far, keyed by step. Keys are never overwritten.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Answers(BTreeMap<StepId, String>);

impl Answers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an answer. Returns `false` (and changes nothing) when the step
    /// already has one.
    pub fn record(&mut self, step: StepId, text: impl Into<String>) -> bool {
        if self.0.contains_key(&step) {
            return false;
        }
        self.0.insert(step, text.into());
        true
    }

    pub fn get(&self, step: StepId) -> Option<&str> {
        self.0.get(&step).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Answers in survey order.
    pub fn iter(&self) -> impl Iterator<Item = (StepId, &str)> {
        self.0.iter().map(|(step, text)| (*step, text.as_str()))
    }
}

/// Survey progress of one remote user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub state: SessionState,
    pub answers: Answers,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            state: SessionState::default(),
            answers: Answers::new(),
        }
    }

    pub fn survey_state(&self) -> SurveyState {
        self.state.survey_state()
    }
}

/// Exclusive access to one session for the duration of one event.
///
/// Changes become visible only through [`save`](Self::save); dropping the
/// handle without saving leaves the stored session untouched.
pub struct SessionHandle {
    guard: OwnedMutexGuard<Session>,
}

impl SessionHandle {
    pub fn session(&self) -> &Session {
        &self.guard
    }

    /// Commit the updated session and release the user's lock.
    pub fn save(mut self, session: Session) {
        debug_assert_eq!(self.guard.user_id, session.user_id);
        *self.guard = session;
    }
}

/// Map of user id to session. Each session has its own lock, so users never
/// wait on each other; events for one user queue on that user's lock in
/// arrival order. Sessions are created lazily and never evicted.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, user_id: &str) -> Arc<Mutex<Session>> {
        if let Some(slot) = self.sessions.read().await.get(user_id) {
            return Arc::clone(slot);
        }
        let mut sessions = self.sessions.write().await;
        let slot = sessions.entry(user_id.to_string()).or_insert_with(|| {
            tracing::debug!(user_id = %user_id, "Created session");
            Arc::new(Mutex::new(Session::new(user_id)))
        });
        Arc::clone(slot)
    }

    /// Lock the user's session, creating an idle one on first contact.
    /// Waits while another event for the same user is being processed.
    pub async fn get_or_create(&self, user_id: &str) -> SessionHandle {
        let slot = self.slot(user_id).await;
        SessionHandle {
            guard: slot.lock_owned().await,
        }
    }

    /// Copy of a session, if the user has been seen.
    pub async fn snapshot(&self, user_id: &str) -> Option<Session> {
        let slot = self.sessions.read().await.get(user_id).cloned()?;
        let session = slot.lock().await;
        Some(session.clone())
    }

    /// Number of users seen.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
