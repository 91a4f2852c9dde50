//! Session Status Registry
//!
//! Records the lifecycle of every session a service has started or joined,
//! so callers can learn how a fire-and-forget dispatch or a detached engine
//! join ended. Records are kept in memory and expire after a TTL.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;
use tsm_core::{KeyId, OperationKind, PresignatureId, SessionId};

/// Registry error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Session already exists: {0}")]
    AlreadyExists(String),
    #[error("Invalid transition for session {session_id}: {from} -> {to}")]
    InvalidTransition {
        session_id: String,
        from: SessionState,
        to: SessionState,
    },
    #[error("Timed out waiting for session {0}")]
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for tsm_core::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => tsm_core::Error::SessionNotFound(id),
            other => tsm_core::Error::Internal(other.to_string()),
        }
    }
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// Id minted, nothing sent yet
    Created,
    /// Gateway handed the join requests to its peers
    Dispatched,
    /// Node spawned its engine join
    Joining,
    Completed,
    Failed,
    /// Partial signatures gathered for a presignature
    SharesCollected,
    Finalized,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Dispatched => "dispatched",
            SessionState::Joining => "joining",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
            SessionState::SharesCollected => "sharesCollected",
            SessionState::Finalized => "finalized",
        }
    }

    /// No further progress is expected without a new request
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Finalized
        )
    }

    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, next),
            (Created, Dispatched)
                | (Created, Joining)
                | (Created, Failed)
                | (Dispatched, Completed)
                | (Dispatched, Failed)
                | (Joining, Completed)
                | (Joining, Failed)
                | (Completed, SharesCollected)
                | (SharesCollected, Finalized)
                | (SharesCollected, Failed)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one dispatch or one engine join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantOutcome {
    /// Peer name or player index the outcome belongs to
    pub participant: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl ParticipantOutcome {
    pub fn success(participant: impl Into<String>) -> Self {
        Self {
            participant: participant.into(),
            success: true,
            detail: None,
            at: Utc::now(),
        }
    }

    pub fn failure(participant: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            participant: participant.into(),
            success: false,
            detail: Some(detail.into()),
            at: Utc::now(),
        }
    }
}

/// Stored session record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub kind: OperationKind,
    pub state: SessionState,
    /// Participants that accepted the join but have not reported back yet
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acknowledged: Vec<String>,
    pub outcomes: Vec<ParticipantOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<KeyId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub presignature_ids: Vec<PresignatureId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Change notification published on every update
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub session_id: SessionId,
    pub state: SessionState,
    pub outcome: Option<ParticipantOutcome>,
}

/// Session registry
#[derive(Clone)]
pub struct SessionStore {
    /// Records indexed by session id
    sessions: Arc<DashMap<SessionId, SessionRecord>>,
    /// TTL in seconds
    ttl_seconds: i64,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    /// Create a new registry
    pub fn new(ttl_seconds: i64) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl_seconds,
            events,
        }
    }

    /// Register a freshly minted or joined session
    pub fn create(&self, session_id: SessionId, kind: OperationKind) -> Result<SessionRecord> {
        let now = Utc::now();
        let record = SessionRecord {
            session_id: session_id.clone(),
            kind,
            state: SessionState::Created,
            acknowledged: Vec::new(),
            outcomes: Vec::new(),
            key_id: None,
            presignature_ids: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
            expires_at: now + chrono::Duration::seconds(self.ttl_seconds),
        };

        match self.sessions.entry(session_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(StoreError::AlreadyExists(session_id.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(record.clone());
                self.publish(&record, None);
                Ok(record)
            }
        }
    }

    /// Get a session by id; expired records are treated as absent
    pub fn get(&self, session_id: &SessionId) -> Result<SessionRecord> {
        let now = Utc::now();
        self.sessions
            .get(session_id)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))
    }

    pub fn exists(&self, session_id: &SessionId) -> bool {
        self.get(session_id).is_ok()
    }

    /// Move a session to `next`, rejecting transitions the lifecycle forbids
    pub fn transition(&self, session_id: &SessionId, next: SessionState) -> Result<SessionRecord> {
        self.update(session_id, None, |record| {
            if !record.state.can_transition_to(next) {
                return Err(StoreError::InvalidTransition {
                    session_id: session_id.to_string(),
                    from: record.state,
                    to: next,
                });
            }
            record.state = next;
            Ok(())
        })
    }

    /// Note that `participant` accepted the join
    pub fn acknowledge(
        &self,
        session_id: &SessionId,
        participant: impl Into<String>,
    ) -> Result<SessionRecord> {
        let participant = participant.into();
        self.update(session_id, None, |record| {
            if !record.acknowledged.contains(&participant) {
                record.acknowledged.push(participant);
            }
            Ok(())
        })
    }

    /// Append a participant outcome without changing the state; the
    /// participant no longer counts as merely acknowledged
    pub fn record_outcome(
        &self,
        session_id: &SessionId,
        outcome: ParticipantOutcome,
    ) -> Result<SessionRecord> {
        self.update(session_id, Some(outcome.clone()), |record| {
            record.acknowledged.retain(|p| *p != outcome.participant);
            record.outcomes.push(outcome);
            Ok(())
        })
    }

    /// Mark a key generation or key copy as completed
    pub fn complete_key(&self, session_id: &SessionId, key_id: KeyId) -> Result<SessionRecord> {
        self.update(session_id, None, |record| {
            ensure(session_id, record.state, SessionState::Completed)?;
            record.state = SessionState::Completed;
            record.key_id = Some(key_id);
            Ok(())
        })
    }

    /// Mark a presignature session as completed
    pub fn complete_presignatures(
        &self,
        session_id: &SessionId,
        presignature_ids: Vec<PresignatureId>,
    ) -> Result<SessionRecord> {
        self.update(session_id, None, |record| {
            ensure(session_id, record.state, SessionState::Completed)?;
            record.state = SessionState::Completed;
            record.presignature_ids = presignature_ids;
            Ok(())
        })
    }

    /// Mark a session as failed with a reason
    pub fn fail(&self, session_id: &SessionId, error: impl Into<String>) -> Result<SessionRecord> {
        let error = error.into();
        self.update(session_id, None, |record| {
            ensure(session_id, record.state, SessionState::Failed)?;
            record.state = SessionState::Failed;
            record.error = Some(error);
            Ok(())
        })
    }

    fn update<F>(
        &self,
        session_id: &SessionId,
        outcome: Option<ParticipantOutcome>,
        apply: F,
    ) -> Result<SessionRecord>
    where
        F: FnOnce(&mut SessionRecord) -> Result<()>,
    {
        let record = {
            let mut entry = self
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
            apply(entry.value_mut())?;
            entry.updated_at = Utc::now();
            entry.value().clone()
        };

        debug!(session_id = %session_id, state = %record.state, "Session updated");
        self.publish(&record, outcome);
        Ok(record)
    }

    fn publish(&self, record: &SessionRecord, outcome: Option<ParticipantOutcome>) {
        let _ = self.events.send(SessionEvent {
            session_id: record.session_id.clone(),
            state: record.state,
            outcome,
        });
    }

    /// Observe every change made through this registry
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Wait until the session reaches a terminal state
    pub async fn wait_for_terminal(
        &self,
        session_id: &SessionId,
        timeout: Duration,
    ) -> Result<SessionRecord> {
        let mut rx = self.subscribe();

        let wait = async {
            loop {
                let record = match self.get(session_id) {
                    Ok(record) => record,
                    Err(e) => return Err(e),
                };
                if record.state.is_terminal() {
                    return Ok(record);
                }

                tokio::select! {
                    _ = rx.recv() => continue,
                    _ = tokio::time::sleep(Duration::from_millis(100)) => continue,
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| StoreError::Timeout(session_id.to_string()))?
    }

    /// Remove expired sessions, returning how many were dropped
    pub fn cleanup(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, v| v.expires_at > now);
        before.saturating_sub(self.sessions.len())
    }

    /// Run [`SessionStore::cleanup`] every `every`
    pub fn spawn_cleanup(&self, every: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let removed = store.cleanup();
                if removed > 0 {
                    debug!(removed, "Expired sessions removed");
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(3600) // 1 hour default TTL
    }
}

fn ensure(session_id: &SessionId, from: SessionState, to: SessionState) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition {
            session_id: session_id.to_string(),
            from,
            to,
        })
    }
}
