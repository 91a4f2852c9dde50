//! Node-local session execution
//!
//! Requests are validated and the session configuration re-derived
//! synchronously; the engine join itself runs on a detached task whose
//! outcome lands in the session registry.

use session_store::{ParticipantOutcome, SessionRecord, SessionState, SessionStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use tsm_core::api::{
    NodeCopyKeyRequest, NodeGenerateKeyRequest, NodePresignRequest, NodeSignRequest,
    NodeSignResponse,
};
use tsm_core::engine::SigningEngine;
use tsm_core::session::SessionDeriver;
use tsm_core::types::b64;
use tsm_core::{Error, KeyId, NodeRole, PresignatureId, Result, SessionConfig, SessionId};

/// Engine join a session request turns into
#[derive(Debug, Clone)]
enum EngineJob {
    GenerateKey,
    CopyKey { existing_key_id: KeyId },
    Presign { key_id: KeyId, count: u64 },
}

enum JobOutput {
    Key(KeyId),
    Presignatures(Vec<PresignatureId>),
}

impl EngineJob {
    async fn run(self, engine: &dyn SigningEngine, config: &SessionConfig) -> Result<JobOutput> {
        match self {
            EngineJob::GenerateKey => engine.generate_key(config).await.map(JobOutput::Key),
            EngineJob::CopyKey { existing_key_id } => engine
                .copy_key(config, &existing_key_id)
                .await
                .map(JobOutput::Key),
            EngineJob::Presign { key_id, count } => engine
                .generate_presignatures(config, &key_id, count)
                .await
                .map(JobOutput::Presignatures),
        }
    }
}

/// One fixed co-signer's orchestration logic
pub struct NodeService {
    deriver: SessionDeriver,
    engine: Arc<dyn SigningEngine>,
    store: SessionStore,
    engine_timeout: Duration,
}

impl NodeService {
    pub fn new(
        deriver: SessionDeriver,
        engine: Arc<dyn SigningEngine>,
        store: SessionStore,
        engine_timeout: Duration,
    ) -> Self {
        Self {
            deriver,
            engine,
            store,
            engine_timeout,
        }
    }

    pub fn role(&self) -> NodeRole {
        self.deriver.role()
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Join a key generation session; returns once the join is scheduled
    #[instrument(skip_all, fields(session_id = %req.session_id, role = %self.role()))]
    pub fn start_generate_key(&self, req: NodeGenerateKeyRequest) -> Result<()> {
        let config = self
            .deriver
            .generate_key_session(req.session_id, &req.public_key)?;
        verify_digest(&config, req.config_digest.as_deref())?;
        self.spawn_join(config, EngineJob::GenerateKey)
    }

    /// Join a key copy session
    #[instrument(skip_all, fields(session_id = %req.session_id, role = %self.role()))]
    pub fn start_copy_key(&self, req: NodeCopyKeyRequest) -> Result<()> {
        let config = self
            .deriver
            .copy_key_session(req.session_id, &req.public_key)?;
        verify_digest(&config, req.config_digest.as_deref())?;
        self.spawn_join(
            config,
            EngineJob::CopyKey {
                existing_key_id: req.existing_key_id,
            },
        )
    }

    /// Join a presignature session; only the signer node may
    #[instrument(skip_all, fields(session_id = %req.session_id, role = %self.role()))]
    pub fn start_presign(&self, req: NodePresignRequest) -> Result<()> {
        let config = self
            .deriver
            .presign_session(req.session_id, &req.public_key)?;
        verify_digest(&config, req.config_digest.as_deref())?;
        self.spawn_join(
            config,
            EngineJob::Presign {
                key_id: req.key_id,
                count: req.count,
            },
        )
    }

    /// Produce this node's partial signature over a presignature.
    ///
    /// The message hash is decoded before anything else, so malformed
    /// input never reaches the engine.
    #[instrument(skip_all, fields(presignature_id = %req.sign_signature_id, role = %self.role()))]
    pub async fn partial_sign(&self, req: NodeSignRequest) -> Result<NodeSignResponse> {
        let message_hash = b64::decode_field("messageHash", &req.message_hash)?;

        if !self.role().is_signer() {
            return Err(Error::configuration(format!(
                "player {} is not allowed to sign",
                self.role()
            )));
        }

        let partial = tokio::time::timeout(
            self.engine_timeout,
            self.engine
                .sign_with_presignature(&req.key_id, &req.sign_signature_id, &message_hash),
        )
        .await
        .map_err(|_| {
            Error::engine(format!(
                "partial signing timed out after {:?}",
                self.engine_timeout
            ))
        })??;

        info!(player = partial.player, "Partial signature produced");
        Ok(NodeSignResponse {
            signature: b64::encode(&partial.data),
        })
    }

    /// Status of a session this node joined
    pub fn session(&self, session_id: &SessionId) -> Result<SessionRecord> {
        Ok(self.store.get(session_id)?)
    }

    fn spawn_join(&self, config: SessionConfig, job: EngineJob) -> Result<()> {
        let session_id = config.session_id.clone();

        self.store
            .create(session_id.clone(), config.kind)
            .map_err(|e| match e {
                StoreError::AlreadyExists(id) => {
                    Error::invalid_input(format!("session {id} was already joined"))
                }
                other => other.into(),
            })?;
        self.store.transition(&session_id, SessionState::Joining)?;

        info!(
            kind = %config.kind,
            players = ?config.players,
            keys = ?config.key_fingerprints(),
            "Joining engine session"
        );

        let engine = self.engine.clone();
        let store = self.store.clone();
        let timeout = self.engine_timeout;
        let participant = format!("player{}", self.role().index());

        tokio::spawn(async move {
            let result = tokio::time::timeout(timeout, job.run(engine.as_ref(), &config))
                .await
                .unwrap_or_else(|_| {
                    Err(Error::engine(format!("engine join timed out after {timeout:?}")))
                });

            let outcome = match &result {
                Ok(_) => ParticipantOutcome::success(&participant),
                Err(e) => ParticipantOutcome::failure(&participant, e.message()),
            };
            if let Err(e) = store.record_outcome(&session_id, outcome) {
                warn!(session_id = %session_id, error = %e, "Could not record join outcome");
            }

            let recorded = match result {
                Ok(JobOutput::Key(key_id)) => {
                    info!(session_id = %session_id, key_id = %key_id, "Engine session completed");
                    store.complete_key(&session_id, key_id)
                }
                Ok(JobOutput::Presignatures(ids)) => {
                    info!(session_id = %session_id, count = ids.len(), "Engine session completed");
                    store.complete_presignatures(&session_id, ids)
                }
                Err(e) => {
                    error!(session_id = %session_id, error = %e, "Engine session failed");
                    store.fail(&session_id, e.message())
                }
            };

            if let Err(e) = recorded {
                warn!(session_id = %session_id, error = %e, "Could not record session outcome");
            }
        });

        Ok(())
    }
}

/// Compare the caller's digest with our own derivation
fn verify_digest(config: &SessionConfig, expected: Option<&str>) -> Result<()> {
    match expected {
        Some(expected) if !expected.eq_ignore_ascii_case(&config.digest()) => {
            warn!(session_id = %config.session_id, "Session configuration digest mismatch");
            Err(Error::configuration(format!(
                "session {} configuration digest does not match this node's derivation",
                config.session_id
            )))
        }
        _ => Ok(()),
    }
}
