//! Participant 0's leg of each session
//!
//! The gateway mints the session and dispatches the fixed nodes; this side
//! derives its own view of the configuration and joins the same session on
//! its engine node. Progress is tracked in a local session registry.

use crate::gateway_client::GatewayClient;
use session_store::{SessionState, SessionStore};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use tsm_core::engine::{finalize_signature, verify_signature, SigningEngine};
use tsm_core::types::b64;
use tsm_core::{
    Error, KeyId, OperationKind, PresignatureId, Result, SessionConfig, SessionId, Signature,
};

/// Mobile participant driving sessions through the gateway
pub struct MobileParty {
    gateway: GatewayClient,
    engine: Arc<dyn SigningEngine>,
    /// Base64 form sent to the gateway
    public_key: String,
    public_key_bytes: Vec<u8>,
    store: SessionStore,
}

impl MobileParty {
    pub fn new(
        gateway: GatewayClient,
        engine: Arc<dyn SigningEngine>,
        public_key: &str,
        store: SessionStore,
    ) -> Result<Self> {
        let public_key_bytes = b64::decode_field("MOBILE_PUBLIC_KEY", public_key)
            .map_err(|e| Error::configuration(e.message()))?;
        Ok(Self {
            gateway,
            engine,
            public_key: public_key.to_string(),
            public_key_bytes,
            store,
        })
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Run a key generation session
    #[instrument(skip(self))]
    pub async fn generate_key(&self) -> Result<KeyId> {
        let session_id = self.gateway.generate_key(&self.public_key).await?;
        let config = self.config(&session_id, OperationKind::GenerateKey);

        let key_id = self.join(&config, self.engine.generate_key(&config)).await?;
        self.store.complete_key(&session_id, key_id.clone())?;
        info!(session_id = %session_id, key_id = %key_id, "Key generated");
        Ok(key_id)
    }

    /// Run a key copy session for `key_id`; this participant holds no share
    /// of the source key.
    #[instrument(skip(self))]
    pub async fn copy_key(&self, key_id: &str) -> Result<KeyId> {
        let session_id = self.gateway.copy_key(&self.public_key, key_id).await?;
        let config = self.config(&session_id, OperationKind::CopyKey);

        let copy_id = self.join(&config, self.engine.copy_key(&config, "")).await?;
        self.store.complete_key(&session_id, copy_id.clone())?;
        info!(session_id = %session_id, key_id = %copy_id, "Key copied");
        Ok(copy_id)
    }

    /// Run a presignature session over `key_id`
    #[instrument(skip(self))]
    pub async fn presign(&self, key_id: &str, count: u64) -> Result<Vec<PresignatureId>> {
        let session_id = self.gateway.pre_sign(&self.public_key, key_id, count).await?;
        let config = self.config(&session_id, OperationKind::PreSign);

        let ids = self
            .join(&config, self.engine.generate_presignatures(&config, key_id, count))
            .await?;
        self.store.complete_presignatures(&session_id, ids.clone())?;
        info!(session_id = %session_id, count = ids.len(), "Presignatures generated");
        Ok(ids)
    }

    /// Collect both partial signatures over `message_hash`, combine them and
    /// verify the result against the key's public key
    #[instrument(skip(self, message_hash))]
    pub async fn sign(
        &self,
        key_id: &str,
        presignature_id: &str,
        message_hash: &[u8],
    ) -> Result<Signature> {
        let session_id = SessionId::generate();
        self.store.create(session_id.clone(), OperationKind::PartialSign)?;
        self.store.transition(&session_id, SessionState::Joining)?;

        let shares = tokio::try_join!(
            self.engine
                .sign_with_presignature(key_id, presignature_id, message_hash),
            self.gateway
                .finalize_sign(key_id, presignature_id, message_hash),
        );
        let (local, remote) = match shares {
            Ok(shares) => shares,
            Err(e) => return Err(self.failed(&session_id, e)),
        };
        self.store.transition(&session_id, SessionState::Completed)?;
        self.store.transition(&session_id, SessionState::SharesCollected)?;

        let finalized = async {
            let signature = finalize_signature(message_hash, &[local.data, remote])?;
            let public_key = self.engine.public_key(key_id).await?;
            verify_signature(&public_key, message_hash, &signature)?;
            Ok::<_, Error>(signature)
        }
        .await;

        match finalized {
            Ok(signature) => {
                self.store.transition(&session_id, SessionState::Finalized)?;
                info!(key_id = %key_id, presignature_id = %presignature_id, "Signature verified");
                Ok(signature)
            }
            Err(e) => Err(self.failed(&session_id, e)),
        }
    }

    fn config(&self, session_id: &SessionId, kind: OperationKind) -> SessionConfig {
        SessionConfig::dynamic_party(session_id.clone(), kind, self.public_key_bytes.clone())
    }

    /// Join on the engine while watching the gateway's dispatch.
    ///
    /// A session the gateway marks failed ends the wait early instead of
    /// running into the engine's join timeout.
    async fn join<T>(
        &self,
        config: &SessionConfig,
        join: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let session_id = &config.session_id;
        self.store.create(session_id.clone(), config.kind)?;
        self.store.transition(session_id, SessionState::Joining)?;
        info!(
            session_id = %session_id,
            kind = %config.kind,
            keys = ?config.key_fingerprints(),
            "Joining engine session"
        );

        tokio::pin!(join);
        let result = tokio::select! {
            result = &mut join => result,
            dispatched = self.gateway.wait_for_dispatch(session_id) => match dispatched {
                Ok(()) => join.await,
                Err(e) => Err(e),
            },
        };

        result.map_err(|e| self.failed(session_id, e))
    }

    fn failed(&self, session_id: &SessionId, e: Error) -> Error {
        warn!(session_id = %session_id, error = %e, "Session failed");
        if let Err(store_err) = self.store.fail(session_id, e.message()) {
            warn!(session_id = %session_id, error = %store_err, "Could not record failure");
        }
        e
    }
}
