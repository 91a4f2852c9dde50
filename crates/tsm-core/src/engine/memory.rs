//! In-memory signing engine cluster
//!
//! Every player gets its own [`MemoryEngineNode`] handle; handles of one
//! cluster rendezvous on the session id and run the protocol once all
//! players listed in the session configuration have joined.

use super::{async_trait, schnorr, SigningEngine};
use crate::{
    Error, KeyId, OperationKind, PartialSignature, PlayerIndex, PresignatureId, Result,
    SessionConfig, SessionId,
};
use dashmap::DashMap;
use k256::{ProjectivePoint, Scalar};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long a join waits for the remaining players
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(300);

/// Upper bound on presignatures produced by one session
pub const MAX_PRESIGNATURES: u64 = 1000;

#[derive(Debug, Clone)]
enum JoinRequest {
    GenerateKey,
    CopyKey { existing_key_id: KeyId },
    Presign { key_id: KeyId, count: u64 },
}

impl JoinRequest {
    fn kind(&self) -> OperationKind {
        match self {
            JoinRequest::GenerateKey => OperationKind::GenerateKey,
            JoinRequest::CopyKey { .. } => OperationKind::CopyKey,
            JoinRequest::Presign { .. } => OperationKind::PreSign,
        }
    }
}

#[derive(Debug, Clone)]
enum Outcome {
    Key(KeyId),
    Presignatures(Vec<PresignatureId>),
}

struct Join {
    config: SessionConfig,
    request: JoinRequest,
}

#[derive(Default)]
struct Rendezvous {
    joined: BTreeMap<PlayerIndex, Join>,
    outcome: Option<std::result::Result<Outcome, String>>,
    collected: BTreeSet<PlayerIndex>,
}

struct StoredKey {
    public_key: Vec<u8>,
    threshold: usize,
    shares: BTreeMap<PlayerIndex, Scalar>,
}

struct StoredPresignature {
    key_id: KeyId,
    r: Vec<u8>,
    signers: Vec<PlayerIndex>,
    nonces: BTreeMap<PlayerIndex, Scalar>,
    used: BTreeSet<PlayerIndex>,
}

struct Cluster {
    rendezvous: DashMap<SessionId, Rendezvous>,
    keys: DashMap<KeyId, StoredKey>,
    presignatures: DashMap<PresignatureId, StoredPresignature>,
    notify: broadcast::Sender<()>,
    join_timeout: Duration,
}

/// A set of engine nodes sharing one process
#[derive(Clone)]
pub struct MemoryEngine {
    cluster: Arc<Cluster>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_JOIN_TIMEOUT)
    }

    /// Create a cluster whose joins give up after `join_timeout`
    pub fn with_timeout(join_timeout: Duration) -> Self {
        let (notify, _) = broadcast::channel(100);
        Self {
            cluster: Arc::new(Cluster {
                rendezvous: DashMap::new(),
                keys: DashMap::new(),
                presignatures: DashMap::new(),
                notify,
                join_timeout,
            }),
        }
    }

    /// Engine node acting as `player`
    pub fn player(&self, player: PlayerIndex) -> MemoryEngineNode {
        MemoryEngineNode {
            player,
            cluster: self.cluster.clone(),
        }
    }

    pub fn key_count(&self) -> usize {
        self.cluster.keys.len()
    }

    /// Sessions with at least one player still waiting or collecting
    pub fn pending_sessions(&self) -> usize {
        self.cluster.rendezvous.len()
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// One player's handle onto a [`MemoryEngine`]
#[derive(Clone)]
pub struct MemoryEngineNode {
    player: PlayerIndex,
    cluster: Arc<Cluster>,
}

impl MemoryEngineNode {
    pub fn player(&self) -> PlayerIndex {
        self.player
    }

    async fn join(&self, config: &SessionConfig, request: JoinRequest) -> Result<Outcome> {
        if config.kind != request.kind() {
            return Err(Error::engine(format!(
                "{} request does not match a {} session",
                request.kind(),
                config.kind
            )));
        }
        if !config.contains(self.player) {
            return Err(Error::engine(format!(
                "player {} is not a participant of session {}",
                self.player, config.session_id
            )));
        }

        let session_id = config.session_id.clone();
        let mut rx = self.cluster.notify.subscribe();

        self.enter(config, request)?;
        let mut seat = Seat {
            node: self,
            session_id: &session_id,
            collected: false,
        };
        let _ = self.cluster.notify.send(());

        let wait = async {
            loop {
                if let Some(outcome) = self.collect(&session_id) {
                    return outcome;
                }

                tokio::select! {
                    _ = rx.recv() => continue,
                    _ = tokio::time::sleep(Duration::from_millis(100)) => continue,
                }
            }
        };

        match tokio::time::timeout(self.cluster.join_timeout, wait).await {
            Ok(outcome) => {
                seat.collected = true;
                outcome
            }
            Err(_) => {
                warn!(
                    session_id = %session_id,
                    player = self.player,
                    "Timed out waiting for the remaining players"
                );
                Err(Error::engine(format!(
                    "session {session_id} timed out after {:?} waiting for players",
                    self.cluster.join_timeout
                )))
            }
        }
    }

    fn enter(&self, config: &SessionConfig, request: JoinRequest) -> Result<()> {
        let mut entry = self
            .cluster
            .rendezvous
            .entry(config.session_id.clone())
            .or_default();

        if entry.outcome.is_some() || entry.joined.contains_key(&self.player) {
            return Err(Error::engine(format!(
                "player {} already joined session {}",
                self.player, config.session_id
            )));
        }

        let disagrees = entry
            .joined
            .values()
            .any(|other| !other.config.agrees_with(config));

        entry.joined.insert(
            self.player,
            Join {
                config: config.clone(),
                request,
            },
        );
        debug!(
            session_id = %config.session_id,
            player = self.player,
            joined = entry.joined.len(),
            expected = config.players.len(),
            "Player joined session"
        );

        if disagrees {
            warn!(session_id = %config.session_id, player = self.player, "Session configuration mismatch");
            entry.outcome = Some(Err(format!(
                "player {} joined session {} with a different configuration",
                self.player, config.session_id
            )));
        } else if config.players.iter().all(|p| entry.joined.contains_key(p)) {
            let outcome = self
                .cluster
                .run(config, &entry.joined)
                .map_err(|e| e.message().to_string());
            entry.outcome = Some(outcome);
        }

        Ok(())
    }

    fn collect(&self, session_id: &SessionId) -> Option<Result<Outcome>> {
        let (outcome, done) = {
            let mut entry = self.cluster.rendezvous.get_mut(session_id)?;
            let outcome = entry.outcome.clone()?;
            entry.collected.insert(self.player);
            (outcome, entry.collected.len() >= entry.joined.len())
        };

        if done {
            self.cluster.rendezvous.remove(session_id);
        }
        Some(outcome.map_err(Error::EngineFailure))
    }

    /// Give up a seat without collecting the outcome
    fn leave(&self, session_id: &SessionId) {
        if let Some(mut entry) = self.cluster.rendezvous.get_mut(session_id) {
            if entry.outcome.is_none() {
                entry.joined.remove(&self.player);
            } else {
                entry.collected.insert(self.player);
            }
        }
        self.cluster.rendezvous.remove_if(session_id, |_, entry| {
            entry.joined.is_empty()
                || (entry.outcome.is_some() && entry.collected.len() >= entry.joined.len())
        });
    }
}

/// A joined player's place in a rendezvous, released on drop unless the
/// outcome was collected
struct Seat<'a> {
    node: &'a MemoryEngineNode,
    session_id: &'a SessionId,
    collected: bool,
}

impl Drop for Seat<'_> {
    fn drop(&mut self) {
        if !self.collected {
            debug!(session_id = %self.session_id, player = self.node.player, "Leaving session");
            self.node.leave(self.session_id);
        }
    }
}

impl Cluster {
    fn run(&self, config: &SessionConfig, joins: &BTreeMap<PlayerIndex, Join>) -> Result<Outcome> {
        match config.kind {
            OperationKind::GenerateKey => {
                let key_id = self.store_key(schnorr::random_scalar(), config);
                info!(session_id = %config.session_id, key_id = %key_id, "Key generated");
                Ok(Outcome::Key(key_id))
            }
            OperationKind::CopyKey => {
                let secret = self.recover_secret(joins)?;
                let key_id = self.store_key(secret, config);
                info!(session_id = %config.session_id, key_id = %key_id, "Key copied");
                Ok(Outcome::Key(key_id))
            }
            OperationKind::PreSign => self.presign(config, joins).map(Outcome::Presignatures),
            OperationKind::PartialSign => Err(Error::engine(
                "partial signing does not run as a session",
            )),
        }
    }

    fn store_key(&self, secret: Scalar, config: &SessionConfig) -> KeyId {
        let key_id = Uuid::new_v4().simple().to_string();
        self.keys.insert(
            key_id.clone(),
            StoredKey {
                public_key: schnorr::public_point(&secret),
                threshold: config.threshold,
                shares: schnorr::split_secret(secret, config.threshold, &config.players),
            },
        );
        key_id
    }

    /// Interpolate the secret from the shares of every player naming a key
    fn recover_secret(&self, joins: &BTreeMap<PlayerIndex, Join>) -> Result<Scalar> {
        let mut source: Option<&str> = None;
        let mut holders = Vec::new();

        for (player, join) in joins {
            if let JoinRequest::CopyKey { existing_key_id } = &join.request {
                if existing_key_id.is_empty() {
                    continue;
                }
                match source {
                    Some(existing) if existing != existing_key_id.as_str() => {
                        return Err(Error::engine("players named different keys to copy"));
                    }
                    _ => source = Some(existing_key_id.as_str()),
                }
                holders.push(*player);
            }
        }

        let source = source.ok_or_else(|| Error::engine("no player named a key to copy"))?;
        let key = self
            .keys
            .get(source)
            .ok_or_else(|| Error::engine(format!("key {source} not found")))?;

        let shares = holders
            .iter()
            .map(|player| {
                key.shares
                    .get(player)
                    .map(|share| (*player, *share))
                    .ok_or_else(|| {
                        Error::engine(format!("player {player} holds no share of key {source}"))
                    })
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        if shares.len() <= key.threshold {
            return Err(Error::engine(format!(
                "copying key {source} needs {} holders, got {}",
                key.threshold + 1,
                shares.len()
            )));
        }

        let secret = schnorr::combine_shares(&shares)?;
        if schnorr::public_point(&secret) != key.public_key {
            return Err(Error::engine(format!("shares of key {source} are inconsistent")));
        }
        Ok(secret)
    }

    fn presign(
        &self,
        config: &SessionConfig,
        joins: &BTreeMap<PlayerIndex, Join>,
    ) -> Result<Vec<PresignatureId>> {
        let mut requested: Option<(&str, u64)> = None;
        for join in joins.values() {
            if let JoinRequest::Presign { key_id, count } = &join.request {
                match requested {
                    Some((k, c)) if k != key_id.as_str() || c != *count => {
                        return Err(Error::engine(
                            "players requested presignatures for different keys or counts",
                        ));
                    }
                    _ => requested = Some((key_id.as_str(), *count)),
                }
            }
        }

        let (key_id, count) =
            requested.ok_or_else(|| Error::engine("no presignature request"))?;
        if count == 0 || count > MAX_PRESIGNATURES {
            return Err(Error::engine(format!(
                "presignature count must be between 1 and {MAX_PRESIGNATURES}, got {count}"
            )));
        }

        {
            let key = self
                .keys
                .get(key_id)
                .ok_or_else(|| Error::engine(format!("key {key_id} not found")))?;
            if let Some(player) = config.players.iter().find(|p| !key.shares.contains_key(*p)) {
                return Err(Error::engine(format!(
                    "player {player} holds no share of key {key_id}"
                )));
            }
        }

        let ids = (0..count)
            .map(|_| {
                let nonces: BTreeMap<PlayerIndex, Scalar> = config
                    .players
                    .iter()
                    .map(|p| (*p, schnorr::random_scalar()))
                    .collect();
                let k = nonces.values().fold(Scalar::ZERO, |acc, n| acc + n);

                let id = Uuid::new_v4().simple().to_string();
                self.presignatures.insert(
                    id.clone(),
                    StoredPresignature {
                        key_id: key_id.to_string(),
                        r: schnorr::encode_point(&(ProjectivePoint::GENERATOR * k)),
                        signers: config.players.clone(),
                        nonces,
                        used: BTreeSet::new(),
                    },
                );
                id
            })
            .collect::<Vec<_>>();

        info!(session_id = %config.session_id, key_id = %key_id, count = ids.len(), "Presignatures generated");
        Ok(ids)
    }
}

#[async_trait]
impl SigningEngine for MemoryEngineNode {
    async fn generate_key(&self, config: &SessionConfig) -> Result<KeyId> {
        match self.join(config, JoinRequest::GenerateKey).await? {
            Outcome::Key(key_id) => Ok(key_id),
            Outcome::Presignatures(_) => Err(Error::Internal("unexpected session outcome".into())),
        }
    }

    async fn copy_key(&self, config: &SessionConfig, existing_key_id: &str) -> Result<KeyId> {
        let request = JoinRequest::CopyKey {
            existing_key_id: existing_key_id.to_string(),
        };
        match self.join(config, request).await? {
            Outcome::Key(key_id) => Ok(key_id),
            Outcome::Presignatures(_) => Err(Error::Internal("unexpected session outcome".into())),
        }
    }

    async fn generate_presignatures(
        &self,
        config: &SessionConfig,
        key_id: &str,
        count: u64,
    ) -> Result<Vec<PresignatureId>> {
        let request = JoinRequest::Presign {
            key_id: key_id.to_string(),
            count,
        };
        match self.join(config, request).await? {
            Outcome::Presignatures(ids) => Ok(ids),
            Outcome::Key(_) => Err(Error::Internal("unexpected session outcome".into())),
        }
    }

    async fn sign_with_presignature(
        &self,
        key_id: &str,
        presignature_id: &str,
        message_hash: &[u8],
    ) -> Result<PartialSignature> {
        let (share, public_key) = {
            let key = self
                .cluster
                .keys
                .get(key_id)
                .ok_or_else(|| Error::engine(format!("key {key_id} not found")))?;
            let share = *key.shares.get(&self.player).ok_or_else(|| {
                Error::engine(format!("player {} holds no share of key {key_id}", self.player))
            })?;
            (share, key.public_key.clone())
        };

        let (r, lagrange, nonce, exhausted) = {
            let mut presig = self
                .cluster
                .presignatures
                .get_mut(presignature_id)
                .ok_or_else(|| {
                    Error::engine(format!("presignature {presignature_id} not found"))
                })?;

            if presig.key_id != key_id {
                return Err(Error::engine(format!(
                    "presignature {presignature_id} belongs to a different key"
                )));
            }
            let nonce = *presig.nonces.get(&self.player).ok_or_else(|| {
                Error::engine(format!(
                    "player {} holds no share of presignature {presignature_id}",
                    self.player
                ))
            })?;
            let lagrange = schnorr::lagrange_coefficient(self.player, &presig.signers)?;
            if !presig.used.insert(self.player) {
                return Err(Error::engine(format!(
                    "presignature {presignature_id} was already used"
                )));
            }
            let exhausted = presig.used.len() == presig.signers.len();
            (presig.r.clone(), lagrange, nonce, exhausted)
        };

        if exhausted {
            self.cluster.presignatures.remove(presignature_id);
        }

        let data = schnorr::partial_fragment(
            self.player,
            &r,
            nonce,
            lagrange,
            share,
            &public_key,
            message_hash,
        );

        debug!(player = self.player, presignature_id, "Partial signature produced");
        Ok(PartialSignature {
            player: self.player,
            presignature_id: presignature_id.to_string(),
            data,
        })
    }

    async fn public_key(&self, key_id: &str) -> Result<Vec<u8>> {
        let key = self
            .cluster
            .keys
            .get(key_id)
            .ok_or_else(|| Error::engine(format!("key {key_id} not found")))?;
        if !key.shares.contains_key(&self.player) {
            return Err(Error::engine(format!(
                "player {} holds no share of key {key_id}",
                self.player
            )));
        }
        Ok(key.public_key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{finalize_signature, verify_signature};
    use sha2::{Digest, Sha256};

    const MOBILE: &[u8] = b"mobile";
    const NODE1: &[u8] = b"node-1";
    const NODE2: &[u8] = b"node-2";

    fn keygen_config(kind: OperationKind) -> SessionConfig {
        SessionConfig::keygen(
            SessionId::generate(),
            kind,
            MOBILE.to_vec(),
            NODE1.to_vec(),
            NODE2.to_vec(),
        )
    }

    async fn generate(engine: &MemoryEngine) -> KeyId {
        let config = keygen_config(OperationKind::GenerateKey);
        let mobile = SessionConfig::dynamic_party(
            config.session_id.clone(),
            OperationKind::GenerateKey,
            MOBILE.to_vec(),
        );
        let node0 = engine.player(0);
        let node1 = engine.player(1);
        let node2 = engine.player(2);
        let (p0, p1, p2) = tokio::join!(
            node0.generate_key(&mobile),
            node1.generate_key(&config),
            node2.generate_key(&config),
        );
        let key_id = p0.unwrap();
        assert_eq!(p1.unwrap(), key_id);
        assert_eq!(p2.unwrap(), key_id);
        key_id
    }

    async fn presign(engine: &MemoryEngine, key_id: &str, count: u64) -> Vec<PresignatureId> {
        let config = SessionConfig::sign(SessionId::generate(), MOBILE.to_vec(), NODE1.to_vec());
        let node0 = engine.player(0);
        let node1 = engine.player(1);
        let (p0, p1) = tokio::join!(
            node0.generate_presignatures(&config, key_id, count),
            node1.generate_presignatures(&config, key_id, count),
        );
        let ids = p0.unwrap();
        assert_eq!(p1.unwrap(), ids);
        ids
    }

    #[tokio::test]
    async fn test_generate_key() {
        let engine = MemoryEngine::new();
        let key_id = generate(&engine).await;

        let pk0 = engine.player(0).public_key(&key_id).await.unwrap();
        let pk2 = engine.player(2).public_key(&key_id).await.unwrap();
        assert_eq!(pk0, pk2);
        assert_eq!(pk0.len(), 33);
        assert_eq!(engine.pending_sessions(), 0);
    }

    #[tokio::test]
    async fn test_copy_key_keeps_public_key() {
        let engine = MemoryEngine::new();
        let key_id = generate(&engine).await;

        let config = keygen_config(OperationKind::CopyKey);
        let node0 = engine.player(0);
        let node1 = engine.player(1);
        let node2 = engine.player(2);
        let (p0, p1, p2) = tokio::join!(
            node0.copy_key(&config, ""),
            node1.copy_key(&config, &key_id),
            node2.copy_key(&config, &key_id),
        );
        let copy_id = p0.unwrap();
        assert_eq!(p1.unwrap(), copy_id);
        assert_eq!(p2.unwrap(), copy_id);
        assert_ne!(copy_id, key_id);

        let original = engine.player(1).public_key(&key_id).await.unwrap();
        let copied = engine.player(0).public_key(&copy_id).await.unwrap();
        assert_eq!(original, copied);
    }

    #[tokio::test]
    async fn test_dropped_join_releases_its_seat() {
        let engine = MemoryEngine::with_timeout(Duration::from_secs(5));
        let config = keygen_config(OperationKind::GenerateKey);

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            engine.player(1).generate_key(&config),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(engine.pending_sessions(), 0);

        // The same player can join the same session again.
        let node0 = engine.player(0);
        let node1 = engine.player(1);
        let node2 = engine.player(2);
        let (p0, p1, p2) = tokio::join!(
            node0.generate_key(&config),
            node1.generate_key(&config),
            node2.generate_key(&config),
        );
        let key_id = p0.unwrap();
        assert_eq!(p1.unwrap(), key_id);
        assert_eq!(p2.unwrap(), key_id);
        assert_eq!(engine.pending_sessions(), 0);
    }

    #[tokio::test]
    async fn test_uncollected_outcome_is_released_on_drop() {
        let engine = MemoryEngine::with_timeout(Duration::from_secs(5));
        let config = keygen_config(OperationKind::GenerateKey);

        let mobile = engine.player(0);
        let mut waiting = mobile.generate_key(&config);
        // Player 0 takes its seat, then the others finish the round without it.
        let seated = tokio::time::timeout(Duration::from_millis(20), waiting.as_mut()).await;
        assert!(seated.is_err());
        let node1 = engine.player(1);
        let node2 = engine.player(2);
        let (p1, p2) = tokio::join!(
            node1.generate_key(&config),
            node2.generate_key(&config),
        );
        assert_eq!(p1.unwrap(), p2.unwrap());
        assert_eq!(engine.pending_sessions(), 1);

        drop(waiting);
        assert_eq!(engine.pending_sessions(), 0);
    }

    #[tokio::test]
    async fn test_presign_sign_and_verify() {
        let engine = MemoryEngine::new();
        let key_id = generate(&engine).await;
        let presigs = presign(&engine, &key_id, 3).await;
        assert_eq!(presigs.len(), 3);

        let message = Sha256::digest(b"Hello, world!");
        let mut partials = Vec::new();
        for player in [0, 1] {
            let partial = engine
                .player(player)
                .sign_with_presignature(&key_id, &presigs[0], &message)
                .await
                .unwrap();
            assert_eq!(partial.player, player);
            partials.push(partial.data);
        }

        let signature = finalize_signature(&message, &partials).unwrap();
        let public_key = engine.player(0).public_key(&key_id).await.unwrap();
        verify_signature(&public_key, &message, &signature).unwrap();
    }

    #[tokio::test]
    async fn test_presignature_is_single_use() {
        let engine = MemoryEngine::new();
        let key_id = generate(&engine).await;
        let presigs = presign(&engine, &key_id, 1).await;
        let message = Sha256::digest(b"msg");

        let node = engine.player(1);
        node.sign_with_presignature(&key_id, &presigs[0], &message)
            .await
            .unwrap();
        let err = node
            .sign_with_presignature(&key_id, &presigs[0], &message)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EngineFailure(_)));
    }

    #[tokio::test]
    async fn test_mismatched_presignatures_do_not_finalize() {
        let engine = MemoryEngine::new();
        let key_id = generate(&engine).await;
        let presigs = presign(&engine, &key_id, 2).await;
        let message = Sha256::digest(b"msg");

        let a = engine
            .player(0)
            .sign_with_presignature(&key_id, &presigs[0], &message)
            .await
            .unwrap();
        let b = engine
            .player(1)
            .sign_with_presignature(&key_id, &presigs[1], &message)
            .await
            .unwrap();
        assert!(finalize_signature(&message, &[a.data, b.data]).is_err());
    }

    #[tokio::test]
    async fn test_disagreeing_configuration_fails_session() {
        let engine = MemoryEngine::with_timeout(Duration::from_secs(5));
        let config = keygen_config(OperationKind::GenerateKey);
        let mut forged = config.clone();
        forged.dynamic_public_keys.insert(0, b"attacker".to_vec());
        let node1 = engine.player(1);

        let node2 = engine.player(2);

        let (p1, p2) = tokio::join!(
            node1.generate_key(&config),
            node2.generate_key(&forged),
        );
        assert!(matches!(p1, Err(Error::EngineFailure(_))));
        assert!(matches!(p2, Err(Error::EngineFailure(_))));
    }

    #[tokio::test]
    async fn test_join_times_out_without_all_players() {
        let engine = MemoryEngine::with_timeout(Duration::from_millis(300));
        let config = keygen_config(OperationKind::GenerateKey);

        let err = engine.player(1).generate_key(&config).await.unwrap_err();
        assert!(matches!(err, Error::EngineFailure(msg) if msg.contains("timed out")));
        assert_eq!(engine.pending_sessions(), 0);
    }

    #[tokio::test]
    async fn test_non_participant_rejected() {
        let engine = MemoryEngine::new();
        let config = SessionConfig::sign(SessionId::generate(), MOBILE.to_vec(), NODE1.to_vec());

        let err = engine
            .player(2)
            .generate_presignatures(&config, "any", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EngineFailure(_)));
    }

    #[tokio::test]
    async fn test_copy_of_unknown_key_fails() {
        let engine = MemoryEngine::new();
        let config = keygen_config(OperationKind::CopyKey);
        let node0 = engine.player(0);
        let node1 = engine.player(1);
        let node2 = engine.player(2);
        let (p0, p1, p2) = tokio::join!(
            node0.copy_key(&config, ""),
            node1.copy_key(&config, "missing"),
            node2.copy_key(&config, "missing"),
        );
        assert!(p0.is_err() && p1.is_err() && p2.is_err());
    }
}
