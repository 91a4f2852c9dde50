//! Fan-out dispatcher
//!
//! Mints one session id per operation and sends one join request per node
//! controller on its own task. Callers get the id back immediately.
//!
//! A node answering the join request has only started its engine join, so
//! the peer task then polls the node's session record until that join
//! settles. The gateway record stays `dispatched`, listing acknowledged
//! peers, until every node reported success; the first failure fails it.

use futures_util::future::join_all;
use reqwest::Client;
use serde::Serialize;
use session_store::{ParticipantOutcome, SessionEvent, SessionRecord, SessionState, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use tsm_core::api::{
    CopyKeyRequest, ErrorEnvelope, FinalizeSignRequest, FinalizeSignResponse, GenerateKeyRequest,
    NodeCopyKeyRequest, NodeGenerateKeyRequest, NodePresignRequest, NodeSignRequest,
    NodeSignResponse, PreSignRequest,
};
use tsm_core::session::FixedNodeKeys;
use tsm_core::types::b64;
use tsm_core::{
    Error, OperationKind, PlayerIndex, Result, SessionConfig, SessionId, DEFAULT_CURVE,
};

/// Default upper bound on one dispatch
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default upper bound on waiting for a node's engine join to settle
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(330);

/// Default pause between two reads of a node's session record
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// A node controller the gateway talks to
#[derive(Debug, Clone)]
pub struct Peer {
    pub name: String,
    pub index: PlayerIndex,
    pub url: String,
}

impl Peer {
    pub fn new(index: PlayerIndex, url: &str) -> Self {
        Self {
            name: format!("player{index}"),
            index,
            url: url.trim_end_matches('/').to_string(),
        }
    }
}

/// How one peer's join ended, from the dispatch through the engine join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub peer: String,
    pub success: bool,
    pub message: Option<String>,
}

impl DispatchOutcome {
    fn from_result(peer: &Peer, result: Result<()>) -> Self {
        match result {
            Ok(()) => Self {
                peer: peer.name.clone(),
                success: true,
                message: None,
            },
            Err(e) => Self {
                peer: peer.name.clone(),
                success: false,
                message: Some(format!("{}: {}", e.kind(), e.message())),
            },
        }
    }
}

impl From<&DispatchOutcome> for ParticipantOutcome {
    fn from(outcome: &DispatchOutcome) -> Self {
        match &outcome.message {
            Some(message) if !outcome.success => {
                ParticipantOutcome::failure(outcome.peer.clone(), message.clone())
            }
            _ => ParticipantOutcome::success(outcome.peer.clone()),
        }
    }
}

/// A dispatched session and its in-flight peer tasks
pub struct Dispatch {
    pub session_id: SessionId,
    tasks: Vec<(String, JoinHandle<DispatchOutcome>)>,
}

impl Dispatch {
    /// Wait for every peer task. Dropping the `Dispatch` instead leaves the
    /// tasks running.
    pub async fn outcomes(self) -> Vec<DispatchOutcome> {
        let (peers, handles): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();
        join_all(handles)
            .await
            .into_iter()
            .zip(peers)
            .map(|(joined, peer)| {
                joined.unwrap_or_else(|e| DispatchOutcome {
                    peer,
                    success: false,
                    message: Some(format!("dispatch task failed: {e}")),
                })
            })
            .collect()
    }
}

/// Gateway side of session orchestration
pub struct Dispatcher {
    client: Client,
    /// Both fixed node controllers
    peers: Vec<Peer>,
    /// Node controller that co-signs with the mobile participant
    signer: Peer,
    timeout: Duration,
    join_timeout: Duration,
    poll_interval: Duration,
    store: SessionStore,
    /// Enables config digests when set
    fixed_keys: Option<FixedNodeKeys>,
    curve: String,
}

impl Dispatcher {
    pub fn new(peers: Vec<Peer>, signer: Peer, store: SessionStore) -> Self {
        Self {
            client: Client::new(),
            peers,
            signer,
            timeout: DEFAULT_DISPATCH_TIMEOUT,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            store,
            fixed_keys: None,
            curve: DEFAULT_CURVE.to_string(),
        }
    }

    /// Set the per-dispatch timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how long a node may take to report its join outcome
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Send config digests derived from these keys
    pub fn with_fixed_keys(mut self, keys: FixedNodeKeys) -> Self {
        self.fixed_keys = Some(keys);
        self
    }

    pub fn with_curve(mut self, curve: impl Into<String>) -> Self {
        self.curve = curve.into();
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    /// Session records and dispatch outcomes as they happen
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.store.subscribe()
    }

    pub fn session(&self, session_id: &SessionId) -> Result<SessionRecord> {
        Ok(self.store.get(session_id)?)
    }

    /// Start a key generation session on both nodes
    #[instrument(skip_all)]
    pub fn generate_key(&self, req: &GenerateKeyRequest) -> Result<Dispatch> {
        let session_id = SessionId::generate();
        let config_digest =
            self.prepare(&session_id, OperationKind::GenerateKey, &req.public_key)?;

        let body = NodeGenerateKeyRequest {
            session_id: session_id.clone(),
            public_key: req.public_key.clone(),
            config_digest,
        };
        self.fan_out(session_id, OperationKind::GenerateKey, "/v1/generateKey", &body, &self.peers)
    }

    /// Start a key copy session on both nodes
    #[instrument(skip_all, fields(key_id = %req.key_id))]
    pub fn copy_key(&self, req: &CopyKeyRequest) -> Result<Dispatch> {
        let session_id = SessionId::generate();
        let config_digest = self.prepare(&session_id, OperationKind::CopyKey, &req.public_key)?;

        let body = NodeCopyKeyRequest {
            session_id: session_id.clone(),
            public_key: req.public_key.clone(),
            existing_key_id: req.key_id.clone(),
            config_digest,
        };
        self.fan_out(session_id, OperationKind::CopyKey, "/v1/copyKey", &body, &self.peers)
    }

    /// Start a presignature session on the signer node
    #[instrument(skip_all, fields(key_id = %req.key_id, count = req.count))]
    pub fn presign(&self, req: &PreSignRequest) -> Result<Dispatch> {
        let session_id = SessionId::generate();
        let config_digest = self.prepare(&session_id, OperationKind::PreSign, &req.public_key)?;

        let body = NodePresignRequest {
            session_id: session_id.clone(),
            public_key: req.public_key.clone(),
            key_id: req.key_id.clone(),
            count: req.count,
            config_digest,
        };
        let signer = std::slice::from_ref(&self.signer);
        self.fan_out(session_id, OperationKind::PreSign, "/v1/presign", &body, signer)
    }

    /// Forward a partial-sign request to the signer node and wait for it
    #[instrument(skip_all, fields(presignature_id = %req.pre_signature_id, key_id = %req.key_id))]
    pub async fn partial_sign(&self, req: &FinalizeSignRequest) -> Result<FinalizeSignResponse> {
        b64::decode_field("messageHash", &req.message_hash)?;

        let body = NodeSignRequest {
            sign_signature_id: req.pre_signature_id.clone(),
            message_hash: req.message_hash.clone(),
            key_id: req.key_id.clone(),
        };
        let response = self
            .client
            .post(format!("{}/v1/sign", self.signer.url))
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::transport(format!("{}: {e}", self.signer.name)))?;

        let response: NodeSignResponse = read_response(&self.signer, response).await?;
        info!(peer = %self.signer.name, "Partial signature received");
        Ok(FinalizeSignResponse {
            partial_sign_result: response.signature,
        })
    }

    /// Derive the mobile participant's view and, when possible, the digest
    /// the nodes must reproduce
    fn prepare(
        &self,
        session_id: &SessionId,
        kind: OperationKind,
        public_key: &str,
    ) -> Result<Option<String>> {
        let dynamic = b64::decode_field("publicKey", public_key)?;
        let view = SessionConfig::dynamic_party(session_id.clone(), kind, dynamic)
            .with_curve(self.curve.clone());

        let full = match (&self.fixed_keys, kind) {
            (Some(keys), OperationKind::PreSign) => Some(keys.sign_session(session_id.clone(), public_key)?),
            (Some(keys), _) => Some(keys.keygen_session(session_id.clone(), kind, public_key)?),
            (None, _) => None,
        }
        .map(|config| config.with_curve(self.curve.clone()));

        info!(
            session_id = %session_id,
            kind = %kind,
            players = ?view.players,
            keys = ?full.as_ref().unwrap_or(&view).key_fingerprints(),
            "Session minted"
        );
        Ok(full.map(|config| config.digest()))
    }

    fn fan_out<B: Serialize>(
        &self,
        session_id: SessionId,
        kind: OperationKind,
        path: &'static str,
        body: &B,
        peers: &[Peer],
    ) -> Result<Dispatch> {
        let body = Arc::new(serde_json::to_value(body)?);

        self.store.create(session_id.clone(), kind)?;
        self.store.transition(&session_id, SessionState::Dispatched)?;

        let expected = peers.len();
        let tasks = peers
            .iter()
            .cloned()
            .map(|peer| {
                let name = peer.name.clone();
                let client = self.client.clone();
                let store = self.store.clone();
                let body = body.clone();
                let session_id = session_id.clone();
                let (timeout, join_timeout, poll_interval) =
                    (self.timeout, self.join_timeout, self.poll_interval);

                let handle = tokio::spawn(async move {
                    let result = match post_join(&client, &peer, path, &body, timeout).await {
                        Ok(()) => {
                            info!(session_id = %session_id, peer = %peer.name, "Join acknowledged");
                            if let Err(e) = store.acknowledge(&session_id, peer.name.clone()) {
                                warn!(session_id = %session_id, error = %e, "Could not record acknowledgement");
                            }
                            let polled = poll_join(&client, &peer, &session_id, timeout, poll_interval);
                            tokio::time::timeout(join_timeout, polled)
                                .await
                                .unwrap_or_else(|_| {
                                    Err(Error::transport(format!(
                                        "{} did not report its join within {join_timeout:?}",
                                        peer.name
                                    )))
                                })
                        }
                        Err(e) => Err(e),
                    };
                    let outcome = DispatchOutcome::from_result(&peer, result);

                    match &outcome.message {
                        Some(message) => warn!(
                            session_id = %session_id,
                            peer = %peer.name,
                            error = %message,
                            "Join failed"
                        ),
                        None => info!(session_id = %session_id, peer = %peer.name, "Join completed"),
                    }
                    settle(&store, &session_id, &outcome, expected);
                    outcome
                });
                (name, handle)
            })
            .collect();

        Ok(Dispatch { session_id, tasks })
    }
}

/// Record one peer's join outcome. The first failure fails the session, and
/// it completes once every peer reported success.
fn settle(store: &SessionStore, session_id: &SessionId, outcome: &DispatchOutcome, expected: usize) {
    let record = match store.record_outcome(session_id, outcome.into()) {
        Ok(record) => record,
        Err(e) => {
            error!(session_id = %session_id, error = %e, "Could not record join outcome");
            return;
        }
    };
    if record.state != SessionState::Dispatched {
        return;
    }

    let settled = match outcome.message.as_deref() {
        Some(message) if !outcome.success => {
            store.fail(session_id, format!("{}: {message}", outcome.peer))
        }
        _ if record.outcomes.len() >= expected && record.outcomes.iter().all(|o| o.success) => {
            store.transition(session_id, SessionState::Completed)
        }
        _ => return,
    };
    if let Err(e) = settled {
        warn!(session_id = %session_id, error = %e, "Could not settle session");
    }
}

async fn post_join(
    client: &Client,
    peer: &Peer,
    path: &str,
    body: &serde_json::Value,
    timeout: Duration,
) -> Result<()> {
    let response = client
        .post(format!("{}{}", peer.url, path))
        .json(body)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| Error::transport(format!("{}: {e}", peer.name)))?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(remote_error(peer, response).await)
    }
}

/// Read the node's session record until its engine join settles
async fn poll_join(
    client: &Client,
    peer: &Peer,
    session_id: &SessionId,
    timeout: Duration,
    interval: Duration,
) -> Result<()> {
    let url = format!("{}/v1/sessions/{session_id}", peer.url);
    loop {
        let response = client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Error::transport(format!("{}: {e}", peer.name)))?;
        let record: SessionRecord = read_response(peer, response).await?;

        match record.state {
            SessionState::Failed => {
                return Err(Error::engine(record.error.unwrap_or_else(|| {
                    format!("{} reported a failed join", peer.name)
                })))
            }
            state if state.is_terminal() => return Ok(()),
            _ => tokio::time::sleep(interval).await,
        }
    }
}

async fn read_response<T: serde::de::DeserializeOwned>(
    peer: &Peer,
    response: reqwest::Response,
) -> Result<T> {
    if !response.status().is_success() {
        return Err(remote_error(peer, response).await);
    }
    response
        .json()
        .await
        .map_err(|e| Error::transport(format!("{} returned an invalid body: {e}", peer.name)))
}

/// Rebuild the node's error from its envelope, keeping its kind
async fn remote_error(peer: &Peer, response: reqwest::Response) -> Error {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorEnvelope>(&text) {
        Ok(envelope) => envelope.into_error(),
        Err(_) => Error::transport(format!("{} answered {status}: {text}", peer.name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};

    fn dispatcher(store: SessionStore) -> Dispatcher {
        // Nothing listens on port 1.
        let peers = vec![Peer::new(1, "http://127.0.0.1:1/"), Peer::new(2, "http://127.0.0.1:1")];
        Dispatcher::new(peers, Peer::new(1, "http://127.0.0.1:1"), store)
            .with_timeout(Duration::from_secs(2))
    }

    /// Node controller that accepts every key generation join and reports
    /// whatever its registry says
    async fn stub_node(store: SessionStore) -> String {
        async fn join(
            State(store): State<SessionStore>,
            Json(req): Json<NodeGenerateKeyRequest>,
        ) -> StatusCode {
            store.create(req.session_id.clone(), OperationKind::GenerateKey).unwrap();
            store.transition(&req.session_id, SessionState::Joining).unwrap();
            StatusCode::OK
        }

        async fn session(
            State(store): State<SessionStore>,
            Path(session_id): Path<String>,
        ) -> Json<SessionRecord> {
            Json(store.get(&session_id.parse().unwrap()).unwrap())
        }

        let app = Router::new()
            .route("/v1/generateKey", post(join))
            .route("/v1/sessions/:session_id", get(session))
            .with_state(store);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// Two stub nodes behind one dispatcher; returns the node registries
    async fn stub_deployment(store: SessionStore) -> (Dispatcher, SessionStore, SessionStore) {
        let (node1, node2) = (SessionStore::new(3600), SessionStore::new(3600));
        let url1 = stub_node(node1.clone()).await;
        let url2 = stub_node(node2.clone()).await;
        let dispatcher = Dispatcher::new(
            vec![Peer::new(1, &url1), Peer::new(2, &url2)],
            Peer::new(1, &url1),
            store,
        )
        .with_timeout(Duration::from_secs(2))
        .with_poll_interval(Duration::from_millis(20));
        (dispatcher, node1, node2)
    }

    async fn wait_for_acknowledgements(store: &SessionStore, session_id: &SessionId, count: usize) {
        for _ in 0..250 {
            if store.get(session_id).unwrap().acknowledged.len() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("session {session_id} never had {count} acknowledgements");
    }

    fn mobile_request() -> GenerateKeyRequest {
        GenerateKeyRequest {
            public_key: b64::encode(b"mobile"),
        }
    }

    #[test]
    fn test_peer_url_trimmed() {
        let peer = Peer::new(2, "http://node2:8080/");
        assert_eq!(peer.url, "http://node2:8080");
        assert_eq!(peer.name, "player2");
    }

    #[tokio::test]
    async fn test_unreachable_peers_fail_the_session() {
        let store = SessionStore::new(3600);
        let dispatcher = dispatcher(store.clone());

        let dispatch = dispatcher
            .generate_key(&GenerateKeyRequest {
                public_key: b64::encode(b"mobile"),
            })
            .unwrap();
        let session_id = dispatch.session_id.clone();

        let outcomes = dispatch.outcomes().await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| !o.success));
        assert!(outcomes[0]
            .message
            .as_deref()
            .unwrap()
            .starts_with("TRANSPORT_FAILURE"));

        let record = store
            .wait_for_terminal(&session_id, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(record.state, SessionState::Failed);
        assert_eq!(record.outcomes.len(), 2);
    }

    #[tokio::test]
    async fn test_presign_goes_to_signer_only() {
        let dispatcher = dispatcher(SessionStore::new(3600));
        let dispatch = dispatcher
            .presign(&PreSignRequest {
                public_key: b64::encode(b"mobile"),
                key_id: "k".into(),
                count: 3,
            })
            .unwrap();

        let outcomes = dispatch.outcomes().await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].peer, "player1");
    }

    #[tokio::test]
    async fn test_bad_public_key_dispatches_nothing() {
        let store = SessionStore::new(3600);
        let dispatcher = dispatcher(store.clone());

        let err = dispatcher
            .generate_key(&GenerateKeyRequest {
                public_key: "%%%".into(),
            })
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_hash_is_rejected_before_forwarding() {
        let dispatcher = dispatcher(SessionStore::new(3600));

        let err = dispatcher
            .partial_sign(&FinalizeSignRequest {
                pre_signature_id: "p".into(),
                message_hash: "not base64!!".into(),
                key_id: "k".into(),
            })
            .await
            .unwrap_err();
        // An attempted forward would be a transport failure.
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_session_ids_differ_per_operation() {
        let dispatcher = dispatcher(SessionStore::new(3600));
        let req = GenerateKeyRequest {
            public_key: b64::encode(b"mobile"),
        };

        let a = dispatcher.generate_key(&req).unwrap();
        let b = dispatcher.generate_key(&req).unwrap();
        assert_ne!(a.session_id, b.session_id);
    }

    #[tokio::test]
    async fn test_session_stays_dispatched_until_nodes_report() {
        let store = SessionStore::new(3600);
        let (dispatcher, node1, node2) = stub_deployment(store.clone()).await;

        let dispatch = dispatcher.generate_key(&mobile_request()).unwrap();
        let session_id = dispatch.session_id.clone();
        wait_for_acknowledgements(&store, &session_id, 2).await;
        assert_eq!(store.get(&session_id).unwrap().state, SessionState::Dispatched);

        node1.complete_key(&session_id, "key-1".into()).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let record = store.get(&session_id).unwrap();
        assert_eq!(record.state, SessionState::Dispatched);
        assert_eq!(record.acknowledged, vec!["player2"]);

        node2.complete_key(&session_id, "key-1".into()).unwrap();
        let outcomes = dispatch.outcomes().await;
        assert!(outcomes.iter().all(|o| o.success));

        let record = store
            .wait_for_terminal(&session_id, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(record.state, SessionState::Completed);
        assert_eq!(record.outcomes.len(), 2);
        assert!(record.acknowledged.is_empty());
    }

    #[tokio::test]
    async fn test_failed_node_join_fails_the_session() {
        let store = SessionStore::new(3600);
        let (dispatcher, node1, _node2) = stub_deployment(store.clone()).await;

        let dispatch = dispatcher.generate_key(&mobile_request()).unwrap();
        let session_id = dispatch.session_id.clone();
        wait_for_acknowledgements(&store, &session_id, 2).await;

        node1
            .fail(&session_id, "engine join timed out after 500ms")
            .unwrap();
        let record = store
            .wait_for_terminal(&session_id, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(record.state, SessionState::Failed);
        assert_eq!(
            record.error.as_deref(),
            Some("player1: ENGINE_FAILURE: engine join timed out after 500ms")
        );
        // Player 2 is still joining and stays acknowledged.
        assert_eq!(record.acknowledged, vec!["player2"]);
    }

    #[tokio::test]
    async fn test_silent_node_runs_into_the_join_timeout() {
        let store = SessionStore::new(3600);
        let (dispatcher, _node1, _node2) = stub_deployment(store.clone()).await;
        let dispatcher = dispatcher.with_join_timeout(Duration::from_millis(300));

        let dispatch = dispatcher.generate_key(&mobile_request()).unwrap();
        let session_id = dispatch.session_id.clone();
        let outcomes = dispatch.outcomes().await;

        assert!(outcomes.iter().all(|o| !o.success));
        assert!(outcomes[0]
            .message
            .as_deref()
            .unwrap()
            .starts_with("TRANSPORT_FAILURE"));
        let record = store.get(&session_id).unwrap();
        assert_eq!(record.state, SessionState::Failed);
        assert_eq!(record.outcomes.len(), 2);
    }
}
