//! The mobile participant's full run against an in-process deployment

use gateway::{Dispatcher, Peer};
use mobile_party::{GatewayClient, MobileParty};
use node_controller::NodeService;
use session_store::{SessionState, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use tsm_core::engine::MemoryEngine;
use tsm_core::session::{FixedNodeKeys, NodeKeys, SessionDeriver};
use tsm_core::types::b64;
use tsm_core::{Error, NodeRole};

const MOBILE: &[u8] = b"mobile-public-key";
const NODE1: &[u8] = b"node-1-public-key";
const NODE2: &[u8] = b"node-2-public-key";
const WAIT: Duration = Duration::from_secs(10);

async fn serve(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn node(engine: &MemoryEngine, keys: NodeKeys) -> String {
    let index = keys.role.index();
    let service = NodeService::new(
        SessionDeriver::new(keys),
        Arc::new(engine.player(index)),
        SessionStore::new(3600),
        WAIT,
    );
    serve(node_controller::build_router(Arc::new(service))).await
}

/// Nodes, gateway and a mobile party sharing one engine cluster
async fn deploy(node2_reachable: bool) -> MobileParty {
    let engine = MemoryEngine::with_timeout(WAIT);
    let node1_url = node(&engine, NodeKeys::new(NodeRole::One, NODE1.to_vec(), NODE2.to_vec())).await;
    let node2_url = if node2_reachable {
        node(&engine, NodeKeys::new(NodeRole::Two, NODE2.to_vec(), NODE1.to_vec())).await
    } else {
        "http://127.0.0.1:1".to_string()
    };

    let dispatcher = Dispatcher::new(
        vec![Peer::new(1, &node1_url), Peer::new(2, &node2_url)],
        Peer::new(1, &node1_url),
        SessionStore::new(3600),
    )
    .with_timeout(Duration::from_secs(5))
    .with_fixed_keys(FixedNodeKeys::new(NODE1.to_vec(), NODE2.to_vec()));
    let gateway_url = serve(gateway::build_router(Arc::new(dispatcher))).await;

    MobileParty::new(
        GatewayClient::new(&gateway_url).with_poll_interval(Duration::from_millis(50)),
        Arc::new(engine.player(0)),
        &b64::encode(MOBILE),
        SessionStore::new(3600),
    )
    .unwrap()
}

fn drain(events: &mut tokio::sync::broadcast::Receiver<session_store::SessionEvent>) -> Vec<SessionState> {
    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        states.push(event.state);
    }
    states
}

#[tokio::test]
async fn test_keygen_copy_presign_sign() {
    let party = deploy(true).await;

    let key_id = party.generate_key().await.unwrap();
    let copy_id = party.copy_key(&key_id).await.unwrap();
    assert_ne!(key_id, copy_id);

    let presignatures = party.presign(&copy_id, 2).await.unwrap();
    assert_eq!(presignatures.len(), 2);

    let mut events = party.store().subscribe();
    let signature = party
        .sign(&copy_id, &presignatures[0], &[9u8; 32])
        .await
        .unwrap();
    assert_eq!(signature.r.len(), 33);

    let states = drain(&mut events);
    assert!(states.ends_with(&[
        SessionState::Joining,
        SessionState::Completed,
        SessionState::SharesCollected,
        SessionState::Finalized,
    ]));
}

#[tokio::test]
async fn test_unknown_presignature_fails_the_sign_session() {
    let party = deploy(true).await;
    let key_id = party.generate_key().await.unwrap();

    let mut events = party.store().subscribe();
    let err = party.sign(&key_id, "missing", &[1u8; 32]).await.unwrap_err();

    assert!(matches!(err, Error::EngineFailure(_)));
    assert_eq!(drain(&mut events).last(), Some(&SessionState::Failed));
}

#[tokio::test]
async fn test_failed_dispatch_ends_the_join_early() {
    let party = deploy(false).await;
    let mut events = party.store().subscribe();

    let started = std::time::Instant::now();
    let err = party.generate_key().await.unwrap_err();

    assert!(matches!(err, Error::TransportFailure(_)));
    assert!(started.elapsed() < WAIT);
    assert_eq!(drain(&mut events).last(), Some(&SessionState::Failed));
}

#[tokio::test]
async fn test_bad_public_key_is_a_configuration_fault() {
    let result = MobileParty::new(
        GatewayClient::new("http://127.0.0.1:1"),
        Arc::new(MemoryEngine::new().player(0)),
        "%%%",
        SessionStore::default(),
    );
    assert!(matches!(result, Err(Error::ConfigurationFault(_))));
}
