//! Session configuration module
//!
//! Builds the participant set and the index → public key mapping each party
//! hands to the signing engine. The gateway and both node controllers derive
//! it independently; the engine only pairs them up if the views agree.

mod config;
mod derive;

pub use config::SessionConfig;
pub use derive::{FixedNodeKeys, NodeKeys, SessionDeriver};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{b64, NodeRole, OperationKind, SessionId};
    use crate::Error;

    const MOBILE: &[u8] = b"mobile-public-key";
    const NODE1: &[u8] = b"node-1-public-key";
    const NODE2: &[u8] = b"node-2-public-key";

    fn node(role: &str) -> SessionDeriver {
        let (own, peer) = match role {
            "1" => (NODE1, NODE2),
            _ => (NODE2, NODE1),
        };
        SessionDeriver::new(
            NodeKeys::from_base64(role, &b64::encode(own), &b64::encode(peer)).unwrap(),
        )
    }

    #[test]
    fn test_keygen_session_maps_all_three_players() {
        let config = node("1")
            .generate_key_session(SessionId::generate(), &b64::encode(MOBILE))
            .unwrap();

        assert_eq!(config.players, vec![0, 1, 2]);
        assert_eq!(config.dynamic_public_keys.len(), 3);
        assert_eq!(config.dynamic_public_keys[&0], MOBILE);
        assert_eq!(config.dynamic_public_keys[&1], NODE1);
        assert_eq!(config.dynamic_public_keys[&2], NODE2);
        assert_eq!(config.threshold, 1);
    }

    #[test]
    fn test_both_nodes_and_gateway_derive_identical_config() {
        let session_id = SessionId::generate();
        let mobile = b64::encode(MOBILE);

        let from_one = node("1")
            .copy_key_session(session_id.clone(), &mobile)
            .unwrap();
        let from_two = node("2")
            .copy_key_session(session_id.clone(), &mobile)
            .unwrap();
        let from_gateway = FixedNodeKeys::new(NODE1.to_vec(), NODE2.to_vec())
            .keygen_session(session_id, OperationKind::CopyKey, &mobile)
            .unwrap();

        assert_eq!(from_one, from_two);
        assert_eq!(from_one, from_gateway);
        assert_eq!(from_one.digest(), from_two.digest());
        assert_eq!(from_one.digest(), from_gateway.digest());
    }

    #[test]
    fn test_digest_changes_with_any_input() {
        let session_id = SessionId::generate();
        let base = node("1")
            .generate_key_session(session_id.clone(), &b64::encode(MOBILE))
            .unwrap();
        let other_key = node("1")
            .generate_key_session(session_id, &b64::encode(b"someone-else"))
            .unwrap();
        let other_session = node("1")
            .generate_key_session(SessionId::generate(), &b64::encode(MOBILE))
            .unwrap();

        assert_ne!(base.digest(), other_key.digest());
        assert_ne!(base.digest(), other_session.digest());
    }

    #[test]
    fn test_sign_session_maps_two_players() {
        let config = node("1")
            .presign_session(SessionId::generate(), &b64::encode(MOBILE))
            .unwrap();

        assert_eq!(config.players, vec![0, 1]);
        assert_eq!(config.dynamic_public_keys.len(), 2);
        assert_eq!(config.dynamic_public_keys[&0], MOBILE);
        assert_eq!(config.dynamic_public_keys[&1], NODE1);
    }

    #[test]
    fn test_sign_session_on_non_signer_is_configuration_fault() {
        let err = node("2")
            .presign_session(SessionId::generate(), &b64::encode(MOBILE))
            .unwrap_err();
        assert!(matches!(err, Error::ConfigurationFault(_)));
    }

    #[test]
    fn test_malformed_dynamic_key_is_invalid_input() {
        let err = node("1")
            .generate_key_session(SessionId::generate(), "%%%")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = node("1")
            .presign_session(SessionId::generate(), "%%%")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_bad_static_configuration() {
        let err = NodeKeys::from_base64("3", "AA==", "AA==").unwrap_err();
        assert!(matches!(err, Error::ConfigurationFault(_)));

        let err = NodeKeys::from_base64("1", "%%%", "AA==").unwrap_err();
        assert!(matches!(err, Error::ConfigurationFault(_)));

        let err = NodeKeys::from_base64("2", "AA==", "").unwrap_err();
        assert!(matches!(err, Error::ConfigurationFault(_)));
    }

    #[test]
    fn test_as_fixed_orders_by_player() {
        let two = NodeKeys::new(NodeRole::Two, NODE2.to_vec(), NODE1.to_vec());
        let fixed = two.as_fixed();
        assert_eq!(fixed.player1, NODE1);
        assert_eq!(fixed.player2, NODE2);
    }

    #[test]
    fn test_dynamic_view_agrees_with_node_view() {
        let session_id = SessionId::generate();
        let node_view = node("2")
            .generate_key_session(session_id.clone(), &b64::encode(MOBILE))
            .unwrap();
        let mobile_view = SessionConfig::dynamic_party(
            session_id.clone(),
            OperationKind::GenerateKey,
            MOBILE.to_vec(),
        );
        let imposter_view = SessionConfig::dynamic_party(
            session_id,
            OperationKind::GenerateKey,
            b"imposter".to_vec(),
        );

        assert!(mobile_view.agrees_with(&node_view));
        assert!(node_view.agrees_with(&mobile_view));
        assert!(!imposter_view.agrees_with(&node_view));
    }

    #[test]
    fn test_config_json_roundtrips_keys_as_base64() {
        let config = node("1")
            .presign_session(SessionId::generate(), &b64::encode(MOBILE))
            .unwrap();
        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(json["kind"], "preSign");
        assert_eq!(json["dynamicPublicKeys"]["0"], b64::encode(MOBILE));

        let back: SessionConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}
