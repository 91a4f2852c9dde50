//! Session configuration value shared with the signing engine

use crate::types::{b64, OperationKind, PlayerIndex, SessionId, DYNAMIC_PLAYER, SIGNER_PLAYER};
use crate::{DEFAULT_CURVE, DEFAULT_THRESHOLD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Everything the signing engine needs to run one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Shared rendezvous identifier
    pub session_id: SessionId,

    /// Operation the session was minted for
    pub kind: OperationKind,

    /// Participating player indices, ascending
    pub players: Vec<PlayerIndex>,

    /// Player index → public key used to authenticate that player
    #[serde(with = "key_map_serde")]
    pub dynamic_public_keys: BTreeMap<PlayerIndex, Vec<u8>>,

    /// Security threshold of the key
    pub threshold: usize,

    /// Curve name understood by the engine
    pub curve: String,
}

impl SessionConfig {
    /// Key generation / key copy session over players {0, 1, 2}
    pub fn keygen(
        session_id: SessionId,
        kind: OperationKind,
        dynamic_public_key: Vec<u8>,
        player1_public_key: Vec<u8>,
        player2_public_key: Vec<u8>,
    ) -> Self {
        let mut keys = BTreeMap::new();
        keys.insert(DYNAMIC_PLAYER, dynamic_public_key);
        keys.insert(1, player1_public_key);
        keys.insert(2, player2_public_key);
        Self::with_keys(session_id, kind, keys)
    }

    /// Presign / sign session over players {0, 1}
    pub fn sign(
        session_id: SessionId,
        dynamic_public_key: Vec<u8>,
        signer_public_key: Vec<u8>,
    ) -> Self {
        let mut keys = BTreeMap::new();
        keys.insert(DYNAMIC_PLAYER, dynamic_public_key);
        keys.insert(SIGNER_PLAYER, signer_public_key);
        Self::with_keys(session_id, OperationKind::PreSign, keys)
    }

    /// The mobile participant's view: it only knows its own key.
    pub fn dynamic_party(
        session_id: SessionId,
        kind: OperationKind,
        dynamic_public_key: Vec<u8>,
    ) -> Self {
        let mut keys = BTreeMap::new();
        keys.insert(DYNAMIC_PLAYER, dynamic_public_key);
        Self::with_keys(session_id, kind, keys)
    }

    fn with_keys(
        session_id: SessionId,
        kind: OperationKind,
        dynamic_public_keys: BTreeMap<PlayerIndex, Vec<u8>>,
    ) -> Self {
        Self {
            session_id,
            kind,
            players: kind.players().to_vec(),
            dynamic_public_keys,
            threshold: DEFAULT_THRESHOLD,
            curve: DEFAULT_CURVE.to_string(),
        }
    }

    /// Override the curve name
    pub fn with_curve(mut self, curve: impl Into<String>) -> Self {
        self.curve = curve.into();
        self
    }

    pub fn contains(&self, player: PlayerIndex) -> bool {
        self.players.contains(&player)
    }

    /// SHA-256 over a canonical encoding, hex encoded.
    ///
    /// Two parties that derived the same configuration always produce the
    /// same digest.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.session_id.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.kind.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update((self.players.len() as u32).to_be_bytes());
        for player in &self.players {
            hasher.update((*player as u32).to_be_bytes());
        }
        hasher.update((self.dynamic_public_keys.len() as u32).to_be_bytes());
        for (player, key) in &self.dynamic_public_keys {
            hasher.update((*player as u32).to_be_bytes());
            hasher.update((key.len() as u32).to_be_bytes());
            hasher.update(key);
        }
        hasher.update((self.threshold as u32).to_be_bytes());
        hasher.update(self.curve.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// SHA-256 fingerprint of each mapped key, safe to log
    pub fn key_fingerprints(&self) -> BTreeMap<PlayerIndex, String> {
        self.dynamic_public_keys
            .iter()
            .map(|(player, key)| (*player, hex::encode(Sha256::digest(key))))
            .collect()
    }

    /// Whether two parties' views describe the same session.
    ///
    /// Views may map different subsets of players, but every player both map
    /// must be mapped to the same key.
    pub fn agrees_with(&self, other: &SessionConfig) -> bool {
        self.session_id == other.session_id
            && self.kind == other.kind
            && self.players == other.players
            && self.threshold == other.threshold
            && self.curve == other.curve
            && self
                .dynamic_public_keys
                .iter()
                .all(|(player, key)| match other.dynamic_public_keys.get(player) {
                    Some(theirs) => theirs == key,
                    None => true,
                })
    }
}

mod key_map_serde {
    use super::b64;
    use crate::PlayerIndex;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S>(map: &BTreeMap<PlayerIndex, Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded: BTreeMap<PlayerIndex, String> =
            map.iter().map(|(k, v)| (*k, b64::encode(v))).collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<PlayerIndex, Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: BTreeMap<PlayerIndex, String> = BTreeMap::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|(k, v)| {
                b64::decode_field("dynamicPublicKeys", &v)
                    .map(|bytes| (k, bytes))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}
