//! Threshold Schnorr arithmetic over secp256k1
//!
//! Keys are Shamir-shared with a degree-`threshold` polynomial evaluated at
//! `player + 1`. Presignatures hold additive nonce shares, so a partial
//! signature is `s_i = k_i + e * λ_i * x_i` and the final response is the
//! plain sum of the partial responses.
//!
//! Partial signature fragment layout:
//! `player (1) || R (33) || s_i (32) || SHA-256(message hash) (32)`.

use crate::{Error, PlayerIndex, Result, Signature};
use k256::{
    elliptic_curve::{
        bigint::U256,
        ops::Reduce,
        sec1::{FromEncodedPoint, ToEncodedPoint},
        Field,
    },
    AffinePoint, EncodedPoint, ProjectivePoint, Scalar,
};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

const FRAGMENT_LEN: usize = 1 + 33 + 32 + 32;

/// Sample a uniformly random scalar
pub(crate) fn random_scalar() -> Scalar {
    Scalar::random(&mut OsRng)
}

/// Share `secret` among `players` with a random polynomial of degree `threshold`
pub(crate) fn split_secret(
    secret: Scalar,
    threshold: usize,
    players: &[PlayerIndex],
) -> BTreeMap<PlayerIndex, Scalar> {
    let mut coefficients = Vec::with_capacity(threshold + 1);
    coefficients.push(secret);
    for _ in 0..threshold {
        coefficients.push(random_scalar());
    }

    players
        .iter()
        .map(|player| (*player, evaluate_polynomial(&coefficients, *player as u64 + 1)))
        .collect()
}

/// Recover the shared secret from at least `threshold + 1` shares
pub(crate) fn combine_shares(shares: &BTreeMap<PlayerIndex, Scalar>) -> Result<Scalar> {
    let players: Vec<PlayerIndex> = shares.keys().copied().collect();
    shares.iter().try_fold(Scalar::ZERO, |acc, (player, share)| {
        Ok(acc + *share * lagrange_coefficient(*player, &players)?)
    })
}

/// Evaluate polynomial at a point
fn evaluate_polynomial(coefficients: &[Scalar], x: u64) -> Scalar {
    let x_scalar = Scalar::from(x);
    let mut result = Scalar::ZERO;
    let mut x_power = Scalar::ONE;

    for coef in coefficients {
        result += *coef * x_power;
        x_power *= x_scalar;
    }

    result
}

/// Lagrange coefficient at zero for `player` within `players`.
///
/// `players` must hold distinct indices and include `player`.
pub(crate) fn lagrange_coefficient(player: PlayerIndex, players: &[PlayerIndex]) -> Result<Scalar> {
    let distinct: BTreeSet<&PlayerIndex> = players.iter().collect();
    if distinct.len() != players.len() {
        return Err(Error::engine(format!("signer set {players:?} repeats a player")));
    }
    if !distinct.contains(&player) {
        return Err(Error::engine(format!("player {player} is not in signer set {players:?}")));
    }

    let i = player as u64 + 1;
    let mut numerator = Scalar::ONE;
    let mut denominator = Scalar::ONE;

    for &other in players {
        let j = other as u64 + 1;
        if j != i {
            numerator *= Scalar::from(j);
            let diff = if j > i {
                Scalar::from(j - i)
            } else {
                -Scalar::from(i - j)
            };
            denominator *= diff;
        }
    }

    Option::<Scalar>::from(denominator.invert())
        .map(|inverse| numerator * inverse)
        .ok_or_else(|| Error::engine(format!("signer set {players:?} has no Lagrange basis")))
}

/// Compressed SEC1 encoding of `scalar * G`
pub(crate) fn public_point(scalar: &Scalar) -> Vec<u8> {
    encode_point(&(ProjectivePoint::GENERATOR * scalar))
}

pub(crate) fn encode_point(point: &ProjectivePoint) -> Vec<u8> {
    point.to_affine().to_encoded_point(true).as_bytes().to_vec()
}

fn decode_point(bytes: &[u8]) -> Result<ProjectivePoint> {
    let encoded = EncodedPoint::from_bytes(bytes)
        .map_err(|e| Error::engine(format!("invalid point encoding: {e}")))?;
    let affine = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
        .ok_or_else(|| Error::engine("point is not on the curve"))?;
    Ok(ProjectivePoint::from(affine))
}

fn scalar_from_bytes(bytes: &[u8]) -> Result<Scalar> {
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::engine("invalid scalar length"))?;
    Ok(<Scalar as Reduce<U256>>::reduce_bytes(&array.into()))
}

/// Fiat-Shamir challenge `e = H(R || P || m)`
pub(crate) fn challenge(r: &[u8], public_key: &[u8], message_hash: &[u8]) -> Scalar {
    let mut hasher = Sha256::new();
    hasher.update(r);
    hasher.update(public_key);
    hasher.update(message_hash);
    let digest: [u8; 32] = hasher.finalize().into();
    <Scalar as Reduce<U256>>::reduce_bytes(&digest.into())
}

/// Build one player's signature fragment
pub(crate) fn partial_fragment(
    player: PlayerIndex,
    r: &[u8],
    nonce_share: Scalar,
    lagrange: Scalar,
    key_share: Scalar,
    public_key: &[u8],
    message_hash: &[u8],
) -> Vec<u8> {
    let e = challenge(r, public_key, message_hash);
    let s_i = nonce_share + e * lagrange * key_share;

    let mut fragment = Vec::with_capacity(FRAGMENT_LEN);
    fragment.push(player as u8);
    fragment.extend_from_slice(r);
    fragment.extend_from_slice(&s_i.to_bytes());
    fragment.extend_from_slice(&Sha256::digest(message_hash));
    fragment
}

struct Fragment<'a> {
    player: u8,
    r: &'a [u8],
    s: Scalar,
    message_digest: &'a [u8],
}

fn parse_fragment(bytes: &[u8]) -> Result<Fragment<'_>> {
    if bytes.len() != FRAGMENT_LEN {
        return Err(Error::engine(format!(
            "partial signature must be {FRAGMENT_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(Fragment {
        player: bytes[0],
        r: &bytes[1..34],
        s: scalar_from_bytes(&bytes[34..66])?,
        message_digest: &bytes[66..],
    })
}

/// Combine partial signatures computed from one presignature into a signature
pub fn finalize_signature(message_hash: &[u8], partials: &[Vec<u8>]) -> Result<Signature> {
    if partials.len() < 2 {
        return Err(Error::engine(format!(
            "at least 2 partial signatures are required, got {}",
            partials.len()
        )));
    }

    let fragments = partials
        .iter()
        .map(|p| parse_fragment(p))
        .collect::<Result<Vec<_>>>()?;

    let expected_digest = Sha256::digest(message_hash);
    let r = fragments[0].r;
    let mut seen = Vec::with_capacity(fragments.len());
    let mut s = Scalar::ZERO;

    for fragment in &fragments {
        if fragment.r != r {
            return Err(Error::engine(
                "partial signatures were produced from different presignatures",
            ));
        }
        if fragment.message_digest != expected_digest.as_slice() {
            return Err(Error::engine(
                "partial signature was produced over a different message",
            ));
        }
        if seen.contains(&fragment.player) {
            return Err(Error::engine(format!(
                "duplicate partial signature from player {}",
                fragment.player
            )));
        }
        seen.push(fragment.player);
        s += fragment.s;
    }

    // Reject anything that is not a point before handing it out.
    decode_point(r)?;

    let mut s_bytes = [0u8; 32];
    s_bytes.copy_from_slice(&s.to_bytes());
    Ok(Signature::new(r.to_vec(), s_bytes))
}

/// Check `s * G == R + e * P`
pub fn verify_signature(public_key: &[u8], message_hash: &[u8], signature: &Signature) -> Result<()> {
    let p = decode_point(public_key)?;
    let r = decode_point(&signature.r)?;
    let s = scalar_from_bytes(&signature.s)?;
    let e = challenge(&signature.r, public_key, message_hash);

    let expected = ProjectivePoint::GENERATOR * s;
    let actual = r + p * e;

    if expected != actual {
        return Err(Error::engine("signature verification failed"));
    }
    Ok(())
}
