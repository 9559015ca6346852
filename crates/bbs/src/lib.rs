//! BBS+ signing, verification, and selective-disclosure proof of knowledge
//! (§4.F), built directly on `ark-bls12-381` rather than an independent
//! pairing crate so it shares scalar/point types with `halp-commitment`.
//!
//! No published crate compatible with the `ark-*` stack implements BBS+, so
//! this is a from-scratch Camenisch-Lysyanskaya-style BBS+ signature with the
//! classic two-equation proof-of-knowledge for selective disclosure,
//! following the construction widely described for "BBS+ signature proof of
//! knowledge" (the variant underlying Hyperledger AnonCreds / the draft BBS+
//! signature scheme). The pairing-check shape (`e(A, B) == e(C, D)`) is the
//! same accumulator witness-verification pattern seen in other pairing-based
//! credential code, adapted to arkworks' `Pairing` trait.

#![allow(clippy::arithmetic_side_effects)]

use std::collections::BTreeMap;

use ark_bls12_381::{Bls12_381, Fr, G1Projective, G2Projective};
use ark_ec::pairing::Pairing;
use ark_ec::{CurveGroup, Group};
use ark_ff::{Field, Zero};
use ark_std::UniformRand;
use halp_primitives::{sample_secret_scalar, scalar_from_be_bytes_mod_order, scalar_to_be_bytes};
use halp_types::Error;
use sha2::{Digest, Sha256};

const BLINDING_GENERATOR_DST: &[u8] = b"BBS_SIG_BLINDING_GENERATOR_V1";
const MESSAGE_GENERATOR_DST_PREFIX: &str = "BBS_SIG_GENERATOR_";
const MESSAGE_GENERATOR_DST_SUFFIX: &str = "_V1";
const CHALLENGE_DST: &[u8] = b"BBS_SIG_POK_CHALLENGE_V1";

fn h0() -> G1Projective {
    halp_primitives::hash_to_curve_g1(BLINDING_GENERATOR_DST, b"")
}

/// The `i`-th message generator (`i` is 0-based). Generators are derived
/// deterministically via hash-to-curve, so the message vector length is not
/// bounded by any stored parameter set.
fn h_message(i: usize) -> G1Projective {
    let dst = format!("{MESSAGE_GENERATOR_DST_PREFIX}{i}{MESSAGE_GENERATOR_DST_SUFFIX}");
    halp_primitives::hash_to_curve_g1(dst.as_bytes(), b"")
}

/// Encodes a raw message byte-string to `Fr_bls` the same way attribute
/// strings are encoded in `halp-commitment`: SHA-256 reduced modulo the
/// field order. Issuer and holder must hash bit-identical byte vectors for
/// `sign`/`verify` to agree (§4.F).
pub fn message_to_scalar(message: &[u8]) -> Fr {
    let digest = Sha256::digest(message);
    scalar_from_be_bytes_mod_order(&digest)
}

/// `keygen() -> BlsKeyPair`.
#[derive(Clone)]
pub struct BlsKeyPair {
    /// Issuer signing secret.
    pub secret_key: Fr,
    /// Corresponding BLS12-381 G2 public key.
    pub public_key: G2Projective,
}

impl BlsKeyPair {
    /// Samples a fresh keypair: a random scalar secret key and its
    /// corresponding BLS12-381 G2 public key.
    pub fn generate<R: rand::RngCore + rand::CryptoRng>(rng: &mut R) -> Self {
        let secret_key: Fr = sample_secret_scalar(rng);
        let public_key = G2Projective::generator() * secret_key;
        BlsKeyPair {
            secret_key,
            public_key,
        }
    }

    /// The public half, safe to persist alongside a credential record
    /// without the issuer's signing secret.
    pub fn public(&self) -> BlsPublicKey {
        BlsPublicKey {
            point: self.public_key,
        }
    }
}

/// Convenience wrapper around [`BlsKeyPair::generate`] seeded from the OS RNG.
pub fn keygen() -> BlsKeyPair {
    BlsKeyPair::generate(&mut rand::rngs::OsRng)
}

/// The issuer's public key alone — what a verifier (or a stored credential
/// record) needs, as opposed to [`BlsKeyPair`] which also carries the
/// signing secret.
#[derive(Clone, Copy, Debug)]
pub struct BlsPublicKey {
    /// The public G2 point.
    pub point: G2Projective,
}

impl From<&BlsKeyPair> for BlsPublicKey {
    fn from(kp: &BlsKeyPair) -> Self {
        kp.public()
    }
}

/// Opaque issuer signature over a message vector.
#[derive(Clone, Debug)]
pub struct BbsSignature {
    /// `A = B^{1/(sk+e)}`.
    pub a: G1Projective,
    /// Per-signature random exponent.
    pub e: Fr,
    /// Per-signature blinding scalar.
    pub s: Fr,
}

/// `B = g1 . h0^s . prod h_i^m_i`, the value BBS+ actually signs.
fn compute_b(messages: &[Fr], s: Fr) -> G1Projective {
    let mut acc = G1Projective::generator() + h0() * s;
    for (i, m) in messages.iter().enumerate() {
        acc += h_message(i) * m;
    }
    acc
}

/// `sign(messages[]) -> sig`.
pub fn sign(sk: &BlsKeyPair, messages: &[Fr]) -> Result<BbsSignature, Error> {
    let mut rng = rand::rngs::OsRng;
    let e: Fr = sample_secret_scalar(&mut rng);
    let s: Fr = sample_secret_scalar(&mut rng);
    let b = compute_b(messages, s);
    let exponent = (sk.secret_key + e)
        .inverse()
        .ok_or(Error::Internal)?;
    let a = b * exponent;
    Ok(BbsSignature { a, e, s })
}

/// `verify(pk, messages[], sig) -> bool`. Checks `e(A, w . g2^e) == e(B, g2)`.
pub fn verify(pk: &BlsPublicKey, messages: &[Fr], sig: &BbsSignature) -> Result<bool, Error> {
    let b = compute_b(messages, sig.s);
    let g2 = G2Projective::generator();
    let lhs_g2 = (pk.point + g2 * sig.e).into_affine();
    let rhs = Bls12_381::pairing(sig.a.into_affine(), lhs_g2);
    let lhs = Bls12_381::pairing(b.into_affine(), g2.into_affine());
    Ok(lhs == rhs)
}

/// A selective-disclosure proof of knowledge of a BBS+ signature that
/// validates over a full message vector, revealing only a chosen subset.
///
/// Construction: the prover randomizes `A` into `A' = A^r1` and
/// `Abar = A'^x = B^r1 . A'^{-e}` (computable without knowing `x`), and a
/// blinded commitment `d = B^r1 . h0^{-r2}`. The core unforgeability check
/// is the public pairing relation `e(Abar, g2) == e(A', w)`; two Schnorr
/// multi-base proofs (sharing one Fiat-Shamir challenge) then prove
/// knowledge of `(e, r2)` linking `Abar/d` to `A'`/`h0`, and of
/// `(r3 = 1/r1, s' = s - r2.r3, {m_i}_hidden)` linking `d` back to the
/// revealed messages, without storing the Schnorr commitments: the verifier
/// recomputes them from the responses and challenge, the same pattern
/// `halp-commitment::verify_proof` uses for its own Fiat-Shamir check.
#[derive(Clone, Debug)]
pub struct SelectiveDisclosureProof {
    /// Randomized `A' = A^r1`.
    pub a_prime: G1Projective,
    /// `Abar = A'^x = B^r1 . A'^{-e}`.
    pub a_bar: G1Projective,
    /// Blinded commitment `d = B^r1 . h0^{-r2}`.
    pub d: G1Projective,
    /// Shared Fiat-Shamir challenge binding both linked Schnorr proofs.
    pub challenge: Fr,
    /// Schnorr response for `e`.
    pub resp_e: Fr,
    /// Schnorr response for `r2`.
    pub resp_r2: Fr,
    /// Schnorr response for `r3 = 1/r1`.
    pub resp_r3: Fr,
    /// Schnorr response for `s' = s - r2.r3`.
    pub resp_s_prime: Fr,
    /// Responses for hidden messages, in ascending index order.
    pub resp_hidden: Vec<Fr>,
    /// Indices of messages not revealed, ascending, matching `resp_hidden`.
    pub hidden_indices: Vec<usize>,
}

fn pok_challenge(
    a_prime: &G1Projective,
    a_bar: &G1Projective,
    d: &G1Projective,
    t1: &G1Projective,
    t2: &G1Projective,
    nonce: &[u8],
) -> Fr {
    use ark_serialize::CanonicalSerialize;
    let mut hasher = Sha256::new();
    hasher.update(CHALLENGE_DST);
    for point in [a_prime, a_bar, d, t1, t2] {
        let mut buf = Vec::new();
        point
            .into_affine()
            .serialize_compressed(&mut buf)
            .expect("G1Affine serializes");
        hasher.update(&buf);
    }
    hasher.update(nonce);
    scalar_from_be_bytes_mod_order(&hasher.finalize())
}

/// `createProof(sig, pk, messages[], revealedIndices[], nonce) -> proof`.
pub fn create_proof(
    sig: &BbsSignature,
    messages: &[Fr],
    revealed_indices: &[usize],
    nonce: &[u8],
) -> Result<SelectiveDisclosureProof, Error> {
    let mut rng = rand::rngs::OsRng;
    let r1: Fr = loop {
        let candidate: Fr = sample_secret_scalar(&mut rng);
        if !candidate.is_zero() {
            break candidate;
        }
    };
    let r2: Fr = sample_secret_scalar(&mut rng);
    let r3 = r1.inverse().ok_or(Error::Internal)?;

    let b = compute_b(messages, sig.s);
    let a_prime = sig.a * r1;
    let a_bar = b * r1 - a_prime * sig.e;
    let d = b * r1 - h0() * r2;
    let s_prime = sig.s - r2 * r3;

    let revealed: BTreeMap<usize, Fr> = revealed_indices
        .iter()
        .map(|&i| (i, messages[i]))
        .collect();
    let hidden_indices: Vec<usize> = (0..messages.len())
        .filter(|i| !revealed.contains_key(i))
        .collect();

    // Blinding factors for the two Schnorr relations.
    let blind_e: Fr = Fr::rand(&mut rng);
    let blind_r2: Fr = Fr::rand(&mut rng);
    let blind_r3: Fr = Fr::rand(&mut rng);
    let blind_s_prime: Fr = Fr::rand(&mut rng);
    let blind_hidden: Vec<Fr> = hidden_indices.iter().map(|_| Fr::rand(&mut rng)).collect();

    // T1 for `Abar/d = A'^{-e} . h0^{r2}`.
    let t1 = a_prime * (-blind_e) + h0() * blind_r2;

    // T2 for `g1^{-1} . prod_{revealed} h_i^{-m_i} = d^{-r3} . h0^{s'} . prod_{hidden} h_i^{m_i}`.
    let mut t2 = d * (-blind_r3) + h0() * blind_s_prime;
    for (idx, blind_m) in hidden_indices.iter().zip(blind_hidden.iter()) {
        t2 += h_message(*idx) * blind_m;
    }

    let challenge = pok_challenge(&a_prime, &a_bar, &d, &t1, &t2, nonce);

    let resp_e = blind_e + challenge * sig.e;
    let resp_r2 = blind_r2 + challenge * r2;
    let resp_r3 = blind_r3 + challenge * r3;
    let resp_s_prime = blind_s_prime + challenge * s_prime;
    let resp_hidden: Vec<Fr> = hidden_indices
        .iter()
        .zip(blind_hidden.iter())
        .map(|(&idx, blind_m)| *blind_m + challenge * messages[idx])
        .collect();

    Ok(SelectiveDisclosureProof {
        a_prime,
        a_bar,
        d,
        challenge,
        resp_e,
        resp_r2,
        resp_r3,
        resp_s_prime,
        resp_hidden,
        hidden_indices,
    })
}

/// `verifyProof(pk, proof, revealedMessages{idx->bytes}, nonce) -> bool`.
///
/// `revealed_messages` carries raw message bytes (the same bit-identical
/// vector entries signing used); they are hashed with [`message_to_scalar`]
/// before the algebraic check.
pub fn verify_proof(
    pk: &BlsPublicKey,
    proof: &SelectiveDisclosureProof,
    revealed_messages: &BTreeMap<usize, Vec<u8>>,
    total_messages: usize,
    nonce: &[u8],
) -> Result<bool, Error> {
    if proof.hidden_indices.len() != proof.resp_hidden.len() {
        return Ok(false);
    }
    if proof.a_prime.is_zero() {
        return Ok(false);
    }

    // Core unforgeability check: e(Abar, g2) == e(A', w).
    let g2 = G2Projective::generator();
    let lhs = Bls12_381::pairing(proof.a_bar.into_affine(), g2.into_affine());
    let rhs = Bls12_381::pairing(proof.a_prime.into_affine(), pk.point.into_affine());
    if lhs != rhs {
        return Ok(false);
    }

    let c = proof.challenge;
    let target1 = proof.a_bar - proof.d;
    let t1_prime = proof.a_prime * (-proof.resp_e) + h0() * proof.resp_r2 - target1 * c;

    let mut target2 = -G1Projective::generator();
    for (idx, bytes) in revealed_messages.iter() {
        if *idx >= total_messages {
            return Ok(false);
        }
        let m = message_to_scalar(bytes);
        target2 -= h_message(*idx) * m;
    }

    let mut t2_prime = proof.d * (-proof.resp_r3) + h0() * proof.resp_s_prime;
    for (idx, resp) in proof.hidden_indices.iter().zip(proof.resp_hidden.iter()) {
        t2_prime += h_message(*idx) * resp;
    }
    t2_prime -= target2 * c;

    let c_prime = pok_challenge(
        &proof.a_prime,
        &proof.a_bar,
        &proof.d,
        &t1_prime,
        &t2_prime,
        nonce,
    );

    let a_bytes = scalar_to_be_bytes(&c);
    let b_bytes = scalar_to_be_bytes(&c_prime);
    let mut diff = 0u8;
    for (x, y) in a_bytes.iter().zip(b_bytes.iter()) {
        diff |= x ^ y;
    }
    Ok(diff == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let sk = keygen();
        let messages: Vec<Fr> = vec![Fr::from(1u64), Fr::from(2u64), Fr::from(3u64)];
        let sig = sign(&sk, &messages).unwrap();
        assert!(verify(&sk.public(), &messages, &sig).unwrap());
    }

    #[test]
    fn tampered_message_fails_verification() {
        let sk = keygen();
        let messages: Vec<Fr> = vec![Fr::from(1u64), Fr::from(2u64)];
        let sig = sign(&sk, &messages).unwrap();
        let mut tampered = messages.clone();
        tampered[0] += Fr::from(1u64);
        assert!(!verify(&sk.public(), &tampered, &sig).unwrap());
    }

    #[test]
    fn selective_disclosure_reveals_only_chosen_indices() {
        let sk = keygen();
        let commitment_bytes = b"fake-commitment-bytes-000000000";
        let m0 = message_to_scalar(commitment_bytes);
        let m1 = message_to_scalar(b"hidden-attribute");
        let messages = vec![m0, m1];
        let sig = sign(&sk, &messages).unwrap();

        let nonce = b"challenge-nonce";
        let proof = create_proof(&sig, &messages, &[0], nonce).unwrap();

        let mut revealed = BTreeMap::new();
        revealed.insert(0, commitment_bytes.to_vec());
        assert!(verify_proof(&sk.public(), &proof, &revealed, messages.len(), nonce).unwrap());
    }

    #[test]
    fn flipped_revealed_byte_is_rejected() {
        let sk = keygen();
        let commitment_bytes = b"fake-commitment-bytes-000000000";
        let m0 = message_to_scalar(commitment_bytes);
        let m1 = message_to_scalar(b"hidden-attribute");
        let messages = vec![m0, m1];
        let sig = sign(&sk, &messages).unwrap();

        let nonce = b"challenge-nonce";
        let proof = create_proof(&sig, &messages, &[0], nonce).unwrap();

        let mut tampered_bytes = commitment_bytes.to_vec();
        tampered_bytes[0] ^= 0xFF;
        let mut revealed = BTreeMap::new();
        revealed.insert(0, tampered_bytes);
        assert!(!verify_proof(&sk.public(), &proof, &revealed, messages.len(), nonce).unwrap());
    }

    #[test]
    fn proof_hides_every_index_not_listed_as_revealed() {
        let sk = keygen();
        let messages = vec![Fr::from(5u64), Fr::from(6u64), Fr::from(7u64)];
        let sig = sign(&sk, &messages).unwrap();
        let proof = create_proof(&sig, &messages, &[0, 2], b"n").unwrap();
        assert_eq!(proof.hidden_indices, vec![1]);
    }
}
