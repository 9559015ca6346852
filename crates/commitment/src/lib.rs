//! Pedersen vector commitment and Schnorr sigma protocol with Fiat-Shamir
//! (§4.E), used during anonymous credential issuance.

#![allow(clippy::arithmetic_side_effects)]

use halp_params::PublicParameters;
use halp_primitives::{
    g1_add, g1_negate, g1_scalar_mul, g1_to_compressed, sample_secret_scalar,
    scalar_from_be_bytes_mod_order, scalar_to_be_bytes, FrBls, G1Bls, G1_COMPRESSED_BYTES,
};
use halp_types::Error;
use sha2::{Digest, Sha256};

const CHALLENGE_DST: &[u8] = b"BBS_COMMITMENT_CHALLENGE_V1";

/// A credential attribute before it is folded into the Pedersen commitment.
/// Encoding is stable across issuer and holder: strings hash to `Fr_bls` via
/// SHA-256 reduced, integers cast directly mod q, booleans map to `{0,1}`.
#[derive(Debug, Clone)]
pub enum AttributeValue {
    /// Hashed via SHA-256 reduced mod `q`.
    Str(String),
    /// Cast directly into the scalar field.
    Int(u64),
    /// Mapped to `{0, 1}`.
    Bool(bool),
}

impl AttributeValue {
    /// Encodes this attribute the way both issuer and holder must, so the
    /// same claim always folds into the same commitment scalar.
    pub fn to_scalar(&self) -> FrBls {
        match self {
            AttributeValue::Str(s) => {
                let digest = Sha256::digest(s.as_bytes());
                scalar_from_be_bytes_mod_order(&digest)
            }
            AttributeValue::Int(n) => FrBls::from(*n),
            AttributeValue::Bool(b) => FrBls::from(u64::from(*b)),
        }
    }
}

/// `C = G^ms . prod H_i^a_i . H_r^r`, returned as compressed G1 bytes
/// alongside the blinding factor actually used.
pub struct Commitment {
    /// Compressed G1 point `C`.
    pub bytes: [u8; G1_COMPRESSED_BYTES],
    /// Blinding factor used to produce `C`.
    pub r: FrBls,
}

fn linear_combination(
    params: &PublicParameters,
    ms: &FrBls,
    attrs: &[FrBls],
    r: &FrBls,
) -> G1Bls {
    let mut acc = g1_scalar_mul(&params.g, ms);
    for (h_i, a_i) in params.h_attrs.iter().zip(attrs.iter()) {
        acc = g1_add(&acc, &g1_scalar_mul(h_i, a_i));
    }
    g1_add(&acc, &g1_scalar_mul(&params.h_r, r))
}

/// `createCommitment(ms, attrs[], r?) -> (C, r)`. Samples `r` fresh when not
/// supplied. Fails with `TooManyAttributes` when `|attrs| > k`.
pub fn create_commitment(
    params: &PublicParameters,
    ms: &FrBls,
    attrs: &[FrBls],
    r: Option<FrBls>,
) -> Result<Commitment, Error> {
    if attrs.len() > params.max_attributes {
        return Err(Error::TooManyAttributes {
            count: attrs.len(),
            max: params.max_attributes,
        });
    }
    let r = r.unwrap_or_else(|| sample_secret_scalar(&mut rand::rngs::OsRng));
    let c = linear_combination(params, ms, attrs, &r);
    Ok(Commitment {
        bytes: g1_to_compressed(&c),
        r,
    })
}

/// `ctx = SHA256(did || schemaId || nonce)`.
pub fn compute_context(did: &str, schema_id: &str, nonce: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(did.as_bytes());
    hasher.update(schema_id.as_bytes());
    hasher.update(nonce);
    hasher.finalize().into()
}

/// `{ C, T, c, responses[0..n+1], nonce }`.
#[derive(Debug, Clone)]
pub struct SchnorrProof {
    /// The commitment being proven.
    pub c_point: [u8; G1_COMPRESSED_BYTES],
    /// Prover's randomized commitment `T`.
    pub t_point: [u8; G1_COMPRESSED_BYTES],
    /// Fiat-Shamir challenge `c`.
    pub challenge: FrBls,
    /// Fixed order: `[s_ms, s_a1, .., s_ak, s_r]`.
    pub responses: Vec<FrBls>,
    /// Random nonce mixed into the Fiat-Shamir challenge derivation.
    pub nonce: [u8; 32],
}

fn fiat_shamir_challenge(
    c_point: &[u8; G1_COMPRESSED_BYTES],
    t_point: &[u8; G1_COMPRESSED_BYTES],
    ctx: &[u8],
    nonce: &[u8; 32],
) -> FrBls {
    let mut hasher = Sha256::new();
    hasher.update(CHALLENGE_DST);
    hasher.update(c_point);
    hasher.update(t_point);
    hasher.update(ctx);
    hasher.update(nonce);
    scalar_from_be_bytes_mod_order(&hasher.finalize())
}

/// `generateProof(ms, attrs[], r, C, ctx) -> SchnorrProof`.
pub fn generate_proof(
    params: &PublicParameters,
    ms: &FrBls,
    attrs: &[FrBls],
    r: &FrBls,
    c_point: &[u8; G1_COMPRESSED_BYTES],
    ctx: &[u8],
) -> Result<SchnorrProof, Error> {
    if attrs.len() > params.max_attributes {
        return Err(Error::TooManyAttributes {
            count: attrs.len(),
            max: params.max_attributes,
        });
    }

    let mut rng = rand::rngs::OsRng;
    let r_ms: FrBls = sample_secret_scalar(&mut rng);
    let r_attrs: Vec<FrBls> = (0..attrs.len()).map(|_| sample_secret_scalar(&mut rng)).collect();
    let r_r: FrBls = sample_secret_scalar(&mut rng);

    let t = linear_combination(params, &r_ms, &r_attrs, &r_r);
    let t_point = g1_to_compressed(&t);

    let mut nonce = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rng, &mut nonce);

    let challenge = fiat_shamir_challenge(c_point, &t_point, ctx, &nonce);

    let mut responses = Vec::with_capacity(attrs.len() + 2);
    responses.push(r_ms + challenge * ms);
    for (r_i, a_i) in r_attrs.iter().zip(attrs.iter()) {
        responses.push(*r_i + challenge * a_i);
    }
    responses.push(r_r + challenge * r);

    Ok(SchnorrProof {
        c_point: *c_point,
        t_point,
        challenge,
        responses,
        nonce,
    })
}

/// `verifyProof(proof, ctx, numAttrs) -> bool`. Rejects when
/// `|responses| != numAttrs + 2`.
pub fn verify_proof(
    params: &PublicParameters,
    proof: &SchnorrProof,
    ctx: &[u8],
    num_attrs: usize,
) -> Result<bool, Error> {
    if proof.responses.len() != num_attrs + 2 {
        return Ok(false);
    }
    if num_attrs > params.max_attributes {
        return Err(Error::TooManyAttributes {
            count: num_attrs,
            max: params.max_attributes,
        });
    }

    let s_ms = proof.responses[0];
    let s_attrs = &proof.responses[1..=num_attrs];
    let s_r = proof.responses[num_attrs + 1];

    let c = halp_primitives::g1_from_compressed(&proof.c_point)?;
    let neg_c_to_challenge = g1_scalar_mul(&c, &proof.challenge);

    let mut t_prime = g1_scalar_mul(&params.g, &s_ms);
    for (h_i, s_i) in params.h_attrs.iter().zip(s_attrs.iter()) {
        t_prime = g1_add(&t_prime, &g1_scalar_mul(h_i, s_i));
    }
    t_prime = g1_add(&t_prime, &g1_scalar_mul(&params.h_r, &s_r));
    t_prime = g1_add(&t_prime, &g1_negate(&neg_c_to_challenge));

    let t_prime_bytes = g1_to_compressed(&t_prime);
    let challenge_prime = fiat_shamir_challenge(&proof.c_point, &t_prime_bytes, ctx, &proof.nonce);

    Ok(constant_time_scalar_eq(&proof.challenge, &challenge_prime))
}

fn constant_time_scalar_eq(a: &FrBls, b: &FrBls) -> bool {
    let a_bytes = scalar_to_be_bytes(a);
    let b_bytes = scalar_to_be_bytes(b);
    let mut diff = 0u8;
    for (x, y) in a_bytes.iter().zip(b_bytes.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_params() -> PublicParameters {
        PublicParameters::generate(3, 0)
    }

    #[test]
    fn proof_round_trips() {
        let params = fixture_params();
        let ms = FrBls::from(0x01u64);
        let attrs = vec![FrBls::from(10u64), FrBls::from(20u64)];
        let r = FrBls::from(0x02u64);
        let commitment = create_commitment(&params, &ms, &attrs, Some(r)).unwrap();
        let ctx = compute_context("did:example:alice", "StudentCredential", b"nonce");
        let proof = generate_proof(&params, &ms, &attrs, &r, &commitment.bytes, &ctx).unwrap();
        assert!(verify_proof(&params, &proof, &ctx, attrs.len()).unwrap());
    }

    #[test]
    fn too_many_attributes_is_rejected() {
        let params = fixture_params();
        let ms = FrBls::from(1u64);
        let attrs = vec![FrBls::from(1u64); params.max_attributes + 1];
        let err = create_commitment(&params, &ms, &attrs, None).unwrap_err();
        assert!(matches!(err, Error::TooManyAttributes { .. }));
    }

    #[test]
    fn off_by_one_response_is_rejected() {
        let params = fixture_params();
        let ms = FrBls::from(1u64);
        let attrs = vec![FrBls::from(5u64)];
        let r = FrBls::from(2u64);
        let commitment = create_commitment(&params, &ms, &attrs, Some(r)).unwrap();
        let ctx = compute_context("did:example:alice", "StudentCredential", b"nonce");
        let mut proof = generate_proof(&params, &ms, &attrs, &r, &commitment.bytes, &ctx).unwrap();
        proof.responses[0] += FrBls::from(1u64);
        assert!(!verify_proof(&params, &proof, &ctx, attrs.len()).unwrap());
    }

    #[test]
    fn wrong_response_count_is_rejected() {
        let params = fixture_params();
        let ms = FrBls::from(1u64);
        let attrs = vec![FrBls::from(5u64)];
        let r = FrBls::from(2u64);
        let commitment = create_commitment(&params, &ms, &attrs, Some(r)).unwrap();
        let ctx = compute_context("did:example:alice", "StudentCredential", b"nonce");
        let mut proof = generate_proof(&params, &ms, &attrs, &r, &commitment.bytes, &ctx).unwrap();
        proof.responses.pop();
        assert!(!verify_proof(&params, &proof, &ctx, attrs.len()).unwrap());
    }

    #[test]
    fn mismatched_context_is_rejected() {
        let params = fixture_params();
        let ms = FrBls::from(1u64);
        let attrs = vec![FrBls::from(5u64)];
        let r = FrBls::from(2u64);
        let commitment = create_commitment(&params, &ms, &attrs, Some(r)).unwrap();
        let ctx = compute_context("did:example:alice", "StudentCredential", b"nonce");
        let proof = generate_proof(&params, &ms, &attrs, &r, &commitment.bytes, &ctx).unwrap();
        let other_ctx = compute_context("did:example:bob", "StudentCredential", b"nonce");
        assert!(!verify_proof(&params, &proof, &other_ctx, attrs.len()).unwrap());
    }

    #[test]
    fn attribute_encoding_is_stable() {
        let a = AttributeValue::Str("S-1".to_string());
        let b = AttributeValue::Str("S-1".to_string());
        assert_eq!(a.to_scalar(), b.to_scalar());
        assert_eq!(AttributeValue::Bool(true).to_scalar(), FrBls::from(1u64));
        assert_eq!(AttributeValue::Bool(false).to_scalar(), FrBls::from(0u64));
    }
}
