//! Hybrid proof orchestrator (§4.I): derives a session's pseudonym and
//! nullifier from the holder's master secret, assembles the `halp-auth`
//! Groth16 witness, optionally layers a BBS+ selective-disclosure proof on
//! top, and returns the [`HybridAuthPackage`] a verifier checks end-to-end
//! in `halp-pipeline`.
//!
//! Witness assembly uses a plain `prepare_*_witness`-style function
//! returning a typed witness struct, `Result<_, Error>` throughout instead
//! of panicking on malformed input.

// Widening-only conversions (bit/index values into field-element inputs);
// no `From` impl exists between fixed-width and platform-width integers.
// Retry-counter and bit-length bookkeeping below is bounded by
// `MAX_NONCE_RETRIES`/`WITNESS_BOUND_BITS` and never overflows in practice.
#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::arithmetic_side_effects
)]

use ark_bn254::Fr as FrBn254;
use ark_ff::{BigInteger, PrimeField};
use ark_groth16::{Proof, ProvingKey};
use halp_bbs::{BbsSignature, BlsPublicKey, SelectiveDisclosureProof};
use halp_circuit::{CircuitWitness, PublicInputs};
use halp_merkle::{IndexedMerkleLeaf, NonMembershipProof, NullifierRegistry};
use halp_primitives::{scalar_from_be_bytes_mod_order, scalar_to_be_bytes, FrBls};
use halp_types::Error;
use halp_vault::{MasterSecretVault, SecretStore};

/// Number of times [`build_hybrid_auth_package`] will resample the session
/// nonce before giving up, per §4.I step 1.
const MAX_NONCE_RETRIES: u32 = 100;
/// The circuit's comparator only covers 252 bits (§4.H field-size caveat);
/// witness assembly must reject samples at or above this bound.
const WITNESS_BOUND_BITS: u32 = 252;

/// A persisted credential, holding everything the orchestrator needs to
/// reconstruct the SNARK witness and (optionally) a BBS+ disclosure proof
/// without re-deriving them from the original issuance request.
///
/// `commitment_hash` is the BN254 scalar `Poseidon2(ms, blindingFactor)`
/// threaded through both the circuit's public input and, as its 32-byte
/// big-endian encoding, BBS+ message index 0 — see `DESIGN.md` for why this
/// is the canonical "commitment_bytes" of §4.F for the hybrid flow rather
/// than the 48-byte G1 Pedersen commitment used during anonymous issuance.
#[derive(Clone)]
pub struct CredentialRecord {
    /// Issuer-assigned credential identifier.
    pub id: String,
    /// Verifiable-credential JSON the holder stores alongside the signature.
    pub vc_json: String,
    /// Issuer's BBS+ signature over `messages`.
    pub bbs_signature: BbsSignature,
    /// Issuer public key, carried so verification never needs a separate lookup.
    pub issuer_public_key: BlsPublicKey,
    /// Raw message bytes signed by the issuer, index 0 is the 32-byte
    /// encoding of `commitment_hash`.
    pub messages: Vec<Vec<u8>>,
    /// Human-readable labels for `messages`, same length and order.
    pub message_labels: Vec<String>,
    /// BN254 scalar bound into the circuit and BBS+ message 0.
    pub commitment_hash: FrBn254,
    /// Blinding factor used when `commitment_hash` was derived.
    pub blinding_factor: FrBn254,
}

/// `{ challengeId, challenge, snarkProof, publicInputs, bbsProof?,
/// commitmentHash, pseudonym, nullifier, domain, registryRoot, timestamp }`.
#[derive(Clone)]
pub struct HybridAuthPackage {
    /// Identifier of the challenge this package answers.
    pub challenge_id: String,
    /// Challenge scalar bound into the proof.
    pub challenge: FrBls,
    /// Groth16 proof over `HalpAuthCircuit`.
    pub snark_proof: Proof<ark_bn254::Bn254>,
    /// Public inputs the SNARK proof was produced against.
    pub public_inputs: PublicInputs,
    /// Selective-disclosure BBS+ proof, present when a verifier requires it.
    pub bbs_proof: Option<SelectiveDisclosureProof>,
    /// Commitment-hash scalar bound by both the SNARK and BBS+ proof.
    pub commitment_hash: FrBn254,
    /// Context pseudonym produced for this session.
    pub pseudonym: FrBn254,
    /// Nullifier produced for this session.
    pub nullifier: FrBn254,
    /// Domain string the pseudonym and nullifier were derived under.
    pub domain: String,
    /// Nullifier-registry root the non-membership proof was taken against.
    pub registry_root: FrBn254,
    /// Unix-epoch milliseconds the package was produced.
    pub timestamp: u64,
}

/// Reduces a BLS12-381 master-secret scalar into the BN254 scalar field by
/// big-endian byte reduction, the same non-secret-scalar encoding
/// `halp-primitives` uses for domain/context hashes. The master secret
/// itself lives on G1-BLS (§4.C); the circuit's arithmetic is all over
/// BN254 (§4.H), so every witness field derived from `ms` crosses curves
/// through this one reduction.
pub fn ms_as_bn254(ms: &FrBls) -> FrBn254 {
    scalar_from_be_bytes_mod_order(&scalar_to_be_bytes(ms))
}

fn fits_witness_bound(value: &FrBn254) -> bool {
    let bits = value.into_bigint().to_bits_be();
    let leading_zeros = bits.len() - WITNESS_BOUND_BITS as usize;
    bits[..leading_zeros].iter().all(|b| !*b)
}

fn sample_session_nonce<R: rand::RngCore + rand::CryptoRng>(
    rng: &mut R,
    ms_bn254: &FrBn254,
    domain_hash: &FrBn254,
    cred_id_hash: &FrBn254,
) -> Result<(FrBn254, FrBn254, FrBn254), Error> {
    for _ in 0..MAX_NONCE_RETRIES {
        let mut buf = [0u8; 32];
        rng.fill_bytes(&mut buf);
        let nonce = FrBn254::from_be_bytes_mod_order(&buf);

        let pseudonym = halp_poseidon::hash3(*ms_bn254, nonce, *domain_hash);
        let nullifier = halp_poseidon::hash3(*cred_id_hash, nonce, *domain_hash);
        if fits_witness_bound(&pseudonym) && fits_witness_bound(&nullifier) {
            return Ok((nonce, pseudonym, nullifier));
        }
    }
    Err(Error::WitnessOutOfRange)
}

/// Produces the low-nullifier (non-membership) Merkle path used in witness
/// assembly. When the caller has no registry to query (the registry is
/// momentarily unavailable), synthesizes the empty-tree proof with
/// `lowNextValue = 0` — §7's documented fallback, which deliberately causes
/// a verifier to reject on `RegistryRootMismatch` rather than silently
/// bypass freshness.
fn non_membership_for(
    registry: Option<&NullifierRegistry>,
    nullifier: FrBn254,
) -> Result<NonMembershipProof, Error> {
    match registry {
        Some(reg) => reg.non_membership_proof(nullifier),
        None => {
            let empty = NullifierRegistry::new();
            empty.non_membership_proof(nullifier)
        }
    }
}

fn leaf_path_as_fr(proof: &NonMembershipProof) -> (Vec<FrBn254>, Vec<FrBn254>) {
    let siblings = proof.siblings.clone();
    let path_indices = proof
        .path_indices
        .iter()
        .map(|b| FrBn254::from(u64::from(*b)))
        .collect();
    (siblings, path_indices)
}

/// Assembles the full private witness for one session, independent of
/// whether a SNARK is then actually produced — kept separate from
/// [`build_hybrid_auth_package`] so tests can inspect intermediate values
/// the way `transaction_case.rs`'s `prepare_transaction_witness` does.
pub struct AssembledWitness {
    /// Full private witness and fixed-order public inputs.
    pub witness: CircuitWitness,
    /// Session nonce sampled to produce `witness`.
    pub session_nonce: FrBn254,
}

#[allow(clippy::too_many_arguments)]
fn assemble_witness<R: rand::RngCore + rand::CryptoRng>(
    rng: &mut R,
    ms: &FrBls,
    credential: &CredentialRecord,
    domain: &str,
    registry: Option<&NullifierRegistry>,
    challenge: &FrBls,
) -> Result<AssembledWitness, Error> {
    let ms_bn254 = ms_as_bn254(ms);
    let domain_hash = halp_poseidon::hash_string(domain);
    let cred_id_hash = halp_poseidon::hash_string(&credential.id);

    let (session_nonce, pseudonym, nullifier) =
        sample_session_nonce(rng, &ms_bn254, &domain_hash, &cred_id_hash)?;

    let non_membership = non_membership_for(registry, nullifier)?;
    let (siblings, path_indices) = leaf_path_as_fr(&non_membership);

    let challenge_bn254 = ms_as_bn254(challenge);

    let witness = CircuitWitness {
        master_secret: ms_bn254,
        session_nonce,
        domain_hash,
        cred_id_hash,
        blinding_factor: credential.blinding_factor,
        low_value: non_membership.low_value,
        low_next_value: non_membership.low_next_value,
        low_next_idx: FrBn254::from(u64::from(non_membership.low_next_idx)),
        siblings,
        path_indices,
        pseudonym,
        nullifier,
        commitment_hash: credential.commitment_hash,
        registry_root: non_membership.root,
        challenge: challenge_bn254,
    };

    Ok(AssembledWitness {
        witness,
        session_nonce,
    })
}

/// The 32-byte big-endian encoding of `commitment_hash`, used as BBS+
/// message index 0 — see [`CredentialRecord`]'s doc comment.
pub fn commitment_hash_bytes(commitment_hash: &FrBn254) -> [u8; 32] {
    scalar_to_be_bytes(commitment_hash)
}

/// `(holderId, credentialRecord, challenge, revealedIndices[]) ->
/// HybridAuthPackage`, the full §4.I flow.
#[allow(clippy::too_many_arguments)]
pub fn build_hybrid_auth_package<S: SecretStore, R: rand::RngCore + rand::CryptoRng>(
    rng: &mut R,
    vault: &MasterSecretVault<S>,
    holder: &str,
    credential: &CredentialRecord,
    challenge_id: &str,
    challenge: &FrBls,
    domain: &str,
    registry: Option<&NullifierRegistry>,
    revealed_indices: &[usize],
    proving_key: &ProvingKey<ark_bn254::Bn254>,
    timestamp: u64,
) -> Result<HybridAuthPackage, Error> {
    let ms = vault.get(holder)?;

    let assembled = assemble_witness(rng, &ms, credential, domain, registry, challenge)?;
    let public_inputs = PublicInputs {
        pseudonym: assembled.witness.pseudonym,
        nullifier: assembled.witness.nullifier,
        commitment_hash: assembled.witness.commitment_hash,
        registry_root: assembled.witness.registry_root,
        challenge: assembled.witness.challenge,
    };

    let snark_proof = halp_circuit::prove(proving_key, &assembled.witness, rng)?;

    let bbs_proof = if revealed_indices.is_empty() {
        None
    } else {
        if !revealed_indices.contains(&0) {
            return Err(Error::InvalidInput(
                "revealed indices must include index 0 (the commitment binding)".into(),
            ));
        }
        let messages: Vec<_> = credential
            .messages
            .iter()
            .map(|m| halp_bbs::message_to_scalar(m))
            .collect();
        let nonce = scalar_to_be_bytes(challenge);
        let proof = halp_bbs::create_proof(
            &credential.bbs_signature,
            &messages,
            revealed_indices,
            &nonce,
        )?;
        Some(proof)
    };

    Ok(HybridAuthPackage {
        challenge_id: challenge_id.to_string(),
        challenge: *challenge,
        snark_proof,
        public_inputs,
        bbs_proof,
        commitment_hash: assembled.witness.commitment_hash,
        pseudonym: assembled.witness.pseudonym,
        nullifier: assembled.witness.nullifier,
        domain: domain.to_string(),
        registry_root: assembled.witness.registry_root,
        timestamp,
    })
}

/// Async entry point: offloads the CPU-bound proving step to a blocking
/// worker thread (§5's "offload proof generation to a worker pool"
/// guidance), so a caller on a multi-threaded Tokio runtime does not stall
/// the reactor for the tens-of-milliseconds-to-seconds Groth16 proving
/// takes.
pub async fn build_hybrid_auth_package_async<S>(
    vault: std::sync::Arc<MasterSecretVault<S>>,
    holder: String,
    credential: CredentialRecord,
    challenge_id: String,
    challenge: FrBls,
    domain: String,
    registry: Option<std::sync::Arc<NullifierRegistry>>,
    revealed_indices: Vec<usize>,
    proving_key: std::sync::Arc<ProvingKey<ark_bn254::Bn254>>,
    timestamp: u64,
) -> Result<HybridAuthPackage, Error>
where
    S: SecretStore + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut rng = rand::rngs::OsRng;
        build_hybrid_auth_package(
            &mut rng,
            &vault,
            &holder,
            &credential,
            &challenge_id,
            &challenge,
            &domain,
            registry.as_deref(),
            &revealed_indices,
            &proving_key,
            timestamp,
        )
    })
    .await
    .map_err(|_| Error::Internal)?
}

/// Convenience re-export so callers assembling a tree leaf directly (e.g.
/// the workspace integration test) do not need a separate `halp-merkle`
/// import just for the type name.
pub type Leaf = IndexedMerkleLeaf;

#[cfg(test)]
mod tests {
    use super::*;
    use ark_std::rand::{rngs::StdRng, SeedableRng};
    use halp_vault::{KeySource, MemoryStore, VaultConfig};

    fn test_vault() -> MasterSecretVault<MemoryStore> {
        MasterSecretVault::new(
            MemoryStore::new(),
            VaultConfig {
                key_source: KeySource::Static([3u8; 32]),
            },
        )
    }

    fn fixture_credential(commitment_hash: FrBn254, blinding_factor: FrBn254) -> CredentialRecord {
        let issuer = halp_bbs::keygen();
        let m0 = commitment_hash_bytes(&commitment_hash).to_vec();
        let m1 = b"StudentCredential".to_vec();
        let messages = vec![m0, m1];
        let scalars: Vec<_> = messages.iter().map(|m| halp_bbs::message_to_scalar(m)).collect();
        let sig = halp_bbs::sign(&issuer, &scalars).unwrap();
        CredentialRecord {
            id: "cred-1".to_string(),
            vc_json: "{}".to_string(),
            bbs_signature: sig,
            issuer_public_key: issuer.public(),
            messages,
            message_labels: vec!["commitment".to_string(), "type".to_string()],
            commitment_hash,
            blinding_factor,
        }
    }

    #[test]
    fn ms_as_bn254_is_deterministic() {
        let ms = FrBls::from(42u64);
        assert_eq!(ms_as_bn254(&ms), ms_as_bn254(&ms));
    }

    #[test]
    fn build_hybrid_auth_package_round_trips_with_empty_registry() {
        let vault = test_vault();
        vault.generate("alice", 1000).unwrap();
        let ms = vault.get("alice").unwrap();
        let ms_bn254 = ms_as_bn254(&ms);
        let blinding_factor = FrBn254::from(13u64);
        let commitment_hash = halp_poseidon::hash2(ms_bn254, blinding_factor);
        let credential = fixture_credential(commitment_hash, blinding_factor);

        let mut rng = StdRng::seed_from_u64(11);
        let (pk, vk) = halp_circuit::setup(&mut rng).unwrap();

        let challenge = FrBls::from(777u64);
        let package = build_hybrid_auth_package(
            &mut rng,
            &vault,
            "alice",
            &credential,
            "ch_1",
            &challenge,
            "example.com",
            None,
            &[0],
            &pk,
            1_700_000_000,
        )
        .unwrap();

        assert!(halp_circuit::verify(&vk, &package.public_inputs, &package.snark_proof).unwrap());
        assert!(package.bbs_proof.is_some());

        let bbs_proof = package.bbs_proof.unwrap();
        let mut revealed = std::collections::BTreeMap::new();
        revealed.insert(0, commitment_hash_bytes(&commitment_hash).to_vec());
        let nonce = scalar_to_be_bytes(&challenge);
        assert!(halp_bbs::verify_proof(
            &credential.issuer_public_key,
            &bbs_proof,
            &revealed,
            credential.messages.len(),
            &nonce,
        )
        .unwrap());
    }

    #[test]
    fn revealed_indices_without_zero_is_rejected() {
        let vault = test_vault();
        vault.generate("alice", 1000).unwrap();
        let ms = vault.get("alice").unwrap();
        let ms_bn254 = ms_as_bn254(&ms);
        let blinding_factor = FrBn254::from(5u64);
        let commitment_hash = halp_poseidon::hash2(ms_bn254, blinding_factor);
        let credential = fixture_credential(commitment_hash, blinding_factor);

        let mut rng = StdRng::seed_from_u64(12);
        let (pk, _vk) = halp_circuit::setup(&mut rng).unwrap();
        let challenge = FrBls::from(1u64);

        let err = build_hybrid_auth_package(
            &mut rng,
            &vault,
            "alice",
            &credential,
            "ch_2",
            &challenge,
            "example.com",
            None,
            &[1],
            &pk,
            0,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn fits_witness_bound_rejects_values_at_or_above_2_pow_252() {
        let too_large = FrBn254::from(2u64).pow([252u64]);
        assert!(!fits_witness_bound(&too_large));
        let fine = FrBn254::from(2u64).pow([251u64]);
        assert!(fits_witness_bound(&fine));
    }
}
