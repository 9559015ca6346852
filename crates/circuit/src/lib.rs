//! `halp-auth`: the five-constraint Groth16 circuit binding a session's
//! pseudonym and nullifier to a credential commitment and a non-membership
//! proof in the spent-nullifier tree (§4.H).
//!
//! There is no external circuit artifact to compile against (trusted-setup
//! ceremony tooling is out of scope), so this crate defines the constraint
//! system directly as an [`ark_relations::r1cs::ConstraintSynthesizer`] and
//! reuses `halp-poseidon`'s round constants and MDS matrix inside it, so the
//! native witness values computed by `halp-orchestrator` and the in-circuit
//! values agree bit-for-bit.

// Constraint-system bookkeeping (round/bit indices, `Fr` field arithmetic)
// bounded by the fixed circuit shape; never overflows or truncates here.
#![allow(clippy::arithmetic_side_effects, clippy::cast_lossless)]

mod gadgets;
mod keys;
mod witness;

pub use keys::{ProvingKeyBytes, VerifyingKeyBytes};
pub use witness::{CircuitWitness, PublicInputs};

use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, Proof, ProvingKey, VerifyingKey};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use ark_snark::SNARK;
use ark_std::rand::RngCore;
use halp_types::Error;

use gadgets::{enforce_merkle_path, enforce_non_membership_order, hash2_gadget, hash3_gadget};
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;

/// The `halp-auth-v1` arithmetic circuit. Private witness fields are `None`
/// when only the shape (not the assignment) is needed, e.g. during
/// [`setup`].
#[derive(Clone, Default)]
pub struct HalpAuthCircuit {
    // Private witness.
    /// Holder's master secret.
    pub master_secret: Option<Fr>,
    /// Session nonce.
    pub session_nonce: Option<Fr>,
    /// Poseidon hash of the domain string.
    pub domain_hash: Option<Fr>,
    /// Poseidon hash of the credential identifier.
    pub cred_id_hash: Option<Fr>,
    /// Blinding factor bound into `commitment_hash`.
    pub blinding_factor: Option<Fr>,
    /// Value of the low-nullifier leaf.
    pub low_value: Option<Fr>,
    /// `next_value` of the low-nullifier leaf.
    pub low_next_value: Option<Fr>,
    /// `next_idx` of the low-nullifier leaf.
    pub low_next_idx: Option<Fr>,
    /// Merkle authentication path siblings.
    pub siblings: Option<Vec<Fr>>,
    /// Merkle authentication path left/right indicators.
    pub path_indices: Option<Vec<Fr>>,

    // Public inputs, in the fixed order the proof carries them.
    /// Context pseudonym.
    pub pseudonym: Option<Fr>,
    /// Session nullifier.
    pub nullifier: Option<Fr>,
    /// Commitment-hash scalar.
    pub commitment_hash: Option<Fr>,
    /// Nullifier-registry root.
    pub registry_root: Option<Fr>,
    /// Bound challenge.
    pub challenge: Option<Fr>,
}

impl ConstraintSynthesizer<Fr> for HalpAuthCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        // Public inputs are allocated first and in this exact order: a
        // Groth16 verifier that receives `publicInputs` in any other order
        // will produce a proof the circuit rejects.
        let pseudonym_in = FpVar::new_input(cs.clone(), || {
            self.pseudonym.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let nullifier_in = FpVar::new_input(cs.clone(), || {
            self.nullifier.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let commitment_hash_in = FpVar::new_input(cs.clone(), || {
            self.commitment_hash
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        let registry_root_in = FpVar::new_input(cs.clone(), || {
            self.registry_root
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        let challenge_in = FpVar::new_input(cs.clone(), || {
            self.challenge.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let master_secret = FpVar::new_witness(cs.clone(), || {
            self.master_secret
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        let session_nonce = FpVar::new_witness(cs.clone(), || {
            self.session_nonce
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        let domain_hash = FpVar::new_witness(cs.clone(), || {
            self.domain_hash.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let cred_id_hash = FpVar::new_witness(cs.clone(), || {
            self.cred_id_hash.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let blinding_factor = FpVar::new_witness(cs.clone(), || {
            self.blinding_factor
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        let low_value = FpVar::new_witness(cs.clone(), || {
            self.low_value.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let low_next_value = FpVar::new_witness(cs.clone(), || {
            self.low_next_value
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        let low_next_idx = FpVar::new_witness(cs.clone(), || {
            self.low_next_idx
                .ok_or(SynthesisError::AssignmentMissing)
        })?;

        let height = witness::HEIGHT;
        let siblings_val = self.siblings.unwrap_or_else(|| vec![Fr::from(0u64); height]);
        let path_val = self
            .path_indices
            .unwrap_or_else(|| vec![Fr::from(0u64); height]);
        let mut siblings = Vec::with_capacity(height);
        for s in &siblings_val {
            siblings.push(FpVar::new_witness(cs.clone(), || Ok(*s))?);
        }
        let mut path_indices = Vec::with_capacity(height);
        for p in &path_val {
            path_indices.push(FpVar::new_witness(cs.clone(), || Ok(*p))?);
        }

        // 1. pseudonym = Poseidon3(masterSecret, sessionNonce, domainHash)
        let pseudonym_computed =
            hash3_gadget(master_secret.clone(), session_nonce.clone(), domain_hash.clone())?;
        pseudonym_computed.enforce_equal(&pseudonym_in)?;

        // 2. nullifier = Poseidon3(credIdHash, sessionNonce, domainHash)
        let nullifier_computed =
            hash3_gadget(cred_id_hash.clone(), session_nonce, domain_hash)?;
        nullifier_computed.enforce_equal(&nullifier_in)?;

        // 3. commitmentHash = Poseidon2(masterSecret, blindingFactor)
        let commitment_computed = hash2_gadget(master_secret, blinding_factor)?;
        commitment_computed.enforce_equal(&commitment_hash_in)?;

        // 4. Non-membership ordering plus Merkle path to registryRoot.
        enforce_non_membership_order(&low_value, &low_next_value, &nullifier_in)?;
        let leaf = hash3_gadget(low_value, low_next_value, low_next_idx)?;
        enforce_merkle_path(&leaf, &siblings, &path_indices, &registry_root_in)?;

        // 5. challenge is wired in, squared, with no semantic meaning beyond
        // binding this proof instance to the circuit's public input.
        let _ = &challenge_in * &challenge_in;

        Ok(())
    }
}

/// Runs the Groth16 circuit-specific trusted setup over a shape-only
/// instance of the circuit (no witness assignment needed).
pub fn setup<R: RngCore>(rng: &mut R) -> Result<(ProvingKey<Bn254>, VerifyingKey<Bn254>), Error> {
    let circuit = HalpAuthCircuit::default();
    let (pk, vk) = Groth16::<Bn254>::circuit_specific_setup(circuit, rng)
        .map_err(|_| Error::Internal)?;
    Ok((pk, vk))
}

/// Produces a Groth16 proof for a fully-assigned witness.
pub fn prove<R: RngCore>(
    pk: &ProvingKey<Bn254>,
    witness: &CircuitWitness,
    rng: &mut R,
) -> Result<Proof<Bn254>, Error> {
    let circuit = witness.to_circuit();
    Groth16::<Bn254>::create_random_proof_with_reduction(circuit, pk, rng)
        .map_err(|_| Error::InvalidProof)
}

/// Verifies a Groth16 proof against the five public inputs in the fixed
/// `pseudonym, nullifier, commitmentHash, registryRoot, challenge` order.
pub fn verify(
    vk: &VerifyingKey<Bn254>,
    public_inputs: &PublicInputs,
    proof: &Proof<Bn254>,
) -> Result<bool, Error> {
    let inputs = public_inputs.to_vec();
    Groth16::<Bn254>::verify(vk, &inputs, proof).map_err(|_| Error::InvalidProof)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_std::rand::{rngs::StdRng, SeedableRng};
    use halp_poseidon::{hash2, hash3};

    fn build_happy_path_witness() -> (CircuitWitness, PublicInputs) {
        let master_secret = Fr::from(42u64);
        let session_nonce = Fr::from(777u64);
        let domain_hash = halp_poseidon::hash_string("example.com");
        let cred_id_hash = halp_poseidon::hash_string("cred-1");
        let blinding_factor = Fr::from(13u64);

        let pseudonym = hash3(master_secret, session_nonce, domain_hash);
        let nullifier = hash3(cred_id_hash, session_nonce, domain_hash);
        let commitment_hash = hash2(master_secret, blinding_factor);

        // Empty-tree non-membership proof: low = head leaf (0, 0, 0).
        let low_value = Fr::from(0u64);
        let low_next_value = Fr::from(0u64);
        let low_next_idx = Fr::from(0u64);
        let leaf = hash3(low_value, low_next_value, low_next_idx);

        let height = witness::HEIGHT;
        let mut empty = vec![leaf];
        for _ in 0..height {
            let prev = *empty.last().unwrap();
            empty.push(hash2(prev, prev));
        }
        let siblings = empty[..height].to_vec();
        let path_indices = vec![Fr::from(0u64); height];
        let registry_root = empty[height];

        let challenge = Fr::from(99u64);

        let witness = CircuitWitness {
            master_secret,
            session_nonce,
            domain_hash,
            cred_id_hash,
            blinding_factor,
            low_value,
            low_next_value,
            low_next_idx,
            siblings,
            path_indices,
            pseudonym,
            nullifier,
            commitment_hash,
            registry_root,
            challenge,
        };
        let public_inputs = PublicInputs {
            pseudonym,
            nullifier,
            commitment_hash,
            registry_root,
            challenge,
        };
        (witness, public_inputs)
    }

    #[test]
    fn setup_prove_verify_round_trips_on_empty_tree() {
        let mut rng = StdRng::seed_from_u64(1);
        let (pk, vk) = setup(&mut rng).unwrap();
        let (witness, public_inputs) = build_happy_path_witness();
        let proof = prove(&pk, &witness, &mut rng).unwrap();
        assert!(verify(&vk, &public_inputs, &proof).unwrap());
    }

    #[test]
    fn tampered_public_input_is_rejected() {
        let mut rng = StdRng::seed_from_u64(2);
        let (pk, vk) = setup(&mut rng).unwrap();
        let (witness, mut public_inputs) = build_happy_path_witness();
        let proof = prove(&pk, &witness, &mut rng).unwrap();
        public_inputs.nullifier += Fr::from(1u64);
        assert!(!verify(&vk, &public_inputs, &proof).unwrap());
    }
}
