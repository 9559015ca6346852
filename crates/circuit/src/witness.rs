//! Witness assembly types for [`crate::HalpAuthCircuit`]: the full private
//! witness a prover needs, and the five-tuple of public inputs a verifier
//! checks against, in the fixed order spec §4.H requires.

use ark_bn254::Fr;

use crate::HalpAuthCircuit;

/// Fixed Merkle height; matches `halp_merkle::HEIGHT`. Duplicated here
/// (rather than depending on `halp-merkle`) because the circuit only needs
/// the path length, not the tree implementation itself.
pub const HEIGHT: usize = 20;

/// The complete assignment for one proof: private witness plus the public
/// inputs it must reproduce.
#[derive(Clone, Debug)]
pub struct CircuitWitness {
    /// Holder's master secret, reduced into `Fr`.
    pub master_secret: Fr,
    /// Session nonce sampled for this proof.
    pub session_nonce: Fr,
    /// Poseidon hash of the domain string.
    pub domain_hash: Fr,
    /// Poseidon hash of the credential identifier.
    pub cred_id_hash: Fr,
    /// Blinding factor bound into `commitment_hash`.
    pub blinding_factor: Fr,
    /// Value of the low-nullifier leaf.
    pub low_value: Fr,
    /// `next_value` of the low-nullifier leaf.
    pub low_next_value: Fr,
    /// `next_idx` of the low-nullifier leaf.
    pub low_next_idx: Fr,
    /// Merkle authentication path siblings, leaf level first.
    pub siblings: Vec<Fr>,
    /// Merkle authentication path left/right indicators.
    pub path_indices: Vec<Fr>,

    /// Expected context pseudonym.
    pub pseudonym: Fr,
    /// Expected nullifier.
    pub nullifier: Fr,
    /// Expected commitment-hash scalar.
    pub commitment_hash: Fr,
    /// Expected nullifier-registry root.
    pub registry_root: Fr,
    /// Challenge bound into the proof.
    pub challenge: Fr,
}

impl CircuitWitness {
    pub(crate) fn to_circuit(&self) -> HalpAuthCircuit {
        HalpAuthCircuit {
            master_secret: Some(self.master_secret),
            session_nonce: Some(self.session_nonce),
            domain_hash: Some(self.domain_hash),
            cred_id_hash: Some(self.cred_id_hash),
            blinding_factor: Some(self.blinding_factor),
            low_value: Some(self.low_value),
            low_next_value: Some(self.low_next_value),
            low_next_idx: Some(self.low_next_idx),
            siblings: Some(self.siblings.clone()),
            path_indices: Some(self.path_indices.clone()),
            pseudonym: Some(self.pseudonym),
            nullifier: Some(self.nullifier),
            commitment_hash: Some(self.commitment_hash),
            registry_root: Some(self.registry_root),
            challenge: Some(self.challenge),
        }
    }
}

/// The five Groth16 public inputs, in the fixed `pseudonym, nullifier,
/// commitmentHash, registryRoot, challenge` order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicInputs {
    /// Context pseudonym.
    pub pseudonym: Fr,
    /// Session nullifier.
    pub nullifier: Fr,
    /// Commitment-hash scalar.
    pub commitment_hash: Fr,
    /// Nullifier-registry root.
    pub registry_root: Fr,
    /// Bound challenge.
    pub challenge: Fr,
}

impl PublicInputs {
    /// Flattens to the fixed five-element order Groth16 verification expects.
    pub fn to_vec(&self) -> Vec<Fr> {
        vec![
            self.pseudonym,
            self.nullifier,
            self.commitment_hash,
            self.registry_root,
            self.challenge,
        ]
    }
}
