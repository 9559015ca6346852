//! Indexed Merkle tree of spent nullifiers (§4.G): a sorted linked list of
//! leaves with Poseidon-hashed inner nodes, supporting short non-membership
//! proofs on BN254. Level storage is a plain `Vec`, with a doc-commented
//! proof builder/verifier split, adapted from a fixed-arity append-only tree
//! to the sorted-linked-list structure this component requires.

// Tree indices stay well under `u32::MAX` for any tree under `HEIGHT = 20`
// (at most 2^20 leaves); the usize/u64/u32 conversions and index arithmetic
// below never truncate or overflow in practice but aren't expressed as
// fallible `TryFrom`/`checked_*` throughout.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_lossless,
    clippy::arithmetic_side_effects
)]

use std::collections::HashMap;
use std::sync::RwLock;

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField, Zero};
use halp_types::Error;

/// Fixed tree height: ~10^6 leaves, per §3.
pub const HEIGHT: usize = 20;

fn scalar_lt(a: Fr, b: Fr) -> bool {
    a.into_bigint() < b.into_bigint()
}

fn scalar_key(value: Fr) -> [u8; 32] {
    let mut out = [0u8; 32];
    let be = value.into_bigint().to_bytes_be();
    let offset = 32 - be.len();
    out[offset..].copy_from_slice(&be);
    out
}

/// `{ value, nextValue, nextIdx }`. Leaves form a sorted linked list by
/// `value`; `nextValue = 0` marks the tail of the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedMerkleLeaf {
    /// This leaf's nullifier value.
    pub value: Fr,
    /// The next-higher value in the sorted linked list, 0 at the tail.
    pub next_value: Fr,
    /// Index of the leaf holding `next_value`.
    pub next_idx: u32,
}

impl IndexedMerkleLeaf {
    /// The distinguished head leaf representing the empty list.
    pub fn head() -> Self {
        IndexedMerkleLeaf {
            value: Fr::from(0u64),
            next_value: Fr::from(0u64),
            next_idx: 0,
        }
    }

    fn hash(&self) -> Fr {
        halp_poseidon::hash3(self.value, self.next_value, Fr::from(self.next_idx as u64))
    }
}

/// A non-membership proof: the low-nullifier leaf plus its authentication
/// path to `root`.
#[derive(Debug, Clone)]
pub struct NonMembershipProof {
    /// Index of the low-nullifier leaf in the tree.
    pub leaf_index: usize,
    /// Value of the low-nullifier leaf.
    pub low_value: Fr,
    /// `next_value` of the low-nullifier leaf.
    pub low_next_value: Fr,
    /// `next_idx` of the low-nullifier leaf.
    pub low_next_idx: u32,
    /// `HEIGHT` sibling hashes, leaf level first.
    pub siblings: Vec<Fr>,
    /// `HEIGHT` bits: 0 if the authenticated node is the left child at that
    /// level, 1 if it is the right child.
    pub path_indices: Vec<u8>,
    /// Tree root the path authenticates against.
    pub root: Fr,
}

/// Sorted-linked-list indexed Merkle tree of fixed height [`HEIGHT`].
pub struct IndexedMerkleTree {
    leaves: Vec<IndexedMerkleLeaf>,
    index_of: HashMap<[u8; 32], usize>,
    /// `empty[l]`: the hash of an entirely empty subtree at level `l`.
    /// `empty[0] = Poseidon3(0, 0, 0)`, `empty[l+1] = Poseidon2(empty[l], empty[l])`.
    empty: Vec<Fr>,
}

impl Default for IndexedMerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexedMerkleTree {
    /// Builds a fresh tree containing only the head leaf `(0, 0, 0)`.
    pub fn new() -> Self {
        let mut empty = Vec::with_capacity(HEIGHT + 1);
        empty.push(IndexedMerkleLeaf::head().hash());
        for level in 0..HEIGHT {
            let prev = empty[level];
            empty.push(halp_poseidon::hash2(prev, prev));
        }

        let head = IndexedMerkleLeaf::head();
        let mut index_of = HashMap::new();
        index_of.insert(scalar_key(head.value), 0usize);

        IndexedMerkleTree {
            leaves: vec![head],
            index_of,
            empty,
        }
    }

    /// Number of leaves including the head, i.e. one more than the number
    /// of nullifiers actually inserted.
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    fn contains(&self, value: Fr) -> bool {
        // The head leaf's own value is 0 and is not itself an inserted
        // nullifier, so only treat `value == 0` as present if some other
        // leaf besides the head records it (which never happens for honest
        // Poseidon outputs, but keeps `contains` exact).
        self.index_of.contains_key(&scalar_key(value)) && !(value.is_zero())
    }

    fn find_predecessor(&self, value: Fr) -> Result<usize, Error> {
        self.leaves
            .iter()
            .position(|leaf| {
                scalar_lt(leaf.value, value)
                    && (leaf.next_value.is_zero() || scalar_lt(value, leaf.next_value))
            })
            .ok_or(Error::Internal)
    }

    /// Node hash at `(level, idx)`. Any subtree entirely beyond the
    /// populated leaf range is the precomputed empty-subtree hash; only
    /// subtrees intersecting actual leaves are walked, which bounds the work
    /// to `O(leaf_count * HEIGHT)` regardless of the tree's nominal height.
    fn node_hash(&self, level: usize, idx: u64) -> Fr {
        let subtree_size = 1u64 << level;
        let start = idx * subtree_size;
        if start >= self.leaves.len() as u64 {
            return self.empty[level];
        }
        if level == 0 {
            return self.leaves[idx as usize].hash();
        }
        let left = self.node_hash(level - 1, idx * 2);
        let right = self.node_hash(level - 1, idx * 2 + 1);
        halp_poseidon::hash2(left, right)
    }

    /// `root() -> Fr`.
    pub fn root(&self) -> Fr {
        self.node_hash(HEIGHT, 0)
    }

    /// `insert(value: Fr) -> idx`. Fails with `AlreadyExists` if `value` has
    /// already been inserted.
    pub fn insert(&mut self, value: Fr) -> Result<usize, Error> {
        if self.contains(value) {
            return Err(Error::AlreadyExists);
        }
        let p = self.find_predecessor(value)?;
        let new_idx = self.leaves.len();
        let new_leaf = IndexedMerkleLeaf {
            value,
            next_value: self.leaves[p].next_value,
            next_idx: self.leaves[p].next_idx,
        };
        self.leaves.push(new_leaf);
        self.leaves[p].next_value = value;
        self.leaves[p].next_idx = new_idx as u32;
        self.index_of.insert(scalar_key(value), new_idx);
        Ok(new_idx)
    }

    fn authentication_path(&self, leaf_index: usize) -> (Vec<Fr>, Vec<u8>) {
        let mut siblings = Vec::with_capacity(HEIGHT);
        let mut path_indices = Vec::with_capacity(HEIGHT);
        let mut idx = leaf_index as u64;
        for level in 0..HEIGHT {
            let sibling_idx = idx ^ 1;
            path_indices.push((idx & 1) as u8);
            siblings.push(self.node_hash(level, sibling_idx));
            idx /= 2;
        }
        (siblings, path_indices)
    }

    /// `nonMembershipProof(value) -> proof`. Fails with `AlreadyExists`
    /// ("IsPresent" in spec terms) if `value` is already in the tree.
    pub fn non_membership_proof(&self, value: Fr) -> Result<NonMembershipProof, Error> {
        if self.contains(value) {
            return Err(Error::AlreadyExists);
        }
        let p = self.find_predecessor(value)?;
        let low = self.leaves[p];
        let (siblings, path_indices) = self.authentication_path(p);
        Ok(NonMembershipProof {
            leaf_index: p,
            low_value: low.value,
            low_next_value: low.next_value,
            low_next_idx: low.next_idx,
            siblings,
            path_indices,
            root: self.root(),
        })
    }

    /// `verifyProof(value, proof) -> bool`. Checks the ordering invariant
    /// (`lowValue < value < lowNextValue`, or `lowNextValue = 0` for the
    /// list tail) and rehashes the low-nullifier leaf up through the
    /// supplied path to compare against `proof.root`.
    pub fn verify_non_membership_proof(value: Fr, proof: &NonMembershipProof) -> bool {
        if proof.siblings.len() != HEIGHT || proof.path_indices.len() != HEIGHT {
            return false;
        }
        if !scalar_lt(proof.low_value, value) {
            return false;
        }
        if !proof.low_next_value.is_zero() && !scalar_lt(value, proof.low_next_value) {
            return false;
        }

        let leaf = IndexedMerkleLeaf {
            value: proof.low_value,
            next_value: proof.low_next_value,
            next_idx: proof.low_next_idx,
        };
        let mut current = leaf.hash();
        for (sibling, bit) in proof.siblings.iter().zip(proof.path_indices.iter()) {
            current = if *bit == 0 {
                halp_poseidon::hash2(current, *sibling)
            } else {
                halp_poseidon::hash2(*sibling, current)
            };
        }
        current == proof.root
    }
}

/// `{ nullifier, domain, pseudonym, timestamp, treeIndex }`. Write-once.
#[derive(Debug, Clone)]
pub struct NullifierRecord {
    /// The spent nullifier value.
    pub nullifier: Fr,
    /// Domain the nullifier was derived under.
    pub domain: String,
    /// Pseudonym of the session that spent this nullifier.
    pub pseudonym: Fr,
    /// Unix-epoch milliseconds the nullifier was registered.
    pub timestamp: u64,
    /// Index of the leaf inserted for this nullifier.
    pub tree_index: usize,
}

/// Wraps [`IndexedMerkleTree`] with [`NullifierRecord`] bookkeeping behind a
/// single-writer/many-reader lock (§5): inserts take the exclusive path
/// (predecessor search, leaf append, recomputation); readers see a snapshot
/// consistent with the last published root.
pub struct NullifierRegistry {
    tree: RwLock<IndexedMerkleTree>,
    records: RwLock<HashMap<[u8; 32], NullifierRecord>>,
}

impl Default for NullifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NullifierRegistry {
    /// Builds a registry over a fresh, empty [`IndexedMerkleTree`].
    pub fn new() -> Self {
        NullifierRegistry {
            tree: RwLock::new(IndexedMerkleTree::new()),
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Current tree root.
    pub fn root(&self) -> Fr {
        self.tree.read().unwrap_or_else(|p| p.into_inner()).root()
    }

    /// Total leaves including the head.
    pub fn leaf_count(&self) -> usize {
        self.tree.read().unwrap_or_else(|p| p.into_inner()).leaf_count()
    }

    /// `check(nullifier) -> used: bool`.
    pub fn check(&self, nullifier: Fr) -> bool {
        self.records
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(&scalar_key(nullifier))
    }

    /// Looks up the bookkeeping record for an already-registered nullifier.
    pub fn record(&self, nullifier: Fr) -> Option<NullifierRecord> {
        self.records
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&scalar_key(nullifier))
            .cloned()
    }

    /// Produces a non-membership proof against the current tree state.
    pub fn non_membership_proof(&self, value: Fr) -> Result<NonMembershipProof, Error> {
        self.tree
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .non_membership_proof(value)
    }

    /// `register(nullifier, domain, pseudonym, timestamp) -> (treeIndex, newRoot)`.
    /// Fails with `NullifierReused` if already present — write-once, one-way
    /// `absent -> present` transition.
    pub fn register(
        &self,
        nullifier: Fr,
        domain: String,
        pseudonym: Fr,
        timestamp: u64,
    ) -> Result<(usize, Fr), Error> {
        let mut tree = self.tree.write().unwrap_or_else(|p| p.into_inner());
        let tree_index = match tree.insert(nullifier) {
            Ok(idx) => idx,
            Err(Error::AlreadyExists) => return Err(Error::NullifierReused),
            Err(e) => return Err(e),
        };
        let new_root = tree.root();
        drop(tree);

        self.records.write().unwrap_or_else(|p| p.into_inner()).insert(
            scalar_key(nullifier),
            NullifierRecord {
                nullifier,
                domain,
                pseudonym,
                timestamp,
                tree_index,
            },
        );
        Ok((tree_index, new_root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tree_accepts_non_membership_proof_for_any_value() {
        let tree = IndexedMerkleTree::new();
        let value = Fr::from(42u64);
        let proof = tree.non_membership_proof(value).unwrap();
        assert!(IndexedMerkleTree::verify_non_membership_proof(value, &proof));
    }

    #[test]
    fn inserted_value_is_rejected_by_non_membership_proof() {
        let mut tree = IndexedMerkleTree::new();
        let value = Fr::from(7u64);
        tree.insert(value).unwrap();
        assert!(matches!(
            tree.non_membership_proof(value),
            Err(Error::AlreadyExists)
        ));
    }

    #[test]
    fn double_insert_is_rejected() {
        let mut tree = IndexedMerkleTree::new();
        tree.insert(Fr::from(5u64)).unwrap();
        assert!(matches!(
            tree.insert(Fr::from(5u64)),
            Err(Error::AlreadyExists)
        ));
    }

    #[test]
    fn sorted_order_is_maintained_across_inserts() {
        let mut tree = IndexedMerkleTree::new();
        for v in [50u64, 10, 90, 30] {
            tree.insert(Fr::from(v)).unwrap();
        }
        // Walk the linked list from the head and confirm strictly ascending
        // values until the tail (`next_value == 0`) is reached.
        let mut idx = 0usize;
        let mut visited = 0usize;
        loop {
            let leaf = tree.leaves[idx];
            visited += 1;
            if leaf.next_value.is_zero() {
                break;
            }
            assert!(scalar_lt(leaf.value, leaf.next_value));
            idx = leaf.next_idx as usize;
            assert!(visited <= tree.leaf_count(), "linked list cycle detected");
        }
        assert_eq!(visited, tree.leaf_count());
    }

    #[test]
    fn non_membership_proof_for_fresh_value_among_populated_leaves() {
        let mut tree = IndexedMerkleTree::new();
        for v in [10u64, 20, 40] {
            tree.insert(Fr::from(v)).unwrap();
        }
        let fresh = Fr::from(25u64);
        let proof = tree.non_membership_proof(fresh).unwrap();
        assert_eq!(proof.low_value, Fr::from(20u64));
        assert_eq!(proof.low_next_value, Fr::from(40u64));
        assert!(IndexedMerkleTree::verify_non_membership_proof(fresh, &proof));
    }

    #[test]
    fn tampered_root_fails_verification() {
        let mut tree = IndexedMerkleTree::new();
        tree.insert(Fr::from(10u64)).unwrap();
        let fresh = Fr::from(99u64);
        let mut proof = tree.non_membership_proof(fresh).unwrap();
        proof.root += Fr::from(1u64);
        assert!(!IndexedMerkleTree::verify_non_membership_proof(fresh, &proof));
    }

    #[test]
    fn registry_register_then_replay_is_reused() {
        let registry = NullifierRegistry::new();
        let nf = Fr::from(123u64);
        registry
            .register(nf, "example.com".into(), Fr::from(1u64), 1000)
            .unwrap();
        assert!(registry.check(nf));
        let err = registry
            .register(nf, "example.com".into(), Fr::from(1u64), 1001)
            .unwrap_err();
        assert!(matches!(err, Error::NullifierReused));
    }

    #[test]
    fn registry_root_advances_after_register() {
        let registry = NullifierRegistry::new();
        let root_before = registry.root();
        registry
            .register(Fr::from(77u64), "d".into(), Fr::from(0u64), 1)
            .unwrap();
        assert_ne!(root_before, registry.root());
    }
}
