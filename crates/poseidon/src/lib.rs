//! Poseidon hash over BN254 `Fr`, fixed arity-2 and arity-3, used by the
//! nullifier/pseudonym derivations (§4.B) and reused verbatim inside the
//! `halp-auth` circuit's constraint synthesizer so native witness values and
//! in-circuit values are produced by the same code path.
//!
//! Round constants and the MDS matrix are not hand-copied from elsewhere;
//! they are generated deterministically here from a Blake2s expansion of a
//! fixed seed, and the MDS matrix is a Cauchy matrix (guaranteed invertible
//! by construction) rather than a randomly sampled one.

// Round/matrix-index bookkeeping (`usize`/`u64` loop counters) bounded by
// the fixed small constants above; never overflows or truncates in practice.
#![allow(clippy::arithmetic_side_effects, clippy::cast_lossless)]

use ark_bn254::Fr;
use ark_ff::PrimeField;
use blake2::{Blake2s256, Digest};
use std::sync::OnceLock;

const FULL_ROUNDS: usize = 8;
const PARTIAL_ROUNDS: usize = 57;

/// Round constants and MDS matrix for a fixed state width `t`.
struct Params {
    width: usize,
    round_constants: Vec<Vec<Fr>>,
    mds: Vec<Vec<Fr>>,
}

fn expand(tag: &str, index: u64) -> Fr {
    let mut hasher = Blake2s256::new();
    hasher.update(tag.as_bytes());
    hasher.update(index.to_be_bytes());
    Fr::from_be_bytes_mod_order(&hasher.finalize())
}

impl Params {
    fn generate(width: usize) -> Self {
        let total_rounds = FULL_ROUNDS + PARTIAL_ROUNDS;
        let rc_tag = format!("HALP_POSEIDON_RC_T{width}_V1");
        let mut round_constants = Vec::with_capacity(total_rounds);
        let mut counter = 0u64;
        for _ in 0..total_rounds {
            let mut row = Vec::with_capacity(width);
            for _ in 0..width {
                row.push(expand(&rc_tag, counter));
                counter += 1;
            }
            round_constants.push(row);
        }

        // Cauchy matrix M[i][j] = 1 / (x_i - y_j), with x_i = i and
        // y_j = width + j so x_i, y_j, and x_i - y_j are all pairwise
        // distinct and non-zero: a Cauchy matrix built this way is always
        // invertible, which a randomly sampled matrix is not guaranteed to
        // be.
        let mut mds = vec![vec![Fr::from(0u64); width]; width];
        for (i, row) in mds.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                let x_i = Fr::from(i as u64);
                let y_j = Fr::from((width + j) as u64);
                let denom = x_i - y_j;
                *cell = denom.inverse().expect("x_i - y_j is non-zero by construction");
            }
        }

        Params {
            width,
            round_constants,
            mds,
        }
    }
}

/// Exposes the round constants and MDS matrix for a given state width so
/// `halp-circuit` can build R1CS gadgets that perform the *exact* same
/// permutation as this native implementation — the property the witness
/// assembly testable property in spec §8 requires (native and in-circuit
/// Poseidon must agree bit-for-bit).
pub struct PermutationParams {
    /// State width (rate + capacity).
    pub width: usize,
    /// Number of full S-box rounds.
    pub full_rounds: usize,
    /// Number of partial S-box rounds.
    pub partial_rounds: usize,
    /// Per-round additive round constants, one vector of length `width` per round.
    pub round_constants: &'static [Vec<Fr>],
    /// `width x width` MDS mixing matrix.
    pub mds: &'static [Vec<Fr>],
}

/// Width-3 parameters, used by [`hash2`].
pub fn params2() -> PermutationParams {
    let p = params_for_width(3);
    PermutationParams {
        width: p.width,
        full_rounds: FULL_ROUNDS,
        partial_rounds: PARTIAL_ROUNDS,
        round_constants: &p.round_constants,
        mds: &p.mds,
    }
}

/// Width-4 parameters, used by [`hash3`].
pub fn params3() -> PermutationParams {
    let p = params_for_width(4);
    PermutationParams {
        width: p.width,
        full_rounds: FULL_ROUNDS,
        partial_rounds: PARTIAL_ROUNDS,
        round_constants: &p.round_constants,
        mds: &p.mds,
    }
}

fn params_for_width(width: usize) -> &'static Params {
    static WIDTH3: OnceLock<Params> = OnceLock::new();
    static WIDTH4: OnceLock<Params> = OnceLock::new();
    match width {
        3 => WIDTH3.get_or_init(|| Params::generate(3)),
        4 => WIDTH4.get_or_init(|| Params::generate(4)),
        _ => panic!("unsupported Poseidon width {width}"),
    }
}

fn sbox(x: Fr) -> Fr {
    let x2 = x * x;
    let x4 = x2 * x2;
    x4 * x
}

/// Runs the full Poseidon permutation over `state` (length `params.width`)
/// in place: `FULL_ROUNDS / 2` full rounds, `PARTIAL_ROUNDS` partial rounds,
/// `FULL_ROUNDS / 2` full rounds.
fn permute(params: &Params, state: &mut [Fr]) {
    assert_eq!(state.len(), params.width);
    let half_full = FULL_ROUNDS / 2;

    for round in 0..(FULL_ROUNDS + PARTIAL_ROUNDS) {
        for (i, s) in state.iter_mut().enumerate() {
            *s += params.round_constants[round][i];
        }

        let is_full_round = round < half_full || round >= half_full + PARTIAL_ROUNDS;
        if is_full_round {
            for s in state.iter_mut() {
                *s = sbox(*s);
            }
        } else {
            state[0] = sbox(state[0]);
        }

        let mut next = vec![Fr::from(0u64); params.width];
        for (i, next_i) in next.iter_mut().enumerate() {
            let mut acc = Fr::from(0u64);
            for (j, s) in state.iter().enumerate() {
                acc += params.mds[i][j] * s;
            }
            *next_i = acc;
        }
        state.copy_from_slice(&next);
    }
}

/// `Poseidon2(a, b)`: state width 3 (2 inputs + one capacity lane seeded to
/// zero), output is the first state element after permutation.
pub fn hash2(a: Fr, b: Fr) -> Fr {
    let params = params_for_width(3);
    let mut state = vec![Fr::from(0u64), a, b];
    permute(params, &mut state);
    state[0]
}

/// `Poseidon3(a, b, c)`: state width 4 (3 inputs + one capacity lane).
pub fn hash3(a: Fr, b: Fr, c: Fr) -> Fr {
    let params = params_for_width(4);
    let mut state = vec![Fr::from(0u64), a, b, c];
    permute(params, &mut state);
    state[0]
}

/// Variadic Poseidon over an arbitrary number of field elements: folds the
/// input two-at-a-time through [`hash2`]. `hash_many(&[])` is
/// `hash2(0, 0)`; `hash_many(&[x])` is `hash2(x, 0)`.
pub fn hash_many(inputs: &[Fr]) -> Fr {
    match inputs {
        [] => hash2(Fr::from(0u64), Fr::from(0u64)),
        [single] => hash2(*single, Fr::from(0u64)),
        [first, rest @ ..] => {
            let mut acc = *first;
            for chunk in rest {
                acc = hash2(acc, *chunk);
            }
            acc
        }
    }
}

/// Absorbs an arbitrary byte buffer (string or binary) into a single field
/// element by splitting it into 31-byte chunks (each strictly smaller than
/// the BN254 modulus), seeding `acc = hash2(chunk0, 0)` and then
/// left-folding the rest with [`hash2`]: `acc = hash2(acc, chunk_i)`.
/// Empty input seeds with `hash2(0, 0)`.
pub fn hash_bytes(data: &[u8]) -> Fr {
    if data.is_empty() {
        return hash2(Fr::from(0u64), Fr::from(0u64));
    }

    let chunks: Vec<Fr> = data
        .chunks(31)
        .map(Fr::from_be_bytes_mod_order)
        .collect();

    let mut acc = hash2(chunks[0], Fr::from(0u64));
    for chunk in &chunks[1..] {
        acc = hash2(acc, *chunk);
    }
    acc
}

/// Convenience wrapper absorbing a UTF-8 string the same way [`hash_bytes`]
/// absorbs raw bytes.
pub fn hash_string(s: &str) -> Fr {
    hash_bytes(s.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash2_is_deterministic() {
        let a = Fr::from(1u64);
        let b = Fr::from(2u64);
        assert_eq!(hash2(a, b), hash2(a, b));
    }

    #[test]
    fn hash2_is_not_commutative_in_general() {
        let a = Fr::from(1u64);
        let b = Fr::from(2u64);
        assert_ne!(hash2(a, b), hash2(b, a));
    }

    #[test]
    fn hash3_differs_from_hash2() {
        let a = Fr::from(1u64);
        let b = Fr::from(2u64);
        let c = Fr::from(3u64);
        assert_ne!(hash3(a, b, c), hash2(a, b));
    }

    #[test]
    fn hash_many_matches_fold_definition() {
        let x = Fr::from(7u64);
        assert_eq!(hash_many(&[]), hash2(Fr::from(0u64), Fr::from(0u64)));
        assert_eq!(hash_many(&[x]), hash2(x, Fr::from(0u64)));
        let y = Fr::from(9u64);
        assert_eq!(hash_many(&[x, y]), hash2(x, y));
    }

    #[test]
    fn hash_bytes_empty_matches_seed() {
        assert_eq!(hash_bytes(b""), hash2(Fr::from(0u64), Fr::from(0u64)));
    }

    #[test]
    fn hash_string_is_stable_across_calls() {
        assert_eq!(hash_string("example.com"), hash_string("example.com"));
        assert_ne!(hash_string("example.com"), hash_string("other.com"));
    }

    #[test]
    fn hash_bytes_seeds_multi_chunk_input_the_same_way_as_single_chunk() {
        // 45 bytes splits into two 31-byte chunks; the fold must start from
        // the same hash2(chunk0, 0) seed a single-chunk input would use.
        let data = b"holder-did:example:alice|credential:nonce-001";
        assert_eq!(data.chunks(31).count(), 2);

        let chunks: Vec<Fr> = data.chunks(31).map(Fr::from_be_bytes_mod_order).collect();
        let expected = hash2(hash2(chunks[0], Fr::from(0u64)), chunks[1]);

        assert_eq!(hash_bytes(data), expected);
        assert_eq!(hash_string(std::str::from_utf8(data).unwrap()), expected);
    }
}
