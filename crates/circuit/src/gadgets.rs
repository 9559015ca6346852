//! R1CS gadgets shared by [`crate::HalpAuthCircuit`]: an in-circuit Poseidon
//! permutation that reuses `halp-poseidon`'s round constants and MDS matrix
//! verbatim, and the 252-bit comparator the non-membership constraint needs.

use ark_bn254::Fr;
use ark_ff::Field;
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::r1cs::SynthesisError;
use halp_poseidon::PermutationParams;

/// Values derived by the circuit's witness assembly are required (§9's
/// "numeric care" note) to stay below 2^252, so the comparator only needs to
/// rule out wraparound within that range rather than the full field.
const COMPARE_BITS: usize = 252;

fn permute(state: &mut [FpVar<Fr>], params: &PermutationParams) -> Result<(), SynthesisError> {
    let half_full = params.full_rounds / 2;
    for round in 0..(params.full_rounds + params.partial_rounds) {
        for (i, s) in state.iter_mut().enumerate() {
            *s += FpVar::constant(params.round_constants[round][i]);
        }

        let is_full_round = round < half_full || round >= half_full + params.partial_rounds;
        if is_full_round {
            for s in state.iter_mut() {
                let sq = s.square()?;
                let fourth = sq.square()?;
                *s = &fourth * &*s;
            }
        } else {
            let sq = state[0].square()?;
            let fourth = sq.square()?;
            state[0] = &fourth * &state[0];
        }

        let mut next = Vec::with_capacity(params.width);
        for i in 0..params.width {
            let mut acc = FpVar::constant(Fr::from(0u64));
            for (j, s) in state.iter().enumerate() {
                acc += s * params.mds[i][j];
            }
            next.push(acc);
        }
        state.clone_from_slice(&next);
    }
    Ok(())
}

/// `Poseidon2(a, b)` inside the constraint system; mirrors
/// `halp_poseidon::hash2` exactly.
pub fn hash2_gadget(a: FpVar<Fr>, b: FpVar<Fr>) -> Result<FpVar<Fr>, SynthesisError> {
    let params = halp_poseidon::params2();
    let mut state = vec![FpVar::constant(Fr::from(0u64)), a, b];
    permute(&mut state, &params)?;
    Ok(state[0].clone())
}

/// `Poseidon3(a, b, c)` inside the constraint system; mirrors
/// `halp_poseidon::hash3` exactly.
pub fn hash3_gadget(
    a: FpVar<Fr>,
    b: FpVar<Fr>,
    c: FpVar<Fr>,
) -> Result<FpVar<Fr>, SynthesisError> {
    let params = halp_poseidon::params3();
    let mut state = vec![FpVar::constant(Fr::from(0u64)), a, b, c];
    permute(&mut state, &params)?;
    Ok(state[0].clone())
}

/// Enforces `a < b` for operands both known to fit in [`COMPARE_BITS`] bits.
///
/// `diff = b - a - 1` is canonically bit-decomposed (which also proves
/// `0 <= diff < p`); requiring every bit at position `COMPARE_BITS` and above
/// to be zero proves `0 <= diff < 2^COMPARE_BITS`, i.e. `a < b <= a +
/// 2^COMPARE_BITS`. Since both operands are themselves bounded by
/// `2^COMPARE_BITS`, that range exactly captures strict integer `<` without
/// modular wraparound.
fn enforce_lt_bounded(a: &FpVar<Fr>, b: &FpVar<Fr>) -> Result<(), SynthesisError> {
    let diff = b - a - FpVar::constant(Fr::from(1u64));
    let bits = diff.to_bits_le()?;
    for bit in bits.iter().skip(COMPARE_BITS) {
        bit.enforce_equal(&Boolean::constant(false))?;
    }
    Ok(())
}

/// Enforces the non-membership ordering constraint: `lowValue < nullifier`,
/// and either `lowNextValue == 0` (the low nullifier is the list tail) or
/// `nullifier < lowNextValue`.
pub fn enforce_non_membership_order(
    low_value: &FpVar<Fr>,
    low_next_value: &FpVar<Fr>,
    nullifier: &FpVar<Fr>,
) -> Result<(), SynthesisError> {
    enforce_lt_bounded(low_value, nullifier)?;

    let is_tail = low_next_value.is_eq(&FpVar::constant(Fr::from(0u64)))?;
    // A sentinel strictly above any well-formed 252-bit nullifier: selecting
    // it in place of `lowNextValue` when the low leaf is the list tail turns
    // "lowNextValue == 0 OR nullifier < lowNextValue" into a single
    // unconditional comparison.
    let sentinel = FpVar::constant(Fr::from(2u64).pow([COMPARE_BITS as u64]));
    let upper_bound = FpVar::conditionally_select(&is_tail, &sentinel, low_next_value)?;
    enforce_lt_bounded(nullifier, &upper_bound)
}

/// Folds `leaf` up through `siblings`/`path_indices` (leaf level first,
/// `path_indices[i] == 0` meaning the authenticated node is the left child
/// at that level) and enforces the result equals `expected_root`.
pub fn enforce_merkle_path(
    leaf: &FpVar<Fr>,
    siblings: &[FpVar<Fr>],
    path_indices: &[FpVar<Fr>],
    expected_root: &FpVar<Fr>,
) -> Result<(), SynthesisError> {
    let mut node = leaf.clone();
    for (sibling, bit_val) in siblings.iter().zip(path_indices.iter()) {
        let bit = bit_val.is_eq(&FpVar::constant(Fr::from(1u64)))?;
        let left = FpVar::conditionally_select(&bit, sibling, &node)?;
        let right = FpVar::conditionally_select(&bit, &node, sibling)?;
        node = hash2_gadget(left, right)?;
    }
    node.enforce_equal(expected_root)
}
