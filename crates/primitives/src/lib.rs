//! Field and curve primitives: BLS12-381 G1 and BN254 scalar arithmetic,
//! hash-to-curve, and scalar<->bytes encoding.
//!
//! BN254 (`ark-bn254`) backs Poseidon and the SNARK; BLS12-381
//! (`ark-bls12-381`) backs commitments and BBS+. Both ride the same
//! arkworks traits (`PrimeField`, `CurveGroup`, `AffineRepr`) so the rest of
//! the workspace never has to reconcile two different curve libraries.

#![allow(clippy::arithmetic_side_effects)]

use ark_bls12_381::{Fr as FrBlsInner, G1Affine, G1Projective};
use ark_bn254::Fr as FrBn254Inner;
use ark_ec::{AffineRepr, CurveGroup, Group};
use ark_ff::{BigInteger, PrimeField};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use halp_types::Error;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

/// BN254 scalar field, as used by Poseidon and the SNARK.
pub type FrBn254 = FrBn254Inner;
/// BLS12-381 scalar field, as used by commitments and BBS+.
pub type FrBls = FrBlsInner;
/// BLS12-381 G1 group, in projective coordinates.
pub type G1Bls = G1Projective;

/// Number of bytes in a big-endian scalar encoding for either curve's Fr.
pub const SCALAR_BYTES: usize = 32;
/// Number of bytes in a compressed BLS12-381 G1 point.
pub const G1_COMPRESSED_BYTES: usize = 48;

/// Converts a field element to fixed-length big-endian bytes.
pub fn scalar_to_be_bytes<F: PrimeField>(scalar: &F) -> [u8; SCALAR_BYTES] {
    let mut out = [0u8; SCALAR_BYTES];
    let be = scalar.into_bigint().to_bytes_be();
    // `to_bytes_be` is minimal-length; right-align into the fixed buffer.
    let offset = SCALAR_BYTES - be.len();
    out[offset..].copy_from_slice(&be);
    out
}

/// Reduces 32 big-endian bytes modulo the field order. Suitable for
/// non-secret scalars (domain hashes, public encodings) where the small
/// modular bias is immaterial.
pub fn scalar_from_be_bytes_mod_order<F: PrimeField>(bytes: &[u8]) -> F {
    F::from_be_bytes_mod_order(bytes)
}

/// Parses exactly `SCALAR_BYTES` big-endian bytes as a canonical field
/// element, rejecting values at or above the modulus.
pub fn scalar_from_be_bytes_strict<F: PrimeField>(bytes: &[u8]) -> Result<F, Error> {
    if bytes.len() != SCALAR_BYTES {
        return Err(Error::InvalidScalar);
    }
    let candidate = F::from_be_bytes_mod_order(bytes);
    if scalar_to_be_bytes(&candidate).as_slice() != bytes {
        return Err(Error::InvalidScalar);
    }
    Ok(candidate)
}

/// Samples a uniformly random field element by rejection sampling: draw 32
/// uniform bytes, reject if the big-endian value is >= the field modulus,
/// retry. Unlike [`scalar_from_be_bytes_mod_order`], this carries no modular
/// bias and is the required method for secret scalars (master secrets,
/// blinding factors, Schnorr nonces).
pub fn sample_secret_scalar<F: PrimeField, R: rand::RngCore + rand::CryptoRng>(rng: &mut R) -> F {
    loop {
        let mut buf = [0u8; SCALAR_BYTES];
        rng.fill_bytes(&mut buf);
        if let Ok(scalar) = scalar_from_be_bytes_strict::<F>(&buf) {
            buf.zeroize();
            return scalar;
        }
        buf.zeroize();
    }
}

/// Serializes a BLS12-381 G1 point to its 48-byte compressed form.
pub fn g1_to_compressed(point: &G1Projective) -> [u8; G1_COMPRESSED_BYTES] {
    let affine = point.into_affine();
    let mut out = [0u8; G1_COMPRESSED_BYTES];
    affine
        .serialize_compressed(&mut out[..])
        .expect("fixed-size buffer matches compressed G1 encoding");
    out
}

/// Deserializes a compressed BLS12-381 G1 point, rejecting points not on the
/// curve or not in the prime-order subgroup.
pub fn g1_from_compressed(bytes: &[u8]) -> Result<G1Projective, Error> {
    if bytes.len() != G1_COMPRESSED_BYTES {
        return Err(Error::InvalidPoint);
    }
    let affine = G1Affine::deserialize_compressed(bytes).map_err(|_| Error::InvalidPoint)?;
    if !affine.is_on_curve() || !affine.is_in_correct_subgroup_assuming_on_curve() {
        return Err(Error::InvalidPoint);
    }
    Ok(affine.into_group())
}

/// Hashes an arbitrary domain-separated message to a BLS12-381 G1 point via
/// try-and-increment: append an incrementing counter to the message, SHA-256
/// it, interpret the digest as an x-coordinate candidate, and accept the
/// first one that lies on the curve. The result is then cleared to the
/// prime-order subgroup by scalar multiplication with the cofactor.
///
/// This is an auditable, standard alternative to a full SWU/Elligator map
/// and is adequate wherever the caller only needs *a* well-defined point
/// deterministically tied to the message, not constant-time hashing.
pub fn hash_to_curve_g1(domain_separation_tag: &[u8], message: &[u8]) -> G1Projective {
    for counter in 0u32..u32::MAX {
        let mut hasher = Sha256::new();
        hasher.update(domain_separation_tag);
        hasher.update(message);
        hasher.update(counter.to_be_bytes());
        let digest = hasher.finalize();

        let x = ark_bls12_381::Fq::from_be_bytes_mod_order(&digest);
        for y_is_odd in [false, true] {
            if let Some(affine) = G1Affine::get_point_from_x_unchecked(x, y_is_odd) {
                if affine.is_on_curve() {
                    let cleared = affine.mul_by_cofactor_to_group();
                    if !cleared.is_zero() {
                        return cleared;
                    }
                }
            }
        }
    }
    unreachable!("SHA-256 digest space exhausted without finding a curve point")
}

/// Adds two BLS12-381 G1 points.
pub fn g1_add(a: &G1Projective, b: &G1Projective) -> G1Projective {
    *a + *b
}

/// Negates a BLS12-381 G1 point.
pub fn g1_negate(a: &G1Projective) -> G1Projective {
    -*a
}

/// Scalar-multiplies a BLS12-381 G1 point. `arkworks`'s windowed
/// double-and-add implementation performs the same sequence of group
/// operations regardless of the scalar's value, so this is constant-time in
/// the scalar.
pub fn g1_scalar_mul(point: &G1Projective, scalar: &FrBls) -> G1Projective {
    point.mul_bigint(scalar.into_bigint())
}

/// The BLS12-381 G1 group generator.
pub fn g1_generator() -> G1Projective {
    G1Projective::generator()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_std::rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn scalar_round_trips_through_bytes() {
        let mut rng = StdRng::seed_from_u64(1);
        let scalar: FrBls = sample_secret_scalar(&mut rng);
        let bytes = scalar_to_be_bytes(&scalar);
        let recovered = scalar_from_be_bytes_strict::<FrBls>(&bytes).unwrap();
        assert_eq!(scalar, recovered);
    }

    #[test]
    fn g1_point_round_trips_through_compressed_bytes() {
        let mut rng = StdRng::seed_from_u64(2);
        let scalar: FrBls = sample_secret_scalar(&mut rng);
        let point = g1_scalar_mul(&g1_generator(), &scalar);
        let bytes = g1_to_compressed(&point);
        assert_eq!(bytes.len(), G1_COMPRESSED_BYTES);
        let recovered = g1_from_compressed(&bytes).unwrap();
        assert_eq!(point, recovered);
    }

    #[test]
    fn g1_from_compressed_rejects_wrong_length() {
        assert!(g1_from_compressed(&[0u8; 10]).is_err());
    }

    #[test]
    fn hash_to_curve_is_deterministic_and_dst_separated() {
        let a = hash_to_curve_g1(b"BBS_ATTR_GENERATOR_1_V1", b"");
        let b = hash_to_curve_g1(b"BBS_ATTR_GENERATOR_1_V1", b"");
        let c = hash_to_curve_g1(b"BBS_ATTR_GENERATOR_2_V1", b"");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
