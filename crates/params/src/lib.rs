//! Public parameters: `G`, the attribute generators `H_1..H_k`, and the
//! blinding generator `H_r`, all derived via hash-to-curve with distinct
//! domain-separation tags (§3, §4.D). Generated once, loaded read-only
//! thereafter, versioned on disk as JSON — the same versioned-artifact shape
//! used elsewhere in this workspace for Groth16 keys.

use halp_primitives::{g1_from_compressed, g1_generator, g1_to_compressed, hash_to_curve_g1, G1Bls};
use halp_types::Error;
use serde::{Deserialize, Serialize};

const CURRENT_VERSION: u32 = 1;
const ATTR_GENERATOR_DST_PREFIX: &str = "BBS_ATTR_GENERATOR_";
const ATTR_GENERATOR_DST_SUFFIX: &str = "_V1";
const BLINDING_GENERATOR_DST: &str = "BBS_BLINDING_GENERATOR_V1";

/// `G`, the attribute generators `H_1..H_k`, and the blinding generator
/// `H_r`, plus the bookkeeping (`version`, `max_attributes`, `generated_at`)
/// needed to validate and persist them.
#[derive(Debug, Clone)]
pub struct PublicParameters {
    /// Format version, bumped whenever the generator-derivation scheme changes.
    pub version: u32,
    /// Maximum number of attributes `k` a commitment under these parameters may carry.
    pub max_attributes: usize,
    /// Base generator bound to the master secret.
    pub g: G1Bls,
    /// Per-attribute generators `H_1..H_k`.
    pub h_attrs: Vec<G1Bls>,
    /// Blinding generator.
    pub h_r: G1Bls,
    /// Unix-epoch seconds these parameters were generated.
    pub generated_at: u64,
}

/// On-wire representation: hex-encoded compressed points, as every other
/// G1 value in §6's external interfaces.
#[derive(Debug, Serialize, Deserialize)]
struct PublicParametersDto {
    version: u32,
    max_attributes: usize,
    g: String,
    h_attrs: Vec<String>,
    h_r: String,
    generated_at: u64,
}

impl PublicParameters {
    /// Deterministically derives `G`, `H_1..H_k`, and `H_r` via hash-to-curve
    /// with the fixed DSTs from §3. `generated_at` is supplied by the caller
    /// (this crate does not read the system clock).
    pub fn generate(max_attributes: usize, generated_at: u64) -> Self {
        let h_attrs = (1..=max_attributes)
            .map(|i| {
                let dst = format!("{ATTR_GENERATOR_DST_PREFIX}{i}{ATTR_GENERATOR_DST_SUFFIX}");
                hash_to_curve_g1(dst.as_bytes(), b"")
            })
            .collect();
        let h_r = hash_to_curve_g1(BLINDING_GENERATOR_DST.as_bytes(), b"");

        PublicParameters {
            version: CURRENT_VERSION,
            max_attributes,
            g: g1_generator(),
            h_attrs,
            h_r,
            generated_at,
        }
    }

    /// Checks that `|H_i| == max_attributes`, every generator deserializes
    /// (already guaranteed for an in-memory value, but re-checked here so
    /// the same function validates freshly-loaded parameters), and that all
    /// generators (`G`, `H_1..H_k`, `H_r`) are pairwise distinct.
    pub fn verify(&self) -> Result<(), Error> {
        if self.h_attrs.len() != self.max_attributes {
            return Err(Error::InvalidInput(format!(
                "expected {} attribute generators, found {}",
                self.max_attributes,
                self.h_attrs.len()
            )));
        }

        let mut all_points = vec![self.g, self.h_r];
        all_points.extend(self.h_attrs.iter().copied());

        for point in &all_points {
            let bytes = g1_to_compressed(point);
            g1_from_compressed(&bytes)?;
        }

        for i in 0..all_points.len() {
            for j in (i + 1)..all_points.len() {
                if all_points[i] == all_points[j] {
                    return Err(Error::InvalidInput(
                        "public parameter generators must be pairwise distinct".into(),
                    ));
                }
            }
        }

        Ok(())
    }

    fn to_dto(&self) -> PublicParametersDto {
        PublicParametersDto {
            version: self.version,
            max_attributes: self.max_attributes,
            g: hex::encode(g1_to_compressed(&self.g)),
            h_attrs: self
                .h_attrs
                .iter()
                .map(|h| hex::encode(g1_to_compressed(h)))
                .collect(),
            h_r: hex::encode(g1_to_compressed(&self.h_r)),
            generated_at: self.generated_at,
        }
    }

    fn from_dto(dto: PublicParametersDto) -> Result<Self, Error> {
        let decode = |s: &str| -> Result<G1Bls, Error> {
            let bytes = hex::decode(s).map_err(|_| Error::InvalidPoint)?;
            g1_from_compressed(&bytes)
        };

        Ok(PublicParameters {
            version: dto.version,
            max_attributes: dto.max_attributes,
            g: decode(&dto.g)?,
            h_attrs: dto
                .h_attrs
                .iter()
                .map(|s| decode(s))
                .collect::<Result<Vec<_>, _>>()?,
            h_r: decode(&dto.h_r)?,
            generated_at: dto.generated_at,
        })
    }

    /// Serializes to the versioned JSON artifact format.
    pub fn save(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(&self.to_dto())
            .map_err(|_| Error::Internal)
    }

    /// Parses and validates a versioned JSON artifact, rejecting anything
    /// that fails [`PublicParameters::verify`].
    pub fn load(json: &str) -> Result<Self, Error> {
        let dto: PublicParametersDto =
            serde_json::from_str(json).map_err(|_| Error::InvalidInput("malformed parameters JSON".into()))?;
        let params = Self::from_dto(dto)?;
        params.verify()?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_parameters_verify() {
        let params = PublicParameters::generate(4, 0);
        assert!(params.verify().is_ok());
    }

    #[test]
    fn save_load_round_trips() {
        let params = PublicParameters::generate(3, 1_700_000_000);
        let json = params.save().unwrap();
        let loaded = PublicParameters::load(&json).unwrap();
        assert_eq!(loaded.max_attributes, params.max_attributes);
        assert_eq!(loaded.g, params.g);
        assert_eq!(loaded.h_attrs, params.h_attrs);
        assert_eq!(loaded.h_r, params.h_r);
    }

    #[test]
    fn verify_rejects_duplicate_generator_count_mismatch() {
        let mut params = PublicParameters::generate(2, 0);
        params.h_attrs.pop();
        assert!(params.verify().is_err());
    }

    #[test]
    fn different_attribute_indices_yield_distinct_generators() {
        let params = PublicParameters::generate(5, 0);
        for i in 0..params.h_attrs.len() {
            for j in (i + 1)..params.h_attrs.len() {
                assert_ne!(params.h_attrs[i], params.h_attrs[j]);
            }
        }
    }
}
