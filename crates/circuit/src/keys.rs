//! Proving/verifying key persistence. Trusted-setup ceremony tooling is out
//! of scope, but this crate still owns loading and saving whatever key the
//! ceremony (or [`crate::setup`] in a development flow) produced, as a
//! versioned byte blob.

use ark_bn254::Bn254;
use ark_groth16::{ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use halp_types::Error;

const KEY_FORMAT_VERSION: u8 = 1;

/// A proving key serialized with a leading version byte.
pub struct ProvingKeyBytes(pub Vec<u8>);

/// A verifying key serialized with a leading version byte.
pub struct VerifyingKeyBytes(pub Vec<u8>);

impl ProvingKeyBytes {
    /// Serializes a proving key, prefixed with [`KEY_FORMAT_VERSION`].
    pub fn from_key(pk: &ProvingKey<Bn254>) -> Result<Self, Error> {
        let mut bytes = vec![KEY_FORMAT_VERSION];
        pk.serialize_compressed(&mut bytes)
            .map_err(|_| Error::Internal)?;
        Ok(ProvingKeyBytes(bytes))
    }

    /// Parses a versioned blob back into a proving key.
    pub fn into_key(self) -> Result<ProvingKey<Bn254>, Error> {
        let (version, rest) = self.0.split_first().ok_or(Error::Internal)?;
        if *version != KEY_FORMAT_VERSION {
            return Err(Error::InvalidInput("unsupported proving key version".into()));
        }
        ProvingKey::deserialize_compressed(rest).map_err(|_| Error::Internal)
    }
}

impl VerifyingKeyBytes {
    /// Serializes a verifying key, prefixed with [`KEY_FORMAT_VERSION`].
    pub fn from_key(vk: &VerifyingKey<Bn254>) -> Result<Self, Error> {
        let mut bytes = vec![KEY_FORMAT_VERSION];
        vk.serialize_compressed(&mut bytes)
            .map_err(|_| Error::Internal)?;
        Ok(VerifyingKeyBytes(bytes))
    }

    /// Parses a versioned blob back into a verifying key.
    pub fn into_key(self) -> Result<VerifyingKey<Bn254>, Error> {
        let (version, rest) = self.0.split_first().ok_or(Error::Internal)?;
        if *version != KEY_FORMAT_VERSION {
            return Err(Error::InvalidInput("unsupported verifying key version".into()));
        }
        VerifyingKey::deserialize_compressed(rest).map_err(|_| Error::Internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_std::rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn proving_key_round_trips_through_bytes() {
        let mut rng = StdRng::seed_from_u64(3);
        let (pk, vk) = crate::setup(&mut rng).unwrap();

        let pk_bytes = ProvingKeyBytes::from_key(&pk).unwrap();
        let pk2 = pk_bytes.into_key().unwrap();
        assert_eq!(pk.vk.alpha_g1, pk2.vk.alpha_g1);

        let vk_bytes = VerifyingKeyBytes::from_key(&vk).unwrap();
        let vk2 = vk_bytes.into_key().unwrap();
        assert_eq!(vk.alpha_g1, vk2.alpha_g1);
    }

    #[test]
    fn wrong_version_byte_is_rejected() {
        let mut rng = StdRng::seed_from_u64(4);
        let (_, vk) = crate::setup(&mut rng).unwrap();
        let mut bytes = VerifyingKeyBytes::from_key(&vk).unwrap();
        bytes.0[0] = 0xff;
        assert!(bytes.into_key().is_err());
    }
}
