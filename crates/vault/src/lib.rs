//! Master-secret lifecycle and context-pseudonym derivation (§4.C).
//!
//! Storage is a trait (`SecretStore`) so the production OS-keyring backend
//! and the in-memory test backend are two compile-time implementations of
//! one interface rather than a runtime-swappable mock, per §9's dynamic
//! dispatch note.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use aes_gcm::aead::{generic_array::GenericArray, AeadInPlace, KeyInit};
use aes_gcm::AesGcm;
use halp_primitives::{
    g1_generator, g1_scalar_mul, g1_to_compressed, hash_to_curve_g1, sample_secret_scalar, FrBls,
    G1Bls, G1_COMPRESSED_BYTES,
};
use halp_types::Error;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// The spec's envelope uses a 16-byte IV (rather than the more common
/// 96-bit/12-byte AES-GCM nonce); `aes-gcm`'s generic `AesGcm` type accepts
/// an arbitrary nonce size via its type-level `NonceSize` parameter, so we
/// instantiate it at `U16` instead of reaching for a hand-rolled cipher.
type Aes256Gcm16 = AesGcm<aes_gcm::aes::Aes256, aes_gcm::aead::consts::U16>;
const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;
const ENVELOPE_VERSION: u32 = 1;
const PSEUDONYM_DST_PREFIX: &str = "BBS_PSEUDONYM_";
const KEYRING_SERVICE: &str = "halp-credential-system";

/// Storage backend for the encrypted master-secret envelope, keyed by
/// account string (`ms:<holderId>`). Implementations need not be aware of
/// the envelope's internal structure; they move opaque JSON payloads.
pub trait SecretStore: Send + Sync {
    /// Whether an envelope is stored for `account`.
    fn has(&self, account: &str) -> Result<bool, Error>;
    /// Fetches the stored envelope JSON for `account`.
    fn get(&self, account: &str) -> Result<String, Error>;
    /// Stores `payload` for `account`, overwriting any existing value.
    fn put(&self, account: &str, payload: &str) -> Result<(), Error>;
    /// Removes the stored envelope for `account`, if any.
    fn delete(&self, account: &str) -> Result<bool, Error>;
}

/// Production backend: the OS keychain/keyring, via the `keyring` crate.
pub struct KeyringStore;

impl KeyringStore {
    /// Builds a handle onto the OS keyring. Holds no state itself.
    pub fn new() -> Self {
        KeyringStore
    }

    fn entry(&self, account: &str) -> Result<keyring::Entry, Error> {
        keyring::Entry::new(KEYRING_SERVICE, account).map_err(|_| Error::Internal)
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for KeyringStore {
    fn has(&self, account: &str) -> Result<bool, Error> {
        match self.entry(account)?.get_password() {
            Ok(_) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(_) => Err(Error::Internal),
        }
    }

    fn get(&self, account: &str) -> Result<String, Error> {
        self.entry(account)?.get_password().map_err(|e| match e {
            keyring::Error::NoEntry => Error::NotFound,
            _ => Error::Internal,
        })
    }

    fn put(&self, account: &str, payload: &str) -> Result<(), Error> {
        self.entry(account)?
            .set_password(payload)
            .map_err(|_| Error::Internal)
    }

    fn delete(&self, account: &str) -> Result<bool, Error> {
        match self.entry(account)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(_) => Err(Error::Internal),
        }
    }
}

/// In-memory backend for tests and hosts without an OS keyring.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Builds an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemoryStore {
    fn has(&self, account: &str) -> Result<bool, Error> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(account))
    }

    fn get(&self, account: &str) -> Result<String, Error> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(account)
            .cloned()
            .ok_or(Error::NotFound)
    }

    fn put(&self, account: &str, payload: &str) -> Result<(), Error> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(account.to_string(), payload.to_string());
        Ok(())
    }

    fn delete(&self, account: &str) -> Result<bool, Error> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(account)
            .is_some())
    }
}

/// Source of the process-local AES-256-GCM wrapping key. Swapping between
/// variants must not change the on-disk ciphertext envelope format (§4.C).
#[derive(Clone)]
pub enum KeySource {
    /// Fixed key material, for development and tests.
    Static([u8; 32]),
    /// An HSM- or secure-enclave-backed caller supplies the key on demand.
    External(Arc<dyn Fn() -> Result<[u8; 32], Error> + Send + Sync>),
}

impl KeySource {
    fn resolve(&self) -> Result<[u8; 32], Error> {
        match self {
            KeySource::Static(key) => Ok(*key),
            KeySource::External(f) => f(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeMetadata {
    pseudonym_hex: String,
    created_at: u64,
    version: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    iv: String,
    auth_tag: String,
    ciphertext: String,
    metadata: EnvelopeMetadata,
}

/// Metadata returned by [`MasterSecretVault::generate`].
#[derive(Debug, Clone)]
pub struct GeneratedMetadata {
    /// Hex-encoded compressed base pseudonym `G^ms`.
    pub pseudonym_hex: String,
    /// Unix-epoch milliseconds the master secret was generated.
    pub created_at: u64,
    /// Envelope format version the secret was sealed under.
    pub version: u32,
}

/// Per-vault configuration: where the AES-256-GCM wrapping key comes from.
pub struct VaultConfig {
    /// How the wrapping key is obtained.
    pub key_source: KeySource,
}

/// Master-secret lifecycle over a [`SecretStore`] backend, sealing each
/// secret in an AES-256-GCM envelope keyed by [`VaultConfig::key_source`].
pub struct MasterSecretVault<S: SecretStore> {
    store: S,
    config: VaultConfig,
}

fn account_for(holder: &str) -> String {
    format!("ms:{holder}")
}

impl<S: SecretStore> MasterSecretVault<S> {
    /// Wraps `store`, sealing and unsealing envelopes with `config`.
    pub fn new(store: S, config: VaultConfig) -> Self {
        MasterSecretVault { store, config }
    }

    /// `has(holder) -> bool`: keyring lookup.
    pub fn has(&self, holder: &str) -> Result<bool, Error> {
        self.store.has(&account_for(holder))
    }

    /// `generate(holder) -> metadata`. Fails with `AlreadyExists` if a
    /// master secret is already stored for this holder (at most one master
    /// secret per holder identifier, per §3's invariant).
    pub fn generate(&self, holder: &str, created_at: u64) -> Result<GeneratedMetadata, Error> {
        let account = account_for(holder);
        if self.store.has(&account)? {
            return Err(Error::AlreadyExists);
        }

        let mut rng = rand::rngs::OsRng;
        let ms: FrBls = sample_secret_scalar(&mut rng);
        let nym = g1_scalar_mul(&g1_generator(), &ms);
        let pseudonym_hex = hex::encode(g1_to_compressed(&nym));

        let envelope = self.seal(&ms, &pseudonym_hex, created_at)?;
        self.store.put(&account, &serde_json::to_string(&envelope).map_err(|_| Error::Internal)?)?;
        tracing::info!(holder, pseudonym = %pseudonym_hex, "generated master secret");

        Ok(GeneratedMetadata {
            pseudonym_hex,
            created_at,
            version: ENVELOPE_VERSION,
        })
    }

    /// `get(holder) -> ms`: decrypts the stored envelope. Fails with
    /// `NotFound` if absent, `Internal` if the ciphertext was tampered with.
    /// Callers should use the returned scalar only for the duration of the
    /// current operation and let it drop immediately afterward.
    pub fn get(&self, holder: &str) -> Result<FrBls, Error> {
        let account = account_for(holder);
        let payload = self.store.get(&account)?;
        let envelope: Envelope =
            serde_json::from_str(&payload).map_err(|_| Error::Internal)?;
        self.open(&envelope)
    }

    /// `deriveContextPseudonym(holder, context) -> (point_bytes, context)`.
    pub fn derive_context_pseudonym(
        &self,
        holder: &str,
        context: &str,
    ) -> Result<([u8; G1_COMPRESSED_BYTES], String), Error> {
        let mut ms = self.get(holder)?;
        let dst = format!("{PSEUDONYM_DST_PREFIX}{context}");
        let g_ctx = hash_to_curve_g1(dst.as_bytes(), b"");
        let point = g1_scalar_mul(&g_ctx, &ms);
        ms.zeroize();
        Ok((g1_to_compressed(&point), context.to_string()))
    }

    /// `delete(holder) -> bool`.
    pub fn delete(&self, holder: &str) -> Result<bool, Error> {
        let removed = self.store.delete(&account_for(holder))?;
        if removed {
            tracing::info!(holder, "deleted master secret");
        }
        Ok(removed)
    }

    fn cipher(&self) -> Result<Aes256Gcm16, Error> {
        let key = self.config.key_source.resolve()?;
        Ok(Aes256Gcm16::new(GenericArray::from_slice(&key)))
    }

    fn seal(&self, ms: &FrBls, pseudonym_hex: &str, created_at: u64) -> Result<Envelope, Error> {
        let cipher = self.cipher()?;
        let mut iv = [0u8; IV_LEN];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut iv);
        let nonce = GenericArray::from_slice(&iv);

        let mut buffer = halp_primitives::scalar_to_be_bytes(ms).to_vec();
        let tag = cipher
            .encrypt_in_place_detached(nonce, b"", &mut buffer)
            .map_err(|_| Error::Internal)?;

        Ok(Envelope {
            version: ENVELOPE_VERSION,
            iv: hex::encode(iv),
            auth_tag: hex::encode(tag),
            ciphertext: hex::encode(buffer),
            metadata: EnvelopeMetadata {
                pseudonym_hex: pseudonym_hex.to_string(),
                created_at,
                version: ENVELOPE_VERSION,
            },
        })
    }

    fn open(&self, envelope: &Envelope) -> Result<FrBls, Error> {
        let cipher = self.cipher()?;
        let iv = hex::decode(&envelope.iv).map_err(|_| Error::Internal)?;
        if iv.len() != IV_LEN {
            return Err(Error::Internal);
        }
        let nonce = GenericArray::from_slice(&iv);

        let mut ciphertext = hex::decode(&envelope.ciphertext).map_err(|_| Error::Internal)?;
        let tag_bytes = hex::decode(&envelope.auth_tag).map_err(|_| Error::Internal)?;
        if tag_bytes.len() != TAG_LEN {
            return Err(Error::Internal);
        }
        let tag = GenericArray::from_slice(&tag_bytes);

        cipher
            .decrypt_in_place_detached(nonce, b"", &mut ciphertext, tag)
            .map_err(|_| Error::Internal)?;

        let scalar = halp_primitives::scalar_from_be_bytes_strict::<FrBls>(&ciphertext)
            .map_err(|_| Error::Internal)?;
        ciphertext.zeroize();
        Ok(scalar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vault() -> MasterSecretVault<MemoryStore> {
        MasterSecretVault::new(
            MemoryStore::new(),
            VaultConfig {
                key_source: KeySource::Static([7u8; 32]),
            },
        )
    }

    #[test]
    fn generate_then_has_is_true() {
        let vault = test_vault();
        assert!(!vault.has("alice").unwrap());
        vault.generate("alice", 1000).unwrap();
        assert!(vault.has("alice").unwrap());
    }

    #[test]
    fn generate_twice_fails_with_already_exists() {
        let vault = test_vault();
        vault.generate("alice", 1000).unwrap();
        let err = vault.generate("alice", 1000).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists));
    }

    #[test]
    fn get_missing_holder_fails_with_not_found() {
        let vault = test_vault();
        let err = vault.get("bob").unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[test]
    fn get_after_generate_recovers_a_valid_scalar() {
        let vault = test_vault();
        vault.generate("alice", 1000).unwrap();
        let ms = vault.get("alice").unwrap();
        assert_ne!(ms, FrBls::from(0u64));
    }

    #[test]
    fn derive_context_pseudonym_is_deterministic_and_domain_separated() {
        let vault = test_vault();
        vault.generate("alice", 1000).unwrap();
        let (p1, _) = vault.derive_context_pseudonym("alice", "example.com").unwrap();
        let (p2, _) = vault.derive_context_pseudonym("alice", "example.com").unwrap();
        let (p3, _) = vault.derive_context_pseudonym("alice", "other.com").unwrap();
        assert_eq!(p1, p2);
        assert_ne!(p1, p3);
    }

    #[test]
    fn delete_removes_the_entry() {
        let vault = test_vault();
        vault.generate("alice", 1000).unwrap();
        assert!(vault.delete("alice").unwrap());
        assert!(!vault.has("alice").unwrap());
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let vault = test_vault();
        vault.generate("alice", 1000).unwrap();
        let account = account_for("alice");
        let raw = vault.store.get(&account).unwrap();
        let mut envelope: Envelope = serde_json::from_str(&raw).unwrap();
        let mut bytes = hex::decode(&envelope.ciphertext).unwrap();
        bytes[0] ^= 0xFF;
        envelope.ciphertext = hex::encode(bytes);
        vault
            .store
            .put(&account, &serde_json::to_string(&envelope).unwrap())
            .unwrap();
        assert!(vault.get("alice").is_err());
    }
}
