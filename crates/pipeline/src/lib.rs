//! Challenge issuance and the eight-step hybrid-proof verification order
//! (§4.J). The challenge store and the nullifier registry are modeled as
//! traits — [`ChallengeStore`] and [`RegistryView`] — with in-memory
//! implementations here, so a caller can substitute a shared-storage-backed
//! implementation at compile time without this crate knowing about it. This
//! mirrors `halp-vault`'s `SecretStore` seam rather than a runtime-swappable
//! mock.

// Bounded counters (challenge TTLs, recent-root window sizes, base-36
// digit indices) whose arithmetic cannot realistically overflow or
// underflow for the ranges this crate produces them in.
#![allow(clippy::arithmetic_side_effects, clippy::cast_possible_truncation)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use ark_bls12_381::Fr as FrBls;
use ark_bn254::Fr as FrBn254;
use ark_groth16::VerifyingKey;
use halp_bbs::BlsPublicKey;
use halp_merkle::NullifierRegistry;
use halp_orchestrator::HybridAuthPackage;
use halp_primitives::{sample_secret_scalar, scalar_to_be_bytes};
use halp_types::Error;

/// Challenge time-to-live: five minutes, per §4.J.
pub const CHALLENGE_TTL_MS: u64 = 5 * 60 * 1000;
/// Sweep interval for [`spawn_challenge_sweeper`].
pub const SWEEP_INTERVAL_SECS: u64 = 60;
/// The only circuit this pipeline verifies against.
pub const CIRCUIT_ID: &str = "halp-auth-v1";

/// `created -> (verified -> consumed) | (expired -> evicted)`.
#[derive(Clone, Debug)]
pub struct Challenge {
    /// Server-assigned identifier, e.g. `ch_<base36 timestamp>_<hex suffix>`.
    pub challenge_id: String,
    /// Fresh random scalar the holder must bind into its proof.
    pub challenge: FrBls,
    /// Domain the resulting pseudonym and nullifier are scoped to.
    pub domain: String,
    /// Registry root captured at issuance time.
    pub registry_root: FrBn254,
    /// Circuit the challenge was issued for.
    pub circuit_id: &'static str,
    /// Unix-epoch milliseconds the challenge was issued.
    pub created_at: u64,
    /// Unix-epoch milliseconds after which the challenge is no longer valid.
    pub expires_at: u64,
    /// Set once a package answering this challenge has been verified.
    pub consumed: bool,
}

/// Storage for outstanding challenges, keyed by `challengeId`.
pub trait ChallengeStore: Send + Sync {
    /// Stores a freshly issued challenge.
    fn insert(&self, challenge: Challenge) -> Result<(), Error>;
    /// Fails with `InvalidChallenge` if no entry exists for `challenge_id`.
    fn get(&self, challenge_id: &str) -> Result<Challenge, Error>;
    /// Marks a challenge consumed. Idempotent: consuming twice is not an
    /// error.
    fn consume(&self, challenge_id: &str) -> Result<(), Error>;
    /// Evicts entries with `expires_at <= now_ms`, returning the count
    /// removed.
    fn sweep_expired(&self, now_ms: u64) -> usize;
}

/// Process-local challenge map behind a single mutex — adequate for one
/// verifier process; a clustered deployment would swap in a shared-store
/// implementation of [`ChallengeStore`] without touching this crate.
#[derive(Default)]
pub struct InMemoryChallengeStore {
    entries: Mutex<HashMap<String, Challenge>>,
}

impl InMemoryChallengeStore {
    /// Builds an empty challenge store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChallengeStore for InMemoryChallengeStore {
    fn insert(&self, challenge: Challenge) -> Result<(), Error> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(challenge.challenge_id.clone(), challenge);
        Ok(())
    }

    fn get(&self, challenge_id: &str) -> Result<Challenge, Error> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(challenge_id)
            .cloned()
            .ok_or(Error::InvalidChallenge)
    }

    fn consume(&self, challenge_id: &str) -> Result<(), Error> {
        if let Some(entry) = self.entries.lock().unwrap_or_else(|p| p.into_inner()).get_mut(challenge_id) {
            entry.consumed = true;
        }
        Ok(())
    }

    fn sweep_expired(&self, now_ms: u64) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let before = entries.len();
        entries.retain(|_, c| c.expires_at > now_ms);
        before - entries.len()
    }
}

/// View onto the spent-nullifier registry (§4.G) that the pipeline needs:
/// current root, presence check, and insertion — plus root-freshness policy,
/// which is allowed to accept a bounded window of recently-superseded roots
/// rather than only the exact current one.
pub trait RegistryView: Send + Sync {
    /// The registry's current root.
    fn root(&self) -> FrBn254;
    /// Whether `nullifier` has already been registered.
    fn check(&self, nullifier: FrBn254) -> bool;
    /// Registers a fresh nullifier, returning its tree index and new root.
    fn register(
        &self,
        nullifier: FrBn254,
        domain: String,
        pseudonym: FrBn254,
        timestamp: u64,
    ) -> Result<(usize, FrBn254), Error>;
    /// Whether `claimed` is a root this view currently accepts as fresh.
    fn accept_root(&self, claimed: FrBn254) -> bool {
        claimed == self.root()
    }
}

/// Wraps [`NullifierRegistry`] and additionally remembers the last `window
/// + 1` published roots, so a verification request racing a concurrent
/// registration does not spuriously fail on root staleness. `window = 0`
/// (the default via [`InMemoryRegistryView::new`]) means exact-match only.
///
/// Holds the registry behind an `Arc` rather than owning it outright so a
/// caller assembling a [`halp_orchestrator::HybridAuthPackage`] can fetch a
/// non-membership proof from the exact same tree this view registers
/// into — see [`InMemoryRegistryView::registry`].
pub struct InMemoryRegistryView {
    registry: std::sync::Arc<NullifierRegistry>,
    recent_roots: Mutex<VecDeque<FrBn254>>,
    window: usize,
}

impl InMemoryRegistryView {
    /// Wraps `registry`, remembering its current root plus up to `window`
    /// prior ones.
    pub fn new(registry: std::sync::Arc<NullifierRegistry>, window: usize) -> Self {
        let mut recent_roots = VecDeque::with_capacity(window + 1);
        recent_roots.push_back(registry.root());
        InMemoryRegistryView {
            registry,
            recent_roots: Mutex::new(recent_roots),
            window,
        }
    }

    /// The underlying registry, for callers (witness assembly) that need
    /// direct access rather than the [`RegistryView`] trait surface.
    pub fn registry(&self) -> &NullifierRegistry {
        &self.registry
    }
}

impl RegistryView for InMemoryRegistryView {
    fn root(&self) -> FrBn254 {
        self.registry.root()
    }

    fn check(&self, nullifier: FrBn254) -> bool {
        self.registry.check(nullifier)
    }

    fn register(
        &self,
        nullifier: FrBn254,
        domain: String,
        pseudonym: FrBn254,
        timestamp: u64,
    ) -> Result<(usize, FrBn254), Error> {
        let (tree_index, new_root) = self.registry.register(nullifier, domain, pseudonym, timestamp)?;
        let mut roots = self.recent_roots.lock().unwrap_or_else(|p| p.into_inner());
        roots.push_back(new_root);
        while roots.len() > self.window + 1 {
            roots.pop_front();
        }
        Ok((tree_index, new_root))
    }

    fn accept_root(&self, claimed: FrBn254) -> bool {
        self.recent_roots
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&claimed)
    }
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).expect("base36 digits are ASCII")
}

fn random_hex_suffix() -> String {
    let mut bytes = [0u8; 4];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut bytes);
    hex::encode(bytes)
}

/// `issueChallenge(domain) -> Challenge`, per §4.J: fresh `challengeId`,
/// fresh `Fr_bls` challenge value, the registry's current root, five-minute
/// TTL.
pub fn issue_challenge<C: ChallengeStore, R: RegistryView>(
    store: &C,
    registry: &R,
    domain: &str,
    now_ms: u64,
) -> Result<Challenge, Error> {
    let challenge_id = format!("ch_{}_{}", to_base36(now_ms), random_hex_suffix());
    let challenge: FrBls = sample_secret_scalar(&mut rand::rngs::OsRng);
    let challenge_record = Challenge {
        challenge_id: challenge_id.clone(),
        challenge,
        domain: domain.to_string(),
        registry_root: registry.root(),
        circuit_id: CIRCUIT_ID,
        created_at: now_ms,
        expires_at: now_ms + CHALLENGE_TTL_MS,
        consumed: false,
    };
    store.insert(challenge_record.clone())?;
    tracing::info!(challenge_id = %challenge_id, domain, "issued challenge");
    Ok(challenge_record)
}

/// The pseudonymous session record returned to the caller on successful
/// verification.
#[derive(Clone, Debug)]
pub struct VerifiedSession {
    /// Context pseudonym the verified package authenticated as.
    pub pseudonym: FrBn254,
    /// Domain the session was verified under.
    pub domain: String,
    /// Unix-epoch milliseconds verification completed.
    pub verified_at: u64,
}

/// `verifyHybridAuthPackage(package) -> VerifiedSession`, running the eight
/// ordered checks of §4.J. Any failure short-circuits with a typed error;
/// the registry is only mutated after every prior check has passed, so a
/// request that fails late (e.g. a stale root) can never half-register a
/// nullifier.
#[allow(clippy::too_many_arguments)]
pub fn verify_hybrid_auth_package<C: ChallengeStore, R: RegistryView>(
    store: &C,
    registry: &R,
    package: &HybridAuthPackage,
    verifying_key: &VerifyingKey<ark_bn254::Bn254>,
    issuer_public_key: Option<&BlsPublicKey>,
    revealed_messages: &BTreeMap<usize, Vec<u8>>,
    total_messages: usize,
    now_ms: u64,
) -> Result<VerifiedSession, Error> {
    // 1. Challenge validity.
    let challenge_record = store.get(&package.challenge_id)?;
    if challenge_record.consumed || challenge_record.challenge != package.challenge {
        return Err(Error::InvalidChallenge);
    }
    if now_ms >= challenge_record.expires_at {
        return Err(Error::ChallengeExpired);
    }

    // 2. Structure. Groth16 proof and field elements are already
    // strongly typed by this point (no hex/JSON decoding happens inside
    // this crate); the one shape check that still applies is that every
    // revealed-message index is in range.
    if revealed_messages.keys().any(|idx| *idx >= total_messages) {
        return Err(Error::InvalidInput(
            "revealed message index out of range".into(),
        ));
    }

    // 3. SNARK.
    let snark_valid = halp_circuit::verify(verifying_key, &package.public_inputs, &package.snark_proof)?;
    if !snark_valid {
        return Err(Error::InvalidProof);
    }

    // 4. BBS+ (optional).
    if let Some(bbs_proof) = &package.bbs_proof {
        let pk = issuer_public_key.ok_or(Error::InvalidProof)?;
        let nonce = scalar_to_be_bytes(&package.challenge);
        let bbs_valid = halp_bbs::verify_proof(pk, bbs_proof, revealed_messages, total_messages, &nonce)?;
        if !bbs_valid {
            return Err(Error::InvalidProof);
        }
    }

    // 5. Binding.
    if package.public_inputs.commitment_hash != package.commitment_hash {
        return Err(Error::BindingMismatch);
    }
    if package.bbs_proof.is_some() {
        let expected = halp_orchestrator::commitment_hash_bytes(&package.commitment_hash);
        match revealed_messages.get(&0) {
            Some(bytes) if bytes.as_slice() == expected => {}
            _ => return Err(Error::BindingMismatch),
        }
    }

    // 6. Registry-root freshness.
    if !registry.accept_root(package.registry_root) {
        return Err(Error::RegistryRootMismatch);
    }

    // 7. Nullifier freshness.
    if registry.check(package.nullifier) {
        return Err(Error::NullifierReused);
    }

    // 8. Register.
    registry.register(
        package.nullifier,
        package.domain.clone(),
        package.pseudonym,
        package.timestamp,
    )?;
    store.consume(&challenge_record.challenge_id)?;

    tracing::info!(domain = %package.domain, "hybrid auth package verified");
    Ok(VerifiedSession {
        pseudonym: package.pseudonym,
        domain: package.domain.clone(),
        verified_at: now_ms,
    })
}

/// Spawns the periodic challenge sweeper (§4.J: 60-second fire-and-forget
/// eviction of expired entries). Not started implicitly by this crate —
/// the caller owns the runtime and decides whether/when to run it, per
/// §9's "construct in main and inject" guidance.
pub fn spawn_challenge_sweeper<C, NowFn>(
    store: std::sync::Arc<C>,
    now_ms: NowFn,
) -> tokio::task::JoinHandle<()>
where
    C: ChallengeStore + 'static,
    NowFn: Fn() -> u64 + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let evicted = store.sweep_expired(now_ms());
            if evicted > 0 {
                tracing::debug!(evicted, "swept expired challenges");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_challenge_has_five_minute_ttl() {
        let store = InMemoryChallengeStore::new();
        let registry = InMemoryRegistryView::new(std::sync::Arc::new(NullifierRegistry::new()), 0);
        let challenge = issue_challenge(&store, &registry, "example.com", 1_000).unwrap();
        assert_eq!(challenge.expires_at, 1_000 + CHALLENGE_TTL_MS);
        assert!(challenge.challenge_id.starts_with("ch_"));
    }

    #[test]
    fn get_missing_challenge_is_invalid_challenge() {
        let store = InMemoryChallengeStore::new();
        let err = store.get("ch_missing").unwrap_err();
        assert!(matches!(err, Error::InvalidChallenge));
    }

    #[test]
    fn sweep_expired_evicts_only_past_entries() {
        let store = InMemoryChallengeStore::new();
        let registry = InMemoryRegistryView::new(std::sync::Arc::new(NullifierRegistry::new()), 0);
        let fresh = issue_challenge(&store, &registry, "a.com", 1_000).unwrap();
        let stale = issue_challenge(&store, &registry, "b.com", 0).unwrap();
        let evicted = store.sweep_expired(CHALLENGE_TTL_MS + 1);
        assert_eq!(evicted, 1);
        assert!(store.get(&fresh.challenge_id).is_ok());
        assert!(store.get(&stale.challenge_id).is_err());
    }

    #[test]
    fn consume_is_idempotent() {
        let store = InMemoryChallengeStore::new();
        let registry = InMemoryRegistryView::new(std::sync::Arc::new(NullifierRegistry::new()), 0);
        let challenge = issue_challenge(&store, &registry, "a.com", 1_000).unwrap();
        store.consume(&challenge.challenge_id).unwrap();
        store.consume(&challenge.challenge_id).unwrap();
        assert!(store.get(&challenge.challenge_id).unwrap().consumed);
    }

    #[test]
    fn registry_view_exact_match_rejects_stale_root_by_default() {
        let registry = std::sync::Arc::new(NullifierRegistry::new());
        let view = InMemoryRegistryView::new(registry, 0);
        let stale_root = view.root();
        view.register(FrBn254::from(1u64), "a.com".into(), FrBn254::from(0u64), 1)
            .unwrap();
        assert!(!view.accept_root(stale_root));
        assert!(view.accept_root(view.root()));
    }

    #[test]
    fn registry_view_with_window_accepts_recent_roots() {
        let registry = std::sync::Arc::new(NullifierRegistry::new());
        let view = InMemoryRegistryView::new(registry, 1);
        let root0 = view.root();
        view.register(FrBn254::from(2u64), "a.com".into(), FrBn254::from(0u64), 1)
            .unwrap();
        assert!(view.accept_root(root0));
    }
}
