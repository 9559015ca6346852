//! Operator entry point for the credential core: a thin `clap` front end
//! over `halp-vault`, `halp-params`, `halp-merkle` and `halp-pipeline`.
//! Not a server — every subcommand runs one operation against process-local
//! state and exits.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use halp_merkle::NullifierRegistry;
use halp_params::PublicParameters;
use halp_pipeline::{issue_challenge, InMemoryChallengeStore, InMemoryRegistryView};
use halp_vault::{KeySource, KeyringStore, MasterSecretVault, VaultConfig};

const VAULT_KEY_ENV: &str = "HALP_VAULT_KEY";

#[derive(Debug, Parser)]
#[command(name = "halp-cli", about = "Operator CLI for the credential core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Master-secret lifecycle (OS keyring-backed).
    Vault {
        #[command(subcommand)]
        command: VaultCommand,
    },
    /// Pedersen-commitment public parameters.
    Params {
        #[command(subcommand)]
        command: ParamsCommand,
    },
    /// Nullifier registry inspection.
    Merkle {
        #[command(subcommand)]
        command: MerkleCommand,
    },
    /// Challenge issuance.
    Challenge {
        #[command(subcommand)]
        command: ChallengeCommand,
    },
}

#[derive(Debug, Subcommand)]
enum VaultCommand {
    /// Generate a new master secret for a holder. Fails if one already exists.
    Generate {
        holder: String,
        #[arg(long, default_value_t = 0)]
        created_at: u64,
    },
    /// Check whether a holder already has a master secret stored.
    Has { holder: String },
    /// Delete a holder's stored master secret.
    Delete { holder: String },
}

#[derive(Debug, Subcommand)]
enum ParamsCommand {
    /// Derive fresh public parameters and write them to a JSON file.
    Generate {
        #[arg(long)]
        max_attributes: usize,
        #[arg(long, default_value_t = 0)]
        generated_at: u64,
        #[arg(long)]
        out: PathBuf,
    },
    /// Load a parameters file and re-run its well-formedness checks.
    Verify { file: PathBuf },
}

#[derive(Debug, Subcommand)]
enum MerkleCommand {
    /// Print the root of a freshly initialized (empty) nullifier registry.
    Root,
}

#[derive(Debug, Subcommand)]
enum ChallengeCommand {
    /// Issue a challenge against a freshly initialized (empty) registry.
    Issue {
        domain: String,
        #[arg(long, default_value_t = 0)]
        now_ms: u64,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

/// Resolves the AES-256-GCM vault key from `HALP_VAULT_KEY` (64 hex chars).
/// The keyring stores only ciphertext; this key never touches disk itself.
fn vault_key_source() -> Result<KeySource> {
    let hex_key = std::env::var(VAULT_KEY_ENV)
        .with_context(|| format!("set {VAULT_KEY_ENV} to a 64-character hex AES-256 key"))?;
    let bytes = hex::decode(&hex_key).context("HALP_VAULT_KEY is not valid hex")?;
    if bytes.len() != 32 {
        bail!("HALP_VAULT_KEY must decode to exactly 32 bytes, got {}", bytes.len());
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(KeySource::Static(key))
}

fn run_vault(command: VaultCommand) -> Result<()> {
    let vault = MasterSecretVault::new(
        KeyringStore::new(),
        VaultConfig {
            key_source: vault_key_source()?,
        },
    );
    match command {
        VaultCommand::Generate { holder, created_at } => {
            let metadata = vault.generate(&holder, created_at)?;
            println!("pseudonym: {}", metadata.pseudonym_hex);
            println!("created_at: {}", metadata.created_at);
        }
        VaultCommand::Has { holder } => {
            println!("{}", vault.has(&holder)?);
        }
        VaultCommand::Delete { holder } => {
            println!("{}", vault.delete(&holder)?);
        }
    }
    Ok(())
}

fn run_params(command: ParamsCommand) -> Result<()> {
    match command {
        ParamsCommand::Generate {
            max_attributes,
            generated_at,
            out,
        } => {
            let params = PublicParameters::generate(max_attributes, generated_at);
            params.verify()?;
            let json = params.save()?;
            std::fs::write(&out, json).with_context(|| format!("writing {}", out.display()))?;
            println!("wrote parameters for {max_attributes} attributes to {}", out.display());
        }
        ParamsCommand::Verify { file } => {
            let json = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            let params = PublicParameters::load(&json)?;
            println!("ok: {} attribute generators, version {}", params.max_attributes, params.version);
        }
    }
    Ok(())
}

fn run_merkle(command: MerkleCommand) -> Result<()> {
    match command {
        MerkleCommand::Root => {
            let registry = NullifierRegistry::new();
            println!("{}", halp_primitives::scalar_to_be_bytes(&registry.root()).iter().map(|b| format!("{b:02x}")).collect::<String>());
        }
    }
    Ok(())
}

fn run_challenge(command: ChallengeCommand) -> Result<()> {
    match command {
        ChallengeCommand::Issue { domain, now_ms } => {
            let store = InMemoryChallengeStore::new();
            let registry = InMemoryRegistryView::new(std::sync::Arc::new(NullifierRegistry::new()), 0);
            let challenge = issue_challenge(&store, &registry, &domain, now_ms)?;
            println!("challenge_id: {}", challenge.challenge_id);
            println!(
                "challenge: {}",
                hex::encode(halp_primitives::scalar_to_be_bytes(&challenge.challenge))
            );
            println!("expires_at: {}", challenge.expires_at);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Vault { command } => run_vault(command),
        Command::Params { command } => run_params(command),
        Command::Merkle { command } => run_merkle(command),
        Command::Challenge { command } => run_challenge(command),
    };

    if let Err(err) = result {
        tracing::error!(%err, "command failed");
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_generate_then_verify_round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("params.json");

        run_params(ParamsCommand::Generate {
            max_attributes: 3,
            generated_at: 1_700_000_000,
            out: out.clone(),
        })
        .unwrap();

        run_params(ParamsCommand::Verify { file: out }).unwrap();
    }

    #[test]
    fn params_verify_rejects_a_corrupted_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("params.json");
        std::fs::write(&out, "{ not json").unwrap();

        assert!(run_params(ParamsCommand::Verify { file: out }).is_err());
    }

    #[test]
    fn merkle_root_runs_against_a_fresh_registry() {
        assert!(run_merkle(MerkleCommand::Root).is_ok());
    }

    #[test]
    fn challenge_issue_runs_against_a_fresh_registry() {
        assert!(run_challenge(ChallengeCommand::Issue {
            domain: "example.com".to_string(),
            now_ms: 1_700_000_000_000,
        })
        .is_ok());
    }
}
