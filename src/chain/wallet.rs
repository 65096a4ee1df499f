//! Key material and transaction signing.
//!
//! # Security
//! - Keys come from the environment or the config file, never from globals
//! - Keys are never logged or serialized
//! - Decoded secret bytes are wiped once the signing key is built

use std::fmt;

use solana_sdk::signature::{Keypair as LedgerKeypair, Signer};
use solana_sdk::signer::keypair::keypair_from_seed;
use zeroize::Zeroizing;

use crate::chain::transaction::Transaction;
use crate::chain::types::{MintError, MintResult, Pubkey, WalletError};
use crate::config::schema::WalletConfig;

/// Environment variable name for the private key.
pub const PRIVATE_KEY_ENV_VAR: &str = "MINT_SUBMIT_PRIVATE_KEY";

/// Resolves the signer for a public key, if this process holds one.
///
/// Any `solana_sdk` signer can sit behind the lookup, so hardware or remote
/// signers plug in without touching the pipeline.
pub trait KeyLookup: Send + Sync {
    fn lookup(&self, pubkey: &Pubkey) -> Option<&dyn Signer>;
}

/// An ed25519 keypair held in memory for the lifetime of a run.
pub struct Keypair {
    inner: LedgerKeypair,
}

impl Keypair {
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, WalletError> {
        let inner = keypair_from_seed(seed)
            .map_err(|e| WalletError::InvalidKey(format!("bad seed: {}", e)))?;
        Ok(Self { inner })
    }

    /// Build from raw bytes: a 32-byte seed or a 64-byte `secret || public` keypair.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WalletError> {
        match bytes.len() {
            32 | 64 => {
                let mut seed = Zeroizing::new([0u8; 32]);
                seed.copy_from_slice(&bytes[..32]);
                let keypair = Self::from_seed(&seed)?;
                if bytes.len() == 64 && keypair.pubkey().as_ref() != &bytes[32..] {
                    return Err(WalletError::InvalidKey(
                        "public half does not match secret".to_string(),
                    ));
                }
                Ok(keypair)
            }
            n => Err(WalletError::InvalidKey(format!(
                "expected 32 or 64 key bytes, got {}",
                n
            ))),
        }
    }

    /// Parse a base58 string or a JSON byte array (`solana-keygen` file contents).
    pub fn parse(encoded: &str) -> Result<Self, WalletError> {
        let encoded = encoded.trim();
        let bytes = if encoded.starts_with('[') {
            let raw: Vec<u8> = serde_json::from_str(encoded)
                .map_err(|e| WalletError::InvalidKey(format!("bad JSON key array: {}", e)))?;
            Zeroizing::new(raw)
        } else {
            let raw = bs58::decode(encoded)
                .into_vec()
                .map_err(|e| WalletError::InvalidKey(format!("bad base58: {}", e)))?;
            Zeroizing::new(raw)
        };
        Self::from_bytes(&bytes)
    }

    /// Load the key from `MINT_SUBMIT_PRIVATE_KEY`, falling back to the config file.
    pub fn load(config: &WalletConfig) -> Result<Self, WalletError> {
        let from_env = std::env::var(PRIVATE_KEY_ENV_VAR).ok().map(Zeroizing::new);
        let encoded = match (&from_env, &config.private_key) {
            (Some(key), _) => key.as_str(),
            (None, Some(key)) => key.as_str(),
            (None, None) => return Err(WalletError::MissingKey(PRIVATE_KEY_ENV_VAR)),
        };

        let keypair = Self::parse(encoded)?;
        tracing::info!(
            pubkey = %keypair.pubkey(),
            source = if from_env.is_some() { "env" } else { "config" },
            "Wallet loaded"
        );
        Ok(keypair)
    }

    pub fn pubkey(&self) -> Pubkey {
        self.inner.pubkey()
    }
}

impl KeyLookup for Keypair {
    fn lookup(&self, pubkey: &Pubkey) -> Option<&dyn Signer> {
        (*pubkey == self.pubkey()).then_some(&self.inner as &dyn Signer)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair").field("pubkey", &self.pubkey()).finish()
    }
}

/// Several keypairs, e.g. a fee payer plus multisig participants.
#[derive(Debug, Default)]
pub struct KeyRing {
    keys: Vec<Keypair>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, keypair: Keypair) -> Self {
        self.push(keypair);
        self
    }

    /// Add a keypair; a key already held is ignored.
    pub fn push(&mut self, keypair: Keypair) {
        if !self.keys.iter().any(|k| k.pubkey() == keypair.pubkey()) {
            self.keys.push(keypair);
        }
    }

    pub fn pubkeys(&self) -> Vec<Pubkey> {
        self.keys.iter().map(Keypair::pubkey).collect()
    }
}

impl KeyLookup for KeyRing {
    fn lookup(&self, pubkey: &Pubkey) -> Option<&dyn Signer> {
        self.keys.iter().find_map(|k| k.lookup(pubkey))
    }
}

/// The signing stage: fills signer slots from an injected key lookup.
#[derive(Clone, Copy)]
pub struct TxSigner<'a> {
    keys: &'a dyn KeyLookup,
}

impl<'a> TxSigner<'a> {
    pub fn new(keys: &'a dyn KeyLookup) -> Self {
        Self { keys }
    }

    /// Sign every slot the lookup holds a key for.
    ///
    /// Fails with `MissingSignature` if any required slot is still empty
    /// afterwards. Signing is deterministic, so repeating it is a no-op.
    pub fn sign(&self, tx: &mut Transaction) -> MintResult<()> {
        let filled = tx.sign_with(self.keys);
        let missing = tx.missing_signers();
        if !missing.is_empty() {
            tracing::warn!(filled, missing = missing.len(), "Transaction is not fully signed");
            return Err(MintError::MissingSignature { missing });
        }

        tracing::debug!(filled, "Transaction signed");
        Ok(())
    }
}
