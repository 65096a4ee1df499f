//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Every section has defaults so a minimal file only names the mint.

use serde::{Deserialize, Serialize};

use crate::chain::instruction::TOKEN_PROGRAM_ID;
use crate::chain::types::Commitment;

/// Root configuration for a mint run.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MintConfig {
    /// Key material used to sign.
    pub wallet: WalletConfig,

    /// What to mint and where.
    pub mint: MintSection,

    /// Node endpoints and confirmation policy.
    pub rpc: RpcConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Wallet configuration.
#[derive(Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct WalletConfig {
    /// Base58 keypair or JSON byte array. The environment variable takes precedence.
    pub private_key: Option<String>,
}

impl std::fmt::Debug for WalletConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletConfig")
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Mint instruction parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MintSection {
    /// Token mint account (base58).
    pub token_mint: String,

    /// Destination token account. Defaults to the wallet's associated token account.
    pub destination: Option<String>,

    /// Mint authority. Defaults to the wallet pubkey.
    pub authority: Option<String>,

    /// Amount in base units.
    pub amount: u64,

    /// Co-signers when the authority is a multisig account.
    pub multisig_signers: Vec<String>,

    /// Token program id.
    pub token_program: String,
}

impl Default for MintSection {
    fn default() -> Self {
        Self {
            token_mint: String::new(),
            destination: None,
            authority: None,
            amount: 100,
            multisig_signers: Vec::new(),
            token_program: TOKEN_PROGRAM_ID.to_string(),
        }
    }
}

/// RPC and pubsub configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Pubsub WebSocket endpoint URL.
    pub ws_url: String,

    /// RPC request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Commitment level awaited before reporting success.
    pub commitment: Commitment,

    /// Upper bound on the confirmation wait in seconds.
    pub confirm_timeout_secs: u64,

    /// Read the mint account and check the authority before building.
    pub verify_mint_authority: bool,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8899".to_string(),
            ws_url: "ws://127.0.0.1:8900".to_string(),
            request_timeout_secs: 10,
            commitment: Commitment::Finalized,
            confirm_timeout_secs: 90,
            verify_mint_authority: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// Legacy JSON settings: flat camel-cased keys, no sections.
#[derive(Clone, Deserialize)]
pub struct LegacySettings {
    #[serde(rename = "privateKey")]
    pub private_key: String,

    #[serde(rename = "tokenMintPublicKey")]
    pub token_mint_public_key: String,

    #[serde(rename = "RPCURL")]
    pub rpc_url: String,

    #[serde(rename = "WSURL")]
    pub ws_url: String,
}

impl From<LegacySettings> for MintConfig {
    fn from(legacy: LegacySettings) -> Self {
        Self {
            wallet: WalletConfig {
                private_key: Some(legacy.private_key),
            },
            mint: MintSection {
                token_mint: legacy.token_mint_public_key,
                ..MintSection::default()
            },
            rpc: RpcConfig {
                rpc_url: legacy.rpc_url,
                ws_url: legacy.ws_url,
                ..RpcConfig::default()
            },
            observability: ObservabilityConfig::default(),
        }
    }
}
