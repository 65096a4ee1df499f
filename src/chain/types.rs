//! Chain-level types and error definitions.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use solana_sdk::hash::Hash;
pub use solana_sdk::pubkey::Pubkey;
pub use solana_sdk::signature::Signature;

/// Degree of cluster agreement required before a state is reported.
///
/// Variants are declared weakest first so `Ord` follows assurance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    #[default]
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown commitment level '{0}' (expected processed, confirmed or finalized)")]
pub struct ParseCommitmentError(pub String);

impl FromStr for Commitment {
    type Err = ParseCommitmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            _ => Err(ParseCommitmentError(s.to_string())),
        }
    }
}

/// A recent ledger checkpoint bounding how long a transaction stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub blockhash: Hash,
    /// Last block height at which a transaction using `blockhash` is accepted.
    pub last_valid_block_height: u64,
}

/// A status report for a submitted signature.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub signature: Signature,
    pub slot: u64,
    /// Commitment level reached, `None` when the node only reports receipt.
    pub commitment: Option<Commitment>,
    /// On-chain execution error, as reported by the node.
    pub err: Option<serde_json::Value>,
}

/// Terminal successful outcome of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub signature: Signature,
    pub slot: u64,
    pub commitment: Commitment,
}

/// Errors raised by the RPC and pubsub transports.
#[derive(Debug, Error)]
pub enum RpcError {
    /// HTTP connection or request failed.
    #[error("HTTP transport error: {0}")]
    Http(String),

    /// The node answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The response did not have the expected shape.
    #[error("Malformed RPC response: {0}")]
    Decode(String),

    /// Account queried does not exist.
    #[error("Account {0} not found")]
    AccountNotFound(Pubkey),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// WebSocket connection or framing failed.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The subscription connection went away.
    #[error("Subscription channel closed")]
    Closed,
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        RpcError::Http(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RpcError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RpcError::WebSocket(err.to_string())
    }
}

/// Errors raised while loading key material.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Invalid private key format: {0}")]
    InvalidKey(String),

    #[error("No private key configured (set {0} or wallet.private_key)")]
    MissingKey(&'static str),
}

/// Stage-tagged failure of the mint pipeline.
///
/// Every stage aborts the whole run; callers decide whether to fetch a new
/// checkpoint and start over.
#[derive(Debug, Error)]
pub enum MintError {
    #[error("Invalid instruction: {0}")]
    InvalidInstruction(String),

    #[error("Mint authority lookup failed: {0}")]
    Preflight(#[source] RpcError),

    #[error("Checkpoint fetch failed: {0}")]
    Checkpoint(#[source] RpcError),

    #[error("Assembly failed: {0}")]
    Assembly(String),

    #[error("Missing signatures for {}", join_keys(.missing))]
    MissingSignature { missing: Vec<Pubkey> },

    #[error("Submission failed: {0}")]
    Submission(#[source] RpcError),

    #[error("Submission returned signature {remote}, expected {local}")]
    SignatureMismatch { local: Signature, remote: Signature },

    #[error("Transaction {signature} failed: {reason}")]
    Confirmation {
        signature: Signature,
        reason: String,
        on_chain_error: Option<serde_json::Value>,
    },

    #[error("Transaction {signature} not confirmed within {waited:?}")]
    Timeout { signature: Signature, waited: Duration },

    #[error("Confirmation wait for {signature} cancelled")]
    Cancelled { signature: Signature },
}

impl MintError {
    /// The pipeline stage that produced this error.
    pub fn stage(&self) -> &'static str {
        match self {
            MintError::InvalidInstruction(_) => "instruction",
            MintError::Preflight(_) => "preflight",
            MintError::Checkpoint(_) => "checkpoint",
            MintError::Assembly(_) => "assembly",
            MintError::MissingSignature { .. } => "signing",
            MintError::Submission(_) | MintError::SignatureMismatch { .. } => "submission",
            MintError::Confirmation { .. } => "confirmation",
            MintError::Timeout { .. } => "timeout",
            MintError::Cancelled { .. } => "cancelled",
        }
    }
}

fn join_keys(keys: &[Pubkey]) -> String {
    keys.iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for pipeline operations.
pub type MintResult<T> = Result<T, MintError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commitment_ordering() {
        assert!(Commitment::Processed < Commitment::Confirmed);
        assert!(Commitment::Confirmed < Commitment::Finalized);
        assert_eq!("Finalized".parse::<Commitment>().unwrap(), Commitment::Finalized);
        assert!("rooted".parse::<Commitment>().is_err());
    }

    #[test]
    fn test_commitment_serde() {
        let json = serde_json::to_string(&Commitment::Confirmed).unwrap();
        assert_eq!(json, "\"confirmed\"");
    }

    #[test]
    fn test_error_stage_tags() {
        let sig = Signature::from([3u8; 64]);
        assert_eq!(MintError::Assembly("x".into()).stage(), "assembly");
        assert_eq!(MintError::Submission(RpcError::Timeout(5)).stage(), "submission");
        assert_eq!(
            MintError::Timeout { signature: sig, waited: Duration::from_secs(1) }.stage(),
            "timeout"
        );

        let err = MintError::MissingSignature { missing: vec![Pubkey::new_from_array([1u8; 32])] };
        assert!(err.to_string().contains("4vJ9JU1bJJE96FWSJKvHsmmFADCg4gpZQff4P3bkLKi"));
    }
}
