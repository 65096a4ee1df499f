//! JSON-RPC client with timeout and error handling.
//!
//! # Responsibilities
//! - Issue JSON-RPC 2.0 requests to the node's HTTP endpoint
//! - Fetch checkpoints, mint accounts and signature statuses
//! - Submit wire-encoded transactions
//! - Bound every request with the configured timeout

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use solana_sdk::program_pack::Pack;
use spl_token::state::Mint;
use tokio::time::timeout;

use crate::chain::transport::{BroadcastTransport, CheckpointProvider, MintAccountReader};
use crate::chain::types::{
    Checkpoint, Commitment, Hash, Pubkey, RpcError, Signature, StatusUpdate,
};
use crate::config::schema::RpcConfig;

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    data: Option<Value>,
}

/// `{ context, value }` wrapper used by most account and ledger methods.
#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestBlockhash {
    blockhash: String,
    last_valid_block_height: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    slot: u64,
    err: Option<Value>,
    confirmation_status: Option<Commitment>,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    /// `[payload, encoding]`
    data: (String, String),
}

/// HTTP JSON-RPC client for a single node endpoint.
pub struct RpcClient {
    http: reqwest::Client,
    url: url::Url,
    /// Request timeout duration.
    timeout_duration: Duration,
    /// Commitment used for preflight simulation and account reads.
    commitment: Commitment,
    request_id: AtomicU64,
}

impl RpcClient {
    pub fn new(config: &RpcConfig) -> Result<Self, RpcError> {
        let url: url::Url = config.rpc_url.parse().map_err(|e| {
            RpcError::Http(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;

        let http = reqwest::Client::builder()
            .build()
            .map_err(RpcError::from)?;

        tracing::info!(rpc_url = %url, timeout_secs = config.request_timeout_secs, "RPC client initialized");

        Ok(Self {
            http,
            url,
            timeout_duration: Duration::from_secs(config.request_timeout_secs),
            commitment: config.commitment,
            request_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let request = async {
            let response = self.http.post(self.url.clone()).json(&body).send().await?;
            let status = response.status();
            let text = response.text().await?;
            Ok::<_, RpcError>((status, text))
        };

        let (status, text) = match timeout(self.timeout_duration, request).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(method, "RPC timeout");
                return Err(RpcError::Timeout(self.timeout_duration.as_secs()));
            }
        };

        let parsed: RpcResponse<T> = serde_json::from_str(&text).map_err(|e| {
            if status.is_success() {
                RpcError::Decode(format!("{}: {}", method, e))
            } else {
                RpcError::Http(format!("{} returned HTTP {}", method, status))
            }
        })?;

        if let Some(err) = parsed.error {
            tracing::debug!(method, code = err.code, message = %err.message, "RPC error response");
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
                data: err.data,
            });
        }

        parsed
            .result
            .ok_or_else(|| RpcError::Decode(format!("{}: response has no result", method)))
    }

    /// Fetch the latest blockhash and the last block height it stays valid for.
    pub async fn get_latest_blockhash(&self, commitment: Commitment) -> Result<Checkpoint, RpcError> {
        let resp: WithContext<LatestBlockhash> = self
            .call("getLatestBlockhash", json!([{ "commitment": commitment }]))
            .await?;

        let blockhash: Hash = resp.value.blockhash.parse().map_err(|e| {
            RpcError::Decode(format!("blockhash '{}': {}", resp.value.blockhash, e))
        })?;

        Ok(Checkpoint {
            blockhash,
            last_valid_block_height: resp.value.last_valid_block_height,
        })
    }

    /// Submit a signed transaction, base64 encoded, with preflight simulation.
    pub async fn send_transaction(&self, wire: &[u8]) -> Result<Signature, RpcError> {
        let encoded = BASE64.encode(wire);
        let signature: String = self
            .call(
                "sendTransaction",
                json!([encoded, {
                    "encoding": "base64",
                    "preflightCommitment": self.commitment,
                }]),
            )
            .await?;

        signature
            .parse()
            .map_err(|e| RpcError::Decode(format!("signature '{}': {}", signature, e)))
    }

    pub async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<StatusUpdate>, RpcError> {
        let resp: WithContext<Vec<Option<SignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[signature.to_string()], { "searchTransactionHistory": false }]),
            )
            .await?;

        Ok(resp.value.into_iter().next().flatten().map(|status| StatusUpdate {
            signature: *signature,
            slot: status.slot,
            commitment: status.confirmation_status,
            err: status.err,
        }))
    }

    /// Read the mint authority field of a token mint account.
    pub async fn get_mint_authority(&self, mint: &Pubkey) -> Result<Option<Pubkey>, RpcError> {
        let resp: WithContext<Option<AccountInfo>> = self
            .call(
                "getAccountInfo",
                json!([mint.to_string(), {
                    "encoding": "base64",
                    "commitment": self.commitment,
                }]),
            )
            .await?;

        let account = resp.value.ok_or(RpcError::AccountNotFound(*mint))?;
        let data = BASE64
            .decode(account.data.0.as_bytes())
            .map_err(|e| RpcError::Decode(format!("account data: {}", e)))?;

        decode_mint_authority(&data)
    }

    pub fn url(&self) -> &url::Url {
        &self.url
    }
}

/// Unpack a token program mint account and return its mint authority.
pub fn decode_mint_authority(data: &[u8]) -> Result<Option<Pubkey>, RpcError> {
    let mint = Mint::unpack(data)
        .map_err(|e| RpcError::Decode(format!("mint account ({} bytes): {}", data.len(), e)))?;
    Ok(mint.mint_authority.into())
}

#[async_trait]
impl CheckpointProvider for RpcClient {
    async fn latest_checkpoint(&self, commitment: Commitment) -> Result<Checkpoint, RpcError> {
        self.get_latest_blockhash(commitment).await
    }
}

#[async_trait]
impl MintAccountReader for RpcClient {
    async fn mint_authority(&self, mint: &Pubkey) -> Result<Option<Pubkey>, RpcError> {
        self.get_mint_authority(mint).await
    }
}

#[async_trait]
impl BroadcastTransport for RpcClient {
    async fn submit(&self, wire: &[u8]) -> Result<Signature, RpcError> {
        self.send_transaction(wire).await
    }

    async fn signature_status(&self, signature: &Signature) -> Result<Option<StatusUpdate>, RpcError> {
        self.get_signature_status(signature).await
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("rpc_url", &self.url.as_str())
            .field("timeout_secs", &self.timeout_duration.as_secs())
            .field("commitment", &self.commitment)
            .finish()
    }
}
