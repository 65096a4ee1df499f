//! Interfaces to the network collaborators used by the pipeline.
//!
//! `RpcClient` and `PubsubClient` implement these against a real node; tests
//! substitute in-memory doubles.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::chain::types::{Checkpoint, Commitment, Pubkey, RpcError, Signature, StatusUpdate};

/// Supplies the recent blockhash a transaction is assembled against.
#[async_trait]
pub trait CheckpointProvider: Send + Sync {
    async fn latest_checkpoint(&self, commitment: Commitment) -> Result<Checkpoint, RpcError>;
}

/// Reads the current mint authority from a token mint account.
#[async_trait]
pub trait MintAccountReader: Send + Sync {
    /// `Ok(None)` means the mint exists but its supply is fixed.
    async fn mint_authority(&self, mint: &Pubkey) -> Result<Option<Pubkey>, RpcError>;
}

/// Request/response half of the network: submission and one-shot status queries.
#[async_trait]
pub trait BroadcastTransport: Send + Sync {
    /// Submit wire-encoded transaction bytes; returns the node's signature.
    async fn submit(&self, wire: &[u8]) -> Result<Signature, RpcError>;

    /// Current status of `signature`, `None` if the node has not seen it.
    async fn signature_status(&self, signature: &Signature) -> Result<Option<StatusUpdate>, RpcError>;
}

/// Push half of the network: signature-keyed status notifications.
#[async_trait]
pub trait SubscriptionTransport: Send + Sync {
    async fn subscribe_signature(
        &self,
        signature: &Signature,
        commitment: Commitment,
    ) -> Result<SignatureSubscription, RpcError>;
}

/// Live subscription to status updates for one signature.
///
/// The stream ends when the connection closes. Dropping the handle
/// releases the subscription on the transport side.
pub struct SignatureSubscription {
    signature: Signature,
    updates: mpsc::Receiver<StatusUpdate>,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl SignatureSubscription {
    pub fn new(signature: Signature, updates: mpsc::Receiver<StatusUpdate>) -> Self {
        Self {
            signature,
            updates,
            on_drop: None,
        }
    }

    /// Run `release` when the handle is dropped (unsubscribe, free the slot).
    pub fn with_release<F>(mut self, release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_drop = Some(Box::new(release));
        self
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Next update, or `None` once the channel has closed.
    pub async fn next_update(&mut self) -> Option<StatusUpdate> {
        self.updates.recv().await
    }
}

impl Drop for SignatureSubscription {
    fn drop(&mut self) {
        if let Some(release) = self.on_drop.take() {
            release();
        }
    }
}

impl std::fmt::Debug for SignatureSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureSubscription")
            .field("signature", &self.signature)
            .finish()
    }
}
