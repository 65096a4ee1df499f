//! Broadcast and confirmation tracking.
//!
//! # State Machine
//! ```text
//!   signed tx ──submit──▶ Submitted ──subscribe──▶ Subscribed ──update ≥ target──▶ Confirmed
//!       │                    │                        │  │
//!       │                    ▼                        │  └── on-chain err / channel closed ──▶ Failed
//!       ▼               SubmissionError               └── deadline / shutdown ──▶ Timeout / Cancelled
//!  MissingSignature (no network call)
//! ```
//!
//! The subscription is armed right after submission, then a single status
//! query covers a confirmation that landed before the subscription existed.
//! The deadline starts before the subscribe handshake, and the handshake, the
//! status query and the update loop all race the shutdown signal.

use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::chain::transaction::Transaction;
use crate::chain::transport::{BroadcastTransport, SubscriptionTransport};
use crate::chain::types::{Commitment, Confirmation, MintError, MintResult, Signature, StatusUpdate};
use crate::lifecycle::shutdown::cancelled;
use crate::observability::metrics;

/// Submits signed transactions and waits for their confirmation.
pub struct Confirmer<'a> {
    broadcast: &'a dyn BroadcastTransport,
    pubsub: &'a dyn SubscriptionTransport,
    commitment: Commitment,
    wait: Duration,
}

impl<'a> Confirmer<'a> {
    pub fn new(
        broadcast: &'a dyn BroadcastTransport,
        pubsub: &'a dyn SubscriptionTransport,
        commitment: Commitment,
        wait: Duration,
    ) -> Self {
        Self {
            broadcast,
            pubsub,
            commitment,
            wait,
        }
    }

    /// Submit `tx` and block until it reaches the target commitment.
    ///
    /// Resolves with `Cancelled` as soon as `shutdown` fires.
    pub async fn send_and_confirm(
        &self,
        tx: &Transaction,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> MintResult<Confirmation> {
        let wire = tx.to_wire_bytes()?;
        let local = tx.signature().ok_or_else(|| MintError::MissingSignature {
            missing: tx.signer_keys().to_vec(),
        })?;

        let signature = self.broadcast.submit(&wire).await.map_err(MintError::Submission)?;
        if signature != local {
            return Err(MintError::SignatureMismatch { local, remote: signature });
        }
        metrics::record_submission();
        tracing::info!(%signature, bytes = wire.len(), "Transaction submitted");

        let started = Instant::now();
        let outcome = self.await_confirmation(signature, shutdown).await;
        let label = match &outcome {
            Ok(_) => "confirmed",
            Err(MintError::Timeout { .. }) => "timeout",
            Err(MintError::Cancelled { .. }) => "cancelled",
            Err(_) => "failed",
        };
        metrics::record_confirmation(label, started.elapsed());
        outcome
    }

    async fn await_confirmation(
        &self,
        signature: Signature,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> MintResult<Confirmation> {
        tokio::select! {
            _ = cancelled(shutdown) => {
                tracing::warn!(%signature, "Confirmation wait cancelled");
                Err(MintError::Cancelled { signature })
            }
            result = timeout(self.wait, self.track(signature)) => match result {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(%signature, waited = ?self.wait, "Confirmation wait timed out");
                    Err(MintError::Timeout { signature, waited: self.wait })
                }
            },
        }
    }

    /// Subscribe, check the current status once, then follow the subscription.
    async fn track(&self, signature: Signature) -> MintResult<Confirmation> {
        let mut subscription = self
            .pubsub
            .subscribe_signature(&signature, self.commitment)
            .await
            .map_err(|e| MintError::Confirmation {
                signature,
                reason: format!("subscription failed: {}", e),
                on_chain_error: None,
            })?;
        tracing::debug!(%signature, commitment = %self.commitment, "Awaiting confirmation");

        match self.broadcast.signature_status(&signature).await {
            Ok(Some(update)) => {
                if let Some(outcome) = self.evaluate(&signature, update) {
                    return outcome;
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(%signature, error = %e, "Status query failed, relying on subscription"),
        }

        while let Some(update) = subscription.next_update().await {
            if let Some(outcome) = self.evaluate(&signature, update) {
                return outcome;
            }
        }
        Err(MintError::Confirmation {
            signature,
            reason: "subscription closed before confirmation".to_string(),
            on_chain_error: None,
        })
    }

    /// Terminal outcome for `update`, or `None` to keep waiting.
    fn evaluate(&self, signature: &Signature, update: StatusUpdate) -> Option<MintResult<Confirmation>> {
        if update.signature != *signature {
            tracing::debug!(expected = %signature, got = %update.signature, "Ignoring update for other signature");
            return None;
        }

        if let Some(err) = update.err {
            tracing::warn!(%signature, slot = update.slot, error = %err, "Transaction failed on-chain");
            return Some(Err(MintError::Confirmation {
                signature: *signature,
                reason: format!("on-chain error: {}", err),
                on_chain_error: Some(err),
            }));
        }

        match update.commitment {
            Some(level) if level >= self.commitment => {
                tracing::info!(%signature, slot = update.slot, commitment = %level, "Transaction confirmed");
                Some(Ok(Confirmation {
                    signature: *signature,
                    slot: update.slot,
                    commitment: level,
                }))
            }
            level => {
                tracing::debug!(%signature, slot = update.slot, ?level, "Below target commitment");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::chain::instruction::MintToBuilder;
    use crate::chain::transport::SignatureSubscription;
    use crate::chain::types::{Checkpoint, Hash, Pubkey, RpcError};
    use crate::chain::wallet::{Keypair, TxSigner};
    use crate::lifecycle::Shutdown;

    #[derive(Default)]
    struct MockNode {
        submits: AtomicUsize,
        subscribes: AtomicUsize,
        reject: bool,
        /// Answer to `getSignatureStatuses`.
        status: Option<StatusUpdate>,
        /// Never answer the subscribe request.
        stall_subscribe: bool,
        updates: Mutex<Vec<StatusUpdate>>,
        /// Keep the update channel open after sending `updates`.
        hold_open: bool,
        held: Mutex<Option<mpsc::Sender<StatusUpdate>>>,
    }

    #[async_trait]
    impl BroadcastTransport for MockNode {
        async fn submit(&self, wire: &[u8]) -> Result<Signature, RpcError> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                return Err(RpcError::Rpc {
                    code: -32002,
                    message: "Transaction simulation failed".into(),
                    data: None,
                });
            }
            let mut sig = [0u8; 64];
            sig.copy_from_slice(&wire[1..65]);
            Ok(Signature::from(sig))
        }

        async fn signature_status(&self, _: &Signature) -> Result<Option<StatusUpdate>, RpcError> {
            Ok(self.status.clone())
        }
    }

    #[async_trait]
    impl SubscriptionTransport for MockNode {
        async fn subscribe_signature(
            &self,
            signature: &Signature,
            _: Commitment,
        ) -> Result<SignatureSubscription, RpcError> {
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            if self.stall_subscribe {
                return std::future::pending().await;
            }
            let (tx, rx) = mpsc::channel(8);
            for mut update in self.updates.lock().unwrap().drain(..) {
                update.signature = *signature;
                tx.try_send(update).unwrap();
            }
            if self.hold_open {
                *self.held.lock().unwrap() = Some(tx);
            }
            Ok(SignatureSubscription::new(*signature, rx))
        }
    }

    fn update(commitment: Option<Commitment>, err: Option<serde_json::Value>) -> StatusUpdate {
        StatusUpdate { signature: Signature::from([0; 64]), slot: 77, commitment, err }
    }

    fn signed_tx() -> Transaction {
        let kp = Keypair::from_seed(&[11; 32]).unwrap();
        let mut tx = unsigned_tx(&kp, 100);
        TxSigner::new(&kp).sign(&mut tx).unwrap();
        tx
    }

    fn unsigned_tx(kp: &Keypair, amount: u64) -> Transaction {
        let mint = Pubkey::new_from_array([1; 32]);
        let destination = Pubkey::new_from_array([2; 32]);
        let ix = MintToBuilder::new(amount, mint, destination, kp.pubkey())
            .validate_and_build()
            .unwrap();
        let checkpoint = Checkpoint {
            blockhash: Hash::new_from_array([4; 32]),
            last_valid_block_height: 9,
        };
        Transaction::assemble(&[ix], &checkpoint, None).unwrap()
    }

    async fn run(node: &MockNode, tx: &Transaction, wait: Duration) -> MintResult<Confirmation> {
        let shutdown = Shutdown::new();
        let confirmer = Confirmer::new(node, node, Commitment::Finalized, wait);
        confirmer.send_and_confirm(tx, &mut shutdown.subscribe()).await
    }

    #[tokio::test]
    async fn test_confirmed_after_single_update() {
        let node = MockNode {
            updates: Mutex::new(vec![update(Some(Commitment::Finalized), None)]),
            ..Default::default()
        };
        let tx = signed_tx();

        let confirmation = run(&node, &tx, Duration::from_secs(5)).await.unwrap();
        assert_eq!(Some(confirmation.signature), tx.signature());
        assert_eq!(confirmation.commitment, Commitment::Finalized);
        assert_eq!(node.submits.load(Ordering::SeqCst), 1);
        assert_eq!(node.subscribes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lower_commitment_keeps_waiting() {
        let node = MockNode {
            updates: Mutex::new(vec![
                update(None, None),
                update(Some(Commitment::Confirmed), None),
                update(Some(Commitment::Finalized), None),
            ]),
            ..Default::default()
        };
        let confirmation = run(&node, &signed_tx(), Duration::from_secs(5)).await.unwrap();
        assert_eq!(confirmation.commitment, Commitment::Finalized);
    }

    #[tokio::test]
    async fn test_on_chain_error_is_confirmation_error() {
        let detail = json!({ "InstructionError": [0, { "Custom": 5 }] });
        let node = MockNode {
            updates: Mutex::new(vec![update(Some(Commitment::Finalized), Some(detail.clone()))]),
            ..Default::default()
        };
        match run(&node, &signed_tx(), Duration::from_secs(5)).await {
            Err(MintError::Confirmation { on_chain_error, .. }) => {
                assert_eq!(on_chain_error, Some(detail))
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_channel_does_not_hang() {
        let node = MockNode::default();
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            run(&node, &signed_tx(), Duration::from_secs(30)),
        )
        .await
        .expect("confirmation wait must terminate");
        assert!(matches!(
            result,
            Err(MintError::Confirmation { .. }) | Err(MintError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_silent_node_times_out() {
        let node = MockNode { hold_open: true, ..Default::default() };
        let result = run(&node, &signed_tx(), Duration::from_millis(50)).await;
        assert!(matches!(result, Err(MintError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_status_query_covers_early_confirmation() {
        let tx = signed_tx();
        let mut landed = update(Some(Commitment::Finalized), None);
        landed.signature = tx.signature().unwrap();
        // Subscription stays silent; only the status query knows the outcome.
        let node = MockNode { status: Some(landed), hold_open: true, ..Default::default() };

        let confirmation = run(&node, &tx, Duration::from_secs(5)).await.unwrap();
        assert_eq!(confirmation.slot, 77);
    }

    #[tokio::test]
    async fn test_rejection_never_subscribes() {
        let node = MockNode { reject: true, ..Default::default() };
        let result = run(&node, &signed_tx(), Duration::from_secs(5)).await;
        assert!(matches!(result, Err(MintError::Submission(RpcError::Rpc { code: -32002, .. }))));
        assert_eq!(node.subscribes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsigned_transaction_makes_no_network_call() {
        let kp = Keypair::from_seed(&[11; 32]).unwrap();
        let tx = unsigned_tx(&kp, 1);

        let node = MockNode::default();
        let result = run(&node, &tx, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(MintError::MissingSignature { .. })));
        assert_eq!(node.submits.load(Ordering::SeqCst), 0);
        assert_eq!(node.subscribes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_wait() {
        let node = MockNode { hold_open: true, ..Default::default() };
        let tx = signed_tx();
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        let confirmer = Confirmer::new(&node, &node, Commitment::Finalized, Duration::from_secs(30));

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.trigger();
        });

        let result = confirmer.send_and_confirm(&tx, &mut rx).await;
        assert!(matches!(result, Err(MintError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_stalled_subscribe_times_out() {
        let node = MockNode { stall_subscribe: true, ..Default::default() };
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            run(&node, &signed_tx(), Duration::from_millis(50)),
        )
        .await
        .expect("deadline must cover the subscribe handshake");
        assert!(matches!(result, Err(MintError::Timeout { .. })));
        assert_eq!(node.subscribes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_stalled_subscribe() {
        let node = MockNode { stall_subscribe: true, ..Default::default() };
        let tx = signed_tx();
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        let confirmer = Confirmer::new(&node, &node, Commitment::Finalized, Duration::from_secs(30));

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.trigger();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            confirmer.send_and_confirm(&tx, &mut rx),
        )
        .await
        .expect("shutdown must interrupt the subscribe handshake");
        assert!(matches!(result, Err(MintError::Cancelled { .. })));
    }
}
