//! Shared utilities for integration tests: mock node endpoints and an
//! in-memory node implementing the transport traits.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use mint_submit::chain::transport::{
    BroadcastTransport, CheckpointProvider, MintAccountReader, SignatureSubscription,
    SubscriptionTransport,
};
use mint_submit::chain::{Checkpoint, Commitment, Pubkey, RpcError, Signature, StatusUpdate};

/// Subscription id handed out by the mock pubsub node.
pub const SUBSCRIPTION_ID: u64 = 42;

/// Signature carried by a wire-encoded, single-signature-prefix transaction.
pub fn wire_signature(wire: &[u8]) -> Signature {
    let mut sig = [0u8; 64];
    sig.copy_from_slice(&wire[1..65]);
    Signature::from(sig)
}

/// Start a programmable JSON-RPC node.
///
/// `handler` maps `(method, params)` to a result or an `(code, message)` error.
/// Every request is recorded as `(method, params)`.
pub async fn start_rpc_node<F>(handler: F) -> (SocketAddr, Arc<Mutex<Vec<(String, Value)>>>)
where
    F: Fn(&str, &Value) -> Result<Value, (i64, String)> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);
    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorded = calls.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let handler = handler.clone();
                    let calls = calls.clone();
                    tokio::spawn(async move {
                        let Some(body) = read_http_body(&mut socket).await else { return };
                        let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
                        let method = request["method"].as_str().unwrap_or_default().to_string();
                        let params = request["params"].clone();
                        calls.lock().unwrap().push((method.clone(), params.clone()));

                        let response = match handler(&method, &params) {
                            Ok(result) => json!({ "jsonrpc": "2.0", "id": request["id"], "result": result }),
                            Err((code, message)) => json!({
                                "jsonrpc": "2.0",
                                "id": request["id"],
                                "error": { "code": code, "message": message },
                            }),
                        }
                        .to_string();

                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            response.len(),
                            response
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, recorded)
}

async fn read_http_body(socket: &mut TcpStream) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else { continue };
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
        let content_length = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);

        let body_start = header_end + 4;
        while buf.len() < body_start + content_length {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        return Some(buf[body_start..body_start + content_length].to_vec());
    }
}

/// How the mock pubsub node behaves after accepting a subscription.
#[derive(Clone, Default)]
pub struct PubsubScript {
    /// `value` payloads of the notifications sent right after subscribing.
    pub notifications: Vec<Value>,
    /// Close the socket once the notifications are sent.
    pub close_after: bool,
    /// Accept the socket and read requests, but never answer them.
    pub silent: bool,
}

/// Start a mock pubsub node. Every request frame is recorded.
pub async fn start_pubsub_node(script: PubsubScript) -> (SocketAddr, Arc<Mutex<Vec<Value>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = requests.clone();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let script = script.clone();
            let requests = requests.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(socket).await else { return };

                while let Some(Ok(frame)) = ws.next().await {
                    let Ok(text) = frame.to_text() else { continue };
                    let Ok(request) = serde_json::from_str::<Value>(text) else { continue };
                    requests.lock().unwrap().push(request.clone());
                    if script.silent {
                        continue;
                    }

                    match request["method"].as_str() {
                        Some("signatureSubscribe") => {
                            let reply = json!({ "jsonrpc": "2.0", "result": SUBSCRIPTION_ID, "id": request["id"] });
                            if ws.send(Message::text(reply.to_string())).await.is_err() {
                                return;
                            }
                            for (i, value) in script.notifications.iter().enumerate() {
                                let note = json!({
                                    "jsonrpc": "2.0",
                                    "method": "signatureNotification",
                                    "params": {
                                        "result": { "context": { "slot": 100 + i as u64 }, "value": value },
                                        "subscription": SUBSCRIPTION_ID,
                                    },
                                });
                                if ws.send(Message::text(note.to_string())).await.is_err() {
                                    return;
                                }
                            }
                            if script.close_after {
                                let _ = ws.close(None).await;
                                return;
                            }
                        }
                        Some("signatureUnsubscribe") => {
                            let reply = json!({ "jsonrpc": "2.0", "result": true, "id": request["id"] });
                            let _ = ws.send(Message::text(reply.to_string())).await;
                        }
                        _ => {}
                    }
                }
            });
        }
    });

    (addr, recorded)
}

/// In-memory node for pipeline tests. Counts every network-facing call.
#[derive(Default)]
pub struct MockNode {
    pub mint_authority: Option<Pubkey>,
    pub checkpoint: Option<Checkpoint>,
    /// `sendTransaction` rejection, as `(code, message)`.
    pub reject_submission: Option<(i64, String)>,
    /// Commitment levels pushed to each subscription, in order.
    pub updates: Vec<Option<Commitment>>,
    pub on_chain_error: Option<Value>,

    pub authority_reads: AtomicUsize,
    pub checkpoint_fetches: AtomicUsize,
    pub submissions: AtomicUsize,
    pub subscriptions: AtomicUsize,
    pub submitted: Mutex<Vec<Vec<u8>>>,
    /// Senders kept alive so subscriptions stay open.
    pub held: Mutex<Vec<mpsc::Sender<StatusUpdate>>>,
}

impl MockNode {
    pub fn network_calls(&self) -> usize {
        self.authority_reads.load(Ordering::SeqCst)
            + self.checkpoint_fetches.load(Ordering::SeqCst)
            + self.submissions.load(Ordering::SeqCst)
            + self.subscriptions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckpointProvider for MockNode {
    async fn latest_checkpoint(&self, _: Commitment) -> Result<Checkpoint, RpcError> {
        self.checkpoint_fetches.fetch_add(1, Ordering::SeqCst);
        self.checkpoint
            .ok_or_else(|| RpcError::Http("connection refused".to_string()))
    }
}

#[async_trait]
impl MintAccountReader for MockNode {
    async fn mint_authority(&self, _: &Pubkey) -> Result<Option<Pubkey>, RpcError> {
        self.authority_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.mint_authority)
    }
}

#[async_trait]
impl BroadcastTransport for MockNode {
    async fn submit(&self, wire: &[u8]) -> Result<Signature, RpcError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        if let Some((code, message)) = &self.reject_submission {
            return Err(RpcError::Rpc {
                code: *code,
                message: message.clone(),
                data: None,
            });
        }
        self.submitted.lock().unwrap().push(wire.to_vec());
        Ok(wire_signature(wire))
    }

    async fn signature_status(&self, _: &Signature) -> Result<Option<StatusUpdate>, RpcError> {
        Ok(None)
    }
}

#[async_trait]
impl SubscriptionTransport for MockNode {
    async fn subscribe_signature(
        &self,
        signature: &Signature,
        _: Commitment,
    ) -> Result<SignatureSubscription, RpcError> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(8);
        for (i, commitment) in self.updates.iter().enumerate() {
            let _ = tx.try_send(StatusUpdate {
                signature: *signature,
                slot: 10 + i as u64,
                commitment: *commitment,
                err: self.on_chain_error.clone().filter(|_| commitment.is_some()),
            });
        }
        // Keep the channel open so a silent node looks silent, not closed.
        self.held.lock().unwrap().push(tx);
        Ok(SignatureSubscription::new(*signature, rx))
    }
}
