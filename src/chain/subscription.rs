//! WebSocket pubsub client for signature notifications.
//!
//! # Data Flow
//! ```text
//! subscribe_signature ──Command::Subscribe──▶ connection task ──signatureSubscribe──▶ node
//!                                             connection task ◀──{ id, result: sub }──
//! SignatureSubscription ◀──StatusUpdate (mpsc)── connection task ◀──signatureNotification──
//! drop(SignatureSubscription) ──Command::Unsubscribe──▶ ──signatureUnsubscribe──▶ node
//! ```
//!
//! # Design Decisions
//! - One socket per client, owned by a single task; callers talk to it over channels
//! - A subscription's channel closes when the socket closes, so waiters never hang on a dead link
//! - The node drops a signature subscription after its first final notification; no
//!   unsubscribe is sent in that case
//! - The connect handshake and every subscribe reply are bounded by the request timeout

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::chain::transport::{SignatureSubscription, SubscriptionTransport};
use crate::chain::types::{Commitment, RpcError, Signature, StatusUpdate};

/// Buffered updates per subscription. Nodes send at most two per signature.
const UPDATE_BUFFER: usize = 8;

enum Command {
    Subscribe {
        signature: Signature,
        commitment: Commitment,
        reply: oneshot::Sender<Result<SignatureSubscription, RpcError>>,
    },
    Unsubscribe {
        subscription_id: u64,
    },
}

/// Incoming frame: either a reply to one of our requests or a notification.
#[derive(Debug, Deserialize)]
struct Incoming {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<IncomingError>,
    method: Option<String>,
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct IncomingError {
    code: i64,
    message: String,
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct NotificationParams {
    subscription: u64,
    result: NotificationResult,
}

#[derive(Debug, Deserialize)]
struct NotificationResult {
    context: NotificationContext,
    value: Value,
}

#[derive(Debug, Deserialize)]
struct NotificationContext {
    slot: u64,
}

struct PendingSubscribe {
    signature: Signature,
    commitment: Commitment,
    reply: oneshot::Sender<Result<SignatureSubscription, RpcError>>,
}

struct ActiveSubscription {
    signature: Signature,
    commitment: Commitment,
    updates: mpsc::Sender<StatusUpdate>,
}

/// Client for the node's pubsub WebSocket endpoint.
pub struct PubsubClient {
    commands: mpsc::UnboundedSender<Command>,
    url: String,
    /// Bound on the connect handshake and on each subscribe reply.
    request_timeout: Duration,
}

impl PubsubClient {
    /// Open the WebSocket connection and start the connection task.
    pub async fn connect(ws_url: &str, request_timeout: Duration) -> Result<Self, RpcError> {
        let url: url::Url = ws_url
            .parse()
            .map_err(|e| RpcError::WebSocket(format!("Invalid WebSocket URL '{}': {}", ws_url, e)))?;

        let (stream, _response) = match timeout(request_timeout, connect_async(url.as_str())).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(ws_url = %url, "Pubsub connect timeout");
                return Err(RpcError::Timeout(request_timeout.as_secs()));
            }
        };
        tracing::info!(ws_url = %url, "Pubsub connection established");

        let (commands, command_rx) = mpsc::unbounded_channel();
        let connection = Connection {
            commands: commands.downgrade(),
            pending: HashMap::new(),
            active: HashMap::new(),
            next_id: 1,
        };
        tokio::spawn(connection.run(stream, command_rx));

        Ok(Self {
            commands,
            url: url.to_string(),
            request_timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SubscriptionTransport for PubsubClient {
    async fn subscribe_signature(
        &self,
        signature: &Signature,
        commitment: Commitment,
    ) -> Result<SignatureSubscription, RpcError> {
        let (reply, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Subscribe {
                signature: *signature,
                commitment,
                reply,
            })
            .map_err(|_| RpcError::Closed)?;

        match timeout(self.request_timeout, reply_rx).await {
            Ok(reply) => reply.map_err(|_| RpcError::Closed)?,
            Err(_) => {
                tracing::warn!(%signature, "signatureSubscribe timeout");
                Err(RpcError::Timeout(self.request_timeout.as_secs()))
            }
        }
    }
}

impl std::fmt::Debug for PubsubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubsubClient")
            .field("ws_url", &self.url)
            .field("timeout_secs", &self.request_timeout.as_secs())
            .finish()
    }
}

struct Connection {
    /// Weak so the task stops once the client and every subscription are gone.
    commands: mpsc::WeakUnboundedSender<Command>,
    pending: HashMap<u64, PendingSubscribe>,
    active: HashMap<u64, ActiveSubscription>,
    next_id: u64,
}

impl Connection {
    async fn run<S>(mut self, stream: S, mut command_rx: mpsc::UnboundedReceiver<Command>)
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
            + Send
            + Unpin,
    {
        let (mut sink, mut frames) = stream.split();
        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    let Some(command) = command else { break };
                    let outgoing = self.handle_command(command);
                    if let Some(text) = outgoing {
                        if let Err(e) = sink.send(Message::text(text)).await {
                            tracing::warn!(error = %e, "Pubsub send failed");
                            break;
                        }
                    }
                }
                frame = frames.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Pubsub connection closed by node");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Pubsub connection error");
                        break;
                    }
                    None => break,
                },
            }
        }

        for (_, pending) in self.pending.drain() {
            let _ = pending.reply.send(Err(RpcError::Closed));
        }
        // Dropping the senders ends every open subscription stream.
        self.active.clear();
        let _ = sink.close().await;
        tracing::debug!("Pubsub connection task finished");
    }

    fn handle_command(&mut self, command: Command) -> Option<String> {
        let id = self.next_id;
        self.next_id += 1;

        match command {
            Command::Subscribe { signature, commitment, reply } => {
                self.pending.insert(id, PendingSubscribe { signature, commitment, reply });
                Some(
                    json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "method": "signatureSubscribe",
                        "params": [signature.to_string(), { "commitment": commitment }],
                    })
                    .to_string(),
                )
            }
            Command::Unsubscribe { subscription_id } => {
                // Already removed when the node delivered its final notification.
                self.active.remove(&subscription_id)?;
                Some(
                    json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "method": "signatureUnsubscribe",
                        "params": [subscription_id],
                    })
                    .to_string(),
                )
            }
        }
    }

    fn handle_text(&mut self, text: &str) {
        let incoming: Incoming = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed pubsub frame");
                return;
            }
        };

        if incoming.method.as_deref() == Some("signatureNotification") {
            match incoming.params.map(serde_json::from_value::<NotificationParams>) {
                Some(Ok(params)) => self.handle_notification(params),
                Some(Err(e)) => tracing::warn!(error = %e, "Ignoring malformed signature notification"),
                None => {}
            }
            return;
        }

        let Some(id) = incoming.id else { return };
        let Some(pending) = self.pending.remove(&id) else { return };

        if let Some(err) = incoming.error {
            let _ = pending.reply.send(Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
                data: err.data,
            }));
            return;
        }

        let Some(subscription_id) = incoming.result.as_ref().and_then(Value::as_u64) else {
            let _ = pending.reply.send(Err(RpcError::Decode(
                "signatureSubscribe returned no subscription id".to_string(),
            )));
            return;
        };

        let (updates, updates_rx) = mpsc::channel(UPDATE_BUFFER);
        self.active.insert(
            subscription_id,
            ActiveSubscription {
                signature: pending.signature,
                commitment: pending.commitment,
                updates,
            },
        );

        let mut subscription = SignatureSubscription::new(pending.signature, updates_rx);
        if let Some(commands) = self.commands.upgrade() {
            subscription = subscription.with_release(move || {
                let _ = commands.send(Command::Unsubscribe { subscription_id });
            });
        }

        tracing::debug!(subscription_id, signature = %pending.signature, "Signature subscription armed");
        if pending.reply.send(Ok(subscription)).is_err() {
            // Caller went away; its handle was dropped inside the failed send.
            tracing::debug!(subscription_id, "Subscriber gone before reply");
        }
    }

    fn handle_notification(&mut self, params: NotificationParams) {
        let id = params.subscription;
        let Some(active) = self.active.get(&id) else {
            tracing::debug!(subscription_id = id, "Notification for unknown subscription");
            return;
        };

        let value = params.result.value;
        // "receivedSignature" marks arrival only; anything else is the final status.
        let received_only = value.as_str() == Some("receivedSignature");
        let update = StatusUpdate {
            signature: active.signature,
            slot: params.result.context.slot,
            commitment: (!received_only).then_some(active.commitment),
            err: value.get("err").filter(|e| !e.is_null()).cloned(),
        };

        if let Err(e) = active.updates.try_send(update) {
            tracing::debug!(subscription_id = id, error = %e, "Dropping signature update");
        }
        if !received_only {
            self.active.remove(&id);
        }
    }
}
