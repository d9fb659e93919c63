// src/transport/memory/broker.rs

//! In-memory broker implementation.
//!
//! This broker simulates queue-based message passing entirely within the
//! process. It is the **reference implementation** of session semantics:
//! the AMQP session is expected to approximate this behavior as closely as
//! the protocol allows and to document any unavoidable deviations.
//!
//! ## Semantics
//!
//! - Queues are single-consumer: `declare()` returns the one receiver.
//! - Declaring a name that already exists fails, mirroring exclusive
//!   queue ownership.
//! - Publishing to an unknown queue is a silent no-op, mirroring an
//!   unroutable default-exchange publish.
//! - Reply queues are broker-named (`amq.gen-…`) and disappear when their
//!   session closes.
//!
//! ## Non-goals
//!
//! - Persistence or durability
//! - Network behavior or failure simulation
//! - Exact emulation of AMQP acknowledgement semantics

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::{
    // ---
    BrokerSession,
    CorrelationToken,
    Error,
    ReplyDelivery,
    ReplyInbox,
    Result,
    RpcConfig,
    SessionPtr,
};

const QUEUE_DEPTH: usize = 16;

/// A message as carried by the in-memory broker.
///
/// Unlike [`ReplyDelivery`] this is the *full* broker-visible shape,
/// including reply routing, so a test service consuming a command queue
/// can answer it.
#[derive(Debug, Clone)]
pub struct MemoryDelivery {
    /// Queue the consumer should answer to, if any.
    pub reply_to: Option<String>,
    /// Correlation token, if the publisher set one.
    pub correlation_id: Option<String>,
    /// Opaque message body.
    pub payload: Bytes,
}

type QueueMap = Arc<RwLock<HashMap<String, mpsc::Sender<MemoryDelivery>>>>;

/// In-process broker with named queues.
///
/// Cheap to clone; all clones share the same queue namespace. Test
/// services declare a named command queue and consume it directly, while
/// clients open sessions via [`open_session`](MemoryBroker::open_session).
#[derive(Clone, Default)]
pub struct MemoryBroker {
    // ---
    queues: QueueMap,
}

impl MemoryBroker {
    // ---

    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a named queue and take its consumer side.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the name is already taken; queue
    /// ownership is exclusive.
    pub async fn declare(&self, name: impl Into<String>) -> Result<mpsc::Receiver<MemoryDelivery>> {
        // ---
        let name = name.into();
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);

        let mut queues = self.queues.write().await;
        if queues.contains_key(&name) {
            return Err(Error::Connection(format!(
                "queue already declared: {name}"
            )));
        }
        queues.insert(name, tx);

        Ok(rx)
    }

    /// Publish a delivery to a named queue.
    ///
    /// Unknown or closed queues make this a no-op; the message is dropped
    /// the way an unroutable publish is.
    pub async fn publish(&self, queue: &str, delivery: MemoryDelivery) {
        // ---
        let queues = self.queues.read().await;

        match queues.get(queue) {
            Some(tx) => {
                // A send failure means the consumer side is gone; same
                // outcome as an unknown queue.
                if tx.send(delivery).await.is_err() {
                    tracing::debug!(queue, "dropping publish to closed queue");
                }
            }
            None => {
                tracing::debug!(queue, "dropping publish to unknown queue");
            }
        }
    }

    async fn remove(&self, queue: &str) {
        // ---
        self.queues.write().await.remove(queue);
    }

    /// Open a client session against this broker.
    ///
    /// Declares a broker-named reply queue and starts the inbox consumer
    /// that forwards correlated deliveries; token-less deliveries are
    /// dropped with a debug log.
    pub async fn open_session(&self, config: &RpcConfig) -> Result<(SessionPtr, ReplyInbox)> {
        // ---
        let reply_queue = format!("amq.gen-{}", Uuid::new_v4().simple());
        let mut queue_rx = self.declare(reply_queue.clone()).await?;

        tracing::info!(client = %config.client_id, queue = %reply_queue, "declared reply inbox");

        let (inbox_tx, inbox_rx) = mpsc::channel(QUEUE_DEPTH);

        let client_id = config.client_id.clone();
        tokio::spawn(async move {
            // ---
            while let Some(delivery) = queue_rx.recv().await {
                let Some(token) = delivery.correlation_id else {
                    tracing::debug!(
                        client = %client_id,
                        "dropping inbox delivery without correlation id"
                    );
                    continue;
                };

                let reply = ReplyDelivery {
                    token: CorrelationToken::from(token),
                    payload: delivery.payload,
                };

                if inbox_tx.send(reply).await.is_err() {
                    break;
                }
            }

            tracing::debug!(client = %client_id, "inbox consumer task ended");
        });

        let session: SessionPtr = Arc::new(MemorySession {
            broker: self.clone(),
            reply_queue,
        });

        Ok((
            session,
            ReplyInbox {
                deliveries: inbox_rx,
            },
        ))
    }
}

/// Memory-broker-backed session.
struct MemorySession {
    // ---
    broker: MemoryBroker,
    reply_queue: String,
}

#[async_trait::async_trait]
impl BrokerSession for MemorySession {
    // ---
    fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    async fn publish(&self, queue: &str, token: &CorrelationToken, payload: Bytes) -> Result<()> {
        // ---
        self.broker
            .publish(
                queue,
                MemoryDelivery {
                    reply_to: Some(self.reply_queue.clone()),
                    correlation_id: Some(token.to_string()),
                    payload,
                },
            )
            .await;

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // ---
        // Removing the reply queue drops its sender, which ends the inbox
        // consumer task. Safe to call more than once.
        self.broker.remove(&self.reply_queue).await;
        Ok(())
    }
}
