//! AMQP broker session using `lapin`.
//!
//! This module implements the [`BrokerSession`] trait over an AMQP
//! connection. It follows an **actor-based concurrency model**: a single
//! background actor task owns the connection and channel, and all publish
//! and shutdown operations are serialized through it over a command
//! channel. No other task ever touches the connection directly, which
//! keeps the public session handle `Send + Sync` without fighting the
//! AMQP client's connection semantics.
//!
//! ## Reply inbox
//!
//! Opening a session declares one broker-named queue with
//! `exclusive: true` and `auto_delete: true` — the broker picks the name,
//! ties the queue to this connection, and deletes it when the connection
//! goes away. A consumer with `no_ack` (auto acknowledgement on delivery;
//! at-most-once local bookkeeping, no redelivery handling) runs in its own
//! task and forwards every delivery's `(correlation_id, payload)` pair to
//! the session's [`ReplyInbox`]. Deliveries without a correlation id are
//! dropped with a debug log.
//!
//! ## Wire contract
//!
//! Outgoing messages carry the command body verbatim — no envelope
//! wrapper. Routing uses the default exchange with the routing key equal
//! to the service queue name, and `BasicProperties` carry `reply_to` (the
//! inbox name) and `correlation_id` (the per-call token). This must stay
//! bit-compatible with the remote services.

use lapin::{
    //
    options::{
        //
        BasicConsumeOptions,
        BasicPublishOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties,
    Channel,
    Connection,
    ConnectionProperties,
};

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

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

// Matches the inbox channel depth of the memory broker.
const INBOX_DEPTH: usize = 16;

//
// Actor commands
//

enum Cmd {
    //
    Publish {
        queue: String,
        token: CorrelationToken,
        payload: Bytes,
        resp: oneshot::Sender<Result<()>>,
    },
    Close {
        resp: oneshot::Sender<Result<()>>,
    },
}

/// AMQP-backed broker session.
///
/// Cheap handle over the background actor; implements `Send + Sync` for
/// use across async boundaries.
struct AmqpSession {
    // ---
    reply_queue: String,
    cmd_tx: mpsc::Sender<Cmd>,
}

/// Background actor task that owns the AMQP connection and channel.
struct Actor {
    // ---
    client_id: String,
    connection: Connection,
    channel: Channel,
    reply_queue: String,
    cmd_rx: mpsc::Receiver<Cmd>,
}

impl Actor {
    async fn run(mut self) {
        // ---
        tracing::info!(client = %self.client_id, "AMQP session actor started");

        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                Cmd::Publish {
                    queue,
                    token,
                    payload,
                    resp,
                } => {
                    let result = self.do_publish(&queue, &token, &payload).await;
                    let _ = resp.send(result);
                }
                Cmd::Close { resp } => {
                    let _ = resp.send(Ok(()));
                    self.cmd_rx.close();
                }
            }
        }

        // Closing the connection also ends the inbox consumer stream.
        let _ = self.channel.close(200, "Normal shutdown").await;
        let _ = self.connection.close(200, "Normal shutdown").await;

        tracing::info!(client = %self.client_id, "AMQP session actor stopped");
    }

    async fn do_publish(
        &mut self,
        queue: &str,
        token: &CorrelationToken,
        payload: &[u8],
    ) -> Result<()> {
        // ---
        let properties = BasicProperties::default()
            .with_reply_to(self.reply_queue.as_str().into())
            .with_correlation_id(token.as_str().into());

        self.channel
            .basic_publish(
                "",    // default exchange
                queue, // routing key = queue name
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(|e| Error::Connection(format!("amqp: publish failed: {e}")))?;

        tracing::debug!(client = %self.client_id, queue, %token, "published command");
        Ok(())
    }
}

#[async_trait::async_trait]
impl BrokerSession for AmqpSession {
    // ---
    fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    async fn publish(&self, queue: &str, token: &CorrelationToken, payload: Bytes) -> Result<()> {
        // ---
        let (tx, rx) = oneshot::channel();

        self.cmd_tx
            .send(Cmd::Publish {
                queue: queue.to_string(),
                token: token.clone(),
                payload,
                resp: tx,
            })
            .await
            .map_err(|_| Error::Connection("session closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Connection("session actor dropped".to_string()))?
    }

    async fn close(&self) -> Result<()> {
        // ---
        // Safe to call more than once: after the first close the command
        // channel is gone and both sends fall through.
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Cmd::Close { resp: tx }).await;
        let _ = rx.await;

        Ok(())
    }
}

/// Open an AMQP session per the given configuration.
///
/// Connects to the broker, creates a channel, declares the exclusive
/// server-named reply queue, and starts its consumer. Returns the session
/// handle and the inbox the consumer feeds.
///
/// # Errors
///
/// Returns [`Error::Connection`] if the URI is missing, the connection or
/// channel cannot be established, or the queue declaration / consume
/// registration fails.
pub async fn open_session(config: &RpcConfig) -> Result<(SessionPtr, ReplyInbox)> {
    // ---
    let uri = config
        .broker_uri
        .as_deref()
        .ok_or_else(|| Error::Connection("AMQP session requires a broker URI".to_string()))?;

    tracing::info!(uri, "connecting to AMQP broker");

    let connection = Connection::connect(uri, ConnectionProperties::default())
        .await
        .map_err(|e| Error::Connection(format!("amqp: connection failed: {e}")))?;

    let channel = connection
        .create_channel()
        .await
        .map_err(|e| Error::Connection(format!("amqp: channel creation failed: {e}")))?;

    // Broker-named private queue: empty name, exclusive to this
    // connection, removed when it goes away.
    let queue_opts = QueueDeclareOptions {
        passive: false,
        durable: false,
        exclusive: true,
        auto_delete: true,
        nowait: false,
    };

    let queue = channel
        .queue_declare("", queue_opts, FieldTable::default())
        .await
        .map_err(|e| Error::Connection(format!("amqp: reply queue declare failed: {e}")))?;

    let reply_queue = queue.name().as_str().to_string();
    tracing::info!(client = %config.client_id, queue = %reply_queue, "declared reply inbox");

    // Auto-ack on delivery, mirroring the at-most-once inbox contract.
    let consume_opts = BasicConsumeOptions {
        no_ack: true,
        ..BasicConsumeOptions::default()
    };

    let consumer = channel
        .basic_consume(
            &reply_queue,
            &format!("{}-reply", config.client_id),
            consume_opts,
            FieldTable::default(),
        )
        .await
        .map_err(|e| Error::Connection(format!("amqp: consume failed: {e}")))?;

    let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_DEPTH);

    // Inbox consumer task. Ends when the connection closes and the
    // delivery stream runs out, which in turn closes the inbox channel.
    let client_id = config.client_id.clone();
    tokio::spawn(async move {
        use futures_lite::stream::StreamExt;

        let mut consumer = consumer;
        while let Some(delivery_result) = consumer.next().await {
            match delivery_result {
                Ok(delivery) => {
                    let Some(token) = delivery
                        .properties
                        .correlation_id()
                        .as_ref()
                        .map(|id| CorrelationToken::from(id.as_str()))
                    else {
                        tracing::debug!(
                            client = %client_id,
                            "dropping inbox delivery without correlation id"
                        );
                        continue;
                    };

                    let reply = ReplyDelivery {
                        token,
                        payload: Bytes::from(delivery.data),
                    };

                    if inbox_tx.send(reply).await.is_err() {
                        // Inbox handle dropped; nobody is listening anymore.
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(client = %client_id, "inbox consumer error: {e}");
                    break;
                }
            }
        }

        tracing::debug!(client = %client_id, "inbox consumer task ended");
    });

    let (cmd_tx, cmd_rx) = mpsc::channel(INBOX_DEPTH);

    let actor = Actor {
        client_id: config.client_id.clone(),
        connection,
        channel,
        reply_queue: reply_queue.clone(),
        cmd_rx,
    };

    tokio::spawn(actor.run());

    let session: SessionPtr = Arc::new(AmqpSession {
        reply_queue,
        cmd_tx,
    });

    Ok((
        session,
        ReplyInbox {
            deliveries: inbox_rx,
        },
    ))
}
