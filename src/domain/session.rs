// src/domain/session.rs

//! Broker session abstractions.
//!
//! A session owns one connection and one logical channel to a message
//! broker. Opening a session has a required side effect: the broker
//! allocates a private, exclusive, server-named *reply inbox* queue for
//! this session and a consumer is registered on it. Every message
//! delivered to the inbox is acknowledged on receipt and forwarded as a
//! [`ReplyDelivery`] — the session does not interpret payloads and does
//! not match correlation tokens; that is the RPC layer's job.
//!
//! Concrete implementations live under `src/transport/`. The in-memory
//! broker provides the reference semantics; the AMQP session is expected
//! to approximate them as closely as the protocol allows.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::{CorrelationToken, Result};

/// A single message delivered to the session's reply inbox.
///
/// The token is the `correlation_id` property carried by the delivery.
/// Deliveries that carry no correlation id never surface here; the inbox
/// consumer drops them with a debug log.
#[derive(Debug, Clone)]
pub struct ReplyDelivery {
    /// Correlation token echoed by the remote service.
    pub token: CorrelationToken,
    /// Opaque reply payload. May be empty (e.g. a ping acknowledgement).
    pub payload: Bytes,
}

/// Handle for consuming the session's private reply inbox.
///
/// The inbox remains live until the session closes, at which point the
/// channel yields `None`. Dropping the handle discards further deliveries
/// but does not close the session.
pub struct ReplyInbox {
    /// Receiver channel for deliveries arriving on the inbox queue.
    pub deliveries: mpsc::Receiver<ReplyDelivery>,
}

/// One open connection + channel to a broker.
///
/// Implementations must ensure that:
/// - `reply_queue()` is stable for the lifetime of the session and names a
///   queue exclusive to it;
/// - `publish()` failures are fatal and surface immediately — no retry,
///   no buffering;
/// - `close()` releases the channel and connection unconditionally and is
///   safe to call more than once.
#[async_trait::async_trait]
pub trait BrokerSession: Send + Sync {
    /// Broker-assigned name of this session's private reply inbox.
    fn reply_queue(&self) -> &str;

    /// Publish a command body to a named service queue.
    ///
    /// The message is addressed via the default exchange (routing key =
    /// queue name) and carries `reply_to` = the session's inbox and
    /// `correlation_id` = `token`. The body is transmitted verbatim.
    async fn publish(&self, queue: &str, token: &CorrelationToken, payload: Bytes) -> Result<()>;

    /// Close the session and release any associated resources.
    async fn close(&self) -> Result<()>;
}

/// Shared session pointer.
///
/// An `Arc<dyn BrokerSession>`: cheap to clone, erases the concrete
/// transport behind the stable domain interface.
pub type SessionPtr = Arc<dyn BrokerSession>;
