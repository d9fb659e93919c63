// src/client/rpc_client.rs
//! RPC client implementation.
//!
//! This module contains the core [`RpcClient`] type, which publishes
//! commands to a named service queue and suspends the caller until the
//! correlated reply arrives on the session's private inbox.
//!
//! # Architecture
//!
//! Each call generates a unique correlation token and registers a oneshot
//! completion handle in the [`CorrelationGate`]. A background receive task
//! drains the session's reply inbox and delivers each `(token, payload)`
//! pair through the gate; the matching call wakes up with the payload and
//! everything else is dropped through the gate's stale branch.
//!
//! # Concurrency
//!
//! Multiple calls can be in flight simultaneously — each has its own token
//! and completion handle, so overlapping calls from clones of one client
//! resolve independently. [`call`](RpcClient::call) itself waits without
//! bound; the remote contract offers no negative acknowledgement, and a
//! command that never gets answered blocks its caller until the session
//! closes. Use [`call_with_timeout`](RpcClient::call_with_timeout) to put a
//! deadline on that wait.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time;

use crate::{
    // ---
    Command,
    CorrelationToken,
    Error,
    ReplyInbox,
    Result,
    SessionPtr,
};

use super::CorrelationGate;

/// Running RPC client instance.
///
/// Cheap to clone (internally `Arc`-backed). One client owns one broker
/// session and one reply inbox; the target service queue is fixed at
/// construction.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<Inner>,
}

struct Inner {
    // ---
    session: SessionPtr,
    service_queue: String,
    gate: CorrelationGate,

    /// Reply inbox receive loop handle.
    ///
    /// Kept so the task isn't immediately dropped, and so it can be
    /// extended later (join-on-close, etc.).
    _rx_task: JoinHandle<()>,
}

impl RpcClient {
    // ---
    /// Create a client over an already-open session.
    ///
    /// `inbox` must be the reply inbox returned when `session` was opened.
    /// The client spawns the receive loop that feeds inbox deliveries into
    /// the correlation gate; the loop exits when the session closes or the
    /// client is dropped, failing any still-pending calls.
    pub fn with_session(
        session: SessionPtr,
        inbox: ReplyInbox,
        service_queue: impl Into<String>,
    ) -> Self {
        // ---
        let service_queue = service_queue.into();
        let mut deliveries = inbox.deliveries;

        // The receive loop holds only a weak reference so that dropping the
        // last client clone tears the loop down instead of leaking it.
        let inner = Arc::new_cyclic(|weak: &std::sync::Weak<Inner>| {
            // ---
            let weak = weak.clone();

            let rx_task = tokio::spawn(async move {
                // ---
                loop {
                    match deliveries.recv().await {
                        Some(delivery) => {
                            let Some(inner) = weak.upgrade() else {
                                break;
                            };
                            inner.gate.complete(&delivery.token, delivery.payload);
                        }
                        None => {
                            tracing::debug!("reply inbox closed, ending receive loop");
                            break;
                        }
                    }
                }

                if let Some(inner) = weak.upgrade() {
                    inner.gate.fail_all();
                }
            });

            Inner {
                // ---
                session,
                service_queue,
                gate: CorrelationGate::new(),
                _rx_task: rx_task,
            }
        });

        Self { inner }
    }

    /// Send a command and wait for its correlated reply.
    ///
    /// The returned bytes are the raw reply payload; decoding is the
    /// caller's concern. This wait is unbounded: if the service never
    /// answers, the call blocks until the session closes (at which point
    /// it fails with [`Error::ReplyChannelClosed`]).
    ///
    /// # Errors
    ///
    /// - [`Error::Encode`] — the command could not be serialized; nothing
    ///   was published.
    /// - [`Error::Connection`] — the publish failed; surfaces immediately,
    ///   with no wait.
    /// - [`Error::ReplyChannelClosed`] — the session shut down while the
    ///   call was outstanding.
    pub async fn call(&self, command: &Command) -> Result<Bytes> {
        // ---
        let (token, rx) = self.dispatch(command).await?;

        match rx.await {
            Ok(payload) => Ok(payload),
            Err(_) => {
                self.inner.gate.abandon(&token);
                Err(Error::ReplyChannelClosed)
            }
        }
    }

    /// Send a command and wait at most `timeout` for its reply.
    ///
    /// On expiry the pending entry is abandoned, so a reply that arrives
    /// late is dropped through the gate's stale branch and counted by
    /// [`stale_replies`](Self::stale_replies).
    ///
    /// # Errors
    ///
    /// As [`call`](Self::call), plus [`Error::Timeout`] when the deadline
    /// passes without a matching reply.
    pub async fn call_with_timeout(&self, command: &Command, timeout: Duration) -> Result<Bytes> {
        // ---
        let (token, rx) = self.dispatch(command).await?;

        match time::timeout(timeout, rx).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => {
                self.inner.gate.abandon(&token);
                Err(Error::ReplyChannelClosed)
            }
            Err(_) => {
                self.inner.gate.abandon(&token);
                Err(Error::Timeout)
            }
        }
    }

    /// Serialize, register, and publish one command.
    ///
    /// Separated so that the bounded and unbounded waits share the exact
    /// same dispatch path.
    async fn dispatch(
        &self,
        command: &Command,
    ) -> Result<(CorrelationToken, oneshot::Receiver<Bytes>)> {
        // ---
        // Encode failures surface before the token exists or any I/O runs.
        let payload = command.to_bytes()?;

        let token = CorrelationToken::generate();
        let rx = self.inner.gate.register(token.clone());

        tracing::debug!(%token, queue = %self.inner.service_queue, "publishing command");

        if let Err(err) = self
            .inner
            .session
            .publish(&self.inner.service_queue, &token, payload)
            .await
        {
            // Publish failed: nothing will ever answer this token.
            self.inner.gate.abandon(&token);
            return Err(err);
        }

        Ok((token, rx))
    }

    /// Named queue this client publishes commands to.
    pub fn service_queue(&self) -> &str {
        &self.inner.service_queue
    }

    /// Broker-assigned name of this client's private reply inbox.
    pub fn reply_queue(&self) -> &str {
        self.inner.session.reply_queue()
    }

    /// Number of calls currently awaiting a reply.
    pub fn outstanding_calls(&self) -> usize {
        self.inner.gate.outstanding()
    }

    /// Number of replies dropped because no outstanding call matched —
    /// foreign correlation ids, or replies that arrived after a timeout.
    pub fn stale_replies(&self) -> u64 {
        self.inner.gate.stale_replies()
    }

    /// Close the underlying session.
    ///
    /// Idempotent; pending calls fail with [`Error::ReplyChannelClosed`]
    /// once the inbox drains.
    pub async fn close(&self) -> Result<()> {
        // ---
        self.inner.session.close().await
    }
}
