//! Named-service facade.
//!
//! [`ServiceClient`] is a thin adapter composed over [`RpcClient`]: the
//! service queue name is fixed by the client's configuration, and each
//! operation shapes one command and unwraps one reply. There is no state
//! of its own and no inheritance-style layering — a differently named
//! service is just a different configuration value.

use std::time::Duration;

use bytes::Bytes;

use crate::{
    // ---
    open_amqp_session,
    Command,
    Error,
    ReleaseQuery,
    Result,
    RpcClient,
    RpcConfig,
    SearchReply,
    ServiceInfo,
};

/// Queue name of the MusicBrainz lookup service.
pub const MUSICBRAINZ_QUEUE: &str = "musicbrainz";

/// Client for one named lookup service.
pub struct ServiceClient {
    rpc: RpcClient,
}

impl ServiceClient {
    // ---

    /// Wrap an existing RPC client. The target service is whatever queue
    /// the client was configured with.
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    /// Connect to an AMQP broker and target the MusicBrainz service queue.
    pub async fn musicbrainz(broker_uri: impl Into<String>) -> Result<Self> {
        // ---
        let config = RpcConfig::amqp(broker_uri, MUSICBRAINZ_QUEUE);
        let (session, inbox) = open_amqp_session(&config).await?;
        let rpc = RpcClient::with_session(session, inbox, config.service_queue);
        Ok(Self { rpc })
    }

    /// Queue name this facade sends commands to.
    pub fn queue(&self) -> &str {
        self.rpc.service_queue()
    }

    /// Liveness probe. The service answers with an empty payload, which is
    /// returned raw.
    pub async fn ping(&self) -> Result<Bytes> {
        // ---
        self.rpc.call(&Command::ping()).await
    }

    /// As [`ping`](Self::ping), with a bounded wait.
    pub async fn ping_with_timeout(&self, timeout: Duration) -> Result<Bytes> {
        // ---
        self.rpc.call_with_timeout(&Command::ping(), timeout).await
    }

    /// Ask the service to describe itself. `ServiceInfo::name` equals the
    /// service queue name.
    pub async fn info(&self) -> Result<ServiceInfo> {
        // ---
        let reply = self.rpc.call(&Command::info()).await?;
        decode(&reply)
    }

    /// Look up a release by id or by incomplete descriptive data. The best
    /// match sits at `reply.first_release()`.
    pub async fn search_by_release(&self, release: &ReleaseQuery) -> Result<SearchReply> {
        // ---
        let reply = self.rpc.call(&Command::release(release.clone())).await?;
        decode(&reply)
    }

    /// Send an arbitrary command and return the raw reply payload.
    pub async fn call(&self, command: &Command) -> Result<Bytes> {
        // ---
        self.rpc.call(command).await
    }

    /// As [`call`](Self::call), with a bounded wait.
    pub async fn call_with_timeout(&self, command: &Command, timeout: Duration) -> Result<Bytes> {
        // ---
        self.rpc.call_with_timeout(command, timeout).await
    }

    /// Close the underlying session. Idempotent.
    pub async fn close(&self) -> Result<()> {
        // ---
        self.rpc.close().await
    }

    /// Access the underlying RPC client.
    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }
}

fn decode<T: serde::de::DeserializeOwned>(reply: &Bytes) -> Result<T> {
    // ---
    if reply.is_empty() {
        return Err(Error::EmptyReply);
    }
    serde_json::from_slice(reply).map_err(Error::Decode)
}
