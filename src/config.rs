//! Public, transport-agnostic client configuration.
//!
//! This type intentionally contains no AMQP-specific concepts. Transport
//! layers are responsible for interpreting it into concrete connection
//! settings.

/// Connection and addressing parameters for one RPC client.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Broker connection URI (e.g. `"amqp://localhost:5672/%2f"`).
    ///
    /// `None` for brokerless sessions (the in-memory reference broker).
    pub broker_uri: Option<String>,

    /// Named queue the remote service consumes commands from.
    pub service_queue: String,

    /// Identifier for this client instance, used for consumer tags and
    /// logging. Not part of the wire contract.
    pub client_id: String,
}

impl RpcConfig {
    /// Create a config for a broker-backed session.
    pub fn amqp(broker_uri: impl Into<String>, service_queue: impl Into<String>) -> Self {
        Self {
            broker_uri: Some(broker_uri.into()),
            service_queue: service_queue.into(),
            client_id: "rpc-client".to_string(),
        }
    }

    /// Create a config for the in-memory broker (no URI).
    pub fn memory(service_queue: impl Into<String>) -> Self {
        Self {
            broker_uri: None,
            service_queue: service_queue.into(),
            client_id: "rpc-client".to_string(),
        }
    }

    /// Set an explicit client identifier.
    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }
}
