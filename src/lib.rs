//! Synchronous request/reply RPC over AMQP pub/sub, with correlation-based
//! reply matching.
//!
//! A caller issues a command and awaits the matching reply, even though the
//! broker only offers fire-and-forget delivery plus independent
//! consumption. Opening a session declares a private, broker-named reply
//! queue; each outgoing request carries a fresh correlation token and the
//! reply queue's address, and incoming replies are matched back to the call
//! that produced them. A thin facade fixes the target service queue and
//! shapes the named operations (ping, info, release lookup).

// Import all sub modules once...
mod client;
mod domain;
mod facade;
mod protocol;
mod transport;

mod config;

mod correlation;
mod error;

// Re-export main types
pub use client::RpcClient;
pub use facade::{ServiceClient, MUSICBRAINZ_QUEUE};

pub use config::RpcConfig;

pub use correlation::CorrelationToken;
pub use error::{Error, Result};

pub use transport::{open_amqp_session, MemoryBroker, MemoryDelivery};

// --- public re-exports
pub use domain::{
    //
    BrokerSession,
    ReplyDelivery,
    ReplyInbox,
    SessionPtr,
};

pub use protocol::{
    //
    Command,
    EmptyParams,
    PublishingLabel,
    ReleaseInfo,
    ReleaseQuery,
    SearchReply,
    ServiceInfo,
    Suggestion,
    SuggestionSet,
};
