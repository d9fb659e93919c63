use thiserror::Error;

/// Errors that can occur during RPC operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Broker unreachable, or the connection dropped during open, publish,
    /// or consume. Fatal; there is no retry path.
    #[error("broker connection error: {0}")]
    Connection(String),

    /// Command serialization failed. Surfaced before any network I/O.
    #[error("command encode error: {0}")]
    Encode(#[source] serde_json::Error),

    /// Reply bytes could not be parsed into the structure a facade
    /// operation expects.
    #[error("reply decode error: {0}")]
    Decode(#[source] serde_json::Error),

    /// A facade operation that decodes its reply received an empty body.
    #[error("empty reply body")]
    EmptyReply,

    /// The completion handle for a pending call was dropped, typically
    /// because the session shut down while the call was outstanding.
    #[error("reply channel closed before a matching reply arrived")]
    ReplyChannelClosed,

    /// A bounded call gave up waiting for its reply.
    #[error("call timed out waiting for reply")]
    Timeout,
}

/// Result type alias for RPC operations.
pub type Result<T> = std::result::Result<T, Error>;
