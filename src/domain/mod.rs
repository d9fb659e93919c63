//! Domain layer public interface.
//!
//! This module defines session-level abstractions that are independent of
//! any concrete broker client library. Consumers must import symbols via
//! this module, not by referencing individual files directly.

mod session;

// --- Session domain re-exports ---

pub use session::{
    //
    BrokerSession,
    ReplyDelivery,
    ReplyInbox,
    SessionPtr,
};
