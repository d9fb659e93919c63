//! Broker session implementations.
//!
//! This module provides concrete implementations of the domain-level
//! [`BrokerSession`](crate::BrokerSession) trait, exposed only through
//! constructor functions and the [`MemoryBroker`] handle. Domain code must
//! not depend on transport-specific types.

mod amqp;
mod memory;

pub use amqp::open_amqp_session;
pub use memory::{MemoryBroker, MemoryDelivery};
