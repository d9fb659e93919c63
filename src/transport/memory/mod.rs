//! In-memory broker, the reference session implementation.

mod broker;

pub use broker::{MemoryBroker, MemoryDelivery};
