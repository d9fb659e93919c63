//! AMQP session implementation.

mod lapin;

pub use lapin::open_session as open_amqp_session;
