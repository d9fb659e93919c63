/// Wire types for the command/reply protocol.
///
/// Commands are JSON objects discriminated by a `cmd` field; replies are
/// JSON shaped by the remote service. Both sides of the contract must stay
/// bit-compatible with the deployed services, so field names here are wire
/// names, not Rust conventions.
mod command;
mod reply;

pub use command::{Command, EmptyParams, PublishingLabel, ReleaseQuery};
pub use reply::{ReleaseInfo, SearchReply, ServiceInfo, Suggestion, SuggestionSet};
