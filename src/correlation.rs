use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique token used to match a reply to the request that caused it.
///
/// Tokens are carried in the `correlation_id` message property, generated
/// fresh per call and never reused. They are opaque to the broker and to
/// the remote service, which simply echoes them back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    /// Generate a new unique token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CorrelationToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CorrelationToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
