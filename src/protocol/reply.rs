use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Service self-description, as answered to the `info` command.
///
/// The service marshals these with PascalCase keys; only `Name` is
/// guaranteed, and it equals the service's queue name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceInfo {
    #[serde(default)]
    pub subsystem: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Reply to a `release` lookup command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchReply {
    pub suggestion_set: SuggestionSet,
}

impl SearchReply {
    /// The service's best match, if any.
    ///
    /// Suggestions arrive ordered by similarity, best first.
    pub fn first_release(&self) -> Option<&ReleaseInfo> {
        // ---
        self.suggestion_set
            .suggestions
            .first()
            .map(|s| &s.release)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestionSet {
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
}

/// One candidate release with the score the service assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub release: ReleaseInfo,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub source_similarity: f64,
}

/// Release description inside a suggestion.
///
/// Decoded leniently: the service sends considerably more metadata than the
/// client needs, and unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    /// External catalog ids, keyed by service name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ids: BTreeMap<String, String>,
}
