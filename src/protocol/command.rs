use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Parameter object for commands that take none.
///
/// Serializes as `{}` so the wire form stays `{"cmd": ..., "params": {}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyParams {}

/// A command addressed to a remote service.
///
/// The `cmd` field is the operation discriminant; the remaining field is
/// operation-specific. The client never interprets these beyond encoding —
/// deserialization happens on the service side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
pub enum Command {
    /// Liveness probe; the service answers with an empty body.
    Ping { params: EmptyParams },

    /// Service self-description; the service answers with its version info.
    Info { params: EmptyParams },

    /// Release lookup, by external catalog id or by incomplete descriptive
    /// data. The service answers with a suggestion set.
    Release { release: ReleaseQuery },
}

impl Command {
    // ---

    pub fn ping() -> Self {
        Self::Ping {
            params: EmptyParams {},
        }
    }

    pub fn info() -> Self {
        Self::Info {
            params: EmptyParams {},
        }
    }

    pub fn release(release: ReleaseQuery) -> Self {
        Self::Release { release }
    }

    /// Encode to the UTF-8 JSON wire form.
    pub fn to_bytes(&self) -> Result<Bytes> {
        // ---
        let vec = serde_json::to_vec(self).map_err(Error::Encode)?;
        Ok(Bytes::from(vec))
    }

    /// Decode from the wire form. Exposed for tests and service-side use.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        // ---
        serde_json::from_slice(bytes).map_err(Error::Decode)
    }
}

/// A release lookup query.
///
/// Intentionally loose: every field is optional and absent fields are
/// omitted from the wire form, so the same shape covers both an
/// id-only lookup (`{"ids": {"musicbrainz": "..."}}`) and an incomplete
/// descriptive one (year / title / publishing / actor roles). The client
/// performs no validation before sending; shape errors are the service's
/// to report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseQuery {
    /// External catalog ids, keyed by service name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Publishing labels with catalog numbers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub publishing: Vec<PublishingLabel>,

    /// Actor name → roles (e.g. `"Pink Floyd" → ["performer"]`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub actor_roles: BTreeMap<String, Vec<String>>,
}

impl ReleaseQuery {
    // ---

    /// Query referencing a known external catalog id.
    pub fn by_id(service: impl Into<String>, id: impl Into<String>) -> Self {
        // ---
        let mut ids = BTreeMap::new();
        ids.insert(service.into(), id.into());
        Self {
            ids: Some(ids),
            ..Self::default()
        }
    }

    pub fn with_year(mut self, year: u16) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_publishing(mut self, name: impl Into<String>, catno: impl Into<String>) -> Self {
        // ---
        self.publishing.push(PublishingLabel {
            name: name.into(),
            catno: catno.into(),
        });
        self
    }

    pub fn with_actor_role(mut self, actor: impl Into<String>, role: impl Into<String>) -> Self {
        // ---
        self.actor_roles
            .entry(actor.into())
            .or_default()
            .push(role.into());
        self
    }
}

/// One publishing label entry of a release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishingLabel {
    pub name: String,
    pub catno: String,
}
