//! The event record and its kind.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

impl EventKind {
    /// Wire label, as written to the `type` field of the broker payload.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Updated => "Updated",
            Self::Deleted => "Deleted",
        }
    }

    /// Past-tense verb used in human-readable log lines.
    pub fn verb(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.verb())
    }
}

/// An immutable fact: entity `id` was `kind` at `timestamp`.
///
/// Fields are private; once built, a record cannot change. Serialises as
/// `{"id": "<uuid>", "type": "Created", "timestamp": "<RFC 3339>"}` with the
/// keys in that order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    id: Uuid,
    #[serde(rename = "type")]
    kind: EventKind,
    timestamp: DateTime<Utc>,
}

impl EventRecord {
    /// Builds a record stamped with the current wall-clock time.
    pub fn new(id: Uuid, kind: EventKind) -> Self {
        Self::at(id, kind, Utc::now())
    }

    /// Builds a record with an explicit timestamp.
    pub fn at(id: Uuid, kind: EventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            kind,
            timestamp,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Serialises the record into the broker payload.
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` failures, which do not happen for this type in
    /// practice but are not ruled out by its signature.
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// `entity <id> <verb> at <RFC 3339>`
impl std::fmt::Display for EventRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "entity {} {} at {}",
            self.id,
            self.kind,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}
