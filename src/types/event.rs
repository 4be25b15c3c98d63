use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{ProjectId, StackId, TenantId, signature_hash, signature_hash_from_parts};

pub type EventId = String;

/// One stored occurrence. Immutable after insert apart from the
/// `is_fixed`/`is_hidden` flags projected from its stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub stack_id: StackId,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub is_fixed: bool,
    #[serde(default)]
    pub is_hidden: bool,
}

impl Event {
    /// UTC day this event is partitioned under.
    pub fn partition_date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    pub fn to_ref(&self) -> EventRef {
        EventRef {
            id: self.id.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Projection of an event used for ordering: `(timestamp, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EventRef {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
}

impl Ord for EventRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for EventRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// An occurrence as handed over by the ingestion boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingEvent {
    /// Raw error signature; hashed into the stack dedup key.
    #[serde(default)]
    pub signature: String,
    /// Ordered key/value parts hashed instead of `signature` when present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signature_parts: Vec<(String, String)>,
    /// Stack title used when the signature is new. Defaults to the signature.
    #[serde(default)]
    pub title: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl IncomingEvent {
    pub fn signature_hash(&self) -> String {
        if self.signature_parts.is_empty() {
            return signature_hash(&self.signature);
        }
        signature_hash_from_parts(
            self.signature_parts
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        )
    }

    /// Fallback stack title when none is given.
    pub fn display_signature(&self) -> String {
        if self.signature_parts.is_empty() {
            return self.signature.clone();
        }
        self.signature_parts
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn has_signature(&self) -> bool {
        !self.signature.trim().is_empty() || !self.signature_parts.is_empty()
    }
}

/// Result of ingesting one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestResult {
    /// `None` when the event was rejected before stack resolution.
    pub stack_id: Option<StackId>,
    pub event_id: Option<EventId>,
    pub accepted: bool,
}
