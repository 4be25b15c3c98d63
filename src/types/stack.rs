use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{ProjectId, TenantId};

pub type StackId = String;

/// A deduplicated group of structurally identical errors.
///
/// # Invariants
/// - At most one stack exists per `(project_id, signature_hash)`.
/// - `first_occurrence <= last_occurrence` whenever `total_occurrences > 0`.
/// - `total_occurrences` only grows; the occurrence counter never subtracts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stack {
    pub id: StackId,
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub signature_hash: String,
    pub title: String,
    pub first_occurrence: DateTime<Utc>,
    pub last_occurrence: DateTime<Utc>,
    pub total_occurrences: i64,
    pub is_fixed: bool,
    pub date_fixed: Option<DateTime<Utc>>,
    pub is_hidden: bool,
    pub is_regressed: bool,
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped on every write.
    #[serde(default)]
    pub version: i64,
}

/// Template for a stack created on first sight of a signature.
#[derive(Debug, Clone)]
pub struct NewStack {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub title: String,
    pub first_seen: DateTime<Utc>,
}

impl NewStack {
    /// Materialize the template. Occurrence bounds start at `first_seen` with
    /// a zero count; the occurrence counter fills them in.
    pub fn into_stack(self, signature_hash: &str) -> Stack {
        Stack {
            id: uuid::Uuid::now_v7().to_string(),
            tenant_id: self.tenant_id,
            project_id: self.project_id,
            signature_hash: signature_hash.to_string(),
            title: self.title,
            first_occurrence: self.first_seen,
            last_occurrence: self.first_seen,
            total_occurrences: 0,
            is_fixed: false,
            date_fixed: None,
            is_hidden: false,
            is_regressed: false,
            created_at: Utc::now(),
            version: 0,
        }
    }
}

/// Lowercase hex SHA-256 of a raw error signature.
pub fn signature_hash(signature: &str) -> String {
    hex::encode(Sha256::digest(signature.as_bytes()))
}

/// Signature hash over ordered key/value parts (e.g. exception type, method,
/// line). Parts are joined unambiguously before hashing.
pub fn signature_hash_from_parts<'a>(parts: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in parts {
        hasher.update(key.as_bytes());
        hasher.update([0x1f]);
        hasher.update(value.as_bytes());
        hasher.update([0x1e]);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_hash_is_stable() {
        let a = signature_hash("NullReferenceException at Foo.Bar()");
        let b = signature_hash("NullReferenceException at Foo.Bar()");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, signature_hash("NullReferenceException at Foo.Baz()"));
    }

    #[test]
    fn test_signature_parts_are_delimited() {
        let a = signature_hash_from_parts([("type", "ab"), ("method", "c")]);
        let b = signature_hash_from_parts([("type", "a"), ("method", "bc")]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_new_stack_starts_empty() {
        let now = Utc::now();
        let stack = NewStack {
            tenant_id: "t1".into(),
            project_id: "p1".into(),
            title: "boom".into(),
            first_seen: now,
        }
        .into_stack("abc");

        assert_eq!(stack.total_occurrences, 0);
        assert_eq!(stack.first_occurrence, stack.last_occurrence);
        assert_eq!(stack.signature_hash, "abc");
    }
}
