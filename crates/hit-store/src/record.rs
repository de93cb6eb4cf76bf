//! The persisted record envelope.

use chrono::{DateTime, Utc};

/// A record as it sits on stable storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitRecord {
    /// Insertion position. Strictly increasing within one store.
    pub sequence: i64,
    /// Unique record id generated on append.
    pub id: String,
    /// Type tag of the payload (e.g. "asset", "experience", "featurization").
    pub kind: String,
    /// Serialized payload (JSON).
    pub payload: String,
    /// When the record was appended.
    pub created_at: DateTime<Utc>,
}
