//! Raw change records as delivered by the upstream change source.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A row image: field name to value.
///
/// Ordered so that anything derived from an image (payloads, search
/// documents) is deterministic.
pub type Image = BTreeMap<String, serde_json::Value>;

/// The kind of row-level change a record describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChangeKind {
    /// A new row was written. Carries an after-image.
    Insert,
    /// An existing row changed. Carries before and after images.
    Modify,
    /// A row was deleted. Carries a before-image only.
    Remove,
    /// A kind the relay does not understand. Decoding rejects it.
    Unknown(String),
}

impl ChangeKind {
    /// Returns the wire name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Insert => "INSERT",
            Self::Modify => "MODIFY",
            Self::Remove => "REMOVE",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<String> for ChangeKind {
    fn from(raw: String) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "INSERT" => Self::Insert,
            "MODIFY" => Self::Modify,
            "REMOVE" => Self::Remove,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<ChangeKind> for String {
    fn from(kind: ChangeKind) -> Self {
        kind.as_str().to_owned()
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raw notification from the upstream change source.
///
/// Records are immutable once received. The same record may be delivered
/// more than once; `(partition_key, sequence_token)` identifies it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Name of the table or collection the change came from.
    pub source: String,
    /// Opaque token, strictly increasing per partition key.
    pub sequence_token: String,
    /// What kind of change this is.
    pub kind: ChangeKind,
    /// Identifies the logical entity that changed.
    pub partition_key: String,
    /// Row state before the change (Modify/Remove).
    pub before_image: Option<Image>,
    /// Row state after the change (Insert/Modify).
    pub after_image: Option<Image>,
    /// When the change happened at the source.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_kind_parses_case_insensitively() {
        assert_eq!(ChangeKind::from("insert".to_owned()), ChangeKind::Insert);
        assert_eq!(ChangeKind::from("MODIFY".to_owned()), ChangeKind::Modify);
        assert_eq!(ChangeKind::from("Remove".to_owned()), ChangeKind::Remove);
    }

    #[test]
    fn test_unknown_change_kind_keeps_raw_name() {
        let kind = ChangeKind::from("TRUNCATE".to_owned());

        assert_eq!(kind, ChangeKind::Unknown("TRUNCATE".to_owned()));
        assert_eq!(kind.to_string(), "TRUNCATE");
    }

    #[test]
    fn test_change_record_deserializes_without_images() {
        // Arrange
        let json = serde_json::json!({
            "source": "orders",
            "sequence_token": "100",
            "kind": "REMOVE",
            "partition_key": "id=1",
            "before_image": { "id": "1" },
            "created_at": "2026-01-15T10:00:00Z"
        });

        // Act
        let record: ChangeRecord = serde_json::from_value(json).unwrap();

        // Assert
        assert_eq!(record.kind, ChangeKind::Remove);
        assert!(record.after_image.is_none());
        assert_eq!(
            record.before_image.unwrap().get("id"),
            Some(&serde_json::json!("1"))
        );
    }
}
