//! Deduplication keys.

use std::fmt;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::record::ChangeRecord;

/// Namespace for event ids derived from dedup keys.
const EVENT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2b7e_5d0a_4c1e_9a3f_8e2d_7b6c_5a41);

/// Key identifying one logical change, derived from
/// `(partition_key, sequence_token)`.
///
/// Derivation only looks at the raw record, so a key exists even for records
/// that fail to decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupKey(String);

impl DedupKey {
    /// Derives the key for a partition key and sequence token.
    ///
    /// Both parts are length-prefixed before hashing so that no two distinct
    /// pairs collide by concatenation.
    #[must_use]
    pub fn derive(partition_key: &str, sequence_token: &str) -> Self {
        let mut hasher = Sha256::new();
        for part in [partition_key, sequence_token] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        let digest = hasher.finalize();

        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            // Writing to a String cannot fail.
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex)
    }

    /// Derives the key for a change record.
    #[must_use]
    pub fn for_record(record: &ChangeRecord) -> Self {
        Self::derive(&record.partition_key, &record.sequence_token)
    }

    /// Returns the key as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the deterministic event id for the change this key identifies.
    #[must_use]
    pub fn event_id(&self) -> Uuid {
        Uuid::new_v5(&EVENT_ID_NAMESPACE, self.0.as_bytes())
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
