//! Builders for change records used across test suites.

use cdc_relay_core::record::{ChangeKind, ChangeRecord, Image};

use crate::clock::fixed_now;

/// Converts a JSON object into an image. Non-objects yield an empty image.
#[must_use]
pub fn image(value: serde_json::Value) -> Image {
    match value {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        _ => Image::new(),
    }
}

fn record(
    source: &str,
    id: &str,
    sequence_token: &str,
    kind: ChangeKind,
    before_image: Option<Image>,
    after_image: Option<Image>,
) -> ChangeRecord {
    ChangeRecord {
        source: source.to_owned(),
        sequence_token: sequence_token.to_owned(),
        kind,
        partition_key: format!("id={id}"),
        before_image,
        after_image,
        created_at: fixed_now(),
    }
}

/// An Insert record for entity `id` with `after` as its after-image.
#[must_use]
pub fn insert_record(
    source: &str,
    id: &str,
    sequence_token: &str,
    after: serde_json::Value,
) -> ChangeRecord {
    record(
        source,
        id,
        sequence_token,
        ChangeKind::Insert,
        None,
        Some(image(after)),
    )
}

/// A Modify record for entity `id`.
#[must_use]
pub fn modify_record(
    source: &str,
    id: &str,
    sequence_token: &str,
    before: serde_json::Value,
    after: serde_json::Value,
) -> ChangeRecord {
    record(
        source,
        id,
        sequence_token,
        ChangeKind::Modify,
        Some(image(before)),
        Some(image(after)),
    )
}

/// A Remove record for entity `id` with `before` as its before-image.
#[must_use]
pub fn remove_record(
    source: &str,
    id: &str,
    sequence_token: &str,
    before: serde_json::Value,
) -> ChangeRecord {
    record(
        source,
        id,
        sequence_token,
        ChangeKind::Remove,
        Some(image(before)),
        None,
    )
}
