//! Record decoder: change records to domain events.
//!
//! Decoding is a pure function of the record and the configured mappings.
//! Insert and Modify records are read from the after-image; Remove records
//! are read from the before-image only.

use cdc_relay_core::dedup::DedupKey;
use cdc_relay_core::error::DecodeError;
use cdc_relay_core::event::{DomainEvent, EntityAction};
use cdc_relay_core::record::{ChangeKind, ChangeRecord, Image};
use serde_json::{Map, Value};

use super::mapping::{self, EntityMapping, MappingError};

/// Turns change records into domain events using entity mappings.
#[derive(Debug, Clone)]
pub struct RecordDecoder {
    mappings: Vec<EntityMapping>,
}

impl RecordDecoder {
    /// Creates a decoder. The first mapping matching a record's source wins.
    ///
    /// # Errors
    ///
    /// Returns `MappingError` if the mappings are empty or incomplete.
    pub fn new(mappings: Vec<EntityMapping>) -> Result<Self, MappingError> {
        mapping::validate(&mappings)?;
        Ok(Self { mappings })
    }

    /// Returns the configured mappings.
    #[must_use]
    pub fn mappings(&self) -> &[EntityMapping] {
        &self.mappings
    }

    /// Decodes one change record.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the kind is unknown, no mapping covers the
    /// source, the needed image is absent, or a required field is missing or
    /// unusable.
    pub fn decode(&self, record: &ChangeRecord) -> Result<DomainEvent, DecodeError> {
        let action = match &record.kind {
            ChangeKind::Insert => EntityAction::Created,
            ChangeKind::Modify => EntityAction::Updated,
            ChangeKind::Remove => EntityAction::Deleted,
            ChangeKind::Unknown(raw) => return Err(DecodeError::UnsupportedKind(raw.clone())),
        };

        let mapping = self
            .mappings
            .iter()
            .find(|m| m.matches(&record.source))
            .ok_or_else(|| DecodeError::UnmappedSource(record.source.clone()))?;

        let (entity_id, payload) = if action.is_deletion() {
            let before = image_or_err(record.before_image.as_ref(), &record.kind, "before")?;
            decode_removal(mapping, before)?
        } else {
            let after = image_or_err(record.after_image.as_ref(), &record.kind, "after")?;
            decode_upsert(mapping, after)?
        };

        Ok(DomainEvent {
            event_id: DedupKey::for_record(record).event_id(),
            event_type: mapping.event_type(action),
            entity: mapping.entity.clone(),
            entity_id,
            action,
            source: record.source.clone(),
            partition_key: record.partition_key.clone(),
            sequence_token: record.sequence_token.clone(),
            payload,
            occurred_at: record.created_at,
        })
    }
}

fn image_or_err<'a>(
    image: Option<&'a Image>,
    kind: &ChangeKind,
    side: &'static str,
) -> Result<&'a Image, DecodeError> {
    image.ok_or_else(|| DecodeError::MissingImage {
        kind: kind.to_string(),
        side,
    })
}

/// Present and not null.
fn field<'a>(image: &'a Image, name: &str) -> Option<&'a Value> {
    image.get(name).filter(|value| !value.is_null())
}

fn read_id(mapping: &EntityMapping, image: &Image) -> Result<String, DecodeError> {
    let value = field(image, &mapping.id_field)
        .ok_or_else(|| DecodeError::MissingField(mapping.id_field.clone()))?;
    match value {
        Value::String(id) if !id.is_empty() => Ok(id.clone()),
        Value::Number(id) => Ok(id.to_string()),
        Value::String(_) => Err(DecodeError::InvalidField {
            name: mapping.id_field.clone(),
            reason: "empty string".to_owned(),
        }),
        other => Err(DecodeError::InvalidField {
            name: mapping.id_field.clone(),
            reason: format!("expected string or number, got {}", json_type(other)),
        }),
    }
}

fn decode_upsert(mapping: &EntityMapping, after: &Image) -> Result<(String, Value), DecodeError> {
    let entity_id = read_id(mapping, after)?;
    if let Some(missing) = mapping
        .required_fields
        .iter()
        .find(|name| field(after, name).is_none())
    {
        return Err(DecodeError::MissingField(missing.clone()));
    }

    let payload: Map<String, Value> = match &mapping.payload_fields {
        Some(names) => names
            .iter()
            .filter_map(|name| after.get(name).map(|value| (name.clone(), value.clone())))
            .collect(),
        None => after
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
    };
    Ok((entity_id, Value::Object(payload)))
}

fn decode_removal(mapping: &EntityMapping, before: &Image) -> Result<(String, Value), DecodeError> {
    let entity_id = read_id(mapping, before)?;
    let mut payload = Map::new();
    if let Some(id) = before.get(&mapping.id_field) {
        payload.insert(mapping.id_field.clone(), id.clone());
    }
    Ok((entity_id, Value::Object(payload)))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
