//! Entity mappings that tell the decoder how to read each source.

use cdc_relay_core::event::EntityAction;
use serde::Deserialize;
use thiserror::Error;

/// Source pattern that matches every source.
pub const ANY_SOURCE: &str = "*";

/// Invalid mapping configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// No mappings were configured.
    #[error("at least one entity mapping is required")]
    Empty,

    /// A mapping has an empty required attribute.
    #[error("mapping #{index}: {field} must not be blank")]
    Blank {
        /// Position of the mapping in the list.
        index: usize,
        /// The blank attribute.
        field: &'static str,
    },
}

/// Per-action event type names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EventTypeOverrides {
    /// Name used for Insert records.
    pub created: Option<String>,
    /// Name used for Modify records.
    pub updated: Option<String>,
    /// Name used for Remove records.
    pub deleted: Option<String>,
}

/// How records from one source become domain events.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EntityMapping {
    /// Source name this mapping applies to, or `*`.
    #[serde(default = "any_source")]
    pub source: String,
    /// Logical entity name used in event types.
    pub entity: String,
    /// Field holding the entity id.
    #[serde(default = "default_id_field")]
    pub id_field: String,
    /// Fields that must be present in the after-image for Insert/Modify.
    #[serde(default)]
    pub required_fields: Vec<String>,
    /// When set, only these after-image fields are carried in the payload.
    #[serde(default)]
    pub payload_fields: Option<Vec<String>>,
    /// Event type names replacing the `{entity}.created` style defaults.
    #[serde(default)]
    pub event_types: EventTypeOverrides,
}

fn any_source() -> String {
    ANY_SOURCE.to_owned()
}

fn default_id_field() -> String {
    "id".to_owned()
}

impl EntityMapping {
    /// A mapping for `entity` records from `source`, keyed by `id_field`.
    #[must_use]
    pub fn new(source: &str, entity: &str, id_field: &str) -> Self {
        Self {
            source: source.to_owned(),
            entity: entity.to_owned(),
            id_field: id_field.to_owned(),
            required_fields: Vec::new(),
            payload_fields: None,
            event_types: EventTypeOverrides::default(),
        }
    }

    /// Adds fields that Insert/Modify records must carry.
    #[must_use]
    pub fn with_required_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Restricts the payload to the given fields.
    #[must_use]
    pub fn with_payload_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.payload_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Returns `true` if this mapping covers `source`.
    #[must_use]
    pub fn matches(&self, source: &str) -> bool {
        self.source == ANY_SOURCE || self.source == source
    }

    /// Event type name for `action`.
    #[must_use]
    pub fn event_type(&self, action: EntityAction) -> String {
        let (custom, suffix) = match action {
            EntityAction::Created => (&self.event_types.created, "created"),
            EntityAction::Updated => (&self.event_types.updated, "updated"),
            EntityAction::Deleted => (&self.event_types.deleted, "deleted"),
        };
        custom
            .clone()
            .unwrap_or_else(|| format!("{}.{suffix}", self.entity))
    }
}

/// Checks a list of mappings before the decoder uses it.
///
/// # Errors
///
/// Returns `MappingError` if the list is empty or a mapping has a blank
/// source, entity, or id field.
pub fn validate(mappings: &[EntityMapping]) -> Result<(), MappingError> {
    if mappings.is_empty() {
        return Err(MappingError::Empty);
    }
    for (index, mapping) in mappings.iter().enumerate() {
        let checks = [
            ("source", &mapping.source),
            ("entity", &mapping.entity),
            ("id_field", &mapping.id_field),
        ];
        if let Some(&(field, _)) = checks.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(MappingError::Blank { index, field });
        }
    }
    Ok(())
}
