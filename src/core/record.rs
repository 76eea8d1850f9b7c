//! Stored record representation

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use uuid::Uuid;

use crate::core::field::FieldValue;

/// Name of the system field carrying the record identifier
pub const SLUG_FIELD: &str = "slug";

/// A persisted model instance: an opaque identifier plus typed field values.
///
/// The identifier is assigned by the dispatcher before the record reaches
/// storage and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub slug: String,
    #[serde(flatten)]
    pub fields: IndexMap<String, FieldValue>,
}

impl Record {
    pub fn new(slug: impl Into<String>, fields: IndexMap<String, FieldValue>) -> Self {
        Self {
            slug: slug.into(),
            fields,
        }
    }

    /// Generate a fresh identifier: 128 random bits as 32 lowercase hex chars
    pub fn generate_slug() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Look up a value by field name, including the `slug` system field
    pub fn get(&self, name: &str) -> Option<Cow<'_, FieldValue>> {
        if name == SLUG_FIELD {
            return Some(Cow::Owned(FieldValue::String(self.slug.clone())));
        }
        self.fields.get(name).map(Cow::Borrowed)
    }

    /// Data fields as a JSON object, without the identifier
    pub fn fields_json(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect()
    }

    /// Full JSON representation, identifier first
    pub fn to_json(&self) -> Value {
        let mut object = Map::with_capacity(self.fields.len() + 1);
        object.insert(SLUG_FIELD.to_string(), Value::String(self.slug.clone()));
        object.extend(self.fields_json());
        Value::Object(object)
    }
}
