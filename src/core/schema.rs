//! Model schemas and introspection
//!
//! A model is any serde type implementing [`Model`]. Its schema is built once
//! at registration time by [`ModelSchema::of`]: the typed data fields plus a
//! capability table mapping each computed name to an accessor closure.
//! Requests never resolve fields or methods by reflection; they look them up
//! in this table.
//!
//! ```rust,ignore
//! impl_model!(Car, "car", {
//!     brand: String,
//!     year: i64,
//!     miles: f64,
//! }, computed [miles_per_year]);
//!
//! impl Car {
//!     fn miles_per_year(&self) -> f64 { /* ... */ }
//! }
//!
//! let schema = ModelSchema::of::<Car>()?;
//! assert!(schema.is_computed("miles_per_year"));
//! ```

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::error::{ApiError, ApiResult, ConfigError, FieldIssue, ValidationError};
use crate::core::field::{FieldType, FieldValue};
use crate::core::record::{Record, SLUG_FIELD};

/// Trait implemented by every model exposed through an endpoint
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name used to reference the model from configuration
    fn model_name() -> &'static str;

    /// Declare the model's fields and computed accessors
    fn describe(schema: &mut SchemaBuilder<Self>);
}

/// Maps a Rust field type to its declared [`FieldType`]
pub trait FieldKind {
    const FIELD_TYPE: FieldType;
    const REQUIRED: bool = true;
}

macro_rules! field_kind {
    ($field_type:expr => $($rust:ty),+) => {
        $(impl FieldKind for $rust {
            const FIELD_TYPE: FieldType = $field_type;
        })+
    };
}

field_kind!(FieldType::Integer => i64, i32, i16, i8, u32, u16, u8);
field_kind!(FieldType::Float => f64, f32);
field_kind!(FieldType::String => String);
field_kind!(FieldType::Boolean => bool);
field_kind!(FieldType::Uuid => Uuid);

impl<T: FieldKind> FieldKind for Option<T> {
    const FIELD_TYPE: FieldType = T::FIELD_TYPE;
    const REQUIRED: bool = false;
}

/// A declared data field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
}

type Accessor<M> = Arc<dyn Fn(&M) -> Value + Send + Sync>;

/// Collects field and computed declarations for a model
pub struct SchemaBuilder<M> {
    fields: Vec<FieldSchema>,
    computed: Vec<(String, Accessor<M>)>,
}

impl<M: Model> SchemaBuilder<M> {
    fn new() -> Self {
        Self {
            fields: Vec::new(),
            computed: Vec::new(),
        }
    }

    /// Declare a required field
    pub fn field(&mut self, name: &str, field_type: FieldType) -> &mut Self {
        self.push_field(name, field_type, true)
    }

    /// Declare an optional field (missing or `null` is accepted)
    pub fn optional_field(&mut self, name: &str, field_type: FieldType) -> &mut Self {
        self.push_field(name, field_type, false)
    }

    /// Declare a field typed after its Rust type
    pub fn field_of<T: FieldKind>(&mut self, name: &str) -> &mut Self {
        self.push_field(name, T::FIELD_TYPE, T::REQUIRED)
    }

    /// Register a zero-argument computed accessor.
    ///
    /// The accessor must be side-effect free; its result is serialized into
    /// the projected response.
    pub fn computed<R, F>(&mut self, name: &str, accessor: F) -> &mut Self
    where
        R: Serialize,
        F: Fn(&M) -> R + Send + Sync + 'static,
    {
        let accessor: Accessor<M> = Arc::new(move |model: &M| {
            serde_json::to_value(accessor(model)).unwrap_or(Value::Null)
        });
        self.computed.push((name.to_string(), accessor));
        self
    }

    fn push_field(&mut self, name: &str, field_type: FieldType, required: bool) -> &mut Self {
        self.fields.push(FieldSchema {
            name: name.to_string(),
            field_type,
            required,
        });
        self
    }
}

/// Type-erased view of a model used at request time
trait ModelBinding: Send + Sync {
    /// Check that coerced values deserialize into the model type
    fn check(&self, values: &Map<String, Value>) -> Result<(), String>;

    /// Materialize a record once and evaluate the named accessors
    fn evaluate(&self, record: &Record, names: &[&str]) -> ApiResult<IndexMap<String, Value>>;
}

struct TypedBinding<M: Model> {
    accessors: IndexMap<String, Accessor<M>>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> ModelBinding for TypedBinding<M> {
    fn check(&self, values: &Map<String, Value>) -> Result<(), String> {
        serde_json::from_value::<M>(Value::Object(values.clone()))
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    fn evaluate(&self, record: &Record, names: &[&str]) -> ApiResult<IndexMap<String, Value>> {
        let instance: M = serde_json::from_value(Value::Object(record.fields_json()))
            .map_err(|e| {
                ApiError::Internal(format!(
                    "record '{}' does not match model '{}': {}",
                    record.slug,
                    M::model_name(),
                    e
                ))
            })?;

        Ok(names
            .iter()
            .filter_map(|name| {
                self.accessors
                    .get(*name)
                    .map(|accessor| (name.to_string(), accessor(&instance)))
            })
            .collect())
    }
}

/// Introspected, immutable description of a model
#[derive(Clone)]
pub struct ModelSchema {
    name: String,
    fields: Arc<IndexMap<String, FieldSchema>>,
    computed: Arc<IndexSet<String>>,
    binding: Arc<dyn ModelBinding>,
}

impl std::fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSchema")
            .field("name", &self.name)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("computed", &self.computed)
            .finish()
    }
}

impl ModelSchema {
    /// Introspect a model: collect its typed fields and computed accessors.
    ///
    /// The system field `slug` is always present. Fails if the model declares
    /// no fields, a duplicate name, the reserved `slug`, or a computed name
    /// that collides with a field.
    pub fn of<M: Model>() -> Result<Self, ConfigError> {
        let mut builder = SchemaBuilder::<M>::new();
        M::describe(&mut builder);

        let model_name = M::model_name();
        let context = format!("model '{}'", model_name);

        if builder.fields.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "fields".to_string(),
                value: model_name.to_string(),
                message: "model declares no fields".to_string(),
            });
        }

        let mut fields = IndexMap::with_capacity(builder.fields.len() + 1);
        fields.insert(
            SLUG_FIELD.to_string(),
            FieldSchema {
                name: SLUG_FIELD.to_string(),
                field_type: FieldType::String,
                required: false,
            },
        );

        for field in builder.fields {
            if field.name == SLUG_FIELD {
                return Err(ConfigError::InvalidValue {
                    field: field.name,
                    value: model_name.to_string(),
                    message: format!("'{}' is reserved for the record identifier", SLUG_FIELD),
                });
            }
            if fields.contains_key(&field.name) {
                return Err(duplicate(&field.name, &context));
            }
            fields.insert(field.name.clone(), field);
        }

        let mut accessors = IndexMap::with_capacity(builder.computed.len());
        for (name, accessor) in builder.computed {
            if fields.contains_key(&name) || accessors.contains_key(&name) {
                return Err(duplicate(&name, &context));
            }
            accessors.insert(name, accessor);
        }

        let computed: IndexSet<String> = accessors.keys().cloned().collect();

        tracing::debug!(
            model = model_name,
            fields = fields.len(),
            computed = computed.len(),
            "introspected model"
        );

        Ok(Self {
            name: model_name.to_string(),
            fields: Arc::new(fields),
            computed: Arc::new(computed),
            binding: Arc::new(TypedBinding::<M> {
                accessors,
                _model: PhantomData,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Data fields in declaration order, `slug` first
    pub fn fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.values()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.get(name)
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields.get(name).map(|f| f.field_type)
    }

    pub fn is_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn is_computed(&self, name: &str) -> bool {
        self.computed.contains(name)
    }

    pub fn computed_names(&self) -> impl Iterator<Item = &str> {
        self.computed.iter().map(String::as_str)
    }

    /// Every field and computed name, the default allow-list for endpoints
    pub fn all_names(&self) -> Vec<String> {
        self.fields
            .keys()
            .chain(self.computed.iter())
            .cloned()
            .collect()
    }

    /// Validate a JSON body against the schema.
    ///
    /// Every declared field is coerced by its type; all issues are collected
    /// before failing. Unknown keys and `slug` are ignored. The coerced values
    /// must also deserialize into the model type itself.
    pub fn validate(&self, body: &Map<String, Value>) -> Result<IndexMap<String, FieldValue>, ValidationError> {
        let mut values = IndexMap::with_capacity(self.fields.len());
        let mut issues = Vec::new();

        for field in self.fields.values().filter(|f| f.name != SLUG_FIELD) {
            match body.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    issues.push(FieldIssue::new(&field.name, "missing", "Field required"));
                }
                None | Some(Value::Null) => {
                    values.insert(field.name.clone(), FieldValue::Null);
                }
                Some(raw) => match field.field_type.coerce_json(raw) {
                    Ok(value) => {
                        values.insert(field.name.clone(), value);
                    }
                    Err(e) => issues.push(e.into_issue(&field.name)),
                },
            }
        }

        if !issues.is_empty() {
            return Err(ValidationError::InvalidData { issues });
        }

        let as_json: Map<String, Value> = values
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        self.binding.check(&as_json).map_err(|message| ValidationError::InvalidData {
            issues: vec![FieldIssue::new(self.name.as_str(), "model", message)],
        })?;

        Ok(values)
    }

    /// Evaluate computed accessors for a stored record
    pub fn evaluate(&self, record: &Record, names: &[&str]) -> ApiResult<IndexMap<String, Value>> {
        if names.is_empty() {
            return Ok(IndexMap::new());
        }
        self.binding.evaluate(record, names)
    }
}

fn duplicate(name: &str, context: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: name.to_string(),
        value: context.to_string(),
        message: "name is declared more than once".to_string(),
    }
}
