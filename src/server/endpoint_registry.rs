//! Endpoint registry: slug → bound model, field lists and authorization hook

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::core::auth::{AuthorizationHook, NoAuthorization};
use crate::core::error::{ApiResult, ConfigError, NotFoundError};
use crate::core::record::Record;
use crate::core::schema::ModelSchema;

/// Unvalidated endpoint declaration
///
/// Unset field lists default to every field and computed name of the model.
#[derive(Clone, Default)]
pub struct EndpointConfig {
    pub slug: Option<String>,
    pub model: Option<ModelSchema>,
    pub allowed_query_fields: Option<Vec<String>>,
    pub visible_fields: Option<Vec<String>>,
    pub hook: Option<Arc<dyn AuthorizationHook>>,
}

impl EndpointConfig {
    pub fn new(slug: impl Into<String>, model: ModelSchema) -> Self {
        Self {
            slug: Some(slug.into()),
            model: Some(model),
            ..Default::default()
        }
    }

    pub fn allowed_query_fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_query_fields = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn visible_fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.visible_fields = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn hook(mut self, hook: impl AuthorizationHook + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    pub fn shared_hook(mut self, hook: Arc<dyn AuthorizationHook>) -> Self {
        self.hook = Some(hook);
        self
    }
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("slug", &self.slug)
            .field("model", &self.model.as_ref().map(ModelSchema::name))
            .field("allowed_query_fields", &self.allowed_query_fields)
            .field("visible_fields", &self.visible_fields)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

/// A validated, immutable endpoint
pub struct Endpoint {
    slug: String,
    model: ModelSchema,
    allowed_query_fields: IndexSet<String>,
    visible_fields: Vec<String>,
    hook: Arc<dyn AuthorizationHook>,
}

impl Endpoint {
    /// Validate a declaration. Fails on a missing slug or model, a slug that
    /// is not a single path segment, or a query name the model doesn't have.
    /// Unknown visible names are kept and left out of every projection.
    pub fn from_config(config: EndpointConfig) -> Result<Self, ConfigError> {
        let slug = config.slug.ok_or_else(|| ConfigError::MissingField {
            field: "slug".to_string(),
            context: "endpoint configuration".to_string(),
        })?;
        validate_slug(&slug)?;

        let model = config.model.ok_or_else(|| ConfigError::MissingField {
            field: "model".to_string(),
            context: format!("endpoint '{}'", slug),
        })?;

        let allowed_query_fields = resolve_query_names(&model, config.allowed_query_fields)?
            .into_iter()
            .collect();
        let visible_fields = config.visible_fields.unwrap_or_else(|| model.all_names());
        for unknown in visible_fields
            .iter()
            .filter(|name| !model.is_field(name) && !model.is_computed(name))
        {
            tracing::warn!(
                endpoint = %slug,
                model = model.name(),
                name = %unknown,
                "visible name is neither a field nor a method; it will be omitted"
            );
        }

        Ok(Self {
            slug,
            model,
            allowed_query_fields,
            visible_fields,
            hook: config.hook.unwrap_or_else(|| Arc::new(NoAuthorization)),
        })
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn model(&self) -> &ModelSchema {
        &self.model
    }

    pub fn allowed_query_fields(&self) -> &IndexSet<String> {
        &self.allowed_query_fields
    }

    pub fn visible_fields(&self) -> &[String] {
        &self.visible_fields
    }

    pub fn hook(&self) -> &dyn AuthorizationHook {
        self.hook.as_ref()
    }

    /// Project a record onto the visible names, in visible order
    pub fn project(&self, record: &Record) -> ApiResult<Map<String, Value>> {
        let computed: Vec<&str> = self
            .visible_fields
            .iter()
            .map(String::as_str)
            .filter(|name| self.model.is_computed(name))
            .collect();
        let mut evaluated = self.model.evaluate(record, &computed)?;

        let mut projected = Map::with_capacity(self.visible_fields.len());
        for name in &self.visible_fields {
            if self.model.is_field(name) {
                if let Some(value) = record.get(name) {
                    projected.insert(name.clone(), value.to_json());
                }
            } else if let Some(value) = evaluated.shift_remove(name) {
                projected.insert(name.clone(), value);
            }
        }
        Ok(projected)
    }

    /// Introspection summary
    pub fn describe(&self) -> EndpointDescription {
        EndpointDescription {
            slug: self.slug.clone(),
            model: self.model.name().to_string(),
            query: self.allowed_query_fields.iter().cloned().collect(),
            visible: self.visible_fields.clone(),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("slug", &self.slug)
            .field("model", &self.model.name())
            .field("allowed_query_fields", &self.allowed_query_fields)
            .field("visible_fields", &self.visible_fields)
            .finish()
    }
}

/// One entry of the `/_endpoints` listing
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EndpointDescription {
    pub slug: String,
    pub model: String,
    pub query: Vec<String>,
    pub visible: Vec<String>,
}

/// Registry for all endpoints in the application
///
/// Built once at startup and read-only afterwards.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: IndexMap<String, Endpoint>,
}

impl EndpointRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register an endpoint. Duplicate slugs are rejected.
    pub fn register(&mut self, config: EndpointConfig) -> Result<(), ConfigError> {
        let endpoint = Endpoint::from_config(config)?;
        if self.endpoints.contains_key(endpoint.slug()) {
            return Err(ConfigError::DuplicateSlug {
                slug: endpoint.slug,
            });
        }

        tracing::info!(
            endpoint = %endpoint.slug,
            model = endpoint.model.name(),
            "registered endpoint"
        );
        self.endpoints.insert(endpoint.slug.clone(), endpoint);
        Ok(())
    }

    pub fn resolve(&self, slug: &str) -> Result<&Endpoint, NotFoundError> {
        self.endpoints
            .get(slug)
            .ok_or_else(|| NotFoundError::Endpoint {
                slug: slug.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.values()
    }

    /// Get all registered slugs, in registration order
    pub fn slugs(&self) -> Vec<&str> {
        self.endpoints.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

fn validate_slug(slug: &str) -> Result<(), ConfigError> {
    let trimmed = slug.trim();
    if trimmed.is_empty() || trimmed != slug || slug.contains('/') || slug.starts_with('_') {
        return Err(ConfigError::InvalidValue {
            field: "slug".to_string(),
            value: slug.to_string(),
            message: "must be a single, non-empty URL path segment not starting with '_'".to_string(),
        });
    }
    Ok(())
}

fn resolve_query_names(
    model: &ModelSchema,
    names: Option<Vec<String>>,
) -> Result<Vec<String>, ConfigError> {
    let Some(names) = names else {
        return Ok(model.all_names());
    };

    if let Some(unknown) = names
        .iter()
        .find(|name| !model.is_field(name) && !model.is_computed(name))
    {
        return Err(ConfigError::InvalidValue {
            field: "allowed_query_fields".to_string(),
            value: unknown.clone(),
            message: format!("'{}' is neither a field nor a method of '{}'", unknown, model.name()),
        });
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::field::FieldValue;
    use crate::core::schema::{Model, SchemaBuilder};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Note {
        title: String,
        words: i64,
    }

    impl Model for Note {
        fn model_name() -> &'static str {
            "note"
        }

        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema
                .field_of::<String>("title")
                .field_of::<i64>("words")
                .computed("shouting", |note: &Self| note.title.to_uppercase());
        }
    }

    fn schema() -> ModelSchema {
        ModelSchema::of::<Note>().expect("note schema should introspect")
    }

    fn record() -> Record {
        let mut fields = IndexMap::new();
        fields.insert("title".to_string(), FieldValue::from("hello"));
        fields.insert("words".to_string(), FieldValue::from(1));
        Record::new("n1", fields)
    }

    #[test]
    fn test_new_registry_is_empty() {
        let registry = EndpointRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.slugs().is_empty());
    }

    #[test]
    fn test_register_defaults_field_lists() {
        let mut registry = EndpointRegistry::new();
        registry
            .register(EndpointConfig::new("notes", schema()))
            .expect("register should succeed");

        let endpoint = registry.resolve("notes").expect("resolve should succeed");
        assert_eq!(endpoint.visible_fields(), ["slug", "title", "words", "shouting"]);
        assert!(endpoint.allowed_query_fields().contains("shouting"));
    }

    #[test]
    fn test_register_rejects_duplicate_slug() {
        let mut registry = EndpointRegistry::new();
        registry
            .register(EndpointConfig::new("notes", schema()))
            .expect("first register should succeed");
        let err = registry
            .register(EndpointConfig::new("notes", schema()))
            .expect_err("duplicate should fail");
        assert!(matches!(err, ConfigError::DuplicateSlug { ref slug } if slug == "notes"));
    }

    #[test]
    fn test_register_rejects_missing_parts() {
        let mut registry = EndpointRegistry::new();
        let err = registry
            .register(EndpointConfig {
                model: Some(schema()),
                ..Default::default()
            })
            .expect_err("missing slug should fail");
        assert!(matches!(err, ConfigError::MissingField { ref field, .. } if field == "slug"));

        let err = registry
            .register(EndpointConfig {
                slug: Some("notes".to_string()),
                ..Default::default()
            })
            .expect_err("missing model should fail");
        assert!(matches!(err, ConfigError::MissingField { ref field, .. } if field == "model"));
    }

    #[test]
    fn test_register_rejects_bad_slugs() {
        for slug in ["", "a/b", " notes", "_endpoints"] {
            let mut registry = EndpointRegistry::new();
            assert!(
                registry.register(EndpointConfig::new(slug, schema())).is_err(),
                "{slug:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_register_rejects_unknown_query_names() {
        let mut registry = EndpointRegistry::new();
        let err = registry
            .register(EndpointConfig::new("notes", schema()).allowed_query_fields(["title", "author"]))
            .expect_err("unknown query name should fail");
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref field, ref value, .. }
                if field == "allowed_query_fields" && value == "author"
        ));
    }

    #[test]
    fn test_unknown_visible_names_are_omitted() {
        let mut registry = EndpointRegistry::new();
        registry
            .register(EndpointConfig::new("notes", schema()).visible_fields(["id", "title"]))
            .expect("unknown visible names should not fail registration");

        let projected = registry
            .resolve("notes")
            .expect("resolve should succeed")
            .project(&record())
            .expect("projection should succeed");
        assert_eq!(Value::Object(projected), json!({ "title": "hello" }));
    }

    #[test]
    fn test_resolve_unknown_slug() {
        let registry = EndpointRegistry::new();
        let err = registry.resolve("boats").expect_err("should not resolve");
        assert_eq!(err.to_string(), "There is no endpoint named: boats");
    }

    #[test]
    fn test_project_follows_visible_order() {
        let mut registry = EndpointRegistry::new();
        registry
            .register(
                EndpointConfig::new("notes", schema()).visible_fields(["shouting", "words", "slug"]),
            )
            .expect("register should succeed");

        let projected = registry
            .resolve("notes")
            .expect("resolve should succeed")
            .project(&record())
            .expect("projection should succeed");

        let keys: Vec<&str> = projected.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["shouting", "words", "slug"]);
        assert_eq!(
            Value::Object(projected),
            json!({ "shouting": "HELLO", "words": 1, "slug": "n1" })
        );
    }
}
