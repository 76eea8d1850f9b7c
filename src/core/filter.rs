//! Query-filter compilation
//!
//! Translates the flat key/value query string of a `find` request into a
//! backend-neutral [`FilterExpression`] plus a [`PageSpec`].
//!
//! # Key grammar
//!
//! A key is split on its first `__` into a field name and an optional
//! command:
//!
//! | Key            | Value            | Term                         |
//! |----------------|------------------|------------------------------|
//! | `field`        | literal          | equals the coerced literal   |
//! | `field__range` | `low,high`       | inclusive integer range      |
//! | `field__in`    | `a,b,c`          | any of the coerced literals  |
//! | `field__gt`    | literal          | strictly greater             |
//! | `field__lt`    | literal          | strictly less                |
//! | `field__like`  | substring        | SQL LIKE `%substring%`       |
//!
//! `offset`, `count` and `sort` are page keys. When a key repeats, the last
//! occurrence wins. The authorization constraint is merged last and
//! overrides any client term on the same field.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use crate::core::auth::AuthorizationConstraint;
use crate::core::error::ValidationError;
use crate::core::field::{FieldType, FieldValue};
use crate::core::query::{COUNT_KEY, OFFSET_KEY, PageSpec, SORT_KEY, SortSpec};
use crate::core::schema::ModelSchema;

const COMMAND_SEPARATOR: &str = "__";

/// A single predicate on one field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterTerm {
    /// Inclusive bounds; `low > high` matches nothing
    Range(i64, i64),
    In(Vec<FieldValue>),
    Gt(FieldValue),
    Lt(FieldValue),
    /// SQL LIKE pattern, `%` and `_` wildcards
    Like(String),
    #[serde(untagged)]
    Equals(FieldValue),
}

/// Field name to predicate, in first-seen key order. All terms must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FilterExpression {
    terms: IndexMap<String, FilterTerm>,
}

impl FilterExpression {
    pub fn with_term(mut self, field: impl Into<String>, term: FilterTerm) -> Self {
        self.insert(field, term);
        self
    }

    /// Insert a term, replacing any existing term on the same field
    pub fn insert(&mut self, field: impl Into<String>, term: FilterTerm) {
        self.terms.insert(field.into(), term);
    }

    /// Merge the authorization constraint; its equalities win
    pub fn apply_constraint(&mut self, constraint: &AuthorizationConstraint) {
        for (field, value) in constraint.iter() {
            self.terms
                .insert(field.clone(), FilterTerm::Equals(value.clone()));
        }
    }

    pub fn get(&self, field: &str) -> Option<&FilterTerm> {
        self.terms.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterTerm)> {
        self.terms.iter()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Output of [`FilterCompiler::compile`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledQuery {
    pub filter: FilterExpression,
    pub page: PageSpec,
}

/// Compiles query parameters for one endpoint
pub struct FilterCompiler<'a> {
    allowed: &'a IndexSet<String>,
    schema: &'a ModelSchema,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(allowed: &'a IndexSet<String>, schema: &'a ModelSchema) -> Self {
        Self { allowed, schema }
    }

    /// Compile raw `(key, value)` pairs, merging `constraint` last.
    ///
    /// Pure: the same input always yields the same output, and nothing is
    /// touched on failure.
    pub fn compile(
        &self,
        params: &[(String, String)],
        constraint: &AuthorizationConstraint,
    ) -> Result<CompiledQuery, ValidationError> {
        let mut filter = FilterExpression::default();
        let mut page = PageSpec::default();

        for (key, value) in params {
            match key.as_str() {
                OFFSET_KEY => page.offset = Some(PageSpec::parse_bound(key, value)?),
                COUNT_KEY => page.count = Some(PageSpec::parse_bound(key, value)?),
                SORT_KEY => page.sort = Some(self.compile_sort(value)?),
                _ => {
                    let (field, term) = self.compile_term(key, value)?;
                    filter.insert(field, term);
                }
            }
        }

        filter.apply_constraint(constraint);
        Ok(CompiledQuery { filter, page })
    }

    fn compile_sort(&self, raw: &str) -> Result<SortSpec, ValidationError> {
        let sort = SortSpec::parse(raw);
        if !self.schema.is_field(&sort.field) {
            return Err(ValidationError::InvalidSort { field: sort.field });
        }
        Ok(sort)
    }

    fn compile_term(&self, key: &str, raw: &str) -> Result<(String, FilterTerm), ValidationError> {
        let (field, command) = match key.split_once(COMMAND_SEPARATOR) {
            Some((field, command)) => (field, Some(command)),
            None => (key, None),
        };

        let field_type = self.field_type(field)?;

        let term = match command {
            None => FilterTerm::Equals(coerce_value(field, field_type, raw)?),
            Some("range") => compile_range(field, raw)?,
            Some("in") => compile_in(field, field_type, raw)?,
            Some("gt") => FilterTerm::Gt(coerce_value(field, field_type, raw)?),
            Some("lt") => FilterTerm::Lt(coerce_value(field, field_type, raw)?),
            Some("like") => FilterTerm::Like(format!("%{}%", raw)),
            Some(other) => {
                return Err(ValidationError::InvalidCommand {
                    command: other.to_string(),
                });
            }
        };

        Ok((field.to_string(), term))
    }

    /// A field is filterable only if it is allow-listed and stored
    fn field_type(&self, field: &str) -> Result<FieldType, ValidationError> {
        if !self.allowed.contains(field) {
            return Err(ValidationError::InvalidField {
                field: field.to_string(),
            });
        }
        self.schema
            .field_type(field)
            .ok_or_else(|| ValidationError::InvalidField {
                field: field.to_string(),
            })
    }
}

fn coerce_value(field: &str, field_type: FieldType, raw: &str) -> Result<FieldValue, ValidationError> {
    field_type
        .coerce_str(raw)
        .map_err(|e| ValidationError::InvalidValue {
            field: field.to_string(),
            issues: vec![e.into_issue(field)],
        })
}

fn compile_range(field: &str, raw: &str) -> Result<FilterTerm, ValidationError> {
    let invalid = || ValidationError::InvalidRange {
        field: field.to_string(),
        value: raw.to_string(),
    };

    let (low, high) = raw.split_once(',').ok_or_else(invalid)?;
    let low = low.trim().parse::<i64>().map_err(|_| invalid())?;
    let high = high.trim().parse::<i64>().map_err(|_| invalid())?;
    Ok(FilterTerm::Range(low, high))
}

fn compile_in(field: &str, field_type: FieldType, raw: &str) -> Result<FilterTerm, ValidationError> {
    let mut values = Vec::new();
    let mut issues = Vec::new();

    for token in raw.split(',') {
        match field_type.coerce_str(token) {
            Ok(value) => values.push(value),
            Err(e) => issues.push(e.into_issue(field)),
        }
    }

    if !issues.is_empty() {
        return Err(ValidationError::InvalidIn {
            field: field.to_string(),
            issues,
        });
    }
    Ok(FilterTerm::In(values))
}
