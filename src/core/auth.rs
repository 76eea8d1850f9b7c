//! Authorization hooks for crudgate
//!
//! Every request passes through exactly one [`AuthorizationHook`] before any
//! storage access. A hook either rejects the request with a [`Rejection`]
//! (propagated to the client unchanged) or returns an
//! [`AuthorizationConstraint`]: field equalities that are merged into the
//! request's filter on reads and overlaid onto the payload on writes.
//!
//! Provided hooks:
//! - [`NoAuthorization`]: allow everything, no constraint
//! - [`FnHook`]: wrap an async closure
//! - [`OwnerScoped`]: restrict every operation to records owned by the caller

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use thiserror::Error;

use crate::core::field::FieldValue;
use crate::core::filter::{FilterExpression, FilterTerm};
use crate::core::schema::ModelSchema;

/// The CRUD operation being authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Find,
    Get,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Find => "find",
            Operation::Get => "get",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    /// Whether the operation writes a payload
    pub fn is_write(&self) -> bool {
        matches!(self, Operation::Create | Operation::Update)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field equalities imposed by a hook. Empty means unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AuthorizationConstraint {
    values: IndexMap<String, FieldValue>,
}

impl AuthorizationConstraint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a required field value
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.values.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Coerce every value to the declared type of its field, so a hook that
    /// hands back `"5"` for an integer field still matches stored records.
    /// Values that cannot be coerced are kept as given and logged.
    pub fn coerced(self, schema: &ModelSchema) -> Self {
        let values = self
            .values
            .into_iter()
            .map(|(field, value)| {
                let Some(field_type) = schema.field_type(&field) else {
                    tracing::warn!(
                        model = schema.name(),
                        field = %field,
                        "authorization constraint names a field the model doesn't have"
                    );
                    return (field, value);
                };
                if value.is_null() {
                    return (field, value);
                }
                let result = match &value {
                    FieldValue::String(raw) => field_type.coerce_str(raw),
                    other => field_type.coerce_json(&other.to_json()),
                };
                match result {
                    Ok(typed) => (field, typed),
                    Err(e) => {
                        tracing::warn!(
                            model = schema.name(),
                            field = %field,
                            error = %e.message,
                            "authorization constraint value doesn't match the field type"
                        );
                        (field, value)
                    }
                }
            })
            .collect();
        Self { values }
    }

    /// The constraint as a filter of equality terms
    pub fn to_filter(&self) -> FilterExpression {
        self.values
            .iter()
            .fold(FilterExpression::default(), |filter, (field, value)| {
                filter.with_term(field.clone(), FilterTerm::Equals(value.clone()))
            })
    }

    /// Write the constrained values into a JSON payload, replacing whatever
    /// the client supplied for those fields
    pub fn overlay(&self, payload: &mut Map<String, Value>) {
        for (field, value) in &self.values {
            payload.insert(field.clone(), value.to_json());
        }
    }
}

/// A hook's refusal to let a request proceed
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct Rejection {
    pub status: StatusCode,
    pub error: String,
    pub detail: Option<Value>,
}

impl Rejection {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            detail: None,
        }
    }

    pub fn unauthorized(error: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error)
    }

    pub fn forbidden(error: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, error)
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// What a hook gets to see about the request
#[derive(Debug, Clone, Copy)]
pub struct AuthRequest<'a> {
    pub operation: Operation,
    pub slug: &'a str,
    pub headers: &'a HeaderMap,
}

/// Decides whether a request may proceed, and under which constraint
#[async_trait]
pub trait AuthorizationHook: Send + Sync {
    async fn authorize(
        &self,
        request: &AuthRequest<'_>,
    ) -> Result<AuthorizationConstraint, Rejection>;
}

/// Default hook: every request is allowed, unconstrained
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuthorization;

#[async_trait]
impl AuthorizationHook for NoAuthorization {
    async fn authorize(
        &self,
        _request: &AuthRequest<'_>,
    ) -> Result<AuthorizationConstraint, Rejection> {
        Ok(AuthorizationConstraint::new())
    }
}

/// Adapts a closure into a hook.
///
/// The closure receives owned copies of the request parts so that the
/// returned future is `'static`.
///
/// ```rust,ignore
/// let hook = FnHook::new(|operation, _slug, headers| async move {
///     if operation == Operation::Delete && !headers.contains_key("x-admin") {
///         return Err(Rejection::forbidden("Only admins may delete"));
///     }
///     Ok(AuthorizationConstraint::new())
/// });
/// ```
pub struct FnHook<F> {
    hook: F,
}

impl<F> FnHook<F> {
    pub fn new(hook: F) -> Self {
        Self { hook }
    }
}

#[async_trait]
impl<F, Fut> AuthorizationHook for FnHook<F>
where
    F: Fn(Operation, String, HeaderMap) -> Fut + Send + Sync,
    Fut: Future<Output = Result<AuthorizationConstraint, Rejection>> + Send,
{
    async fn authorize(
        &self,
        request: &AuthRequest<'_>,
    ) -> Result<AuthorizationConstraint, Rejection> {
        (self.hook)(
            request.operation,
            request.slug.to_string(),
            request.headers.clone(),
        )
        .await
    }
}

/// The caller as established by an [`IdentityVerifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
}

/// Establishes who is calling from the request headers
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify_identity(&self, headers: &HeaderMap) -> Result<Identity, Rejection>;
}

/// Trusts a header carrying the caller's identity, e.g. one set by an
/// upstream gateway
#[derive(Debug, Clone)]
pub struct HeaderIdentity {
    header: String,
}

impl HeaderIdentity {
    pub const DEFAULT_HEADER: &'static str = "x-user-id";

    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into().to_ascii_lowercase(),
        }
    }
}

impl Default for HeaderIdentity {
    fn default() -> Self {
        Self::new(Self::DEFAULT_HEADER)
    }
}

#[async_trait]
impl IdentityVerifier for HeaderIdentity {
    async fn verify_identity(&self, headers: &HeaderMap) -> Result<Identity, Rejection> {
        let subject = headers
            .get(self.header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                Rejection::unauthorized(format!("Missing or invalid '{}' header", self.header))
            })?;

        Ok(Identity {
            subject: subject.to_string(),
        })
    }
}

/// Restricts every operation to records whose owner field equals the
/// verified caller.
///
/// Reads only see the caller's records, creates are stamped with the caller
/// and updates cannot hand a record to someone else.
pub struct OwnerScoped<V> {
    verifier: V,
    field: String,
}

impl<V: IdentityVerifier> OwnerScoped<V> {
    pub fn new(verifier: V, field: impl Into<String>) -> Self {
        Self {
            verifier,
            field: field.into(),
        }
    }
}

#[async_trait]
impl<V: IdentityVerifier> AuthorizationHook for OwnerScoped<V> {
    async fn authorize(
        &self,
        request: &AuthRequest<'_>,
    ) -> Result<AuthorizationConstraint, Rejection> {
        let identity = self.verifier.verify_identity(request.headers).await?;
        tracing::debug!(
            endpoint = request.slug,
            operation = %request.operation,
            subject = %identity.subject,
            "owner-scoped request"
        );
        Ok(AuthorizationConstraint::new().with(self.field.clone(), identity.subject))
    }
}
