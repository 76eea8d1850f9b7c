//! Request dispatcher: the transport-agnostic CRUD pipeline
//!
//! Each operation runs resolve → authorize → compile or validate → storage →
//! project. The first failing step returns its error and nothing after it
//! runs. The storage session lives in the [`RequestContext`] and is dropped
//! with it, whichever way the request ends.

use axum::http::HeaderMap;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::core::auth::{AuthRequest, AuthorizationConstraint, Operation};
use crate::core::error::{ApiError, ApiResult, NotFoundError, ValidationError};
use crate::core::filter::FilterCompiler;
use crate::core::record::{Record, SLUG_FIELD};
use crate::core::store::{RecordStore, StoreSession};
use crate::server::endpoint_registry::{Endpoint, EndpointRegistry};

/// Per-request state threaded through the pipeline
pub struct RequestContext<'a> {
    pub endpoint: &'a Endpoint,
    pub operation: Operation,
    pub constraint: AuthorizationConstraint,
    store: &'a dyn RecordStore,
    session: Option<Box<dyn StoreSession>>,
}

impl<'a> RequestContext<'a> {
    /// The request's storage session, opened on first use
    pub async fn session(&mut self) -> ApiResult<&mut (dyn StoreSession + 'static)> {
        let session = match self.session.take() {
            Some(session) => session,
            None => {
                tracing::debug!(endpoint = self.endpoint.slug(), "opening storage session");
                self.store.open_session().await?
            }
        };
        Ok(&mut **self.session.insert(session))
    }
}

/// Runs CRUD operations against registered endpoints
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<EndpointRegistry>,
    store: Arc<dyn RecordStore>,
}

impl Dispatcher {
    pub fn new(registry: Arc<EndpointRegistry>, store: Arc<dyn RecordStore>) -> Self {
        Self { registry, store }
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// Resolve the endpoint and run its hook exactly once
    pub async fn begin<'a>(
        &'a self,
        operation: Operation,
        slug: &str,
        headers: &HeaderMap,
    ) -> ApiResult<RequestContext<'a>> {
        let endpoint = self.registry.resolve(slug)?;

        let request = AuthRequest {
            operation,
            slug,
            headers,
        };
        let constraint = endpoint.hook().authorize(&request).await.map_err(|rejection| {
            tracing::warn!(
                endpoint = slug,
                operation = %operation,
                status = rejection.status.as_u16(),
                error = %rejection.error,
                "request rejected by authorization hook"
            );
            rejection
        })?;
        let constraint = constraint.coerced(endpoint.model());

        Ok(RequestContext {
            endpoint,
            operation,
            constraint,
            store: self.store.as_ref(),
            session: None,
        })
    }

    /// Filtered, paged and projected records
    pub async fn find(
        &self,
        slug: &str,
        params: &[(String, String)],
        headers: &HeaderMap,
    ) -> ApiResult<Vec<Map<String, Value>>> {
        let mut ctx = self.begin(Operation::Find, slug, headers).await?;
        let endpoint = ctx.endpoint;

        let query = FilterCompiler::new(endpoint.allowed_query_fields(), endpoint.model())
            .compile(params, &ctx.constraint)?;
        tracing::debug!(
            endpoint = slug,
            filter = ?query.filter,
            page = ?query.page,
            "compiled find query"
        );

        let records = ctx
            .session()
            .await?
            .find_many(endpoint.slug(), query.filter, &query.page)
            .await?;

        records.iter().map(|record| endpoint.project(record)).collect()
    }

    /// One projected record
    pub async fn get(&self, slug: &str, id: &str, headers: &HeaderMap) -> ApiResult<Map<String, Value>> {
        let mut ctx = self.begin(Operation::Get, slug, headers).await?;
        let endpoint = ctx.endpoint;

        let record = Self::fetch(&mut ctx, id).await?;
        endpoint.project(&record)
    }

    /// Validate and store a new record, returning its identifier
    pub async fn create(&self, slug: &str, body: &[u8], headers: &HeaderMap) -> ApiResult<String> {
        let mut ctx = self.begin(Operation::Create, slug, headers).await?;
        let endpoint = ctx.endpoint;

        let mut payload = parse_object(body)?;
        ctx.constraint.overlay(&mut payload);
        let fields = endpoint.model().validate(&payload)?;

        let record = Record::new(Record::generate_slug(), fields);
        let id = record.slug.clone();
        ctx.session().await?.add(endpoint.slug(), record).await?;

        tracing::debug!(endpoint = slug, id = %id, "created record");
        Ok(id)
    }

    /// Merge the payload into an existing record, returning its identifier
    pub async fn update(
        &self,
        slug: &str,
        id: &str,
        body: &[u8],
        headers: &HeaderMap,
    ) -> ApiResult<String> {
        let mut ctx = self.begin(Operation::Update, slug, headers).await?;
        let endpoint = ctx.endpoint;

        let payload = parse_object(body)?;
        let existing = Self::fetch(&mut ctx, id).await?;

        let mut merged = existing.fields_json();
        merged.extend(payload.into_iter().filter(|(key, _)| key != SLUG_FIELD));
        ctx.constraint.overlay(&mut merged);
        let fields = endpoint.model().validate(&merged)?;

        let record = Record::new(existing.slug, fields);
        ctx.session().await?.replace(endpoint.slug(), record).await?;

        tracing::debug!(endpoint = slug, id = id, "updated record");
        Ok(id.to_string())
    }

    /// Delete a record, returning the success message
    pub async fn delete(&self, slug: &str, id: &str, headers: &HeaderMap) -> ApiResult<String> {
        let mut ctx = self.begin(Operation::Delete, slug, headers).await?;
        let endpoint = ctx.endpoint;

        let record = Self::fetch(&mut ctx, id).await?;
        ctx.session().await?.delete(endpoint.slug(), &record).await?;

        tracing::debug!(endpoint = slug, id = id, "deleted record");
        Ok(format!("Entry with id {} successfully deleted", id))
    }

    /// Load a record by identifier under the request's constraint
    async fn fetch(ctx: &mut RequestContext<'_>, id: &str) -> ApiResult<Record> {
        let endpoint = ctx.endpoint;
        let filter = ctx.constraint.to_filter();
        ctx.session()
            .await?
            .find_one(endpoint.slug(), id, filter)
            .await?
            .ok_or_else(|| NotFoundError::Record { id: id.to_string() }.into())
    }
}

/// Require a JSON object request body
fn parse_object(body: &[u8]) -> ApiResult<Map<String, Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ValidationError::InvalidBody {
            message: "No JSON payload provided".to_string(),
        }
        .into());
    }

    match serde_json::from_slice::<Value>(body)? {
        Value::Object(object) => Ok(object),
        _ => Err(ApiError::Validation(ValidationError::InvalidBody {
            message: "JSON payload must be an object".to_string(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::{FnHook, Rejection};
    use crate::core::schema::{Model, ModelSchema, SchemaBuilder};
    use crate::server::endpoint_registry::EndpointConfig;
    use crate::storage::InMemoryStore;
    use axum::http::StatusCode;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Pet {
        name: String,
        legs: i64,
        owner: String,
    }

    impl Model for Pet {
        fn model_name() -> &'static str {
            "pet"
        }

        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema
                .field_of::<String>("name")
                .field_of::<i64>("legs")
                .field_of::<String>("owner");
        }
    }

    fn dispatcher(store: &InMemoryStore) -> Dispatcher {
        let schema = ModelSchema::of::<Pet>().expect("pet schema");
        let hook = FnHook::new(|operation: Operation, _slug: String, headers: HeaderMap| async move {
            let Some(owner) = headers.get("x-user-id").and_then(|v| v.to_str().ok()) else {
                return Err(Rejection::unauthorized("who are you"));
            };
            if operation == Operation::Delete && owner == "guest" {
                return Err(Rejection::forbidden("guests cannot delete"));
            }
            Ok::<_, Rejection>(AuthorizationConstraint::new().with("owner", owner))
        });

        let mut registry = EndpointRegistry::new();
        registry
            .register(EndpointConfig::new("pets", schema).hook(hook))
            .expect("register should succeed");
        Dispatcher::new(Arc::new(registry), Arc::new(store.clone()))
    }

    fn as_user(user: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", user.parse().expect("valid header"));
        headers
    }

    #[tokio::test]
    async fn test_create_stamps_owner_and_get_round_trips() {
        let store = InMemoryStore::new();
        let dispatcher = dispatcher(&store);

        let id = dispatcher
            .create("pets", br#"{"name":"Rex","legs":4,"owner":"mallory"}"#, &as_user("alice"))
            .await
            .expect("create should succeed");
        assert_eq!(id.len(), 32);

        let pet = dispatcher
            .get("pets", &id, &as_user("alice"))
            .await
            .expect("get should succeed");
        assert_eq!(
            Value::Object(pet),
            json!({ "slug": id, "name": "Rex", "legs": 4, "owner": "alice" })
        );
        assert_eq!(store.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_string_constraint_on_integer_field_is_coerced() {
        let store = InMemoryStore::new();
        let schema = ModelSchema::of::<Pet>().expect("pet schema");
        let hook = FnHook::new(|_operation: Operation, _slug: String, _headers: HeaderMap| async move {
            Ok::<_, Rejection>(AuthorizationConstraint::new().with("owner", "zoo").with("legs", "4"))
        });
        let mut registry = EndpointRegistry::new();
        registry
            .register(EndpointConfig::new("pets", schema).hook(hook))
            .expect("register should succeed");
        let dispatcher = Dispatcher::new(Arc::new(registry), Arc::new(store.clone()));

        let id = dispatcher
            .create("pets", br#"{"name":"Rex"}"#, &HeaderMap::new())
            .await
            .expect("create should succeed");

        let found = dispatcher
            .find("pets", &[], &HeaderMap::new())
            .await
            .expect("find should succeed");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["slug"], json!(id));
        assert_eq!(found[0]["legs"], json!(4));
    }

    #[tokio::test]
    async fn test_other_owner_sees_not_found() {
        let store = InMemoryStore::new();
        let dispatcher = dispatcher(&store);
        let id = dispatcher
            .create("pets", br#"{"name":"Rex","legs":4}"#, &as_user("alice"))
            .await
            .expect("create should succeed");

        let err = dispatcher
            .get("pets", &id, &as_user("bob"))
            .await
            .expect_err("bob should not see alice's pet");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), format!("No entry found with id {}", id));
    }

    #[tokio::test]
    async fn test_rejection_skips_storage() {
        let store = InMemoryStore::new();
        let dispatcher = dispatcher(&store);

        let err = dispatcher
            .find("pets", &[], &HeaderMap::new())
            .await
            .expect_err("anonymous should be rejected");
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(store.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_update_merges_and_keeps_identity() {
        let store = InMemoryStore::new();
        let dispatcher = dispatcher(&store);
        let id = dispatcher
            .create("pets", br#"{"name":"Rex","legs":4}"#, &as_user("alice"))
            .await
            .expect("create should succeed");

        dispatcher
            .update(
                "pets",
                &id,
                br#"{"legs":3,"slug":"hijacked","owner":"bob"}"#,
                &as_user("alice"),
            )
            .await
            .expect("update should succeed");

        let pet = dispatcher
            .get("pets", &id, &as_user("alice"))
            .await
            .expect("get should succeed");
        assert_eq!(pet["name"], "Rex");
        assert_eq!(pet["legs"], 3);
        assert_eq!(pet["owner"], "alice");
        assert_eq!(pet["slug"], json!(id));
    }

    #[tokio::test]
    async fn test_update_invalid_payload_leaves_record() {
        let store = InMemoryStore::new();
        let dispatcher = dispatcher(&store);
        let id = dispatcher
            .create("pets", br#"{"name":"Rex","legs":4}"#, &as_user("alice"))
            .await
            .expect("create should succeed");

        let err = dispatcher
            .update("pets", &id, br#"{"legs":"many"}"#, &as_user("alice"))
            .await
            .expect_err("invalid update should fail");
        assert_eq!(err.to_string(), "Invalid data");

        let pet = dispatcher
            .get("pets", &id, &as_user("alice"))
            .await
            .expect("get should succeed");
        assert_eq!(pet["legs"], 4);
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let store = InMemoryStore::new();
        let dispatcher = dispatcher(&store);
        let id = dispatcher
            .create("pets", br#"{"name":"Rex","legs":4}"#, &as_user("alice"))
            .await
            .expect("create should succeed");

        let message = dispatcher
            .delete("pets", &id, &as_user("alice"))
            .await
            .expect("first delete should succeed");
        assert_eq!(message, format!("Entry with id {} successfully deleted", id));

        let err = dispatcher
            .delete("pets", &id, &as_user("alice"))
            .await
            .expect_err("second delete should fail");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(store.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_find_is_scoped_to_owner() {
        let store = InMemoryStore::new();
        let dispatcher = dispatcher(&store);
        for (user, body) in [
            ("alice", br#"{"name":"Rex","legs":4}"#.as_slice()),
            ("alice", br#"{"name":"Tweety","legs":2}"#.as_slice()),
            ("bob", br#"{"name":"Nemo","legs":0}"#.as_slice()),
        ] {
            dispatcher
                .create("pets", body, &as_user(user))
                .await
                .expect("create should succeed");
        }

        let params = vec![("legs__gt".to_string(), "1".to_string())];
        let found = dispatcher
            .find("pets", &params, &as_user("alice"))
            .await
            .expect("find should succeed");
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|pet| pet["owner"] == "alice"));
    }

    #[tokio::test]
    async fn test_body_errors() {
        let store = InMemoryStore::new();
        let dispatcher = dispatcher(&store);

        for body in [b"".as_slice(), b"  ".as_slice(), b"[1,2]".as_slice(), b"{oops".as_slice()] {
            let err = dispatcher
                .create("pets", body, &as_user("alice"))
                .await
                .expect_err("bad body should fail");
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
            assert_eq!(err.to_string(), "Bad Request");
        }
        assert_eq!(store.len("pets").expect("len"), 0);
    }

    #[tokio::test]
    async fn test_guest_cannot_delete() {
        let store = InMemoryStore::new();
        let dispatcher = dispatcher(&store);
        let err = dispatcher
            .delete("pets", "whatever", &as_user("guest"))
            .await
            .expect_err("guest delete should be rejected");
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_body().error, "guests cannot delete");
    }

    #[tokio::test]
    async fn test_unknown_endpoint() {
        let store = InMemoryStore::new();
        let dispatcher = dispatcher(&store);
        let err = dispatcher
            .get("boats", "x", &as_user("alice"))
            .await
            .expect_err("unknown endpoint");
        assert_eq!(err.to_string(), "There is no endpoint named: boats");
    }
}
