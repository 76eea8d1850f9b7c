//! REST API exposure
//!
//! Maps HTTP onto the [`Dispatcher`]. Handlers only extract request parts
//! and shape responses; every decision happens in the dispatcher.
//!
//! | Method | Path              | Operation                     |
//! |--------|-------------------|-------------------------------|
//! | GET    | `/{slug}/find`    | find, `{results: [...]}`      |
//! | POST   | `/{slug}/create`  | create, 303 to the new record |
//! | GET    | `/{slug}/{id}`    | get                           |
//! | PUT    | `/{slug}/{id}`    | update, 303 to the record     |
//! | DELETE | `/{slug}/{id}`    | delete, `{success}`           |

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::core::error::ApiResult;
use crate::server::dispatcher::Dispatcher;
use crate::server::endpoint_registry::EndpointDescription;

/// Name reported by the health routes
pub const SERVICE_NAME: &str = "crudgate";

/// Shared handler state
#[derive(Clone)]
pub struct RestState {
    pub dispatcher: Arc<Dispatcher>,
    pub base_path: Arc<str>,
}

impl RestState {
    fn record_location(&self, slug: &str, id: &str) -> String {
        format!("{}/{}/{}", self.base_path, slug, id)
    }
}

/// REST API exposure implementation
pub struct RestExposure;

impl RestExposure {
    /// Build the REST router from a dispatcher
    ///
    /// # Arguments
    ///
    /// * `dispatcher` - The CRUD pipeline shared by every handler
    /// * `base_path` - Normalized prefix (`""` or `"/api"`)
    /// * `custom_routes` - Additional custom routes to merge
    pub fn build_router(dispatcher: Arc<Dispatcher>, base_path: &str, custom_routes: Vec<Router>) -> Router {
        let state = RestState {
            dispatcher,
            base_path: Arc::from(base_path),
        };

        let crud_routes = Router::new()
            .route("/_endpoints", get(list_endpoints))
            .route("/{slug}/find", get(find))
            .route("/{slug}/create", post(create))
            .route("/{slug}/{id}", get(get_one).put(update).delete(delete))
            .with_state(state);

        let mut app = Self::health_routes().merge(crud_routes);
        for custom_router in custom_routes {
            app = app.merge(custom_router);
        }

        if !base_path.is_empty() {
            app = Router::new().nest(base_path, app);
        }

        app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    /// Build health check routes
    fn health_routes() -> Router {
        Router::new()
            .route("/health", get(Self::health_check))
            .route("/healthz", get(Self::health_check))
    }

    /// Health check endpoint handler
    async fn health_check() -> Json<Value> {
        Json(json!({
            "status": "ok",
            "service": SERVICE_NAME
        }))
    }
}

async fn list_endpoints(State(state): State<RestState>) -> Json<Vec<EndpointDescription>> {
    Json(
        state
            .dispatcher
            .registry()
            .iter()
            .map(|endpoint| endpoint.describe())
            .collect(),
    )
}

async fn find(
    State(state): State<RestState>,
    Path(slug): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let results = state.dispatcher.find(&slug, &params, &headers).await?;
    Ok(Json(json!({ "results": results })))
}

async fn create(
    State(state): State<RestState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Redirect> {
    let id = state.dispatcher.create(&slug, &body, &headers).await?;
    Ok(Redirect::to(&state.record_location(&slug, &id)))
}

async fn get_one(
    State(state): State<RestState>,
    Path((slug, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let record = state.dispatcher.get(&slug, &id, &headers).await?;
    Ok(Json(Value::Object(record)))
}

async fn update(
    State(state): State<RestState>,
    Path((slug, id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Redirect> {
    let id = state.dispatcher.update(&slug, &id, &body, &headers).await?;
    Ok(Redirect::to(&state.record_location(&slug, &id)))
}

async fn delete(
    State(state): State<RestState>,
    Path((slug, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let message = state.dispatcher.delete(&slug, &id, &headers).await?;
    Ok(Json(json!({ "success": message })))
}
