//! ServerBuilder for fluent API to build HTTP servers

use super::dispatcher::Dispatcher;
use super::endpoint_registry::{EndpointConfig, EndpointRegistry};
use super::exposure::RestExposure;
use crate::config::{ApiConfig, EndpointSpec};
use crate::core::auth::AuthorizationHook;
use crate::core::error::ConfigError;
use crate::core::schema::{Model, ModelSchema};
use crate::core::store::RecordStore;
use anyhow::Result;
use axum::Router;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Builder for creating HTTP servers exposing models as CRUD endpoints
///
/// # Example
///
/// ```ignore
/// let app = ServerBuilder::new()
///     .with_store(InMemoryStore::new())
///     .register_model::<Car>()?
///     .register_endpoint(EndpointConfig::new("cars", ModelSchema::of::<Car>()?))
///     .with_default_hook(OwnerScoped::new(HeaderIdentity::default(), "owner"))
///     .build()?;
/// ```
pub struct ServerBuilder {
    store: Option<Arc<dyn RecordStore>>,
    models: IndexMap<String, ModelSchema>,
    endpoints: Vec<EndpointConfig>,
    config: ApiConfig,
    hooks: HashMap<String, Arc<dyn AuthorizationHook>>,
    default_hook: Option<Arc<dyn AuthorizationHook>>,
    custom_routes: Vec<Router>,
}

impl ServerBuilder {
    /// Create a new ServerBuilder
    pub fn new() -> Self {
        Self {
            store: None,
            models: IndexMap::new(),
            endpoints: Vec::new(),
            config: ApiConfig::default(),
            hooks: HashMap::new(),
            default_hook: None,
            custom_routes: Vec::new(),
        }
    }

    /// Set the record store (required)
    pub fn with_store(mut self, store: impl RecordStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Introspect a model and make it available to configuration by name
    pub fn register_model<M: Model>(mut self) -> Result<Self, ConfigError> {
        let schema = ModelSchema::of::<M>()?;
        if self.models.contains_key(schema.name()) {
            return Err(ConfigError::InvalidValue {
                field: "model".to_string(),
                value: schema.name().to_string(),
                message: "model is already registered".to_string(),
            });
        }
        tracing::debug!(model = schema.name(), "registered model");
        self.models.insert(schema.name().to_string(), schema);
        Ok(self)
    }

    /// Declare an endpoint in code
    pub fn register_endpoint(mut self, endpoint: EndpointConfig) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Use a loaded configuration: server settings and YAML endpoints
    pub fn with_config(mut self, config: ApiConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach a hook to one endpoint. Takes precedence over the default hook
    /// but not over a hook set on the [`EndpointConfig`] itself.
    pub fn with_hook(mut self, slug: impl Into<String>, hook: impl AuthorizationHook + 'static) -> Self {
        self.hooks.insert(slug.into(), Arc::new(hook));
        self
    }

    /// Hook used by every endpoint without one of its own
    pub fn with_default_hook(mut self, hook: impl AuthorizationHook + 'static) -> Self {
        self.default_hook = Some(Arc::new(hook));
        self
    }

    /// Add custom routes to the server
    ///
    /// They are merged next to the generated endpoints, under the same base
    /// path.
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Server settings currently in effect
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Validate every endpoint declaration and build the registry
    pub fn build_registry(&self) -> Result<EndpointRegistry, ConfigError> {
        let mut registry = EndpointRegistry::new();

        let declared = self
            .config
            .endpoints
            .iter()
            .map(|spec| self.endpoint_from_spec(spec))
            .collect::<Result<Vec<_>, _>>()?;

        for mut endpoint in self.endpoints.iter().cloned().chain(declared) {
            if endpoint.hook.is_none() {
                endpoint.hook = endpoint
                    .slug
                    .as_ref()
                    .and_then(|slug| self.hooks.get(slug))
                    .or(self.default_hook.as_ref())
                    .cloned();
            }
            registry.register(endpoint)?;
        }

        if let Some(unused) = self
            .hooks
            .keys()
            .find(|slug| registry.resolve(slug).is_err())
        {
            return Err(ConfigError::InvalidValue {
                field: "hook".to_string(),
                value: unused.clone(),
                message: "hook attached to an endpoint that does not exist".to_string(),
            });
        }

        Ok(registry)
    }

    /// Build the transport-agnostic dispatcher
    pub fn build_dispatcher(&self) -> Result<Dispatcher, ConfigError> {
        let store = self.store.clone().ok_or_else(|| ConfigError::MissingField {
            field: "store".to_string(),
            context: "server builder (call .with_store())".to_string(),
        })?;
        let registry = self.build_registry()?;

        tracing::info!(endpoints = ?registry.slugs(), "endpoint registry ready");
        Ok(Dispatcher::new(Arc::new(registry), store))
    }

    /// Build the final REST router
    pub fn build(mut self) -> Result<Router, ConfigError> {
        let custom_routes = std::mem::take(&mut self.custom_routes);
        let dispatcher = Arc::new(self.build_dispatcher()?);
        let base_path = self.config.server.normalized_base_path();
        Ok(RestExposure::build_router(dispatcher, &base_path, custom_routes))
    }

    /// Serve the application with graceful shutdown
    ///
    /// This will:
    /// - Bind to the provided address
    /// - Start serving requests
    /// - Handle SIGTERM and SIGINT (Ctrl+C) for graceful shutdown
    pub async fn serve(self, addr: &str) -> Result<()> {
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    fn endpoint_from_spec(&self, spec: &EndpointSpec) -> Result<EndpointConfig, ConfigError> {
        let context = match &spec.slug {
            Some(slug) => format!("endpoint '{}'", slug),
            None => "endpoint configuration".to_string(),
        };
        let slug = spec.slug.clone().ok_or_else(|| ConfigError::MissingField {
            field: "slug".to_string(),
            context: context.clone(),
        })?;
        let model_name = spec.model.as_deref().ok_or_else(|| ConfigError::MissingField {
            field: "model".to_string(),
            context,
        })?;
        let model = self
            .models
            .get(model_name)
            .cloned()
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "model".to_string(),
                value: model_name.to_string(),
                message: format!(
                    "unknown model (registered: {})",
                    self.models.keys().cloned().collect::<Vec<_>>().join(", ")
                ),
            })?;

        Ok(EndpointConfig {
            slug: Some(slug),
            model: Some(model),
            allowed_query_fields: spec.query.clone(),
            visible_fields: spec.visible.clone(),
            hook: None,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
