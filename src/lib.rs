//! # crudgate
//!
//! Declarative REST CRUD endpoints over arbitrary data models.
//!
//! ## Features
//!
//! - **Typed query filters**: `field=v`, `field__range=a,b`, `field__in=a,b`,
//!   `field__gt`, `field__lt`, `field__like`, coerced against the model schema
//! - **Field projection**: per-endpoint visible fields, including computed
//!   accessors declared on the model
//! - **Row-level authorization**: a hook per endpoint returns constraints that
//!   are merged into every filter and forced onto every write
//! - **Configuration-Based**: declare endpoints in code or in YAML
//! - **Pluggable storage**: any backend implementing [`RecordStore`](core::RecordStore)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use crudgate::prelude::*;
//!
//! impl_model!(Car, "car", {
//!     brand: String,
//!     year: i64,
//!     owner: String,
//! }, computed [description]);
//!
//! impl Car {
//!     pub fn description(&self) -> String {
//!         format!("{} ({})", self.brand, self.year)
//!     }
//! }
//!
//! ServerBuilder::new()
//!     .with_store(InMemoryStore::new())
//!     .register_model::<Car>()?
//!     .with_config(ApiConfig::from_yaml_file("api.yaml")?)
//!     .with_default_hook(OwnerScoped::new(HeaderIdentity::default(), "owner"))
//!     .serve("127.0.0.1:5000")
//!     .await?;
//! ```

pub mod config;
pub mod core;
pub mod models;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        auth::{
            AuthRequest, AuthorizationConstraint, AuthorizationHook, FnHook, HeaderIdentity,
            Identity, IdentityVerifier, NoAuthorization, Operation, OwnerScoped, Rejection,
        },
        error::{ApiError, ApiResult, ConfigError, NotFoundError, StorageError, ValidationError},
        field::{FieldType, FieldValue},
        filter::{FilterExpression, FilterTerm},
        query::{PageSpec, SortSpec},
        record::Record,
        schema::{FieldKind, Model, ModelSchema, SchemaBuilder},
        store::{RecordStore, StoreSession},
    };

    // === Macros ===
    pub use crate::impl_model;

    // === Storage ===
    pub use crate::storage::InMemoryStore;

    // === Config ===
    pub use crate::config::{ApiConfig, EndpointSpec, ServerSettings};

    // === Server ===
    pub use crate::server::{Dispatcher, EndpointConfig, EndpointRegistry, ServerBuilder};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use uuid::Uuid;
}
