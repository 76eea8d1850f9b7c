//! Core types: fields, schemas, filters, authorization and the storage contract

pub mod auth;
pub mod error;
pub mod field;
pub mod filter;
pub mod query;
pub mod record;
pub mod schema;
pub mod store;

pub use auth::{
    AuthRequest, AuthorizationConstraint, AuthorizationHook, FnHook, HeaderIdentity, Identity,
    IdentityVerifier, NoAuthorization, Operation, OwnerScoped, Rejection,
};
pub use error::{ApiError, ApiResult, ConfigError, NotFoundError, StorageError, ValidationError};
pub use field::{FieldType, FieldValue};
pub use filter::{CompiledQuery, FilterCompiler, FilterExpression, FilterTerm};
pub use query::{PageSpec, SortSpec};
pub use record::Record;
pub use schema::{FieldKind, FieldSchema, Model, ModelSchema, SchemaBuilder};
pub use store::{RecordStore, StoreSession};
