//! Storage contract consumed by the dispatcher
//!
//! A [`RecordStore`] hands out one [`StoreSession`] per request. The session
//! is opened after authorization succeeds and is released when dropped, on
//! every exit path. Records live in named collections (one per endpoint).

use async_trait::async_trait;

use crate::core::error::StorageError;
use crate::core::filter::FilterExpression;
use crate::core::query::PageSpec;
use crate::core::record::Record;

/// A backend able to open request-scoped sessions
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn StoreSession>, StorageError>;
}

/// Request-scoped access to stored records
#[async_trait]
pub trait StoreSession: Send {
    /// Records matching every term of `filter`, sorted then windowed by `page`
    async fn find_many(
        &mut self,
        collection: &str,
        filter: FilterExpression,
        page: &PageSpec,
    ) -> Result<Vec<Record>, StorageError>;

    /// The record with this identifier, if it also matches `filter`
    async fn find_one(
        &mut self,
        collection: &str,
        slug: &str,
        filter: FilterExpression,
    ) -> Result<Option<Record>, StorageError>;

    async fn add(&mut self, collection: &str, record: Record) -> Result<(), StorageError>;

    /// Overwrite an existing record with the same identifier
    async fn replace(&mut self, collection: &str, record: Record) -> Result<(), StorageError>;

    async fn delete(&mut self, collection: &str, record: &Record) -> Result<(), StorageError>;
}
