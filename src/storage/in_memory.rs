//! In-memory implementation of RecordStore for testing and development

use async_trait::async_trait;
use indexmap::IndexMap;
use regex::Regex;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};

use crate::core::error::StorageError;
use crate::core::field::FieldValue;
use crate::core::filter::{FilterExpression, FilterTerm};
use crate::core::query::PageSpec;
use crate::core::record::Record;
use crate::core::store::{RecordStore, StoreSession};

const BACKEND: &str = "in-memory";

type Collections = HashMap<String, IndexMap<String, Record>>;

/// In-memory record store
///
/// Useful for testing and development. Uses RwLock for thread-safe access
/// and counts open sessions so tests can assert that every request released
/// its session.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    collections: Arc<RwLock<Collections>>,
    open_sessions: Arc<AtomicUsize>,
}

impl InMemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently open
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(AtomicOrdering::SeqCst)
    }

    /// Number of records in a collection
    pub fn len(&self, collection: &str) -> Result<usize, StorageError> {
        let collections = self.collections.read().map_err(lock_error)?;
        Ok(collections.get(collection).map_or(0, IndexMap::len))
    }

    /// Insert a record directly, bypassing validation. Meant for seeding.
    pub fn seed(&self, collection: &str, record: Record) -> Result<(), StorageError> {
        let mut collections = self.collections.write().map_err(lock_error)?;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(record.slug.clone(), record);
        Ok(())
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn open_session(&self) -> Result<Box<dyn StoreSession>, StorageError> {
        self.open_sessions.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(Box::new(InMemorySession {
            collections: Arc::clone(&self.collections),
            open_sessions: Arc::clone(&self.open_sessions),
        }))
    }
}

/// Session over an [`InMemoryStore`]; writes are visible immediately
pub struct InMemorySession {
    collections: Arc<RwLock<Collections>>,
    open_sessions: Arc<AtomicUsize>,
}

impl Drop for InMemorySession {
    fn drop(&mut self) {
        self.open_sessions.fetch_sub(1, AtomicOrdering::SeqCst);
    }
}

#[async_trait]
impl StoreSession for InMemorySession {
    async fn find_many(
        &mut self,
        collection: &str,
        filter: FilterExpression,
        page: &PageSpec,
    ) -> Result<Vec<Record>, StorageError> {
        let matcher = Matcher::compile(filter)?;
        let collections = self.collections.read().map_err(lock_error)?;

        let mut matched: Vec<Record> = collections
            .get(collection)
            .into_iter()
            .flat_map(IndexMap::values)
            .filter(|record| matcher.matches(record))
            .cloned()
            .collect();

        if let Some(sort) = &page.sort {
            matched.sort_by(|a, b| {
                match (sort_key(a, &sort.field), sort_key(b, &sort.field)) {
                    (Some(x), Some(y)) => {
                        let ordering = x.compare(&y).unwrap_or(Ordering::Equal);
                        if sort.descending { ordering.reverse() } else { ordering }
                    }
                    // Missing values go last in both directions
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }
            });
        }

        Ok(page.window(matched))
    }

    async fn find_one(
        &mut self,
        collection: &str,
        slug: &str,
        filter: FilterExpression,
    ) -> Result<Option<Record>, StorageError> {
        let matcher = Matcher::compile(filter)?;
        let collections = self.collections.read().map_err(lock_error)?;

        Ok(collections
            .get(collection)
            .and_then(|records| records.get(slug))
            .filter(|record| matcher.matches(record))
            .cloned())
    }

    async fn add(&mut self, collection: &str, record: Record) -> Result<(), StorageError> {
        let mut collections = self.collections.write().map_err(lock_error)?;
        let records = collections.entry(collection.to_string()).or_default();

        if records.contains_key(&record.slug) {
            return Err(StorageError::IntegrityError {
                message: format!("record '{}' already exists in '{}'", record.slug, collection),
            });
        }
        records.insert(record.slug.clone(), record);
        Ok(())
    }

    async fn replace(&mut self, collection: &str, record: Record) -> Result<(), StorageError> {
        let mut collections = self.collections.write().map_err(lock_error)?;
        let existing = collections
            .get_mut(collection)
            .and_then(|records| records.get_mut(&record.slug))
            .ok_or_else(|| StorageError::IntegrityError {
                message: format!("record '{}' does not exist in '{}'", record.slug, collection),
            })?;

        *existing = record;
        Ok(())
    }

    async fn delete(&mut self, collection: &str, record: &Record) -> Result<(), StorageError> {
        let mut collections = self.collections.write().map_err(lock_error)?;
        if let Some(records) = collections.get_mut(collection) {
            records.shift_remove(&record.slug);
        }
        Ok(())
    }
}

fn lock_error<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::QueryError {
        backend: BACKEND.to_string(),
        message: format!("Failed to acquire lock: {}", e),
    }
}

/// Sortable value of a field; missing and null have none
fn sort_key<'r>(record: &'r Record, field: &str) -> Option<Cow<'r, FieldValue>> {
    record.get(field).filter(|v| !v.is_null())
}

/// A filter expression prepared for repeated evaluation
struct Matcher {
    terms: Vec<(String, Predicate)>,
}

enum Predicate {
    Equals(FieldValue),
    Range(i64, i64),
    In(Vec<FieldValue>),
    Gt(FieldValue),
    Lt(FieldValue),
    Like(Regex),
}

impl Matcher {
    fn compile(filter: FilterExpression) -> Result<Self, StorageError> {
        let terms = filter
            .iter()
            .map(|(field, term)| {
                let predicate = match term {
                    FilterTerm::Equals(v) => Predicate::Equals(v.clone()),
                    FilterTerm::Range(low, high) => Predicate::Range(*low, *high),
                    FilterTerm::In(values) => Predicate::In(values.clone()),
                    FilterTerm::Gt(v) => Predicate::Gt(v.clone()),
                    FilterTerm::Lt(v) => Predicate::Lt(v.clone()),
                    FilterTerm::Like(pattern) => Predicate::Like(like_to_regex(pattern)?),
                };
                Ok((field.clone(), predicate))
            })
            .collect::<Result<Vec<_>, StorageError>>()?;

        Ok(Self { terms })
    }

    fn matches(&self, record: &Record) -> bool {
        self.terms.iter().all(|(field, predicate)| {
            let Some(value) = record.get(field) else {
                return false;
            };
            let value = value.as_ref();
            match predicate {
                Predicate::Equals(expected) => value.compare(expected) == Some(Ordering::Equal),
                Predicate::Range(low, high) => match value {
                    FieldValue::Integer(v) => (*low..=*high).contains(v),
                    other => other
                        .as_float()
                        .is_some_and(|v| v >= *low as f64 && v <= *high as f64),
                },
                Predicate::In(values) => values
                    .iter()
                    .any(|expected| value.compare(expected) == Some(Ordering::Equal)),
                Predicate::Gt(bound) => value.compare(bound) == Some(Ordering::Greater),
                Predicate::Lt(bound) => value.compare(bound) == Some(Ordering::Less),
                Predicate::Like(regex) => value.as_string().is_some_and(|s| regex.is_match(s)),
            }
        })
    }
}

/// Translate a SQL LIKE pattern into an anchored regex
fn like_to_regex(pattern: &str) -> Result<Regex, StorageError> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push_str("(?s)^");
    for c in pattern.chars() {
        match c {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    source.push('$');

    Regex::new(&source).map_err(|e| StorageError::QueryError {
        backend: BACKEND.to_string(),
        message: format!("invalid like pattern '{}': {}", pattern, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::SortSpec;

    fn car(slug: &str, brand: &str, year: i64, owner: &str) -> Record {
        let mut fields = IndexMap::new();
        fields.insert("brand".to_string(), FieldValue::from(brand));
        fields.insert("year".to_string(), FieldValue::from(year));
        fields.insert("owner".to_string(), FieldValue::from(owner));
        Record::new(slug, fields)
    }

    fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.seed("cars", car("a", "Volvo", 2016, "Marc")).unwrap();
        store.seed("cars", car("b", "Volvo", 2021, "Marc")).unwrap();
        store.seed("cars", car("c", "Saab", 2018, "Eve")).unwrap();
        store.seed("cars", car("d", "Volkswagen", 2014, "Marc")).unwrap();
        store
    }

    fn slugs(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.slug.as_str()).collect()
    }

    #[tokio::test]
    async fn test_session_counter() {
        let store = InMemoryStore::new();
        assert_eq!(store.open_sessions(), 0);

        let session = store.open_session().await.unwrap();
        assert_eq!(store.open_sessions(), 1);

        drop(session);
        assert_eq!(store.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_find_many_equality_and_range() {
        let store = seeded();
        let mut session = store.open_session().await.unwrap();

        let filter = FilterExpression::default()
            .with_term("brand", FilterTerm::Equals(FieldValue::from("Volvo")))
            .with_term("year", FilterTerm::Range(2015, 2020));
        let found = session
            .find_many("cars", filter, &PageSpec::default())
            .await
            .unwrap();

        assert_eq!(slugs(&found), vec!["a"]);
    }

    #[tokio::test]
    async fn test_find_many_inclusive_and_reversed_range() {
        let store = seeded();
        let mut session = store.open_session().await.unwrap();

        let inclusive = FilterExpression::default().with_term("year", FilterTerm::Range(2016, 2018));
        let found = session
            .find_many("cars", inclusive, &PageSpec::default())
            .await
            .unwrap();
        assert_eq!(slugs(&found), vec!["a", "c"]);

        let reversed = FilterExpression::default().with_term("year", FilterTerm::Range(2020, 2015));
        let found = session
            .find_many("cars", reversed, &PageSpec::default())
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_range_compares_large_integers_exactly() {
        let store = InMemoryStore::new();
        store
            .seed("cars", car("big", "Volvo", 9_007_199_254_740_992, "Marc"))
            .unwrap();
        let mut session = store.open_session().await.unwrap();

        let above = FilterExpression::default().with_term(
            "year",
            FilterTerm::Range(9_007_199_254_740_993, 9_007_199_254_740_993),
        );
        let found = session
            .find_many("cars", above, &PageSpec::default())
            .await
            .unwrap();
        assert!(found.is_empty());

        let exact = FilterExpression::default().with_term(
            "year",
            FilterTerm::Range(9_007_199_254_740_992, 9_007_199_254_740_992),
        );
        let found = session
            .find_many("cars", exact, &PageSpec::default())
            .await
            .unwrap();
        assert_eq!(slugs(&found), vec!["big"]);
    }

    #[tokio::test]
    async fn test_find_many_like_and_in() {
        let store = seeded();
        let mut session = store.open_session().await.unwrap();

        let like = FilterExpression::default().with_term("brand", FilterTerm::Like("%olv%".to_string()));
        let found = session
            .find_many("cars", like, &PageSpec::default())
            .await
            .unwrap();
        assert_eq!(slugs(&found), vec!["a", "b"]);

        let any = FilterExpression::default().with_term(
            "owner",
            FilterTerm::In(vec![FieldValue::from("Eve"), FieldValue::from("Nobody")]),
        );
        let found = session
            .find_many("cars", any, &PageSpec::default())
            .await
            .unwrap();
        assert_eq!(slugs(&found), vec!["c"]);
    }

    #[tokio::test]
    async fn test_find_many_sort_and_window() {
        let store = seeded();
        let mut session = store.open_session().await.unwrap();

        let page = PageSpec {
            offset: Some(1),
            count: Some(2),
            sort: Some(SortSpec::parse("-year")),
        };
        let found = session
            .find_many("cars", FilterExpression::default(), &page)
            .await
            .unwrap();
        assert_eq!(slugs(&found), vec!["c", "a"]);
    }

    #[tokio::test]
    async fn test_sort_puts_missing_values_last() {
        let store = seeded();
        let mut unknown = car("e", "Lada", 0, "Eve");
        unknown.fields.insert("year".to_string(), FieldValue::Null);
        store.seed("cars", unknown).unwrap();
        let mut session = store.open_session().await.unwrap();

        for raw in ["year", "-year"] {
            let page = PageSpec {
                sort: Some(SortSpec::parse(raw)),
                ..Default::default()
            };
            let found = session
                .find_many("cars", FilterExpression::default(), &page)
                .await
                .unwrap();
            assert_eq!(slugs(&found).last(), Some(&"e"), "sort={raw}");
        }
    }

    #[tokio::test]
    async fn test_find_one_respects_filter() {
        let store = seeded();
        let mut session = store.open_session().await.unwrap();

        let mine = FilterExpression::default().with_term("owner", FilterTerm::Equals(FieldValue::from("Marc")));
        assert!(session.find_one("cars", "a", mine.clone()).await.unwrap().is_some());
        assert!(session.find_one("cars", "c", mine).await.unwrap().is_none());
        assert!(session
            .find_one("trucks", "a", FilterExpression::default())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_add_replace_delete() {
        let store = InMemoryStore::new();
        let mut session = store.open_session().await.unwrap();

        session.add("cars", car("x", "Saab", 2001, "Eve")).await.unwrap();
        assert!(matches!(
            session.add("cars", car("x", "Saab", 2001, "Eve")).await,
            Err(StorageError::IntegrityError { .. })
        ));

        session.replace("cars", car("x", "Saab", 2002, "Eve")).await.unwrap();
        let stored = session
            .find_one("cars", "x", FilterExpression::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.fields["year"], FieldValue::Integer(2002));

        assert!(session.replace("cars", car("y", "Saab", 2002, "Eve")).await.is_err());

        session.delete("cars", &stored).await.unwrap();
        assert_eq!(store.len("cars").unwrap(), 0);
    }

    #[test]
    fn test_like_to_regex_escapes_metacharacters() {
        let regex = like_to_regex("%a.b_").unwrap();
        assert!(regex.is_match("xxa.bZ"));
        assert!(!regex.is_match("xxaXbZ"));
        assert!(!regex.is_match("a.b"));
    }
}
