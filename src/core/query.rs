//! Pagination and sorting parameters for `find`
//!
//! The reserved query keys are `offset`, `count` and `sort`; every other key
//! is a filter term.
//!
//! ```text
//! GET /cars/find?offset=20&count=10&sort=-year
//! ```

use serde::Serialize;

use crate::core::error::ValidationError;

pub const OFFSET_KEY: &str = "offset";
pub const COUNT_KEY: &str = "count";
pub const SORT_KEY: &str = "sort";

/// Sort order on a single data field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortSpec {
    pub field: String,
    pub descending: bool,
}

impl SortSpec {
    /// Parse `field` (ascending) or `-field` (descending)
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix('-') {
            Some(field) => Self {
                field: field.to_string(),
                descending: true,
            },
            None => Self {
                field: raw.to_string(),
                descending: false,
            },
        }
    }
}

/// Page window and ordering. Absent parameters mean "no limit".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageSpec {
    pub offset: Option<u64>,
    pub count: Option<u64>,
    pub sort: Option<SortSpec>,
}

impl PageSpec {
    /// Parse a non-negative integer for `offset` or `count`
    pub fn parse_bound(key: &str, raw: &str) -> Result<u64, ValidationError> {
        raw.parse::<u64>()
            .map_err(|_| ValidationError::InvalidPageParameter {
                key: key.to_string(),
                value: raw.to_string(),
            })
    }

    /// Apply the window to an already filtered and sorted sequence
    pub fn window<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        let skip = self.offset.map_or(0, |o| usize::try_from(o).unwrap_or(usize::MAX));
        let take = self.count.map_or(usize::MAX, |c| usize::try_from(c).unwrap_or(usize::MAX));
        items.into_iter().skip(skip).take(take).collect()
    }
}
