//! Search request and page types for the CRM gateway.

use super::Entity;
use serde::{Deserialize, Serialize};

/// Comparison applied by a single filter.
///
/// Only the operators the engine issues are modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperator {
    /// Property is set
    HasProperty,
}

/// A single property filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    /// Property the filter applies to
    pub property_name: String,
    /// Comparison operator
    pub operator: FilterOperator,
    /// Right-hand value; absent for presence checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Filter {
    /// Property is set.
    #[must_use]
    pub fn has_property(property: &str) -> Self {
        Self {
            property_name: property.to_string(),
            operator: FilterOperator::HasProperty,
            value: None,
        }
    }
}

/// Filters combined with AND. Groups in a query are combined with OR.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterGroup {
    /// Filters that must all match
    pub filters: Vec<Filter>,
}

impl FilterGroup {
    /// A group containing a single filter.
    #[must_use]
    pub fn single(filter: Filter) -> Self {
        Self {
            filters: vec![filter],
        }
    }
}

/// One paginated search call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// Object type to search
    pub object_type: String,
    /// Filter groups (OR of ANDs); empty matches everything
    pub filter_groups: Vec<FilterGroup>,
    /// Properties to return on each record
    pub properties: Vec<String>,
    /// Page size
    pub limit: usize,
    /// Cursor returned by the previous page
    pub after: Option<String>,
}

impl SearchQuery {
    /// Query for all records of `object_type`, one page of `limit`.
    #[must_use]
    pub fn new(object_type: &str, limit: usize) -> Self {
        Self {
            object_type: object_type.to_string(),
            filter_groups: Vec::new(),
            properties: Vec::new(),
            limit,
            after: None,
        }
    }

    /// Sets the returned properties.
    #[must_use]
    pub fn with_properties(mut self, properties: &[&str]) -> Self {
        self.properties = properties.iter().map(ToString::to_string).collect();
        self
    }

    /// Adds a filter group.
    #[must_use]
    pub fn with_filter_group(mut self, group: FilterGroup) -> Self {
        self.filter_groups.push(group);
        self
    }

    /// Continues from a cursor.
    #[must_use]
    pub fn after(mut self, cursor: Option<String>) -> Self {
        self.after = cursor;
        self
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    /// Records on this page
    pub results: Vec<Entity>,
    /// Total matching records across all pages
    pub total: u64,
    /// Cursor for the next page, if any
    pub next_cursor: Option<String>,
}
