//! CRM data types: records, their property values, and search requests.
//! Records are fetched from the CRM and never mutated or persisted locally.

pub mod entity;
pub mod query;

pub use entity::{Entity, PropertyValue};
pub use query::{Filter, FilterGroup, FilterOperator, SearchPage, SearchQuery};
