//! Generic CRM record with typed property accessors.
//!
//! CRMs hand back loosely typed property bags: most values arrive as strings,
//! absent properties may be missing or `null`. Every accessor here returns an
//! `Option`, so "absent or wrong type" is handled at the call site instead of
//! propagating silently.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A scalar property value as returned by the CRM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Explicit `null`
    Null,
    /// Boolean value
    Bool(bool),
    /// Numeric value
    Number(f64),
    /// String value (the CRM's default encoding for every property type)
    Text(String),
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// An immutable CRM record: an opaque id plus named properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// CRM identifier
    pub id: String,
    /// Named property values
    #[serde(default)]
    pub properties: HashMap<String, PropertyValue>,
}

impl Entity {
    /// Creates an entity with no properties.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            properties: HashMap::new(),
        }
    }

    /// Returns the entity with one more property set.
    #[must_use]
    pub fn with_property(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    /// Raw value of a property; `None` when absent or `null`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        match self.properties.get(name) {
            None | Some(PropertyValue::Null) => None,
            Some(value) => Some(value),
        }
    }

    /// Non-blank string value, trimmed.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            PropertyValue::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then_some(trimmed)
            }
            _ => None,
        }
    }

    /// Finite numeric value; numeric strings are parsed.
    #[must_use]
    pub fn number(&self, name: &str) -> Option<f64> {
        let value = match self.get(name)? {
            PropertyValue::Number(n) => *n,
            PropertyValue::Text(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        value.is_finite().then_some(value)
    }

    /// Timestamp value.
    ///
    /// Accepts RFC 3339 strings, `YYYY-MM-DD` dates (midnight UTC) and epoch
    /// milliseconds, either as a number or a numeric string.
    #[must_use]
    pub fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.get(name)? {
            PropertyValue::Number(n) => from_epoch_millis(*n),
            PropertyValue::Text(s) => parse_timestamp(s.trim()),
            PropertyValue::Bool(_) | PropertyValue::Null => None,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn from_epoch_millis(millis: f64) -> Option<DateTime<Utc>> {
    if !millis.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt(millis as i64).single()
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
}
