//! Filters: the document store's query language.
//!
//! A filter is a list of field conditions, the in-process form of
//! `{ "user_id": "u1", "key": { "$regex": "b.r" } }`. An equality term
//! compares the whole field value; a regex term matches string fields
//! containing a match anywhere. All terms must hold for a document to
//! match.

use regex::Regex;
use serde_json::Value;

use super::Document;

/// A single field condition.
#[derive(Debug, Clone)]
enum Condition {
    Eq(Value),
    Regex(Regex),
}

impl Condition {
    fn holds(&self, field: Option<&Value>) -> bool {
        match self {
            Self::Eq(expected) => field.unwrap_or(&Value::Null) == expected,
            Self::Regex(pattern) => field
                .and_then(Value::as_str)
                .is_some_and(|text| pattern.is_match(text)),
        }
    }
}

/// A conjunction of field conditions.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    terms: Vec<(String, Condition)>,
}

impl Filter {
    /// A filter matching every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// Add an equality term.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.terms.push((field.into(), Condition::Eq(value.into())));
        self
    }

    /// Add a regular-expression search term.
    pub fn regex(mut self, field: impl Into<String>, pattern: Regex) -> Self {
        self.terms.push((field.into(), Condition::Regex(pattern)));
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.terms
            .iter()
            .all(|(field, condition)| condition.holds(doc.get(field)))
    }

    /// The value a field is required to equal, if the filter pins it.
    pub fn equality(&self, field: &str) -> Option<&Value> {
        self.terms.iter().find_map(|(name, condition)| match condition {
            Condition::Eq(value) if name == field => Some(value),
            _ => None,
        })
    }
}
