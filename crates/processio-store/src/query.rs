//! Filter, sort and paging options for listing and counting variables.
//!
//! Options are parsed from raw `(name, value)` parameter pairs and fully
//! validated before any backend sees them, so malformed input never
//! reaches storage and both backends reject the same things.

use std::fmt;
use std::str::FromStr;

use regex::Regex;

use crate::error::{StoreError, StoreResult};

// ═══════════════════════════════════════════════════════════════════════
//  Sorting
// ═══════════════════════════════════════════════════════════════════════

/// Logical fields a listing may be ordered by.
///
/// Each backend maps these to its physical column or document field with
/// an exhaustive `match`, so adding a variant forces both adapters to
/// handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortField {
    Key,
    ProcessDefinitionId,
    ProcessInstanceId,
    UnixTimestampInS,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Key => "key",
            Self::ProcessDefinitionId => "process_definition_id",
            Self::ProcessInstanceId => "process_instance_id",
            Self::UnixTimestampInS => "unix_timestamp_in_s",
        }
    }
}

impl FromStr for SortField {
    type Err = StoreError;

    fn from_str(s: &str) -> StoreResult<Self> {
        match s {
            "key" => Ok(Self::Key),
            "process_definition_id" => Ok(Self::ProcessDefinitionId),
            "process_instance_id" => Ok(Self::ProcessInstanceId),
            "unix_timestamp_in_s" => Ok(Self::UnixTimestampInS),
            other => Err(StoreError::InvalidQuery(format!(
                "unknown sort field: {other}"
            ))),
        }
    }
}

/// Ordering direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// A resolved `<field>.<direction>` sort specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for Sort {
    /// `key.asc`
    fn default() -> Self {
        Self {
            field: SortField::Key,
            direction: SortDirection::Asc,
        }
    }
}

impl FromStr for Sort {
    type Err = StoreError;

    /// Parse `field`, `field.asc` or `field.desc`.
    ///
    /// An empty string yields the default sort.
    fn from_str(s: &str) -> StoreResult<Self> {
        if s.is_empty() {
            return Ok(Self::default());
        }
        let (field, direction) = if let Some(field) = s.strip_suffix(".asc") {
            (field, SortDirection::Asc)
        } else if let Some(field) = s.strip_suffix(".desc") {
            (field, SortDirection::Desc)
        } else {
            (s, SortDirection::Asc)
        };
        Ok(Self {
            field: field.parse()?,
            direction,
        })
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.field.as_str(), self.direction.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  VariableQuery
// ═══════════════════════════════════════════════════════════════════════

/// Validated list/count options. Every filter is optional; present filters
/// are AND-combined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableQuery {
    /// Maximum number of results; `0` means unlimited.
    pub limit: u64,
    /// Number of results to skip before `limit` applies.
    pub offset: u64,
    pub sort: Sort,
    /// Substring-search regular expression over the key.
    pub key_regex: String,
    pub process_definition_id: String,
    pub process_instance_id: String,
}

impl VariableQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_key_regex(mut self, pattern: impl Into<String>) -> Self {
        self.key_regex = pattern.into();
        self
    }

    pub fn with_process_definition(mut self, definition_id: impl Into<String>) -> Self {
        self.process_definition_id = definition_id.into();
        self
    }

    pub fn with_process_instance(mut self, instance_id: impl Into<String>) -> Self {
        self.process_instance_id = instance_id.into();
        self
    }

    /// Parse raw request parameters.
    ///
    /// Recognised names are `limit`, `offset`, `sort`, `key_regex`,
    /// `process_definition_id` and `process_instance_id`; others are
    /// ignored. Empty values count as absent.
    pub fn from_pairs<I, K, V>(pairs: I) -> StoreResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut query = Self::default();
        for (name, value) in pairs {
            let value = value.as_ref();
            if value.is_empty() {
                continue;
            }
            match name.as_ref() {
                "limit" => query.limit = parse_non_negative("limit", value)?,
                "offset" => query.offset = parse_non_negative("offset", value)?,
                "sort" => query.sort = value.parse()?,
                "key_regex" => query.key_regex = value.to_string(),
                "process_definition_id" => query.process_definition_id = value.to_string(),
                "process_instance_id" => query.process_instance_id = value.to_string(),
                _ => {}
            }
        }
        query.validate()?;
        Ok(query)
    }

    /// Reject options no backend could execute.
    pub fn validate(&self) -> StoreResult<()> {
        self.key_pattern()?;
        Ok(())
    }

    /// The compiled key pattern, if a non-empty `key_regex` is set.
    pub fn key_pattern(&self) -> StoreResult<Option<Regex>> {
        if self.key_regex.is_empty() {
            return Ok(None);
        }
        Regex::new(&self.key_regex)
            .map(Some)
            .map_err(|e| StoreError::InvalidQuery(format!("invalid key_regex: {e}")))
    }
}

fn parse_non_negative(name: &str, value: &str) -> StoreResult<u64> {
    value
        .parse::<u64>()
        .map_err(|e| StoreError::InvalidQuery(format!("{name} must be a non-negative integer: {e}")))
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sort_is_key_ascending() {
        let q = VariableQuery::from_pairs(Vec::<(&str, &str)>::new()).unwrap();
        assert_eq!(q.sort.field, SortField::Key);
        assert_eq!(q.sort.direction, SortDirection::Asc);
        assert_eq!(q.limit, 0);
        assert_eq!(q.offset, 0);
    }

    #[test]
    fn sort_without_direction_is_ascending() {
        let sort: Sort = "unix_timestamp_in_s".parse().unwrap();
        assert_eq!(sort.field, SortField::UnixTimestampInS);
        assert_eq!(sort.direction, SortDirection::Asc);

        let sort: Sort = "key.desc".parse().unwrap();
        assert_eq!(sort.direction, SortDirection::Desc);
        assert_eq!(sort.to_string(), "key.desc");
    }

    #[test]
    fn unknown_sort_field_is_rejected() {
        let err = "value.asc".parse::<Sort>().unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("unknown sort field"));
    }

    #[test]
    fn parses_all_parameters() {
        let q = VariableQuery::from_pairs([
            ("limit", "2"),
            ("offset", "4"),
            ("sort", "process_instance_id.desc"),
            ("key_regex", "b.r"),
            ("process_definition_id", "d1"),
            ("process_instance_id", "i1"),
            ("unrelated", "x"),
        ])
        .unwrap();
        assert_eq!(q.limit, 2);
        assert_eq!(q.offset, 4);
        assert_eq!(q.sort.field, SortField::ProcessInstanceId);
        assert_eq!(q.sort.direction, SortDirection::Desc);
        assert_eq!(q.key_regex, "b.r");
        assert_eq!(q.process_definition_id, "d1");
        assert_eq!(q.process_instance_id, "i1");
    }

    #[test]
    fn non_numeric_limit_is_a_client_error() {
        let err = VariableQuery::from_pairs([("limit", "ten")]).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("limit"));
    }

    #[test]
    fn negative_offset_is_a_client_error() {
        let err = VariableQuery::from_pairs([("offset", "-1")]).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let err = VariableQuery::from_pairs([("key_regex", "(unclosed")]).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn empty_values_are_absent() {
        let q = VariableQuery::from_pairs([("limit", ""), ("sort", "")]).unwrap();
        assert_eq!(q, VariableQuery::default());
    }
}
