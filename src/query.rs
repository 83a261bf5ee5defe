// Copyright (c) 2025 - Cowboy AI, Inc.
//! List queries
//!
//! Filters, sorts and pagination consumed by `GetList`. Field names arrive in
//! external form (`authorName`, `author[name]`) and are translated to the
//! storage layer's snake_case column names before they reach a store.
//!
//! # Query String Grammar
//!
//! ```text
//! _filters[<field>][<op>]=<value>     op ∈ {eq, ne, gt, lt, like, in}
//! _filters[<field>][eq]=a,b,c         comma-separated values → IN
//! _sorts[<field>]=asc|desc
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while building a list query
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Unknown filter operator: {0}")]
    UnknownOperator(String),

    #[error("Malformed filter parameter: {0}")]
    MalformedFilter(String),

    #[error("Invalid sort order: {0}")]
    InvalidSort(String),

    #[error("Invalid query parameter encoding: {0}")]
    Encoding(String),
}

/// Filter comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Like,
    In,
}

impl FromStr for FilterOp {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "eq" => Ok(FilterOp::Eq),
            "ne" => Ok(FilterOp::Ne),
            "gt" => Ok(FilterOp::Gt),
            "lt" => Ok(FilterOp::Lt),
            "like" => Ok(FilterOp::Like),
            "in" => Ok(FilterOp::In),
            other => Err(QueryError::UnknownOperator(other.to_string())),
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterOp::Eq => "eq",
            FilterOp::Ne => "ne",
            FilterOp::Gt => "gt",
            FilterOp::Lt => "lt",
            FilterOp::Like => "like",
            FilterOp::In => "in",
        };
        f.write_str(name)
    }
}

/// Translate an external field name to its storage column name
///
/// `authorName` → `author_name`, `author[name]` → `author_name`,
/// `authorID` → `author_id`.
pub fn column_name(field: &str) -> String {
    let flattened = field.replace("][", "_").replace(['[', '-'], "_").replace(']', "");

    let mut column = String::with_capacity(flattened.len() + 4);
    let mut previous: Option<char> = None;
    for ch in flattened.chars() {
        if ch.is_ascii_uppercase() {
            if matches!(previous, Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit()) {
                column.push('_');
            }
            column.push(ch.to_ascii_lowercase());
        } else {
            column.push(ch);
        }
        previous = Some(ch);
    }
    column
}

/// One filter predicate over a storage column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOption {
    /// Storage column name
    pub field: String,
    pub operator: FilterOp,
    /// Operand values; `in` and multi-value `ne` use all, the rest use the first
    pub values: Vec<String>,
}

impl FilterOption {
    /// Build a filter from an external field name
    pub fn new(field: &str, operator: FilterOp, value: impl Into<String>) -> Self {
        Self {
            field: column_name(field),
            operator,
            values: vec![value.into()],
        }
    }

    /// Multi-value (`IN`) filter
    pub fn any_of(field: &str, values: Vec<String>) -> Self {
        Self {
            field: column_name(field),
            operator: FilterOp::In,
            values,
        }
    }

    fn first(&self) -> &str {
        self.values.first().map(String::as_str).unwrap_or("")
    }

    /// Evaluate this filter against a row of columns
    ///
    /// A missing column never matches.
    pub fn matches(&self, columns: &serde_json::Map<String, Value>) -> bool {
        let Some(actual) = columns.get(&self.field) else {
            return false;
        };

        match self.operator {
            FilterOp::Eq => value_equals(actual, self.first()),
            FilterOp::Ne => !self.values.iter().any(|v| value_equals(actual, v)),
            FilterOp::In => self.values.iter().any(|v| value_equals(actual, v)),
            FilterOp::Gt => compare_operand(actual, self.first()) == Some(Ordering::Greater),
            FilterOp::Lt => compare_operand(actual, self.first()) == Some(Ordering::Less),
            FilterOp::Like => like(&value_text(actual), self.first()),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(QueryError::InvalidSort(other.to_string())),
        }
    }
}

/// Sort key over a storage column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

impl Sort {
    pub fn new(field: &str, order: SortOrder) -> Self {
        Self {
            field: column_name(field),
            order,
        }
    }

    /// Compare two rows by this key
    pub fn compare(
        &self,
        a: &serde_json::Map<String, Value>,
        b: &serde_json::Map<String, Value>,
    ) -> Ordering {
        let ordering = compare_values(a.get(&self.field), b.get(&self.field));
        match self.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

/// Parameters of one `GetList` call
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListQuery {
    pub resource_type: String,

    /// 1-based page number; 0 is treated as 1
    pub page: u32,

    /// Page size; 0 means the configured default
    pub limit: u32,

    /// Free-text match against string columns
    pub query: Option<String>,

    pub sorts: Vec<Sort>,
    pub filters: Vec<FilterOption>,
}

impl ListQuery {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            ..Self::default()
        }
    }

    pub fn page(mut self, page: u32, limit: u32) -> Self {
        self.page = page;
        self.limit = limit;
        self
    }

    pub fn search(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sorts.push(sort);
        self
    }

    pub fn filter(mut self, filter: FilterOption) -> Self {
        self.filters.push(filter);
        self
    }

    /// Clamp page and limit into usable values
    pub fn normalized(mut self, default_limit: u32, max_limit: u32) -> Self {
        if self.page == 0 {
            self.page = 1;
        }
        if self.limit == 0 {
            self.limit = default_limit;
        }
        self.limit = self.limit.min(max_limit);
        self
    }

    /// Offset of the first row of the requested page
    pub fn offset(&self) -> usize {
        (self.page.max(1) as usize - 1) * self.limit as usize
    }

    /// Whether a row passes the free-text query and every filter
    pub fn matches(&self, columns: &serde_json::Map<String, Value>) -> bool {
        let text_match = match self.query.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                columns.values().any(|value| match value {
                    Value::String(s) => s.to_lowercase().contains(&needle),
                    _ => false,
                })
            }
        };
        text_match && self.filters.iter().all(|filter| filter.matches(columns))
    }

    /// Compare rows by all sort keys in order
    pub fn compare(
        &self,
        a: &serde_json::Map<String, Value>,
        b: &serde_json::Map<String, Value>,
    ) -> Ordering {
        self.sorts
            .iter()
            .map(|sort| sort.compare(a, b))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

/// One page of results plus the total match count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
}

/// Parse `_filters[<field>][<op>]=<value>` pairs out of a query string
///
/// Parameters that are not filters are ignored.
pub fn parse_filters(query_string: &str) -> Result<Vec<FilterOption>, QueryError> {
    let mut filters = Vec::new();

    for (key, value) in decode_pairs(query_string)? {
        let Some(rest) = key.strip_prefix("_filters[") else {
            continue;
        };
        let (field, op) = rest
            .strip_suffix(']')
            .and_then(|inner| inner.rsplit_once("]["))
            .ok_or_else(|| QueryError::MalformedFilter(key.clone()))?;
        if field.is_empty() {
            return Err(QueryError::MalformedFilter(key.clone()));
        }

        let operator: FilterOp = op.parse()?;
        let column = column_name(field);

        let filter = match operator {
            FilterOp::Eq | FilterOp::In | FilterOp::Ne => {
                let values: Vec<String> = value.split(',').map(|v| v.trim().to_string()).collect();
                let operator = if operator == FilterOp::Eq && values.len() > 1 {
                    FilterOp::In
                } else {
                    operator
                };
                FilterOption {
                    field: column,
                    operator,
                    values,
                }
            }
            _ => FilterOption {
                field: column,
                operator,
                values: vec![value],
            },
        };
        filters.push(filter);
    }

    Ok(filters)
}

/// Parse `_sorts[<field>]=asc|desc` pairs out of a query string
pub fn parse_sorts(query_string: &str) -> Result<Vec<Sort>, QueryError> {
    let mut sorts = Vec::new();
    for (key, value) in decode_pairs(query_string)? {
        let Some(rest) = key.strip_prefix("_sorts[") else {
            continue;
        };
        let field = rest
            .strip_suffix(']')
            .filter(|field| !field.is_empty())
            .ok_or_else(|| QueryError::MalformedFilter(key.clone()))?;
        sorts.push(Sort::new(field, value.parse()?));
    }
    Ok(sorts)
}

pub(crate) fn decode_pairs(query_string: &str) -> Result<Vec<(String, String)>, QueryError> {
    query_string
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            Ok((decode_component(key)?, decode_component(value)?))
        })
        .collect()
}

fn decode_component(raw: &str) -> Result<String, QueryError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| QueryError::Encoding(format!("{}: {}", raw, e)))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn value_equals(actual: &Value, operand: &str) -> bool {
    match actual {
        Value::String(s) => s == operand,
        Value::Number(n) => match (n.as_f64(), operand.parse::<f64>()) {
            (Some(a), Ok(b)) => a == b,
            _ => false,
        },
        Value::Bool(b) => operand.parse::<bool>().map(|o| o == *b).unwrap_or(false),
        Value::Null => operand.is_empty() || operand == "null",
        other => other.to_string() == operand,
    }
}

fn compare_operand(actual: &Value, operand: &str) -> Option<Ordering> {
    match actual {
        Value::Number(n) => {
            let operand = operand.parse::<f64>().ok()?;
            n.as_f64()?.partial_cmp(&operand)
        }
        Value::String(s) => Some(s.as_str().cmp(operand)),
        Value::Bool(b) => operand.parse::<bool>().ok().map(|o| b.cmp(&o)),
        _ => None,
    }
}

/// Order JSON values: missing/null first, then bools, numbers, strings
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// SQL `LIKE` with `%` and `_`; without wildcards it is a substring match
fn like(text: &str, pattern: &str) -> bool {
    if !pattern.contains(['%', '_']) {
        return text.to_lowercase().contains(&pattern.to_lowercase());
    }

    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();

    // dp[j]: pattern[..i] matches text[..j]
    let mut dp = vec![false; text.len() + 1];
    dp[0] = true;
    for p in &pattern {
        let mut next = vec![false; text.len() + 1];
        match p {
            '%' => {
                let mut seen = false;
                for j in 0..=text.len() {
                    seen |= dp[j];
                    next[j] = seen;
                }
            }
            '_' => {
                for j in 1..=text.len() {
                    next[j] = dp[j - 1];
                }
            }
            c => {
                for j in 1..=text.len() {
                    next[j] = dp[j - 1] && text[j - 1] == *c;
                }
            }
        }
        dp = next;
    }
    dp[text.len()]
}
