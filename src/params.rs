use serde::{Deserialize, Serialize};

/// Default page size for [`DbQueryParams`] and text search.
pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// Logical operator placed between search predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryOperator {
    #[default]
    And,
    Or,
}

impl std::str::FromStr for QueryOperator {
    type Err = crate::errors::SessionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "and" => Ok(Self::And),
            "or" => Ok(Self::Or),
            other => Err(crate::errors::SessionError::QueryError(format!(
                "unknown operator '{other}' (expected and|or)"
            ))),
        }
    }
}

/// Search, sort and paging parameters for [`crate::session::Session::page`].
///
/// Semantics:
/// - `query_params` pairs map a field path to a regex fragment; each pair is matched
///   case-insensitively and the pairs are joined with `operator`.
/// - `sort_params` pairs map a field path to a direction (`true` = ascending), applied in order.
/// - `count` of 0 means "no limit", as with the driver's cursor limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbQueryParams {
    pub query_params: Vec<(String, String)>,
    pub operator: QueryOperator,
    pub sort_params: Vec<(String, bool)>,
    pub skip_records: u64,
    pub count: u64,
}

impl Default for DbQueryParams {
    fn default() -> Self {
        Self {
            query_params: Vec::new(),
            operator: QueryOperator::And,
            sort_params: Vec::new(),
            skip_records: 0,
            count: DEFAULT_PAGE_SIZE,
        }
    }
}

impl DbQueryParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_param(mut self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.query_params.push((field.into(), pattern.into()));
        self
    }

    #[must_use]
    pub fn with_operator(mut self, operator: QueryOperator) -> Self {
        self.operator = operator;
        self
    }

    #[must_use]
    pub fn sort_by(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.sort_params.push((field.into(), ascending));
        self
    }

    #[must_use]
    pub fn skip(mut self, n: u64) -> Self {
        self.skip_records = n;
        self
    }

    #[must_use]
    pub fn take(mut self, n: u64) -> Self {
        self.count = n;
        self
    }

    /// Advance the window by one page of `count` records.
    #[must_use]
    pub fn next_page(&self) -> Self {
        let mut next = self.clone();
        next.skip_records = self.skip_records.saturating_add(self.count);
        next
    }
}
