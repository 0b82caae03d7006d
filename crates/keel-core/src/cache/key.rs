//! Cache key conventions
//!
//! Keys built here look like `table:k1=v1&k2=v2`, optionally scoped to a user
//! as `user:<id>:table:k1=v1`. Parameters are sorted by name so the same query
//! always produces the same key.

use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::Display;

/// Builder for table-scoped cache keys
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    table: String,
    params: BTreeMap<String, String>,
    user: Option<String>,
}

impl CacheKeyBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            params: BTreeMap::new(),
            user: None,
        }
    }

    /// Add a query parameter; a repeated name replaces the earlier value
    pub fn param(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    /// Scope the key to a single user
    pub fn for_user(mut self, user_id: impl Display) -> Self {
        self.user = Some(user_id.to_string());
        self
    }

    pub fn build(&self) -> String {
        let query = self
            .params
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("&");

        match &self.user {
            Some(user) => format!("user:{}:{}:{}", user, self.table, query),
            None => format!("{}:{}", self.table, query),
        }
    }
}

/// Pattern matching every key built for `table`, user-scoped or not
pub fn table_pattern(table: &str) -> Regex {
    let source = format!("(^|:){}:", regex::escape(table));
    Regex::new(&source).expect("escaped table name forms a valid pattern")
}
