//! Remote data source boundary

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;

use crate::cache::CacheKeyBuilder;
use crate::error::KeelResult;

/// A table query against a remote data service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub table: String,
    pub params: BTreeMap<String, String>,
    /// Scope results to one user
    pub user: Option<String>,
}

impl Query {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    pub fn for_user(mut self, user_id: impl Display) -> Self {
        self.user = Some(user_id.to_string());
        self
    }

    /// Cache key following the `table:k=v&...` convention
    pub fn cache_key(&self) -> String {
        let mut builder = CacheKeyBuilder::new(&self.table);
        for (name, value) in &self.params {
            builder = builder.param(name.as_str(), value);
        }
        if let Some(user) = &self.user {
            builder = builder.for_user(user);
        }
        builder.build()
    }
}

/// A remote dependency that answers queries
///
/// Implementations only report success or failure; timeouts, retries, circuit
/// breaking and caching are applied around them by
/// [`ResilientFetcher`](super::ResilientFetcher).
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Name of the dependency, used for breaker names and operation descriptions
    fn name(&self) -> &str;

    /// Run a query
    async fn query(&self, query: &Query) -> KeelResult<serde_json::Value>;
}
