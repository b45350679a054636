//! Backend Gateway
//!
//! This module is the seam between the scheduler and the time-series
//! backends that answer plain (non-derived) targets:
//!
//! - [`Datasource`]: the one operation the core requires of a backend
//! - [`DatasourceRegistry`]: name-to-handle resolution
//! - [`HttpDatasource`]: a JSON-over-HTTP backend client
//!
//! Backend-side concerns (query execution, caching, retry, authentication)
//! live behind this trait and are not this crate's business.

mod http;

pub use http::{HttpDatasource, HttpDatasourceConfig};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::model::{QueryData, QueryRequest};

/// A queryable time-series backend
///
/// Implementations must tolerate concurrent calls for different target
/// subsets of the same original request; the scheduler fans sub-requests out
/// without coordination.
#[async_trait]
pub trait Datasource: Send + Sync {
    /// Execute a sub-request and produce its named series
    async fn query(&self, request: QueryRequest) -> Result<QueryData, DatasourceError>;
}

/// Errors that can occur while resolving or querying a backend
#[derive(Debug, Error)]
pub enum DatasourceError {
    #[error("no datasource registered under '{0}'")]
    NotFound(String),

    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("backend response could not be decoded: {0}")]
    Decode(String),
}

/// Name-to-handle registry of queryable backends
///
/// Populated once at startup from configuration (or by hand in tests) and
/// read concurrently by every in-flight request.
#[derive(Default)]
pub struct DatasourceRegistry {
    backends: RwLock<HashMap<String, Arc<dyn Datasource>>>,
}

impl DatasourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under a name, replacing any previous handle
    pub fn register(&self, name: impl Into<String>, datasource: Arc<dyn Datasource>) {
        let name = name.into();
        tracing::debug!(datasource = %name, "registering backend");
        self.backends
            .write()
            .expect("datasource registry lock poisoned")
            .insert(name, datasource);
    }

    /// Resolve a backend name to its queryable handle
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Datasource>, DatasourceError> {
        self.backends
            .read()
            .expect("datasource registry lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| DatasourceError::NotFound(name.to_string()))
    }

    /// Names of all registered backends, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .backends
            .read()
            .expect("datasource registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Number of registered backends
    pub fn len(&self) -> usize {
        self.backends
            .read()
            .expect("datasource registry lock poisoned")
            .len()
    }

    /// True if no backend is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
