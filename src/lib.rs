//! # metaquery
//!
//! A query-orchestration layer in front of one or more time-series backends.
//! A caller submits a panel-level request of named targets; metaquery
//! partitions the targets by backend, fans sub-requests out, computes
//! derived targets from other targets' results, and merges everything into
//! one ordered response shaped like a single backend's answer.
//!
//! ## Features
//!
//! - **Dependency-aware dispatch**: targets reference each other by refId;
//!   pending results are shared futures, written once and read by any
//!   number of dependents
//! - **Derived series**: TimeShift, MovingAverage, and Arithmetic transforms
//! - **Sandboxed formulas**: arithmetic expressions are parsed into a closed
//!   grammar, never compiled as host code
//! - **Deterministic merging**: response order follows request order, not
//!   completion order
//!
//! ## Modules
//!
//! - [`model`]: wire-level request, target, and series types
//! - [`scheduler`]: the fan-out/fan-in core
//! - [`transform`]: the derived-series transform engine
//! - [`expr`]: the arithmetic expression evaluator
//! - [`datasource`]: backend gateway trait, registry, and HTTP client
//! - [`api`]: REST API server with Axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use metaquery::datasource::{DatasourceRegistry, HttpDatasource, HttpDatasourceConfig};
//! use metaquery::model::{QueryRequest, Target, TimeRange};
//! use metaquery::scheduler::QueryScheduler;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(DatasourceRegistry::new());
//!     registry.register(
//!         "graphite",
//!         Arc::new(HttpDatasource::new(HttpDatasourceConfig::default())?),
//!     );
//!
//!     let scheduler = QueryScheduler::new("meta", Arc::clone(&registry));
//!
//!     let request = QueryRequest::new(
//!         TimeRange::last_days(7),
//!         vec![Target::new("A", "graphite")],
//!     );
//!     let response = scheduler.query(request).await?;
//!
//!     println!("Resolved {} series", response.data.len());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod datasource;
pub mod expr;
pub mod model;
pub mod scheduler;
pub mod transform;

// Re-export top-level types for convenience
pub use model::{
    DataPoint, QueryData, QueryRequest, QueryType, Series, Target, TimeRange, MILLIS_PER_DAY,
};

pub use scheduler::{
    ConnectionStatus, QueryScheduler, SchedulerError, SchedulerResult, SharedQueryFuture,
};

pub use transform::{arithmetic, build_value_table, moving_average, shift_series, RingAverager};

pub use expr::{ExprError, ExprResult, Expression};

pub use datasource::{
    Datasource, DatasourceError, DatasourceRegistry, HttpDatasource, HttpDatasourceConfig,
};

pub use api::{build_router, serve, ApiError, AppState};

pub use config::{Config, ConfigError};
