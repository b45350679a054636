//! Query Scheduler
//!
//! The fan-out/fan-in core. A panel request's targets are partitioned by
//! datasource; foreign groups are forwarded to their backends through the
//! [`DatasourceRegistry`], while targets addressed to this scheduler's own
//! name are derived from other targets' results via the transform engine.
//!
//! # Dispatch pipeline
//!
//! ```text
//! request → partition by datasource → dispatch groups (backends / derived)
//!         → await in group order → flatten, dropping hidden series
//! ```
//!
//! Every dispatched target's pending result is registered under its refId as
//! a shared future, written exactly once and cloned by any later target that
//! depends on it. All futures are spawned eagerly, so independent branches
//! run concurrently and a derived target suspends only on the futures it
//! actually needs. Completion timing never affects output order: the final
//! response follows group order and the original target order within each
//! group.
//!
//! Derived targets are processed strictly in list order. A dependency refId
//! that is not yet registered at the point of need is a structural error in
//! the request and rejects the whole query; per-point arithmetic failures,
//! by contrast, are absorbed inside the transform engine.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use crate::datasource::{DatasourceError, DatasourceRegistry};
use crate::model::{QueryData, QueryRequest, QueryType, Target};
use crate::transform;

/// A pending per-target result: write-once, read-many
pub type SharedQueryFuture = Shared<BoxFuture<'static, Result<Arc<QueryData>, SchedulerError>>>;

/// Errors that reject a whole panel request
///
/// Clone is required so one failure can flow through every clone of a shared
/// future.
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    /// A target named a backend nobody registered
    #[error("datasource '{0}' is not registered")]
    UnknownDatasource(String),

    /// A derived target referenced a refId not yet resolved (forward
    /// reference or typo)
    #[error("target '{target}' depends on '{dependency}', which is not resolved at that point in the request")]
    DependencyOrder { target: String, dependency: String },

    /// A derived target is missing a required field or carries an unusable
    /// value
    #[error("target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    /// A backend rejected its sub-request; the message is opaque to us
    #[error("backend '{datasource}' query failed: {message}")]
    Backend { datasource: String, message: String },
}

impl SchedulerError {
    fn from_datasource(name: &str, error: DatasourceError) -> Self {
        match error {
            DatasourceError::NotFound(name) => SchedulerError::UnknownDatasource(name),
            other => SchedulerError::Backend {
                datasource: name.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Outcome of a connection test
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub status: String,
    pub message: String,
    pub title: String,
}

/// Per-request dispatch bookkeeping
///
/// Tracks the shared future and original definition of every target
/// registered so far, in insertion order. Lives only for the duration of one
/// request.
#[derive(Default)]
struct DispatchState {
    futures: HashMap<String, SharedQueryFuture>,
    order: Vec<String>,
    targets: HashMap<String, Target>,
}

impl DispatchState {
    /// Register a target's pending result under its refId
    fn register(&mut self, target: &Target, future: SharedQueryFuture) {
        if self.futures.insert(target.ref_id.clone(), future).is_none() {
            self.order.push(target.ref_id.clone());
        }
        self.targets.insert(target.ref_id.clone(), target.clone());
    }

    fn future_for(&self, ref_id: &str) -> Option<SharedQueryFuture> {
        self.futures.get(ref_id).cloned()
    }

    fn target_for(&self, ref_id: &str) -> Option<&Target> {
        self.targets.get(ref_id)
    }

    /// All registered futures so far, in insertion order
    fn snapshot(&self) -> Vec<(String, SharedQueryFuture)> {
        self.order
            .iter()
            .map(|ref_id| (ref_id.clone(), self.futures[ref_id].clone()))
            .collect()
    }
}

/// The meta-query fan-out/fan-in scheduler
pub struct QueryScheduler {
    /// Datasource name this scheduler answers for (derived targets)
    name: String,
    /// Backend resolution
    registry: Arc<DatasourceRegistry>,
}

impl QueryScheduler {
    /// Create a scheduler answering for `name`
    pub fn new(name: impl Into<String>, registry: Arc<DatasourceRegistry>) -> Self {
        Self {
            name: name.into(),
            registry,
        }
    }

    /// The datasource name this scheduler answers for
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute a panel request: partition, dispatch, derive, merge
    pub async fn query(&self, request: QueryRequest) -> SchedulerResult<QueryData> {
        let groups = partition_targets(&request.targets);
        tracing::debug!(
            targets = request.targets.len(),
            groups = groups.len(),
            "dispatching panel query"
        );

        let mut state = DispatchState::default();
        let mut group_futures: Vec<SharedQueryFuture> = Vec::new();

        for (datasource, targets) in groups {
            if datasource == self.name {
                // Derived targets, strictly in list order so dependencies
                // resolve by insertion order
                for target in targets {
                    let future = self.dispatch_derived(&target, &request, &state)?;
                    state.register(&target, future.clone());
                    group_futures.push(future);
                }
            } else {
                let group_future = self.dispatch_backend(
                    datasource.clone(),
                    request.with_targets(targets.clone()),
                );

                for target in targets {
                    // A hidden target's data must stay retrievable for
                    // dependents, so it gets its own unhidden sub-request.
                    // Up to 2x backend calls for hidden cross-backend
                    // targets; the extra fetch is not part of the final join
                    // and surfaces failures only through dependents.
                    let ref_future = if target.hide {
                        let mut unhidden = target.clone();
                        unhidden.hide = false;
                        self.dispatch_backend(
                            datasource.clone(),
                            request.with_targets(vec![unhidden]),
                        )
                    } else {
                        group_future.clone()
                    };
                    state.register(&target, ref_future);
                }

                group_futures.push(group_future);
            }
        }

        // Fan-in: group order and within-group order decide placement,
        // completion order decides nothing
        let mut data = Vec::new();
        for future in group_futures {
            let result = future.await?;
            data.extend(result.data.iter().filter(|series| !series.hide).cloned());
        }

        Ok(QueryData { data })
    }

    /// Report connection health
    ///
    /// Always succeeds: the meta layer has no backend of its own to probe,
    /// so reachability of this service is the whole test.
    pub async fn test_connection(&self) -> ConnectionStatus {
        ConnectionStatus {
            status: "success".to_string(),
            message: "meta datasource is working".to_string(),
            title: "Success".to_string(),
        }
    }

    /// Forward one sub-request to a foreign backend
    fn dispatch_backend(&self, datasource: String, sub_request: QueryRequest) -> SharedQueryFuture {
        let registry = Arc::clone(&self.registry);
        spawn_shared(async move {
            let handle = registry
                .resolve(&datasource)
                .map_err(|e| SchedulerError::from_datasource(&datasource, e))?;
            let result = handle
                .query(sub_request)
                .await
                .map_err(|e| SchedulerError::from_datasource(&datasource, e))?;
            Ok(Arc::new(result))
        })
    }

    /// Build the pending result for one derived target
    fn dispatch_derived(
        &self,
        target: &Target,
        request: &QueryRequest,
        state: &DispatchState,
    ) -> SchedulerResult<SharedQueryFuture> {
        let Some(query_type) = target.query_type else {
            return Err(invalid(target, "queryType is required on derived targets"));
        };

        match query_type {
            QueryType::TimeShift => self.dispatch_time_shift(target, request, state),
            QueryType::MovingAverage => self.dispatch_moving_average(target, state),
            QueryType::Arithmetic => self.dispatch_arithmetic(target, state),
        }
    }

    /// TimeShift: re-query the dependency's backend over a window shifted
    /// back by `periods` days, then restore timestamps for display
    fn dispatch_time_shift(
        &self,
        target: &Target,
        request: &QueryRequest,
        state: &DispatchState,
    ) -> SchedulerResult<SharedQueryFuture> {
        let periods = require_periods(target)?;
        let dependency = require_field(target, target.query.as_deref(), "query")?;
        let metric = require_field(target, target.metric.as_deref(), "metric")?;
        let output_name = require_output_name(target)?;

        let dep_target = state
            .target_for(&dependency)
            .ok_or_else(|| SchedulerError::DependencyOrder {
                target: target.ref_id.clone(),
                dependency: dependency.clone(),
            })?
            .clone();

        let mut unhidden = dep_target.clone();
        unhidden.hide = false;
        let mut sub_request = request.with_targets(vec![unhidden]);
        sub_request.range = request.range.shifted_back(periods);

        let registry = Arc::clone(&self.registry);
        let datasource = dep_target.datasource.clone();
        let hide = target.hide;

        Ok(spawn_shared(async move {
            let handle = registry
                .resolve(&datasource)
                .map_err(|e| SchedulerError::from_datasource(&datasource, e))?;
            let result = handle
                .query(sub_request)
                .await
                .map_err(|e| SchedulerError::from_datasource(&datasource, e))?;

            let series = transform::shift_series(&result.data, &metric, periods, &output_name, hide);
            Ok(Arc::new(QueryData::new(vec![series])))
        }))
    }

    /// MovingAverage: smooth the dependency's already-dispatched result,
    /// no re-query
    fn dispatch_moving_average(
        &self,
        target: &Target,
        state: &DispatchState,
    ) -> SchedulerResult<SharedQueryFuture> {
        let periods = require_periods(target)?;
        if periods < 1 {
            return Err(invalid(target, "periods must be at least 1"));
        }
        let window = periods as usize;
        let dependency = require_field(target, target.query.as_deref(), "query")?;
        let output_name = require_output_name(target)?;

        let dep_future = state
            .future_for(&dependency)
            .ok_or_else(|| SchedulerError::DependencyOrder {
                target: target.ref_id.clone(),
                dependency: dependency.clone(),
            })?;

        let hide = target.hide;

        Ok(spawn_shared(async move {
            let dep_result = dep_future.await?;
            let series = transform::moving_average(&dep_result.data, window, &output_name, hide);
            Ok(Arc::new(QueryData::new(series)))
        }))
    }

    /// Arithmetic: wait on every target collected so far, then evaluate the
    /// formula per distinct timestamp
    fn dispatch_arithmetic(
        &self,
        target: &Target,
        state: &DispatchState,
    ) -> SchedulerResult<SharedQueryFuture> {
        let expression = require_field(target, target.expression.as_deref(), "expression")?;
        let output_name = require_output_name(target)?;

        let inputs = state.snapshot();
        let hide = target.hide;

        Ok(spawn_shared(async move {
            let mut resolved = Vec::with_capacity(inputs.len());
            for (ref_id, future) in inputs {
                resolved.push((ref_id, future.await?));
            }
            let series = transform::arithmetic(&resolved, &expression, &output_name, hide);
            Ok(Arc::new(QueryData::new(vec![series])))
        }))
    }
}

/// Share a dispatch future and drive it eagerly
///
/// The spawned clone keeps the work running whether or not anyone is
/// currently awaiting; later readers join the same result.
fn spawn_shared<F>(future: F) -> SharedQueryFuture
where
    F: Future<Output = Result<Arc<QueryData>, SchedulerError>> + Send + 'static,
{
    let shared = future.boxed().shared();
    tokio::spawn(shared.clone());
    shared
}

/// Group targets by datasource, preserving first-appearance group order and
/// original target order within each group
fn partition_targets(targets: &[Target]) -> Vec<(String, Vec<Target>)> {
    let mut groups: Vec<(String, Vec<Target>)> = Vec::new();

    for target in targets {
        match groups.iter_mut().find(|(name, _)| *name == target.datasource) {
            Some((_, group)) => group.push(target.clone()),
            None => groups.push((target.datasource.clone(), vec![target.clone()])),
        }
    }

    groups
}

fn invalid(target: &Target, reason: &str) -> SchedulerError {
    SchedulerError::InvalidTarget {
        target: target.ref_id.clone(),
        reason: reason.to_string(),
    }
}

fn require_field(target: &Target, value: Option<&str>, field: &str) -> SchedulerResult<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(invalid(target, &format!("{} is required", field))),
    }
}

fn require_periods(target: &Target) -> SchedulerResult<i64> {
    target
        .periods
        .ok_or_else(|| invalid(target, "periods is required"))
}

fn require_output_name(target: &Target) -> SchedulerResult<String> {
    require_field(target, target.output_metric_name.as_deref(), "outputMetricName")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::Datasource;
    use crate::model::{DataPoint, Series, TimeRange, MILLIS_PER_DAY};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Deterministic backend stub: one series per non-hidden target, named
    /// after the refId, values keyed off a fixed table
    struct StubBackend {
        points: Vec<DataPoint>,
        calls: AtomicUsize,
        requests: Mutex<Vec<QueryRequest>>,
    }

    impl StubBackend {
        fn new(points: Vec<DataPoint>) -> Self {
            Self {
                points,
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn recorded_requests(&self) -> Vec<QueryRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Datasource for StubBackend {
        async fn query(&self, request: QueryRequest) -> Result<QueryData, DatasourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());

            let data = request
                .targets
                .iter()
                .map(|target| Series {
                    name: target.ref_id.clone(),
                    datapoints: self.points.clone(),
                    hide: target.hide,
                })
                .collect();
            Ok(QueryData::new(data))
        }
    }

    /// Backend that always rejects
    struct FailingBackend;

    #[async_trait]
    impl Datasource for FailingBackend {
        async fn query(&self, _request: QueryRequest) -> Result<QueryData, DatasourceError> {
            Err(DatasourceError::Decode("boom".to_string()))
        }
    }

    fn scheduler_with(
        backends: Vec<(&str, Arc<dyn Datasource>)>,
    ) -> (QueryScheduler, Arc<DatasourceRegistry>) {
        let registry = Arc::new(DatasourceRegistry::new());
        for (name, ds) in backends {
            registry.register(name, ds);
        }
        (QueryScheduler::new("meta", Arc::clone(&registry)), registry)
    }

    fn points(values: &[(f64, i64)]) -> Vec<DataPoint> {
        values.iter().map(|(v, t)| DataPoint(Some(*v), *t)).collect()
    }

    #[tokio::test]
    async fn test_plain_targets_pass_through() {
        let backend = Arc::new(StubBackend::new(points(&[(1.0, 1000), (2.0, 2000)])));
        let (scheduler, _) =
            scheduler_with(vec![("graphite", backend.clone() as Arc<dyn Datasource>)]);

        let request = QueryRequest::new(
            TimeRange::last_hours(1),
            vec![Target::new("A", "graphite"), Target::new("B", "graphite")],
        );

        let response = scheduler.query(request).await.unwrap();

        let names: Vec<&str> = response.data.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(response.data[0].datapoints, points(&[(1.0, 1000), (2.0, 2000)]));
        // One sub-request for the whole group
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_hidden_series_dropped_in_order() {
        let backend = Arc::new(StubBackend::new(points(&[(1.0, 1000)])));
        let (scheduler, _) =
            scheduler_with(vec![("graphite", backend.clone() as Arc<dyn Datasource>)]);

        let request = QueryRequest::new(
            TimeRange::last_hours(1),
            vec![
                Target::new("A", "graphite"),
                Target::new("B", "graphite").hidden(),
                Target::new("C", "graphite"),
            ],
        );

        let response = scheduler.query(request).await.unwrap();

        let names: Vec<&str> = response.data.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A", "C"]);
    }

    #[tokio::test]
    async fn test_hidden_foreign_target_is_refetched_unhidden() {
        let backend = Arc::new(StubBackend::new(points(&[(1.0, 1000)])));
        let (scheduler, _) =
            scheduler_with(vec![("graphite", backend.clone() as Arc<dyn Datasource>)]);

        let request = QueryRequest::new(
            TimeRange::last_hours(1),
            vec![
                Target::new("A", "graphite"),
                Target::new("B", "graphite").hidden(),
            ],
        );

        scheduler.query(request).await.unwrap();

        // The refetch is not part of the final join; let the detached task
        // finish before counting calls
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        // One group request plus one unhidden single-target refetch
        assert_eq!(backend.call_count(), 2);
        let recorded = backend.recorded_requests();
        let single: Vec<&QueryRequest> =
            recorded.iter().filter(|r| r.targets.len() == 1).collect();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].targets[0].ref_id, "B");
        assert!(!single[0].targets[0].hide);
    }

    #[tokio::test]
    async fn test_moving_average_target() {
        let backend = Arc::new(StubBackend::new(points(&[
            (1.0, 1000),
            (3.0, 2000),
            (5.0, 3000),
        ])));
        let (scheduler, _) = scheduler_with(vec![("graphite", backend as Arc<dyn Datasource>)]);

        let request = QueryRequest::new(
            TimeRange::last_hours(1),
            vec![
                Target::new("A", "graphite"),
                Target::new("M", "meta")
                    .query_type(QueryType::MovingAverage)
                    .periods(2)
                    .depends_on("A")
                    .output_name("avg "),
            ],
        );

        let response = scheduler.query(request).await.unwrap();

        assert_eq!(response.data.len(), 2);
        let averaged = &response.data[1];
        assert_eq!(averaged.name, "avg A");
        assert_eq!(
            averaged.datapoints,
            points(&[(1.0, 1000), (2.0, 2000), (4.0, 3000)])
        );
    }

    #[tokio::test]
    async fn test_time_shift_target() {
        let t = 1_700_000_000_000;
        let backend = Arc::new(StubBackend::new(vec![DataPoint(Some(10.0), t)]));
        let (scheduler, _) =
            scheduler_with(vec![("graphite", backend.clone() as Arc<dyn Datasource>)]);

        let original_range = TimeRange::last_hours(6);
        let request = QueryRequest::new(
            original_range,
            vec![
                Target::new("A", "graphite"),
                Target::new("S", "meta")
                    .query_type(QueryType::TimeShift)
                    .periods(7)
                    .depends_on("A")
                    .metric("A")
                    .output_name("week_ago"),
            ],
        );

        let response = scheduler.query(request).await.unwrap();

        // Output timestamp is restored onto the display window
        let shifted = response.data.iter().find(|s| s.name == "week_ago").unwrap();
        assert_eq!(
            shifted.datapoints,
            vec![DataPoint(Some(10.0), t + 7 * MILLIS_PER_DAY)]
        );

        // The re-query went out over a window shifted back seven days
        let recorded = backend.recorded_requests();
        let shifted_request = recorded
            .iter()
            .find(|r| r.range.from != original_range.from)
            .unwrap();
        assert_eq!(
            original_range.from.timestamp_millis()
                - shifted_request.range.from.timestamp_millis(),
            7 * MILLIS_PER_DAY
        );
        assert!(!shifted_request.targets[0].hide);
    }

    #[tokio::test]
    async fn test_arithmetic_target() {
        let backend = Arc::new(StubBackend::new(points(&[(2.0, 1000)])));
        let (scheduler, _) = scheduler_with(vec![("graphite", backend as Arc<dyn Datasource>)]);

        let request = QueryRequest::new(
            TimeRange::last_hours(1),
            vec![
                Target::new("A", "graphite"),
                Target::new("B", "graphite"),
                Target::new("C", "meta")
                    .query_type(QueryType::Arithmetic)
                    .expression("A + B")
                    .output_name("total"),
            ],
        );

        let response = scheduler.query(request).await.unwrap();

        let total = response.data.iter().find(|s| s.name == "total").unwrap();
        assert_eq!(total.datapoints, points(&[(4.0, 1000)]));
    }

    #[tokio::test]
    async fn test_arithmetic_sees_hidden_dependency() {
        let backend = Arc::new(StubBackend::new(points(&[(3.0, 1000)])));
        let (scheduler, _) = scheduler_with(vec![("graphite", backend as Arc<dyn Datasource>)]);

        let request = QueryRequest::new(
            TimeRange::last_hours(1),
            vec![
                Target::new("A", "graphite"),
                Target::new("B", "graphite").hidden(),
                Target::new("C", "meta")
                    .query_type(QueryType::Arithmetic)
                    .expression("A * B")
                    .output_name("product"),
            ],
        );

        let response = scheduler.query(request).await.unwrap();

        // B itself is suppressed, but its data fed the formula
        let names: Vec<&str> = response.data.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A", "product"]);
        let product = &response.data[1];
        assert_eq!(product.datapoints, points(&[(9.0, 1000)]));
    }

    #[tokio::test]
    async fn test_malformed_expression_yields_zeros_not_rejection() {
        let backend = Arc::new(StubBackend::new(points(&[(2.0, 1000)])));
        let (scheduler, _) = scheduler_with(vec![("graphite", backend as Arc<dyn Datasource>)]);

        let request = QueryRequest::new(
            TimeRange::last_hours(1),
            vec![
                Target::new("A", "graphite"),
                Target::new("C", "meta")
                    .query_type(QueryType::Arithmetic)
                    .expression("A +")
                    .output_name("broken"),
            ],
        );

        let response = scheduler.query(request).await.unwrap();
        let broken = response.data.iter().find(|s| s.name == "broken").unwrap();
        assert_eq!(broken.datapoints, points(&[(0.0, 1000)]));
    }

    #[tokio::test]
    async fn test_forward_reference_rejects_request() {
        let backend = Arc::new(StubBackend::new(points(&[(1.0, 1000)])));
        let (scheduler, _) = scheduler_with(vec![("graphite", backend as Arc<dyn Datasource>)]);

        // M depends on A, but meta targets group before A's backend group
        let request = QueryRequest::new(
            TimeRange::last_hours(1),
            vec![
                Target::new("M", "meta")
                    .query_type(QueryType::MovingAverage)
                    .periods(2)
                    .depends_on("A")
                    .output_name("avg "),
                Target::new("A", "graphite"),
            ],
        );

        let result = scheduler.query(request).await;
        assert!(matches!(
            result,
            Err(SchedulerError::DependencyOrder { target, dependency })
                if target == "M" && dependency == "A"
        ));
    }

    #[tokio::test]
    async fn test_unknown_datasource_rejects_request() {
        let (scheduler, _) = scheduler_with(vec![]);

        let request = QueryRequest::new(
            TimeRange::last_hours(1),
            vec![Target::new("A", "nonexistent")],
        );

        let result = scheduler.query(request).await;
        assert!(matches!(
            result,
            Err(SchedulerError::UnknownDatasource(name)) if name == "nonexistent"
        ));
    }

    #[tokio::test]
    async fn test_backend_rejection_aborts_request() {
        let (scheduler, _) =
            scheduler_with(vec![("broken", Arc::new(FailingBackend) as Arc<dyn Datasource>)]);

        let request = QueryRequest::new(
            TimeRange::last_hours(1),
            vec![Target::new("A", "broken")],
        );

        let result = scheduler.query(request).await;
        assert!(matches!(result, Err(SchedulerError::Backend { .. })));
    }

    #[tokio::test]
    async fn test_invalid_derived_target_rejects_request() {
        let backend = Arc::new(StubBackend::new(points(&[(1.0, 1000)])));
        let (scheduler, _) = scheduler_with(vec![("graphite", backend as Arc<dyn Datasource>)]);

        // MovingAverage without periods
        let request = QueryRequest::new(
            TimeRange::last_hours(1),
            vec![
                Target::new("A", "graphite"),
                Target::new("M", "meta")
                    .query_type(QueryType::MovingAverage)
                    .depends_on("A")
                    .output_name("avg "),
            ],
        );

        let result = scheduler.query(request).await;
        assert!(matches!(result, Err(SchedulerError::InvalidTarget { .. })));
    }

    #[tokio::test]
    async fn test_idempotent_responses() {
        let backend = Arc::new(StubBackend::new(points(&[(1.0, 1000), (2.0, 2000)])));
        let (scheduler, _) = scheduler_with(vec![("graphite", backend as Arc<dyn Datasource>)]);

        let request = QueryRequest::new(
            TimeRange::last_hours(1),
            vec![
                Target::new("A", "graphite"),
                Target::new("M", "meta")
                    .query_type(QueryType::MovingAverage)
                    .periods(2)
                    .depends_on("A")
                    .output_name("avg "),
                Target::new("C", "meta")
                    .query_type(QueryType::Arithmetic)
                    .expression("A + M")
                    .output_name("combined"),
            ],
        );

        let first = scheduler.query(request.clone()).await.unwrap();
        let second = scheduler.query(request).await.unwrap();

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_connection_always_succeeds() {
        let (scheduler, _) = scheduler_with(vec![]);
        let status = scheduler.test_connection().await;
        assert_eq!(status.status, "success");
    }

    #[test]
    fn test_partition_preserves_first_appearance_order() {
        let targets = vec![
            Target::new("A", "graphite"),
            Target::new("B", "prometheus"),
            Target::new("C", "graphite"),
        ];

        let groups = partition_targets(&targets);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "graphite");
        assert_eq!(groups[1].0, "prometheus");

        let first_group: Vec<&str> = groups[0].1.iter().map(|t| t.ref_id.as_str()).collect();
        assert_eq!(first_group, vec!["A", "C"]);
    }
}
