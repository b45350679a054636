//! Query Routes
//!
//! Endpoints for executing panel queries and probing the meta datasource.
//!
//! - POST /api/v1/query - Execute a panel query
//! - GET /api/v1/test - Connection test

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::model::{QueryData, QueryRequest};
use crate::scheduler::ConnectionStatus;

/// POST /api/v1/query
///
/// Partition the request's targets, fan out to backends and the transform
/// engine, and return the merged series list.
pub async fn execute_query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<Json<QueryData>> {
    if request.targets.is_empty() {
        return Err(ApiError::Validation("targets cannot be empty".to_string()));
    }

    let response = state.scheduler.query(request).await?;
    Ok(Json(response))
}

/// GET /api/v1/test
///
/// Connection test in the shape dashboard hosts expect. Always succeeds:
/// the meta layer has no backend of its own to probe.
pub async fn test_connection(
    State(state): State<Arc<AppState>>,
) -> Json<ConnectionStatus> {
    Json(state.scheduler.test_connection().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::state::ApiConfig;
    use crate::datasource::DatasourceRegistry;
    use crate::model::{Target, TimeRange};
    use crate::scheduler::QueryScheduler;

    fn test_state() -> Arc<AppState> {
        let registry = Arc::new(DatasourceRegistry::new());
        let scheduler = Arc::new(QueryScheduler::new("meta", Arc::clone(&registry)));
        Arc::new(AppState::new(scheduler, registry, ApiConfig::default()))
    }

    #[tokio::test]
    async fn test_empty_targets_rejected() {
        let state = test_state();
        let request = QueryRequest::new(TimeRange::last_hours(1), vec![]);

        let result = execute_query(State(state), Json(request)).await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn test_unknown_datasource_maps_to_scheduler_error() {
        let state = test_state();
        let request = QueryRequest::new(
            TimeRange::last_hours(1),
            vec![Target::new("A", "missing")],
        );

        let result = execute_query(State(state), Json(request)).await;
        assert!(matches!(result, Err(ApiError::Scheduler(_))));
    }

    #[tokio::test]
    async fn test_connection_payload() {
        let state = test_state();
        let Json(status) = test_connection(State(state)).await;
        assert_eq!(status.status, "success");
        assert_eq!(status.title, "Success");
    }
}
