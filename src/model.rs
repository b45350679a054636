//! Core data types for the meta-query orchestration layer
//!
//! This module defines the wire-level model shared by the scheduler, the
//! transform engine, and the HTTP surface:
//! - `QueryRequest` / `QueryData`: panel-level request and response envelopes
//! - `Target`: one requested series specification, possibly derived
//! - `Series` and `DataPoint`: named, time-ordered measurement sequences
//! - `TimeRange`: the query window
//!
//! Field names follow the dashboard wire format (camelCase, datapoints as
//! `[value, timestamp]` pairs) so requests can be forwarded to backends
//! unchanged.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Milliseconds in one day, the unit of `periods` shifts.
pub const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Time window for a query (from inclusive, to exclusive)
///
/// Immutable per request: transforms that need a different window copy the
/// range and shift the copy, never the original held by other targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Window start
    pub from: DateTime<Utc>,
    /// Window end
    pub to: DateTime<Utc>,
}

impl TimeRange {
    /// Create a new time range
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// Create a range covering the last N hours from now
    pub fn last_hours(hours: i64) -> Self {
        let to = Utc::now();
        Self {
            from: to - Duration::hours(hours),
            to,
        }
    }

    /// Create a range covering the last N days from now
    pub fn last_days(days: i64) -> Self {
        Self::last_hours(days * 24)
    }

    /// A copy of this range shifted back by `days` (negative shifts forward)
    pub fn shifted_back(&self, days: i64) -> Self {
        let offset = Duration::days(days);
        Self {
            from: self.from - offset,
            to: self.to - offset,
        }
    }

    /// Duration of the window in milliseconds
    pub fn duration_millis(&self) -> i64 {
        self.to.timestamp_millis() - self.from.timestamp_millis()
    }
}

/// Kind of derived computation a target requests
///
/// Absent on plain backend targets; present only on targets addressed to the
/// meta datasource itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryType {
    /// Re-query the dependency over an earlier window, realigned for display
    TimeShift,
    /// Simple moving average over the dependency's datapoints
    MovingAverage,
    /// Formula over the values of all targets collected so far
    Arithmetic,
}

/// One requested series specification
///
/// `ref_id` is unique within a request and is how later targets address this
/// one. The transform-specific fields are optional on the wire and validated
/// by the scheduler when the matching `query_type` requires them. Unknown
/// fields are preserved in `extra` so backend-specific query parameters pass
/// through sub-requests untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    /// Identifier, unique within one request
    pub ref_id: String,
    /// Name of the backend that should answer this target
    pub datasource: String,
    /// Suppress from final output (still computable by dependents)
    #[serde(default, skip_serializing_if = "is_false")]
    pub hide: bool,
    /// Derived computation, absent for plain backend queries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_type: Option<QueryType>,
    /// Shift distance or window size in periods (days for TimeShift)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub periods: Option<i64>,
    /// refId of the target this one depends on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Series-name filter applied to the dependency's output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    /// Formula text for Arithmetic targets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    /// Name assigned to the produced series
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_metric_name: Option<String>,
    /// Backend-specific passthrough fields
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Target {
    /// Create a plain backend target
    pub fn new(ref_id: impl Into<String>, datasource: impl Into<String>) -> Self {
        Self {
            ref_id: ref_id.into(),
            datasource: datasource.into(),
            hide: false,
            query_type: None,
            periods: None,
            query: None,
            metric: None,
            expression: None,
            output_metric_name: None,
            extra: HashMap::new(),
        }
    }

    /// Builder: mark this target hidden
    pub fn hidden(mut self) -> Self {
        self.hide = true;
        self
    }

    /// Builder: set the derived query type
    pub fn query_type(mut self, query_type: QueryType) -> Self {
        self.query_type = Some(query_type);
        self
    }

    /// Builder: set the shift distance / window size
    pub fn periods(mut self, periods: i64) -> Self {
        self.periods = Some(periods);
        self
    }

    /// Builder: set the dependency refId
    pub fn depends_on(mut self, ref_id: impl Into<String>) -> Self {
        self.query = Some(ref_id.into());
        self
    }

    /// Builder: set the dependency series-name filter
    pub fn metric(mut self, metric: impl Into<String>) -> Self {
        self.metric = Some(metric.into());
        self
    }

    /// Builder: set the formula text
    pub fn expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    /// Builder: set the output series name
    pub fn output_name(mut self, name: impl Into<String>) -> Self {
        self.output_metric_name = Some(name.into());
        self
    }
}

/// A single measurement: `[value, timestampMillis]` on the wire
///
/// The value is `None` for gaps the backend reported explicitly. Points are
/// ordered by ascending timestamp as produced by the backend; every transform
/// preserves that order and none re-sorts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint(pub Option<f64>, pub i64);

impl DataPoint {
    /// Measured value, `None` for an explicit gap
    pub fn value(&self) -> Option<f64> {
        self.0
    }

    /// Unix timestamp in milliseconds
    pub fn timestamp(&self) -> i64 {
        self.1
    }
}

/// A named, time-ordered sequence of datapoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    /// Series name (`target` on the wire)
    #[serde(rename = "target")]
    pub name: String,
    /// Measurements, ascending by timestamp
    pub datapoints: Vec<DataPoint>,
    /// Suppress this series from the merged response
    #[serde(default, skip_serializing_if = "is_false")]
    pub hide: bool,
}

impl Series {
    /// Create a visible series
    pub fn new(name: impl Into<String>, datapoints: Vec<DataPoint>) -> Self {
        Self {
            name: name.into(),
            datapoints,
            hide: false,
        }
    }

    /// Builder: mark this series hidden
    pub fn hidden(mut self) -> Self {
        self.hide = true;
        self
    }
}

/// Panel-level query request
///
/// Unknown fields are preserved in `extra` and forwarded on every
/// sub-request, so backend-specific options (interval, maxDataPoints, ...)
/// survive the fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Query window, shared by all targets
    pub range: TimeRange,
    /// Requested targets, in display order
    pub targets: Vec<Target>,
    /// Passthrough fields
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl QueryRequest {
    /// Create a request over a range and target list
    pub fn new(range: TimeRange, targets: Vec<Target>) -> Self {
        Self {
            range,
            targets,
            extra: HashMap::new(),
        }
    }

    /// A copy of this request carrying only the given targets
    pub fn with_targets(&self, targets: Vec<Target>) -> Self {
        Self {
            range: self.range,
            targets,
            extra: self.extra.clone(),
        }
    }
}

/// Result envelope: what a backend returns and what the scheduler emits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryData {
    /// Resolved series, in dispatch order
    pub data: Vec<Series>,
}

impl QueryData {
    /// Wrap a series list
    pub fn new(data: Vec<Series>) -> Self {
        Self { data }
    }

    /// An empty result
    pub fn empty() -> Self {
        Self { data: Vec::new() }
    }
}
