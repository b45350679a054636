//! Transform strategies for derived targets
//!
//! Three stateless transforms, each a pure function over already-resolved
//! series data:
//!
//! - [`shift_series`]: realign a time-shifted backend result onto the
//!   original display window
//! - [`moving_average`]: simple moving average over a dependency's points
//! - [`arithmetic`]: evaluate a formula across all collected targets,
//!   aligned by exact timestamp
//!
//! Datapoint order is preserved throughout; no transform re-sorts what the
//! backend produced.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::expr::Expression;
use crate::model::{DataPoint, QueryData, Series, MILLIS_PER_DAY};
use crate::transform::ring::RingAverager;

/// Per-timestamp value table for arithmetic evaluation
///
/// Outer key: timestamp in milliseconds (ascending iteration order). Inner:
/// refId to the `(series name, value)` pairs that refId produced at that
/// instant, in series order. Null values never enter the table.
pub type ValueTable = BTreeMap<i64, HashMap<String, Vec<(String, f64)>>>;

/// Realign a time-shifted query result onto the display window
///
/// Keeps only series named `metric`, moves every timestamp forward by
/// `periods` days (the inverse of the window shift the scheduler applied
/// before re-querying), and emits a single series named `output_name`.
pub fn shift_series(
    data: &[Series],
    metric: &str,
    periods: i64,
    output_name: &str,
    hide: bool,
) -> Series {
    let offset = periods * MILLIS_PER_DAY;
    let mut datapoints = Vec::new();

    for series in data {
        if series.name != metric {
            continue;
        }
        for point in &series.datapoints {
            datapoints.push(DataPoint(point.value(), point.timestamp() + offset));
        }
    }

    Series {
        name: output_name.to_string(),
        datapoints,
        hide,
    }
}

/// Simple moving average over every series in a dependency's result
///
/// One output point per input point, at the same timestamp, averaging the
/// most recent up-to-`window` samples seen so far. Windows holding only
/// nulls produce a null point, never NaN. Each output series is named
/// `output_name` concatenated with the input series' own name, so a grouped
/// dependency yields one averaged series per group.
pub fn moving_average(data: &[Series], window: usize, output_name: &str, hide: bool) -> Vec<Series> {
    data.iter()
        .map(|series| {
            let mut ring = RingAverager::new(window);
            let datapoints = series
                .datapoints
                .iter()
                .map(|point| {
                    ring.push(point.value());
                    DataPoint(ring.average(), point.timestamp())
                })
                .collect();

            Series {
                name: format!("{}{}", output_name, series.name),
                datapoints,
                hide,
            }
        })
        .collect()
}

/// Evaluate a formula across all collected targets, aligned by timestamp
///
/// Builds the per-timestamp value table from every input's series, then
/// evaluates `expression` once per distinct timestamp with each refId bound
/// to its value at that instant. Per-point evaluation failures (unknown
/// variable, division by zero) fall back to 0 and are logged; a formula
/// that fails to parse yields 0 at every timestamp. Structural errors are
/// never raised from here.
pub fn arithmetic(
    inputs: &[(String, Arc<QueryData>)],
    expression: &str,
    output_name: &str,
    hide: bool,
) -> Series {
    let table = build_value_table(inputs);

    let compiled = match Expression::parse(expression) {
        Ok(expr) => Some(expr),
        Err(e) => {
            tracing::warn!(
                expression = %expression,
                error = %e,
                "arithmetic expression failed to parse, emitting zeros"
            );
            None
        }
    };

    let mut datapoints = Vec::with_capacity(table.len());
    for (timestamp, row) in &table {
        let value = match &compiled {
            Some(expr) => match expr.eval(&bindings_at(row)) {
                Ok(v) => v,
                Err(e) => {
                    tracing::debug!(
                        timestamp,
                        error = %e,
                        "arithmetic evaluation failed for one instant, using 0"
                    );
                    0.0
                }
            },
            None => 0.0,
        };
        datapoints.push(DataPoint(Some(value), *timestamp));
    }

    Series {
        name: output_name.to_string(),
        datapoints,
        hide,
    }
}

/// Build the per-timestamp value table from resolved target results
///
/// Pure function of its inputs: no shared accumulator survives across calls.
/// Alignment is exact integer-millisecond equality; a series whose points do
/// not share timestamps with the others simply contributes nothing at those
/// instants.
pub fn build_value_table(inputs: &[(String, Arc<QueryData>)]) -> ValueTable {
    let mut table = ValueTable::new();

    for (ref_id, result) in inputs {
        for series in &result.data {
            for point in &series.datapoints {
                let Some(value) = point.value() else {
                    continue;
                };
                table
                    .entry(point.timestamp())
                    .or_default()
                    .entry(ref_id.clone())
                    .or_default()
                    .push((series.name.clone(), value));
            }
        }
    }

    table
}

/// Scalar bindings for one instant: each refId bound to its first series'
/// value at that timestamp
fn bindings_at(row: &HashMap<String, Vec<(String, f64)>>) -> HashMap<String, f64> {
    row.iter()
        .filter_map(|(ref_id, values)| {
            values.first().map(|(_, value)| (ref_id.clone(), *value))
        })
        .collect()
}
