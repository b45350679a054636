//! Benchmarks for the metaquery transform engine
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use metaquery::expr::Expression;
use metaquery::model::{DataPoint, QueryData, Series};
use metaquery::transform::{arithmetic, build_value_table, moving_average};
use std::collections::HashMap;
use std::sync::Arc;

fn create_test_series(name: &str, count: usize) -> Series {
    let datapoints = (0..count)
        .map(|i| DataPoint(Some(i as f64), i as i64 * 1000))
        .collect();
    Series::new(name, datapoints)
}

fn bench_moving_average(c: &mut Criterion) {
    let mut group = c.benchmark_group("moving_average");

    for size in [100, 1000, 10000] {
        let data = vec![create_test_series("cpu", size)];

        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(format!("window_10_{}", size), |b| {
            b.iter(|| moving_average(black_box(&data), 10, "avg ", false))
        });
    }

    group.finish();
}

fn bench_arithmetic(c: &mut Criterion) {
    let mut group = c.benchmark_group("arithmetic");

    for size in [100, 1000, 10000] {
        let inputs = vec![
            (
                "A".to_string(),
                Arc::new(QueryData::new(vec![create_test_series("a", size)])),
            ),
            (
                "B".to_string(),
                Arc::new(QueryData::new(vec![create_test_series("b", size)])),
            ),
        ];

        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(format!("value_table_{}", size), |b| {
            b.iter(|| build_value_table(black_box(&inputs)))
        });

        group.bench_function(format!("evaluate_{}", size), |b| {
            b.iter(|| arithmetic(black_box(&inputs), "(A + B) / 2", "combined", false))
        });
    }

    group.finish();
}

fn bench_expression(c: &mut Criterion) {
    let mut group = c.benchmark_group("expression");

    group.bench_function("parse", |b| {
        b.iter(|| Expression::parse(black_box("(A - B) * 100 / B")).unwrap())
    });

    group.bench_function("eval", |b| {
        let expr = Expression::parse("(A - B) * 100 / B").unwrap();
        let mut vars = HashMap::new();
        vars.insert("A".to_string(), 42.0);
        vars.insert("B".to_string(), 7.0);

        b.iter(|| expr.eval(black_box(&vars)).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_moving_average, bench_arithmetic, bench_expression);
criterion_main!(benches);
