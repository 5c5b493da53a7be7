use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use pgquery::{Condition, Filter, Pagination, SelectBuilder, Statement};

/// SELECT col0, col1, ... FROM t WHERE "col0" = $1 AND "col1" = $2 ...
fn build_select(n: usize) -> SelectBuilder {
    let mut q = SelectBuilder::new("t");
    q.select((0..n).map(|i| format!("col{i}")));
    let filter: Filter = (0..n)
        .map(|i| (format!("col{i}"), Condition::eq(i as i64)))
        .collect();
    q.where_and(filter);
    q
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_builder/build");

    for n in [1, 5, 10, 50, 100] {
        let q = build_select(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &q, |b, q| {
            b.iter(|| black_box(q.build()));
        });
    }

    group.finish();
}

fn bench_construct_and_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_builder/construct_and_build");

    for n in [1, 5, 10, 50, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| black_box(build_select(n).build()));
        });
    }

    group.finish();
}

fn bench_in_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_builder/in_list");

    for n in [5, 20, 100, 500] {
        let values: Vec<i64> = (0..n).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &values, |b, values| {
            b.iter(|| {
                let mut q = SelectBuilder::new("t");
                q.where_and([("id", Condition::in_list(values.clone()))]);
                black_box(q.build())
            });
        });
    }

    group.finish();
}

fn bench_cte_splice(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_builder/cte_splice");

    for n in [1, 10, 50] {
        let sub = build_select(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &sub, |b, sub| {
            b.iter(|| {
                let mut q = SelectBuilder::new("outer_t");
                q.where_and([("status", Condition::eq("active"))])
                    .with_cte("inner_t", sub);
                black_box(q.build())
            });
        });
    }

    group.finish();
}

fn bench_paginate(c: &mut Criterion) {
    let page = Pagination::new(3, 25).sort("created_at", -1);
    c.bench_function("select_builder/paginate", |b| {
        b.iter(|| {
            let mut q = build_select(10);
            q.paginate(&page);
            black_box(q.build())
        });
    });
}

criterion_group!(
    benches,
    bench_build,
    bench_construct_and_build,
    bench_in_list,
    bench_cte_splice,
    bench_paginate
);
criterion_main!(benches);
