use criterion::{criterion_group, criterion_main, Criterion};
use chrono::NaiveDate;
use oura_cache::db::CacheStore;
use oura_cache::models::{DailyReadiness, EntityType};
use oura_cache::services::validation::validate_page;
use oura_cache::time_utils::SystemClock;
use serde_json::{json, Value};
use std::hint::black_box;
use std::sync::Arc;

fn readiness_page(days: u32) -> Value {
    let data: Vec<Value> = (1..=days)
        .map(|d| {
            let day = format!("2026-01-{d:02}");
            json!({
                "id": format!("readiness-{day}"),
                "day": day,
                "score": 80,
                "temperature_deviation": -0.1,
                "timestamp": format!("{day}T00:00:00+00:00"),
                "contributors": { "hrv_balance": 75, "sleep_balance": 82 }
            })
        })
        .collect();
    json!({ "data": data, "next_token": null })
}

fn benchmark_validation(c: &mut Criterion) {
    let body = readiness_page(30);

    c.bench_function("validate_readiness_page_30", |b| {
        b.iter(|| validate_page::<DailyReadiness>(black_box(&body)).expect("valid page"))
    });
}

fn benchmark_cache_store(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = CacheStore::open(dir.path(), Arc::new(SystemClock)).expect("Failed to open store");
    let records = validate_page::<DailyReadiness>(&readiness_page(30))
        .expect("valid page")
        .data;
    store.set_many(&records, 24).expect("Failed to seed cache");

    let start = NaiveDate::from_ymd_opt(2026, 1, 1).expect("valid date");
    let end = NaiveDate::from_ymd_opt(2026, 1, 30).expect("valid date");

    let mut group = c.benchmark_group("cache_store");

    group.bench_function("get_single_day", |b| {
        b.iter(|| store.get(EntityType::Readiness, black_box("2026-01-15")))
    });

    group.bench_function("get_range_30_days", |b| {
        b.iter(|| store.get_range(EntityType::Readiness, black_box(start), black_box(end)))
    });

    group.bench_function("set_many_30", |b| {
        b.iter(|| store.set_many(black_box(&records), 24))
    });

    group.finish();
}

criterion_group!(benches, benchmark_validation, benchmark_cache_store);
criterion_main!(benches);
