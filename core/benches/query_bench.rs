use criterion::{black_box, criterion_group, criterion_main, Criterion};
use places_core::query::{PageResult, SearchQuery};
use places_core::GeoPoint;

fn bench_distance(c: &mut Criterion) {
    let origin = GeoPoint::new(55.751244, 37.618423);
    let points: Vec<GeoPoint> = (0..10_000).map(|i| GeoPoint::new(55.0 + (i % 100) as f64 * 0.01, 37.0 + (i / 100) as f64 * 0.01)).collect();
    c.bench_function("haversine_10k", |b| {
        b.iter(|| points.iter().map(|p| origin.distance_m(black_box(p))).sum::<f64>())
    });
}

fn bench_query_build(c: &mut Criterion) {
    c.bench_function("nearest_dsl", |b| {
        b.iter(|| {
            SearchQuery::Nearest { origin: GeoPoint::new(55.75, 37.61), limit: black_box(3), geo_field: "location".into() }.to_dsl()
        })
    });
    c.bench_function("page_result", |b| b.iter(|| PageResult::new(black_box(7), 10, black_box(13_649), Vec::new())));
}

criterion_group!(benches, bench_distance, bench_query_build);
criterion_main!(benches);
