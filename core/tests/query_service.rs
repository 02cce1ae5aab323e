use async_trait::async_trait;
use places_core::descriptor::{FieldMapping, IndexDescriptor, IndexSettings};
use places_core::query::{QueryService, SearchQuery};
use places_core::store::memory::{MemoryStore, StoreOp};
use places_core::store::{BulkDocument, DocumentStore, ItemResult, SearchHits};
use places_core::{GeoPoint, Place, QueryError, StoreError};
use std::sync::Arc;

fn place(id: i64, lat: f64, lon: f64) -> Place {
    Place { id, name: format!("p{id}"), address: format!("a{id}"), phone: String::new(), location: GeoPoint::new(lat, lon) }
}

fn service_with(places: &[Place]) -> (Arc<MemoryStore>, QueryService) {
    let store = Arc::new(MemoryStore::new());
    let descriptor = IndexDescriptor::places("places");
    store.seed(&descriptor, places);
    let dyn_store: Arc<dyn DocumentStore> = store.clone();
    (store, QueryService::new(dyn_store, &descriptor))
}

fn grid(n: i64) -> Vec<Place> {
    (1..=n).map(|i| place(i, (i % 90) as f64, (i % 180) as f64)).collect()
}

#[tokio::test]
async fn nearest_worked_example() {
    let (_, svc) = service_with(&[place(1, 10.0, 20.0), place(2, 10.001, 20.001), place(3, 50.0, 50.0)]);
    let rec = svc.nearest_places("10", "20", 2).await.unwrap();
    let ids: Vec<i64> = rec.places.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(rec.total, 3);
    assert_eq!(rec.name, "Recommendation");
}

#[tokio::test]
async fn nearest_is_bounded_and_monotonic() {
    let (_, svc) = service_with(&grid(200));
    let origin = GeoPoint::new(33.3, 44.4);
    for limit in [0u64, 1, 3, 17, 500] {
        let rec = svc.nearest_to(origin, limit).await.unwrap();
        assert!(rec.places.len() as u64 <= limit);
        let d: Vec<f64> = rec.places.iter().map(|p| origin.distance_m(&p.location)).collect();
        assert!(d.windows(2).all(|w| w[0] <= w[1]), "limit {limit}");
    }
}

#[tokio::test]
async fn nearest_rejects_unparseable_coordinates() {
    let (store, svc) = service_with(&grid(5));
    assert!(matches!(svc.nearest_places("x", "20", 3).await, Err(QueryError::InvalidCoordinate { param: "lat", .. })));
    assert!(matches!(svc.nearest_places("10", "", 3).await, Err(QueryError::InvalidCoordinate { param: "lon", .. })));
    assert_eq!(store.call_count(StoreOp::Search), 0);
}

#[tokio::test]
async fn pages_hold_page_size_items() {
    let page_size = 10;
    let (_, svc) = service_with(&grid(35));
    // last_page = 35 / 10 = 3
    for page in 1..=3 {
        let res = svc.list_places(page, page_size).await.unwrap();
        assert_eq!(res.places.len(), 10, "page {page}");
        assert_eq!(res.total, 35);
        assert_eq!(res.last_page, 3);
        assert_eq!(res.has_prev, page > 1);
        assert_eq!(res.has_next, page < 3);
    }
    let ids: Vec<i64> = svc.list_places(2, page_size).await.unwrap().places.iter().map(|p| p.id).collect();
    let page1: Vec<i64> = svc.list_places(1, page_size).await.unwrap().places.iter().map(|p| p.id).collect();
    assert!(ids.iter().all(|id| !page1.contains(id)));
}

#[tokio::test]
async fn last_page_matches_floor_division_for_every_total() {
    let page_size = 4u64;
    for total in 0..=(10 * page_size as i64) {
        let (_, svc) = service_with(&grid(total));
        let expected_last = total as u64 / page_size;
        if expected_last == 0 {
            assert!(matches!(svc.list_places(1, page_size).await, Err(QueryError::InvalidPage { last_page: Some(0), .. })));
            continue;
        }
        let res = svc.list_places(expected_last as i64, page_size).await.unwrap();
        assert_eq!(res.last_page, expected_last, "total {total}");
        assert_eq!(res.places.len() as u64, page_size, "total {total}");
        assert!(!res.has_next);
    }
}

#[tokio::test]
async fn invalid_pages_never_fetch_a_window() {
    let (store, svc) = service_with(&grid(30));

    for page in [0, -1, i64::MIN] {
        assert!(matches!(svc.list_places(page, 10).await, Err(QueryError::InvalidPage { last_page: None, .. })));
    }
    assert_eq!(store.call_count(StoreOp::Search), 0);

    match svc.list_places(4, 10).await {
        Err(QueryError::InvalidPage { page: 4, last_page: Some(3) }) => {}
        other => panic!("unexpected {other:?}"),
    }
    // only the count ran
    assert_eq!(store.call_count(StoreOp::Search), 1);

    assert!(matches!(svc.list_places(1, 0).await, Err(QueryError::InvalidPageSize(0))));
}

#[tokio::test]
async fn store_failures_are_not_client_errors() {
    let (store, svc) = service_with(&grid(30));
    store.fail_op(StoreOp::Search);
    let err = svc.list_places(1, 10).await.unwrap_err();
    assert!(!err.is_client_error());
    let err = svc.nearest_places("1", "2", 3).await.unwrap_err();
    assert!(matches!(err, QueryError::Store(_)));
}

#[tokio::test]
async fn missing_index_is_a_store_error() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let svc = QueryService::new(store, &IndexDescriptor::places("places"));
    assert!(matches!(svc.list_places(1, 10).await, Err(QueryError::Store(_))));
}

/// Re-seeds the index with `after` right after the first count query answers.
struct ChangesAfterCount {
    inner: MemoryStore,
    descriptor: IndexDescriptor,
    after: Vec<Place>,
}

#[async_trait]
impl DocumentStore for ChangesAfterCount {
    async fn ping(&self) -> Result<(), StoreError> { self.inner.ping().await }
    async fn index_exists(&self, index: &str) -> Result<bool, StoreError> { self.inner.index_exists(index).await }
    async fn delete_index(&self, index: &str) -> Result<(), StoreError> { self.inner.delete_index(index).await }
    async fn create_index(&self, index: &str, settings: &IndexSettings) -> Result<(), StoreError> {
        self.inner.create_index(index, settings).await
    }
    async fn put_mapping(&self, index: &str, mapping: &FieldMapping) -> Result<(), StoreError> {
        self.inner.put_mapping(index, mapping).await
    }
    async fn bulk_write(&self, index: &str, docs: &[BulkDocument]) -> Result<Vec<ItemResult>, StoreError> {
        self.inner.bulk_write(index, docs).await
    }
    async fn search(&self, index: &str, query: &SearchQuery) -> Result<SearchHits, StoreError> {
        let hits = self.inner.search(index, query).await?;
        if *query == SearchQuery::count() {
            self.inner.seed(&self.descriptor, &self.after);
        }
        Ok(hits)
    }
}

#[tokio::test]
async fn page_metadata_follows_the_checked_count() {
    let descriptor = IndexDescriptor::places("places");
    let inner = MemoryStore::new();
    inner.seed(&descriptor, &grid(20));
    let store: Arc<dyn DocumentStore> = Arc::new(ChangesAfterCount { inner, descriptor: descriptor.clone(), after: grid(45) });
    let svc = QueryService::new(store, &descriptor);

    let res = svc.list_places(2, 10).await.unwrap();
    assert_eq!(res.total, 20);
    assert_eq!(res.last_page, 2);
    assert!(!res.has_next);
    assert_eq!(res.places.len(), 10);
}
