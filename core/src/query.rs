//! Listing and proximity queries, plus the page arithmetic on top of them.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::descriptor::IndexDescriptor;
use crate::error::QueryError;
use crate::store::DocumentStore;
use crate::{GeoPoint, Place};

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const DEFAULT_RECOMMEND_LIMIT: u64 = 3;

/// Store-agnostic query descriptor. [`SearchQuery::to_dsl`] renders it for Elasticsearch.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchQuery {
    /// Match-all window with an exact hit count.
    MatchAll { from: u64, size: u64 },
    /// Match-all sorted by ascending arc distance from `origin`.
    Nearest { origin: GeoPoint, limit: u64, geo_field: String },
}

impl SearchQuery {
    /// Zero-size match-all; only the total comes back.
    pub fn count() -> Self { SearchQuery::MatchAll { from: 0, size: 0 } }

    pub fn page(page: u64, page_size: u64) -> Self {
        SearchQuery::MatchAll { from: page.saturating_sub(1) * page_size, size: page_size }
    }

    pub fn to_dsl(&self) -> Value {
        match self {
            SearchQuery::MatchAll { from, size } => json!({
                "from": from,
                "size": size,
                "track_total_hits": true,
                "query": { "match_all": {} },
            }),
            SearchQuery::Nearest { origin, limit, geo_field } => json!({
                "size": limit,
                "track_total_hits": true,
                "query": { "match_all": {} },
                "sort": [{
                    "_script": {
                        "type": "number",
                        "script": {
                            "lang": "painless",
                            "source": format!("doc['{geo_field}'].arcDistance(params.lat, params.lon)"),
                            "params": { "lat": origin.lat, "lon": origin.lon },
                        },
                        "order": "asc",
                    }
                }],
            }),
        }
    }
}

pub fn last_page(total: u64, page_size: u64) -> u64 { total / page_size }

/// Serialized with the `PageData` keys (`Total`, `Places`, `HasPrev`, ...) existing clients read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PageResult {
    #[serde(skip)]
    pub page: u64,
    #[serde(skip)]
    pub page_size: u64,
    pub total: u64,
    pub places: Vec<Place>,
    pub has_prev: bool,
    pub prev_page: u64,
    pub has_next: bool,
    pub next_page: u64,
    pub last_page: u64,
    pub first_page: u64,
}

impl PageResult {
    pub fn new(page: u64, page_size: u64, total: u64, places: Vec<Place>) -> Self {
        let last = last_page(total, page_size);
        Self {
            page,
            page_size,
            total,
            places,
            has_prev: page > 1,
            prev_page: page.saturating_sub(1),
            has_next: page < last,
            next_page: page + 1,
            last_page: last,
            first_page: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub name: String,
    pub places: Vec<Place>,
    pub total: u64,
}

/// Parses a query-string coordinate. Range checks are left to the store.
pub fn parse_coordinate(param: &'static str, raw: &str) -> Result<f64, QueryError> {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(QueryError::InvalidCoordinate { param, value: raw.to_string() }),
    }
}

/// Read side over one index. Cheap to share; holds only the store handle.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn DocumentStore>,
    index: String,
    geo_field: String,
    page_size: u64,
    recommend_limit: u64,
}

impl QueryService {
    pub fn new(store: Arc<dyn DocumentStore>, descriptor: &IndexDescriptor) -> Self {
        Self {
            store,
            index: descriptor.name.clone(),
            geo_field: descriptor.geo_field.clone(),
            page_size: DEFAULT_PAGE_SIZE,
            recommend_limit: DEFAULT_RECOMMEND_LIMIT,
        }
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_recommend_limit(mut self, limit: u64) -> Self {
        self.recommend_limit = limit;
        self
    }

    pub fn page_size(&self) -> u64 { self.page_size }
    pub fn recommend_limit(&self) -> u64 { self.recommend_limit }
    pub fn index(&self) -> &str { &self.index }

    /// One page of places in store order.
    ///
    /// `page < 1` is rejected without touching the store. Otherwise the total is
    /// counted first so that a page past `last_page` is rejected before the
    /// window is fetched.
    pub async fn list_places(&self, page: i64, page_size: u64) -> Result<PageResult, QueryError> {
        if page_size == 0 {
            return Err(QueryError::InvalidPageSize(page_size));
        }
        if page < 1 {
            return Err(QueryError::InvalidPage { page, last_page: None });
        }
        let page_u = page as u64;

        let counted = self.store.search(&self.index, &SearchQuery::count()).await?;
        let last = last_page(counted.total, page_size);
        if page_u > last {
            tracing::debug!(page, last, total = counted.total, "page out of range");
            return Err(QueryError::InvalidPage { page, last_page: Some(last) });
        }

        let mut hits = self.store.search(&self.index, &SearchQuery::page(page_u, page_size)).await?;
        hits.places.truncate(page_size as usize);
        // metadata follows the count the range check used
        Ok(PageResult::new(page_u, page_size, counted.total, hits.places))
    }

    /// Nearest places to a point given as raw query-string values.
    pub async fn nearest_places(&self, lat: &str, lon: &str, limit: u64) -> Result<Recommendation, QueryError> {
        let origin = GeoPoint::new(parse_coordinate("lat", lat)?, parse_coordinate("lon", lon)?);
        self.nearest_to(origin, limit).await
    }

    pub async fn nearest_to(&self, origin: GeoPoint, limit: u64) -> Result<Recommendation, QueryError> {
        let query = SearchQuery::Nearest { origin, limit, geo_field: self.geo_field.clone() };
        let mut hits = self.store.search(&self.index, &query).await?;
        hits.places.truncate(limit as usize);
        Ok(Recommendation { name: "Recommendation".into(), places: hits.places, total: hits.total })
    }
}
