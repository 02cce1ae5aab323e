//! Elasticsearch REST client.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, StatusCode, Url};
use serde::Deserialize;

use super::{BulkDocument, DocumentStore, ItemResult, SearchHits};
use crate::config::StoreConfig;
use crate::descriptor::{FieldMapping, IndexSettings};
use crate::error::{StoreError, WriteError};
use crate::query::SearchQuery;
use crate::Place;

#[derive(Clone)]
pub struct ElasticStore {
    client: Client,
    base: Url,
}

impl ElasticStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .user_agent(concat!("places/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;
        let mut base = config.url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { client, base })
    }

    fn url(&self, path: &str) -> Result<Url, StoreError> {
        self.base.join(path).map_err(|e| StoreError::Decode(format!("bad url path '{path}': {e}")))
    }

    async fn send(&self, req: RequestBuilder) -> Result<(StatusCode, Vec<u8>), StoreError> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?.to_vec();
        Ok((status, body))
    }

    /// Sends `req` and maps non-2xx answers to errors; 404 means the index is gone.
    async fn send_ok(&self, index: &str, req: RequestBuilder) -> Result<Vec<u8>, StoreError> {
        let (status, body) = self.send(req).await?;
        if status.is_success() {
            return Ok(body);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::IndexNotFound(index.to_string()));
        }
        Err(StoreError::Status { status: status.as_u16(), body: String::from_utf8_lossy(&body).into_owned() })
    }
}

#[async_trait]
impl DocumentStore for ElasticStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let req = self.client.get(self.url("")?);
        self.send_ok("", req).await.map(|_| ())
    }

    async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        let (status, body) = self.send(self.client.head(self.url(index)?)).await?;
        match status {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            other => Err(StoreError::Status { status: other.as_u16(), body: String::from_utf8_lossy(&body).into_owned() }),
        }
    }

    async fn delete_index(&self, index: &str) -> Result<(), StoreError> {
        let req = self.client.delete(self.url(index)?);
        self.send_ok(index, req).await.map(|_| ())
    }

    async fn create_index(&self, index: &str, settings: &IndexSettings) -> Result<(), StoreError> {
        let req = self.client.put(self.url(index)?).json(&settings.to_json());
        self.send_ok(index, req).await.map(|_| ())
    }

    async fn put_mapping(&self, index: &str, mapping: &FieldMapping) -> Result<(), StoreError> {
        let req = self.client.put(self.url(&format!("{index}/_mapping"))?).json(&mapping.to_json());
        self.send_ok(index, req).await.map(|_| ())
    }

    async fn bulk_write(&self, index: &str, docs: &[BulkDocument]) -> Result<Vec<ItemResult>, StoreError> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let req = self
            .client
            .post(self.url(&format!("{index}/_bulk"))?)
            .header(header::CONTENT_TYPE, "application/x-ndjson")
            .body(encode_bulk(docs));
        let body = self.send_ok(index, req).await?;
        decode_bulk(&body, docs.len())
    }

    async fn search(&self, index: &str, query: &SearchQuery) -> Result<SearchHits, StoreError> {
        let req = self.client.post(self.url(&format!("{index}/_search"))?).json(&query.to_dsl());
        let body = self.send_ok(index, req).await?;
        decode_search(&body)
    }
}

/// NDJSON body: an `index` action line followed by the document, per item.
pub(crate) fn encode_bulk(docs: &[BulkDocument]) -> Vec<u8> {
    let mut out = Vec::with_capacity(docs.iter().map(|d| d.body.len() + d.id.len() + 24).sum());
    for doc in docs {
        let action = serde_json::json!({ "index": { "_id": doc.id } });
        out.extend_from_slice(action.to_string().as_bytes());
        out.push(b'\n');
        out.extend_from_slice(&doc.body);
        out.push(b'\n');
    }
    out
}

#[derive(Deserialize)]
struct BulkResponse {
    items: Vec<HashMap<String, BulkItemResponse>>,
}

#[derive(Deserialize)]
struct BulkItemResponse {
    status: u16,
    error: Option<BulkItemError>,
}

#[derive(Deserialize)]
struct BulkItemError {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    reason: String,
}

/// One result per submitted document. Items the store did not answer for count as failed.
pub(crate) fn decode_bulk(body: &[u8], expected: usize) -> Result<Vec<ItemResult>, StoreError> {
    let resp: BulkResponse = serde_json::from_slice(body).map_err(|e| StoreError::Decode(format!("bulk response: {e}")))?;
    let mut results: Vec<ItemResult> = resp
        .items
        .into_iter()
        .take(expected)
        .map(|item| {
            let Some((_, r)) = item.into_iter().next() else {
                return Err(WriteError::new("empty_item", "bulk item carried no action result"));
            };
            match r.error {
                Some(e) => Err(WriteError::new(e.kind, e.reason)),
                None if (200..300).contains(&r.status) => Ok(()),
                None => Err(WriteError::new("http_status", format!("status {}", r.status))),
            }
        })
        .collect();
    while results.len() < expected {
        results.push(Err(WriteError::new("missing_item", "no result returned for this document")));
    }
    Ok(results)
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    total: TotalHits,
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct TotalHits {
    value: u64,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: Place,
}

pub(crate) fn decode_search(body: &[u8]) -> Result<SearchHits, StoreError> {
    let resp: SearchResponse = serde_json::from_slice(body).map_err(|e| StoreError::Decode(format!("search response: {e}")))?;
    Ok(SearchHits { total: resp.hits.total.value, places: resp.hits.hits.into_iter().map(|h| h.source).collect() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn bulk_body_is_ndjson() {
        let docs = vec![
            BulkDocument { id: "1".into(), body: br#"{"id":1}"#.to_vec() },
            BulkDocument { id: "2".into(), body: br#"{"id":2}"#.to_vec() },
        ];
        let body = String::from_utf8(encode_bulk(&docs)).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], r#"{"index":{"_id":"1"}}"#);
        assert_eq!(lines[1], r#"{"id":1}"#);
        assert!(body.ends_with('\n'));
    }

    #[test]
    fn bulk_response_per_item() {
        let body = br#"{"took":3,"errors":true,"items":[
            {"index":{"_id":"1","status":201,"result":"created"}},
            {"index":{"_id":"2","status":400,"error":{"type":"mapper_parsing_exception","reason":"failed to parse field [location]"}}}
        ]}"#;
        let results = decode_bulk(body, 3).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        let e = results[1].as_ref().unwrap_err();
        assert_eq!(e.kind, "mapper_parsing_exception");
        assert!(e.reason.contains("location"));
        assert_eq!(results[2].as_ref().unwrap_err().kind, "missing_item");
    }

    #[test]
    fn search_response_is_typed() {
        let body = br#"{"took":1,"hits":{"total":{"value":13649,"relation":"eq"},"hits":[
            {"_index":"places","_id":"1","_source":{"id":1,"name":"SMETANA","address":"a","phone":"p","location":{"lat":55.87,"lon":37.71}}}
        ]}}"#;
        let hits = decode_search(body).unwrap();
        assert_eq!(hits.total, 13649);
        assert_eq!(hits.places[0].name, "SMETANA");
    }

    #[test]
    fn search_shape_mismatch_is_an_error() {
        assert!(matches!(decode_search(br#"{"hits":{"hits":[]}}"#), Err(StoreError::Decode(_))));
        let wrong_type = br#"{"hits":{"total":{"value":1},"hits":[{"_source":{"id":"x"}}]}}"#;
        assert!(matches!(decode_search(wrong_type), Err(StoreError::Decode(_))));
    }

    #[test]
    fn base_url_keeps_path_prefix() {
        let cfg = StoreConfig::new("http://localhost:9200/es", "places", Duration::from_secs(1)).unwrap();
        let store = ElasticStore::new(&cfg).unwrap();
        assert_eq!(store.url("places/_search").unwrap().as_str(), "http://localhost:9200/es/places/_search");
    }
}
