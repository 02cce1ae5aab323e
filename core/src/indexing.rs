//! Full re-index of one collection: reset the index, stream every record
//! through the [`BulkIndexer`], report.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::bulk::{BulkError, BulkIndexer, BulkItem};
use crate::cancel::CancelToken;
use crate::config::BulkConfig;
use crate::descriptor::IndexDescriptor;
use crate::error::{IndexingError, ResetError, ResetStep};
use crate::store::DocumentStore;
use crate::Place;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    /// Finished, but some documents were rejected.
    Degraded,
    /// Stopped before every record was written; see `discarded`.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexingReport {
    pub index: String,
    pub records: u64,
    pub flushed: u64,
    pub failed: u64,
    pub discarded: u64,
    pub requests: u64,
    pub elapsed: Duration,
    pub outcome: Outcome,
}

impl IndexingReport {
    pub fn docs_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 { 0.0 } else { self.flushed as f64 / secs }
    }
}

impl fmt::Display for IndexingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let took = Duration::from_millis(self.elapsed.as_millis() as u64);
        let rate = comma(self.docs_per_sec() as u64);
        match self.outcome {
            Outcome::Completed => write!(f, "Successfully indexed [{}] documents in {took:?} ({rate} docs/sec)", comma(self.flushed)),
            Outcome::Degraded => write!(
                f,
                "Indexed [{}] documents with [{}] errors in {took:?} ({rate} docs/sec)",
                comma(self.flushed),
                comma(self.failed)
            ),
            Outcome::Cancelled => write!(
                f,
                "Cancelled after indexing [{}] documents with [{}] errors, [{}] discarded, in {took:?}",
                comma(self.flushed),
                comma(self.failed),
                comma(self.discarded)
            ),
        }
    }
}

fn comma(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub struct Indexer {
    store: Arc<dyn DocumentStore>,
    config: BulkConfig,
}

impl Indexer {
    pub fn new(store: Arc<dyn DocumentStore>, config: BulkConfig) -> Self { Self { store, config } }

    /// Delete-if-exists, create with settings, apply mapping. Strictly in that order.
    pub async fn reset_index(&self, descriptor: &IndexDescriptor, cancel: &CancelToken) -> Result<(), IndexingError> {
        let name = descriptor.name.as_str();
        let fail = |step, source| ResetError { index: name.to_string(), step, source };

        let exists = self.store.index_exists(name).await.map_err(|e| fail(ResetStep::Exists, e))?;
        if exists {
            check(cancel)?;
            self.store.delete_index(name).await.map_err(|e| fail(ResetStep::Delete, e))?;
            tracing::info!(index = name, "deleted index");
        }
        check(cancel)?;
        self.store.create_index(name, &descriptor.settings).await.map_err(|e| fail(ResetStep::Create, e))?;
        tracing::info!(index = name, shards = descriptor.settings.shards, replicas = descriptor.settings.replicas, "created index");
        check(cancel)?;
        self.store.put_mapping(name, &descriptor.mapping).await.map_err(|e| fail(ResetStep::Mapping, e))?;
        tracing::info!(index = name, fields = descriptor.mapping.fields.len(), "applied mapping");
        Ok(())
    }

    /// Re-creates the index and loads `records` into it.
    ///
    /// Structural failures (reset, serialization) abort with an error; rejected
    /// documents only show up in the report.
    pub async fn run(&self, descriptor: &IndexDescriptor, records: &[Place], cancel: CancelToken) -> Result<IndexingReport, IndexingError> {
        descriptor.validate()?;
        self.config.validate()?;
        check(&cancel)?;
        self.reset_index(descriptor, &cancel).await?;

        let start = Instant::now();
        let bi = BulkIndexer::new(self.store.clone(), &descriptor.name, &self.config, cancel.clone());
        tracing::info!(index = %descriptor.name, records = records.len(), workers = self.config.workers, flush_bytes = self.config.flush_bytes, "loading documents");

        for place in records {
            let body = match serde_json::to_vec(place) {
                Ok(body) => body,
                Err(source) => {
                    bi.close().await;
                    return Err(IndexingError::Serialize { id: place.id, source });
                }
            };
            match bi.add(BulkItem::new(place.doc_id(), body)).await {
                Ok(()) => {}
                Err(BulkError::Cancelled) | Err(BulkError::Closed) => break,
            }
        }

        let stats = bi.close().await;
        let records = records.len() as u64;
        let outcome = if cancel.is_cancelled() && stats.num_flushed + stats.num_failed < records {
            Outcome::Cancelled
        } else if stats.num_failed > 0 {
            Outcome::Degraded
        } else {
            Outcome::Completed
        };
        let report = IndexingReport {
            index: descriptor.name.clone(),
            records,
            flushed: stats.num_flushed,
            failed: stats.num_failed,
            discarded: records.saturating_sub(stats.num_flushed + stats.num_failed),
            requests: stats.num_requests,
            elapsed: start.elapsed(),
            outcome,
        };
        match report.outcome {
            Outcome::Completed => tracing::info!(flushed = report.flushed, requests = report.requests, "{report}"),
            _ => tracing::warn!(flushed = report.flushed, failed = report.failed, discarded = report.discarded, "{report}"),
        }
        Ok(report)
    }
}

fn check(cancel: &CancelToken) -> Result<(), IndexingError> {
    if cancel.is_cancelled() { Err(IndexingError::Cancelled) } else { Ok(()) }
}
