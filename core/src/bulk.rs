//! Concurrent bulk writer.
//!
//! A fixed pool of tokio tasks pulls [`BulkItem`]s from one bounded queue.
//! Each worker owns a batch and flushes it when its payload bytes reach
//! `flush_bytes` or when `flush_interval` has passed since its last flush.
//! Every item ends in exactly one of its two continuations, and in exactly one
//! of the `flushed`/`failed` counters, unless the run is cancelled first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::cancel::CancelToken;
use crate::config::BulkConfig;
use crate::error::WriteError;
use crate::store::{BulkDocument, DocumentStore, ItemResult};

const QUEUE_DEPTH_PER_WORKER: usize = 64;

pub type OnSuccess = Box<dyn FnOnce(&str) + Send>;
pub type OnFailure = Box<dyn FnOnce(&str, &WriteError) + Send>;

pub struct BulkItem {
    pub id: String,
    pub body: Vec<u8>,
    on_success: Option<OnSuccess>,
    on_failure: Option<OnFailure>,
}

impl BulkItem {
    pub fn new(id: impl Into<String>, body: Vec<u8>) -> Self {
        Self { id: id.into(), body, on_success: None, on_failure: None }
    }

    pub fn on_success<F: FnOnce(&str) + Send + 'static>(mut self, f: F) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_failure<F: FnOnce(&str, &WriteError) + Send + 'static>(mut self, f: F) -> Self {
        self.on_failure = Some(Box::new(f));
        self
    }

    fn split(self) -> (BulkDocument, Continuation) {
        (BulkDocument { id: self.id, body: self.body }, Continuation { ok: self.on_success, err: self.on_failure })
    }
}

struct Continuation {
    ok: Option<OnSuccess>,
    err: Option<OnFailure>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BulkError {
    #[error("bulk indexer cancelled")]
    Cancelled,
    #[error("bulk indexer closed")]
    Closed,
}

#[derive(Debug, Default)]
struct BulkStats {
    added: AtomicU64,
    flushed: AtomicU64,
    failed: AtomicU64,
    requests: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub num_added: u64,
    pub num_flushed: u64,
    pub num_failed: u64,
    pub num_requests: u64,
}

impl BulkStats {
    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            num_added: self.added.load(Ordering::Acquire),
            num_flushed: self.flushed.load(Ordering::Acquire),
            num_failed: self.failed.load(Ordering::Acquire),
            num_requests: self.requests.load(Ordering::Acquire),
        }
    }
}

#[derive(Default)]
struct BulkBatch {
    items: Vec<BulkItem>,
    bytes: usize,
}

impl BulkBatch {
    fn push(&mut self, item: BulkItem) {
        self.bytes += item.body.len();
        self.items.push(item);
    }

    fn take(&mut self) -> Vec<BulkItem> {
        self.bytes = 0;
        std::mem::take(&mut self.items)
    }
}

pub struct BulkIndexer {
    queue: mpsc::Sender<BulkItem>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<BulkStats>,
    cancel: CancelToken,
}

impl BulkIndexer {
    /// Spawns `config.workers` tasks writing into `index`. Must be called inside a tokio runtime.
    pub fn new(store: Arc<dyn DocumentStore>, index: &str, config: &BulkConfig, cancel: CancelToken) -> Self {
        let workers = config.workers.max(1);
        let (tx, rx) = mpsc::channel(workers * QUEUE_DEPTH_PER_WORKER);
        let rx = Arc::new(Mutex::new(rx));
        let stats = Arc::new(BulkStats::default());
        let index: Arc<str> = Arc::from(index);

        let handles = (0..workers)
            .map(|n| {
                let w = Worker {
                    id: n,
                    store: store.clone(),
                    index: index.clone(),
                    queue: rx.clone(),
                    stats: stats.clone(),
                    flush_bytes: config.flush_bytes,
                };
                tokio::spawn(w.run(config.flush_interval, cancel.clone()))
            })
            .collect();

        Self { queue: tx, workers: handles, stats, cancel }
    }

    /// Queues one item, waiting for room when every worker is busy.
    pub async fn add(&self, item: BulkItem) -> Result<(), BulkError> {
        let mut cancel = self.cancel.clone();
        if cancel.is_cancelled() {
            return Err(BulkError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BulkError::Cancelled),
            sent = self.queue.send(item) => {
                sent.map_err(|_| BulkError::Closed)?;
                self.stats.added.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
        }
    }

    pub fn stats(&self) -> StatsSnapshot { self.stats.snapshot() }

    /// Signals end of input and waits for every worker to flush and exit.
    pub async fn close(self) -> StatsSnapshot {
        drop(self.queue);
        for handle in self.workers {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "bulk worker panicked");
            }
        }
        self.stats.snapshot()
    }
}

struct Worker {
    id: usize,
    store: Arc<dyn DocumentStore>,
    index: Arc<str>,
    queue: Arc<Mutex<mpsc::Receiver<BulkItem>>>,
    stats: Arc<BulkStats>,
    flush_bytes: usize,
}

impl Worker {
    async fn run(self, flush_interval: std::time::Duration, mut cancel: CancelToken) {
        let mut batch = BulkBatch::default();
        let mut ticker = interval_at(Instant::now() + flush_interval, flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    if !batch.items.is_empty() {
                        tracing::warn!(worker = self.id, discarded = batch.items.len(), "cancelled with unflushed documents");
                    }
                    break;
                }
                next = self.next_item() => match next {
                    Some(item) => {
                        batch.push(item);
                        if batch.bytes >= self.flush_bytes {
                            self.flush(&mut batch).await;
                            ticker.reset();
                        }
                    }
                    None => {
                        self.flush(&mut batch).await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.flush(&mut batch).await;
                }
            }
        }
        tracing::debug!(worker = self.id, "bulk worker finished");
    }

    async fn next_item(&self) -> Option<BulkItem> {
        self.queue.lock().await.recv().await
    }

    async fn flush(&self, batch: &mut BulkBatch) {
        if batch.items.is_empty() {
            return;
        }
        let bytes = batch.bytes;
        let (docs, conts): (Vec<BulkDocument>, Vec<Continuation>) = batch.take().into_iter().map(BulkItem::split).unzip();
        self.stats.requests.fetch_add(1, Ordering::AcqRel);
        let start = Instant::now();

        let results: Vec<Option<ItemResult>> = match self.store.bulk_write(&self.index, &docs).await {
            Ok(results) => results.into_iter().map(Some).collect(),
            Err(e) => {
                tracing::warn!(worker = self.id, items = docs.len(), error = %e, "bulk request failed");
                let err = WriteError::new("request_failed", e.to_string());
                vec![Some(Err(err)); docs.len()]
            }
        };
        let mut results = results.into_iter();
        for (doc, cont) in docs.iter().zip(conts) {
            let result = results
                .next()
                .flatten()
                .unwrap_or_else(|| Err(WriteError::new("missing_item", "no result returned for this document")));
            self.complete(&doc.id, cont, result);
        }
        tracing::debug!(worker = self.id, items = docs.len(), bytes, took_ms = start.elapsed().as_millis() as u64, "flushed batch");
    }

    fn complete(&self, id: &str, cont: Continuation, result: ItemResult) {
        match result {
            Ok(()) => {
                self.stats.flushed.fetch_add(1, Ordering::AcqRel);
                if let Some(f) = cont.ok {
                    f(id);
                }
            }
            Err(e) => {
                tracing::warn!(id, kind = %e.kind, reason = %e.reason, "document failed");
                self.stats.failed.fetch_add(1, Ordering::AcqRel);
                if let Some(f) = cont.err {
                    f(id, &e);
                }
            }
        }
    }
}
