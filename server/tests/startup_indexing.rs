use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use places_core::cancel::{cancellation, CancelToken};
use places_core::config::BulkConfig;
use places_core::descriptor::IndexDescriptor;
use places_core::indexing::Outcome;
use places_core::store::memory::MemoryStore;
use places_core::store::DocumentStore;
use server::spawn_startup_indexing;

fn tsv(rows: usize) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(f, "ID\tName\tAddress\tPhone\tLongitude\tLatitude").unwrap();
    for id in 1..=rows {
        writeln!(f, "{id}\tPlace {id}\tStreet {id}\t(495) {id:03}\t37.{id:03}\t55.{id:03}").unwrap();
    }
    f.flush().unwrap();
    f
}

fn bulk() -> BulkConfig {
    BulkConfig { workers: 1, flush_bytes: 1, flush_interval: Duration::from_secs(30) }
}

#[tokio::test]
async fn completed_run_hands_back_its_report() {
    let file = tsv(20);
    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn DocumentStore> = store.clone();
    let handle = spawn_startup_indexing(
        dyn_store,
        IndexDescriptor::places("places"),
        file.path().display().to_string(),
        bulk(),
        CancelToken::never(),
    );
    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(report.flushed, 20);
    assert_eq!(store.doc_count("places"), 20);
}

#[tokio::test(start_paused = true)]
async fn cancelled_run_still_reports_after_shutdown() {
    let file = tsv(200);
    let store = Arc::new(MemoryStore::new().with_bulk_delay(Duration::from_secs(10)));
    let dyn_store: Arc<dyn DocumentStore> = store.clone();
    let (cancel, token) = cancellation();
    let handle = spawn_startup_indexing(
        dyn_store,
        IndexDescriptor::places("places"),
        file.path().display().to_string(),
        bulk(),
        token,
    );

    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel();

    let report = tokio::time::timeout(Duration::from_secs(60), handle).await.unwrap().unwrap().unwrap();
    assert_eq!(report.outcome, Outcome::Cancelled);
    assert_eq!(report.records, 200);
    assert!(report.discarded > 0);
    assert_eq!(report.flushed + report.failed + report.discarded, 200);
}

#[tokio::test]
async fn unreadable_file_yields_no_report() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let handle = spawn_startup_indexing(
        store,
        IndexDescriptor::places("places"),
        dir.path().join("absent.tsv").display().to_string(),
        bulk(),
        CancelToken::never(),
    );
    assert!(handle.await.unwrap().is_none());
}
