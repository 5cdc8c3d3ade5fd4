//! Backlog scanner integration tests over real temporary trees: chronological
//! ordering through the whole pipeline and dedup idempotence across rescans.

use async_trait::async_trait;
use camsync::config::types::ImporterConfig;
use camsync::history::{DuckDbHistory, HistoryStore};
use camsync::import::{ImportError, PhotoImporter, SyncTrigger};
use camsync::pipeline::{enqueue_if_new, run_consumer, BatchAccumulator};
use camsync::scan::{scan_backlog, MediaFilter};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct RecordingImporter {
    batches: Mutex<Vec<Vec<PathBuf>>>,
}

impl RecordingImporter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(Vec::new()),
        })
    }

    fn imported_paths(&self) -> Vec<PathBuf> {
        self.batches.lock().unwrap().concat()
    }
}

#[async_trait]
impl PhotoImporter for RecordingImporter {
    async fn import_batch(&self, paths: &[PathBuf]) -> Result<(), ImportError> {
        self.batches.lock().unwrap().push(paths.to_vec());
        Ok(())
    }

    async fn clear_error_dialogs(&self) {}
}

struct NoopSync;

#[async_trait]
impl SyncTrigger for NoopSync {
    async fn request_sync(&self) -> bool {
        true
    }
}

fn media_filter() -> MediaFilter {
    MediaFilter::new(vec!["jpg".into(), "heic".into(), "mp4".into()])
}

fn write_with_mtime(path: &Path, age: Duration) {
    fs::write(path, b"media bytes").unwrap();
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}

async fn fresh_store() -> Arc<dyn HistoryStore> {
    let store: Arc<dyn HistoryStore> = Arc::new(DuckDbHistory::in_memory().unwrap());
    store.init_schema().await.unwrap();
    store
}

fn importer_config() -> ImporterConfig {
    ImporterConfig {
        max_retries: 0,
        retry_delay: Duration::from_millis(1),
        import_timeout: Duration::from_secs(1),
    }
}

/// Scan + enqueue + consume once. Returns how many files were enqueued.
async fn run_backlog_once(
    root: &Path,
    store: &Arc<dyn HistoryStore>,
    importer: Arc<RecordingImporter>,
    batch_size: usize,
) -> usize {
    let candidates = scan_backlog(root, &media_filter()).unwrap();

    let (accumulator, queue) = BatchAccumulator::new(64);
    let mut enqueued = 0;
    for candidate in candidates {
        if enqueue_if_new(candidate, store, true, &accumulator).await {
            enqueued += 1;
        }
    }
    drop(accumulator);

    run_consumer(
        queue,
        importer,
        Arc::new(NoopSync),
        store.clone(),
        importer_config(),
        batch_size,
        CancellationToken::new(),
    )
    .await;

    enqueued
}

#[tokio::test]
async fn test_rescan_of_unchanged_tree_imports_nothing() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    fs::create_dir_all(root.join("2024/06")).unwrap();
    write_with_mtime(&root.join("2024/06/one.jpg"), Duration::from_secs(300));
    write_with_mtime(&root.join("two.heic"), Duration::from_secs(200));
    write_with_mtime(&root.join("clip.mp4"), Duration::from_secs(100));

    let store = fresh_store().await;

    let importer = RecordingImporter::new();
    let first = run_backlog_once(root, &store, importer.clone(), 10).await;
    assert_eq!(first, 3);
    assert_eq!(importer.imported_paths().len(), 3);

    // Second pass over the unchanged tree: history says everything is done.
    let importer = RecordingImporter::new();
    let second = run_backlog_once(root, &store, importer.clone(), 10).await;
    assert_eq!(second, 0);
    assert!(importer.imported_paths().is_empty());
}

#[tokio::test]
async fn test_backlog_imports_in_chronological_order_across_batches() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    // Directory names deliberately reversed against mtime order.
    fs::create_dir_all(root.join("zz")).unwrap();
    fs::create_dir_all(root.join("aa")).unwrap();
    let oldest = root.join("zz/oldest.jpg");
    let middle = root.join("middle.jpg");
    let newest = root.join("aa/newest.jpg");
    write_with_mtime(&oldest, Duration::from_secs(3000));
    write_with_mtime(&middle, Duration::from_secs(2000));
    write_with_mtime(&newest, Duration::from_secs(1000));

    let store = fresh_store().await;
    let importer = RecordingImporter::new();

    // batch_size 2 forces the ordering to survive batch boundaries.
    run_backlog_once(root, &store, importer.clone(), 2).await;

    assert_eq!(importer.imported_paths(), vec![oldest, middle, newest]);
}

#[tokio::test]
async fn test_new_file_after_first_pass_is_picked_up() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    write_with_mtime(&root.join("first.jpg"), Duration::from_secs(100));

    let store = fresh_store().await;
    run_backlog_once(root, &store, RecordingImporter::new(), 10).await;

    write_with_mtime(&root.join("second.jpg"), Duration::from_secs(10));

    let importer = RecordingImporter::new();
    let enqueued = run_backlog_once(root, &store, importer.clone(), 10).await;
    assert_eq!(enqueued, 1);
    assert_eq!(importer.imported_paths().len(), 1);
    assert!(importer.imported_paths()[0].ends_with("second.jpg"));
}

#[tokio::test]
async fn test_non_media_files_are_ignored() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    write_with_mtime(&root.join("photo.jpg"), Duration::from_secs(100));
    fs::write(root.join("index.db"), b"not media").unwrap();
    fs::write(root.join("README"), b"not media").unwrap();

    let store = fresh_store().await;
    let importer = RecordingImporter::new();
    let enqueued = run_backlog_once(root, &store, importer.clone(), 10).await;

    assert_eq!(enqueued, 1);
    assert_eq!(importer.imported_paths().len(), 1);
}
