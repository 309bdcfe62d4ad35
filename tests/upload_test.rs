//! Upload tests against in-memory stores: partial failures, the concurrency
//! bound, and mirroring a real build into a local directory.

use async_trait::async_trait;
use graphshard::config::BuildConfig;
use graphshard::pipeline::run_build;
use graphshard::upload::{
    run_upload, LocalDirStore, ObjectMeta, ObjectStore, UploadConfig, UploadError,
    UploadErrorKind, UploadSelection,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Records stored objects and fails every key containing `fail_marker`.
#[derive(Default)]
struct RecordingStore {
    fail_marker: Option<&'static str>,
    objects: Mutex<BTreeMap<String, (usize, ObjectMeta)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn put(&self, key: &str, body: Vec<u8>, meta: &ObjectMeta) -> Result<(), UploadError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_marker.is_some_and(|m| key.contains(m)) {
            return Err(UploadError::new(UploadErrorKind::Unavailable, "503 from store"));
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (body.len(), meta.clone()));
        Ok(())
    }
}

fn write_artifacts(dir: &Path, count: usize) {
    fs::create_dir_all(dir.join("chunks")).unwrap();
    for i in 0..count {
        fs::write(dir.join(format!("component_{i}.json.gz")), vec![0u8; i + 1]).unwrap();
    }
    fs::write(dir.join("chunks").join("lookup_ab.json.gz"), b"ab").unwrap();
    fs::write(dir.join("chunks_index.json.gz"), b"idx").unwrap();
}

#[tokio::test]
async fn test_failed_objects_do_not_stop_siblings() {
    let dir = TempDir::new().unwrap();
    write_artifacts(dir.path(), 6);

    let store = Arc::new(RecordingStore {
        fail_marker: Some("component_3"),
        ..RecordingStore::default()
    });
    let config = UploadConfig::new(dir.path());
    let report = run_upload(&config, store.clone()).await.unwrap();

    assert_eq!(report.succeeded.len(), 7);
    assert_eq!(report.missing_keys(), vec!["component_3.json.gz"]);
    assert!(report.failed[0].error.retriable);
    assert!(!store.objects.lock().unwrap().contains_key("component_3.json.gz"));

    let err = report.ensure_complete().unwrap_err().to_string();
    assert!(err.contains("1 of 8 uploads failed"));
    assert!(err.contains("component_3.json.gz"));
}

#[tokio::test]
async fn test_in_flight_uploads_respect_worker_bound() {
    let dir = TempDir::new().unwrap();
    write_artifacts(dir.path(), 30);

    let store = Arc::new(RecordingStore::default());
    let mut config = UploadConfig::new(dir.path());
    config.workers = 4;
    let report = run_upload(&config, store.clone()).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.succeeded.len(), 32);
    let max = store.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 4, "saw {max} concurrent uploads");
    assert!(max >= 1);
}

#[tokio::test]
async fn test_chunk_selection_sends_metadata() {
    let dir = TempDir::new().unwrap();
    write_artifacts(dir.path(), 2);

    let store = Arc::new(RecordingStore::default());
    let mut config = UploadConfig::new(dir.path());
    config.selection = UploadSelection::Chunks;
    let report = run_upload(&config, store.clone()).await.unwrap();

    assert_eq!(report.succeeded.len(), 2);
    assert_eq!(report.uploaded_bytes(), 5);
    let objects = store.objects.lock().unwrap();
    let keys: Vec<&str> = objects.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["chunks/lookup_ab.json.gz", "chunks_index.json.gz"]);
    let (_, meta) = &objects["chunks_index.json.gz"];
    assert_eq!(meta.content_type, "application/gzip");
    assert_eq!(meta.content_encoding, "gzip");
}

#[tokio::test]
async fn test_local_store_mirrors_build_output() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("graph.json");
    fs::write(
        &input,
        r#"{"nodes": [{"id": "a/x"}, {"id": "a/y"}, {"id": "solo"}],
            "edges": [{"source": "a/x", "target": "a/y"}]}"#,
    )
    .unwrap();
    let out = dir.path().join("out");
    run_build(&BuildConfig::new(&input, &out)).unwrap();

    let bucket = dir.path().join("bucket");
    let store = Arc::new(LocalDirStore::new(&bucket));
    let report = run_upload(&UploadConfig::new(&out), store).await.unwrap();
    report.ensure_complete().unwrap();

    for object in &report.succeeded {
        let local = fs::read(out.join(&object.key)).unwrap();
        let mirrored = fs::read(bucket.join(&object.key)).unwrap();
        assert_eq!(local, mirrored, "{}", object.key);
    }
    assert!(bucket.join("component_index.json.gz").is_file());
    assert!(bucket.join("chunks").join("lookup_a%2F.json.gz").is_file());
}

#[tokio::test]
async fn test_missing_output_directory_is_error() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(RecordingStore::default());
    let config = UploadConfig::new(dir.path().join("nope"));
    assert!(run_upload(&config, store).await.is_err());
}
