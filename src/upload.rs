use crate::alpha::{CHUNKS_DIR, CHUNKS_MANIFEST_FILE};
use crate::config::{DEFAULT_UPLOAD_WORKERS, UPLOAD_CONTENT_ENCODING, UPLOAD_CONTENT_TYPE};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadErrorKind {
    /// The local artifact could not be read.
    Read,
    /// The store rejected the object (bad key, permissions, quota).
    Rejected,
    /// The store could not be reached or failed transiently.
    Unavailable,
    /// The upload task itself failed.
    Task,
}

impl fmt::Display for UploadErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadErrorKind::Read => "read",
            UploadErrorKind::Rejected => "rejected",
            UploadErrorKind::Unavailable => "unavailable",
            UploadErrorKind::Task => "task",
        };
        f.write_str(name)
    }
}

/// Failure of a single object upload. `retriable` tells a future retry policy
/// whether trying again could succeed; nothing retries today.
#[derive(Debug, Clone, Error)]
#[error("{kind} error: {message}")]
pub struct UploadError {
    pub kind: UploadErrorKind,
    pub retriable: bool,
    pub message: String,
}

impl UploadError {
    pub fn new(kind: UploadErrorKind, message: impl Into<String>) -> Self {
        let retriable = matches!(kind, UploadErrorKind::Unavailable);
        Self {
            kind,
            retriable,
            message: message.into(),
        }
    }

    fn from_io(kind: UploadErrorKind, err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        let retriable = matches!(
            err.kind(),
            ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock
        );
        Self {
            kind,
            retriable,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub content_type: String,
    pub content_encoding: String,
}

impl Default for ObjectMeta {
    fn default() -> Self {
        Self {
            content_type: UPLOAD_CONTENT_TYPE.to_string(),
            content_encoding: UPLOAD_CONTENT_ENCODING.to_string(),
        }
    }
}

/// Remote blob store accepting named objects. Implementations must be safe to
/// call concurrently; the uploader bounds how many calls are in flight.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, body: Vec<u8>, meta: &ObjectMeta) -> Result<(), UploadError>;
}

/// Mirrors a bucket into a local directory. Objects are written to a temp
/// sibling and renamed, like the build artifacts themselves.
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStore for LocalDirStore {
    async fn put(&self, key: &str, body: Vec<u8>, meta: &ObjectMeta) -> Result<(), UploadError> {
        if key.is_empty() || key.split('/').any(|seg| seg.is_empty() || seg == "..") {
            return Err(UploadError::new(
                UploadErrorKind::Rejected,
                format!("invalid object key {key:?}"),
            ));
        }

        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| UploadError::from_io(UploadErrorKind::Unavailable, &e))?;
        }
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".part");
        let tmp_path = PathBuf::from(tmp_name);

        tokio::fs::write(&tmp_path, &body)
            .await
            .map_err(|e| UploadError::from_io(UploadErrorKind::Unavailable, &e))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| UploadError::from_io(UploadErrorKind::Unavailable, &e))?;

        debug!(
            key,
            bytes = body.len(),
            content_type = %meta.content_type,
            content_encoding = %meta.content_encoding,
            "Object stored"
        );
        Ok(())
    }
}

/// Which artifacts to publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadSelection {
    /// Every `*.json.gz` artifact in the output directory.
    All,
    /// Alphabetic chunk files plus their manifest.
    Chunks,
}

pub struct UploadConfig {
    pub output_dir: PathBuf,
    pub workers: usize,
    pub selection: UploadSelection,
    pub meta: ObjectMeta,
}

impl UploadConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            workers: DEFAULT_UPLOAD_WORKERS,
            selection: UploadSelection::All,
            meta: ObjectMeta::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedObject {
    pub key: String,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct FailedUpload {
    pub key: String,
    pub error: UploadError,
}

#[derive(Debug, Default)]
pub struct UploadReport {
    pub succeeded: Vec<UploadedObject>,
    pub failed: Vec<FailedUpload>,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.succeeded.iter().map(|o| o.bytes).sum()
    }

    /// Keys that are absent remotely, sorted.
    pub fn missing_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.failed.iter().map(|f| f.key.as_str()).collect();
        keys.sort_unstable();
        keys
    }

    /// Turns a partial upload into an error naming every missing object.
    pub fn ensure_complete(&self) -> Result<()> {
        if self.is_complete() {
            return Ok(());
        }
        bail!(
            "{} of {} uploads failed; missing objects:\n  {}",
            self.failed.len(),
            self.failed.len() + self.succeeded.len(),
            self.missing_keys().join("\n  ")
        );
    }
}

/// Object key for an artifact: its path relative to the output directory
/// with `/` separators.
pub fn object_key(output_dir: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(output_dir)
        .with_context(|| format!("{:?} is not inside {:?}", path, output_dir))?;
    let segments: Vec<&str> = relative
        .components()
        .map(|c| {
            c.as_os_str()
                .to_str()
                .with_context(|| format!("Non UTF-8 artifact path: {:?}", path))
        })
        .collect::<Result<_>>()?;
    Ok(segments.join("/"))
}

/// Lists artifacts to upload as `(key, path)` pairs sorted by key.
pub fn collect_artifacts(
    output_dir: &Path,
    selection: UploadSelection,
) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    walk(output_dir, &mut files)?;

    let mut artifacts = Vec::with_capacity(files.len());
    for path in files {
        let key = object_key(output_dir, &path)?;
        let selected = match selection {
            UploadSelection::All => true,
            UploadSelection::Chunks => {
                key == CHUNKS_MANIFEST_FILE || key.starts_with(&format!("{CHUNKS_DIR}/"))
            }
        };
        if selected {
            artifacts.push((key, path));
        }
    }
    artifacts.sort();
    Ok(artifacts)
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read directory: {:?}", dir))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, files)?;
        } else if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".json.gz"))
        {
            files.push(path);
        }
    }
    Ok(())
}

async fn upload_one(
    store: Arc<dyn ObjectStore>,
    key: String,
    path: PathBuf,
    meta: Arc<ObjectMeta>,
) -> (String, Result<u64, UploadError>) {
    let body = match tokio::fs::read(&path).await {
        Ok(body) => body,
        Err(e) => return (key, Err(UploadError::from_io(UploadErrorKind::Read, &e))),
    };
    let bytes = body.len() as u64;
    let result = store.put(&key, body, &meta).await.map(|()| bytes);
    (key, result)
}

/// Uploads the selected artifacts with at most `config.workers` in flight.
/// A failed object is recorded in the report and never stops its siblings;
/// nothing is retried.
pub async fn run_upload(
    config: &UploadConfig,
    store: Arc<dyn ObjectStore>,
) -> Result<UploadReport> {
    let start = Instant::now();
    let artifacts = collect_artifacts(&config.output_dir, config.selection)?;
    let workers = config.workers.max(1);
    info!(files = artifacts.len(), workers, "Uploading artifacts");

    let pb = ProgressBar::new(artifacts.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("    {spinner:.cyan} Uploads        [{bar:30.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=> "),
    );

    let meta = Arc::new(config.meta.clone());
    let mut report = UploadReport::default();
    let mut in_flight = FuturesUnordered::new();
    let mut pending = artifacts.into_iter();

    let spawn = |(key, path): (String, PathBuf)| {
        let store = Arc::clone(&store);
        let meta = Arc::clone(&meta);
        let task_key = key.clone();
        let handle = tokio::spawn(upload_one(store, key, path, meta));
        async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => (
                    task_key,
                    Err(UploadError::new(UploadErrorKind::Task, e.to_string())),
                ),
            }
        }
    };

    for artifact in pending.by_ref().take(workers) {
        in_flight.push(spawn(artifact));
    }

    while let Some((key, result)) = in_flight.next().await {
        match result {
            Ok(bytes) => report.succeeded.push(UploadedObject { key, bytes }),
            Err(error) => {
                warn!(
                    key = %key,
                    kind = %error.kind,
                    retriable = error.retriable,
                    error = %error.message,
                    "Upload failed"
                );
                report.failed.push(FailedUpload { key, error });
            }
        }
        pb.inc(1);

        if let Some(artifact) = pending.next() {
            in_flight.push(spawn(artifact));
        }
    }

    pb.finish_and_clear();
    info!(
        uploaded = report.succeeded.len(),
        failed = report.failed.len(),
        bytes = report.uploaded_bytes(),
        duration_secs = start.elapsed().as_secs_f64(),
        "Upload finished"
    );
    Ok(report)
}
