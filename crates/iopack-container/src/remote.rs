//! Background upload of chunks to a remote store.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex, PoisonError};
use std::thread;

use bytes::Bytes;
use iopack_types::ChunkId;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{ContainerError, ContainerResult};
use crate::sink::{ChunkInfo, ChunkSink, PackageInfo, SinkReport};

/// Where a [`QueuedRemoteSink`] puts chunks. Called from the sink's worker
/// thread only.
pub trait RemoteStore: Send + Sync {
    fn put(&self, container: &str, info: &ChunkInfo, data: &[u8]) -> ContainerResult<()>;
}

/// Stores each chunk as `<root>/<container>/<chunk id>`.
#[derive(Clone, Debug)]
pub struct DirectoryRemoteStore {
    root: PathBuf,
}

impl DirectoryRemoteStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn chunk_path(&self, container: &str, id: &ChunkId) -> PathBuf {
        self.root.join(container).join(id.to_hex())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl RemoteStore for DirectoryRemoteStore {
    fn put(&self, container: &str, info: &ChunkInfo, data: &[u8]) -> ContainerResult<()> {
        let path = self.chunk_path(container, &info.id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data)?;
        Ok(())
    }
}

/// Keeps chunks in memory. Can be told to fail the next few writes.
#[derive(Debug, Default)]
pub struct InMemoryRemoteStore {
    chunks: Mutex<HashMap<(String, ChunkId), Bytes>>,
    failures: AtomicUsize,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` writes.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn get(&self, container: &str, id: &ChunkId) -> Option<Bytes> {
        self.lock().get(&(container.to_string(), *id)).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, ChunkId), Bytes>> {
        self.chunks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RemoteStore for InMemoryRemoteStore {
    fn put(&self, container: &str, info: &ChunkInfo, data: &[u8]) -> ContainerResult<()> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ContainerError::write_failed(info.id, "injected failure"));
        }
        self.lock()
            .insert((container.to_string(), info.id), Bytes::copy_from_slice(data));
        Ok(())
    }
}

/// Called on the worker thread once a chunk is stored (`true`) or has run
/// out of attempts (`false`).
pub type CompletionCallback = Arc<dyn Fn(&ChunkInfo, bool) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemoteSinkConfig {
    /// Attempts per chunk, including the first.
    pub max_attempts: u32,
}

impl Default for RemoteSinkConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

enum Job {
    Write {
        info: ChunkInfo,
        data: Bytes,
        attempt: u32,
    },
    Flush(std_mpsc::SyncSender<()>),
    Shutdown,
}

#[derive(Default)]
struct Progress {
    /// Writes queued or being retried.
    pending: AtomicUsize,
    chunks: AtomicUsize,
    bytes: AtomicU64,
    failed: Mutex<Vec<(ChunkId, String)>>,
}

/// Sink that hands chunks to a dedicated thread which writes them to a
/// [`RemoteStore`], retrying failed writes.
///
/// Writes return as soon as the chunk is queued. `flush` waits for the queue
/// to drain and fails if any chunk exhausted its attempts.
pub struct QueuedRemoteSink {
    container: String,
    queue: mpsc::UnboundedSender<Job>,
    progress: Arc<Progress>,
    worker: Option<thread::JoinHandle<()>>,
    packages: usize,
}

impl QueuedRemoteSink {
    pub fn new(
        container: impl Into<String>,
        store: Arc<dyn RemoteStore>,
        config: RemoteSinkConfig,
        on_complete: Option<CompletionCallback>,
    ) -> ContainerResult<Self> {
        let container = container.into();
        let (queue, jobs) = mpsc::unbounded_channel();
        let progress = Arc::new(Progress::default());
        let worker = Worker {
            container: container.clone(),
            store,
            jobs,
            requeue: queue.clone(),
            progress: Arc::clone(&progress),
            max_attempts: config.max_attempts.max(1),
            on_complete,
        };
        let handle = thread::Builder::new()
            .name(format!("iopack-remote-{container}"))
            .spawn(move || worker.run())?;
        Ok(Self {
            container,
            queue,
            progress,
            worker: Some(handle),
            packages: 0,
        })
    }

    fn enqueue(&mut self, info: ChunkInfo, data: Bytes) -> ContainerResult<()> {
        self.progress.pending.fetch_add(1, Ordering::SeqCst);
        let id = info.id;
        self.queue
            .send(Job::Write {
                info,
                data,
                attempt: 0,
            })
            .map_err(|_| {
                self.progress.pending.fetch_sub(1, Ordering::SeqCst);
                ContainerError::write_failed(id, "remote writer thread has stopped")
            })
    }
}

impl ChunkSink for QueuedRemoteSink {
    fn begin_package(&mut self, name: &str) -> ContainerResult<()> {
        debug!(container = %self.container, package = name, "begin remote package");
        Ok(())
    }

    fn write_package_data(&mut self, info: ChunkInfo, data: Bytes) -> ContainerResult<()> {
        self.enqueue(info, data)
    }

    fn write_bulk_data(&mut self, info: ChunkInfo, data: Bytes) -> ContainerResult<()> {
        self.enqueue(info, data)
    }

    fn commit_package(&mut self, _info: &PackageInfo) -> ContainerResult<()> {
        self.packages += 1;
        Ok(())
    }

    fn flush(&mut self) -> ContainerResult<SinkReport> {
        let (done, wait) = std_mpsc::sync_channel(1);
        let stopped = || ContainerError::write_failed(&self.container, "remote writer thread has stopped");
        self.queue.send(Job::Flush(done)).map_err(|_| stopped())?;
        wait.recv().map_err(|_| stopped())?;

        let failed = std::mem::take(
            &mut *self
                .progress
                .failed
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if let Some((id, reason)) = failed.first() {
            return Err(ContainerError::write_failed(
                id,
                format!("{reason} ({} chunks failed in {})", failed.len(), self.container),
            ));
        }

        let report = SinkReport {
            container: self.container.clone(),
            packages: self.packages,
            chunks: self.progress.chunks.load(Ordering::SeqCst),
            bytes_written: self.progress.bytes.load(Ordering::SeqCst),
            ..SinkReport::default()
        };
        info!(
            container = %report.container,
            chunks = report.chunks,
            bytes = report.bytes_written,
            "flushed remote sink"
        );
        Ok(report)
    }
}

impl Drop for QueuedRemoteSink {
    fn drop(&mut self) {
        let _ = self.queue.send(Job::Shutdown);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

struct Worker {
    container: String,
    store: Arc<dyn RemoteStore>,
    jobs: mpsc::UnboundedReceiver<Job>,
    requeue: mpsc::UnboundedSender<Job>,
    progress: Arc<Progress>,
    max_attempts: u32,
    on_complete: Option<CompletionCallback>,
}

impl Worker {
    fn run(mut self) {
        while let Some(job) = self.jobs.blocking_recv() {
            match job {
                Job::Write {
                    info,
                    data,
                    attempt,
                } => self.write(info, data, attempt),
                Job::Flush(done) => {
                    // retries queued behind this marker must finish first
                    if self.progress.pending.load(Ordering::SeqCst) == 0 {
                        let _ = done.send(());
                    } else {
                        let _ = self.requeue.send(Job::Flush(done));
                    }
                }
                Job::Shutdown => break,
            }
        }
        debug!(container = %self.container, "remote writer stopped");
    }

    fn write(&self, info: ChunkInfo, data: Bytes, attempt: u32) {
        match self.store.put(&self.container, &info, &data) {
            Ok(()) => {
                self.progress.chunks.fetch_add(1, Ordering::SeqCst);
                self.progress
                    .bytes
                    .fetch_add(data.len() as u64, Ordering::SeqCst);
                self.finish(&info, true);
            }
            Err(err) if attempt + 1 < self.max_attempts => {
                warn!(
                    container = %self.container,
                    chunk = %info.id,
                    attempt = attempt + 1,
                    error = %err,
                    "remote write failed, retrying"
                );
                let id = info.id;
                let retry = Job::Write {
                    info,
                    data,
                    attempt: attempt + 1,
                };
                if self.requeue.send(retry).is_err() {
                    self.record_failure(id, "queue closed during retry".into());
                    self.progress.pending.fetch_sub(1, Ordering::SeqCst);
                }
            }
            Err(err) => {
                warn!(
                    container = %self.container,
                    chunk = %info.id,
                    attempts = attempt + 1,
                    error = %err,
                    "remote write failed"
                );
                self.record_failure(info.id, err.to_string());
                self.finish(&info, false);
            }
        }
    }

    fn finish(&self, info: &ChunkInfo, stored: bool) {
        self.progress.pending.fetch_sub(1, Ordering::SeqCst);
        if let Some(callback) = &self.on_complete {
            callback(info, stored);
        }
    }

    fn record_failure(&self, id: ChunkId, reason: String) {
        self.progress
            .failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, reason));
    }
}
