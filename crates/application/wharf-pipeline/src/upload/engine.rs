use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;

use camino::Utf8PathBuf;
use tracing::{debug, info, warn};

use wharf_core::paths::SitePath;
use wharf_core::{ContentHash, FileMeta};
use wharf_infra::{QueueError, QueueOptions, TaskError, TaskQueue};
use wharf_persistence::{target_key, HashCache};

use super::batch::BatchAccumulator;
use super::digest::{Digester, GzipDigester};
use super::remote::{ReleaseStore, RemoteError};
use super::{status, UploadError, UploadOptions, UploadRequest, UploadStats};

/// One populate call's worth of `wire key -> hash` entries.
type Batch = BTreeMap<String, ContentHash>;

/// Shared state every stage handler works against.
struct RunState {
    version: String,
    project_root: Utf8PathBuf,
    content_root: Utf8PathBuf,
    cache_key: String,
    options: UploadOptions,
    files: Vec<String>,
    store: Arc<dyn ReleaseStore>,
    digester: Arc<dyn Digester>,
    /// Cache from the previous run; read-only during this one.
    cache: HashCache,
    /// Entries for the next run, persisted once hashing and populate settle.
    cache_new: Mutex<HashCache>,
    hash_to_path: Mutex<HashMap<ContentHash, String>>,
    files_meta: Mutex<HashMap<String, FileMeta>>,
    batcher: BatchAccumulator,
    /// Upload endpoint announced by the populate responses.
    upload_endpoint: Mutex<Option<String>>,
    cache_hits: AtomicU64,
    bytes_total: AtomicU64,
}

/// Content-addressed upload pipeline: hash every file, register the hashes
/// against a version in batches, then upload only the blobs the store has
/// never seen.
pub struct Uploader {
    state: Arc<RunState>,
    hash_queue: TaskQueue<String>,
    populate_queue: TaskQueue<Batch>,
    upload_queue: TaskQueue<ContentHash>,
}

impl Uploader {
    /// Builds an uploader that digests with the same gzip level the upload
    /// bodies are compressed with.
    pub fn new(request: UploadRequest, store: Arc<dyn ReleaseStore>) -> Self {
        let digester = Arc::new(GzipDigester::new(request.options.gzip_level));
        Self::with_components(request, store, digester)
    }

    pub fn with_components(
        request: UploadRequest,
        store: Arc<dyn ReleaseStore>,
        digester: Arc<dyn Digester>,
    ) -> Self {
        // Normalize paths at the boundary so cache keys and wire keys always
        // use Unix separators.
        let files: Vec<String> = request
            .files
            .iter()
            .map(|f| SitePath::normalize(f))
            .collect();
        let cache_key = target_key(&request.project_root, &request.content_root);
        let cache = HashCache::load(&request.project_root, &cache_key);
        debug!(entries = cache.len(), key = %cache_key, "hash cache loaded");

        let state = Arc::new(RunState {
            version: request.version,
            project_root: request.project_root,
            content_root: request.content_root,
            cache_key,
            batcher: BatchAccumulator::new(request.options.batch_size),
            options: request.options,
            files,
            store,
            digester,
            cache,
            cache_new: Mutex::new(HashCache::default()),
            hash_to_path: Mutex::new(HashMap::new()),
            files_meta: Mutex::new(HashMap::new()),
            upload_endpoint: Mutex::new(None),
            cache_hits: AtomicU64::new(0),
            bytes_total: AtomicU64::new(0),
        });

        // Later stages are built first so the earlier handlers can feed them.
        let upload_queue = {
            let state = Arc::clone(&state);
            TaskQueue::new(
                QueueOptions::new(
                    "upload",
                    state.options.upload_concurrency,
                    state.options.upload_retries,
                ),
                move |hash: ContentHash| upload_task(Arc::clone(&state), hash),
            )
        };
        let populate_queue = {
            let state = Arc::clone(&state);
            let upload_queue = upload_queue.clone();
            TaskQueue::new(
                QueueOptions::new(
                    "populate",
                    state.options.populate_concurrency,
                    state.options.populate_retries,
                ),
                move |batch: Batch| populate_task(Arc::clone(&state), upload_queue.clone(), batch),
            )
        };
        let hash_queue = {
            let state = Arc::clone(&state);
            let populate_queue = populate_queue.clone();
            TaskQueue::new(
                QueueOptions::new(
                    "hash",
                    state.options.hash_concurrency,
                    state.options.hash_retries,
                ),
                move |rel_path: String| {
                    hash_task(Arc::clone(&state), populate_queue.clone(), rel_path)
                },
            )
        };

        Self {
            state,
            hash_queue,
            populate_queue,
            upload_queue,
        }
    }

    /// Runs the pipeline to completion. Stage failures surface in stage
    /// order; a failed stage returns without closing the queues behind it,
    /// whose dispatchers exit with the runtime.
    pub async fn start(&self) -> Result<UploadStats, UploadError> {
        if self.state.files.is_empty() {
            info!("no files to upload");
            return Ok(UploadStats::default());
        }

        info!(
            files = self.state.files.len(),
            version = %self.state.version,
            "starting deploy upload"
        );

        for rel_path in &self.state.files {
            self.hash_queue.add(rel_path.clone());
        }
        self.hash_queue.close();
        self.hash_queue.process();
        if let Err(err) = self.hash_queue.wait().await {
            return Err(UploadError::Hash(err));
        }
        debug!(stats = ?self.hash_queue.stats(), "hash queue drained");
        self.flush_batch();

        self.populate_queue.close();
        if let Err(err) = self.populate_queue.wait().await {
            return Err(UploadError::Populate(err));
        }
        debug!(stats = ?self.populate_queue.stats(), "populate queue drained");

        // Every entry is known by now; the upload stage only moves bytes.
        self.persist_cache();

        self.upload_queue.close();
        if let Err(err) = self.upload_queue.wait().await {
            if is_hash_mismatch(&err) {
                warn!("the store rejected a content hash; dropping the hash cache for this target");
                if let Err(io_err) =
                    HashCache::invalidate(&self.state.project_root, &self.state.cache_key)
                {
                    warn!("could not drop the hash cache: {io_err}");
                }
            }
            return Err(UploadError::Upload(err));
        }
        debug!(stats = ?self.upload_queue.stats(), "upload queue drained");

        let stats = self.collect_stats();
        info!(
            uploaded = stats.files_uploaded,
            cached = stats.files_cached,
            total = stats.files_total,
            "deploy upload complete"
        );
        Ok(stats)
    }

    /// Human-readable one-line progress summary, suitable for polling while
    /// [`Uploader::start`] runs on another task.
    pub fn status_message(&self) -> String {
        status::status_message(
            &self.hash_queue.stats(),
            &self.populate_queue.stats(),
            &self.upload_queue.stats(),
            self.state.files.len() as u64,
            self.state.options.batch_size as u64,
        )
    }

    fn flush_batch(&self) {
        if let Some(batch) = self.state.batcher.drain() {
            self.populate_queue.add(batch);
            self.populate_queue.process();
        }
    }

    fn persist_cache(&self) {
        let cache_new = self.state.cache_new.lock().unwrap().clone();
        if let Err(err) = cache_new.dump(&self.state.project_root, &self.state.cache_key) {
            warn!("could not persist the hash cache: {err}");
        }
    }

    fn collect_stats(&self) -> UploadStats {
        UploadStats {
            files_total: self.state.files.len() as u64,
            files_cached: self.state.cache_hits.load(Ordering::Relaxed),
            files_uploaded: self.upload_queue.stats().success,
            bytes_total: self.state.bytes_total.load(Ordering::Relaxed),
            populate_batches: self.populate_queue.stats().total,
        }
    }
}

fn mtime_millis(meta: &std::fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

async fn hash_task(
    state: Arc<RunState>,
    populate_queue: TaskQueue<Batch>,
    rel_path: String,
) -> Result<(), TaskError> {
    let fs_path = state.content_root.join(&rel_path);
    let meta = tokio::fs::metadata(&fs_path)
        .await
        .map_err(|e| format!("stat {fs_path}: {e}"))?;
    let mtime_ms = mtime_millis(&meta);
    let size = meta.len();
    state.bytes_total.fetch_add(size, Ordering::Relaxed);
    state
        .files_meta
        .lock()
        .unwrap()
        .insert(rel_path.clone(), FileMeta { size, mtime_ms });

    let cached = state
        .cache
        .get(&rel_path)
        .filter(|rec| rec.mtime_ms == mtime_ms)
        .map(|rec| rec.hash.clone());
    let hash = match cached {
        Some(hash) => {
            state.cache_hits.fetch_add(1, Ordering::Relaxed);
            hash
        }
        None => state
            .digester
            .digest(&fs_path)
            .await
            .map_err(|e| format!("hash {fs_path}: {e}"))?,
    };
    state
        .cache_new
        .lock()
        .unwrap()
        .insert(&rel_path, mtime_ms, hash.clone());
    register_hash(&state, &populate_queue, &rel_path, hash);
    Ok(())
}

/// Records where a hash came from and feeds the populate stage whenever a
/// batch fills up.
fn register_hash(
    state: &RunState,
    populate_queue: &TaskQueue<Batch>,
    rel_path: &str,
    hash: ContentHash,
) {
    state
        .hash_to_path
        .lock()
        .unwrap()
        .insert(hash.clone(), rel_path.to_string());
    if let Some(batch) = state.batcher.push(SitePath::wire_key(rel_path), hash) {
        debug!(size = batch.len(), "populate batch full");
        populate_queue.add(batch);
        populate_queue.process();
    }
}

async fn populate_task(
    state: Arc<RunState>,
    upload_queue: TaskQueue<ContentHash>,
    batch: Batch,
) -> Result<(), TaskError> {
    let batch_len = batch.len();
    let response = state.store.populate(&state.version, batch).await?;
    *state.upload_endpoint.lock().unwrap() = Some(response.upload_url);
    debug!(
        batch = batch_len,
        missing = response.upload_required_hashes.len(),
        "populate batch registered"
    );
    for hash in response.upload_required_hashes {
        upload_queue.add(hash);
    }
    upload_queue.process();
    Ok(())
}

async fn upload_task(state: Arc<RunState>, hash: ContentHash) -> Result<(), TaskError> {
    let rel_path = state
        .hash_to_path
        .lock()
        .unwrap()
        .get(&hash)
        .cloned()
        .ok_or_else(|| format!("no source path recorded for hash {hash}"))?;
    let endpoint = state
        .upload_endpoint
        .lock()
        .unwrap()
        .clone()
        .ok_or_else(|| format!("upload of {hash} scheduled before any populate response"))?;
    let size = state
        .files_meta
        .lock()
        .unwrap()
        .get(&rel_path)
        .map_or(0, |meta| meta.size);
    let timeout = state.options.upload_timeout(size);
    let fs_path = state.content_root.join(&rel_path);
    state
        .store
        .upload(&endpoint, &hash, &fs_path, state.options.gzip_level, timeout)
        .await?;
    Ok(())
}

/// Walks the failure chain looking for a content-hash rejection.
fn is_hash_mismatch(err: &QueueError) -> bool {
    let mut cause: Option<&(dyn std::error::Error + 'static)> = Some(err.source.as_ref());
    while let Some(e) = cause {
        if matches!(
            e.downcast_ref::<RemoteError>(),
            Some(RemoteError::HashMismatch { .. })
        ) {
            return true;
        }
        cause = e.source();
    }
    false
}
