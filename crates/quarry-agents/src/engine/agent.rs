// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The engine: tier lookups, job de-duplication, stage scheduling and fan-out.

use super::handle::LoadHandle;
use super::job::{EngineJob, JobState, Waiter, WaiterId};
use super::metrics::{bump, sample, EngineMetrics};
use super::request::{LoadCallback, LoadRequest, LoadResult, Loaded};
use anyhow::{Context, Result};
use quarry_core::cache::{DiskCache, NoDiskCache};
use quarry_core::config::EngineConfig;
use quarry_core::memory::BufferProvider;
use quarry_core::strategy::Fetched;
use quarry_core::{
    DataSource, Decoded, Dimensions, Fingerprint, LoadError, LoadOptions, MemoryPressure, Pipeline,
    Priority, Resource,
};
use quarry_data::{ActiveResources, BufferPool, BufferPoolStats, LruDiskCache, MemoryCache};
use quarry_data::{ReleaseError, ReleaseOutcome};
use quarry_infra::{TaskExecutor, TaskExecutors};
use quarry_lanes::{DecodeLane, EncodeLane, LaneContext, SourceLane};
use quarry_telemetry::MetricsRegistry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

/// Everything guarded by the engine lock.
struct EngineState<T: Decoded> {
    active: ActiveResources<T>,
    jobs: HashMap<Fingerprint, Arc<EngineJob<T>>>,
    shut_down: bool,
}

impl<T: Decoded> EngineState<T> {
    /// Unregisters `job` if it is still the registered job for its key.
    fn remove_job(&mut self, job: &Arc<EngineJob<T>>) -> bool {
        match self.jobs.get(&job.key) {
            Some(registered) if Arc::ptr_eq(registered, job) => {
                self.jobs.remove(&job.key);
                true
            }
            _ => false,
        }
    }
}

struct EngineShared<T: Decoded> {
    state: Mutex<EngineState<T>>,
    memory_cache: MemoryCache<T>,
    buffer_pool: Arc<BufferPool>,
    disk_cache: Arc<dyn DiskCache>,
    executors: TaskExecutors,
    decode_lane: DecodeLane,
    metrics: EngineMetrics,
    default_pipeline: Pipeline<T>,
    assert_balanced_release: bool,
    next_waiter: AtomicU64,
}

/// A multi-tier loading engine for values of type `T`.
///
/// A load is served by the first tier that has it: active resources, then the
/// memory cache, then an in-flight job for the same request, then a new job that
/// reads the disk cache and falls back to the source. Every resource handed out
/// must eventually be passed back to [`release`](Self::release).
///
/// The engine is shared by reference; dropping it shuts it down.
pub struct Engine<T: Decoded> {
    shared: Arc<EngineShared<T>>,
}

impl<T: Decoded> Engine<T> {
    /// Starts an engine using the disk cache described by `config`.
    pub fn new(
        config: EngineConfig,
        pipeline: Pipeline<T>,
        registry: &MetricsRegistry,
    ) -> Result<Self> {
        let disk_cache: Arc<dyn DiskCache> = match LruDiskCache::from_config(&config.disk_cache) {
            Some(store) => {
                log::info!("Disk cache at {}", store.directory().display());
                Arc::new(store)
            }
            None => Arc::new(NoDiskCache),
        };
        Self::with_disk_cache(config, pipeline, registry, disk_cache)
    }

    /// Starts an engine on top of a caller-provided disk cache.
    ///
    /// `config.disk_cache` is ignored.
    pub fn with_disk_cache(
        config: EngineConfig,
        pipeline: Pipeline<T>,
        registry: &MetricsRegistry,
        disk_cache: Arc<dyn DiskCache>,
    ) -> Result<Self> {
        let buffer_pool = Arc::new(BufferPool::from_config(&config.buffer_pool));
        let pool = Arc::clone(&buffer_pool);
        let memory_cache = MemoryCache::from_config(&config.memory_cache)
            .with_removal_listener(move |resource: Resource<T>| {
                resource.recycle(pool.as_ref());
            });
        let executors = TaskExecutors::from_config(&config.executors)
            .context("Failed to start engine executors")?;
        let decode_lane = DecodeLane::new(registry).context("Failed to register decode metrics")?;
        let metrics = EngineMetrics::new(registry).context("Failed to register engine metrics")?;

        log::debug!(
            "Engine started: memory cache {} bytes, buffer pool {} bytes",
            config.memory_cache.max_bytes,
            config.buffer_pool.max_bytes
        );
        Ok(Self {
            shared: Arc::new(EngineShared {
                state: Mutex::new(EngineState {
                    active: ActiveResources::new(),
                    jobs: HashMap::new(),
                    shut_down: false,
                }),
                memory_cache,
                buffer_pool,
                disk_cache,
                executors,
                decode_lane,
                metrics,
                default_pipeline: pipeline,
                assert_balanced_release: config.assert_balanced_release,
                next_waiter: AtomicU64::new(1),
            }),
        })
    }

    /// The pipeline used by [`load`](Self::load).
    pub fn pipeline(&self) -> &Pipeline<T> {
        &self.shared.default_pipeline
    }

    /// Fingerprints `model` at `dimensions` through the default pipeline.
    pub fn fingerprint(&self, model: impl Into<String>, dimensions: Dimensions) -> Fingerprint {
        self.shared.default_pipeline.fingerprint(model, dimensions)
    }

    /// Loads `key` through the default pipeline with default options.
    ///
    /// `callback` runs exactly once unless the handle is cancelled first: on the
    /// calling thread for active and memory hits, otherwise on the worker that
    /// finished the job.
    pub fn load(
        &self,
        key: Fingerprint,
        priority: Priority,
        callback: impl FnOnce(LoadResult<T>) + Send + 'static,
    ) -> LoadHandle {
        let request = LoadRequest {
            key,
            pipeline: self.shared.default_pipeline.clone(),
            options: LoadOptions::with_priority(priority),
        };
        self.load_request(request, callback)
    }

    /// Loads with a per-request pipeline and options.
    pub fn load_request(
        &self,
        request: LoadRequest<T>,
        callback: impl FnOnce(LoadResult<T>) + Send + 'static,
    ) -> LoadHandle {
        self.shared.load(request, Box::new(callback))
    }

    /// Blocks until `key` is loaded or `timeout` passes.
    ///
    /// Must not be called from a callback: the worker running it may be the one
    /// the load is queued behind.
    pub fn get(
        &self,
        key: Fingerprint,
        priority: Priority,
        timeout: Duration,
    ) -> Result<Loaded<T>, LoadError> {
        let label = key.to_string();
        let (tx, rx) = crossbeam_channel::bounded(1);
        // Set once the caller stops waiting; a result delivered after that is
        // released by the callback itself.
        let abandoned = Arc::new(Mutex::new(false));
        let engine = Arc::downgrade(&self.shared);
        let flag = Arc::clone(&abandoned);
        let handle = self.load(key, priority, move |result| {
            let abandoned = flag.lock().unwrap_or_else(|e| e.into_inner());
            if !*abandoned {
                let _ = tx.send(result);
                return;
            }
            drop(abandoned);
            if let (Ok(loaded), Some(engine)) = (result, engine.upgrade()) {
                engine.release(loaded.resource);
            }
        });
        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(_) => {
                handle.cancel();
                let raced = {
                    let mut abandoned = abandoned.lock().unwrap_or_else(|e| e.into_inner());
                    *abandoned = true;
                    rx.try_recv().ok()
                };
                if let Some(Ok(loaded)) = raced {
                    self.release(loaded.resource);
                }
                Err(LoadError::TimedOut(label))
            }
        }
    }

    /// Hands a resource back.
    ///
    /// When the last acquisition of a memory-cacheable resource is released it
    /// moves to the memory cache; anything else is recycled into the buffer
    /// pool once its last handle is released. Releasing more often than the
    /// resource was acquired panics if `assert_balanced_release` is set and is
    /// logged otherwise.
    pub fn release(&self, resource: Resource<T>) {
        self.shared.release(resource);
    }

    /// Shrinks the memory tiers.
    pub fn trim_memory(&self, pressure: MemoryPressure) {
        let shared = &self.shared;
        match pressure {
            MemoryPressure::Moderate => {
                shared
                    .memory_cache
                    .trim_to_size(shared.memory_cache.current_size() / 2);
                shared
                    .buffer_pool
                    .trim_to(shared.buffer_pool.pooled_bytes() / 2);
            }
            MemoryPressure::Critical => {
                shared.memory_cache.clear();
                shared.buffer_pool.clear();
            }
        }
        shared.sample_memory();
        let reaped = shared.lock().active.reap();
        log::debug!("Trimmed memory ({pressure:?}), reaped {reaped} dead active entries");
    }

    /// Empties the memory cache and the buffer pool. Active resources stay.
    pub fn clear_memory(&self) {
        self.shared.memory_cache.clear();
        self.shared.buffer_pool.clear();
        self.shared.sample_memory();
    }

    /// Deletes every disk cache entry. Blocks on file I/O.
    pub fn clear_disk_cache(&self) {
        self.shared.disk_cache.clear();
    }

    /// Stops the executors and fails every pending load with
    /// [`LoadError::Shutdown`]. Queued stages are discarded. Idempotent.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }

    /// `true` once [`shutdown`](Self::shutdown) has started.
    pub fn is_shut_down(&self) -> bool {
        self.shared.lock().shut_down
    }

    /// Number of jobs currently in flight.
    pub fn in_flight(&self) -> usize {
        self.shared.lock().jobs.len()
    }

    /// State of the in-flight job for `key`, if any.
    pub fn job_state(&self, key: &Fingerprint) -> Option<JobState> {
        self.shared.lock().jobs.get(key).map(|job| job.state())
    }

    /// Outstanding acquisitions of the active resource for `key`.
    pub fn acquired_count(&self, key: &Fingerprint) -> usize {
        self.shared.lock().active.acquired_count(key)
    }

    /// `true` if `key` is in the memory cache.
    pub fn is_memory_cached(&self, key: &Fingerprint) -> bool {
        self.shared.memory_cache.contains(key)
    }

    /// Bytes held by the memory cache.
    pub fn memory_cache_size(&self) -> usize {
        self.shared.memory_cache.current_size()
    }

    /// Buffer pool statistics.
    pub fn buffer_pool_stats(&self) -> BufferPoolStats {
        self.shared.buffer_pool.stats()
    }
}

impl<T: Decoded> Drop for Engine<T> {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

impl<T: Decoded> EngineShared<T> {
    fn lock(&self) -> MutexGuard<'_, EngineState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sample_memory(&self) {
        sample(
            &self.metrics.memory_cache_bytes,
            self.memory_cache.current_size(),
        );
        sample(&self.metrics.pooled_bytes, self.buffer_pool.pooled_bytes());
    }

    fn context<'a>(&'a self, job: &'a EngineJob<T>) -> LaneContext<'a, T> {
        LaneContext {
            key: job.key(),
            pipeline: &job.pipeline,
            options: job.options,
            cancel: &job.cancel,
            buffers: self.buffer_pool.as_ref(),
            disk_cache: self.disk_cache.as_ref(),
        }
    }

    fn load(self: &Arc<Self>, request: LoadRequest<T>, callback: LoadCallback<T>) -> LoadHandle {
        let LoadRequest {
            key,
            pipeline,
            options,
        } = request;
        let mut state = self.lock();

        if state.shut_down {
            drop(state);
            callback(Err(LoadError::Shutdown));
            return LoadHandle::delivered();
        }

        if !options.skip_memory_cache {
            if let Some(resource) = state.active.acquire(&key) {
                drop(state);
                log::trace!("Active hit for {key}");
                bump(&self.metrics.active_hits);
                callback(Ok(Loaded {
                    resource,
                    source: DataSource::ActiveResources,
                }));
                return LoadHandle::delivered();
            }
            if let Some(resource) = self.memory_cache.take(&key) {
                state.active.activate(&resource, 1);
                drop(state);
                self.sample_memory();
                log::trace!("Memory cache hit for {key}");
                bump(&self.metrics.memory_hits);
                callback(Ok(Loaded {
                    resource,
                    source: DataSource::MemoryCache,
                }));
                return LoadHandle::delivered();
            }
        }

        let waiter_id = self.next_waiter.fetch_add(1, Ordering::Relaxed);
        let waiter = Waiter {
            id: waiter_id,
            priority: options.priority,
            callback,
        };
        if let Some(job) = state.jobs.get(&key) {
            let job = Arc::clone(job);
            job.attach(waiter, &options);
            drop(state);
            log::trace!("Attached to in-flight job for {key}");
            return self.handle(&job, waiter_id);
        }

        let job = Arc::new(EngineJob::new(key.clone(), pipeline, options));
        job.attach(waiter, &options);
        state.jobs.insert(key.clone(), Arc::clone(&job));
        drop(state);

        log::debug!("Started job for {key} at {:?}", options.priority);
        bump(&self.metrics.jobs_started);
        let handle = self.handle(&job, waiter_id);
        if job.advance(JobState::Fetching) {
            self.submit(&self.executors.disk_cache, &job, Self::run_disk_stage);
        }
        handle
    }

    fn handle(self: &Arc<Self>, job: &Arc<EngineJob<T>>, waiter: WaiterId) -> LoadHandle {
        let engine: Weak<Self> = Arc::downgrade(self);
        let job = Arc::clone(job);
        LoadHandle::pending(move || {
            if let Some(engine) = engine.upgrade() {
                engine.detach(&job, waiter);
            }
        })
    }

    fn detach(&self, job: &Arc<EngineJob<T>>, waiter: WaiterId) {
        let (removed, cancelled) = {
            let mut state = self.lock();
            let (removed, empty) = job.detach(waiter);
            let cancelled = removed.is_some() && empty && state.remove_job(job);
            if cancelled {
                job.cancel.cancel();
                job.finish(JobState::Cancelled);
            }
            (removed, cancelled)
        };
        if cancelled {
            log::debug!("Cancelled job for {}", job.key());
            bump(&self.metrics.cancellations);
        }
        // The callback may own values whose drop takes other locks.
        drop(removed);
    }

    /// Queues `stage` for `job`, failing the job if the executor is gone.
    fn submit(
        self: &Arc<Self>,
        executor: &TaskExecutor,
        job: &Arc<EngineJob<T>>,
        stage: impl FnOnce(&Arc<Self>, &Arc<EngineJob<T>>) + Send + 'static,
    ) {
        let shared = Arc::clone(self);
        let task_job = Arc::clone(job);
        let submitted = executor.submit(job.options.priority, move || {
            stage(&shared, &task_job);
        });
        if let Err(e) = submitted {
            log::debug!("Could not schedule job for {}: {e}", job.key());
            self.fail(job, LoadError::Shutdown);
        }
    }

    fn run_disk_stage(self: &Arc<Self>, job: &Arc<EngineJob<T>>) {
        if job.cancel.is_cancelled() {
            return;
        }
        let cached = SourceLane.read_disk_cache(&self.context(job));
        self.after_disk_lookup(job, cached);
    }

    /// Drops a cache entry whose bytes did not decode and carries on with the
    /// tiers below it.
    fn run_recovery_stage(self: &Arc<Self>, job: &Arc<EngineJob<T>>, corrupt: DataSource) {
        if job.cancel.is_cancelled() {
            return;
        }
        let cached = SourceLane.discard_corrupt(&self.context(job), corrupt);
        self.after_disk_lookup(job, cached);
    }

    fn after_disk_lookup(self: &Arc<Self>, job: &Arc<EngineJob<T>>, cached: Option<Fetched>) {
        if let Some(fetched) = cached {
            bump(&self.metrics.disk_hits);
            self.schedule_decode(job, fetched);
            return;
        }
        // Decided under the engine lock, where callers attach.
        let not_cached = {
            let mut state = self.lock();
            if job.fetch_allowed() {
                None
            } else if state.remove_job(job) {
                Some(job.finish(JobState::Failed))
            } else {
                return;
            }
        };
        match not_cached {
            Some(waiters) => {
                let error = LoadError::NotCached(job.key().to_string());
                self.deliver_failure(job, waiters, error);
            }
            None => self.submit(&self.executors.source, job, Self::run_source_stage),
        }
    }

    fn run_source_stage(self: &Arc<Self>, job: &Arc<EngineJob<T>>) {
        let fetched = SourceLane.fetch(&self.context(job));
        match fetched {
            Ok(fetched) => {
                bump(&self.metrics.fetches);
                self.schedule_decode(job, fetched);
            }
            Err(_) if job.cancel.is_cancelled() => {
                log::debug!("Fetch of {} stopped by cancellation", job.key());
            }
            Err(e) => self.fail(job, e.into()),
        }
    }

    fn schedule_decode(self: &Arc<Self>, job: &Arc<EngineJob<T>>, fetched: Fetched) {
        if !job.advance(JobState::Decoding) {
            self.buffer_pool.put_buffer(fetched.bytes);
            return;
        }
        self.submit(&self.executors.decode, job, move |shared, job| {
            shared.run_decode_stage(job, fetched);
        });
    }

    fn run_decode_stage(self: &Arc<Self>, job: &Arc<EngineJob<T>>, fetched: Fetched) {
        let source = fetched.source;
        let from_disk = matches!(
            source,
            DataSource::ResourceDiskCache | DataSource::DataDiskCache
        );
        let decoded = self.decode_lane.decode(&self.context(job), fetched);
        match decoded {
            Ok(value) => self.complete(job, value, source),
            Err(_) if job.cancel.is_cancelled() => {
                log::debug!("Decode of {} stopped by cancellation", job.key());
            }
            Err(e) if from_disk => {
                log::warn!("Discarding undecodable {source:?} entry for {}: {e}", job.key());
                if job.advance(JobState::Fetching) {
                    self.submit(&self.executors.disk_cache, job, move |shared, job| {
                        shared.run_recovery_stage(job, source);
                    });
                }
            }
            Err(e) => self.fail(job, e.into()),
        }
    }

    fn complete(self: &Arc<Self>, job: &Arc<EngineJob<T>>, value: T, source: DataSource) {
        let encode = source != DataSource::ResourceDiskCache
            && job.options.disk_cache_strategy.caches_resource(source)
            && job.pipeline.encoder().is_some();
        let (resource, waiters) = {
            let mut state = self.lock();
            if !state.remove_job(job) {
                drop(state);
                log::debug!("Discarding result of cancelled job for {}", job.key());
                Resource::new(job.key().clone(), value, false).recycle(self.buffer_pool.as_ref());
                return;
            }
            let resource = Resource::new(job.key().clone(), value, job.memory_cacheable());
            let waiters = job.finish(if encode {
                JobState::Encoding
            } else {
                JobState::Complete
            });
            if resource.is_memory_cacheable() {
                state.active.activate(&resource, waiters.len());
            }
            (resource, waiters)
        };
        log::debug!(
            "Completed job for {} from {source:?}, delivering to {} callbacks",
            job.key(),
            waiters.len()
        );

        if encode {
            let pending = resource.clone();
            self.submit(&self.executors.disk_cache, job, move |shared, job| {
                let written = EncodeLane.encode(&shared.context(job), pending.get(), source);
                log::trace!("Resource cache write for {}: {written}", job.key());
                job.advance(JobState::Complete);
                pending.recycle(shared.buffer_pool.as_ref());
            });
        }

        for waiter in waiters {
            (waiter.callback)(Ok(Loaded {
                resource: resource.clone(),
                source,
            }));
        }
        resource.recycle(self.buffer_pool.as_ref());
    }

    fn fail(&self, job: &Arc<EngineJob<T>>, error: LoadError) {
        let waiters = {
            let mut state = self.lock();
            if !state.remove_job(job) {
                return;
            }
            job.finish(JobState::Failed)
        };
        self.deliver_failure(job, waiters, error);
    }

    fn deliver_failure(&self, job: &EngineJob<T>, waiters: Vec<Waiter<T>>, error: LoadError) {
        log::debug!("Job for {} failed: {error}", job.key());
        bump(&self.metrics.failures);
        for waiter in waiters {
            (waiter.callback)(Err(error.clone()));
        }
    }

    fn release(&self, resource: Resource<T>) {
        if !resource.is_memory_cacheable() {
            resource.recycle(self.buffer_pool.as_ref());
            return;
        }
        let mut state = self.lock();
        match state.active.release(&resource) {
            Ok(ReleaseOutcome::StillActive { .. }) => {}
            Ok(ReleaseOutcome::Inactive) => {
                let rejected = self.memory_cache.put(resource);
                drop(state);
                if let Some(rejected) = rejected {
                    log::trace!("{} exceeds the memory cache budget", rejected.key());
                    rejected.recycle(self.buffer_pool.as_ref());
                }
                self.sample_memory();
            }
            Err(e) => {
                drop(state);
                self.unbalanced_release(e);
            }
        }
    }

    fn unbalanced_release(&self, error: ReleaseError) {
        if self.assert_balanced_release {
            panic!("Unbalanced release: {error}");
        }
        log::warn!("Unbalanced release ignored: {error}");
    }

    fn shutdown(&self) {
        {
            let mut state = self.lock();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
        }
        log::debug!("Engine shutting down");
        self.executors.shutdown();

        let orphaned: Vec<_> = {
            let mut state = self.lock();
            state
                .jobs
                .drain()
                .map(|(_, job)| {
                    job.cancel.cancel();
                    job.finish(JobState::Failed)
                })
                .collect()
        };
        for waiter in orphaned.into_iter().flatten() {
            (waiter.callback)(Err(LoadError::Shutdown));
        }
    }
}
