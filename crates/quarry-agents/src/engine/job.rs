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

//! The in-flight unit of work for one fingerprint.

use super::request::LoadCallback;
use quarry_core::strategy::CancelFlag;
use quarry_core::{Decoded, Fingerprint, LoadOptions, Pipeline, Priority};
use std::sync::{Mutex, MutexGuard};

/// Lifecycle of a job.
///
/// `Cancelled` and `Failed` are reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Registered, nothing submitted yet.
    Created,
    /// Reading the disk cache or fetching from the source.
    Fetching,
    /// Decoding and transforming.
    Decoding,
    /// Delivered; the result is being written to the resource cache.
    Encoding,
    /// Delivered.
    Complete,
    /// Every callback detached before completion.
    Cancelled,
    /// Fetch or decode failed; every callback got the error.
    Failed,
}

impl JobState {
    /// `true` for `Complete`, `Cancelled` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled | Self::Failed)
    }
}

pub(crate) type WaiterId = u64;

pub(crate) struct Waiter<T: Decoded> {
    pub id: WaiterId,
    pub priority: Priority,
    pub callback: LoadCallback<T>,
}

struct JobInner<T: Decoded> {
    state: JobState,
    waiters: Vec<Waiter<T>>,
    fetch_allowed: bool,
    memory_cacheable: bool,
}

/// One job per fingerprint, whatever options its callers asked for.
///
/// The job runs with the pipeline, disk cache strategy and priority of the
/// caller that created it. Later callers can only widen it: one that may fetch
/// lifts a cache-only restriction, and one that wants memory caching makes the
/// result memory-cacheable.
///
/// Waiters are attached, detached and drained only while the engine lock is
/// held, so a waiter can never be added to a job that has already been drained.
pub(crate) struct EngineJob<T: Decoded> {
    pub key: Fingerprint,
    pub pipeline: Pipeline<T>,
    pub options: LoadOptions,
    pub cancel: CancelFlag,
    inner: Mutex<JobInner<T>>,
}

impl<T: Decoded> EngineJob<T> {
    pub fn new(key: Fingerprint, pipeline: Pipeline<T>, options: LoadOptions) -> Self {
        Self {
            key,
            pipeline,
            options,
            cancel: CancelFlag::new(),
            inner: Mutex::new(JobInner {
                state: JobState::Created,
                waiters: Vec::new(),
                fetch_allowed: !options.only_retrieve_from_cache,
                memory_cacheable: !options.skip_memory_cache,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, JobInner<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn key(&self) -> &Fingerprint {
        &self.key
    }

    pub fn state(&self) -> JobState {
        self.lock().state
    }

    /// Moves to a non-terminal state. Returns `false` if the job already ended.
    pub fn advance(&self, next: JobState) -> bool {
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            return false;
        }
        log::trace!("Job {}: {:?} -> {next:?}", self.key(), inner.state);
        inner.state = next;
        true
    }

    pub fn attach(&self, waiter: Waiter<T>, options: &LoadOptions) {
        let mut inner = self.lock();
        inner.fetch_allowed |= !options.only_retrieve_from_cache;
        inner.memory_cacheable |= !options.skip_memory_cache;
        inner.waiters.push(waiter);
    }

    /// `false` while every caller asked for cached results only.
    pub fn fetch_allowed(&self) -> bool {
        self.lock().fetch_allowed
    }

    /// `true` once any caller wants the result kept in memory.
    pub fn memory_cacheable(&self) -> bool {
        self.lock().memory_cacheable
    }

    /// Removes a waiter. Also returns whether none are left.
    pub fn detach(&self, id: WaiterId) -> (Option<Waiter<T>>, bool) {
        let mut inner = self.lock();
        let removed = inner
            .waiters
            .iter()
            .position(|waiter| waiter.id == id)
            .map(|index| inner.waiters.remove(index));
        (removed, inner.waiters.is_empty())
    }

    pub fn waiter_count(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Ends the job and hands out its waiters, highest priority first and in
    /// attach order within a priority.
    pub fn finish(&self, terminal: JobState) -> Vec<Waiter<T>> {
        let mut inner = self.lock();
        log::trace!("Job {}: {:?} -> {terminal:?}", self.key(), inner.state);
        inner.state = terminal;
        let mut waiters = std::mem::take(&mut inner.waiters);
        waiters.sort_by_key(|waiter| waiter.priority.rank());
        waiters
    }
}
