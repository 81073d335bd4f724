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

//! A fixed-size thread pool that runs tasks by priority, FIFO within a priority.

use super::error::ExecutorError;
use quarry_core::config::{ExecutorConfig, UncaughtPolicy};
use quarry_core::options::Priority;
use std::any::Any;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

type Task = Box<dyn FnOnce() + Send + 'static>;

struct QueuedTask {
    rank: u8,
    /// Assigned under the queue lock, so it reflects the true submission order.
    seq: u64,
    task: Task,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    // `BinaryHeap` pops the greatest element: lowest rank first, then oldest.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .rank
            .cmp(&self.rank)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Queue {
    heap: BinaryHeap<QueuedTask>,
    next_seq: u64,
    accepting: bool,
}

struct Shared {
    name: String,
    policy: UncaughtPolicy,
    queue: Mutex<Queue>,
    available: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_task(&self) -> Option<Task> {
        let mut queue = self.lock();
        loop {
            if !queue.accepting {
                return None;
            }
            if let Some(queued) = queue.heap.pop() {
                return Some(queued.task);
            }
            queue = self
                .available
                .wait(queue)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    fn run(&self, task: Task) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
            let message = panic_message(payload.as_ref());
            match self.policy {
                UncaughtPolicy::Ignore => {}
                UncaughtPolicy::Log => {
                    log::error!("Task on executor '{}' panicked: {message}", self.name);
                }
                UncaughtPolicy::Crash => {
                    log::error!(
                        "Task on executor '{}' panicked, aborting: {message}",
                        self.name
                    );
                    log::logger().flush();
                    std::process::abort();
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A pool of named worker threads draining one priority queue.
///
/// Tasks with a lower [`Priority::rank`] run first; equal priorities run in
/// submission order, even when submitted concurrently. A panicking task is
/// handled according to the pool's [`UncaughtPolicy`].
///
/// [`shutdown`](Self::shutdown) discards queued tasks, lets running ones finish
/// and joins the workers. Dropping the executor shuts it down.
pub struct TaskExecutor {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskExecutor {
    /// Starts `threads` workers (at least one) named `<name>-<index>`.
    pub fn new(
        name: impl Into<String>,
        threads: usize,
        policy: UncaughtPolicy,
    ) -> Result<Self, ExecutorError> {
        let shared = Arc::new(Shared {
            name: name.into(),
            policy,
            queue: Mutex::new(Queue {
                heap: BinaryHeap::new(),
                next_seq: 0,
                accepting: true,
            }),
            available: Condvar::new(),
        });
        let executor = Self {
            shared,
            workers: Mutex::new(Vec::new()),
        };
        for index in 0..threads.max(1) {
            let shared = Arc::clone(&executor.shared);
            let handle = thread::Builder::new()
                .name(format!("{}-{index}", executor.shared.name))
                .spawn(move || {
                    while let Some(task) = shared.next_task() {
                        shared.run(task);
                    }
                })?;
            executor.lock_workers().push(handle);
        }
        log::debug!(
            "Started executor '{}' with {} threads ({:?} on panic)",
            executor.shared.name,
            threads.max(1),
            policy
        );
        Ok(executor)
    }

    /// Starts an executor from its configuration section.
    pub fn from_config(name: &str, config: &ExecutorConfig) -> Result<Self, ExecutorError> {
        Self::new(name, config.threads, config.policy)
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The executor's name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Queues `task`. Fails once the executor is shut down.
    pub fn submit(
        &self,
        priority: Priority,
        task: impl FnOnce() + Send + 'static,
    ) -> Result<(), ExecutorError> {
        {
            let mut queue = self.shared.lock();
            if !queue.accepting {
                return Err(ExecutorError::Shutdown(self.shared.name.clone()));
            }
            let seq = queue.next_seq;
            queue.next_seq += 1;
            queue.heap.push(QueuedTask {
                rank: priority.rank(),
                seq,
                task: Box::new(task),
            });
        }
        self.shared.available.notify_one();
        Ok(())
    }

    /// Number of tasks waiting for a worker.
    pub fn queued(&self) -> usize {
        self.shared.lock().heap.len()
    }

    /// `true` until [`shutdown`](Self::shutdown) is called.
    pub fn is_running(&self) -> bool {
        self.shared.lock().accepting
    }

    /// Stops accepting tasks, discards queued ones and joins the workers.
    ///
    /// Idempotent. When called from one of this executor's own workers, that
    /// worker is not joined; it exits after its current task.
    pub fn shutdown(&self) {
        let discarded = {
            let mut queue = self.shared.lock();
            queue.accepting = false;
            std::mem::take(&mut queue.heap)
        };
        self.shared.available.notify_all();
        if !discarded.is_empty() {
            log::debug!(
                "Executor '{}' discarded {} queued tasks",
                self.shared.name,
                discarded.len()
            );
        }
        // Tasks may own resources whose drop takes other locks.
        drop(discarded);

        let workers = std::mem::take(&mut *self.lock_workers());
        let current = thread::current().id();
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                log::error!("A worker of executor '{}' panicked", self.shared.name);
            }
        }
    }
}

impl Drop for TaskExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
