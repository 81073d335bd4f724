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

use std::fmt;
use std::sync::Mutex;

type Detach = Box<dyn FnOnce() + Send + 'static>;

/// Returned by every load. Dropping it does nothing; call
/// [`cancel`](Self::cancel) to stop waiting.
pub struct LoadHandle {
    detach: Mutex<Option<Detach>>,
}

impl LoadHandle {
    pub(crate) fn pending(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Mutex::new(Some(Box::new(detach))),
        }
    }

    /// A handle for a load that has already been delivered.
    pub(crate) fn delivered() -> Self {
        Self {
            detach: Mutex::new(None),
        }
    }

    /// Detaches this handle's callback from its job.
    ///
    /// A callback still attached to its job will not be invoked. One whose job
    /// already completed may be running on a worker thread while this returns.
    /// When the last callback of a job detaches, the job is cancelled.
    ///
    /// Cache hits are delivered before `load` returns, so cancelling them does
    /// nothing; the resource still has to be released.
    pub fn cancel(&self) {
        let detach = self
            .detach
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(detach) = detach {
            detach();
        }
    }

    /// `false` for cache hits and once [`cancel`](Self::cancel) was called.
    pub fn is_pending(&self) -> bool {
        self.detach
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl fmt::Debug for LoadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadHandle")
            .field("pending", &self.is_pending())
            .finish()
    }
}
