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

//! The tier of resources currently held by at least one caller.

use quarry_core::key::Fingerprint;
use quarry_core::resource::{Decoded, Resource, WeakResource};
use std::collections::HashMap;
use thiserror::Error;

/// Why a release was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReleaseError {
    /// Nothing is active under this fingerprint, so the release is unmatched.
    #[error("resource {0} is not active")]
    NotActive(String),
    /// A different resource instance is active under this fingerprint.
    #[error("resource {0} does not match the active instance")]
    Mismatch(String),
}

/// The result of a successful release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Other acquisitions are still outstanding.
    StillActive {
        /// How many.
        remaining: usize,
    },
    /// That was the last one; the entry is gone.
    Inactive,
}

struct ActiveEntry<T: Decoded> {
    resource: WeakResource<T>,
    acquired: usize,
}

/// Reference-counted registry of in-use resources.
///
/// Entries hold the resource weakly. If every caller drops its handle without
/// releasing, the entry goes dead and is reaped on the next lookup or on
/// [`reap`](Self::reap); the value is freed but never recycled or cached.
///
/// Not synchronized: the engine guards it with the same lock as its job table.
pub struct ActiveResources<T: Decoded> {
    entries: HashMap<Fingerprint, ActiveEntry<T>>,
}

impl<T: Decoded> ActiveResources<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Returns the active resource for `key` and counts one more acquisition.
    pub fn acquire(&mut self, key: &Fingerprint) -> Option<Resource<T>> {
        let entry = self.entries.get_mut(key)?;
        match entry.resource.upgrade() {
            Some(resource) => {
                entry.acquired += 1;
                Some(resource)
            }
            None => {
                log::warn!(
                    "Resource {key} was dropped with {} unreleased acquisitions",
                    entry.acquired
                );
                self.entries.remove(key);
                None
            }
        }
    }

    /// Registers `resource` as active with `acquired` outstanding acquisitions.
    ///
    /// Replaces any entry under the same fingerprint.
    pub fn activate(&mut self, resource: &Resource<T>, acquired: usize) {
        if acquired == 0 {
            return;
        }
        let key = resource.key().clone();
        let previous = self.entries.insert(
            key,
            ActiveEntry {
                resource: resource.downgrade(),
                acquired,
            },
        );
        if let Some(previous) = previous {
            if !previous.resource.is_dead() && !previous.resource.points_to(resource) {
                log::warn!(
                    "Resource {} replaced a live active instance",
                    resource.key()
                );
            }
        }
    }

    /// Counts one release of `resource`.
    pub fn release(&mut self, resource: &Resource<T>) -> Result<ReleaseOutcome, ReleaseError> {
        let key = resource.key();
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| ReleaseError::NotActive(key.to_string()))?;
        if !entry.resource.points_to(resource) {
            return Err(ReleaseError::Mismatch(key.to_string()));
        }
        entry.acquired -= 1;
        if entry.acquired == 0 {
            self.entries.remove(key);
            Ok(ReleaseOutcome::Inactive)
        } else {
            Ok(ReleaseOutcome::StillActive {
                remaining: entry.acquired,
            })
        }
    }

    /// Outstanding acquisitions for `key`, zero if inactive.
    pub fn acquired_count(&self, key: &Fingerprint) -> usize {
        self.entries.get(key).map_or(0, |entry| entry.acquired)
    }

    /// `true` if `key` has an entry, live or not yet reaped.
    pub fn contains(&self, key: &Fingerprint) -> bool {
        self.entries.contains_key(key)
    }

    /// Drops entries whose resource has been freed. Returns how many.
    pub fn reap(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, entry| {
            let alive = !entry.resource.is_dead();
            if !alive {
                log::warn!("Reaped resource {key} that was never released");
            }
            alive
        });
        before - self.entries.len()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if nothing is active.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Decoded> Default for ActiveResources<T> {
    fn default() -> Self {
        Self::new()
    }
}
