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

//! A bounded, journaled key → file store.
//!
//! Each committed entry is one file named after its key. Writes go to
//! `<key>.tmp` and become visible only through an atomic rename on commit, so a
//! reader never sees a partial entry. The journal records every edit and read so
//! the LRU order and sizes survive restarts.

use super::error::DiskCacheError;
use super::journal::{self, Record};
use lru::LruCache;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};

const JOURNAL_FILE: &str = "journal";
const JOURNAL_TMP_FILE: &str = "journal.tmp";
const MAX_KEY_LEN: usize = 120;
const COMPACT_THRESHOLD: usize = 2000;

fn open_directories() -> &'static Mutex<HashSet<PathBuf>> {
    static OPEN: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    OPEN.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Marks a directory as owned by one open store for the life of this value.
#[derive(Debug)]
struct DirectoryClaim(PathBuf);

impl DirectoryClaim {
    fn acquire(directory: &Path) -> Result<Self, DiskCacheError> {
        let mut open = open_directories()
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if !open.insert(directory.to_path_buf()) {
            return Err(DiskCacheError::DirectoryInUse(directory.to_path_buf()));
        }
        Ok(Self(directory.to_path_buf()))
    }
}

impl Drop for DirectoryClaim {
    fn drop(&mut self) {
        open_directories()
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.0);
    }
}

#[derive(Debug, Default)]
struct Entry {
    /// Length of the committed file, `None` while only a first edit exists.
    length: Option<u64>,
    editing: bool,
}

#[derive(Debug)]
struct State {
    entries: HashMap<String, Entry>,
    /// Recency of committed entries only.
    lru: LruCache<String, ()>,
    size: u64,
    journal: Option<BufWriter<File>>,
    redundant: usize,
}

impl Default for State {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruCache::unbounded(),
            size: 0,
            journal: None,
            redundant: 0,
        }
    }
}

impl State {
    fn replay(&mut self, records: Vec<Record>) {
        let total = records.len();
        for record in records {
            match record {
                Record::Dirty(key) => self.entries.entry(key).or_default().editing = true,
                Record::Clean(key, length) => {
                    let entry = self.entries.entry(key.clone()).or_default();
                    self.size -= entry.length.unwrap_or(0);
                    self.size += length;
                    entry.length = Some(length);
                    entry.editing = false;
                    self.lru.put(key, ());
                }
                Record::Remove(key) => {
                    if let Some(entry) = self.entries.remove(&key) {
                        self.size -= entry.length.unwrap_or(0);
                    }
                    self.lru.pop(&key);
                }
                Record::Read(key) => {
                    if self.entries.get(&key).is_some_and(|e| e.length.is_some()) {
                        self.lru.promote(&key);
                    }
                }
            }
        }
        self.redundant = total.saturating_sub(self.entries.len());
    }

    fn append(&mut self, record: Record, flush: bool) -> Result<(), DiskCacheError> {
        let journal = self.journal.as_mut().ok_or(DiskCacheError::Closed)?;
        writeln!(journal, "{record}")?;
        if flush {
            journal.flush()?;
        }
        Ok(())
    }
}

/// A size-bounded LRU store of byte blobs in a directory it owns exclusively.
///
/// At most one instance per directory may be open in a process; a second
/// [`open`](Self::open) fails with [`DiskCacheError::DirectoryInUse`] until the
/// first is dropped.
#[derive(Debug)]
pub struct DiskLruCache {
    directory: PathBuf,
    app_version: u32,
    max_size: u64,
    state: Mutex<State>,
    _claim: DirectoryClaim,
}

impl DiskLruCache {
    /// Opens the store in `directory`, creating it if needed.
    ///
    /// An unreadable journal, or one written by a different `app_version`,
    /// discards everything in the directory.
    pub fn open(
        directory: impl AsRef<Path>,
        app_version: u32,
        max_size: u64,
    ) -> Result<Self, DiskCacheError> {
        fs::create_dir_all(directory.as_ref())?;
        let directory = fs::canonicalize(directory.as_ref())?;
        let claim = DirectoryClaim::acquire(&directory)?;

        let mut state = State::default();
        match fs::read_to_string(directory.join(JOURNAL_FILE)) {
            Ok(text) => match journal::parse(&text, app_version) {
                Ok(replay) => {
                    if replay.truncated {
                        log::warn!(
                            "Disk cache journal in {} ends mid-record, ignoring the tail",
                            directory.display()
                        );
                    }
                    state.replay(replay.records);
                }
                Err(e) => {
                    log::warn!("Discarding disk cache in {}: {e}", directory.display());
                    wipe_directory(&directory)?;
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => wipe_directory(&directory)?,
            Err(e) => return Err(e.into()),
        }

        let cache = Self {
            directory,
            app_version,
            max_size,
            state: Mutex::new(state),
            _claim: claim,
        };
        {
            let mut guard = cache.lock();
            cache.discard_interrupted_edits(&mut guard);
            cache.rebuild_journal(&mut guard)?;
            cache.trim_to_size(&mut guard)?;
            log::debug!(
                "Opened disk cache at {} with {} entries ({} bytes)",
                cache.directory.display(),
                guard.lru.len(),
                guard.size
            );
        }
        Ok(cache)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.directory.join(key)
    }

    fn staging_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{key}.tmp"))
    }

    fn discard_interrupted_edits(&self, state: &mut State) {
        let mut abandoned = Vec::new();
        for (key, entry) in state.entries.iter_mut() {
            if !entry.editing {
                continue;
            }
            entry.editing = false;
            remove_if_exists(&self.staging_path(key));
            if entry.length.is_none() {
                abandoned.push(key.clone());
            }
        }
        for key in abandoned {
            state.entries.remove(&key);
        }
    }

    /// Rewrites the journal with one record per live entry.
    fn rebuild_journal(&self, state: &mut State) -> Result<(), DiskCacheError> {
        if let Some(mut old) = state.journal.take() {
            old.flush()?;
        }
        let tmp_path = self.directory.join(JOURNAL_TMP_FILE);
        {
            let mut out = BufWriter::new(File::create(&tmp_path)?);
            journal::write_header(&mut out, self.app_version)?;
            for (key, _) in state.lru.iter().rev() {
                if let Some(length) = state.entries.get(key).and_then(|e| e.length) {
                    writeln!(out, "{}", Record::Clean(key.clone(), length))?;
                }
            }
            for (key, entry) in &state.entries {
                if entry.editing {
                    writeln!(out, "{}", Record::Dirty(key.clone()))?;
                }
            }
            out.flush()?;
        }
        fs::rename(&tmp_path, self.directory.join(JOURNAL_FILE))?;
        let file = OpenOptions::new()
            .append(true)
            .open(self.directory.join(JOURNAL_FILE))?;
        state.journal = Some(BufWriter::new(file));
        state.redundant = 0;
        Ok(())
    }

    fn compact_if_needed(&self, state: &mut State) -> Result<(), DiskCacheError> {
        if state.redundant >= COMPACT_THRESHOLD && state.redundant >= state.entries.len() {
            log::debug!("Compacting disk cache journal in {}", self.directory.display());
            self.rebuild_journal(state)?;
        }
        Ok(())
    }

    fn remove_entry(&self, state: &mut State, key: &str) -> Result<bool, DiskCacheError> {
        let length = match state.entries.get(key) {
            Some(entry) if !entry.editing => entry.length.unwrap_or(0),
            _ => return Ok(false),
        };
        remove_if_exists(&self.entry_path(key));
        state.entries.remove(key);
        state.lru.pop(key);
        state.size -= length;
        state.redundant += 1;
        state.append(Record::Remove(key.to_string()), true)?;
        Ok(true)
    }

    fn trim_to_size(&self, state: &mut State) -> Result<(), DiskCacheError> {
        while state.size > self.max_size {
            let victim = state
                .lru
                .iter()
                .rev()
                .map(|(key, _)| key)
                .find(|key| state.entries.get(*key).is_some_and(|e| !e.editing))
                .cloned();
            let Some(victim) = victim else { break };
            log::trace!("Evicting disk cache entry {victim}");
            self.remove_entry(state, &victim)?;
        }
        Ok(())
    }

    /// Reads a committed entry.
    ///
    /// A committed entry whose file is missing or has the wrong length is
    /// reported as [`DiskCacheError::CorruptEntry`]; the caller decides whether
    /// to [`remove`](Self::remove) it.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DiskCacheError> {
        validate_key(key)?;
        let expected = {
            let mut guard = self.lock();
            let state = &mut *guard;
            if state.journal.is_none() {
                return Err(DiskCacheError::Closed);
            }
            let Some(length) = state.entries.get(key).and_then(|e| e.length) else {
                return Ok(None);
            };
            state.lru.promote(key);
            state.redundant += 1;
            state.append(Record::Read(key.to_string()), false)?;
            self.compact_if_needed(state)?;
            length
        };

        let bytes = match fs::read(self.entry_path(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DiskCacheError::CorruptEntry {
                    key: key.to_string(),
                    reason: "file is missing".to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        if bytes.len() as u64 != expected {
            return Err(DiskCacheError::CorruptEntry {
                key: key.to_string(),
                reason: format!("expected {expected} bytes, found {}", bytes.len()),
            });
        }
        Ok(Some(bytes))
    }

    /// `true` if a committed entry exists. Does not affect recency.
    pub fn contains(&self, key: &str) -> bool {
        self.lock()
            .entries
            .get(key)
            .is_some_and(|e| e.length.is_some())
    }

    /// Starts an edit of `key`.
    ///
    /// Returns `Ok(None)` if another edit of the same key is in progress.
    pub fn edit(&self, key: &str) -> Result<Option<Editor<'_>>, DiskCacheError> {
        validate_key(key)?;
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            if state.journal.is_none() {
                return Err(DiskCacheError::Closed);
            }
            let entry = state.entries.entry(key.to_string()).or_default();
            if entry.editing {
                return Ok(None);
            }
            entry.editing = true;
            if let Err(e) = state.append(Record::Dirty(key.to_string()), true) {
                drop(guard);
                self.complete_edit(key, false)?;
                return Err(e);
            }
        }
        match File::create(self.staging_path(key)) {
            Ok(file) => Ok(Some(Editor {
                cache: self,
                key: key.to_string(),
                writer: Some(BufWriter::new(file)),
                done: false,
            })),
            Err(e) => {
                self.complete_edit(key, false)?;
                Err(e.into())
            }
        }
    }

    fn complete_edit(&self, key: &str, success: bool) -> Result<(), DiskCacheError> {
        let staging = self.staging_path(key);
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(entry) = state.entries.get_mut(key) else {
            remove_if_exists(&staging);
            return Ok(());
        };
        entry.editing = false;
        let previous = entry.length;

        let mut failure = None;
        let committed = if success {
            let renamed = fs::metadata(&staging).and_then(|meta| {
                fs::rename(&staging, self.entry_path(key))?;
                Ok(meta.len())
            });
            match renamed {
                Ok(length) => Some(length),
                Err(e) => {
                    remove_if_exists(&staging);
                    failure = Some(e);
                    None
                }
            }
        } else {
            remove_if_exists(&staging);
            None
        };

        state.redundant += 1;
        match (committed, previous) {
            (Some(length), _) => {
                entry.length = Some(length);
                state.size = state.size - previous.unwrap_or(0) + length;
                state.lru.put(key.to_string(), ());
                state.append(Record::Clean(key.to_string(), length), true)?;
            }
            (None, Some(length)) => {
                state.append(Record::Clean(key.to_string(), length), true)?;
            }
            (None, None) => {
                state.entries.remove(key);
                state.append(Record::Remove(key.to_string()), true)?;
            }
        }
        self.trim_to_size(state)?;
        self.compact_if_needed(state)?;
        match failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Deletes a committed entry. Returns `false` if it is absent or being edited.
    pub fn remove(&self, key: &str) -> Result<bool, DiskCacheError> {
        validate_key(key)?;
        let mut guard = self.lock();
        let removed = self.remove_entry(&mut guard, key)?;
        self.compact_if_needed(&mut guard)?;
        Ok(removed)
    }

    /// Deletes every entry that is not currently being edited.
    pub fn clear(&self) -> Result<(), DiskCacheError> {
        let mut guard = self.lock();
        let keys: Vec<String> = guard.lru.iter().rev().map(|(key, _)| key.clone()).collect();
        for key in keys {
            self.remove_entry(&mut guard, &key)?;
        }
        self.rebuild_journal(&mut guard)
    }

    /// Writes buffered journal records to disk.
    pub fn flush(&self) -> Result<(), DiskCacheError> {
        match self.lock().journal.as_mut() {
            Some(journal) => Ok(journal.flush()?),
            None => Err(DiskCacheError::Closed),
        }
    }

    /// Flushes and closes the journal. Later calls fail with `Closed`.
    pub fn close(&self) -> Result<(), DiskCacheError> {
        match self.lock().journal.take() {
            Some(mut journal) => Ok(journal.flush()?),
            None => Ok(()),
        }
    }

    /// Total size of committed entries.
    pub fn size(&self) -> u64 {
        self.lock().size
    }

    /// The size budget.
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Number of committed entries.
    pub fn entry_count(&self) -> usize {
        self.lock().lru.len()
    }

    /// The directory this store owns.
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl Drop for DiskLruCache {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!(
                "Failed to flush disk cache journal in {}: {e}",
                self.directory.display()
            );
        }
    }
}

/// An in-progress edit. Dropping it without committing aborts.
pub struct Editor<'a> {
    cache: &'a DiskLruCache,
    key: String,
    writer: Option<BufWriter<File>>,
    done: bool,
}

impl Editor<'_> {
    /// The key being edited.
    pub fn key(&self) -> &str {
        &self.key
    }

    fn finish_writer(&mut self) -> io::Result<()> {
        if let Some(writer) = self.writer.take() {
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        Ok(())
    }

    /// Publishes the written bytes under the key.
    pub fn commit(mut self) -> Result<(), DiskCacheError> {
        self.done = true;
        match self.finish_writer() {
            Ok(()) => self.cache.complete_edit(&self.key, true),
            Err(e) => {
                self.cache.complete_edit(&self.key, false)?;
                Err(e.into())
            }
        }
    }

    /// Discards the written bytes, keeping any previous value.
    pub fn abort(mut self) -> Result<(), DiskCacheError> {
        self.done = true;
        self.writer = None;
        self.cache.complete_edit(&self.key, false)
    }
}

impl Write for Editor<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.writer.as_mut() {
            Some(writer) => writer.write(buf),
            None => Err(io::Error::other("editor already finished")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for Editor<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        self.writer = None;
        if let Err(e) = self.cache.complete_edit(&self.key, false) {
            log::warn!("Failed to abort disk cache edit of {}: {e}", self.key);
        }
    }
}

fn validate_key(key: &str) -> Result<(), DiskCacheError> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && !key.starts_with(JOURNAL_FILE)
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(DiskCacheError::InvalidKey(key.to_string()))
    }
}

fn remove_if_exists(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            log::warn!("Failed to delete {}: {e}", path.display());
        }
    }
}

fn wipe_directory(directory: &Path) -> io::Result<()> {
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    fn put(cache: &DiskLruCache, key: &str, bytes: &[u8]) {
        let mut editor = cache.edit(key).unwrap().expect("no concurrent edit");
        editor.write_all(bytes).unwrap();
        editor.commit().unwrap();
    }

    #[test]
    fn test_commit_then_get_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
            put(&cache, "alpha", b"hello");
            assert_eq!(cache.get("alpha").unwrap(), Some(b"hello".to_vec()));
            assert_eq!(cache.size(), 5);
        }
        let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
        assert_eq!(cache.get("alpha").unwrap(), Some(b"hello".to_vec()));
        assert_eq!(cache.entry_count(), 1);
        assert_eq!(cache.get("beta").unwrap(), None);
    }

    #[test]
    fn test_abort_and_drop_keep_previous_value() {
        let dir = tempdir().unwrap();
        let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
        put(&cache, "alpha", b"v1");

        let mut editor = cache.edit("alpha").unwrap().unwrap();
        editor.write_all(b"partial v2").unwrap();
        editor.abort().unwrap();
        assert_eq!(cache.get("alpha").unwrap(), Some(b"v1".to_vec()));

        {
            let mut editor = cache.edit("alpha").unwrap().unwrap();
            editor.write_all(b"also partial").unwrap();
        }
        assert_eq!(cache.get("alpha").unwrap(), Some(b"v1".to_vec()));

        let editor = cache.edit("fresh").unwrap().unwrap();
        drop(editor);
        assert_eq!(cache.get("fresh").unwrap(), None);
        assert!(!dir.path().join("fresh.tmp").exists());
    }

    #[test]
    fn test_concurrent_edit_of_same_key_is_refused() {
        let dir = tempdir().unwrap();
        let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
        let first = cache.edit("alpha").unwrap().unwrap();
        assert!(cache.edit("alpha").unwrap().is_none());
        assert!(cache.edit("beta").unwrap().is_some());
        first.abort().unwrap();
        assert!(cache.edit("alpha").unwrap().is_some());
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let dir = tempdir().unwrap();
        let cache = DiskLruCache::open(dir.path(), 1, 10).unwrap();
        put(&cache, "a", b"1234");
        put(&cache, "b", b"1234");
        cache.get("a").unwrap();
        put(&cache, "c", b"1234");

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.size(), 8);
        assert!(!dir.path().join("b").exists());
    }

    #[test]
    fn test_interrupted_edit_is_cleaned_on_open() {
        let dir = tempdir().unwrap();
        {
            let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
            put(&cache, "kept", b"ok");
            let mut editor = cache.edit("crashed").unwrap().unwrap();
            editor.write_all(b"half").unwrap();
            // Simulates a process dying mid-write: no commit, no abort.
            std::mem::forget(editor);
        }
        assert!(dir.path().join("crashed.tmp").exists());

        let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
        assert!(!dir.path().join("crashed.tmp").exists());
        assert_eq!(cache.get("crashed").unwrap(), None);
        assert_eq!(cache.get("kept").unwrap(), Some(b"ok".to_vec()));
    }

    #[test]
    fn test_one_open_instance_per_directory() {
        let dir = tempdir().unwrap();
        let first = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
        let err = DiskLruCache::open(dir.path(), 1, 1024).unwrap_err();
        assert!(matches!(err, DiskCacheError::DirectoryInUse(_)));
        drop(first);
        assert!(DiskLruCache::open(dir.path(), 1, 1024).is_ok());
    }

    #[test]
    fn test_app_version_change_discards_contents() {
        let dir = tempdir().unwrap();
        {
            let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
            put(&cache, "alpha", b"old");
        }
        let cache = DiskLruCache::open(dir.path(), 2, 1024).unwrap();
        assert_eq!(cache.get("alpha").unwrap(), None);
        assert!(!dir.path().join("alpha").exists());
    }

    #[test]
    fn test_truncated_entry_is_reported_corrupt() {
        let dir = tempdir().unwrap();
        let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
        put(&cache, "alpha", b"complete");
        fs::write(dir.path().join("alpha"), b"comp").unwrap();

        assert!(matches!(
            cache.get("alpha"),
            Err(DiskCacheError::CorruptEntry { .. })
        ));
        assert!(cache.remove("alpha").unwrap());
        assert_eq!(cache.get("alpha").unwrap(), None);
    }

    #[test]
    fn test_rejects_unsafe_keys() {
        let dir = tempdir().unwrap();
        let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
        for key in ["", "../escape", "UPPER", "journal", "with space"] {
            assert!(
                matches!(cache.get(key), Err(DiskCacheError::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_journal_is_compacted() {
        let dir = tempdir().unwrap();
        {
            let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
            put(&cache, "alpha", b"x");
            for _ in 0..(COMPACT_THRESHOLD + 100) {
                cache.get("alpha").unwrap();
            }
        }
        let journal = fs::read_to_string(dir.path().join(JOURNAL_FILE)).unwrap();
        assert!(journal.lines().count() < 200);
    }

    #[test]
    fn test_clear_removes_entries() {
        let dir = tempdir().unwrap();
        let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
        put(&cache, "a", b"1");
        put(&cache, "b", b"2");
        cache.clear().unwrap();
        assert_eq!(cache.entry_count(), 0);
        assert_eq!(cache.size(), 0);
        assert!(!dir.path().join("a").exists());
    }

    #[test]
    fn test_parallel_writers_of_distinct_keys() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(DiskLruCache::open(dir.path(), 1, 1 << 20).unwrap());
        let workers: Vec<_> = (0..4)
            .map(|i| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for j in 0..10 {
                        put(&cache, &format!("k{i}-{j}"), format!("{i}:{j}").as_bytes());
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(cache.entry_count(), 40);
        assert_eq!(cache.get("k3-9").unwrap(), Some(b"3:9".to_vec()));
    }
}
