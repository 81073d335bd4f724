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

//! The append-only journal format.
//!
//! ```text
//! quarry.DiskLruCache
//! 1
//! <app version>
//!
//! DIRTY 3f2a...
//! CLEAN 3f2a... 1832
//! READ 3f2a...
//! REMOVE 3f2a...
//! ```
//!
//! Every edit starts with `DIRTY` and ends with either `CLEAN <length>` or
//! `REMOVE`. A `DIRTY` record with no matching end marks an edit that was
//! interrupted; its staging file is deleted when the store is opened.

use super::error::DiskCacheError;
use std::fmt;
use std::io::{self, Write};

pub(super) const MAGIC: &str = "quarry.DiskLruCache";
pub(super) const FORMAT_VERSION: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Record {
    Dirty(String),
    Clean(String, u64),
    Remove(String),
    Read(String),
}

impl Record {
    fn parse(line: &str) -> Result<Self, DiskCacheError> {
        let corrupt = || DiskCacheError::CorruptJournal(format!("bad record {line:?}"));
        let mut parts = line.split(' ');
        let tag = parts.next().ok_or_else(corrupt)?;
        let key = parts.next().filter(|k| !k.is_empty()).ok_or_else(corrupt)?;
        let record = match tag {
            "DIRTY" => Self::Dirty(key.to_string()),
            "REMOVE" => Self::Remove(key.to_string()),
            "READ" => Self::Read(key.to_string()),
            "CLEAN" => {
                let length = parts
                    .next()
                    .and_then(|len| len.parse().ok())
                    .ok_or_else(corrupt)?;
                Self::Clean(key.to_string(), length)
            }
            _ => return Err(corrupt()),
        };
        match parts.next() {
            Some(_) => Err(corrupt()),
            None => Ok(record),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dirty(key) => write!(f, "DIRTY {key}"),
            Self::Clean(key, length) => write!(f, "CLEAN {key} {length}"),
            Self::Remove(key) => write!(f, "REMOVE {key}"),
            Self::Read(key) => write!(f, "READ {key}"),
        }
    }
}

pub(super) fn write_header(out: &mut impl Write, app_version: u32) -> io::Result<()> {
    writeln!(out, "{MAGIC}")?;
    writeln!(out, "{FORMAT_VERSION}")?;
    writeln!(out, "{app_version}")?;
    writeln!(out)
}

/// A parsed journal.
#[derive(Debug)]
pub(super) struct Replay {
    pub records: Vec<Record>,
    /// The last line was cut short by a crash and was ignored.
    pub truncated: bool,
}

/// Parses journal text written for `app_version`.
///
/// A header mismatch, including a different app version, is reported as
/// corruption so the caller starts over with an empty cache.
pub(super) fn parse(text: &str, app_version: u32) -> Result<Replay, DiskCacheError> {
    let mut lines = text.split('\n');
    let header: Vec<&str> = lines.by_ref().take(4).collect();
    let version = app_version.to_string();
    let expected = [MAGIC, FORMAT_VERSION, version.as_str(), ""];
    if header.len() < 4 || header[..] != expected[..] {
        return Err(DiskCacheError::CorruptJournal(format!(
            "unexpected header {header:?}"
        )));
    }

    let body: Vec<&str> = lines.collect();
    // A complete journal ends with a newline, leaving an empty final segment.
    let (complete, last) = match body.split_last() {
        Some((last, complete)) => (complete, *last),
        None => (&body[..], ""),
    };
    let records = complete
        .iter()
        .map(|line| Record::parse(line))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Replay {
        records,
        truncated: !last.is_empty(),
    })
}
