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

use quarry_core::error::FetchError;
use quarry_core::strategy::{DataSource, FetchRequest, Fetched, Fetcher};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

const CHUNK: usize = 64 * 1024;

/// Reads models as paths relative to a root directory.
///
/// Bytes are read into a buffer borrowed from the request's provider, in chunks,
/// checking for cancellation between chunks.
#[derive(Debug, Clone)]
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    /// Creates a fetcher serving files under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory models are resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, model: &str) -> Result<PathBuf, FetchError> {
        let relative = Path::new(model);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if model.is_empty() || escapes {
            return Err(FetchError::Failed(format!(
                "model {model:?} is not a path inside {}",
                self.root.display()
            )));
        }
        Ok(self.root.join(relative))
    }

    fn read_into(
        file: &mut File,
        buffer: &mut [u8],
        request: &FetchRequest<'_>,
    ) -> Result<(), FetchError> {
        let mut filled = 0;
        while filled < buffer.len() {
            if request.cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            let end = (filled + CHUNK).min(buffer.len());
            match file.read(&mut buffer[filled..end]) {
                Ok(0) => {
                    return Err(FetchError::Io {
                        model: request.model.to_string(),
                        message: "file shrank while reading".to_string(),
                    })
                }
                Ok(read) => filled += read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(FetchError::io(request.model, &e)),
            }
        }
        Ok(())
    }
}

impl Fetcher for FileFetcher {
    fn id(&self) -> &str {
        "file"
    }

    fn fetch(&self, request: &FetchRequest<'_>) -> Result<Fetched, FetchError> {
        let path = self.resolve(request.model)?;
        let mut file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => FetchError::NotFound(request.model.to_string()),
            _ => FetchError::io(request.model, &e),
        })?;
        let len = file
            .metadata()
            .map_err(|e| FetchError::io(request.model, &e))?
            .len();
        let len = usize::try_from(len)
            .map_err(|_| FetchError::Failed(format!("{} is too large", path.display())))?;

        let mut bytes = request.buffers.get_buffer(len);
        if let Err(e) = Self::read_into(&mut file, &mut bytes, request) {
            request.buffers.put_buffer(bytes);
            return Err(e);
        }
        log::trace!("Read {len} bytes from {}", path.display());
        Ok(Fetched {
            bytes,
            source: DataSource::Local,
        })
    }
}
