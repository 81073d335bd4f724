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

use quarry_core::{DataSource, Decoded, Dimensions, Fingerprint, LoadError, LoadOptions, Pipeline, Resource};

/// A successful load.
#[derive(Debug)]
pub struct Loaded<T: Decoded> {
    /// The resource. Hand it back with [`Engine::release`](super::Engine::release)
    /// once it is no longer displayed or otherwise used.
    pub resource: Resource<T>,
    /// The tier the value came from.
    pub source: DataSource,
}

/// The single notification a load produces.
pub type LoadResult<T> = Result<Loaded<T>, LoadError>;

pub(crate) type LoadCallback<T> = Box<dyn FnOnce(LoadResult<T>) + Send + 'static>;

/// A load with its own pipeline and options.
#[derive(Debug, Clone)]
pub struct LoadRequest<T: Decoded> {
    /// Identity of the result.
    pub key: Fingerprint,
    /// Strategies used on a miss. Must be the pipeline `key` was built from.
    pub pipeline: Pipeline<T>,
    /// Priority and caching options.
    pub options: LoadOptions,
}

impl<T: Decoded> LoadRequest<T> {
    /// Builds a request for `model` at `dimensions`, fingerprinted through `pipeline`.
    pub fn new(pipeline: Pipeline<T>, model: impl Into<String>, dimensions: Dimensions) -> Self {
        Self {
            key: pipeline.fingerprint(model, dimensions),
            pipeline,
            options: LoadOptions::default(),
        }
    }

    /// Replaces the options.
    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }
}
