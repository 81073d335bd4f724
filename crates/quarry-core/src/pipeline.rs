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

//! A fetch → decode → transform → encode chain of strategies.

use crate::key::{Dimensions, Fingerprint};
use crate::resource::Decoded;
use crate::strategy::{Decoder, Encoder, Fetcher, Transformer};
use std::fmt;
use std::sync::Arc;

/// The strategies used to produce one kind of resource.
///
/// Pipelines are cheap to clone and are shared between the engine and its
/// in-flight jobs.
pub struct Pipeline<T: Decoded> {
    fetcher: Arc<dyn Fetcher>,
    decoder: Arc<dyn Decoder<T>>,
    transformers: Vec<Arc<dyn Transformer<T>>>,
    encoder: Option<Arc<dyn Encoder<T>>>,
}

impl<T: Decoded> Pipeline<T> {
    /// Creates a pipeline with no transformations and no encoder.
    pub fn new(fetcher: impl Fetcher, decoder: impl Decoder<T>) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            decoder: Arc::new(decoder),
            transformers: Vec::new(),
            encoder: None,
        }
    }

    /// Creates a pipeline from strategies that are already shared.
    pub fn from_parts(fetcher: Arc<dyn Fetcher>, decoder: Arc<dyn Decoder<T>>) -> Self {
        Self {
            fetcher,
            decoder,
            transformers: Vec::new(),
            encoder: None,
        }
    }

    /// Appends a transformation. Transformations run in insertion order.
    pub fn with_transformer(mut self, transformer: impl Transformer<T>) -> Self {
        self.transformers.push(Arc::new(transformer));
        self
    }

    /// Sets the encoder used to persist transformed results.
    pub fn with_encoder(mut self, encoder: impl Encoder<T>) -> Self {
        self.encoder = Some(Arc::new(encoder));
        self
    }

    /// The fetcher.
    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    /// The decoder.
    pub fn decoder(&self) -> &dyn Decoder<T> {
        self.decoder.as_ref()
    }

    /// The transformations, in application order.
    pub fn transformers(&self) -> &[Arc<dyn Transformer<T>>] {
        &self.transformers
    }

    /// The encoder, if results can be persisted.
    pub fn encoder(&self) -> Option<&dyn Encoder<T>> {
        self.encoder.as_deref()
    }

    /// Identities of every strategy, in the order they are applied.
    pub fn strategy_ids(&self) -> Vec<String> {
        let mut ids = Vec::with_capacity(self.transformers.len() + 3);
        ids.push(self.fetcher.id().to_owned());
        ids.push(self.decoder.id().to_owned());
        ids.extend(self.transformers.iter().map(|t| t.id().to_owned()));
        if let Some(encoder) = &self.encoder {
            ids.push(encoder.id().to_owned());
        }
        ids
    }

    /// Builds the fingerprint of loading `model` at `dimensions` through this pipeline.
    pub fn fingerprint(&self, model: impl Into<String>, dimensions: Dimensions) -> Fingerprint {
        Fingerprint::builder(model, dimensions)
            .strategies(self.strategy_ids())
            .build()
    }

    /// Like [`fingerprint`](Self::fingerprint), with an application signature.
    pub fn signed_fingerprint(
        &self,
        model: impl Into<String>,
        dimensions: Dimensions,
        signature: impl Into<String>,
    ) -> Fingerprint {
        Fingerprint::builder(model, dimensions)
            .strategies(self.strategy_ids())
            .signature(signature)
            .build()
    }
}

impl<T: Decoded> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            decoder: Arc::clone(&self.decoder),
            transformers: self.transformers.clone(),
            encoder: self.encoder.clone(),
        }
    }
}

impl<T: Decoded> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("strategies", &self.strategy_ids())
            .finish()
    }
}
