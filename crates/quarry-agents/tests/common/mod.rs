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

#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver, Sender};
use quarry_agents::LoadResult;
use quarry_core::cache::{DiskCache, DiskWriter};
use quarry_core::config::{EngineConfig, ExecutorConfig, ExecutorsConfig, UncaughtPolicy};
use quarry_core::error::{DecodeError, EncodeError, FetchError};
use quarry_core::memory::BufferProvider;
use quarry_core::resource::Decoded;
use quarry_core::strategy::{DataSource, Decoder, Encoder, FetchRequest, Fetched, Fetcher};
use quarry_core::{CacheKey, Dimensions, Pipeline, Transformer};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);

/// A decoded text that counts how often it is recycled.
#[derive(Debug)]
pub struct Text {
    pub body: String,
    recycles: Arc<AtomicUsize>,
}

impl Decoded for Text {
    fn byte_size(&self) -> usize {
        self.body.len()
    }

    fn recycle(self, buffers: &dyn BufferProvider) {
        self.recycles.fetch_add(1, Ordering::SeqCst);
        buffers.put_buffer(self.body.into_bytes());
    }
}

/// Serves a model as its own bytes. Models starting with "missing" do not exist.
pub struct CountingFetcher {
    source: DataSource,
    pub calls: AtomicUsize,
    gate: Option<Receiver<()>>,
}

impl Fetcher for CountingFetcher {
    fn id(&self) -> &str {
        "counting"
    }

    fn fetch(&self, request: &FetchRequest<'_>) -> Result<Fetched, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _ = gate.recv_timeout(WAIT);
        }
        if request.model.starts_with("missing") {
            return Err(FetchError::NotFound(request.model.to_string()));
        }
        let mut bytes = request.buffers.get_buffer(request.model.len());
        bytes.copy_from_slice(request.model.as_bytes());
        Ok(Fetched {
            bytes,
            source: self.source,
        })
    }
}

pub struct TextDecoder {
    recycles: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl Decoder<Text> for TextDecoder {
    fn id(&self) -> &str {
        "text"
    }

    fn decode(
        &self,
        source: &[u8],
        _target: Dimensions,
        _buffers: &dyn BufferProvider,
    ) -> Result<Text, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body =
            String::from_utf8(source.to_vec()).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        Ok(Text {
            body,
            recycles: Arc::clone(&self.recycles),
        })
    }
}

/// Appends "!".
pub struct Exclaim;

impl Transformer<Text> for Exclaim {
    fn id(&self) -> &str {
        "exclaim"
    }

    fn transform(&self, mut value: Text, _target: Dimensions, _buffers: &dyn BufferProvider) -> Text {
        value.body.push('!');
        value
    }
}

pub struct TextEncoder;

impl Encoder<Text> for TextEncoder {
    fn id(&self) -> &str {
        "text"
    }

    fn encode(&self, value: &Text, sink: &mut dyn Write) -> Result<(), EncodeError> {
        sink.write_all(value.body.as_bytes())?;
        Ok(())
    }
}

/// Holds every encode until the gate lets it through.
pub struct GatedEncoder {
    gate: Receiver<()>,
}

impl Encoder<Text> for GatedEncoder {
    fn id(&self) -> &str {
        "text"
    }

    fn encode(&self, value: &Text, sink: &mut dyn Write) -> Result<(), EncodeError> {
        let _ = self.gate.recv_timeout(WAIT);
        sink.write_all(value.body.as_bytes())?;
        Ok(())
    }
}

/// An in-memory disk cache.
#[derive(Default)]
pub struct MapDiskCache(pub Mutex<HashMap<CacheKey, Vec<u8>>>);

impl DiskCache for MapDiskCache {
    fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        self.0.lock().unwrap().get(key).cloned()
    }

    fn put(&self, key: &CacheKey, writer: &mut dyn DiskWriter) -> bool {
        let mut staged = Vec::new();
        match writer.write(&mut staged) {
            Ok(true) => {
                self.0.lock().unwrap().insert(key.clone(), staged);
                true
            }
            _ => false,
        }
    }

    fn delete(&self, key: &CacheKey) {
        self.0.lock().unwrap().remove(key);
    }

    fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Strategies plus the counters tests assert on.
pub struct Fixture {
    pub fetcher: Arc<CountingFetcher>,
    pub decodes: Arc<AtomicUsize>,
    pub recycles: Arc<AtomicUsize>,
    pub pipeline: Pipeline<Text>,
}

impl Fixture {
    pub fn new(source: DataSource) -> Self {
        Self::build(source, None)
    }

    /// Every fetch waits for one token from the returned sender.
    pub fn gated(source: DataSource) -> (Self, Sender<()>) {
        let (tx, rx) = unbounded();
        (Self::build(source, Some(rx)), tx)
    }

    fn build(source: DataSource, gate: Option<Receiver<()>>) -> Self {
        let fetcher = Arc::new(CountingFetcher {
            source,
            calls: AtomicUsize::new(0),
            gate,
        });
        let decodes = Arc::new(AtomicUsize::new(0));
        let recycles = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::from_parts(
            fetcher.clone(),
            Arc::new(TextDecoder {
                recycles: Arc::clone(&recycles),
                calls: Arc::clone(&decodes),
            }),
        )
        .with_transformer(Exclaim);
        Self {
            fetcher,
            decodes,
            recycles,
            pipeline,
        }
    }

    pub fn with_encoder(mut self) -> Self {
        self.pipeline = self.pipeline.with_encoder(TextEncoder);
        self
    }

    /// Every encode waits for one token from the returned sender.
    pub fn with_gated_encoder(mut self) -> (Self, Sender<()>) {
        let (tx, rx) = unbounded();
        self.pipeline = self.pipeline.with_encoder(GatedEncoder { gate: rx });
        (self, tx)
    }

    pub fn fetches(&self) -> usize {
        self.fetcher.calls.load(Ordering::SeqCst)
    }

    pub fn decodes(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }

    pub fn recycles(&self) -> usize {
        self.recycles.load(Ordering::SeqCst)
    }
}

/// Small pools, panics logged rather than fatal, strict release accounting.
pub fn test_config() -> EngineConfig {
    let pool = |threads| ExecutorConfig {
        threads,
        policy: UncaughtPolicy::Log,
    };
    EngineConfig {
        executors: ExecutorsConfig {
            disk_cache: pool(1),
            source: pool(2),
            decode: pool(2),
        },
        assert_balanced_release: true,
        ..EngineConfig::default()
    }
}

/// A callback forwarding its result to `tx`.
pub fn forward(tx: &Sender<LoadResult<Text>>) -> impl FnOnce(LoadResult<Text>) + Send + 'static {
    let tx = tx.clone();
    move |result| {
        let _ = tx.send(result);
    }
}
