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

// Quarry sandbox
// Loads text files through every tier of the engine and reports metrics.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use quarry_agents::Engine;
use quarry_core::config::EngineConfig;
use quarry_core::error::{DecodeError, EncodeError};
use quarry_core::memory::BufferProvider;
use quarry_core::{Decoder, Dimensions, Encoder, MemoryPressure, Pipeline, Priority, Transformer};
use quarry_infra::FileFetcher;
use quarry_telemetry::logging::init_logging;
use quarry_telemetry::MetricsRegistry;

#[derive(Parser, Debug)]
#[command(version, about = "Load text files through the Quarry engine")]
struct Args {
    /// Directory the files are read from.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// RON engine configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Disk cache directory. Overrides the configuration.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// How many times each file is requested.
    #[arg(long, default_value_t = 2)]
    rounds: usize,

    /// Files to load, relative to the root.
    #[arg(required = true)]
    files: Vec<String>,
}

struct Utf8Decoder;

impl Decoder<String> for Utf8Decoder {
    fn id(&self) -> &str {
        "utf8"
    }

    fn decode(
        &self,
        source: &[u8],
        _target: Dimensions,
        buffers: &dyn BufferProvider,
    ) -> Result<String, DecodeError> {
        let text = std::str::from_utf8(source).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        let mut bytes = buffers.get_buffer(text.len());
        bytes.copy_from_slice(text.as_bytes());
        String::from_utf8(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))
    }
}

struct Uppercase;

impl Transformer<String> for Uppercase {
    fn id(&self) -> &str {
        "uppercase"
    }

    fn transform(&self, mut value: String, _target: Dimensions, _buffers: &dyn BufferProvider) -> String {
        value.make_ascii_uppercase();
        value
    }
}

struct PlainEncoder;

impl Encoder<String> for PlainEncoder {
    fn id(&self) -> &str {
        "plain"
    }

    fn should_encode(&self, value: &String) -> bool {
        !value.is_empty()
    }

    fn encode(&self, value: &String, sink: &mut dyn Write) -> Result<(), EncodeError> {
        sink.write_all(value.as_bytes())?;
        Ok(())
    }
}

fn main() -> Result<()> {
    init_logging("info").context("Failed to initialize logging")?;
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = args.cache_dir {
        config.disk_cache.directory = Some(dir);
    }

    let pipeline = Pipeline::new(FileFetcher::new(&args.root), Utf8Decoder)
        .with_transformer(Uppercase)
        .with_encoder(PlainEncoder);
    let registry = MetricsRegistry::new();
    let engine = Engine::new(config, pipeline, &registry)?;

    for round in 1..=args.rounds {
        for file in &args.files {
            let key = engine.fingerprint(file.as_str(), Dimensions::ORIGINAL);
            match engine.get(key, Priority::Normal, Duration::from_secs(30)) {
                Ok(loaded) => {
                    log::info!(
                        "[round {round}] {file}: {} bytes from {:?}",
                        loaded.resource.len(),
                        loaded.source
                    );
                    engine.release(loaded.resource);
                }
                Err(e) => log::error!("[round {round}] {file}: {e}"),
            }
        }
    }

    engine.trim_memory(MemoryPressure::Moderate);
    log::info!("Buffer pool: {:?}", engine.buffer_pool_stats());
    engine.shutdown();

    println!("{}", registry.snapshot_json()?);
    Ok(())
}
