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

mod common;

use anyhow::Result;
use common::{forward, test_config, Fixture, MapDiskCache, Text, WAIT};
use crossbeam_channel::unbounded;
use quarry_agents::{Engine, LoadRequest};
use quarry_core::error::FetchError;
use quarry_core::strategy::DataSource;
use quarry_core::telemetry::MetricId;
use quarry_core::{
    DiskCacheStrategy, Dimensions, LoadError, LoadOptions, MemoryPressure, Priority, Resource,
};
use quarry_telemetry::MetricsRegistry;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn wait_until(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

fn counter(registry: &MetricsRegistry, name: &str) -> u64 {
    registry
        .get_metric(&MetricId::new("engine", name))
        .ok()
        .and_then(|metric| metric.value.as_counter())
        .unwrap_or_default()
}

fn gauge(registry: &MetricsRegistry, name: &str) -> f64 {
    registry
        .get_metric(&MetricId::new("engine", name))
        .ok()
        .and_then(|metric| metric.value.as_gauge())
        .unwrap_or_default()
}

fn engine(fixture: &Fixture, registry: &MetricsRegistry) -> Result<Engine<Text>> {
    Engine::new(test_config(), fixture.pipeline.clone(), registry)
}

#[test]
fn test_concurrent_loads_share_one_job() -> Result<()> {
    // --- 1. ARRANGE ---
    let (fixture, gate) = Fixture::gated(DataSource::Local);
    let registry = MetricsRegistry::new();
    let engine = engine(&fixture, &registry)?;
    let key = engine.fingerprint("a", Dimensions::ORIGINAL);
    let (tx, rx) = unbounded();

    // --- 2. ACT ---
    engine.load(key.clone(), Priority::Normal, forward(&tx));
    engine.load(key.clone(), Priority::Normal, forward(&tx));
    assert_eq!(engine.in_flight(), 1);
    gate.send(())?;
    let first = rx.recv_timeout(WAIT)??;
    let second = rx.recv_timeout(WAIT)??;

    // --- 3. ASSERT ---
    assert!(Resource::ptr_eq(&first.resource, &second.resource));
    assert_eq!(first.resource.body, "a!");
    assert_eq!(first.source, DataSource::Local);
    assert_eq!(fixture.fetches(), 1);
    assert_eq!(fixture.decodes(), 1);
    assert_eq!(engine.acquired_count(&key), 2);
    assert_eq!(engine.in_flight(), 0);
    assert_eq!(counter(&registry, "jobs_started"), 1);
    assert_eq!(counter(&registry, "fetches"), 1);
    assert_eq!(counter(&registry, "decodes"), 1);

    engine.release(first.resource);
    engine.release(second.resource);
    Ok(())
}

#[test]
fn test_released_resource_is_served_from_memory_then_active() -> Result<()> {
    // --- 1. ARRANGE ---
    let (fixture, gate) = Fixture::gated(DataSource::Local);
    let registry = MetricsRegistry::new();
    let engine = engine(&fixture, &registry)?;
    let key = engine.fingerprint("a", Dimensions::ORIGINAL);
    let (tx, rx) = unbounded();

    engine.load(key.clone(), Priority::Normal, forward(&tx));
    engine.load(key.clone(), Priority::Normal, forward(&tx));
    gate.send(())?;
    let first = rx.recv_timeout(WAIT)??;
    let second = rx.recv_timeout(WAIT)??;

    // --- 2. ACT ---
    engine.release(first.resource);
    assert!(!engine.is_memory_cached(&key));
    engine.release(second.resource);
    assert!(engine.is_memory_cached(&key));

    let handle = engine.load(key.clone(), Priority::Normal, forward(&tx));
    let third = rx.try_recv()??;
    let handle_again = engine.load(key.clone(), Priority::Normal, forward(&tx));
    let fourth = rx.try_recv()??;

    // --- 3. ASSERT ---
    assert!(!handle.is_pending());
    assert!(!handle_again.is_pending());
    assert_eq!(third.source, DataSource::MemoryCache);
    assert_eq!(fourth.source, DataSource::ActiveResources);
    assert!(Resource::ptr_eq(&third.resource, &fourth.resource));
    assert!(!engine.is_memory_cached(&key));
    assert_eq!(engine.acquired_count(&key), 2);
    assert_eq!(fixture.fetches(), 1);
    assert_eq!(counter(&registry, "memory_hits"), 1);
    assert_eq!(counter(&registry, "active_hits"), 1);

    // Cancelling a delivered hit changes nothing.
    handle.cancel();
    assert_eq!(engine.acquired_count(&key), 2);

    engine.release(third.resource);
    engine.release(fourth.resource);
    assert!(engine.is_memory_cached(&key));
    assert_eq!(fixture.recycles(), 0);
    Ok(())
}

#[test]
fn test_cancelling_only_callback_cancels_job_and_next_load_refetches() -> Result<()> {
    // --- 1. ARRANGE ---
    let (fixture, gate) = Fixture::gated(DataSource::Local);
    let registry = MetricsRegistry::new();
    let engine = engine(&fixture, &registry)?;
    let key = engine.fingerprint("a", Dimensions::ORIGINAL);
    let (cancelled_tx, cancelled_rx) = unbounded();
    let (tx, rx) = unbounded();

    let handle = engine.load(key.clone(), Priority::Normal, forward(&cancelled_tx));
    wait_until(|| fixture.fetches() == 1);

    // --- 2. ACT ---
    handle.cancel();
    assert_eq!(engine.in_flight(), 0);
    engine.load(key.clone(), Priority::Normal, forward(&tx));
    gate.send(())?;
    gate.send(())?;
    let loaded = rx.recv_timeout(WAIT)??;

    // --- 3. ASSERT ---
    assert_eq!(loaded.resource.body, "a!");
    assert_eq!(fixture.fetches(), 2);
    assert!(!handle.is_pending());
    assert!(cancelled_rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(counter(&registry, "cancellations"), 1);
    assert_eq!(counter(&registry, "jobs_started"), 2);

    engine.release(loaded.resource);
    Ok(())
}

#[test]
fn test_detaching_one_of_two_callbacks_keeps_job_running() -> Result<()> {
    let (fixture, gate) = Fixture::gated(DataSource::Local);
    let engine = engine(&fixture, &MetricsRegistry::new())?;
    let key = engine.fingerprint("a", Dimensions::ORIGINAL);
    let (detached_tx, detached_rx) = unbounded();
    let (tx, rx) = unbounded();

    let detached = engine.load(key.clone(), Priority::Normal, forward(&detached_tx));
    engine.load(key.clone(), Priority::Normal, forward(&tx));
    detached.cancel();
    assert_eq!(engine.in_flight(), 1);
    gate.send(())?;

    let loaded = rx.recv_timeout(WAIT)??;
    assert!(detached_rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(engine.acquired_count(&key), 1);
    engine.release(loaded.resource);
    assert!(engine.is_memory_cached(&key));
    Ok(())
}

#[test]
fn test_failure_reaches_every_callback_and_caches_nothing() -> Result<()> {
    // --- 1. ARRANGE ---
    let (fixture, gate) = Fixture::gated(DataSource::Local);
    let registry = MetricsRegistry::new();
    let engine = engine(&fixture, &registry)?;
    let key = engine.fingerprint("missing.txt", Dimensions::ORIGINAL);
    let (tx, rx) = unbounded();

    // --- 2. ACT ---
    engine.load(key.clone(), Priority::Normal, forward(&tx));
    engine.load(key.clone(), Priority::High, forward(&tx));
    gate.send(())?;
    let first = rx.recv_timeout(WAIT)?;
    let second = rx.recv_timeout(WAIT)?;

    // --- 3. ASSERT ---
    let expected = LoadError::Fetch(FetchError::NotFound("missing.txt".into()));
    assert_eq!(first.unwrap_err(), expected);
    assert_eq!(second.unwrap_err(), expected);
    assert_eq!(fixture.fetches(), 1);
    assert_eq!(fixture.decodes(), 0);
    assert_eq!(engine.in_flight(), 0);
    assert!(!engine.is_memory_cached(&key));
    assert_eq!(engine.acquired_count(&key), 0);
    assert_eq!(counter(&registry, "failures"), 1);
    Ok(())
}

#[test]
fn test_callbacks_are_delivered_in_priority_order() -> Result<()> {
    let (fixture, gate) = Fixture::gated(DataSource::Local);
    let engine = Arc::new(engine(&fixture, &MetricsRegistry::new())?);
    let key = engine.fingerprint("a", Dimensions::ORIGINAL);
    let order = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, done_rx) = unbounded();

    for (label, priority) in [
        ("low", Priority::Low),
        ("immediate", Priority::Immediate),
        ("normal", Priority::Normal),
        ("low-2", Priority::Low),
    ] {
        let order = Arc::clone(&order);
        let done_tx = done_tx.clone();
        let engine_ref = Arc::clone(&engine);
        engine.load(key.clone(), priority, move |result| {
            if let Ok(loaded) = result {
                order.lock().unwrap().push(label);
                engine_ref.release(loaded.resource);
            }
            let _ = done_tx.send(());
        });
    }
    gate.send(())?;
    for _ in 0..4 {
        done_rx.recv_timeout(WAIT)?;
    }

    assert_eq!(
        *order.lock().unwrap(),
        vec!["immediate", "normal", "low", "low-2"]
    );
    assert!(engine.is_memory_cached(&key));
    Ok(())
}

#[test]
fn test_resource_is_recycled_once_after_last_release() -> Result<()> {
    // --- 1. ARRANGE ---
    let (fixture, gate) = Fixture::gated(DataSource::Local);
    let mut config = test_config();
    config.memory_cache.max_bytes = 0;
    let engine = Engine::new(config, fixture.pipeline.clone(), &MetricsRegistry::new())?;
    let key = engine.fingerprint("a", Dimensions::ORIGINAL);
    let (tx, rx) = unbounded();

    engine.load(key.clone(), Priority::Normal, forward(&tx));
    engine.load(key.clone(), Priority::Normal, forward(&tx));
    gate.send(())?;
    let first = rx.recv_timeout(WAIT)??;
    let second = rx.recv_timeout(WAIT)??;

    // --- 2. ACT ---
    engine.release(first.resource);
    assert_eq!(fixture.recycles(), 0);
    engine.release(second.resource);

    // --- 3. ASSERT ---
    // Too large for a zero budget, so it is recycled instead of cached.
    wait_until(|| fixture.recycles() == 1);
    assert!(!engine.is_memory_cached(&key));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(fixture.recycles(), 1);
    Ok(())
}

#[test]
#[should_panic(expected = "Unbalanced release")]
fn test_unbalanced_release_panics_when_asserted() {
    let fixture = Fixture::new(DataSource::Local);
    let engine = engine(&fixture, &MetricsRegistry::new()).unwrap();
    let key = engine.fingerprint("a", Dimensions::ORIGINAL);

    let loaded = engine.get(key, Priority::Normal, WAIT).unwrap();
    let extra = loaded.resource.clone();
    engine.release(loaded.resource);
    engine.release(extra);
}

#[test]
fn test_unbalanced_release_is_ignored_when_not_asserted() -> Result<()> {
    let fixture = Fixture::new(DataSource::Local);
    let mut config = test_config();
    config.assert_balanced_release = false;
    let engine = Engine::new(config, fixture.pipeline.clone(), &MetricsRegistry::new())?;
    let key = engine.fingerprint("a", Dimensions::ORIGINAL);

    let loaded = engine.get(key.clone(), Priority::Normal, WAIT)?;
    let extra = loaded.resource.clone();
    engine.release(loaded.resource);
    engine.release(extra);

    assert!(engine.is_memory_cached(&key));
    assert_eq!(fixture.recycles(), 0);
    Ok(())
}

#[test]
fn test_skip_memory_cache_bypasses_memory_tiers() -> Result<()> {
    // --- 1. ARRANGE ---
    let fixture = Fixture::new(DataSource::Local);
    let engine = engine(&fixture, &MetricsRegistry::new())?;
    let key = engine.fingerprint("a", Dimensions::ORIGINAL);
    let cached = engine.get(key.clone(), Priority::Normal, WAIT)?;
    let (tx, rx) = unbounded();

    // --- 2. ACT ---
    let request = LoadRequest::new(fixture.pipeline.clone(), "a", Dimensions::ORIGINAL)
        .with_options(LoadOptions::default().skip_memory_cache(true));
    engine.load_request(request, forward(&tx));
    let uncached = rx.recv_timeout(WAIT)??;

    // --- 3. ASSERT ---
    assert_eq!(uncached.source, DataSource::Local);
    assert!(!uncached.resource.is_memory_cacheable());
    assert!(!Resource::ptr_eq(&cached.resource, &uncached.resource));
    assert_eq!(fixture.fetches(), 2);
    assert_eq!(engine.acquired_count(&key), 1);

    engine.release(uncached.resource);
    wait_until(|| fixture.recycles() == 1);
    engine.release(cached.resource);
    assert!(engine.is_memory_cached(&key));
    Ok(())
}

#[test]
fn test_only_retrieve_from_cache_fails_without_fetching() -> Result<()> {
    let fixture = Fixture::new(DataSource::Local);
    let engine = engine(&fixture, &MetricsRegistry::new())?;
    let (tx, rx) = unbounded();

    let request = LoadRequest::new(fixture.pipeline.clone(), "a", Dimensions::ORIGINAL)
        .with_options(LoadOptions::default().only_retrieve_from_cache(true));
    engine.load_request(request, forward(&tx));

    let result = rx.recv_timeout(WAIT)?;
    assert!(matches!(result, Err(LoadError::NotCached(_))));
    assert_eq!(fixture.fetches(), 0);
    Ok(())
}

#[test]
fn test_remote_bytes_are_reused_from_data_cache_for_other_sizes() -> Result<()> {
    // --- 1. ARRANGE ---
    let fixture = Fixture::new(DataSource::Remote);
    let disk = Arc::new(MapDiskCache::default());
    let registry = MetricsRegistry::new();
    let engine = Engine::with_disk_cache(
        test_config(),
        fixture.pipeline.clone(),
        &registry,
        disk.clone(),
    )?;
    let full = engine.fingerprint("a", Dimensions::ORIGINAL);
    let thumb = engine.fingerprint("a", Dimensions::new(16, 16));

    // --- 2. ACT ---
    let first = engine.get(full, Priority::Normal, WAIT)?;
    let second = engine.get(thumb, Priority::Normal, WAIT)?;

    // --- 3. ASSERT ---
    assert_eq!(first.source, DataSource::Remote);
    assert_eq!(second.source, DataSource::DataDiskCache);
    assert_eq!(second.resource.body, "a!");
    assert_eq!(fixture.fetches(), 1);
    assert_eq!(disk.0.lock().unwrap().len(), 1);
    assert_eq!(counter(&registry, "disk_hits"), 1);

    engine.release(first.resource);
    engine.release(second.resource);
    Ok(())
}

#[test]
fn test_get_times_out_and_cancels() -> Result<()> {
    let (fixture, gate) = Fixture::gated(DataSource::Local);
    let engine = engine(&fixture, &MetricsRegistry::new())?;
    let key = engine.fingerprint("a", Dimensions::ORIGINAL);

    let result = engine.get(key.clone(), Priority::Normal, Duration::from_millis(100));

    assert!(matches!(result, Err(LoadError::TimedOut(_))));
    assert_eq!(engine.in_flight(), 0);
    gate.send(())?;
    Ok(())
}

#[test]
fn test_trim_memory_shrinks_memory_cache() -> Result<()> {
    // --- 1. ARRANGE ---
    let fixture = Fixture::new(DataSource::Local);
    let registry = MetricsRegistry::new();
    let engine = engine(&fixture, &registry)?;
    let keys: Vec<_> = ["a", "b", "c", "d"]
        .iter()
        .map(|model| engine.fingerprint(*model, Dimensions::ORIGINAL))
        .collect();
    for key in &keys {
        let loaded = engine.get(key.clone(), Priority::Normal, WAIT)?;
        engine.release(loaded.resource);
    }
    assert_eq!(engine.memory_cache_size(), 8);
    assert_eq!(gauge(&registry, "memory_cache_bytes"), 8.0);

    // --- 2. ACT & ASSERT ---
    engine.trim_memory(MemoryPressure::Moderate);
    assert_eq!(engine.memory_cache_size(), 4);
    assert_eq!(gauge(&registry, "memory_cache_bytes"), 4.0);
    assert!(!engine.is_memory_cached(&keys[0]));
    assert!(!engine.is_memory_cached(&keys[1]));
    assert!(engine.is_memory_cached(&keys[3]));
    wait_until(|| fixture.recycles() == 2);

    engine.trim_memory(MemoryPressure::Critical);
    assert_eq!(engine.memory_cache_size(), 0);
    wait_until(|| fixture.recycles() == 4);
    assert_eq!(engine.buffer_pool_stats().pooled_bytes, 0);
    assert_eq!(gauge(&registry, "memory_cache_bytes"), 0.0);
    assert_eq!(gauge(&registry, "pooled_bytes"), 0.0);
    Ok(())
}

#[test]
fn test_loads_with_different_options_share_one_job() -> Result<()> {
    // --- 1. ARRANGE ---
    let (fixture, gate) = Fixture::gated(DataSource::Local);
    let registry = MetricsRegistry::new();
    let engine = engine(&fixture, &registry)?;
    let key = engine.fingerprint("a", Dimensions::ORIGINAL);
    let (tx, rx) = unbounded();
    let request = |options: LoadOptions| {
        LoadRequest::new(fixture.pipeline.clone(), "a", Dimensions::ORIGINAL).with_options(options)
    };

    // --- 2. ACT ---
    engine.load(key.clone(), Priority::Normal, forward(&tx));
    engine.load_request(
        request(LoadOptions::default().disk_cache_strategy(DiskCacheStrategy::None)),
        forward(&tx),
    );
    engine.load_request(
        request(LoadOptions::default().only_retrieve_from_cache(true)),
        forward(&tx),
    );
    assert_eq!(engine.in_flight(), 1);
    gate.send(())?;
    let results = (0..3)
        .map(|_| rx.recv_timeout(WAIT))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

    // --- 3. ASSERT ---
    assert!(results
        .iter()
        .all(|loaded| Resource::ptr_eq(&loaded.resource, &results[0].resource)));
    assert_eq!(fixture.fetches(), 1);
    assert_eq!(counter(&registry, "jobs_started"), 1);
    assert_eq!(engine.acquired_count(&key), 3);

    for loaded in results {
        engine.release(loaded.resource);
    }
    assert!(engine.is_memory_cached(&key));
    assert_eq!(fixture.recycles(), 0);
    Ok(())
}

#[test]
fn test_undecodable_disk_entries_are_deleted_and_refetched() -> Result<()> {
    // --- 1. ARRANGE ---
    let fixture = Fixture::new(DataSource::Local);
    let disk = Arc::new(MapDiskCache::default());
    let registry = MetricsRegistry::new();
    let engine = Engine::with_disk_cache(
        test_config(),
        fixture.pipeline.clone(),
        &registry,
        disk.clone(),
    )?;
    let bad_resource = engine.fingerprint("a", Dimensions::ORIGINAL);
    let bad_data = engine.fingerprint("b", Dimensions::ORIGINAL);
    {
        let mut entries = disk.0.lock().unwrap();
        entries.insert(bad_resource.resource_cache_key(), vec![0xff, 0xfe, 0x00]);
        entries.insert(bad_data.data_cache_key(), vec![0xc3, 0x28]);
    }

    // --- 2. ACT ---
    let first = engine.get(bad_resource.clone(), Priority::Normal, WAIT)?;
    let second = engine.get(bad_data.clone(), Priority::Normal, WAIT)?;

    // --- 3. ASSERT ---
    assert_eq!(first.source, DataSource::Local);
    assert_eq!(first.resource.body, "a!");
    assert_eq!(second.source, DataSource::Local);
    assert_eq!(second.resource.body, "b!");
    assert_eq!(fixture.fetches(), 2);
    assert_eq!(fixture.decodes(), 4);
    assert!(disk.0.lock().unwrap().is_empty());
    assert_eq!(counter(&registry, "failures"), 0);

    engine.release(first.resource);
    engine.release(second.resource);
    Ok(())
}

#[test]
fn test_result_held_by_pending_encode_is_recycled_once() -> Result<()> {
    // --- 1. ARRANGE ---
    let (fixture, gate) = Fixture::new(DataSource::Local).with_gated_encoder();
    let disk = Arc::new(MapDiskCache::default());
    let engine = Engine::with_disk_cache(
        test_config(),
        fixture.pipeline.clone(),
        &MetricsRegistry::new(),
        disk.clone(),
    )?;
    let key = engine.fingerprint("a", Dimensions::ORIGINAL);
    let loaded = engine.get(key.clone(), Priority::Normal, WAIT)?;

    // --- 2. ACT ---
    engine.release(loaded.resource);
    assert!(engine.is_memory_cached(&key));
    engine.trim_memory(MemoryPressure::Critical);
    // The queued encode still holds the value.
    assert_eq!(fixture.recycles(), 0);
    gate.send(())?;

    // --- 3. ASSERT ---
    wait_until(|| fixture.recycles() == 1);
    assert!(disk
        .0
        .lock()
        .unwrap()
        .contains_key(&key.resource_cache_key()));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(fixture.recycles(), 1);
    Ok(())
}

#[test]
fn test_shutdown_fails_pending_loads() -> Result<()> {
    // --- 1. ARRANGE ---
    let (fixture, gate) = Fixture::gated(DataSource::Local);
    let mut config = test_config();
    config.executors.source.threads = 1;
    let engine = Arc::new(engine_with(config, &fixture)?);
    let running = engine.fingerprint("a", Dimensions::ORIGINAL);
    let queued = engine.fingerprint("b", Dimensions::ORIGINAL);
    let (running_tx, running_rx) = unbounded();
    let (queued_tx, queued_rx) = unbounded();

    engine.load(running, Priority::Normal, forward(&running_tx));
    wait_until(|| fixture.fetches() == 1);
    engine.load(queued, Priority::Normal, forward(&queued_tx));

    // --- 2. ACT ---
    let stopper = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.shutdown())
    };
    wait_until(|| engine.is_shut_down());
    thread::sleep(Duration::from_millis(100));
    gate.send(())?;
    gate.send(())?;
    stopper.join().expect("shutdown thread panicked");

    // --- 3. ASSERT ---
    assert_eq!(queued_rx.recv_timeout(WAIT)?.unwrap_err(), LoadError::Shutdown);
    // The running load finishes one way or the other, exactly once.
    assert!(running_rx.recv_timeout(WAIT).is_ok());
    assert!(running_rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(fixture.fetches(), 1);
    assert_eq!(engine.in_flight(), 0);

    let (tx, rx) = unbounded();
    let handle = engine.load(
        engine.fingerprint("c", Dimensions::ORIGINAL),
        Priority::Normal,
        forward(&tx),
    );
    assert_eq!(rx.try_recv()?.unwrap_err(), LoadError::Shutdown);
    assert!(!handle.is_pending());
    engine.shutdown();
    Ok(())
}

fn engine_with(config: quarry_core::EngineConfig, fixture: &Fixture) -> Result<Engine<Text>> {
    Engine::new(config, fixture.pipeline.clone(), &MetricsRegistry::new())
}
