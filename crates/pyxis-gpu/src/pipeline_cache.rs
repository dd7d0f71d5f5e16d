// Copyright 2026 the pyxis authors
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

//! Pipeline LRU cache, shader bytecode store and their persisted form.
//!
//! Pipelines are keyed by the 128-bit hash of the canonical state record.
//! Evicted pipelines go through the deferred destruction queue since a
//! command buffer in flight may still reference them. Shader bytecode is
//! keyed by stage and source text and survives process restarts inside the
//! persisted container, next to the driver's own opaque cache blob.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::rc::Rc;

use pyxis_core::driver::DeviceDriver;
use pyxis_core::error::{CacheLoadError, ContextError, DriverError};
use pyxis_core::handle::PipelineHandle;
use pyxis_core::pipeline_key::PipelineStateRecord;
use pyxis_core::shader::ShaderStage;
use xxhash_rust::xxh3::Xxh3;

use crate::lru::LruCache;
use crate::scope::DeviceScope;

/// First four bytes of a persisted cache image.
pub const CACHE_MAGIC: [u8; 4] = *b"PXPC";
/// Container version this build reads and writes.
pub const CACHE_VERSION: u32 = 1;

/// LRU-bounded cache of baked pipelines.
#[derive(Debug)]
pub struct PipelineCache {
    lru: LruCache<u128, PipelineHandle>,
    capacity: usize,
}

impl PipelineCache {
    /// A cache that starts evicting once it holds more than `capacity`
    /// pipelines.
    pub fn new(capacity: usize) -> Self {
        Self {
            lru: LruCache::new(),
            capacity,
        }
    }

    /// Number of cached pipelines.
    pub fn len(&self) -> usize {
        self.lru.len()
    }

    /// Returns `true` if no pipelines are cached.
    pub fn is_empty(&self) -> bool {
        self.lru.is_empty()
    }

    /// Looks up the pipeline for `record`, invoking `create` on a miss.
    ///
    /// Overflow victims are evicted before the lookup and scheduled for
    /// destruction under the upcoming fence value.
    pub fn get_or_create(
        &mut self,
        scope: &DeviceScope<'_>,
        record: &PipelineStateRecord,
        create: impl FnOnce(&dyn DeviceDriver) -> Result<PipelineHandle, DriverError>,
    ) -> Result<PipelineHandle, ContextError> {
        while self.lru.len() > self.capacity {
            if let Some((_, victim)) = self.lru.evict() {
                log::debug!("evicting pipeline {victim:?} from the cache");
                let driver = Rc::clone(scope.driver);
                scope
                    .scheduler
                    .schedule(scope.timeline.next_value(), move || {
                        driver.destroy_pipeline(victim);
                    });
            }
        }

        let key = record.hash128();
        if let Some(&pipeline) = self.lru.get(&key) {
            return Ok(pipeline);
        }
        let pipeline = create(&**scope.driver)?;
        self.lru.insert(key, pipeline);
        log::debug!("baked pipeline {pipeline:?} ({} cached)", self.lru.len());
        Ok(pipeline)
    }

    /// Destroys every cached pipeline immediately. Shutdown only.
    pub fn destroy_all(&mut self, driver: &dyn DeviceDriver) {
        for (_, pipeline) in self.lru.drain() {
            driver.destroy_pipeline(pipeline);
        }
    }
}

/// Compiled shader bytecode keyed by stage and source text.
#[derive(Debug, Default)]
pub struct ShaderBytecodeCache {
    entries: HashMap<u64, Vec<u8>>,
}

impl ShaderBytecodeCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for one stage's source text.
    pub fn source_key(stage: ShaderStage, source: &str) -> u64 {
        let mut hasher = Xxh3::new();
        hasher.update(&[stage as u8]);
        hasher.update(source.as_bytes());
        hasher.digest()
    }

    /// Cached bytecode for a key.
    pub fn get(&self, key: u64) -> Option<&[u8]> {
        self.entries.get(&key).map(Vec::as_slice)
    }

    /// Stores bytecode under a key.
    pub fn insert(&mut self, key: u64, bytecode: Vec<u8>) {
        self.entries.insert(key, bytecode);
    }

    /// Number of cached blobs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over (key, bytecode) pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[u8])> {
        self.entries.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// Absorbs every entry of `other`.
    pub fn merge(&mut self, other: ShaderBytecodeCache) {
        self.entries.extend(other.entries);
    }
}

/// Contents of a successfully loaded cache image.
#[derive(Debug, Default)]
pub struct LoadedCache {
    /// The driver's opaque native cache blob; may be empty.
    pub native: Vec<u8>,
    /// Persisted shader bytecode.
    pub shaders: ShaderBytecodeCache,
}

/// Writes the cache container.
///
/// Layout, all integers little-endian: magic, version, native blob length
/// and bytes, entry count, then per entry the 64-bit key, blob length and
/// blob bytes.
pub fn save_cache(
    writer: &mut dyn Write,
    native: &[u8],
    shaders: &ShaderBytecodeCache,
) -> io::Result<()> {
    writer.write_all(&CACHE_MAGIC)?;
    writer.write_all(&CACHE_VERSION.to_le_bytes())?;
    writer.write_all(&(native.len() as u32).to_le_bytes())?;
    writer.write_all(native)?;
    writer.write_all(&(shaders.len() as u32).to_le_bytes())?;
    for (key, bytecode) in shaders.iter() {
        writer.write_all(&key.to_le_bytes())?;
        writer.write_all(&(bytecode.len() as u32).to_le_bytes())?;
        writer.write_all(bytecode)?;
    }
    Ok(())
}

fn read_u32(reader: &mut dyn Read) -> Result<u32, CacheLoadError> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_u64(reader: &mut dyn Read) -> Result<u64, CacheLoadError> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}

/// Reads a cache container written by [`save_cache`].
///
/// Fails closed: a bad magic, unknown version or short read rejects the
/// whole image and the caller starts with an empty cache.
pub fn load_cache(reader: &mut dyn Read) -> Result<LoadedCache, CacheLoadError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != CACHE_MAGIC {
        return Err(CacheLoadError::BadMagic);
    }
    let version = read_u32(reader)?;
    if version != CACHE_VERSION {
        return Err(CacheLoadError::UnsupportedVersion(version));
    }

    let native_len = read_u32(reader)? as usize;
    let mut native = vec![0u8; native_len];
    reader.read_exact(&mut native)?;

    let entry_count = read_u32(reader)?;
    let mut shaders = ShaderBytecodeCache::new();
    for _ in 0..entry_count {
        let key = read_u64(reader)?;
        let len = read_u32(reader)? as usize;
        let mut bytecode = vec![0u8; len];
        reader.read_exact(&mut bytecode)?;
        shaders.insert(key, bytecode);
    }
    Ok(LoadedCache { native, shaders })
}
