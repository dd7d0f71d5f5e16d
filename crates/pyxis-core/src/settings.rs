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

//! Tunables the render context is constructed with.

use crate::driver::DescriptorPoolLimits;

/// Configuration for a render context and its resource managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextSettings {
    /// Keep host-visible memory blocks mapped for their whole lifetime
    /// instead of mapping and unmapping per access.
    pub prefer_persistent_mapping: bool,
    /// Initial capacity of the staging upload arena, in bytes.
    pub upload_arena_size: u64,
    /// Upper bound on device memory block size, in bytes.
    pub max_block_size: u64,
    /// A heap is carved into at least this many blocks.
    pub min_block_count: u64,
    /// Capacity of each transient descriptor pool.
    pub descriptor_pool_limits: DescriptorPoolLimits,
    /// Pipeline LRU eviction threshold.
    pub pipeline_cache_capacity: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            prefer_persistent_mapping: true,
            upload_arena_size: 4 * 1024 * 1024,
            max_block_size: 64 * 1024 * 1024,
            min_block_count: 16,
            descriptor_pool_limits: DescriptorPoolLimits::default(),
            pipeline_cache_capacity: 4096,
        }
    }
}
