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

//! Transient descriptor set allocation.
//!
//! Descriptor sets are written fresh for every draw, so individual sets are
//! never recycled. Sets come out of the active pool until its counters
//! would overflow; the whole pool is then discarded under the upcoming
//! fence value and reset in bulk once that fence completes.

use std::collections::VecDeque;

use pyxis_core::driver::{DescriptorPoolLimits, DeviceDriver};
use pyxis_core::error::ContextError;
use pyxis_core::handle::{DescriptorPoolHandle, DescriptorSetHandle, DescriptorSetLayoutHandle};

use crate::fence::{FenceTimeline, FenceValue};

#[derive(Debug, Default, Clone, Copy)]
struct PoolCounters {
    sets: u32,
    uniform_buffers: u32,
    combined_image_samplers: u32,
}

/// Pool-rotating descriptor set allocator.
#[derive(Debug)]
pub struct DescriptorAllocator {
    limits: DescriptorPoolLimits,
    pool: Option<DescriptorPoolHandle>,
    counters: PoolCounters,
    /// Discarded pools, oldest first, with the fence value that must
    /// complete before each can be reset.
    busy: VecDeque<(FenceValue, DescriptorPoolHandle)>,
}

impl DescriptorAllocator {
    /// An allocator with no pool yet; pools are created on first demand.
    pub fn new(limits: DescriptorPoolLimits) -> Self {
        Self {
            limits,
            pool: None,
            counters: PoolCounters::default(),
            busy: VecDeque::new(),
        }
    }

    fn would_overflow(&self, uniform_buffers: u32, combined_image_samplers: u32) -> bool {
        self.counters.sets + 1 > self.limits.max_sets
            || self.counters.uniform_buffers + uniform_buffers > self.limits.max_uniform_buffers
            || self.counters.combined_image_samplers + combined_image_samplers
                > self.limits.max_combined_image_samplers
    }

    /// Allocates one set holding the given descriptor counts.
    pub fn allocate_set(
        &mut self,
        driver: &dyn DeviceDriver,
        timeline: &FenceTimeline,
        layout: DescriptorSetLayoutHandle,
        uniform_buffers: u32,
        combined_image_samplers: u32,
    ) -> Result<DescriptorSetHandle, ContextError> {
        if self.pool.is_some() && self.would_overflow(uniform_buffers, combined_image_samplers) {
            self.discard_pool(timeline.next_value());
        }
        let pool = self.ensure_pool(driver, timeline)?;
        let set = driver.allocate_descriptor_set(pool, layout)?;
        self.counters.sets += 1;
        self.counters.uniform_buffers += uniform_buffers;
        self.counters.combined_image_samplers += combined_image_samplers;
        Ok(set)
    }

    /// Retires the active pool under `fence`. Called at every flush so the
    /// sets written this submission stay untouched until the GPU is done.
    pub fn discard_pool(&mut self, fence: FenceValue) {
        if let Some(pool) = self.pool.take() {
            self.busy.push_back((fence, pool));
        }
        self.counters = PoolCounters::default();
    }

    fn ensure_pool(
        &mut self,
        driver: &dyn DeviceDriver,
        timeline: &FenceTimeline,
    ) -> Result<DescriptorPoolHandle, ContextError> {
        if let Some(pool) = self.pool {
            return Ok(pool);
        }
        let pool = match self.busy.front() {
            Some(&(fence, _)) if timeline.is_known_completed(fence) => {
                // Reuse: pop_front cannot fail after front() matched.
                let recycled = self.busy.pop_front().map(|(_, pool)| pool);
                match recycled {
                    Some(pool) => {
                        driver.reset_descriptor_pool(pool);
                        pool
                    }
                    None => driver.create_descriptor_pool(&self.limits)?,
                }
            }
            _ => driver.create_descriptor_pool(&self.limits)?,
        };
        self.counters = PoolCounters::default();
        self.pool = Some(pool);
        Ok(pool)
    }

    /// Total pools held: the active one plus every busy pool.
    pub fn pool_count(&self) -> usize {
        self.busy.len() + usize::from(self.pool.is_some())
    }

    /// Destroys all pools. Shutdown only.
    pub fn destroy(&mut self, driver: &dyn DeviceDriver) {
        if let Some(pool) = self.pool.take() {
            driver.destroy_descriptor_pool(pool);
        }
        for (_, pool) in self.busy.drain(..) {
            driver.destroy_descriptor_pool(pool);
        }
        self.counters = PoolCounters::default();
    }
}
