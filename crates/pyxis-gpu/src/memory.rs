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

//! Device memory suballocation.
//!
//! Raw driver allocations are expensive and finite, so the allocator grabs
//! fixed-size blocks per memory kind and carves them up. Each block keeps
//! its slices in a doubly linked list (address order) plus an ordered free
//! index keyed by (size, offset) for best-fit lookup. Linear and non-linear
//! resources never share a block, which sidesteps per-device granularity
//! rules between the two.

use std::collections::BTreeMap;
use std::ptr::NonNull;

use pyxis_core::driver::{DeviceDriver, MemoryPropertyFlags, MemoryRequirements};
use pyxis_core::error::ContextError;
use pyxis_core::handle::MemoryHandle;
use pyxis_core::settings::ContextSettings;

/// Rounds `value` up to a power-of-two `alignment`.
#[inline]
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Whether a resource has linear or opaque (image) memory layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceLinearity {
    /// Buffers and linear-tiled images.
    Linear,
    /// Optimal-tiled images.
    NonLinear,
}

/// One suballocation. Returned by [`DeviceAllocator::allocate`] and handed
/// back verbatim to `free`, `map` and `unmap`.
#[derive(Debug, Clone)]
pub struct MemoryAlloc {
    kind_index: u32,
    linearity: ResourceLinearity,
    block_index: usize,
    node: usize,
    memory: MemoryHandle,
    offset: u64,
    size: u64,
}

impl MemoryAlloc {
    /// The raw driver allocation this slice lives in.
    #[inline]
    pub fn memory(&self) -> MemoryHandle {
        self.memory
    }

    /// Byte offset of the slice within its block.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Usable slice size in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }
}

#[derive(Debug, Clone, Copy)]
struct Slice {
    offset: u64,
    size: u64,
    free: bool,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
struct MemoryBlock {
    memory: MemoryHandle,
    size: u64,
    slices: Vec<Slice>,
    recycled: Vec<usize>,
    // Free slices keyed by (size, offset): best fit, lowest address first.
    free_index: BTreeMap<(u64, u64), usize>,
    mapped: Option<NonNull<u8>>,
    map_count: u32,
    persistent: bool,
}

impl MemoryBlock {
    fn new(memory: MemoryHandle, size: u64) -> Self {
        let slices = vec![Slice {
            offset: 0,
            size,
            free: true,
            prev: None,
            next: None,
        }];
        let mut free_index = BTreeMap::new();
        free_index.insert((size, 0), 0);
        Self {
            memory,
            size,
            slices,
            recycled: Vec::new(),
            free_index,
            mapped: None,
            map_count: 0,
            persistent: false,
        }
    }

    fn alloc_node(&mut self, slice: Slice) -> usize {
        match self.recycled.pop() {
            Some(idx) => {
                self.slices[idx] = slice;
                idx
            }
            None => {
                self.slices.push(slice);
                self.slices.len() - 1
            }
        }
    }

    /// Best-fit allocation. The search bound `size + alignment - 1`
    /// guarantees any candidate can absorb the alignment pad, at the cost
    /// of occasionally skipping a tight-but-aligned slice.
    fn try_allocate(&mut self, size: u64, alignment: u64) -> Option<(usize, u64)> {
        let bound = size + alignment - 1;
        let (&key, &node) = self.free_index.range((bound, 0)..).next()?;
        self.free_index.remove(&key);

        let slice = self.slices[node];
        debug_assert!(slice.free);
        let aligned = align_up(slice.offset, alignment);

        if aligned > slice.offset {
            let pad_size = aligned - slice.offset;
            let pad = self.alloc_node(Slice {
                offset: slice.offset,
                size: pad_size,
                free: true,
                prev: slice.prev,
                next: Some(node),
            });
            if let Some(p) = slice.prev {
                self.slices[p].next = Some(pad);
            }
            self.slices[node].prev = Some(pad);
            self.free_index.insert((pad_size, slice.offset), pad);
        }

        let end = slice.offset + slice.size;
        let used_end = aligned + size;
        debug_assert!(used_end <= end);
        if used_end < end {
            let remainder_size = end - used_end;
            let next = self.slices[node].next;
            let remainder = self.alloc_node(Slice {
                offset: used_end,
                size: remainder_size,
                free: true,
                prev: Some(node),
                next,
            });
            if let Some(n) = next {
                self.slices[n].prev = Some(remainder);
            }
            self.slices[node].next = Some(remainder);
            self.free_index.insert((remainder_size, used_end), remainder);
        }

        let used = &mut self.slices[node];
        used.offset = aligned;
        used.size = size;
        used.free = false;
        Some((node, aligned))
    }

    /// Frees a slice, coalescing with free neighbors in one pass.
    fn free(&mut self, node: usize) {
        debug_assert!(!self.slices[node].free, "double free of a memory slice");
        let mut offset = self.slices[node].offset;
        let mut size = self.slices[node].size;

        if let Some(p) = self.slices[node].prev {
            if self.slices[p].free {
                let prev = self.slices[p];
                self.free_index.remove(&(prev.size, prev.offset));
                offset = prev.offset;
                size += prev.size;
                self.slices[node].prev = prev.prev;
                if let Some(pp) = prev.prev {
                    self.slices[pp].next = Some(node);
                }
                self.recycled.push(p);
            }
        }
        if let Some(n) = self.slices[node].next {
            if self.slices[n].free {
                let next = self.slices[n];
                self.free_index.remove(&(next.size, next.offset));
                size += next.size;
                self.slices[node].next = next.next;
                if let Some(nn) = next.next {
                    self.slices[nn].prev = Some(node);
                }
                self.recycled.push(n);
            }
        }

        let merged = &mut self.slices[node];
        merged.offset = offset;
        merged.size = size;
        merged.free = true;
        self.free_index.insert((size, offset), node);
    }

    fn map(&mut self, driver: &dyn DeviceDriver) -> Result<NonNull<u8>, ContextError> {
        let base = match self.mapped {
            Some(ptr) => ptr,
            None => {
                let ptr = driver.map_memory(self.memory)?;
                self.mapped = Some(ptr);
                ptr
            }
        };
        self.map_count += 1;
        Ok(base)
    }

    fn unmap(&mut self, driver: &dyn DeviceDriver) {
        debug_assert!(self.map_count > 0, "unbalanced unmap");
        self.map_count = self.map_count.saturating_sub(1);
        if self.map_count == 0 && !self.persistent && self.mapped.take().is_some() {
            driver.unmap_memory(self.memory);
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct MemoryKind {
    property_flags: MemoryPropertyFlags,
    block_size: u64,
    min_alignment: u64,
}

/// Suballocator over all of the device's memory kinds.
#[derive(Debug)]
pub struct DeviceAllocator {
    kinds: Vec<MemoryKind>,
    linear_pools: Vec<Vec<MemoryBlock>>,
    non_linear_pools: Vec<Vec<MemoryBlock>>,
    prefer_persistent_mapping: bool,
}

impl DeviceAllocator {
    /// Builds the kind table from the driver's reported memory kinds.
    ///
    /// Block size per kind is `min(heap_size / min_block_count,
    /// max_block_size)`, so a small heap is still divisible into several
    /// blocks while large heaps stay bounded.
    pub fn new(driver: &dyn DeviceDriver, settings: &ContextSettings) -> Self {
        let limits = driver.limits();
        let kinds: Vec<MemoryKind> = driver
            .memory_kinds()
            .iter()
            .map(|info| {
                let block_size =
                    (info.heap_size / settings.min_block_count).min(settings.max_block_size);
                let host_visible = info
                    .property_flags
                    .contains(MemoryPropertyFlags::HOST_VISIBLE);
                let coherent = info
                    .property_flags
                    .contains(MemoryPropertyFlags::HOST_COHERENT);
                let min_alignment = if host_visible && !coherent {
                    limits.non_coherent_atom_size
                } else {
                    1
                };
                MemoryKind {
                    property_flags: info.property_flags,
                    block_size,
                    min_alignment,
                }
            })
            .collect();
        let count = kinds.len();
        Self {
            kinds,
            linear_pools: (0..count).map(|_| Vec::new()).collect(),
            non_linear_pools: (0..count).map(|_| Vec::new()).collect(),
            prefer_persistent_mapping: settings.prefer_persistent_mapping,
        }
    }

    fn pool_mut(&mut self, kind_index: u32, linearity: ResourceLinearity) -> &mut Vec<MemoryBlock> {
        match linearity {
            ResourceLinearity::Linear => &mut self.linear_pools[kind_index as usize],
            ResourceLinearity::NonLinear => &mut self.non_linear_pools[kind_index as usize],
        }
    }

    /// First memory kind that is both in the resource's mask and provides
    /// the required properties.
    fn find_kind(&self, kind_mask: u32, required: MemoryPropertyFlags) -> Option<u32> {
        self.kinds.iter().enumerate().find_map(|(i, kind)| {
            let in_mask = (kind_mask >> i) & 1 == 1;
            (in_mask && kind.property_flags.contains(required)).then_some(i as u32)
        })
    }

    /// Suballocates memory for a resource.
    ///
    /// Errors are fatal by design: no kind match means the device cannot
    /// host the resource, and an allocation larger than the block size is
    /// a sizing bug in the caller.
    pub fn allocate(
        &mut self,
        driver: &dyn DeviceDriver,
        requirements: &MemoryRequirements,
        required: MemoryPropertyFlags,
        linearity: ResourceLinearity,
    ) -> Result<MemoryAlloc, ContextError> {
        debug_assert!(requirements.size > 0);
        let kind_index = self
            .find_kind(requirements.kind_mask, required)
            .ok_or(ContextError::NoSuitableMemoryKind { required })?;
        let kind = self.kinds[kind_index as usize];
        if requirements.size > kind.block_size {
            return Err(ContextError::AllocationTooLarge {
                size: requirements.size,
                block_size: kind.block_size,
            });
        }
        let alignment = requirements.alignment.max(kind.min_alignment);

        let pool = self.pool_mut(kind_index, linearity);
        for (block_index, block) in pool.iter_mut().enumerate() {
            if let Some((node, offset)) = block.try_allocate(requirements.size, alignment) {
                return Ok(MemoryAlloc {
                    kind_index,
                    linearity,
                    block_index,
                    node,
                    memory: block.memory,
                    offset,
                    size: requirements.size,
                });
            }
        }

        let memory = driver.allocate_memory(kind_index, kind.block_size)?;
        log::debug!(
            "new {}-byte memory block in kind {} ({:?})",
            kind.block_size,
            kind_index,
            linearity
        );
        let mut block = MemoryBlock::new(memory, kind.block_size);
        if self.prefer_persistent_mapping
            && kind
                .property_flags
                .contains(MemoryPropertyFlags::HOST_VISIBLE)
        {
            block.mapped = Some(driver.map_memory(memory)?);
            block.persistent = true;
        }
        let (node, offset) = block
            .try_allocate(requirements.size, alignment)
            .ok_or(ContextError::AllocationTooLarge {
                size: requirements.size,
                block_size: kind.block_size,
            })?;
        let alloc = MemoryAlloc {
            kind_index,
            linearity,
            block_index: 0,
            node,
            memory,
            offset,
            size: requirements.size,
        };
        let pool = self.pool_mut(kind_index, linearity);
        pool.push(block);
        Ok(MemoryAlloc {
            block_index: pool.len() - 1,
            ..alloc
        })
    }

    /// Returns a slice to its block, coalescing with free neighbors.
    pub fn free(&mut self, alloc: &MemoryAlloc) {
        let block = &mut self.pool_mut(alloc.kind_index, alloc.linearity)[alloc.block_index];
        debug_assert_eq!(block.memory, alloc.memory);
        block.free(alloc.node);
    }

    /// Maps the slice's block and returns a pointer to the slice start.
    /// Blocks are mapped at most once; nested maps share the pointer.
    pub fn map(
        &mut self,
        driver: &dyn DeviceDriver,
        alloc: &MemoryAlloc,
    ) -> Result<NonNull<u8>, ContextError> {
        let block = &mut self.pool_mut(alloc.kind_index, alloc.linearity)[alloc.block_index];
        let base = block.map(driver)?;
        // In bounds: the slice lives inside the block's single mapping.
        let ptr = unsafe { base.as_ptr().add(alloc.offset as usize) };
        Ok(unsafe { NonNull::new_unchecked(ptr) })
    }

    /// Releases one map claim on the slice's block.
    pub fn unmap(&mut self, driver: &dyn DeviceDriver, alloc: &MemoryAlloc) {
        let block = &mut self.pool_mut(alloc.kind_index, alloc.linearity)[alloc.block_index];
        block.unmap(driver);
    }

    /// Number of blocks currently held for a kind and linearity.
    pub fn block_count(&self, kind_index: u32, linearity: ResourceLinearity) -> usize {
        match linearity {
            ResourceLinearity::Linear => self.linear_pools[kind_index as usize].len(),
            ResourceLinearity::NonLinear => self.non_linear_pools[kind_index as usize].len(),
        }
    }

    /// Frees every block back to the driver. Shutdown only; any live
    /// suballocation is invalid afterwards.
    pub fn release_blocks(&mut self, driver: &dyn DeviceDriver) {
        let pools = self
            .linear_pools
            .iter_mut()
            .chain(self.non_linear_pools.iter_mut());
        for pool in pools {
            for block in pool.drain(..) {
                if block.mapped.is_some() {
                    driver.unmap_memory(block.memory);
                }
                driver.free_memory(block.memory);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDriver;
    use pyxis_core::driver::MemoryKindInfo;

    fn host_flags() -> MemoryPropertyFlags {
        MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT
    }

    fn small_heap_driver() -> MockDriver {
        MockDriver::with_memory_kinds(vec![MemoryKindInfo {
            property_flags: host_flags(),
            heap_size: 16 * 1024,
        }])
    }

    fn small_heap_settings() -> ContextSettings {
        ContextSettings {
            max_block_size: 8 * 1024,
            min_block_count: 1,
            prefer_persistent_mapping: false,
            ..Default::default()
        }
    }

    fn req(size: u64, alignment: u64) -> MemoryRequirements {
        MemoryRequirements {
            size,
            alignment,
            kind_mask: 0b1,
        }
    }

    #[test]
    fn allocations_never_overlap() {
        let driver = small_heap_driver();
        let mut allocator = DeviceAllocator::new(&driver, &small_heap_settings());
        let mut allocs = Vec::new();
        for _ in 0..3 {
            allocs.push(
                allocator
                    .allocate(&driver, &req(1024, 256), host_flags(), ResourceLinearity::Linear)
                    .unwrap(),
            );
        }
        for (i, a) in allocs.iter().enumerate() {
            for b in allocs.iter().skip(i + 1) {
                let same_block = a.memory() == b.memory();
                let disjoint = a.offset() + a.size() <= b.offset()
                    || b.offset() + b.size() <= a.offset();
                assert!(!same_block || disjoint, "slices overlap");
            }
        }
    }

    #[test]
    fn third_allocation_spills_to_a_second_block() {
        let driver = small_heap_driver();
        let mut allocator = DeviceAllocator::new(&driver, &small_heap_settings());
        // Block size is 8 KiB; two 4 KiB slices fill the first block.
        let a = allocator
            .allocate(&driver, &req(4096, 256), host_flags(), ResourceLinearity::Linear)
            .unwrap();
        let b = allocator
            .allocate(&driver, &req(4096, 256), host_flags(), ResourceLinearity::Linear)
            .unwrap();
        assert_eq!(a.memory(), b.memory());
        assert_eq!(allocator.block_count(0, ResourceLinearity::Linear), 1);

        let c = allocator
            .allocate(&driver, &req(4096, 256), host_flags(), ResourceLinearity::Linear)
            .unwrap();
        assert_ne!(c.memory(), a.memory());
        assert_eq!(allocator.block_count(0, ResourceLinearity::Linear), 2);
    }

    #[test]
    fn free_coalesces_neighbors() {
        let driver = small_heap_driver();
        let mut allocator = DeviceAllocator::new(&driver, &small_heap_settings());
        let a = allocator
            .allocate(&driver, &req(2048, 1), host_flags(), ResourceLinearity::Linear)
            .unwrap();
        let b = allocator
            .allocate(&driver, &req(2048, 1), host_flags(), ResourceLinearity::Linear)
            .unwrap();
        let c = allocator
            .allocate(&driver, &req(2048, 1), host_flags(), ResourceLinearity::Linear)
            .unwrap();
        allocator.free(&a);
        allocator.free(&c);
        allocator.free(&b);
        // Everything merged back: a full-block allocation fits again.
        let whole = allocator
            .allocate(&driver, &req(8 * 1024, 1), host_flags(), ResourceLinearity::Linear)
            .unwrap();
        assert_eq!(whole.offset(), 0);
        assert_eq!(allocator.block_count(0, ResourceLinearity::Linear), 1);
    }

    #[test]
    fn alignment_pad_is_reusable() {
        let driver = small_heap_driver();
        let mut allocator = DeviceAllocator::new(&driver, &small_heap_settings());
        let a = allocator
            .allocate(&driver, &req(100, 1), host_flags(), ResourceLinearity::Linear)
            .unwrap();
        allocator.free(&a);
        // Freeing restored the full block, so an aligned allocation plus a
        // small one still fit.
        let b = allocator
            .allocate(&driver, &req(1000, 1024), host_flags(), ResourceLinearity::Linear)
            .unwrap();
        assert_eq!(b.offset() % 1024, 0);
        let c = allocator
            .allocate(&driver, &req(100, 1), host_flags(), ResourceLinearity::Linear)
            .unwrap();
        assert!(c.offset() + c.size() <= b.offset() || c.offset() >= b.offset() + b.size());
    }

    #[test]
    fn oversized_allocation_is_fatal() {
        let driver = small_heap_driver();
        let mut allocator = DeviceAllocator::new(&driver, &small_heap_settings());
        let err = allocator
            .allocate(&driver, &req(9 * 1024, 1), host_flags(), ResourceLinearity::Linear)
            .unwrap_err();
        assert!(matches!(err, ContextError::AllocationTooLarge { .. }));
    }

    #[test]
    fn missing_property_match_is_fatal() {
        let driver = small_heap_driver();
        let mut allocator = DeviceAllocator::new(&driver, &small_heap_settings());
        let err = allocator
            .allocate(
                &driver,
                &req(1024, 1),
                MemoryPropertyFlags::DEVICE_LOCAL,
                ResourceLinearity::Linear,
            )
            .unwrap_err();
        assert!(matches!(err, ContextError::NoSuitableMemoryKind { .. }));
    }

    #[test]
    fn linear_and_non_linear_resources_use_separate_blocks() {
        let driver = small_heap_driver();
        let mut allocator = DeviceAllocator::new(&driver, &small_heap_settings());
        let a = allocator
            .allocate(&driver, &req(1024, 1), host_flags(), ResourceLinearity::Linear)
            .unwrap();
        let b = allocator
            .allocate(&driver, &req(1024, 1), host_flags(), ResourceLinearity::NonLinear)
            .unwrap();
        assert_ne!(a.memory(), b.memory());
    }

    #[test]
    fn map_is_counted_per_block() {
        let driver = small_heap_driver();
        let mut allocator = DeviceAllocator::new(&driver, &small_heap_settings());
        let a = allocator
            .allocate(&driver, &req(1024, 1), host_flags(), ResourceLinearity::Linear)
            .unwrap();
        let b = allocator
            .allocate(&driver, &req(1024, 1), host_flags(), ResourceLinearity::Linear)
            .unwrap();
        let pa = allocator.map(&driver, &a).unwrap();
        let pb = allocator.map(&driver, &b).unwrap();
        assert_eq!(driver.map_calls(), 1, "one driver map per block");
        assert_ne!(pa, pb);
        allocator.unmap(&driver, &a);
        assert_eq!(driver.unmap_calls(), 0, "still mapped for b");
        allocator.unmap(&driver, &b);
        assert_eq!(driver.unmap_calls(), 1);
    }

    #[test]
    fn persistent_mapping_survives_unmap() {
        let driver = small_heap_driver();
        let settings = ContextSettings {
            prefer_persistent_mapping: true,
            ..small_heap_settings()
        };
        let mut allocator = DeviceAllocator::new(&driver, &settings);
        let a = allocator
            .allocate(&driver, &req(1024, 1), host_flags(), ResourceLinearity::Linear)
            .unwrap();
        assert_eq!(driver.map_calls(), 1, "mapped at block creation");
        let _ = allocator.map(&driver, &a).unwrap();
        allocator.unmap(&driver, &a);
        assert_eq!(driver.map_calls(), 1);
        assert_eq!(driver.unmap_calls(), 0);
    }
}
