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

//! Fence-rotated ring over a host-visible buffer.
//!
//! A dynamic resource is rewritten while the GPU may still be reading the
//! previous contents. The ring gives every rewrite a fresh slice and only
//! reuses a slice once the fence recorded at its last discard has
//! completed. Contention grows the ring to the next power of two; it never
//! shrinks.

use std::collections::VecDeque;
use std::ptr::NonNull;
use std::rc::Rc;

use pyxis_core::driver::{BufferDescriptor, BufferUsageFlags, DeviceDriver, MemoryPropertyFlags};
use pyxis_core::error::ContextError;
use pyxis_core::handle::BufferHandle;

use crate::fence::FenceValue;
use crate::memory::{DeviceAllocator, MemoryAlloc, ResourceLinearity};
use crate::scope::DeviceScope;

/// A host-visible buffer carved into equally sized slices, one active.
#[derive(Debug)]
pub struct RingBuffer {
    usage: BufferUsageFlags,
    buffer: BufferHandle,
    alloc: MemoryAlloc,
    slice_size: u64,
    slice_count: u64,
    active_offset: u64,
    /// Every non-active slice, oldest discard first, with the fence its
    /// last reader must complete.
    returned: VecDeque<(u64, FenceValue)>,
}

impl RingBuffer {
    /// A single-slice ring. Growth happens on demand at discard time.
    pub fn new(
        driver: &dyn DeviceDriver,
        allocator: &mut DeviceAllocator,
        usage: BufferUsageFlags,
        slice_size: u64,
    ) -> Result<Self, ContextError> {
        let (buffer, alloc) = Self::create_backing(driver, allocator, usage, slice_size)?;
        Ok(Self {
            usage,
            buffer,
            alloc,
            slice_size,
            slice_count: 1,
            active_offset: 0,
            returned: VecDeque::new(),
        })
    }

    fn create_backing(
        driver: &dyn DeviceDriver,
        allocator: &mut DeviceAllocator,
        usage: BufferUsageFlags,
        size: u64,
    ) -> Result<(BufferHandle, MemoryAlloc), ContextError> {
        let buffer = driver.create_buffer(&BufferDescriptor { size, usage })?;
        let requirements = driver.buffer_memory_requirements(buffer);
        let alloc = allocator.allocate(
            driver,
            &requirements,
            MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
            ResourceLinearity::Linear,
        )?;
        driver.bind_buffer_memory(buffer, alloc.memory(), alloc.offset());
        Ok((buffer, alloc))
    }

    /// The backing buffer handle.
    #[inline]
    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    /// Byte offset of the active slice within the buffer.
    #[inline]
    pub fn active_offset(&self) -> u64 {
        self.active_offset
    }

    /// Size of each slice in bytes.
    #[inline]
    pub fn slice_size(&self) -> u64 {
        self.slice_size
    }

    /// Current slice count; a power of two.
    #[inline]
    pub fn slice_count(&self) -> u64 {
        self.slice_count
    }

    /// Retires the active slice and advances to one the GPU is done with.
    ///
    /// `reader_fence` is the fence value the GPU work reading the retired
    /// slice will complete under. If the next reusable slice is still
    /// contended the ring doubles instead, moving to a fresh buffer and
    /// deferring destruction of the old one.
    pub fn discard_slice(
        &mut self,
        scope: &DeviceScope<'_>,
        reader_fence: FenceValue,
    ) -> Result<(), ContextError> {
        self.returned.push_back((self.active_offset, reader_fence));
        if let Some(&(offset, fence)) = self.returned.front() {
            if scope.timeline.is_known_completed(fence) {
                self.returned.pop_front();
                self.active_offset = offset;
                return Ok(());
            }
        }
        self.grow(scope)
    }

    fn grow(&mut self, scope: &DeviceScope<'_>) -> Result<(), ContextError> {
        let new_count = self.slice_count * 2;
        let (buffer, alloc) = Self::create_backing(
            &**scope.driver,
            &mut scope.allocator.borrow_mut(),
            self.usage,
            self.slice_size * new_count,
        )?;
        let old_buffer = std::mem::replace(&mut self.buffer, buffer);
        let old_alloc = std::mem::replace(&mut self.alloc, alloc);
        let driver = Rc::clone(scope.driver);
        let allocator = Rc::clone(scope.allocator);
        scope.scheduler.schedule(scope.timeline.next_value(), move || {
            driver.destroy_buffer(old_buffer);
            allocator.borrow_mut().free(&old_alloc);
        });

        self.slice_count = new_count;
        self.active_offset = 0;
        self.returned = (1..new_count)
            .map(|i| (i * self.slice_size, FenceValue::ZERO))
            .collect();
        log::debug!(
            "ring buffer grew to {} slices of {} bytes",
            new_count,
            self.slice_size
        );
        Ok(())
    }

    /// Maps the active slice for CPU writes.
    pub fn map_active(
        &self,
        driver: &dyn DeviceDriver,
        allocator: &mut DeviceAllocator,
    ) -> Result<NonNull<u8>, ContextError> {
        let base = allocator.map(driver, &self.alloc)?;
        let ptr = unsafe { base.as_ptr().add(self.active_offset as usize) };
        Ok(unsafe { NonNull::new_unchecked(ptr) })
    }

    /// Releases the map claim taken by [`map_active`](Self::map_active).
    pub fn unmap_active(&self, driver: &dyn DeviceDriver, allocator: &mut DeviceAllocator) {
        allocator.unmap(driver, &self.alloc);
    }

    /// Consumes the ring, deferring destruction of its backing until every
    /// submission tagged so far has completed.
    pub fn release(self, scope: &DeviceScope<'_>) {
        let RingBuffer { buffer, alloc, .. } = self;
        let driver = Rc::clone(scope.driver);
        let allocator = Rc::clone(scope.allocator);
        scope.scheduler.schedule(scope.timeline.next_value(), move || {
            driver.destroy_buffer(buffer);
            allocator.borrow_mut().free(&alloc);
        });
    }
}
