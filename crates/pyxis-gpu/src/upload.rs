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

//! Linear staging arena for CPU-to-GPU uploads.
//!
//! Staging data only has to live until the copy command consuming it
//! executes, so the arena is a bump cursor over one persistently mapped
//! host-visible buffer. The cursor is reset at an external checkpoint (the
//! end of a fully drained frame); capacity doubles when a request does not
//! fit, with the old buffer routed through deferred destruction.

use std::ptr::NonNull;
use std::rc::Rc;

use pyxis_core::driver::{BufferDescriptor, BufferUsageFlags, DeviceDriver, MemoryPropertyFlags};
use pyxis_core::error::ContextError;
use pyxis_core::handle::BufferHandle;

use crate::memory::{align_up, DeviceAllocator, MemoryAlloc, ResourceLinearity};
use crate::scope::DeviceScope;

/// One staged region: where the copy command reads from, plus a mapped
/// pointer for the CPU to fill it.
#[derive(Debug)]
pub struct UploadAlloc {
    buffer: BufferHandle,
    offset: u64,
    size: u64,
    ptr: NonNull<u8>,
}

impl UploadAlloc {
    /// The staging buffer a copy command should read from.
    #[inline]
    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    /// Byte offset of the region within the staging buffer.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Copies `data` into the staged region.
    pub fn write(&self, data: &[u8]) {
        debug_assert!(data.len() as u64 <= self.size, "staging overflow");
        // The region was carved exclusively for this alloc and stays
        // mapped for the arena's lifetime.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.as_ptr(), data.len());
        }
    }
}

/// Bump allocator over a host-visible staging buffer.
#[derive(Debug)]
pub struct UploadArena {
    buffer: BufferHandle,
    alloc: MemoryAlloc,
    base: NonNull<u8>,
    capacity: u64,
    cursor: u64,
}

impl UploadArena {
    /// Creates the arena with `capacity` bytes of staging space.
    pub fn new(
        driver: &dyn DeviceDriver,
        allocator: &mut DeviceAllocator,
        capacity: u64,
    ) -> Result<Self, ContextError> {
        let (buffer, alloc, base) = Self::create_backing(driver, allocator, capacity)?;
        Ok(Self {
            buffer,
            alloc,
            base,
            capacity,
            cursor: 0,
        })
    }

    fn create_backing(
        driver: &dyn DeviceDriver,
        allocator: &mut DeviceAllocator,
        capacity: u64,
    ) -> Result<(BufferHandle, MemoryAlloc, NonNull<u8>), ContextError> {
        let buffer = driver.create_buffer(&BufferDescriptor {
            size: capacity,
            usage: BufferUsageFlags::TRANSFER_SRC,
        })?;
        let requirements = driver.buffer_memory_requirements(buffer);
        let alloc = allocator.allocate(
            driver,
            &requirements,
            MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
            ResourceLinearity::Linear,
        )?;
        driver.bind_buffer_memory(buffer, alloc.memory(), alloc.offset());
        // Held mapped until the arena (or a replaced backing) is destroyed.
        let base = allocator.map(driver, &alloc)?;
        Ok((buffer, alloc, base))
    }

    /// Current capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Stages `size` bytes at the given power-of-two alignment.
    pub fn allocate(
        &mut self,
        scope: &DeviceScope<'_>,
        size: u64,
        alignment: u64,
    ) -> Result<UploadAlloc, ContextError> {
        let mut offset = align_up(self.cursor, alignment);
        if offset + size > self.capacity {
            self.grow(scope, size)?;
            offset = 0;
        }
        self.cursor = offset + size;
        let ptr = unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset as usize)) };
        Ok(UploadAlloc {
            buffer: self.buffer,
            offset,
            size,
            ptr,
        })
    }

    fn grow(&mut self, scope: &DeviceScope<'_>, needed: u64) -> Result<(), ContextError> {
        let mut capacity = self.capacity * 2;
        while capacity < needed {
            capacity *= 2;
        }
        let (buffer, alloc, base) = Self::create_backing(
            &**scope.driver,
            &mut scope.allocator.borrow_mut(),
            capacity,
        )?;
        let old_buffer = std::mem::replace(&mut self.buffer, buffer);
        let old_alloc = std::mem::replace(&mut self.alloc, alloc);
        let driver = Rc::clone(scope.driver);
        let allocator = Rc::clone(scope.allocator);
        scope.scheduler.schedule(scope.timeline.next_value(), move || {
            let mut allocator = allocator.borrow_mut();
            allocator.unmap(&*driver, &old_alloc);
            driver.destroy_buffer(old_buffer);
            allocator.free(&old_alloc);
        });
        self.base = base;
        self.capacity = capacity;
        self.cursor = 0;
        log::debug!("upload arena grew to {capacity} bytes");
        Ok(())
    }

    /// Rewinds the cursor. Only valid at an external checkpoint where all
    /// previously staged copies are known to have executed.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Destroys the backing immediately. Shutdown only; the device must be
    /// idle.
    pub fn destroy_now(&mut self, driver: &dyn DeviceDriver, allocator: &mut DeviceAllocator) {
        allocator.unmap(driver, &self.alloc);
        driver.destroy_buffer(self.buffer);
        allocator.free(&self.alloc);
        self.capacity = 0;
        self.cursor = 0;
    }

    /// Consumes the arena, deferring destruction of its backing.
    pub fn release(self, scope: &DeviceScope<'_>) {
        let UploadArena { buffer, alloc, .. } = self;
        let driver = Rc::clone(scope.driver);
        let allocator = Rc::clone(scope.allocator);
        scope.scheduler.schedule(scope.timeline.next_value(), move || {
            let mut allocator = allocator.borrow_mut();
            allocator.unmap(&*driver, &alloc);
            driver.destroy_buffer(buffer);
            allocator.free(&alloc);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fence::FenceTimeline;
    use crate::mock::MockDriver;
    use crate::scheduler::ReleaseQueue;
    use pyxis_core::settings::ContextSettings;
    use std::cell::RefCell;

    struct Fixture {
        driver: Rc<dyn DeviceDriver>,
        mock: Rc<MockDriver>,
        allocator: Rc<RefCell<DeviceAllocator>>,
        scheduler: Rc<ReleaseQueue>,
        timeline: Rc<FenceTimeline>,
    }

    impl Fixture {
        fn new() -> Self {
            let mock = Rc::new(MockDriver::new());
            let driver: Rc<dyn DeviceDriver> = mock.clone();
            let settings = ContextSettings::default();
            let allocator = Rc::new(RefCell::new(DeviceAllocator::new(&*driver, &settings)));
            Self {
                driver,
                mock,
                allocator,
                scheduler: Rc::new(ReleaseQueue::new()),
                timeline: Rc::new(FenceTimeline::new()),
            }
        }

        fn scope(&self) -> DeviceScope<'_> {
            DeviceScope {
                driver: &self.driver,
                allocator: &self.allocator,
                scheduler: &self.scheduler,
                timeline: &self.timeline,
            }
        }
    }

    #[test]
    fn bump_allocations_are_aligned_and_disjoint() {
        let fx = Fixture::new();
        let mut arena =
            UploadArena::new(&*fx.driver, &mut fx.allocator.borrow_mut(), 1024).unwrap();
        let a = arena.allocate(&fx.scope(), 100, 4).unwrap();
        let b = arena.allocate(&fx.scope(), 100, 64).unwrap();
        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset() % 64, 0);
        assert!(b.offset() >= a.offset() + 100);
        assert_eq!(a.buffer(), b.buffer());
    }

    #[test]
    fn overflow_doubles_and_defers_the_old_buffer() {
        let fx = Fixture::new();
        let mut arena =
            UploadArena::new(&*fx.driver, &mut fx.allocator.borrow_mut(), 256).unwrap();
        let first = arena.allocate(&fx.scope(), 200, 4).unwrap();
        let pending = fx.timeline.next_value();
        let second = arena.allocate(&fx.scope(), 200, 4).unwrap();
        assert_eq!(arena.capacity(), 512);
        assert_ne!(first.buffer(), second.buffer());
        assert_eq!(second.offset(), 0);
        assert_eq!(fx.mock.destroyed_buffers(), 0);

        fx.timeline.advance_next();
        fx.timeline.publish_completed(pending);
        fx.scheduler.perform(fx.timeline.last_completed());
        assert_eq!(fx.mock.destroyed_buffers(), 1);
    }

    #[test]
    fn oversized_request_grows_until_it_fits() {
        let fx = Fixture::new();
        let mut arena =
            UploadArena::new(&*fx.driver, &mut fx.allocator.borrow_mut(), 256).unwrap();
        let big = arena.allocate(&fx.scope(), 5000, 4).unwrap();
        assert!(arena.capacity() >= 5000);
        assert!(arena.capacity().is_power_of_two());
        assert_eq!(big.offset(), 0);
    }

    #[test]
    fn reset_rewinds_the_cursor() {
        let fx = Fixture::new();
        let mut arena =
            UploadArena::new(&*fx.driver, &mut fx.allocator.borrow_mut(), 1024).unwrap();
        let _ = arena.allocate(&fx.scope(), 512, 4).unwrap();
        arena.reset();
        let again = arena.allocate(&fx.scope(), 512, 4).unwrap();
        assert_eq!(again.offset(), 0);
    }

    #[test]
    fn staged_writes_land_in_the_mapped_region() {
        let fx = Fixture::new();
        let mut arena =
            UploadArena::new(&*fx.driver, &mut fx.allocator.borrow_mut(), 256).unwrap();
        let alloc = arena.allocate(&fx.scope(), 4, 4).unwrap();
        alloc.write(&[1, 2, 3, 4]);
        let contents = fx.mock.buffer_memory_view(alloc.buffer(), alloc.offset(), 4);
        assert_eq!(contents, vec![1, 2, 3, 4]);
    }
}
