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

//! Vertex, index and uniform buffers.
//!
//! Dynamic buffers sit on a fence-rotated ring so rewrites never collide
//! with in-flight reads; static buffers live in device-local memory and are
//! filled through the staging arena. Dropping a buffer defers destruction
//! of its backing until the current submission point completes.

use std::cell::Cell;
use std::rc::Rc;

use pyxis_core::driver::{BufferDescriptor, BufferUsageFlags, MemoryPropertyFlags};
use pyxis_core::error::ContextError;
use pyxis_core::handle::BufferHandle;

use crate::fence::FenceValue;
use crate::memory::{MemoryAlloc, ResourceLinearity};
use crate::ring::RingBuffer;
use crate::scope::{DeviceScope, SharedServices};

/// What a buffer is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Vertex data.
    Vertex,
    /// Index data.
    Index,
    /// Shader uniform data.
    Uniform,
}

impl BufferKind {
    fn usage(self) -> BufferUsageFlags {
        let base = match self {
            BufferKind::Vertex => BufferUsageFlags::VERTEX,
            BufferKind::Index => BufferUsageFlags::INDEX,
            BufferKind::Uniform => BufferUsageFlags::UNIFORM,
        };
        base | BufferUsageFlags::TRANSFER_DST
    }
}

#[derive(Debug)]
enum BufferBacking {
    Dynamic(RingBuffer),
    Static {
        buffer: BufferHandle,
        alloc: MemoryAlloc,
    },
}

/// A GPU buffer with fence-tracked reads.
#[derive(Debug)]
pub struct GpuBuffer {
    shared: SharedServices,
    kind: BufferKind,
    size: u64,
    backing: Option<BufferBacking>,
    /// Fence value the last submission binding this buffer completes
    /// under. Stamped by the context at bind time.
    reader_fence: Cell<FenceValue>,
}

impl GpuBuffer {
    /// Creates a buffer. Dynamic buffers are host-visible and rewritable
    /// every frame; static ones are device-local and filled via staging.
    pub fn new(
        shared: SharedServices,
        kind: BufferKind,
        size: u64,
        dynamic: bool,
    ) -> Result<Self, ContextError> {
        let backing = if dynamic {
            let ring = RingBuffer::new(
                &*shared.driver,
                &mut shared.allocator.borrow_mut(),
                kind.usage(),
                size,
            )?;
            BufferBacking::Dynamic(ring)
        } else {
            let driver = &*shared.driver;
            let buffer = driver.create_buffer(&BufferDescriptor {
                size,
                usage: kind.usage(),
            })?;
            let requirements = driver.buffer_memory_requirements(buffer);
            let alloc = shared.allocator.borrow_mut().allocate(
                driver,
                &requirements,
                MemoryPropertyFlags::DEVICE_LOCAL,
                ResourceLinearity::Linear,
            )?;
            driver.bind_buffer_memory(buffer, alloc.memory(), alloc.offset());
            BufferBacking::Static { buffer, alloc }
        };
        Ok(Self {
            shared,
            kind,
            size,
            backing: Some(backing),
            reader_fence: Cell::new(FenceValue::ZERO),
        })
    }

    /// What the buffer is bound as.
    #[inline]
    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    /// Usable size in bytes (one ring slice for dynamic buffers).
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns `true` for ring-backed buffers.
    pub fn is_dynamic(&self) -> bool {
        matches!(self.backing, Some(BufferBacking::Dynamic(_)))
    }

    /// The driver buffer to bind right now.
    pub fn buffer(&self) -> BufferHandle {
        match &self.backing {
            Some(BufferBacking::Dynamic(ring)) => ring.buffer(),
            Some(BufferBacking::Static { buffer, .. }) => *buffer,
            // The backing is only taken in Drop; no caller holds the
            // wrapper past that point.
            None => unreachable!("buffer queried after release"),
        }
    }

    /// Byte offset of the live contents within [`buffer`](Self::buffer).
    pub fn bind_offset(&self) -> u64 {
        match &self.backing {
            Some(BufferBacking::Dynamic(ring)) => ring.active_offset(),
            _ => 0,
        }
    }

    /// Fence value of the buffer's last recorded reader.
    #[inline]
    pub fn reader_fence(&self) -> FenceValue {
        self.reader_fence.get()
    }

    /// Records that the submission completing under `fence` reads this
    /// buffer.
    #[inline]
    pub fn stamp_reader(&self, fence: FenceValue) {
        self.reader_fence.set(fence);
    }

    /// Orphans the current contents and writes into a fresh ring slice.
    /// Dynamic buffers only.
    pub fn write_discard(
        &mut self,
        scope: &DeviceScope<'_>,
        offset: u64,
        data: &[u8],
    ) -> Result<(), ContextError> {
        let reader = self.reader_fence.get();
        match &mut self.backing {
            Some(BufferBacking::Dynamic(ring)) => {
                ring.discard_slice(scope, reader)?;
                Self::copy_into_ring(ring, scope, offset, data)
            }
            _ => {
                debug_assert!(false, "discard write on a static buffer");
                Ok(())
            }
        }
    }

    /// Writes over the active slice in place. The caller must have
    /// established that no in-flight submission still reads it.
    pub fn write_in_place(
        &mut self,
        scope: &DeviceScope<'_>,
        offset: u64,
        data: &[u8],
    ) -> Result<(), ContextError> {
        match &mut self.backing {
            Some(BufferBacking::Dynamic(ring)) => Self::copy_into_ring(ring, scope, offset, data),
            _ => {
                debug_assert!(false, "in-place write on a static buffer");
                Ok(())
            }
        }
    }

    fn copy_into_ring(
        ring: &RingBuffer,
        scope: &DeviceScope<'_>,
        offset: u64,
        data: &[u8],
    ) -> Result<(), ContextError> {
        debug_assert!(offset + data.len() as u64 <= ring.slice_size());
        let driver = &**scope.driver;
        let mut allocator = scope.allocator.borrow_mut();
        let ptr = ring.map_active(driver, &mut allocator)?;
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                ptr.as_ptr().add(offset as usize),
                data.len(),
            );
        }
        ring.unmap_active(driver, &mut allocator);
        Ok(())
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        let scope = self.shared.scope();
        match self.backing.take() {
            Some(BufferBacking::Dynamic(ring)) => ring.release(&scope),
            Some(BufferBacking::Static { buffer, alloc }) => {
                let driver = Rc::clone(scope.driver);
                let allocator = Rc::clone(scope.allocator);
                scope.scheduler.schedule(scope.timeline.next_value(), move || {
                    driver.destroy_buffer(buffer);
                    allocator.borrow_mut().free(&alloc);
                });
            }
            None => {}
        }
    }
}
