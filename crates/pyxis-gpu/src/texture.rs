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

//! Sampled 2D textures.
//!
//! A texture owns an optimal-tiled image in device-local memory plus a
//! full view of it. Pixel data arrives through the staging arena and a
//! recorded copy. Dropping a texture defers destruction the same way
//! buffers do.

use std::cell::Cell;
use std::rc::Rc;

use pyxis_core::driver::{ImageDescriptor, MemoryPropertyFlags};
use pyxis_core::error::ContextError;
use pyxis_core::handle::{ImageHandle, ImageViewHandle};
use pyxis_core::state::TextureFormat;

use crate::fence::FenceValue;
use crate::memory::{MemoryAlloc, ResourceLinearity};
use crate::scope::SharedServices;

/// A sampled 2D texture.
#[derive(Debug)]
pub struct GpuTexture {
    shared: SharedServices,
    image: ImageHandle,
    view: ImageViewHandle,
    alloc: Option<MemoryAlloc>,
    format: TextureFormat,
    width: u32,
    height: u32,
    reader_fence: Cell<FenceValue>,
}

impl GpuTexture {
    /// Creates an uninitialized texture with a single mip level.
    pub fn new(
        shared: SharedServices,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> Result<Self, ContextError> {
        let driver = &*shared.driver;
        let image = driver.create_image(&ImageDescriptor {
            format,
            width,
            height,
            mip_levels: 1,
        })?;
        let requirements = driver.image_memory_requirements(image);
        let alloc = shared.allocator.borrow_mut().allocate(
            driver,
            &requirements,
            MemoryPropertyFlags::DEVICE_LOCAL,
            ResourceLinearity::NonLinear,
        )?;
        driver.bind_image_memory(image, alloc.memory(), alloc.offset());
        let view = driver.create_image_view(image, format)?;
        Ok(Self {
            shared,
            image,
            view,
            alloc: Some(alloc),
            format,
            width,
            height,
            reader_fence: Cell::new(FenceValue::ZERO),
        })
    }

    /// The underlying image.
    #[inline]
    pub fn image(&self) -> ImageHandle {
        self.image
    }

    /// A full view over the image, for descriptor writes.
    #[inline]
    pub fn view(&self) -> ImageViewHandle {
        self.view
    }

    /// Pixel format.
    #[inline]
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Byte size of one full-resolution pixel upload.
    pub fn upload_size(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * u64::from(self.format.bytes_per_pixel())
    }

    /// Fence value of the texture's last recorded reader.
    #[inline]
    pub fn reader_fence(&self) -> FenceValue {
        self.reader_fence.get()
    }

    /// Records that the submission completing under `fence` samples this
    /// texture.
    #[inline]
    pub fn stamp_reader(&self, fence: FenceValue) {
        self.reader_fence.set(fence);
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        let scope = self.shared.scope();
        let driver = Rc::clone(scope.driver);
        let allocator = Rc::clone(scope.allocator);
        let image = self.image;
        let view = self.view;
        let alloc = self.alloc.take();
        scope.scheduler.schedule(scope.timeline.next_value(), move || {
            driver.destroy_image_view(view);
            driver.destroy_image(image);
            if let Some(alloc) = alloc {
                allocator.borrow_mut().free(&alloc);
            }
        });
    }
}
