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

//! The [`DeviceDriver`] seam.
//!
//! Everything GPU-native sits behind this trait: raw memory, buffers,
//! images, command recording, binary fences, descriptors and pipeline
//! baking. The render context and its resource managers only ever talk to a
//! `dyn DeviceDriver`, which is what makes the whole lifecycle layer
//! testable against a mock.

use std::fmt;
use std::ptr::NonNull;

use crate::error::DriverError;
use crate::handle::{
    BufferHandle, CommandBufferHandle, DescriptorPoolHandle, DescriptorSetHandle,
    DescriptorSetLayoutHandle, FenceHandle, ImageHandle, ImageViewHandle, MemoryHandle,
    PipelineHandle, PipelineLayoutHandle, ShaderModuleHandle,
};
use crate::shader::ShaderStageFlags;
use crate::state::{
    BlendState, CullMode, DepthState, FrontFace, IndexFormat, PrimitiveTopology, RenderTargetInfo,
    StencilState, TextureFormat, VertexLayoutDescription, Viewport,
};

/// Properties of a device memory kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemoryPropertyFlags(pub u32);

impl MemoryPropertyFlags {
    /// No properties.
    pub const NONE: Self = Self(0);
    /// Fastest memory for GPU access.
    pub const DEVICE_LOCAL: Self = Self(1 << 0);
    /// CPU-mappable memory.
    pub const HOST_VISIBLE: Self = Self(1 << 1);
    /// CPU writes are visible without explicit flushes.
    pub const HOST_COHERENT: Self = Self(1 << 2);

    /// Returns `true` if every property in `other` is present in `self`.
    #[inline]
    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Returns `true` if `self` and `other` share any property.
    #[inline]
    pub fn intersects(&self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    /// Raw bit representation.
    #[inline]
    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for MemoryPropertyFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// How a buffer will be used, for driver-side placement decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferUsageFlags(pub u32);

impl BufferUsageFlags {
    /// Source of transfer commands.
    pub const TRANSFER_SRC: Self = Self(1 << 0);
    /// Destination of transfer commands.
    pub const TRANSFER_DST: Self = Self(1 << 1);
    /// Bound as a uniform buffer.
    pub const UNIFORM: Self = Self(1 << 2);
    /// Bound as a vertex buffer.
    pub const VERTEX: Self = Self(1 << 3);
    /// Bound as an index buffer.
    pub const INDEX: Self = Self(1 << 4);

    /// Returns `true` if every usage in `other` is present in `self`.
    #[inline]
    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Raw bit representation.
    #[inline]
    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for BufferUsageFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One memory kind the device exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryKindInfo {
    /// Properties of allocations from this kind.
    pub property_flags: MemoryPropertyFlags,
    /// Total size of the heap backing this kind, in bytes.
    pub heap_size: u64,
}

/// Device limits the lifecycle layer has to respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverLimits {
    /// Required alignment of dynamic uniform buffer offsets.
    pub min_uniform_offset_alignment: u64,
    /// Flush granularity of non-coherent host-visible memory.
    pub non_coherent_atom_size: u64,
}

/// Placement requirements the driver reports for a buffer or image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRequirements {
    /// Required allocation size in bytes.
    pub size: u64,
    /// Required offset alignment; always a power of two.
    pub alignment: u64,
    /// Bit `i` set means memory kind `i` can back the resource.
    pub kind_mask: u32,
}

/// Parameters for creating a driver buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescriptor {
    /// Buffer size in bytes.
    pub size: u64,
    /// Intended usage.
    pub usage: BufferUsageFlags,
}

/// Parameters for creating a driver image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDescriptor {
    /// Pixel format.
    pub format: TextureFormat,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Mip chain length.
    pub mip_levels: u32,
}

/// What a descriptor slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    /// A uniform buffer range.
    UniformBuffer,
    /// A combined image sampler.
    CombinedImageSampler,
}

/// One binding of a descriptor set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorSetLayoutBinding {
    /// Binding index within the set.
    pub binding: u32,
    /// Descriptor kind at this binding.
    pub kind: DescriptorKind,
    /// Stages that read the binding.
    pub stage_flags: ShaderStageFlags,
}

/// The resource written into one descriptor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorResource {
    /// A uniform buffer range.
    UniformBuffer {
        /// Backing buffer.
        buffer: BufferHandle,
        /// Byte offset of the range.
        offset: u64,
        /// Byte length of the range.
        range: u64,
    },
    /// A sampled image.
    CombinedImageSampler {
        /// View over the sampled image.
        view: ImageViewHandle,
    },
}

/// One descriptor set update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorWrite {
    /// Binding index within the set.
    pub binding: u32,
    /// Resource to install.
    pub resource: DescriptorResource,
}

/// Capacity of one descriptor pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorPoolLimits {
    /// Maximum descriptor sets per pool.
    pub max_sets: u32,
    /// Maximum uniform buffer descriptors per pool.
    pub max_uniform_buffers: u32,
    /// Maximum combined image sampler descriptors per pool.
    pub max_combined_image_samplers: u32,
}

impl Default for DescriptorPoolLimits {
    fn default() -> Self {
        Self {
            max_sets: 512,
            max_uniform_buffers: 1024,
            max_combined_image_samplers: 1024,
        }
    }
}

/// Everything needed to bake one graphics pipeline.
#[derive(Debug, Clone, Copy)]
pub struct PipelineDescriptor<'a> {
    /// Vertex stage module.
    pub vertex_module: ShaderModuleHandle,
    /// Fragment stage module.
    pub fragment_module: ShaderModuleHandle,
    /// Layout of the program's single descriptor set.
    pub layout: PipelineLayoutHandle,
    /// Blend configuration.
    pub blend: &'a BlendState,
    /// Depth configuration.
    pub depth: &'a DepthState,
    /// Stencil configuration, reference value excluded.
    pub stencil: &'a StencilState,
    /// Writable color channels.
    pub color_write_mask: u32,
    /// Face culling mode.
    pub cull_mode: CullMode,
    /// Front-face winding.
    pub front_face: FrontFace,
    /// Primitive assembly.
    pub topology: PrimitiveTopology,
    /// Vertex fetch layout.
    pub vertex_layout: &'a VertexLayoutDescription,
    /// Color attachment format.
    pub color_format: TextureFormat,
    /// Depth-stencil attachment format, if any.
    pub depth_stencil_format: Option<TextureFormat>,
}

/// The native GPU backend.
///
/// Implementations take `&self`; drivers wrap their own synchronization or,
/// like the test mock, use interior mutability. Creation paths return
/// `Result`, destruction and command recording are infallible.
pub trait DeviceDriver: fmt::Debug {
    // --- device introspection ---

    /// Memory kinds the device exposes, indexable by `MemoryRequirements`
    /// kind-mask bits.
    fn memory_kinds(&self) -> Vec<MemoryKindInfo>;

    /// Device limits.
    fn limits(&self) -> DriverLimits;

    // --- raw memory ---

    /// Allocates `size` bytes from memory kind `kind_index`.
    fn allocate_memory(&self, kind_index: u32, size: u64) -> Result<MemoryHandle, DriverError>;

    /// Frees a raw allocation.
    fn free_memory(&self, memory: MemoryHandle);

    /// Maps an allocation and returns its base pointer.
    fn map_memory(&self, memory: MemoryHandle) -> Result<NonNull<u8>, DriverError>;

    /// Unmaps a previously mapped allocation.
    fn unmap_memory(&self, memory: MemoryHandle);

    // --- buffers ---

    /// Creates an unbound buffer.
    fn create_buffer(&self, desc: &BufferDescriptor) -> Result<BufferHandle, DriverError>;

    /// Destroys a buffer.
    fn destroy_buffer(&self, buffer: BufferHandle);

    /// Reports placement requirements for a buffer.
    fn buffer_memory_requirements(&self, buffer: BufferHandle) -> MemoryRequirements;

    /// Binds a buffer to memory at `offset`.
    fn bind_buffer_memory(&self, buffer: BufferHandle, memory: MemoryHandle, offset: u64);

    // --- images ---

    /// Creates an unbound image.
    fn create_image(&self, desc: &ImageDescriptor) -> Result<ImageHandle, DriverError>;

    /// Destroys an image.
    fn destroy_image(&self, image: ImageHandle);

    /// Reports placement requirements for an image.
    fn image_memory_requirements(&self, image: ImageHandle) -> MemoryRequirements;

    /// Binds an image to memory at `offset`.
    fn bind_image_memory(&self, image: ImageHandle, memory: MemoryHandle, offset: u64);

    /// Creates a full view over an image.
    fn create_image_view(
        &self,
        image: ImageHandle,
        format: TextureFormat,
    ) -> Result<ImageViewHandle, DriverError>;

    /// Destroys an image view.
    fn destroy_image_view(&self, view: ImageViewHandle);

    // --- command recording ---

    /// Creates a command buffer ready for `begin_command_buffer`.
    fn create_command_buffer(&self) -> CommandBufferHandle;

    /// Puts a command buffer into the recording state.
    fn begin_command_buffer(&self, cb: CommandBufferHandle);

    /// Finishes recording.
    fn end_command_buffer(&self, cb: CommandBufferHandle);

    /// Records a buffer-to-buffer copy.
    fn cmd_copy_buffer(
        &self,
        cb: CommandBufferHandle,
        src: BufferHandle,
        src_offset: u64,
        dst: BufferHandle,
        dst_offset: u64,
        size: u64,
    );

    /// Records a buffer-to-image copy of one mip level.
    fn cmd_copy_buffer_to_image(
        &self,
        cb: CommandBufferHandle,
        src: BufferHandle,
        src_offset: u64,
        dst: ImageHandle,
        width: u32,
        height: u32,
        mip_level: u32,
    );

    /// Begins a render pass over `target`.
    fn cmd_begin_render_pass(&self, cb: CommandBufferHandle, target: &RenderTargetInfo);

    /// Ends the active render pass.
    fn cmd_end_render_pass(&self, cb: CommandBufferHandle);

    /// Records the dynamic viewport.
    fn cmd_set_viewport(&self, cb: CommandBufferHandle, viewport: &Viewport);

    /// Records the dynamic scissor rectangle.
    fn cmd_set_scissor(&self, cb: CommandBufferHandle, x: i32, y: i32, width: u32, height: u32);

    /// Records the dynamic stencil reference value.
    fn cmd_set_stencil_reference(&self, cb: CommandBufferHandle, reference: u32);

    /// Binds a graphics pipeline.
    fn cmd_bind_pipeline(&self, cb: CommandBufferHandle, pipeline: PipelineHandle);

    /// Binds the program's descriptor set.
    fn cmd_bind_descriptor_set(
        &self,
        cb: CommandBufferHandle,
        layout: PipelineLayoutHandle,
        set: DescriptorSetHandle,
    );

    /// Binds a vertex buffer to a slot.
    fn cmd_bind_vertex_buffer(
        &self,
        cb: CommandBufferHandle,
        slot: u32,
        buffer: BufferHandle,
        offset: u64,
    );

    /// Binds the index buffer.
    fn cmd_bind_index_buffer(
        &self,
        cb: CommandBufferHandle,
        buffer: BufferHandle,
        offset: u64,
        format: IndexFormat,
    );

    /// Records a non-indexed draw.
    fn cmd_draw(&self, cb: CommandBufferHandle, vertex_count: u32, first_vertex: u32);

    /// Records an indexed draw.
    fn cmd_draw_indexed(
        &self,
        cb: CommandBufferHandle,
        index_count: u32,
        first_index: u32,
        base_vertex: i32,
    );

    // --- fences and submission ---

    /// Creates an unsignaled binary fence.
    fn create_fence(&self) -> FenceHandle;

    /// Returns a signaled fence to the unsignaled state.
    fn reset_fence(&self, fence: FenceHandle);

    /// Non-blocking signal check.
    fn fence_status(&self, fence: FenceHandle) -> bool;

    /// Destroys a fence.
    fn destroy_fence(&self, fence: FenceHandle);

    /// Submits a finished command buffer; `fence` signals on completion.
    fn submit(&self, cb: CommandBufferHandle, fence: FenceHandle);

    // --- descriptors ---

    /// Creates a descriptor pool with the given capacity.
    fn create_descriptor_pool(
        &self,
        limits: &DescriptorPoolLimits,
    ) -> Result<DescriptorPoolHandle, DriverError>;

    /// Returns every set in the pool to the pool at once.
    fn reset_descriptor_pool(&self, pool: DescriptorPoolHandle);

    /// Destroys a descriptor pool and all its sets.
    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle);

    /// Carves a set with the given layout out of a pool.
    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<DescriptorSetHandle, DriverError>;

    /// Writes resources into a set's bindings.
    fn update_descriptor_set(&self, set: DescriptorSetHandle, writes: &[DescriptorWrite]);

    /// Creates a descriptor set layout.
    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorSetLayoutBinding],
    ) -> Result<DescriptorSetLayoutHandle, DriverError>;

    /// Destroys a descriptor set layout.
    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle);

    /// Creates a pipeline layout over a single set layout.
    fn create_pipeline_layout(
        &self,
        set_layout: DescriptorSetLayoutHandle,
    ) -> Result<PipelineLayoutHandle, DriverError>;

    /// Destroys a pipeline layout.
    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle);

    // --- shaders and pipelines ---

    /// Wraps compiled bytecode in a shader module.
    fn create_shader_module(&self, bytecode: &[u8]) -> Result<ShaderModuleHandle, DriverError>;

    /// Destroys a shader module.
    fn destroy_shader_module(&self, module: ShaderModuleHandle);

    /// Bakes a graphics pipeline.
    fn create_pipeline(&self, desc: &PipelineDescriptor<'_>) -> Result<PipelineHandle, DriverError>;

    /// Destroys a pipeline.
    fn destroy_pipeline(&self, pipeline: PipelineHandle);

    /// Serializes the driver's native pipeline cache, possibly empty.
    fn native_pipeline_cache_data(&self) -> Vec<u8>;

    /// Seeds the driver's native pipeline cache from a previous run.
    fn import_native_pipeline_cache(&self, data: &[u8]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_property_flags_compose() {
        let host = MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT;
        assert!(host.contains(MemoryPropertyFlags::HOST_VISIBLE));
        assert!(!host.contains(MemoryPropertyFlags::DEVICE_LOCAL));
        assert!(host.intersects(MemoryPropertyFlags::HOST_COHERENT));
    }

    #[test]
    fn default_pool_limits_match_convention() {
        let limits = DescriptorPoolLimits::default();
        assert_eq!(limits.max_sets, 512);
        assert_eq!(limits.max_uniform_buffers, 1024);
        assert_eq!(limits.max_combined_image_samplers, 1024);
    }
}
