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

//! In-memory mock of the [`DeviceDriver`] trait.
//!
//! Memory allocations are real heap buffers so mapped writes and recorded
//! buffer copies can be verified byte-for-byte. Fences signal either
//! immediately on submit (the default) or under manual control, which is
//! how tests stage GPU-still-busy scenarios.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::ptr::NonNull;

use pyxis_core::driver::{
    BufferDescriptor, DescriptorPoolLimits, DescriptorSetLayoutBinding, DescriptorWrite,
    DeviceDriver, DriverLimits, ImageDescriptor, MemoryKindInfo, MemoryPropertyFlags,
    MemoryRequirements, PipelineDescriptor,
};
use pyxis_core::error::DriverError;
use pyxis_core::handle::{
    BufferHandle, CommandBufferHandle, DescriptorPoolHandle, DescriptorSetHandle,
    DescriptorSetLayoutHandle, FenceHandle, ImageHandle, ImageViewHandle, MemoryHandle,
    PipelineHandle, PipelineLayoutHandle, ShaderModuleHandle,
};
use pyxis_core::state::{IndexFormat, RenderTargetInfo, TextureFormat, Viewport};

#[derive(Debug, Default)]
struct Counters {
    buffers_created: u32,
    buffers_destroyed: u32,
    images_created: u32,
    images_destroyed: u32,
    views_created: u32,
    views_destroyed: u32,
    maps: u32,
    unmaps: u32,
    fences_created: u32,
    fences_destroyed: u32,
    submits: u32,
    pools_created: u32,
    pools_reset: u32,
    pools_destroyed: u32,
    pipelines_created: u32,
    pipelines_destroyed: u32,
    draws: u32,
    buffer_copies: u32,
    image_copies: u32,
    native_cache_imports: u32,
}

#[derive(Debug)]
struct BufferInfo {
    size: u64,
    bound: Option<(u64, u64)>, // (memory handle, offset)
}

#[derive(Debug, Default)]
struct MockState {
    next_handle: u64,
    memory: HashMap<u64, Box<[u8]>>,
    buffers: HashMap<u64, BufferInfo>,
    images: HashMap<u64, u64>,
    signaled: HashSet<u64>,
    pending_fences: VecDeque<u64>,
    native_cache: Vec<u8>,
    counters: Counters,
}

impl MockState {
    fn mint(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

/// Test double for the native backend.
#[derive(Debug)]
pub struct MockDriver {
    kinds: Vec<MemoryKindInfo>,
    limits: DriverLimits,
    auto_signal: Cell<bool>,
    state: RefCell<MockState>,
}

impl MockDriver {
    /// A driver with one device-local and one host-visible memory kind.
    pub fn new() -> Self {
        Self::with_memory_kinds(vec![
            MemoryKindInfo {
                property_flags: MemoryPropertyFlags::DEVICE_LOCAL,
                heap_size: 256 * 1024 * 1024,
            },
            MemoryKindInfo {
                property_flags: MemoryPropertyFlags::HOST_VISIBLE
                    | MemoryPropertyFlags::HOST_COHERENT,
                heap_size: 256 * 1024 * 1024,
            },
        ])
    }

    /// A driver advertising exactly the given memory kinds.
    pub fn with_memory_kinds(kinds: Vec<MemoryKindInfo>) -> Self {
        Self {
            kinds,
            limits: DriverLimits {
                min_uniform_offset_alignment: 256,
                non_coherent_atom_size: 64,
            },
            auto_signal: Cell::new(true),
            state: RefCell::new(MockState::default()),
        }
    }

    /// Switches fences to manual signaling via
    /// [`signal_next_fence`](Self::signal_next_fence).
    pub fn set_manual_fences(&self) {
        self.auto_signal.set(false);
    }

    /// Signals the oldest unsignaled submitted fence.
    pub fn signal_next_fence(&self) {
        let mut state = self.state.borrow_mut();
        if let Some(fence) = state.pending_fences.pop_front() {
            state.signaled.insert(fence);
        }
    }

    /// Signals every unsignaled submitted fence.
    pub fn signal_all_fences(&self) {
        let mut state = self.state.borrow_mut();
        while let Some(fence) = state.pending_fences.pop_front() {
            state.signaled.insert(fence);
        }
    }

    /// Reads bytes out of the memory a buffer is bound to.
    pub fn buffer_memory_view(&self, buffer: BufferHandle, offset: u64, len: usize) -> Vec<u8> {
        let state = self.state.borrow();
        let info = state.buffers.get(&buffer.0).expect("unknown buffer");
        let (memory, bind_offset) = info.bound.expect("buffer not bound");
        let backing = state.memory.get(&memory).expect("memory freed");
        let start = (bind_offset + offset) as usize;
        backing[start..start + len].to_vec()
    }

    /// Buffers created so far.
    pub fn created_buffers(&self) -> u32 {
        self.state.borrow().counters.buffers_created
    }

    /// Buffers destroyed so far.
    pub fn destroyed_buffers(&self) -> u32 {
        self.state.borrow().counters.buffers_destroyed
    }

    /// Images destroyed so far.
    pub fn destroyed_images(&self) -> u32 {
        self.state.borrow().counters.images_destroyed
    }

    /// Image views destroyed so far.
    pub fn destroyed_image_views(&self) -> u32 {
        self.state.borrow().counters.views_destroyed
    }

    /// Raw map calls observed.
    pub fn map_calls(&self) -> u32 {
        self.state.borrow().counters.maps
    }

    /// Raw unmap calls observed.
    pub fn unmap_calls(&self) -> u32 {
        self.state.borrow().counters.unmaps
    }

    /// Fences created so far.
    pub fn created_fences(&self) -> u32 {
        self.state.borrow().counters.fences_created
    }

    /// Queue submissions so far.
    pub fn submit_calls(&self) -> u32 {
        self.state.borrow().counters.submits
    }

    /// Descriptor pools created so far.
    pub fn created_descriptor_pools(&self) -> u32 {
        self.state.borrow().counters.pools_created
    }

    /// Descriptor pool resets so far.
    pub fn descriptor_pool_resets(&self) -> u32 {
        self.state.borrow().counters.pools_reset
    }

    /// Descriptor pools destroyed so far.
    pub fn destroyed_descriptor_pools(&self) -> u32 {
        self.state.borrow().counters.pools_destroyed
    }

    /// Pipelines created so far.
    pub fn created_pipelines(&self) -> u32 {
        self.state.borrow().counters.pipelines_created
    }

    /// Pipelines destroyed so far.
    pub fn destroyed_pipelines(&self) -> u32 {
        self.state.borrow().counters.pipelines_destroyed
    }

    /// Draw commands recorded so far.
    pub fn draw_calls(&self) -> u32 {
        self.state.borrow().counters.draws
    }

    /// Buffer-to-buffer copies recorded so far.
    pub fn buffer_copies(&self) -> u32 {
        self.state.borrow().counters.buffer_copies
    }

    /// Buffer-to-image copies recorded so far.
    pub fn image_copies(&self) -> u32 {
        self.state.borrow().counters.image_copies
    }

    /// Raw memory allocations still live.
    pub fn live_memory_count(&self) -> usize {
        self.state.borrow().memory.len()
    }

    /// Times a native cache blob was imported.
    pub fn native_cache_imports(&self) -> u32 {
        self.state.borrow().counters.native_cache_imports
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceDriver for MockDriver {
    fn memory_kinds(&self) -> Vec<MemoryKindInfo> {
        self.kinds.clone()
    }

    fn limits(&self) -> DriverLimits {
        self.limits
    }

    fn allocate_memory(&self, kind_index: u32, size: u64) -> Result<MemoryHandle, DriverError> {
        assert!((kind_index as usize) < self.kinds.len(), "bad memory kind");
        let mut state = self.state.borrow_mut();
        let handle = state.mint();
        state
            .memory
            .insert(handle, vec![0u8; size as usize].into_boxed_slice());
        Ok(MemoryHandle(handle))
    }

    fn free_memory(&self, memory: MemoryHandle) {
        let mut state = self.state.borrow_mut();
        assert!(state.memory.remove(&memory.0).is_some(), "double free");
    }

    fn map_memory(&self, memory: MemoryHandle) -> Result<NonNull<u8>, DriverError> {
        let mut state = self.state.borrow_mut();
        state.counters.maps += 1;
        let backing = state.memory.get_mut(&memory.0).expect("unknown memory");
        // The boxed buffer's address is stable for the allocation's life.
        Ok(NonNull::new(backing.as_mut_ptr()).expect("null backing"))
    }

    fn unmap_memory(&self, _memory: MemoryHandle) {
        self.state.borrow_mut().counters.unmaps += 1;
    }

    fn create_buffer(&self, desc: &BufferDescriptor) -> Result<BufferHandle, DriverError> {
        let mut state = self.state.borrow_mut();
        state.counters.buffers_created += 1;
        let handle = state.mint();
        state.buffers.insert(
            handle,
            BufferInfo {
                size: desc.size,
                bound: None,
            },
        );
        Ok(BufferHandle(handle))
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        let mut state = self.state.borrow_mut();
        state.counters.buffers_destroyed += 1;
        assert!(
            state.buffers.remove(&buffer.0).is_some(),
            "double buffer destroy"
        );
    }

    fn buffer_memory_requirements(&self, buffer: BufferHandle) -> MemoryRequirements {
        let state = self.state.borrow();
        let info = state.buffers.get(&buffer.0).expect("unknown buffer");
        MemoryRequirements {
            size: info.size,
            alignment: 256,
            kind_mask: (1 << self.kinds.len()) - 1,
        }
    }

    fn bind_buffer_memory(&self, buffer: BufferHandle, memory: MemoryHandle, offset: u64) {
        let mut state = self.state.borrow_mut();
        let info = state.buffers.get_mut(&buffer.0).expect("unknown buffer");
        assert!(info.bound.is_none(), "buffer bound twice");
        info.bound = Some((memory.0, offset));
    }

    fn create_image(&self, desc: &ImageDescriptor) -> Result<ImageHandle, DriverError> {
        let mut state = self.state.borrow_mut();
        state.counters.images_created += 1;
        let handle = state.mint();
        let size =
            u64::from(desc.width) * u64::from(desc.height) * u64::from(desc.format.bytes_per_pixel());
        state.images.insert(handle, size);
        Ok(ImageHandle(handle))
    }

    fn destroy_image(&self, image: ImageHandle) {
        let mut state = self.state.borrow_mut();
        state.counters.images_destroyed += 1;
        assert!(
            state.images.remove(&image.0).is_some(),
            "double image destroy"
        );
    }

    fn image_memory_requirements(&self, image: ImageHandle) -> MemoryRequirements {
        let state = self.state.borrow();
        let size = *state.images.get(&image.0).expect("unknown image");
        MemoryRequirements {
            size,
            alignment: 1024,
            kind_mask: (1 << self.kinds.len()) - 1,
        }
    }

    fn bind_image_memory(&self, _image: ImageHandle, _memory: MemoryHandle, _offset: u64) {}

    fn create_image_view(
        &self,
        image: ImageHandle,
        _format: TextureFormat,
    ) -> Result<ImageViewHandle, DriverError> {
        let mut state = self.state.borrow_mut();
        assert!(state.images.contains_key(&image.0), "view of unknown image");
        state.counters.views_created += 1;
        let handle = state.mint();
        Ok(ImageViewHandle(handle))
    }

    fn destroy_image_view(&self, _view: ImageViewHandle) {
        self.state.borrow_mut().counters.views_destroyed += 1;
    }

    fn create_command_buffer(&self) -> CommandBufferHandle {
        CommandBufferHandle(self.state.borrow_mut().mint())
    }

    fn begin_command_buffer(&self, _cb: CommandBufferHandle) {}

    fn end_command_buffer(&self, _cb: CommandBufferHandle) {}

    fn cmd_copy_buffer(
        &self,
        _cb: CommandBufferHandle,
        src: BufferHandle,
        src_offset: u64,
        dst: BufferHandle,
        dst_offset: u64,
        size: u64,
    ) {
        let mut state = self.state.borrow_mut();
        state.counters.buffer_copies += 1;
        // Execute the copy eagerly so tests can check data flow.
        let src_bound = state.buffers.get(&src.0).and_then(|b| b.bound);
        let dst_bound = state.buffers.get(&dst.0).and_then(|b| b.bound);
        if let (Some((src_mem, src_base)), Some((dst_mem, dst_base))) = (src_bound, dst_bound) {
            let from = (src_base + src_offset) as usize;
            let to = (dst_base + dst_offset) as usize;
            let bytes: Vec<u8> = state.memory[&src_mem][from..from + size as usize].to_vec();
            if let Some(dst_backing) = state.memory.get_mut(&dst_mem) {
                dst_backing[to..to + size as usize].copy_from_slice(&bytes);
            }
        }
    }

    fn cmd_copy_buffer_to_image(
        &self,
        _cb: CommandBufferHandle,
        _src: BufferHandle,
        _src_offset: u64,
        _dst: ImageHandle,
        _width: u32,
        _height: u32,
        _mip_level: u32,
    ) {
        self.state.borrow_mut().counters.image_copies += 1;
    }

    fn cmd_begin_render_pass(&self, _cb: CommandBufferHandle, _target: &RenderTargetInfo) {}

    fn cmd_end_render_pass(&self, _cb: CommandBufferHandle) {}

    fn cmd_set_viewport(&self, _cb: CommandBufferHandle, _viewport: &Viewport) {}

    fn cmd_set_scissor(&self, _cb: CommandBufferHandle, _x: i32, _y: i32, _w: u32, _h: u32) {}

    fn cmd_set_stencil_reference(&self, _cb: CommandBufferHandle, _reference: u32) {}

    fn cmd_bind_pipeline(&self, _cb: CommandBufferHandle, _pipeline: PipelineHandle) {}

    fn cmd_bind_descriptor_set(
        &self,
        _cb: CommandBufferHandle,
        _layout: PipelineLayoutHandle,
        _set: DescriptorSetHandle,
    ) {
    }

    fn cmd_bind_vertex_buffer(
        &self,
        _cb: CommandBufferHandle,
        _slot: u32,
        _buffer: BufferHandle,
        _offset: u64,
    ) {
    }

    fn cmd_bind_index_buffer(
        &self,
        _cb: CommandBufferHandle,
        _buffer: BufferHandle,
        _offset: u64,
        _format: IndexFormat,
    ) {
    }

    fn cmd_draw(&self, _cb: CommandBufferHandle, _vertex_count: u32, _first_vertex: u32) {
        self.state.borrow_mut().counters.draws += 1;
    }

    fn cmd_draw_indexed(
        &self,
        _cb: CommandBufferHandle,
        _index_count: u32,
        _first_index: u32,
        _base_vertex: i32,
    ) {
        self.state.borrow_mut().counters.draws += 1;
    }

    fn create_fence(&self) -> FenceHandle {
        let mut state = self.state.borrow_mut();
        state.counters.fences_created += 1;
        FenceHandle(state.mint())
    }

    fn reset_fence(&self, fence: FenceHandle) {
        self.state.borrow_mut().signaled.remove(&fence.0);
    }

    fn fence_status(&self, fence: FenceHandle) -> bool {
        self.state.borrow().signaled.contains(&fence.0)
    }

    fn destroy_fence(&self, _fence: FenceHandle) {
        self.state.borrow_mut().counters.fences_destroyed += 1;
    }

    fn submit(&self, _cb: CommandBufferHandle, fence: FenceHandle) {
        let mut state = self.state.borrow_mut();
        state.counters.submits += 1;
        if self.auto_signal.get() {
            state.signaled.insert(fence.0);
        } else {
            state.pending_fences.push_back(fence.0);
        }
    }

    fn create_descriptor_pool(
        &self,
        _limits: &DescriptorPoolLimits,
    ) -> Result<DescriptorPoolHandle, DriverError> {
        let mut state = self.state.borrow_mut();
        state.counters.pools_created += 1;
        Ok(DescriptorPoolHandle(state.mint()))
    }

    fn reset_descriptor_pool(&self, _pool: DescriptorPoolHandle) {
        self.state.borrow_mut().counters.pools_reset += 1;
    }

    fn destroy_descriptor_pool(&self, _pool: DescriptorPoolHandle) {
        self.state.borrow_mut().counters.pools_destroyed += 1;
    }

    fn allocate_descriptor_set(
        &self,
        _pool: DescriptorPoolHandle,
        _layout: DescriptorSetLayoutHandle,
    ) -> Result<DescriptorSetHandle, DriverError> {
        Ok(DescriptorSetHandle(self.state.borrow_mut().mint()))
    }

    fn update_descriptor_set(&self, _set: DescriptorSetHandle, _writes: &[DescriptorWrite]) {}

    fn create_descriptor_set_layout(
        &self,
        _bindings: &[DescriptorSetLayoutBinding],
    ) -> Result<DescriptorSetLayoutHandle, DriverError> {
        Ok(DescriptorSetLayoutHandle(self.state.borrow_mut().mint()))
    }

    fn destroy_descriptor_set_layout(&self, _layout: DescriptorSetLayoutHandle) {}

    fn create_pipeline_layout(
        &self,
        _set_layout: DescriptorSetLayoutHandle,
    ) -> Result<PipelineLayoutHandle, DriverError> {
        Ok(PipelineLayoutHandle(self.state.borrow_mut().mint()))
    }

    fn destroy_pipeline_layout(&self, _layout: PipelineLayoutHandle) {}

    fn create_shader_module(&self, _bytecode: &[u8]) -> Result<ShaderModuleHandle, DriverError> {
        Ok(ShaderModuleHandle(self.state.borrow_mut().mint()))
    }

    fn destroy_shader_module(&self, _module: ShaderModuleHandle) {}

    fn create_pipeline(
        &self,
        _desc: &PipelineDescriptor<'_>,
    ) -> Result<PipelineHandle, DriverError> {
        let mut state = self.state.borrow_mut();
        state.counters.pipelines_created += 1;
        Ok(PipelineHandle(state.mint()))
    }

    fn destroy_pipeline(&self, _pipeline: PipelineHandle) {
        self.state.borrow_mut().counters.pipelines_destroyed += 1;
    }

    fn native_pipeline_cache_data(&self) -> Vec<u8> {
        self.state.borrow().native_cache.clone()
    }

    fn import_native_pipeline_cache(&self, data: &[u8]) {
        let mut state = self.state.borrow_mut();
        state.counters.native_cache_imports += 1;
        state.native_cache = data.to_vec();
    }
}

use pyxis_core::error::ShaderError;
use pyxis_core::shader::{
    CompiledShader, SamplerReflection, ShaderCompiler, ShaderStage, ShaderVariableType,
    StageReflection, UniformBlockReflection, UniformMemberReflection,
};

/// Deterministic stand-in for a shader compiler.
///
/// The vertex stage reflects one 64-byte block (`mvp` at binding 0), the
/// fragment stage a 16-byte block (`tint` at binding 1) plus a sampler
/// (`albedo` at binding 2, texture slot 0). Bytecode is the stage tag
/// followed by the source text.
#[derive(Debug)]
pub struct MockCompiler {
    compile_calls: Cell<u32>,
    reflect_calls: Cell<u32>,
}

impl MockCompiler {
    /// A fresh compiler with zeroed call counters.
    pub fn new() -> Self {
        Self {
            compile_calls: Cell::new(0),
            reflect_calls: Cell::new(0),
        }
    }

    /// Full compilations performed.
    pub fn compile_calls(&self) -> u32 {
        self.compile_calls.get()
    }

    /// Reflection-only passes performed.
    pub fn reflect_calls(&self) -> u32 {
        self.reflect_calls.get()
    }

    fn reflection_for(stage: ShaderStage) -> StageReflection {
        match stage {
            ShaderStage::Vertex => StageReflection {
                blocks: vec![UniformBlockReflection {
                    binding: 0,
                    stage,
                    size: 64,
                    members: vec![UniformMemberReflection {
                        name: "mvp".into(),
                        ty: ShaderVariableType::FloatMat4,
                        offset: 0,
                        array_size: 1,
                    }],
                }],
                samplers: Vec::new(),
            },
            ShaderStage::Fragment => StageReflection {
                blocks: vec![UniformBlockReflection {
                    binding: 1,
                    stage,
                    size: 16,
                    members: vec![UniformMemberReflection {
                        name: "tint".into(),
                        ty: ShaderVariableType::FloatVec4,
                        offset: 0,
                        array_size: 1,
                    }],
                }],
                samplers: vec![SamplerReflection {
                    name: "albedo".into(),
                    binding: 2,
                    stage,
                    texture_slot: 0,
                }],
            },
        }
    }
}

impl Default for MockCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderCompiler for MockCompiler {
    fn compile(&self, stage: ShaderStage, source: &str) -> Result<CompiledShader, ShaderError> {
        self.compile_calls.set(self.compile_calls.get() + 1);
        let mut bytecode = vec![stage as u8];
        bytecode.extend_from_slice(source.as_bytes());
        Ok(CompiledShader {
            bytecode,
            reflection: Self::reflection_for(stage),
        })
    }

    fn reflect(&self, stage: ShaderStage, _source: &str) -> Result<StageReflection, ShaderError> {
        self.reflect_calls.set(self.reflect_calls.get() + 1);
        Ok(Self::reflection_for(stage))
    }
}
