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

//! The render context: resource creation, state tracking, draw recording
//! and frame submission.
//!
//! The context owns every resource it hands out an id for and tracks the
//! fixed-function state between draws. `pre_draw` folds that state into a
//! canonical pipeline record, uploads dirty uniforms, writes a fresh
//! descriptor set and binds everything; `flush` submits the recorded
//! commands under the next fence value. All destruction is deferred until
//! the fence of the last submission that could have touched the resource.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::rc::Rc;

use pyxis_core::driver::{DescriptorResource, DescriptorWrite, DeviceDriver, PipelineDescriptor};
use pyxis_core::error::ContextError;
use pyxis_core::handle::CommandBufferHandle;
use pyxis_core::pipeline_key::PipelineStateRecord;
use pyxis_core::settings::ContextSettings;
use pyxis_core::shader::ShaderCompiler;
use pyxis_core::state::{
    BlendState, ColorWriteMask, CullMode, DepthState, FrontFace, IndexFormat, PrimitiveTopology,
    RenderTargetInfo, ScissorState, StencilState, TextureFormat, VertexLayoutDescription, Viewport,
};

use crate::buffer::{BufferKind, GpuBuffer};
use crate::descriptor::DescriptorAllocator;
use crate::fence::{FenceTimeline, FenceValue, SubmissionRing};
use crate::memory::DeviceAllocator;
use crate::pipeline_cache::{load_cache, save_cache, PipelineCache, ShaderBytecodeCache};
use crate::program::{ShaderProgram, ShaderProgramDesc};
use crate::scheduler::ReleaseQueue;
use crate::scope::SharedServices;
use crate::texture::GpuTexture;
use crate::upload::UploadArena;

/// Vertex buffer binding slots the context tracks.
pub const MAX_VERTEX_BUFFER_SLOTS: usize = 8;
/// Texture binding slots the context tracks.
pub const MAX_TEXTURE_SLOTS: usize = 16;

/// Context-minted buffer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(u64);

/// Context-minted texture id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(u64);

/// Context-minted shader program id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderProgramId(u64);

/// Context-minted vertex layout id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexLayoutId(u64);

/// How a dynamic buffer write synchronizes with in-flight reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferWriteMode {
    /// Orphan the current contents and write into a fresh ring slice.
    Discard,
    /// Overwrite in place, waiting out any in-flight reader first.
    Synchronized,
}

#[derive(Debug, Clone, Copy)]
struct VertexBufferBinding {
    buffer: BufferId,
    offset: u64,
}

#[derive(Debug, Clone, Copy)]
struct IndexBufferBinding {
    buffer: BufferId,
    offset: u64,
    format: IndexFormat,
}

#[derive(Debug)]
struct VertexLayout {
    desc: VertexLayoutDescription,
    identity: u64,
}

/// GPU resource lifecycle and command submission front end.
#[derive(Debug)]
pub struct RenderContext {
    shared: SharedServices,
    compiler: Rc<dyn ShaderCompiler>,
    submissions: SubmissionRing,
    upload: UploadArena,
    descriptors: DescriptorAllocator,
    pipelines: PipelineCache,
    bytecode_cache: ShaderBytecodeCache,

    next_id: u64,
    buffers: HashMap<u64, GpuBuffer>,
    textures: HashMap<u64, GpuTexture>,
    programs: HashMap<u64, ShaderProgram>,
    layouts: HashMap<u64, VertexLayout>,

    command_buffer: Option<CommandBufferHandle>,
    pass_active: bool,
    render_target: Option<RenderTargetInfo>,

    viewport: Viewport,
    scissor: ScissorState,
    blend: BlendState,
    depth: DepthState,
    stencil: StencilState,
    color_write_mask: ColorWriteMask,
    cull_mode: CullMode,
    front_face: FrontFace,
    topology: PrimitiveTopology,

    bound_program: Option<ShaderProgramId>,
    bound_layout: Option<VertexLayoutId>,
    vertex_bindings: [Option<VertexBufferBinding>; MAX_VERTEX_BUFFER_SLOTS],
    index_binding: Option<IndexBufferBinding>,
    texture_bindings: [Option<TextureId>; MAX_TEXTURE_SLOTS],
}

impl RenderContext {
    /// Builds a context over a driver and a shader compiler.
    pub fn new(
        driver: Rc<dyn DeviceDriver>,
        compiler: Rc<dyn ShaderCompiler>,
        settings: ContextSettings,
    ) -> Result<Self, ContextError> {
        let allocator = Rc::new(RefCell::new(DeviceAllocator::new(&*driver, &settings)));
        let shared = SharedServices {
            driver,
            allocator,
            scheduler: Rc::new(ReleaseQueue::new()),
            timeline: Rc::new(FenceTimeline::new()),
        };
        let upload = UploadArena::new(
            &*shared.driver,
            &mut shared.allocator.borrow_mut(),
            settings.upload_arena_size,
        )?;
        Ok(Self {
            shared,
            compiler,
            submissions: SubmissionRing::new(),
            upload,
            descriptors: DescriptorAllocator::new(settings.descriptor_pool_limits),
            pipelines: PipelineCache::new(settings.pipeline_cache_capacity),
            bytecode_cache: ShaderBytecodeCache::new(),
            next_id: 0,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            programs: HashMap::new(),
            layouts: HashMap::new(),
            command_buffer: None,
            pass_active: false,
            render_target: None,
            viewport: Viewport::default(),
            scissor: ScissorState::default(),
            blend: BlendState::default(),
            depth: DepthState::default(),
            stencil: StencilState::default(),
            color_write_mask: ColorWriteMask::default(),
            cull_mode: CullMode::default(),
            front_face: FrontFace::default(),
            topology: PrimitiveTopology::default(),
            bound_program: None,
            bound_layout: None,
            vertex_bindings: [None; MAX_VERTEX_BUFFER_SLOTS],
            index_binding: None,
            texture_bindings: [None; MAX_TEXTURE_SLOTS],
        })
    }

    fn mint_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    // --- fence queries ---

    /// The fence value the next submission will be tagged with.
    pub fn next_fence_value(&self) -> FenceValue {
        self.shared.timeline.next_value()
    }

    /// Highest fence value known to have completed.
    pub fn last_completed_fence_value(&self) -> FenceValue {
        self.shared.timeline.last_completed()
    }

    /// Checks completion, polling in-flight submissions when the cached
    /// completion point is not enough.
    pub fn is_fence_completed(&mut self, value: FenceValue) -> bool {
        if self.shared.timeline.is_known_completed(value) {
            return true;
        }
        let shared = self.shared.clone();
        self.submissions.poll(&*shared.driver, &shared.timeline);
        shared.timeline.is_known_completed(value)
    }

    /// Blocks until `value` completes.
    ///
    /// The spin drains the deferred destruction queue on every iteration,
    /// so a wait can never starve cleanups the waiter itself depends on.
    pub fn wait_for_fence(&mut self, value: FenceValue) {
        while !self.is_fence_completed(value) {
            if value >= self.shared.timeline.next_value() {
                debug_assert!(false, "fence value {} was never submitted", value.0);
                log::warn!(
                    "waiting on fence value {} that was never submitted",
                    value.0
                );
                return;
            }
            std::thread::yield_now();
            self.shared
                .scheduler
                .perform(self.shared.timeline.last_completed());
        }
        self.shared
            .scheduler
            .perform(self.shared.timeline.last_completed());
    }

    // --- resources ---

    /// Creates a buffer. Dynamic buffers are rewritable every frame;
    /// static buffers are device-local and filled through staged copies.
    pub fn create_buffer(
        &mut self,
        kind: BufferKind,
        size: u64,
        dynamic: bool,
    ) -> Result<BufferId, ContextError> {
        let id = self.mint_id();
        let buffer = GpuBuffer::new(self.shared.clone(), kind, size, dynamic)?;
        self.buffers.insert(id, buffer);
        Ok(BufferId(id))
    }

    /// Frees a buffer; its backing is destroyed once the GPU is done with
    /// it. Bindings referencing the buffer are cleared.
    pub fn free_buffer(&mut self, id: BufferId) {
        if self.buffers.remove(&id.0).is_none() {
            log::warn!("freeing unknown buffer id {}", id.0);
            return;
        }
        for binding in self.vertex_bindings.iter_mut() {
            if binding.map(|b| b.buffer) == Some(id) {
                *binding = None;
            }
        }
        if self.index_binding.map(|b| b.buffer) == Some(id) {
            self.index_binding = None;
        }
    }

    /// Writes `data` into a buffer.
    ///
    /// Dynamic buffers honor `mode`; static buffers always go through a
    /// staged copy recorded on the current command buffer.
    pub fn set_buffer_data(
        &mut self,
        id: BufferId,
        offset: u64,
        data: &[u8],
        mode: BufferWriteMode,
    ) -> Result<(), ContextError> {
        let shared = self.shared.clone();
        let (dynamic, reader) = {
            let buffer = self
                .buffers
                .get(&id.0)
                .ok_or(ContextError::UnknownResource { kind: "buffer" })?;
            (buffer.is_dynamic(), buffer.reader_fence())
        };
        if dynamic {
            if mode == BufferWriteMode::Synchronized && !self.is_fence_completed(reader) {
                // The active slice may still be read by an in-flight
                // submission; submit pending work and wait it out.
                self.flush();
                self.wait_for_fence(reader);
            }
            let buffer = self
                .buffers
                .get_mut(&id.0)
                .ok_or(ContextError::UnknownResource { kind: "buffer" })?;
            match mode {
                BufferWriteMode::Discard => buffer.write_discard(&shared.scope(), offset, data),
                BufferWriteMode::Synchronized => {
                    buffer.write_in_place(&shared.scope(), offset, data)
                }
            }
        } else {
            let staging = self.upload.allocate(&shared.scope(), data.len() as u64, 4)?;
            staging.write(data);
            self.end_render_pass_if_active();
            let cb = self.ensure_command_buffer();
            let buffer = self
                .buffers
                .get(&id.0)
                .ok_or(ContextError::UnknownResource { kind: "buffer" })?;
            shared.driver.cmd_copy_buffer(
                cb,
                staging.buffer(),
                staging.offset(),
                buffer.buffer(),
                offset,
                data.len() as u64,
            );
            Ok(())
        }
    }

    /// Creates an uninitialized 2D texture.
    pub fn create_texture(
        &mut self,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> Result<TextureId, ContextError> {
        let id = self.mint_id();
        let texture = GpuTexture::new(self.shared.clone(), format, width, height)?;
        self.textures.insert(id, texture);
        Ok(TextureId(id))
    }

    /// Frees a texture; destruction waits for the GPU. Bindings referencing
    /// the texture are cleared.
    pub fn free_texture(&mut self, id: TextureId) {
        if self.textures.remove(&id.0).is_none() {
            log::warn!("freeing unknown texture id {}", id.0);
            return;
        }
        for binding in self.texture_bindings.iter_mut() {
            if *binding == Some(id) {
                *binding = None;
            }
        }
    }

    /// Uploads full-resolution pixel data through the staging arena.
    pub fn write_texture(&mut self, id: TextureId, data: &[u8]) -> Result<(), ContextError> {
        let shared = self.shared.clone();
        let (image, width, height, expected) = {
            let texture = self
                .textures
                .get(&id.0)
                .ok_or(ContextError::UnknownResource { kind: "texture" })?;
            (
                texture.image(),
                texture.width(),
                texture.height(),
                texture.upload_size(),
            )
        };
        debug_assert_eq!(data.len() as u64, expected, "texture upload size mismatch");
        let staging = self.upload.allocate(&shared.scope(), data.len() as u64, 4)?;
        staging.write(data);
        self.end_render_pass_if_active();
        let cb = self.ensure_command_buffer();
        shared
            .driver
            .cmd_copy_buffer_to_image(cb, staging.buffer(), staging.offset(), image, width, height, 0);
        Ok(())
    }

    /// Compiles and links a shader program, reusing cached bytecode when
    /// the same source was seen before.
    pub fn create_shader_program(
        &mut self,
        desc: &ShaderProgramDesc<'_>,
    ) -> Result<ShaderProgramId, ContextError> {
        let id = self.mint_id();
        let program = ShaderProgram::new(
            self.shared.clone(),
            id,
            &*self.compiler,
            &mut self.bytecode_cache,
            desc,
        )?;
        self.programs.insert(id, program);
        Ok(ShaderProgramId(id))
    }

    /// Frees a shader program. Cached pipelines referencing it stay in the
    /// cache but can never be hit again: program identities are never
    /// reused.
    pub fn free_shader_program(&mut self, id: ShaderProgramId) {
        if self.programs.remove(&id.0).is_none() {
            log::warn!("freeing unknown shader program id {}", id.0);
            return;
        }
        if self.bound_program == Some(id) {
            self.bound_program = None;
        }
    }

    /// Registers a vertex fetch layout.
    pub fn create_vertex_layout(&mut self, desc: VertexLayoutDescription) -> VertexLayoutId {
        let id = self.mint_id();
        self.layouts.insert(id, VertexLayout { desc, identity: id });
        VertexLayoutId(id)
    }

    /// Frees a vertex layout.
    pub fn free_vertex_layout(&mut self, id: VertexLayoutId) {
        if self.layouts.remove(&id.0).is_none() {
            log::warn!("freeing unknown vertex layout id {}", id.0);
            return;
        }
        if self.bound_layout == Some(id) {
            self.bound_layout = None;
        }
    }

    /// Writes a named uniform's bytes into the program's staging copy.
    /// Unknown names are logged and ignored.
    pub fn set_uniform(
        &mut self,
        program: ShaderProgramId,
        name: &str,
        data: &[u8],
    ) -> Result<(), ContextError> {
        let program = self
            .programs
            .get_mut(&program.0)
            .ok_or(ContextError::UnknownResource {
                kind: "shader program",
            })?;
        match program.uniform_index(name) {
            Some(index) => program.set_uniform_raw(index, data),
            None => log::warn!("uniform {name:?} not found in program"),
        }
        Ok(())
    }

    // --- state tracking ---

    /// Sets the render target. Changing targets ends the active render
    /// pass; the next draw begins a new one.
    pub fn set_render_target(&mut self, target: RenderTargetInfo) {
        if self.render_target != Some(target) {
            self.end_render_pass_if_active();
        }
        self.render_target = Some(target);
    }

    /// Sets the viewport transform.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Sets the scissor rectangle state.
    pub fn set_scissor_state(&mut self, scissor: ScissorState) {
        self.scissor = scissor;
    }

    /// Sets the blend configuration.
    pub fn set_blend_state(&mut self, blend: BlendState) {
        self.blend = blend;
    }

    /// Sets the depth test configuration.
    pub fn set_depth_state(&mut self, depth: DepthState) {
        self.depth = depth;
    }

    /// Sets the stencil configuration. The reference value is dynamic and
    /// never forces a new pipeline.
    pub fn set_stencil_state(&mut self, stencil: StencilState) {
        self.stencil = stencil;
    }

    /// Sets the writable color channels.
    pub fn set_color_write_mask(&mut self, mask: ColorWriteMask) {
        self.color_write_mask = mask;
    }

    /// Sets the face culling mode.
    pub fn set_cull_mode(&mut self, cull_mode: CullMode) {
        self.cull_mode = cull_mode;
    }

    /// Sets the front-face winding.
    pub fn set_front_face(&mut self, front_face: FrontFace) {
        self.front_face = front_face;
    }

    /// Sets the primitive assembly mode.
    pub fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        self.topology = topology;
    }

    /// Binds a shader program for subsequent draws.
    pub fn set_shader_program(&mut self, program: Option<ShaderProgramId>) {
        self.bound_program = program;
    }

    /// Binds a vertex fetch layout for subsequent draws.
    pub fn set_vertex_layout(&mut self, layout: Option<VertexLayoutId>) {
        self.bound_layout = layout;
    }

    /// Binds a vertex buffer to a slot.
    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: Option<BufferId>, offset: u64) {
        let Some(binding) = self.vertex_bindings.get_mut(slot as usize) else {
            log::warn!("vertex buffer slot {slot} out of range");
            return;
        };
        *binding = buffer.map(|buffer| VertexBufferBinding { buffer, offset });
    }

    /// Binds the index buffer.
    pub fn set_index_buffer(&mut self, buffer: Option<BufferId>, offset: u64, format: IndexFormat) {
        self.index_binding = buffer.map(|buffer| IndexBufferBinding {
            buffer,
            offset,
            format,
        });
    }

    /// Binds a texture to a sampler slot.
    pub fn set_texture(&mut self, slot: u32, texture: Option<TextureId>) {
        let Some(binding) = self.texture_bindings.get_mut(slot as usize) else {
            log::warn!("texture slot {slot} out of range");
            return;
        };
        *binding = texture;
    }

    // --- drawing ---

    /// Records a non-indexed draw with the currently bound state.
    pub fn draw(&mut self, vertex_count: u32, first_vertex: u32) -> Result<(), ContextError> {
        let cb = self.pre_draw()?;
        self.shared.driver.cmd_draw(cb, vertex_count, first_vertex);
        Ok(())
    }

    /// Records an indexed draw with the currently bound state.
    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        first_index: u32,
        base_vertex: i32,
    ) -> Result<(), ContextError> {
        let cb = self.pre_draw()?;
        self.shared
            .driver
            .cmd_draw_indexed(cb, index_count, first_index, base_vertex);
        Ok(())
    }

    fn ensure_command_buffer(&mut self) -> CommandBufferHandle {
        if let Some(cb) = self.command_buffer {
            return cb;
        }
        let shared = self.shared.clone();
        let cb = self
            .submissions
            .acquire_command_buffer(&*shared.driver, &shared.timeline);
        self.command_buffer = Some(cb);
        cb
    }

    fn end_render_pass_if_active(&mut self) {
        if self.pass_active {
            if let Some(cb) = self.command_buffer {
                self.shared.driver.cmd_end_render_pass(cb);
            }
            self.pass_active = false;
        }
    }

    /// Resolves all bound state into recorded commands for one draw.
    fn pre_draw(&mut self) -> Result<CommandBufferHandle, ContextError> {
        let shared = self.shared.clone();
        let target = self.render_target.ok_or(ContextError::NoRenderTarget)?;
        let program_id = self.bound_program.ok_or(ContextError::NoShaderProgram)?;
        let layout_id = self.bound_layout.ok_or(ContextError::UnknownResource {
            kind: "vertex layout",
        })?;

        // Refresh the completion point so every safety decision below sees
        // the freshest view of GPU progress.
        self.submissions.poll(&*shared.driver, &shared.timeline);

        let cb = self.ensure_command_buffer();
        if !self.pass_active {
            shared.driver.cmd_begin_render_pass(cb, &target);
            self.pass_active = true;
        }

        let viewport = if self.viewport.width == 0.0 {
            Viewport {
                width: target.width as f32,
                height: target.height as f32,
                ..Viewport::default()
            }
        } else {
            self.viewport
        };
        shared.driver.cmd_set_viewport(cb, &viewport);
        if self.scissor.enable {
            shared.driver.cmd_set_scissor(
                cb,
                self.scissor.x,
                self.scissor.y,
                self.scissor.width,
                self.scissor.height,
            );
        } else {
            shared
                .driver
                .cmd_set_scissor(cb, 0, 0, target.width, target.height);
        }
        shared
            .driver
            .cmd_set_stencil_reference(cb, self.stencil.reference);

        // Everything this draw reads completes under the upcoming
        // submission's fence value.
        let reader = shared.timeline.next_value();

        let layout = self
            .layouts
            .get(&layout_id.0)
            .ok_or(ContextError::UnknownResource {
                kind: "vertex layout",
            })?;
        let program = self
            .programs
            .get_mut(&program_id.0)
            .ok_or(ContextError::UnknownResource {
                kind: "shader program",
            })?;

        let record = PipelineStateRecord::new(
            &self.blend,
            &self.depth,
            &self.stencil,
            self.color_write_mask,
            self.cull_mode,
            self.front_face,
            self.topology,
            layout.identity,
            program.identity(),
            target.color_format,
            target.depth_stencil_format,
        );
        let desc = PipelineDescriptor {
            vertex_module: program.vertex_module(),
            fragment_module: program.fragment_module(),
            layout: program.pipeline_layout(),
            blend: &self.blend,
            depth: &self.depth,
            stencil: &self.stencil,
            color_write_mask: self.color_write_mask.bits(),
            cull_mode: self.cull_mode,
            front_face: self.front_face,
            topology: self.topology,
            vertex_layout: &layout.desc,
            color_format: target.color_format,
            depth_stencil_format: target.depth_stencil_format,
        };
        let pipeline = self.pipelines.get_or_create(&shared.scope(), &record, |driver| {
            driver.create_pipeline(&desc)
        })?;
        shared.driver.cmd_bind_pipeline(cb, pipeline);

        program.update_uniform_buffers(&shared.scope(), reader)?;

        let set = self.descriptors.allocate_set(
            &*shared.driver,
            &shared.timeline,
            program.set_layout(),
            program.uniform_buffer_count(),
            program.sampler_count(),
        )?;
        let mut writes = program.uniform_descriptor_writes();
        for sampler in program.samplers() {
            let bound = self
                .texture_bindings
                .get(sampler.texture_slot as usize)
                .copied()
                .flatten()
                .ok_or(ContextError::UnknownResource { kind: "texture" })?;
            let texture = self
                .textures
                .get(&bound.0)
                .ok_or(ContextError::UnknownResource { kind: "texture" })?;
            texture.stamp_reader(reader);
            writes.push(DescriptorWrite {
                binding: sampler.binding,
                resource: DescriptorResource::CombinedImageSampler {
                    view: texture.view(),
                },
            });
        }
        shared.driver.update_descriptor_set(set, &writes);
        shared
            .driver
            .cmd_bind_descriptor_set(cb, program.pipeline_layout(), set);

        for (slot, binding) in self.vertex_bindings.iter().enumerate() {
            let Some(binding) = binding else { continue };
            let buffer = self
                .buffers
                .get(&binding.buffer.0)
                .ok_or(ContextError::UnknownResource { kind: "buffer" })?;
            buffer.stamp_reader(reader);
            shared.driver.cmd_bind_vertex_buffer(
                cb,
                slot as u32,
                buffer.buffer(),
                buffer.bind_offset() + binding.offset,
            );
        }
        if let Some(binding) = self.index_binding {
            let buffer = self
                .buffers
                .get(&binding.buffer.0)
                .ok_or(ContextError::UnknownResource { kind: "buffer" })?;
            buffer.stamp_reader(reader);
            shared.driver.cmd_bind_index_buffer(
                cb,
                buffer.buffer(),
                buffer.bind_offset() + binding.offset,
                binding.format,
            );
        }
        Ok(cb)
    }

    // --- submission ---

    /// Submits recorded commands, if any, and returns the fence value the
    /// submission was tagged with.
    pub fn flush(&mut self) -> Option<FenceValue> {
        let shared = self.shared.clone();
        self.submissions.poll(&*shared.driver, &shared.timeline);
        shared.scheduler.perform(shared.timeline.last_completed());
        self.command_buffer?;
        self.end_render_pass_if_active();
        let cb = self.command_buffer.take()?;
        shared.driver.end_command_buffer(cb);
        // The sets written for this submission stay untouched until its
        // fence completes.
        self.descriptors.discard_pool(shared.timeline.next_value());
        Some(self.submissions.submit(&*shared.driver, &shared.timeline, cb))
    }

    /// Flushes and waits for the device to finish everything submitted so
    /// far, then rewinds the staging arena.
    pub fn finish(&mut self) {
        self.flush();
        let next = self.shared.timeline.next_value();
        if next > FenceValue::INITIAL {
            self.wait_for_fence(FenceValue(next.0 - 1));
        }
        self.shared
            .scheduler
            .perform(self.shared.timeline.last_completed());
        // Every staged copy has executed by now.
        self.upload.reset();
    }

    // --- pipeline cache persistence ---

    /// Seeds the pipeline and shader caches from a persisted image.
    ///
    /// Fails closed: any malformed input is rejected wholesale, the warm
    /// start is skipped and `false` is returned.
    pub fn load_pipeline_cache(&mut self, reader: &mut dyn Read) -> bool {
        match load_cache(reader) {
            Ok(loaded) => {
                if !loaded.native.is_empty() {
                    self.shared.driver.import_native_pipeline_cache(&loaded.native);
                }
                let entries = loaded.shaders.len();
                self.bytecode_cache.merge(loaded.shaders);
                log::info!("pipeline cache loaded: {entries} shader entries");
                true
            }
            Err(err) => {
                log::warn!("ignoring persisted pipeline cache: {err}");
                false
            }
        }
    }

    /// Persists the driver's native cache blob and the shader bytecode
    /// cache.
    pub fn save_pipeline_cache(&self, writer: &mut dyn Write) -> io::Result<()> {
        let native = self.shared.driver.native_pipeline_cache_data();
        save_cache(writer, &native, &self.bytecode_cache)
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        self.finish();
        // Resource drops route their destruction through the scheduler.
        self.buffers.clear();
        self.textures.clear();
        self.programs.clear();
        self.layouts.clear();
        let driver = Rc::clone(&self.shared.driver);
        self.pipelines.destroy_all(&*driver);
        self.descriptors.destroy(&*driver);
        self.upload
            .destroy_now(&*driver, &mut self.shared.allocator.borrow_mut());
        if self.submissions.in_flight_count() == 0 {
            // The device is provably idle: run everything that was queued
            // regardless of its fence value.
            self.shared.scheduler.drain_all();
            self.submissions.destroy_pooled(&*driver);
        } else {
            log::warn!(
                "render context dropped with {} submissions in flight",
                self.submissions.in_flight_count()
            );
        }
        self.shared.allocator.borrow_mut().release_blocks(&*driver);
    }
}
