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

//! Shader programs.
//!
//! A program links a vertex and a fragment stage, derives its descriptor
//! set layout from reflection, and owns one fence-rotated uniform ring per
//! reflected block. Uniform writes land in CPU staging and mark the
//! owning stage dirty; `update_uniform_buffers` flushes dirty blocks into
//! fresh ring slices right before a draw.

use std::rc::Rc;

use pyxis_core::driver::{
    BufferUsageFlags, DescriptorKind, DescriptorResource, DescriptorSetLayoutBinding,
    DescriptorWrite,
};
use pyxis_core::error::ContextError;
use pyxis_core::handle::{DescriptorSetLayoutHandle, PipelineLayoutHandle, ShaderModuleHandle};
use pyxis_core::shader::{
    SamplerReflection, ShaderCompiler, ShaderStage, ShaderStageFlags, ShaderVariableType,
    StageReflection,
};

use crate::fence::FenceValue;
use crate::memory::align_up;
use crate::pipeline_cache::ShaderBytecodeCache;
use crate::ring::RingBuffer;
use crate::scope::{DeviceScope, SharedServices};

/// Source text for both stages of a program.
#[derive(Debug, Clone, Copy)]
pub struct ShaderProgramDesc<'a> {
    /// Vertex stage source.
    pub vertex_source: &'a str,
    /// Fragment stage source.
    pub fragment_source: &'a str,
}

#[derive(Debug)]
struct ProgramBlock {
    binding: u32,
    stage: ShaderStage,
    size: u32,
    ring: RingBuffer,
    staging: Vec<u8>,
}

#[derive(Debug)]
struct ProgramUniform {
    name: String,
    ty: ShaderVariableType,
    array_size: u32,
    block: usize,
    offset: u32,
}

/// A linked shader program and its uniform state.
#[derive(Debug)]
pub struct ShaderProgram {
    shared: SharedServices,
    identity: u64,
    vertex_module: ShaderModuleHandle,
    fragment_module: ShaderModuleHandle,
    set_layout: DescriptorSetLayoutHandle,
    pipeline_layout: PipelineLayoutHandle,
    blocks: Vec<ProgramBlock>,
    uniforms: Vec<ProgramUniform>,
    samplers: Vec<SamplerReflection>,
    dirty_stages: ShaderStageFlags,
}

fn stage_artifacts(
    compiler: &dyn ShaderCompiler,
    cache: &mut ShaderBytecodeCache,
    stage: ShaderStage,
    source: &str,
) -> Result<(Vec<u8>, StageReflection), ContextError> {
    let key = ShaderBytecodeCache::source_key(stage, source);
    if let Some(bytecode) = cache.get(key) {
        // Bytecode hit: skip code generation, reflect the interface only.
        let reflection = compiler.reflect(stage, source)?;
        return Ok((bytecode.to_vec(), reflection));
    }
    let compiled = compiler.compile(stage, source)?;
    cache.insert(key, compiled.bytecode.clone());
    Ok((compiled.bytecode, compiled.reflection))
}

impl ShaderProgram {
    /// Compiles (or recalls) both stages and links the program.
    ///
    /// `identity` is a context-minted monotone value standing in for the
    /// program inside pipeline identity records; it is never reused, so a
    /// stale cached pipeline can never alias a new program.
    pub fn new(
        shared: SharedServices,
        identity: u64,
        compiler: &dyn ShaderCompiler,
        bytecode_cache: &mut ShaderBytecodeCache,
        desc: &ShaderProgramDesc<'_>,
    ) -> Result<Self, ContextError> {
        let (vertex_bytecode, vertex_reflection) = stage_artifacts(
            compiler,
            bytecode_cache,
            ShaderStage::Vertex,
            desc.vertex_source,
        )?;
        let (fragment_bytecode, fragment_reflection) = stage_artifacts(
            compiler,
            bytecode_cache,
            ShaderStage::Fragment,
            desc.fragment_source,
        )?;

        let driver = &*shared.driver;
        let vertex_module = driver.create_shader_module(&vertex_bytecode)?;
        let fragment_module = driver.create_shader_module(&fragment_bytecode)?;

        let block_reflections: Vec<_> = vertex_reflection
            .blocks
            .into_iter()
            .chain(fragment_reflection.blocks)
            .collect();
        let samplers: Vec<_> = vertex_reflection
            .samplers
            .into_iter()
            .chain(fragment_reflection.samplers)
            .collect();

        let mut layout_bindings = Vec::with_capacity(block_reflections.len() + samplers.len());
        for block in &block_reflections {
            layout_bindings.push(DescriptorSetLayoutBinding {
                binding: block.binding,
                kind: DescriptorKind::UniformBuffer,
                stage_flags: ShaderStageFlags::from_stage(block.stage),
            });
        }
        for sampler in &samplers {
            layout_bindings.push(DescriptorSetLayoutBinding {
                binding: sampler.binding,
                kind: DescriptorKind::CombinedImageSampler,
                stage_flags: ShaderStageFlags::from_stage(sampler.stage),
            });
        }
        let set_layout = driver.create_descriptor_set_layout(&layout_bindings)?;
        let pipeline_layout = driver.create_pipeline_layout(set_layout)?;

        let uniform_alignment = driver.limits().min_uniform_offset_alignment;
        let mut blocks = Vec::with_capacity(block_reflections.len());
        let mut uniforms = Vec::new();
        for reflection in block_reflections {
            let slice_size = align_up(u64::from(reflection.size), uniform_alignment);
            let ring = RingBuffer::new(
                driver,
                &mut shared.allocator.borrow_mut(),
                BufferUsageFlags::UNIFORM,
                slice_size,
            )?;
            let block_index = blocks.len();
            for member in &reflection.members {
                uniforms.push(ProgramUniform {
                    name: member.name.clone(),
                    ty: member.ty,
                    array_size: member.array_size,
                    block: block_index,
                    offset: member.offset,
                });
            }
            blocks.push(ProgramBlock {
                binding: reflection.binding,
                stage: reflection.stage,
                size: reflection.size,
                ring,
                staging: vec![0u8; reflection.size as usize],
            });
        }

        Ok(Self {
            shared,
            identity,
            vertex_module,
            fragment_module,
            set_layout,
            pipeline_layout,
            blocks,
            uniforms,
            samplers,
            // Every block needs its first upload.
            dirty_stages: ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT,
        })
    }

    /// Context-minted identity for pipeline records.
    #[inline]
    pub fn identity(&self) -> u64 {
        self.identity
    }

    /// The vertex stage module.
    #[inline]
    pub fn vertex_module(&self) -> ShaderModuleHandle {
        self.vertex_module
    }

    /// The fragment stage module.
    #[inline]
    pub fn fragment_module(&self) -> ShaderModuleHandle {
        self.fragment_module
    }

    /// Layout of the program's descriptor set.
    #[inline]
    pub fn set_layout(&self) -> DescriptorSetLayoutHandle {
        self.set_layout
    }

    /// Pipeline layout derived from the set layout.
    #[inline]
    pub fn pipeline_layout(&self) -> PipelineLayoutHandle {
        self.pipeline_layout
    }

    /// Uniform buffer descriptors one set for this program consumes.
    pub fn uniform_buffer_count(&self) -> u32 {
        self.blocks.len() as u32
    }

    /// Sampler descriptors one set for this program consumes.
    pub fn sampler_count(&self) -> u32 {
        self.samplers.len() as u32
    }

    /// Reflected samplers, for texture slot resolution.
    pub fn samplers(&self) -> &[SamplerReflection] {
        &self.samplers
    }

    /// Index of a named uniform, usable with
    /// [`set_uniform_raw`](Self::set_uniform_raw).
    pub fn uniform_index(&self, name: &str) -> Option<usize> {
        self.uniforms.iter().position(|u| u.name == name)
    }

    /// Data type of a uniform by index.
    pub fn uniform_type(&self, index: usize) -> Option<ShaderVariableType> {
        self.uniforms.get(index).map(|u| u.ty)
    }

    /// Writes raw bytes into a uniform's staging slot and marks its stage
    /// dirty. Oversized writes are clamped to the member's extent.
    pub fn set_uniform_raw(&mut self, index: usize, data: &[u8]) {
        let Some(uniform) = self.uniforms.get(index) else {
            log::warn!("uniform index {index} out of range");
            return;
        };
        let block = &mut self.blocks[uniform.block];
        let capacity = uniform.ty.byte_size() * uniform.array_size.max(1);
        let len = data.len().min(capacity as usize);
        let start = uniform.offset as usize;
        block.staging[start..start + len].copy_from_slice(&data[..len]);
        self.dirty_stages |= ShaderStageFlags::from_stage(block.stage);
    }

    /// Flushes dirty uniform blocks into fresh ring slices.
    ///
    /// `reader_fence` is the fence value the upcoming draw's submission
    /// completes under; it becomes the discard fence of each retired
    /// slice.
    pub fn update_uniform_buffers(
        &mut self,
        scope: &DeviceScope<'_>,
        reader_fence: FenceValue,
    ) -> Result<(), ContextError> {
        let dirty = self.dirty_stages;
        if dirty.is_empty() {
            return Ok(());
        }
        for block in &mut self.blocks {
            if !dirty.intersects(ShaderStageFlags::from_stage(block.stage)) {
                continue;
            }
            block.ring.discard_slice(scope, reader_fence)?;
            let driver = &**scope.driver;
            let mut allocator = scope.allocator.borrow_mut();
            let ptr = block.ring.map_active(driver, &mut allocator)?;
            unsafe {
                std::ptr::copy_nonoverlapping(
                    block.staging.as_ptr(),
                    ptr.as_ptr(),
                    block.staging.len(),
                );
            }
            block.ring.unmap_active(driver, &mut allocator);
        }
        self.dirty_stages = ShaderStageFlags::NONE;
        Ok(())
    }

    /// Descriptor writes covering every uniform block at its active ring
    /// slice. Sampler writes are appended by the context, which owns the
    /// texture bindings.
    pub fn uniform_descriptor_writes(&self) -> Vec<DescriptorWrite> {
        self.blocks
            .iter()
            .map(|block| DescriptorWrite {
                binding: block.binding,
                resource: DescriptorResource::UniformBuffer {
                    buffer: block.ring.buffer(),
                    offset: block.ring.active_offset(),
                    range: u64::from(block.size),
                },
            })
            .collect()
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        let scope = self.shared.scope();
        for block in std::mem::take(&mut self.blocks) {
            block.ring.release(&scope);
        }
        let driver = Rc::clone(scope.driver);
        let vertex_module = self.vertex_module;
        let fragment_module = self.fragment_module;
        let set_layout = self.set_layout;
        let pipeline_layout = self.pipeline_layout;
        scope.scheduler.schedule(scope.timeline.next_value(), move || {
            driver.destroy_pipeline_layout(pipeline_layout);
            driver.destroy_descriptor_set_layout(set_layout);
            driver.destroy_shader_module(vertex_module);
            driver.destroy_shader_module(fragment_module);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fence::FenceTimeline;
    use crate::memory::DeviceAllocator;
    use crate::mock::{MockCompiler, MockDriver};
    use crate::scheduler::ReleaseQueue;
    use pyxis_core::driver::DeviceDriver;
    use pyxis_core::settings::ContextSettings;
    use std::cell::RefCell;

    const DESC: ShaderProgramDesc<'static> = ShaderProgramDesc {
        vertex_source: "vertex source",
        fragment_source: "fragment source",
    };

    fn shared() -> SharedServices {
        let mock = Rc::new(MockDriver::new());
        let driver: Rc<dyn DeviceDriver> = mock;
        let allocator = Rc::new(RefCell::new(DeviceAllocator::new(
            &*driver,
            &ContextSettings::default(),
        )));
        SharedServices {
            driver,
            allocator,
            scheduler: Rc::new(ReleaseQueue::new()),
            timeline: Rc::new(FenceTimeline::new()),
        }
    }

    #[test]
    fn reflection_shapes_the_program() {
        let services = shared();
        let compiler = MockCompiler::new();
        let mut cache = ShaderBytecodeCache::new();
        let program =
            ShaderProgram::new(services, 1, &compiler, &mut cache, &DESC).unwrap();
        assert_eq!(program.uniform_buffer_count(), 2);
        assert_eq!(program.sampler_count(), 1);
        assert!(program.uniform_index("mvp").is_some());
        assert!(program.uniform_index("tint").is_some());
        assert!(program.uniform_index("missing").is_none());
        assert_eq!(cache.len(), 2, "both stages entered the bytecode cache");
    }

    #[test]
    fn second_program_reuses_cached_bytecode() {
        let services = shared();
        let compiler = MockCompiler::new();
        let mut cache = ShaderBytecodeCache::new();
        let _a = ShaderProgram::new(services.clone(), 1, &compiler, &mut cache, &DESC).unwrap();
        assert_eq!(compiler.compile_calls(), 2);

        let _b = ShaderProgram::new(services, 2, &compiler, &mut cache, &DESC).unwrap();
        assert_eq!(compiler.compile_calls(), 2, "code generation skipped");
        assert_eq!(compiler.reflect_calls(), 2, "interface still reflected");
    }

    #[test]
    fn uniform_writes_dirty_only_their_stage() {
        let services = shared();
        let compiler = MockCompiler::new();
        let mut cache = ShaderBytecodeCache::new();
        let mut program =
            ShaderProgram::new(services.clone(), 1, &compiler, &mut cache, &DESC).unwrap();
        // Drain the initial full upload.
        program
            .update_uniform_buffers(&services.scope(), FenceValue::ZERO)
            .unwrap();

        let before: Vec<_> = program
            .uniform_descriptor_writes()
            .iter()
            .map(|w| w.resource)
            .collect();

        let tint = program.uniform_index("tint").unwrap();
        program.set_uniform_raw(tint, &[0u8; 16]);
        program
            .update_uniform_buffers(&services.scope(), services.timeline.next_value())
            .unwrap();

        let after: Vec<_> = program
            .uniform_descriptor_writes()
            .iter()
            .map(|w| w.resource)
            .collect();
        // The fragment block moved (contended discard grew its ring); the
        // vertex block stayed put.
        assert_eq!(before[0], after[0]);
        assert_ne!(before[1], after[1]);
    }

    #[test]
    fn drop_defers_module_and_layout_destruction() {
        let services = shared();
        let compiler = MockCompiler::new();
        let mut cache = ShaderBytecodeCache::new();
        let program =
            ShaderProgram::new(services.clone(), 1, &compiler, &mut cache, &DESC).unwrap();
        let pending = services.timeline.next_value();
        drop(program);
        assert!(!services.scheduler.is_empty());

        services.timeline.advance_next();
        services.timeline.publish_completed(pending);
        services.scheduler.perform(services.timeline.last_completed());
        assert!(services.scheduler.is_empty());
    }
}
