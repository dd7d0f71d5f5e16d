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

//! GPU resource lifecycle and command submission over a
//! [`DeviceDriver`](pyxis_core::driver::DeviceDriver).
//!
//! The centerpiece is the [`RenderContext`]: it creates buffers, textures
//! and shader programs, tracks render state between draws, bakes pipelines
//! through an LRU cache and submits recorded work under a monotonic fence
//! timeline. Everything the GPU might still be reading is destroyed through
//! a deferred release queue keyed by fence values, never immediately.
//!
//! The supporting modules are usable on their own:
//!
//! - **[`fence`]**: the fence timeline and the in-flight submission ring.
//! - **[`scheduler`]**: the deferred destruction queue.
//! - **[`memory`]**: the block suballocator for device memory.
//! - **[`ring`]**: fence-rotated ring buffers backing dynamic data.
//! - **[`upload`]**: the persistently mapped staging arena.
//! - **[`descriptor`]**: pool-rotating transient descriptor allocation.
//! - **[`pipeline_cache`]**: the pipeline LRU, the shader bytecode cache
//!   and their persisted container.

#![warn(missing_docs)]

pub mod buffer;
pub mod context;
pub mod descriptor;
pub mod fence;
pub mod lru;
pub mod memory;
pub mod pipeline_cache;
pub mod program;
pub mod ring;
pub mod scheduler;
pub mod scope;
pub mod texture;
pub mod upload;

#[cfg(test)]
pub(crate) mod mock;

pub use buffer::{BufferKind, GpuBuffer};
pub use context::{
    BufferId, BufferWriteMode, RenderContext, ShaderProgramId, TextureId, VertexLayoutId,
    MAX_TEXTURE_SLOTS, MAX_VERTEX_BUFFER_SLOTS,
};
pub use descriptor::DescriptorAllocator;
pub use fence::{FenceTimeline, FenceValue, SubmissionRing};
pub use memory::{DeviceAllocator, MemoryAlloc, ResourceLinearity};
pub use pipeline_cache::{
    load_cache, save_cache, LoadedCache, PipelineCache, ShaderBytecodeCache, CACHE_MAGIC,
    CACHE_VERSION,
};
pub use program::{ShaderProgram, ShaderProgramDesc};
pub use ring::RingBuffer;
pub use scheduler::ReleaseQueue;
pub use scope::{DeviceScope, SharedServices};
pub use texture::GpuTexture;
pub use upload::{UploadAlloc, UploadArena};
