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

//! Backend-agnostic contracts for the pyxis GPU lifecycle layer.
//!
//! This crate defines the seams the lifecycle layer is built against:
//!
//! - **[`driver`]**: the [`DeviceDriver`](driver::DeviceDriver) trait hiding
//!   the native GPU backend, plus its descriptor types.
//! - **[`handle`]**: opaque raw handles minted by a driver.
//! - **[`state`]**: fixed-function render state descriptors.
//! - **[`shader`]**: stages, reflection metadata and the
//!   [`ShaderCompiler`](shader::ShaderCompiler) seam.
//! - **[`pipeline_key`]**: the canonical, hash-stable pipeline identity
//!   record.
//! - **[`error`]**: typed errors for every layer.
//! - **[`settings`]**: context construction tunables.

#![warn(missing_docs)]

pub mod driver;
pub mod error;
pub mod handle;
pub mod pipeline_key;
pub mod settings;
pub mod shader;
pub mod state;

pub use driver::{
    BufferDescriptor, BufferUsageFlags, DescriptorKind, DescriptorPoolLimits, DescriptorResource,
    DescriptorSetLayoutBinding, DescriptorWrite, DeviceDriver, DriverLimits, ImageDescriptor,
    MemoryKindInfo, MemoryPropertyFlags, MemoryRequirements, PipelineDescriptor,
};
pub use error::{CacheLoadError, ContextError, DriverError, ShaderError};
pub use handle::{
    BufferHandle, CommandBufferHandle, DescriptorPoolHandle, DescriptorSetHandle,
    DescriptorSetLayoutHandle, FenceHandle, ImageHandle, ImageViewHandle, MemoryHandle,
    PipelineHandle, PipelineLayoutHandle, ShaderModuleHandle,
};
pub use pipeline_key::PipelineStateRecord;
pub use settings::ContextSettings;
pub use shader::{
    CompiledShader, SamplerReflection, ShaderCompiler, ShaderStage, ShaderStageFlags,
    ShaderVariableType, StageReflection, UniformBlockReflection, UniformMemberReflection,
};
pub use state::{
    BlendFactor, BlendOperation, BlendState, ColorWriteMask, CompareFunction, CullMode, DepthState,
    FrontFace, IndexFormat, PrimitiveTopology, RenderTargetInfo, ScissorState, StencilFaceState,
    StencilOperation, StencilState, TextureFormat, VertexAttributeDescription,
    VertexBindingDescription, VertexFormat, VertexLayoutDescription, Viewport,
};
