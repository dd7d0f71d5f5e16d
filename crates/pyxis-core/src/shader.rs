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

//! Shader stages, reflection metadata and the compiler seam.

use std::fmt;

use crate::error::ShaderError;

/// A programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex stage.
    Vertex,
    /// Fragment stage.
    Fragment,
}

/// Bitmask of shader stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShaderStageFlags(pub u32);

impl ShaderStageFlags {
    /// No stages.
    pub const NONE: Self = Self(0);
    /// The vertex stage.
    pub const VERTEX: Self = Self(1 << 0);
    /// The fragment stage.
    pub const FRAGMENT: Self = Self(1 << 1);

    /// The flag bit for a single stage.
    pub fn from_stage(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => Self::VERTEX,
            ShaderStage::Fragment => Self::FRAGMENT,
        }
    }

    /// Returns `true` if every stage in `other` is present in `self`.
    #[inline]
    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Returns `true` if `self` and `other` share any stage.
    #[inline]
    pub fn intersects(&self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    /// Returns `true` if no stage is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Raw bit representation.
    #[inline]
    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for ShaderStageFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for ShaderStageFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Data type of a reflected uniform variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderVariableType {
    /// Scalar 32-bit float.
    Float,
    /// Two-component float vector.
    FloatVec2,
    /// Three-component float vector.
    FloatVec3,
    /// Four-component float vector.
    FloatVec4,
    /// Column-major 4x4 float matrix.
    FloatMat4,
    /// Scalar 32-bit signed integer.
    Int,
    /// Combined image sampler over a 2D texture.
    Sampler2D,
}

impl ShaderVariableType {
    /// Byte size of one element, or 0 for opaque sampler types.
    pub fn byte_size(&self) -> u32 {
        match self {
            ShaderVariableType::Float | ShaderVariableType::Int => 4,
            ShaderVariableType::FloatVec2 => 8,
            ShaderVariableType::FloatVec3 => 12,
            ShaderVariableType::FloatVec4 => 16,
            ShaderVariableType::FloatMat4 => 64,
            ShaderVariableType::Sampler2D => 0,
        }
    }

    /// Returns `true` for opaque sampler types.
    pub fn is_sampler(&self) -> bool {
        matches!(self, ShaderVariableType::Sampler2D)
    }
}

/// One member of a reflected uniform block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformMemberReflection {
    /// Source-level variable name.
    pub name: String,
    /// Member data type.
    pub ty: ShaderVariableType,
    /// Byte offset inside the block.
    pub offset: u32,
    /// Element count; 1 for non-arrays.
    pub array_size: u32,
}

impl UniformMemberReflection {
    /// Total byte size of this member including all array elements.
    pub fn byte_size(&self) -> u32 {
        self.ty.byte_size() * self.array_size.max(1)
    }
}

/// One reflected uniform block within a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBlockReflection {
    /// Descriptor binding index.
    pub binding: u32,
    /// Stage the block belongs to.
    pub stage: ShaderStage,
    /// Total block size in bytes.
    pub size: u32,
    /// Members in declaration order.
    pub members: Vec<UniformMemberReflection>,
}

/// One reflected combined image sampler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerReflection {
    /// Source-level sampler name.
    pub name: String,
    /// Descriptor binding index.
    pub binding: u32,
    /// Stage the sampler is visible to.
    pub stage: ShaderStage,
    /// Application texture slot the sampler reads from.
    pub texture_slot: u32,
}

/// Full reflected interface of a single stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StageReflection {
    /// Uniform blocks declared by the stage.
    pub blocks: Vec<UniformBlockReflection>,
    /// Combined image samplers declared by the stage.
    pub samplers: Vec<SamplerReflection>,
}

/// Output of compiling one stage: driver-consumable bytecode plus the
/// reflected interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledShader {
    /// Driver-consumable bytecode blob.
    pub bytecode: Vec<u8>,
    /// Interface metadata for the stage.
    pub reflection: StageReflection,
}

/// Translates stage source text into bytecode and reflection metadata.
///
/// `reflect` exists so a bytecode cache hit can still recover the stage
/// interface without running code generation.
pub trait ShaderCompiler: fmt::Debug {
    /// Compiles one stage to bytecode and reflects its interface.
    fn compile(&self, stage: ShaderStage, source: &str) -> Result<CompiledShader, ShaderError>;

    /// Reflects a stage's interface without generating bytecode.
    fn reflect(&self, stage: ShaderStage, source: &str) -> Result<StageReflection, ShaderError>;
}
