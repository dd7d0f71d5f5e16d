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

//! Fixed-function render state descriptors.
//!
//! These are plain values the render context tracks between draws and folds
//! into the canonical pipeline record. Every enum here converts to a stable
//! `u32` discriminant for hashing.

/// Texture and render-target pixel formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    /// 8-bit RGBA, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA, unsigned normalized, sRGB encoded.
    Rgba8UnormSrgb,
    /// 8-bit BGRA, unsigned normalized.
    Bgra8Unorm,
    /// Single 8-bit channel.
    R8Unorm,
    /// 16-bit float RGBA.
    Rgba16Float,
    /// 24-bit depth with 8-bit stencil.
    Depth24PlusStencil8,
    /// 32-bit float depth, no stencil.
    Depth32Float,
}

impl TextureFormat {
    /// Bytes per pixel for linear copy sizing.
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::R8Unorm => 1,
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Depth24PlusStencil8
            | TextureFormat::Depth32Float => 4,
            TextureFormat::Rgba16Float => 8,
        }
    }

    /// Returns `true` for depth or depth-stencil formats.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth24PlusStencil8 | TextureFormat::Depth32Float
        )
    }
}

/// Comparison function for depth and stencil tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    /// Never passes.
    Never,
    /// Passes when source < destination.
    Less,
    /// Passes on equality.
    Equal,
    /// Passes when source <= destination.
    LessEqual,
    /// Passes when source > destination.
    Greater,
    /// Passes on inequality.
    NotEqual,
    /// Passes when source >= destination.
    GreaterEqual,
    /// Always passes.
    #[default]
    Always,
}

/// Stencil buffer update operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOperation {
    /// Leave the stencil value untouched.
    #[default]
    Keep,
    /// Write zero.
    Zero,
    /// Write the reference value.
    Replace,
    /// Increment, clamping at the maximum.
    IncrementClamp,
    /// Decrement, clamping at zero.
    DecrementClamp,
    /// Bitwise invert.
    Invert,
    /// Increment with wrap.
    IncrementWrap,
    /// Decrement with wrap.
    DecrementWrap,
}

/// Blend equation applied to color or alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOperation {
    /// `src * src_factor + dst * dst_factor`
    #[default]
    Add,
    /// `src * src_factor - dst * dst_factor`
    Subtract,
    /// `dst * dst_factor - src * src_factor`
    ReverseSubtract,
    /// Component-wise minimum.
    Min,
    /// Component-wise maximum.
    Max,
}

/// Multiplier applied to a blend input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// 0.0
    Zero,
    /// 1.0
    One,
    /// Source color.
    SrcColor,
    /// 1 - source color.
    OneMinusSrcColor,
    /// Source alpha.
    SrcAlpha,
    /// 1 - source alpha.
    OneMinusSrcAlpha,
    /// Destination color.
    DstColor,
    /// 1 - destination color.
    OneMinusDstColor,
    /// Destination alpha.
    DstAlpha,
    /// 1 - destination alpha.
    OneMinusDstAlpha,
}

/// Triangle face culling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// Cull nothing.
    #[default]
    None,
    /// Cull front-facing triangles.
    Front,
    /// Cull back-facing triangles.
    Back,
}

/// Which winding order counts as front-facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    /// Counter-clockwise is front.
    #[default]
    Ccw,
    /// Clockwise is front.
    Cw,
}

/// Primitive assembly mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Independent point per vertex.
    PointList,
    /// Independent line per vertex pair.
    LineList,
    /// Connected line strip.
    LineStrip,
    /// Independent triangle per vertex triple.
    #[default]
    TriangleList,
    /// Connected triangle strip.
    TriangleStrip,
}

/// Index element width for indexed draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    /// 16-bit indices.
    #[default]
    Uint16,
    /// 32-bit indices.
    Uint32,
}

/// Per-attribute vertex data format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    /// One 32-bit float.
    Float32,
    /// Two 32-bit floats.
    Float32x2,
    /// Three 32-bit floats.
    Float32x3,
    /// Four 32-bit floats.
    Float32x4,
    /// Four unsigned bytes.
    Uint8x4,
    /// Four unsigned bytes, normalized to [0, 1].
    Unorm8x4,
}

/// Per-target blend configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendState {
    /// Whether blending is performed at all. When `false` the remaining
    /// fields are ignored.
    pub enable: bool,
    /// Color channel blend equation.
    pub color_op: BlendOperation,
    /// Source color factor.
    pub src_color: BlendFactor,
    /// Destination color factor.
    pub dst_color: BlendFactor,
    /// Alpha channel blend equation.
    pub alpha_op: BlendOperation,
    /// Source alpha factor.
    pub src_alpha: BlendFactor,
    /// Destination alpha factor.
    pub dst_alpha: BlendFactor,
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            enable: false,
            color_op: BlendOperation::Add,
            src_color: BlendFactor::One,
            dst_color: BlendFactor::Zero,
            alpha_op: BlendOperation::Add,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
        }
    }
}

/// Depth test configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthState {
    /// Whether the depth test runs. When `false` the remaining fields are
    /// ignored.
    pub enable: bool,
    /// Whether passing fragments write depth.
    pub write_enable: bool,
    /// Depth comparison function.
    pub compare: CompareFunction,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            enable: false,
            write_enable: true,
            compare: CompareFunction::LessEqual,
        }
    }
}

/// Stencil configuration for one triangle facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StencilFaceState {
    /// Stencil comparison function.
    pub compare: CompareFunction,
    /// Operation when the stencil test fails.
    pub fail_op: StencilOperation,
    /// Operation when the stencil test passes but the depth test fails.
    pub depth_fail_op: StencilOperation,
    /// Operation when both tests pass.
    pub pass_op: StencilOperation,
}

/// Full stencil test configuration.
///
/// The reference value is dynamic state: it is recorded into the command
/// stream per draw and never participates in pipeline identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StencilState {
    /// Whether the stencil test runs. When `false` the remaining fields are
    /// ignored.
    pub enable: bool,
    /// Dynamic reference value.
    pub reference: u32,
    /// Bits compared by the stencil test.
    pub read_mask: u32,
    /// Bits writable by stencil operations.
    pub write_mask: u32,
    /// Front-facing configuration.
    pub front: StencilFaceState,
    /// Back-facing configuration.
    pub back: StencilFaceState,
}

/// Scissor rectangle, active only when enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScissorState {
    /// Whether scissoring clips to the rectangle below. When `false` the
    /// scissor tracks the full render target.
    pub enable: bool,
    /// Left edge in pixels.
    pub x: i32,
    /// Top edge in pixels.
    pub y: i32,
    /// Rectangle width in pixels.
    pub width: u32,
    /// Rectangle height in pixels.
    pub height: u32,
}

/// Viewport transform, recorded as dynamic state per draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Left edge in pixels.
    pub x: f32,
    /// Top edge in pixels.
    pub y: f32,
    /// Width in pixels.
    pub width: f32,
    /// Height in pixels.
    pub height: f32,
    /// Near depth range bound.
    pub min_depth: f32,
    /// Far depth range bound.
    pub max_depth: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Which color channels a draw may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorWriteMask(pub u32);

impl ColorWriteMask {
    /// No channels.
    pub const NONE: Self = Self(0);
    /// Red channel.
    pub const RED: Self = Self(1 << 0);
    /// Green channel.
    pub const GREEN: Self = Self(1 << 1);
    /// Blue channel.
    pub const BLUE: Self = Self(1 << 2);
    /// Alpha channel.
    pub const ALPHA: Self = Self(1 << 3);
    /// All four channels.
    pub const ALL: Self = Self(0b1111);

    /// Returns `true` if every channel in `other` is present in `self`.
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

impl Default for ColorWriteMask {
    fn default() -> Self {
        Self::ALL
    }
}

impl std::ops::BitOr for ColorWriteMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One vertex buffer binding slot: stride between consecutive vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBindingDescription {
    /// Binding slot index.
    pub slot: u32,
    /// Byte stride between vertices.
    pub stride: u32,
}

/// One vertex attribute sourced from a binding slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttributeDescription {
    /// Binding slot the attribute reads from.
    pub slot: u32,
    /// Shader input location.
    pub location: u32,
    /// Byte offset within the vertex.
    pub offset: u32,
    /// Element format.
    pub format: VertexFormat,
}

/// Complete vertex fetch layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexLayoutDescription {
    /// Buffer binding slots.
    pub bindings: Vec<VertexBindingDescription>,
    /// Attributes across all slots.
    pub attributes: Vec<VertexAttributeDescription>,
}

/// Where a frame is rendered to, as far as pipeline identity is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetInfo {
    /// Color attachment format.
    pub color_format: TextureFormat,
    /// Optional depth-stencil attachment format.
    pub depth_stencil_format: Option<TextureFormat>,
    /// Target width in pixels.
    pub width: u32,
    /// Target height in pixels.
    pub height: u32,
}
