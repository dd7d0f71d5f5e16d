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

//! Canonical pipeline identity record.
//!
//! Two draws that differ only in state the pipeline does not consume must
//! hash identically. The record starts zeroed and only the fields a feature
//! actually uses get populated, so disabled blend factors, depth comparisons
//! and stencil faces never perturb the key.

use bytemuck::{Pod, Zeroable};
use xxhash_rust::xxh3::xxh3_128;

use crate::state::{
    BlendState, ColorWriteMask, CullMode, DepthState, FrontFace, PrimitiveTopology, StencilState,
    TextureFormat,
};

/// Flattened, canonicalized pipeline state. Field order is fixed; the byte
/// image of this struct is the hash input.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct PipelineStateRecord {
    vertex_layout_id: u64,
    program_id: u64,

    blend_enable: u32,
    blend_color_op: u32,
    blend_src_color: u32,
    blend_dst_color: u32,
    blend_alpha_op: u32,
    blend_src_alpha: u32,
    blend_dst_alpha: u32,

    depth_enable: u32,
    depth_write: u32,
    depth_compare: u32,

    stencil_enable: u32,
    stencil_read_mask: u32,
    stencil_write_mask: u32,
    stencil_front: [u32; 4],
    stencil_back: [u32; 4],

    color_write_mask: u32,
    cull_mode: u32,
    front_face: u32,
    topology: u32,

    color_format: u32,
    depth_stencil_format: u32,
    _reserved: u32,
}

fn face_record(face: &crate::state::StencilFaceState) -> [u32; 4] {
    [
        face.compare as u32,
        face.fail_op as u32,
        face.depth_fail_op as u32,
        face.pass_op as u32,
    ]
}

impl PipelineStateRecord {
    /// Builds the canonical record for one draw's bound state.
    ///
    /// `vertex_layout_id` and `program_id` are the per-resource identity
    /// values minted by the render context; they stand in for the full
    /// vertex layout and shader program contents.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        blend: &BlendState,
        depth: &DepthState,
        stencil: &StencilState,
        color_write_mask: ColorWriteMask,
        cull_mode: CullMode,
        front_face: FrontFace,
        topology: PrimitiveTopology,
        vertex_layout_id: u64,
        program_id: u64,
        color_format: TextureFormat,
        depth_stencil_format: Option<TextureFormat>,
    ) -> Self {
        let mut record = Self::zeroed();
        record.vertex_layout_id = vertex_layout_id;
        record.program_id = program_id;

        if blend.enable {
            record.blend_enable = 1;
            record.blend_color_op = blend.color_op as u32;
            record.blend_src_color = blend.src_color as u32;
            record.blend_dst_color = blend.dst_color as u32;
            record.blend_alpha_op = blend.alpha_op as u32;
            record.blend_src_alpha = blend.src_alpha as u32;
            record.blend_dst_alpha = blend.dst_alpha as u32;
        }

        if depth.enable {
            record.depth_enable = 1;
            record.depth_write = depth.write_enable as u32;
            record.depth_compare = depth.compare as u32;
        }

        // The stencil reference value is dynamic state and never hashed.
        if stencil.enable {
            record.stencil_enable = 1;
            record.stencil_read_mask = stencil.read_mask;
            record.stencil_write_mask = stencil.write_mask;
            record.stencil_front = face_record(&stencil.front);
            record.stencil_back = face_record(&stencil.back);
        }

        record.color_write_mask = color_write_mask.bits();
        record.cull_mode = cull_mode as u32;
        record.front_face = front_face as u32;
        record.topology = topology as u32;

        record.color_format = color_format as u32;
        record.depth_stencil_format = match depth_stencil_format {
            Some(format) => format as u32 + 1,
            None => 0,
        };
        record
    }

    /// 128-bit cache key over the record's byte image.
    pub fn hash128(&self) -> u128 {
        xxh3_128(bytemuck::bytes_of(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{BlendFactor, BlendOperation, CompareFunction, StencilOperation};

    fn base_record(blend: &BlendState, depth: &DepthState, stencil: &StencilState) -> PipelineStateRecord {
        PipelineStateRecord::new(
            blend,
            depth,
            stencil,
            ColorWriteMask::ALL,
            CullMode::Back,
            FrontFace::Ccw,
            PrimitiveTopology::TriangleList,
            1,
            1,
            TextureFormat::Bgra8Unorm,
            Some(TextureFormat::Depth24PlusStencil8),
        )
    }

    #[test]
    fn disabled_blend_ignores_factor_fields() {
        let mut a = BlendState::default();
        a.src_color = BlendFactor::SrcAlpha;
        a.dst_color = BlendFactor::OneMinusSrcAlpha;
        a.color_op = BlendOperation::ReverseSubtract;
        let b = BlendState::default();
        let depth = DepthState::default();
        let stencil = StencilState::default();
        assert_eq!(
            base_record(&a, &depth, &stencil).hash128(),
            base_record(&b, &depth, &stencil).hash128()
        );
    }

    #[test]
    fn enabled_blend_distinguishes_factors() {
        let mut a = BlendState::default();
        a.enable = true;
        a.src_color = BlendFactor::SrcAlpha;
        let mut b = a;
        b.src_color = BlendFactor::One;
        let depth = DepthState::default();
        let stencil = StencilState::default();
        assert_ne!(
            base_record(&a, &depth, &stencil).hash128(),
            base_record(&b, &depth, &stencil).hash128()
        );
    }

    #[test]
    fn disabled_depth_ignores_comparison() {
        let blend = BlendState::default();
        let mut a = DepthState::default();
        a.compare = CompareFunction::Greater;
        let b = DepthState::default();
        let stencil = StencilState::default();
        assert_eq!(
            base_record(&blend, &a, &stencil).hash128(),
            base_record(&blend, &b, &stencil).hash128()
        );
    }

    #[test]
    fn stencil_reference_never_changes_identity() {
        let blend = BlendState::default();
        let depth = DepthState::default();
        let mut a = StencilState {
            enable: true,
            reference: 1,
            read_mask: 0xFF,
            write_mask: 0xFF,
            ..Default::default()
        };
        a.front.pass_op = StencilOperation::Replace;
        let mut b = a;
        b.reference = 200;
        assert_eq!(
            base_record(&blend, &depth, &a).hash128(),
            base_record(&blend, &depth, &b).hash128()
        );
    }

    #[test]
    fn disabled_stencil_ignores_face_state() {
        let blend = BlendState::default();
        let depth = DepthState::default();
        let mut a = StencilState::default();
        a.front.pass_op = StencilOperation::IncrementWrap;
        a.read_mask = 0xF0;
        let b = StencilState::default();
        assert_eq!(
            base_record(&blend, &depth, &a).hash128(),
            base_record(&blend, &depth, &b).hash128()
        );
    }

    #[test]
    fn depth_stencil_format_presence_is_part_of_identity() {
        let blend = BlendState::default();
        let depth = DepthState::default();
        let stencil = StencilState::default();
        let with = base_record(&blend, &depth, &stencil);
        let without = PipelineStateRecord::new(
            &blend,
            &depth,
            &stencil,
            ColorWriteMask::ALL,
            CullMode::Back,
            FrontFace::Ccw,
            PrimitiveTopology::TriangleList,
            1,
            1,
            TextureFormat::Bgra8Unorm,
            None,
        );
        assert_ne!(with.hash128(), without.hash128());
    }
}
