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

//! Opaque raw handles returned by a [`DeviceDriver`](crate::driver::DeviceDriver).
//!
//! A handle is a bare `u64` token minted by the driver. The contracts crate
//! never interprets the value; it only stores and passes it back.

macro_rules! raw_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub u64);
    };
}

raw_handle!(
    /// A driver buffer object.
    BufferHandle
);
raw_handle!(
    /// A driver image object.
    ImageHandle
);
raw_handle!(
    /// A view over a driver image.
    ImageViewHandle
);
raw_handle!(
    /// A raw device memory allocation.
    MemoryHandle
);
raw_handle!(
    /// A recorded or recording command buffer.
    CommandBufferHandle
);
raw_handle!(
    /// A binary GPU completion fence.
    FenceHandle
);
raw_handle!(
    /// A descriptor pool.
    DescriptorPoolHandle
);
raw_handle!(
    /// A descriptor set carved out of a pool.
    DescriptorSetHandle
);
raw_handle!(
    /// A descriptor set layout.
    DescriptorSetLayoutHandle
);
raw_handle!(
    /// A pipeline layout.
    PipelineLayoutHandle
);
raw_handle!(
    /// A compiled shader module.
    ShaderModuleHandle
);
raw_handle!(
    /// A baked graphics pipeline.
    PipelineHandle
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_of_same_value_compare_equal() {
        assert_eq!(FenceHandle(3), FenceHandle(3));
        assert_ne!(FenceHandle(3), FenceHandle(4));
    }

    #[test]
    fn zero_is_an_ordinary_handle_value() {
        // Drivers may legitimately mint 0; nothing treats it as a sentinel.
        assert_eq!(BufferHandle(0), BufferHandle(0));
        assert_ne!(BufferHandle(0), BufferHandle(1));
    }
}
