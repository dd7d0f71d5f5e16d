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

//! Error types for the driver seam, the render context and shader tooling.

use std::error::Error;
use std::fmt;
use std::io;

use crate::driver::MemoryPropertyFlags;
use crate::shader::ShaderStage;

/// Failure reported by a [`DeviceDriver`](crate::driver::DeviceDriver)
/// operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The device could not satisfy a memory allocation.
    OutOfDeviceMemory,
    /// A descriptor pool had no room for the requested set.
    PoolExhausted,
    /// Any other backend-specific failure.
    Backend(String),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::OutOfDeviceMemory => write!(f, "out of device memory"),
            DriverError::PoolExhausted => write!(f, "descriptor pool exhausted"),
            DriverError::Backend(msg) => write!(f, "backend error: {msg}"),
        }
    }
}

impl Error for DriverError {}

/// Failure in the render context or one of its resource managers.
#[derive(Debug)]
pub enum ContextError {
    /// No memory kind satisfies the requested property flags within the
    /// resource's kind mask. The device cannot host this resource at all.
    NoSuitableMemoryKind {
        /// Properties the resource required.
        required: MemoryPropertyFlags,
    },
    /// A single allocation exceeded the fixed block size. Resources that
    /// large need a different storage strategy, so this is a sizing bug.
    AllocationTooLarge {
        /// Requested allocation size in bytes.
        size: u64,
        /// Block size of the memory kind it was routed to.
        block_size: u64,
    },
    /// A resource id was used after being freed, or was never created here.
    UnknownResource {
        /// What kind of resource the id claimed to be.
        kind: &'static str,
    },
    /// A draw was issued with no render target bound.
    NoRenderTarget,
    /// A draw was issued with no shader program bound.
    NoShaderProgram,
    /// The driver failed underneath a context operation.
    Driver(DriverError),
    /// Shader compilation or reflection failed.
    Shader(ShaderError),
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::NoSuitableMemoryKind { required } => {
                write!(f, "no memory kind provides properties {required:?}")
            }
            ContextError::AllocationTooLarge { size, block_size } => write!(
                f,
                "allocation of {size} bytes exceeds the {block_size}-byte memory block size"
            ),
            ContextError::UnknownResource { kind } => {
                write!(f, "unknown or already freed {kind} id")
            }
            ContextError::NoRenderTarget => write!(f, "draw issued without a render target"),
            ContextError::NoShaderProgram => write!(f, "draw issued without a shader program"),
            ContextError::Driver(err) => write!(f, "driver error: {err}"),
            ContextError::Shader(err) => write!(f, "shader error: {err}"),
        }
    }
}

impl Error for ContextError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ContextError::Driver(err) => Some(err),
            ContextError::Shader(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DriverError> for ContextError {
    fn from(err: DriverError) -> Self {
        ContextError::Driver(err)
    }
}

impl From<ShaderError> for ContextError {
    fn from(err: ShaderError) -> Self {
        ContextError::Shader(err)
    }
}

/// Failure while compiling or reflecting a shader stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderError {
    /// The compiler rejected the source.
    CompilationFailed {
        /// Stage that failed.
        stage: ShaderStage,
        /// Compiler diagnostics.
        details: String,
    },
    /// Reflection produced no usable interface for a stage.
    ReflectionFailed {
        /// Stage that failed.
        stage: ShaderStage,
        /// What went wrong.
        details: String,
    },
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderError::CompilationFailed { stage, details } => {
                write!(f, "{stage:?} stage failed to compile: {details}")
            }
            ShaderError::ReflectionFailed { stage, details } => {
                write!(f, "{stage:?} stage reflection failed: {details}")
            }
        }
    }
}

impl Error for ShaderError {}

/// Failure while reading a persisted pipeline cache image.
///
/// Loads fail closed: any variant means the caller starts from an empty
/// cache.
#[derive(Debug)]
pub enum CacheLoadError {
    /// The magic number did not match.
    BadMagic,
    /// The container version is not one this build understands.
    UnsupportedVersion(u32),
    /// The stream ended before the declared contents.
    Truncated,
    /// The underlying reader failed.
    Io(io::Error),
}

impl fmt::Display for CacheLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheLoadError::BadMagic => write!(f, "pipeline cache magic mismatch"),
            CacheLoadError::UnsupportedVersion(v) => {
                write!(f, "unsupported pipeline cache version {v}")
            }
            CacheLoadError::Truncated => write!(f, "pipeline cache data truncated"),
            CacheLoadError::Io(err) => write!(f, "pipeline cache read failed: {err}"),
        }
    }
}

impl Error for CacheLoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CacheLoadError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for CacheLoadError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            CacheLoadError::Truncated
        } else {
            CacheLoadError::Io(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_error_converts_into_context_error() {
        let err: ContextError = DriverError::OutOfDeviceMemory.into();
        assert!(matches!(err, ContextError::Driver(DriverError::OutOfDeviceMemory)));
    }

    #[test]
    fn eof_maps_to_truncated() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(CacheLoadError::from(eof), CacheLoadError::Truncated));
    }

    #[test]
    fn errors_format_usefully() {
        let msg = ContextError::AllocationTooLarge {
            size: 1 << 30,
            block_size: 64 << 20,
        }
        .to_string();
        assert!(msg.contains("exceeds"));
    }
}
