/*!
# Nebula Graphics

GPU abstraction layer: a uniform resource and drawing API over one native
3D backend.

The crate owns device/context lifetime, every GPU resource type (vertex and
index buffers, 2D textures, depth/stencil buffers, staging readback
surfaces, samplers, vertex/pixel shaders, swap chains, screen duplicators),
pipeline-state caching, and device-loss recovery. Resources live in a slot
arena owned by the [`device::Device`]; callers hold cheap copyable typed
handles.

## Architecture

- **device**: the `Device` itself — resource factory, binding slots,
  pipeline-state pools, transform stack, draw submission, rebuild
- **resource**: one module per resource kind, each retaining the CPU-side
  description/data needed to rebuild its native objects after device loss
- **native**: the `NativeDevice` trait — the narrow seam the production
  backend (`nebula_graphics_backend_d3d11`) implements, mocked for
  headless unit tests
- **format**: color and depth/stencil format enums with size arithmetic

A device and its resources belong to a single rendering thread.
*/

pub mod error;
pub mod device;
pub mod format;
pub mod log;
pub mod native;
pub mod resource;

#[cfg(test)]
mod format_tests;
#[cfg(test)]
mod log_tests;

// Main nebula namespace module
pub mod nebula {
    // Error types
    pub use crate::error::{Error, Result};

    // The device
    pub use crate::device::{ClearFlags, Device, Rect, MAX_TEXTURE_SLOTS};

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{DefaultLogger, LogEntry, LogSeverity, Logger};
    }

    // Fixed-function pipeline state
    pub mod state {
        pub use crate::device::state::*;
    }

    // Formats
    pub mod format {
        pub use crate::format::*;
    }

    // Resource types and handles
    pub mod resource {
        pub use crate::resource::*;
    }

    // Backend seam
    pub mod native {
        pub use crate::native::{
            BufferDesc, BufferKind, MappedSurface, NativeDepthStencil, NativeDevice, NativeHandle,
            NativeObject, NativeTextureSet, NativeVertexShader,
        };
    }
}

// Re-export math library at crate root
pub use glam;
