//! GPU resource objects and the device resource registry
//!
//! Every live resource is stored in the owning device's slot arena
//! ([`slotmap`]) under a [`ResourceKey`]; callers hold cheap typed handles
//! wrapping that key. The arena replaces the classic intrusive per-device
//! linked list: O(1) insert/remove, stable keys, and no dangling links by
//! construction. Device-loss recovery walks the arena and rebuilds each
//! entry from its CPU-retained description.

use slotmap::new_key_type;

pub mod depth_stencil;
pub mod duplicator;
pub mod index_buffer;
pub mod sampler;
pub mod shader;
pub mod stage_surface;
pub mod swap_chain;
pub mod texture;
pub mod vertex_buffer;

#[cfg(test)]
mod shader_tests;
#[cfg(test)]
mod texture_tests;
#[cfg(test)]
mod vertex_buffer_tests;

pub use depth_stencil::DepthStencilBuffer;
pub use duplicator::Duplicator;
pub use index_buffer::{IndexBuffer, IndexData, IndexType};
pub use sampler::{AddressMode, SampleFilter, SamplerDesc, SamplerState};
pub use shader::{
    ParamValue, PixelShader, PixelShaderDesc, SamplerBindingDesc, ShaderParam, ShaderParamDesc,
    ShaderParamType, ShaderSampler, VertexAttribute, VertexShader, VertexShaderDesc,
};
pub use stage_surface::StageSurface;
pub use swap_chain::{SwapChain, SwapChainInit};
pub use texture::{Texture2d, TextureBacking, TextureDesc, TextureFlags};
pub use vertex_buffer::{TexCoords, VertexBuffer, VertexData};

new_key_type! {
    /// Arena key of a resource registered with a device
    pub struct ResourceKey;
}

/// The closed set of resource kinds a device manages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    VertexBuffer,
    IndexBuffer,
    Texture2d,
    DepthStencil,
    StageSurface,
    Sampler,
    VertexShader,
    PixelShader,
    SwapChain,
    Duplicator,
}

/// A registered resource (tagged variant; the kind set is fixed, so rebuild
/// and teardown dispatch by match rather than by vtable)
pub enum Resource {
    VertexBuffer(VertexBuffer),
    IndexBuffer(IndexBuffer),
    Texture2d(Texture2d),
    DepthStencil(DepthStencilBuffer),
    StageSurface(StageSurface),
    Sampler(SamplerState),
    VertexShader(VertexShader),
    PixelShader(PixelShader),
    SwapChain(SwapChain),
    Duplicator(Duplicator),
}

impl Resource {
    /// Kind tag of this resource
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::VertexBuffer(_) => ResourceKind::VertexBuffer,
            Resource::IndexBuffer(_) => ResourceKind::IndexBuffer,
            Resource::Texture2d(_) => ResourceKind::Texture2d,
            Resource::DepthStencil(_) => ResourceKind::DepthStencil,
            Resource::StageSurface(_) => ResourceKind::StageSurface,
            Resource::Sampler(_) => ResourceKind::Sampler,
            Resource::VertexShader(_) => ResourceKind::VertexShader,
            Resource::PixelShader(_) => ResourceKind::PixelShader,
            Resource::SwapChain(_) => ResourceKind::SwapChain,
            Resource::Duplicator(_) => ResourceKind::Duplicator,
        }
    }
}

// ===== TYPED HANDLES =====

macro_rules! resource_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) ResourceKey);

        impl From<$name> for ResourceKey {
            fn from(handle: $name) -> ResourceKey {
                handle.0
            }
        }
    };
}

resource_handle!(
    /// Handle to a vertex buffer
    VertexBufferHandle
);
resource_handle!(
    /// Handle to an index buffer
    IndexBufferHandle
);
resource_handle!(
    /// Handle to a 2D texture
    TextureHandle
);
resource_handle!(
    /// Handle to a depth/stencil buffer
    DepthStencilHandle
);
resource_handle!(
    /// Handle to a staging (readback) surface
    StageSurfaceHandle
);
resource_handle!(
    /// Handle to a sampler state
    SamplerHandle
);
resource_handle!(
    /// Handle to a vertex shader
    VertexShaderHandle
);
resource_handle!(
    /// Handle to a pixel shader
    PixelShaderHandle
);
resource_handle!(
    /// Handle to a swap chain
    SwapChainHandle
);
resource_handle!(
    /// Handle to a screen duplicator
    DuplicatorHandle
);
