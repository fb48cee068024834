//! Native backend seam
//!
//! [`NativeDevice`] is the narrow boundary between the abstraction layer and
//! the one production backend (Direct3D 11). It is shaped by what that
//! backend needs, not as a portability layer: creation calls return opaque
//! [`NativeHandle`] objects the backend can downcast back to its concrete
//! types, binding calls mirror the native immediate-context operations, and
//! any per-frame call may surface [`Error::DeviceLost`](crate::error::Error).
//!
//! The mock implementation used by unit tests lives in [`mock`].

use std::any::Any;

use crate::device::state::{BlendState, DepthStencilState, RasterState, Topology};
use crate::device::Rect;
use crate::error::Result;
use crate::format::{ColorFormat, DepthStencilFormat};
use crate::resource::index_buffer::IndexType;
use crate::resource::sampler::SamplerDesc;
use crate::resource::shader::VertexAttribute;
use crate::resource::swap_chain::SwapChainInit;
use crate::resource::texture::TextureDesc;

#[cfg(test)]
pub(crate) mod mock;

// ===== OPAQUE NATIVE OBJECTS =====

/// An object owned by the native backend (buffer, view, state object, ...).
///
/// The abstraction layer only moves these around; the owning backend
/// downcasts through `as_any` to recover its concrete type. Dropping the
/// handle releases the native object.
pub trait NativeObject: Send {
    fn as_any(&self) -> &dyn Any;
}

/// Boxed opaque native object
pub type NativeHandle = Box<dyn NativeObject>;

// ===== NATIVE CREATION RESULTS =====

/// Native objects backing one 2D texture
pub struct NativeTextureSet {
    /// The texture itself
    pub texture: NativeHandle,
    /// Render-target views: empty, one (2D), or six (cube faces)
    pub render_targets: Vec<NativeHandle>,
    /// Shader-resource view (absent for pure render targets that are never sampled)
    pub shader_resource: Option<NativeHandle>,
    /// GDI-interop surface view (GDI-compatible textures only)
    pub gdi_surface: Option<NativeHandle>,
    /// OS shared handle value (shared textures only)
    pub shared_handle: Option<u32>,
}

/// Native objects backing a depth/stencil buffer
pub struct NativeDepthStencil {
    pub texture: NativeHandle,
    pub view: NativeHandle,
}

/// Native objects backing a compiled vertex shader
pub struct NativeVertexShader {
    pub shader: NativeHandle,
    /// Input layout derived from the shader's declared attributes
    pub input_layout: NativeHandle,
}

/// CPU-visible copy of a mapped staging surface
pub struct MappedSurface {
    /// Tightly packed rows (`row_pitch` bytes apart as delivered by the backend)
    pub data: Vec<u8>,
    /// Bytes per row in `data`
    pub row_pitch: u32,
}

// ===== BUFFER DESCRIPTION =====

/// What a native buffer will be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Vertex,
    Index,
    Constant,
}

/// Description of a native buffer allocation
#[derive(Debug, Clone, Copy)]
pub struct BufferDesc {
    pub kind: BufferKind,
    pub size: usize,
    /// Dynamic buffers permit direct CPU map/update without recreation
    pub dynamic: bool,
}

// ===== NATIVE DEVICE TRAIT =====

/// Operations the abstraction layer requires of the native backend.
///
/// All calls are made from the single rendering thread. Creation calls that
/// fail surface as resource-creation errors; per-frame calls (present, draw)
/// that report a removed/reset device surface as `Error::DeviceLost`.
pub trait NativeDevice: Send {
    /// Human-readable adapter/backend description (logged at startup)
    fn description(&self) -> String;

    /// Tear down and recreate the underlying device/context after loss.
    /// Every previously created native object is invalid afterwards.
    fn reset(&mut self) -> Result<()>;

    // --- buffers ---

    fn create_buffer(&mut self, desc: &BufferDesc, initial: Option<&[u8]>) -> Result<NativeHandle>;

    /// Replace the full contents of a dynamic or constant buffer
    fn update_buffer(&mut self, buffer: &NativeHandle, data: &[u8]) -> Result<()>;

    // --- textures and surfaces ---

    /// Create a 2D texture (with views per `desc.flags`) from `initial`
    /// per-mip data (empty slice for uninitialized render targets)
    fn create_texture_2d(&mut self, desc: &TextureDesc, initial: &[Vec<u8>]) -> Result<NativeTextureSet>;

    /// Open an externally shared texture by OS handle; returns the derived
    /// description alongside the native objects
    fn open_shared_texture(&mut self, handle: u32) -> Result<(NativeTextureSet, TextureDesc)>;

    /// Rewrite level 0 of a dynamic texture from tightly packed rows
    fn update_texture(&mut self, texture: &NativeHandle, data: &[u8], row_pitch: u32) -> Result<()>;

    fn create_depth_stencil(
        &mut self,
        width: u32,
        height: u32,
        format: DepthStencilFormat,
    ) -> Result<NativeDepthStencil>;

    /// CPU-readable copy target
    fn create_stage_surface(&mut self, width: u32, height: u32, format: ColorFormat) -> Result<NativeHandle>;

    /// Copy a whole texture into a staging surface (GPU side)
    fn stage_texture(&mut self, dst_stage: &NativeHandle, src_texture: &NativeHandle) -> Result<()>;

    /// Map a staging surface and copy its contents out
    fn map_stage_surface(&mut self, surface: &NativeHandle) -> Result<MappedSurface>;

    /// Copy a subregion between two textures of compatible formats
    #[allow(clippy::too_many_arguments)]
    fn copy_texture_region(
        &mut self,
        dst: &NativeHandle,
        dst_x: u32,
        dst_y: u32,
        src: &NativeHandle,
        src_x: u32,
        src_y: u32,
        width: u32,
        height: u32,
    ) -> Result<()>;

    // --- samplers and shaders ---

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<NativeHandle>;

    /// Compile a vertex shader and build its input layout from the declared
    /// attribute list. Compiler diagnostics surface as `Error::ShaderCompile`.
    fn create_vertex_shader(
        &mut self,
        source: &str,
        file: &str,
        attributes: &[VertexAttribute],
    ) -> Result<NativeVertexShader>;

    fn create_pixel_shader(&mut self, source: &str, file: &str) -> Result<NativeHandle>;

    // --- pipeline state objects ---

    fn create_blend_state(&mut self, desc: &BlendState) -> Result<NativeHandle>;
    fn create_raster_state(&mut self, desc: &RasterState) -> Result<NativeHandle>;
    fn create_depth_stencil_state(&mut self, desc: &DepthStencilState) -> Result<NativeHandle>;

    // --- swap chain ---

    fn create_swap_chain(&mut self, init: &SwapChainInit) -> Result<NativeHandle>;

    /// Derive the back-buffer texture set (one render-target view) from a
    /// swap chain; called at creation and after every resize/rebuild
    fn swap_chain_target(&mut self, swap: &NativeHandle, init: &SwapChainInit) -> Result<NativeTextureSet>;

    /// Resize the swap chain's buffers. The caller must have dropped every
    /// handle derived from the old back buffer first.
    fn resize_swap_chain(&mut self, swap: &NativeHandle, width: u32, height: u32, format: ColorFormat) -> Result<()>;

    /// Present the swap chain; `Error::DeviceLost` on device removal
    fn present(&mut self, swap: &NativeHandle) -> Result<()>;

    // --- screen duplication ---

    /// Open a screen-duplication session on a monitor; returns the session
    /// plus the output dimensions and format
    fn create_duplicator(&mut self, monitor: u32) -> Result<(NativeHandle, u32, u32, ColorFormat)>;

    /// Copy the next duplicated frame into `target` if one is available.
    /// Returns `false` when no new frame arrived within the poll interval.
    fn duplicate_frame(&mut self, duplicator: &NativeHandle, target: &NativeHandle) -> Result<bool>;

    // --- immediate-context binding and drawing ---

    fn bind_render_target(&mut self, color: Option<&NativeHandle>, depth: Option<&NativeHandle>) -> Result<()>;
    fn clear_render_target(&mut self, color_view: &NativeHandle, rgba: [f32; 4]) -> Result<()>;
    fn clear_depth_stencil(&mut self, view: &NativeHandle, depth: Option<f32>, stencil: Option<u8>) -> Result<()>;

    /// Bind the ordered per-attribute vertex buffer list; `None` entries are
    /// null placeholder slots with zero stride
    fn bind_vertex_buffers(&mut self, buffers: &[Option<&NativeHandle>], strides: &[u32]) -> Result<()>;
    fn bind_index_buffer(&mut self, buffer: &NativeHandle, index_type: IndexType) -> Result<()>;
    fn bind_vertex_shader(
        &mut self,
        shader: &NativeHandle,
        layout: &NativeHandle,
        constants: Option<&NativeHandle>,
    ) -> Result<()>;
    fn bind_pixel_shader(&mut self, shader: &NativeHandle, constants: Option<&NativeHandle>) -> Result<()>;
    fn bind_texture(&mut self, slot: u32, view: Option<&NativeHandle>) -> Result<()>;
    fn bind_samplers(&mut self, samplers: &[Option<&NativeHandle>]) -> Result<()>;
    fn bind_blend_state(&mut self, state: &NativeHandle) -> Result<()>;
    fn bind_raster_state(&mut self, state: &NativeHandle) -> Result<()>;
    fn bind_depth_stencil_state(&mut self, state: &NativeHandle) -> Result<()>;
    fn set_viewport(&mut self, rect: Rect) -> Result<()>;

    /// Issue the draw call; `Error::DeviceLost` on device removal
    fn draw(&mut self, topology: Topology, start_vertex: u32, count: u32, indexed: bool) -> Result<()>;
}
