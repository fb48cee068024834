//! Device core: resource registry, binding slots, and draw resolution
//!
//! The device owns the native backend and every resource in a slot arena.
//! Binding calls only mutate bookkeeping; `draw` resolves the accumulated
//! dirty state against the native context in a fixed order, so redundant
//! binding calls between draws cost nothing at the native boundary.

use glam::Mat4;
use slotmap::SlotMap;

use crate::device::state::{
    BlendFactor, BlendState, CompareFunc, CullMode, DepthStencilState, RasterState, StatePool,
    StencilFace, StencilOp, Topology,
};
use crate::device::{ClearFlags, Rect};
use crate::error::{Error, Result};
use crate::format::{ColorFormat, DepthStencilFormat};
use crate::native::{MappedSurface, NativeDevice, NativeHandle};
use crate::resource::{
    DepthStencilBuffer, DepthStencilHandle, Duplicator, DuplicatorHandle, IndexBuffer, IndexBufferHandle,
    IndexData, ParamValue, PixelShader, PixelShaderDesc, PixelShaderHandle, Resource, ResourceKey,
    SamplerDesc, SamplerHandle, SamplerState, ShaderSampler, StageSurface, StageSurfaceHandle, SwapChain,
    SwapChainHandle, SwapChainInit, Texture2d, TextureBacking, TextureDesc, TextureFlags, TextureHandle,
    VertexBuffer, VertexBufferHandle, VertexData, VertexShader, VertexShaderDesc, VertexShaderHandle,
};
use crate::{gfx_debug, gfx_info, gfx_warn};

/// Texture/sampler binding slots exposed to pixel shaders
pub const MAX_TEXTURE_SLOTS: usize = 8;

const SOURCE: &str = "nebula::device";

// ===== REGISTRY LOOKUP =====

/// Typed lookup pair into the resource arena. Associated functions (rather
/// than `&self` methods) so callers can split-borrow the arena and the
/// native backend in one statement.
macro_rules! registry_lookup {
    ($fn_ref:ident, $handle:ty, $variant:ident, $ty:ty, $what:literal) => {
        fn $fn_ref(resources: &SlotMap<ResourceKey, Resource>, handle: $handle) -> Result<&$ty> {
            match resources.get(handle.into()) {
                Some(Resource::$variant(res)) => Ok(res),
                _ => Err(Error::InvalidResource(concat!("stale ", $what, " handle").to_string())),
            }
        }
    };
    ($fn_ref:ident, $fn_mut:ident, $handle:ty, $variant:ident, $ty:ty, $what:literal) => {
        registry_lookup!($fn_ref, $handle, $variant, $ty, $what);

        fn $fn_mut(resources: &mut SlotMap<ResourceKey, Resource>, handle: $handle) -> Result<&mut $ty> {
            match resources.get_mut(handle.into()) {
                Some(Resource::$variant(res)) => Ok(res),
                _ => Err(Error::InvalidResource(concat!("stale ", $what, " handle").to_string())),
            }
        }
    };
}

// ===== THE DEVICE =====

/// The graphics device
pub struct Device {
    native: Box<dyn NativeDevice>,
    resources: SlotMap<ResourceKey, Resource>,

    // deduplicated native pipeline-state objects
    blend_pool: StatePool<BlendState>,
    raster_pool: StatePool<RasterState>,
    zstencil_pool: StatePool<DepthStencilState>,

    // logical pipeline state, flushed to the native context on draw
    blend: BlendState,
    raster: RasterState,
    zstencil: DepthStencilState,
    blend_dirty: bool,
    raster_dirty: bool,
    zstencil_dirty: bool,

    // current bindings
    cur_vertex_buffer: Option<VertexBufferHandle>,
    cur_index_buffer: Option<IndexBufferHandle>,
    cur_vertex_shader: Option<VertexShaderHandle>,
    cur_pixel_shader: Option<PixelShaderHandle>,
    cur_render_target: Option<TextureHandle>,
    cur_render_face: u32,
    cur_zstencil: Option<DepthStencilHandle>,
    cur_swap_chain: Option<SwapChainHandle>,
    cur_textures: [Option<TextureHandle>; MAX_TEXTURE_SLOTS],
    cur_samplers: [Option<SamplerHandle>; MAX_TEXTURE_SLOTS],

    vertex_bindings_dirty: bool,
    shaders_dirty: bool,
    textures_dirty: bool,
    samplers_dirty: bool,
    render_target_dirty: bool,
    viewport_dirty: bool,

    // transform state
    matrix_stack: Vec<Mat4>,
    projection: Mat4,
    viewport: Rect,

    device_lost: bool,
}

impl Device {
    /// Wrap a native backend. The backend is created (adapter selection,
    /// context setup) before it reaches the abstraction layer.
    pub fn new(native: Box<dyn NativeDevice>) -> Self {
        gfx_info!(SOURCE, "graphics device initialized: {}", native.description());
        Self {
            native,
            resources: SlotMap::with_key(),
            blend_pool: StatePool::new(),
            raster_pool: StatePool::new(),
            zstencil_pool: StatePool::new(),
            blend: BlendState::default(),
            raster: RasterState::default(),
            zstencil: DepthStencilState::default(),
            blend_dirty: true,
            raster_dirty: true,
            zstencil_dirty: true,
            cur_vertex_buffer: None,
            cur_index_buffer: None,
            cur_vertex_shader: None,
            cur_pixel_shader: None,
            cur_render_target: None,
            cur_render_face: 0,
            cur_zstencil: None,
            cur_swap_chain: None,
            cur_textures: [None; MAX_TEXTURE_SLOTS],
            cur_samplers: [None; MAX_TEXTURE_SLOTS],
            vertex_bindings_dirty: true,
            shaders_dirty: true,
            textures_dirty: true,
            samplers_dirty: true,
            render_target_dirty: true,
            viewport_dirty: true,
            matrix_stack: vec![Mat4::IDENTITY],
            projection: Mat4::IDENTITY,
            viewport: Rect::default(),
            device_lost: false,
        }
    }

    /// Whether a present or draw has reported device loss. Rendering calls
    /// fail until [`rebuild_device`](Self::rebuild_device) succeeds.
    pub fn is_lost(&self) -> bool {
        self.device_lost
    }

    // lookups (split-borrow friendly)
    registry_lookup!(vb_ref, vb_mut, VertexBufferHandle, VertexBuffer, VertexBuffer, "vertex buffer");
    registry_lookup!(ib_ref, ib_mut, IndexBufferHandle, IndexBuffer, IndexBuffer, "index buffer");
    registry_lookup!(tex_ref, tex_mut, TextureHandle, Texture2d, Texture2d, "texture");
    registry_lookup!(zs_ref, DepthStencilHandle, DepthStencil, DepthStencilBuffer, "depth/stencil");
    registry_lookup!(stage_ref, StageSurfaceHandle, StageSurface, StageSurface, "stage surface");
    registry_lookup!(sampler_ref, SamplerHandle, Sampler, SamplerState, "sampler");
    registry_lookup!(vs_ref, vs_mut, VertexShaderHandle, VertexShader, VertexShader, "vertex shader");
    registry_lookup!(ps_ref, ps_mut, PixelShaderHandle, PixelShader, PixelShader, "pixel shader");
    registry_lookup!(swap_ref, swap_mut, SwapChainHandle, SwapChain, SwapChain, "swap chain");
    registry_lookup!(dup_ref, dup_mut, DuplicatorHandle, Duplicator, Duplicator, "duplicator");

    // ===== RESOURCE FACTORY =====

    pub fn create_vertex_buffer(&mut self, data: VertexData, dynamic: bool) -> Result<VertexBufferHandle> {
        let vb = VertexBuffer::new(self.native.as_mut(), data, dynamic)?;
        Ok(VertexBufferHandle(self.resources.insert(Resource::VertexBuffer(vb))))
    }

    pub fn create_index_buffer(&mut self, data: IndexData, dynamic: bool) -> Result<IndexBufferHandle> {
        let ib = IndexBuffer::new(self.native.as_mut(), data, dynamic)?;
        Ok(IndexBufferHandle(self.resources.insert(Resource::IndexBuffer(ib))))
    }

    pub fn create_texture_2d(&mut self, desc: TextureDesc, data: Vec<Vec<u8>>) -> Result<TextureHandle> {
        let tex = Texture2d::new(self.native.as_mut(), desc, data)?;
        Ok(TextureHandle(self.resources.insert(Resource::Texture2d(tex))))
    }

    /// Open a texture shared by another device/process by OS handle
    pub fn open_shared_texture(&mut self, handle: u32) -> Result<TextureHandle> {
        let tex = Texture2d::open_shared(self.native.as_mut(), handle)?;
        Ok(TextureHandle(self.resources.insert(Resource::Texture2d(tex))))
    }

    pub fn create_depth_stencil(
        &mut self,
        width: u32,
        height: u32,
        format: DepthStencilFormat,
    ) -> Result<DepthStencilHandle> {
        let zs = DepthStencilBuffer::new(self.native.as_mut(), width, height, format)?;
        Ok(DepthStencilHandle(self.resources.insert(Resource::DepthStencil(zs))))
    }

    pub fn create_stage_surface(
        &mut self,
        width: u32,
        height: u32,
        format: ColorFormat,
    ) -> Result<StageSurfaceHandle> {
        let surface = StageSurface::new(self.native.as_mut(), width, height, format)?;
        Ok(StageSurfaceHandle(self.resources.insert(Resource::StageSurface(surface))))
    }

    pub fn create_sampler(&mut self, desc: SamplerDesc) -> Result<SamplerHandle> {
        let sampler = SamplerState::new(self.native.as_mut(), desc)?;
        Ok(SamplerHandle(self.resources.insert(Resource::Sampler(sampler))))
    }

    pub fn create_vertex_shader(&mut self, desc: VertexShaderDesc) -> Result<VertexShaderHandle> {
        let shader = VertexShader::new(self.native.as_mut(), desc)?;
        Ok(VertexShaderHandle(self.resources.insert(Resource::VertexShader(shader))))
    }

    /// Create a pixel shader. Its declared samplers become device-owned
    /// sampler resources destroyed together with the shader.
    pub fn create_pixel_shader(&mut self, desc: PixelShaderDesc) -> Result<PixelShaderHandle> {
        let mut samplers = Vec::with_capacity(desc.samplers.len());
        for binding in &desc.samplers {
            let state = SamplerState::new(self.native.as_mut(), binding.desc)?;
            samplers.push(ShaderSampler {
                name: binding.name.clone(),
                sampler: SamplerHandle(self.resources.insert(Resource::Sampler(state))),
            });
        }
        let shader = PixelShader::new(self.native.as_mut(), desc, samplers)?;
        Ok(PixelShaderHandle(self.resources.insert(Resource::PixelShader(shader))))
    }

    /// Create a window swap chain. Its back buffer (and depth buffer, when
    /// requested) are registered textures owned by the swap chain.
    pub fn create_swap_chain(&mut self, init: SwapChainInit) -> Result<SwapChainHandle> {
        let native_swap = self.native.create_swap_chain(&init)?;
        let target_set = self.native.swap_chain_target(&native_swap, &init)?;

        let target_desc = TextureDesc {
            width: init.width,
            height: init.height,
            format: init.format,
            levels: 1,
            flags: TextureFlags::RENDER_TARGET,
        };
        let target = TextureHandle(self.resources.insert(Resource::Texture2d(
            Texture2d::from_owned_natives(target_desc, target_set, TextureBacking::SwapChain),
        )));

        let zstencil = if init.depth_format != DepthStencilFormat::None {
            let zs = DepthStencilBuffer::new(self.native.as_mut(), init.width, init.height, init.depth_format)?;
            Some(DepthStencilHandle(self.resources.insert(Resource::DepthStencil(zs))))
        } else {
            None
        };

        gfx_debug!(SOURCE, "swap chain created: {}x{} {:?}", init.width, init.height, init.format);
        let swap = SwapChain::from_parts(init, native_swap, target, zstencil);
        Ok(SwapChainHandle(self.resources.insert(Resource::SwapChain(swap))))
    }

    /// Open a screen-duplication session on a monitor
    pub fn create_duplicator(&mut self, monitor: u32) -> Result<DuplicatorHandle> {
        let (session, width, height, format) = self.native.create_duplicator(monitor)?;
        gfx_debug!(SOURCE, "duplicator opened on monitor {}: {}x{} {:?}", monitor, width, height, format);
        let dup = Duplicator::from_parts(monitor, width, height, format, session);
        Ok(DuplicatorHandle(self.resources.insert(Resource::Duplicator(dup))))
    }

    /// Destroy a resource. Sub-resources owned by it (a swap chain's back
    /// and depth buffers, a duplicator's output texture, a pixel shader's
    /// samplers) are destroyed with it, and any binding slot referencing a
    /// destroyed resource is cleared.
    pub fn destroy(&mut self, handle: impl Into<ResourceKey>) {
        let Some(removed) = self.resources.remove(handle.into()) else {
            return;
        };
        match &removed {
            Resource::SwapChain(swap) => {
                self.resources.remove(swap.target().into());
                if let Some(zs) = swap.zstencil() {
                    self.resources.remove(zs.into());
                }
            }
            Resource::Duplicator(dup) => {
                if let Some(output) = dup.output() {
                    self.resources.remove(output.into());
                }
            }
            Resource::PixelShader(shader) => {
                for binding in shader.samplers() {
                    self.resources.remove(binding.sampler.into());
                }
            }
            _ => {}
        }
        self.prune_dead_bindings();
    }

    /// Live resource count (owned sub-resources included)
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    fn prune_dead_bindings(&mut self) {
        let live = |key: ResourceKey| self.resources.contains_key(key);

        if self.cur_vertex_buffer.is_some_and(|h| !live(h.into())) {
            self.cur_vertex_buffer = None;
            self.vertex_bindings_dirty = true;
        }
        if self.cur_index_buffer.is_some_and(|h| !live(h.into())) {
            self.cur_index_buffer = None;
            self.vertex_bindings_dirty = true;
        }
        if self.cur_vertex_shader.is_some_and(|h| !live(h.into())) {
            self.cur_vertex_shader = None;
            self.shaders_dirty = true;
        }
        if self.cur_pixel_shader.is_some_and(|h| !live(h.into())) {
            self.cur_pixel_shader = None;
            self.shaders_dirty = true;
        }
        if self.cur_render_target.is_some_and(|h| !live(h.into())) {
            self.cur_render_target = None;
            self.render_target_dirty = true;
        }
        if self.cur_zstencil.is_some_and(|h| !live(h.into())) {
            self.cur_zstencil = None;
            self.render_target_dirty = true;
        }
        if self.cur_swap_chain.is_some_and(|h| !live(h.into())) {
            self.cur_swap_chain = None;
        }
        for slot in &mut self.cur_textures {
            if slot.is_some_and(|h| !self.resources.contains_key(h.into())) {
                *slot = None;
                self.textures_dirty = true;
            }
        }
        for slot in &mut self.cur_samplers {
            if slot.is_some_and(|h| !self.resources.contains_key(h.into())) {
                *slot = None;
                self.samplers_dirty = true;
            }
        }
    }

    // ===== RESOURCE ACCESS =====

    pub fn vertex_buffer(&self, handle: VertexBufferHandle) -> Result<&VertexBuffer> {
        Self::vb_ref(&self.resources, handle)
    }

    pub fn index_buffer(&self, handle: IndexBufferHandle) -> Result<&IndexBuffer> {
        Self::ib_ref(&self.resources, handle)
    }

    pub fn texture(&self, handle: TextureHandle) -> Result<&Texture2d> {
        Self::tex_ref(&self.resources, handle)
    }

    pub fn depth_stencil(&self, handle: DepthStencilHandle) -> Result<&DepthStencilBuffer> {
        Self::zs_ref(&self.resources, handle)
    }

    pub fn stage_surface(&self, handle: StageSurfaceHandle) -> Result<&StageSurface> {
        Self::stage_ref(&self.resources, handle)
    }

    pub fn sampler(&self, handle: SamplerHandle) -> Result<&SamplerState> {
        Self::sampler_ref(&self.resources, handle)
    }

    pub fn vertex_shader(&self, handle: VertexShaderHandle) -> Result<&VertexShader> {
        Self::vs_ref(&self.resources, handle)
    }

    pub fn pixel_shader(&self, handle: PixelShaderHandle) -> Result<&PixelShader> {
        Self::ps_ref(&self.resources, handle)
    }

    pub fn swap_chain(&self, handle: SwapChainHandle) -> Result<&SwapChain> {
        Self::swap_ref(&self.resources, handle)
    }

    pub fn duplicator(&self, handle: DuplicatorHandle) -> Result<&Duplicator> {
        Self::dup_ref(&self.resources, handle)
    }

    // ===== DATA UPDATES =====

    /// Replace the contents of a dynamic vertex buffer (vertex count must
    /// be unchanged)
    pub fn update_vertex_buffer(&mut self, handle: VertexBufferHandle, data: VertexData) -> Result<()> {
        Self::vb_mut(&mut self.resources, handle)?.update(self.native.as_mut(), data)
    }

    /// Replace the contents of a dynamic index buffer (index count must be
    /// unchanged)
    pub fn update_index_buffer(&mut self, handle: IndexBufferHandle, data: IndexData) -> Result<()> {
        Self::ib_mut(&mut self.resources, handle)?.update(self.native.as_mut(), data)
    }

    /// Rewrite level 0 of a dynamic texture with tightly packed pixel rows.
    /// Only textures created with [`TextureFlags::DYNAMIC`] accept this.
    pub fn update_texture(&mut self, handle: TextureHandle, data: Vec<u8>) -> Result<()> {
        Self::tex_mut(&mut self.resources, handle)?.update(self.native.as_mut(), data)
    }

    /// Queue a GPU copy of a whole texture into a staging surface for CPU
    /// readback. Dimensions and format must match.
    pub fn stage_texture(&mut self, dst: StageSurfaceHandle, src: TextureHandle) -> Result<()> {
        let stage = Self::stage_ref(&self.resources, dst)?;
        let texture = Self::tex_ref(&self.resources, src)?;
        if stage.width() != texture.width()
            || stage.height() != texture.height()
            || stage.format() != texture.format()
        {
            return Err(Error::InvalidResource(format!(
                "stage surface {}x{} {:?} does not match texture {}x{} {:?}",
                stage.width(),
                stage.height(),
                stage.format(),
                texture.width(),
                texture.height(),
                texture.format()
            )));
        }
        self.native.stage_texture(stage.native()?, &texture.natives()?.texture)
    }

    /// Map a staged surface and copy its contents out
    pub fn map_stage_surface(&mut self, handle: StageSurfaceHandle) -> Result<MappedSurface> {
        Self::stage_ref(&self.resources, handle)?.map(self.native.as_mut())
    }

    /// GPU copy of a texture subregion. `width`/`height` of 0 copy the full
    /// source extent from the given origin.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_texture_region(
        &mut self,
        dst: TextureHandle,
        dst_x: u32,
        dst_y: u32,
        src: TextureHandle,
        src_x: u32,
        src_y: u32,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let dst_tex = Self::tex_ref(&self.resources, dst)?;
        let src_tex = Self::tex_ref(&self.resources, src)?;
        if dst_tex.format() != src_tex.format() {
            return Err(Error::InvalidResource(format!(
                "cannot copy between {:?} and {:?} textures",
                src_tex.format(),
                dst_tex.format()
            )));
        }
        let copy_w = if width > 0 { width } else { src_tex.width().saturating_sub(src_x) };
        let copy_h = if height > 0 { height } else { src_tex.height().saturating_sub(src_y) };
        if src_x + copy_w > src_tex.width()
            || src_y + copy_h > src_tex.height()
            || dst_x + copy_w > dst_tex.width()
            || dst_y + copy_h > dst_tex.height()
        {
            return Err(Error::InvalidResource("texture copy region out of bounds".to_string()));
        }
        self.native.copy_texture_region(
            &dst_tex.natives()?.texture,
            dst_x,
            dst_y,
            &src_tex.natives()?.texture,
            src_x,
            src_y,
            copy_w,
            copy_h,
        )
    }

    /// Whole-texture copy convenience
    pub fn copy_texture(&mut self, dst: TextureHandle, src: TextureHandle) -> Result<()> {
        self.copy_texture_region(dst, 0, 0, src, 0, 0, 0, 0)
    }

    // ===== SHADER PARAMETERS =====

    pub fn vertex_shader_param(&self, shader: VertexShaderHandle, name: &str) -> Result<Option<usize>> {
        Ok(Self::vs_ref(&self.resources, shader)?.param_index(name))
    }

    pub fn pixel_shader_param(&self, shader: PixelShaderHandle, name: &str) -> Result<Option<usize>> {
        Ok(Self::ps_ref(&self.resources, shader)?.param_index(name))
    }

    /// Write a vertex shader parameter; the change is uploaded on the next
    /// draw that uses the shader
    pub fn set_vertex_shader_param(
        &mut self,
        shader: VertexShaderHandle,
        index: usize,
        value: &ParamValue,
    ) -> Result<()> {
        Self::vs_mut(&mut self.resources, shader)?.set_param(index, value)
    }

    pub fn set_pixel_shader_param(
        &mut self,
        shader: PixelShaderHandle,
        index: usize,
        value: &ParamValue,
    ) -> Result<()> {
        Self::ps_mut(&mut self.resources, shader)?.set_param(index, value)
    }

    pub fn reset_vertex_shader_param(&mut self, shader: VertexShaderHandle, index: usize) -> Result<()> {
        Self::vs_mut(&mut self.resources, shader)?.reset_to_default(index)
    }

    pub fn reset_pixel_shader_param(&mut self, shader: PixelShaderHandle, index: usize) -> Result<()> {
        Self::ps_mut(&mut self.resources, shader)?.reset_to_default(index)
    }

    /// Pair a texture-typed pixel shader parameter with a sampler; both
    /// bind to the parameter's texture unit at draw
    pub fn set_pixel_shader_sampler(
        &mut self,
        shader: PixelShaderHandle,
        index: usize,
        sampler: SamplerHandle,
    ) -> Result<()> {
        Self::ps_mut(&mut self.resources, shader)?.set_param_sampler(index, sampler)
    }

    // ===== BINDING =====

    pub fn load_vertex_buffer(&mut self, buffer: Option<VertexBufferHandle>) {
        if self.cur_vertex_buffer != buffer {
            self.cur_vertex_buffer = buffer;
            self.vertex_bindings_dirty = true;
        }
    }

    pub fn load_index_buffer(&mut self, buffer: Option<IndexBufferHandle>) {
        if self.cur_index_buffer != buffer {
            self.cur_index_buffer = buffer;
            self.vertex_bindings_dirty = true;
        }
    }

    pub fn load_vertex_shader(&mut self, shader: Option<VertexShaderHandle>) {
        if self.cur_vertex_shader != shader {
            self.cur_vertex_shader = shader;
            self.shaders_dirty = true;
            // the input layout changed, so the buffer list must be rebuilt
            self.vertex_bindings_dirty = true;
        }
    }

    /// Load a pixel shader; its declared samplers occupy the first sampler
    /// slots
    pub fn load_pixel_shader(&mut self, shader: Option<PixelShaderHandle>) -> Result<()> {
        if self.cur_pixel_shader == shader {
            return Ok(());
        }
        self.cur_pixel_shader = shader;
        self.shaders_dirty = true;

        if let Some(handle) = shader {
            let ps = Self::ps_ref(&self.resources, handle)?;
            for (slot, binding) in ps.samplers().iter().enumerate().take(MAX_TEXTURE_SLOTS) {
                if self.cur_samplers[slot] != Some(binding.sampler) {
                    self.cur_samplers[slot] = Some(binding.sampler);
                    self.samplers_dirty = true;
                }
            }
        }
        Ok(())
    }

    pub fn load_texture(&mut self, slot: u32, texture: Option<TextureHandle>) -> Result<()> {
        let slot = slot as usize;
        if slot >= MAX_TEXTURE_SLOTS {
            return Err(Error::InvalidResource(format!("texture slot {} out of range", slot)));
        }
        if self.cur_textures[slot] != texture {
            self.cur_textures[slot] = texture;
            self.textures_dirty = true;
        }
        Ok(())
    }

    pub fn load_sampler(&mut self, slot: u32, sampler: Option<SamplerHandle>) -> Result<()> {
        let slot = slot as usize;
        if slot >= MAX_TEXTURE_SLOTS {
            return Err(Error::InvalidResource(format!("sampler slot {} out of range", slot)));
        }
        if self.cur_samplers[slot] != sampler {
            self.cur_samplers[slot] = sampler;
            self.samplers_dirty = true;
        }
        Ok(())
    }

    /// Bind a render target (`None` unbinds). The texture must have been
    /// created with `TextureFlags::RENDER_TARGET`.
    pub fn set_render_target(
        &mut self,
        target: Option<TextureHandle>,
        zstencil: Option<DepthStencilHandle>,
    ) -> Result<()> {
        self.set_cube_render_target(target, 0, zstencil)
    }

    /// Bind one face of a cubemap render target
    pub fn set_cube_render_target(
        &mut self,
        target: Option<TextureHandle>,
        face: u32,
        zstencil: Option<DepthStencilHandle>,
    ) -> Result<()> {
        if let Some(handle) = target {
            let tex = Self::tex_ref(&self.resources, handle)?;
            if tex.desc().render_target_count() <= face {
                return Err(Error::InvalidResource(format!(
                    "texture has no render-target view for face {}",
                    face
                )));
            }
        }
        if self.cur_render_target != target || self.cur_render_face != face || self.cur_zstencil != zstencil {
            self.cur_render_target = target;
            self.cur_render_face = face;
            self.cur_zstencil = zstencil;
            self.render_target_dirty = true;
        }
        Ok(())
    }

    /// Make a swap chain current: presents go to it and its back/depth
    /// buffers become the render target
    pub fn load_swap_chain(&mut self, swap: Option<SwapChainHandle>) -> Result<()> {
        self.cur_swap_chain = swap;
        match swap {
            Some(handle) => {
                let sc = Self::swap_ref(&self.resources, handle)?;
                let (target, zstencil) = (sc.target(), sc.zstencil());
                self.set_render_target(Some(target), zstencil)
            }
            None => self.set_render_target(None, None),
        }
    }

    pub fn render_target(&self) -> Option<TextureHandle> {
        self.cur_render_target
    }

    // ===== PIPELINE STATE =====

    fn set_blend(&mut self, blend: BlendState) {
        if self.blend != blend {
            self.blend = blend;
            self.blend_dirty = true;
        }
    }

    fn set_zstencil_state(&mut self, zstencil: DepthStencilState) {
        if self.zstencil != zstencil {
            self.zstencil = zstencil;
            self.zstencil_dirty = true;
        }
    }

    fn set_raster(&mut self, raster: RasterState) {
        if self.raster != raster {
            self.raster = raster;
            self.raster_dirty = true;
        }
    }

    pub fn enable_blending(&mut self, enable: bool) {
        let mut blend = self.blend;
        blend.blend_enabled = enable;
        self.set_blend(blend);
    }

    /// Set color and alpha blend factors together
    pub fn set_blend_function(&mut self, src: BlendFactor, dst: BlendFactor) {
        let mut blend = self.blend;
        blend.src_factor_c = src;
        blend.dst_factor_c = dst;
        blend.src_factor_a = src;
        blend.dst_factor_a = dst;
        self.set_blend(blend);
    }

    pub fn set_blend_function_separate(
        &mut self,
        src_c: BlendFactor,
        dst_c: BlendFactor,
        src_a: BlendFactor,
        dst_a: BlendFactor,
    ) {
        let mut blend = self.blend;
        blend.src_factor_c = src_c;
        blend.dst_factor_c = dst_c;
        blend.src_factor_a = src_a;
        blend.dst_factor_a = dst_a;
        self.set_blend(blend);
    }

    /// Per-channel color write mask
    pub fn set_color_write_mask(&mut self, red: bool, green: bool, blue: bool, alpha: bool) {
        let mut blend = self.blend;
        blend.red_enabled = red;
        blend.green_enabled = green;
        blend.blue_enabled = blue;
        blend.alpha_enabled = alpha;
        self.set_blend(blend);
    }

    pub fn enable_depth_test(&mut self, enable: bool) {
        let mut zstencil = self.zstencil;
        zstencil.depth_enabled = enable;
        self.set_zstencil_state(zstencil);
    }

    pub fn enable_depth_write(&mut self, enable: bool) {
        let mut zstencil = self.zstencil;
        zstencil.depth_write_enabled = enable;
        self.set_zstencil_state(zstencil);
    }

    pub fn set_depth_function(&mut self, func: CompareFunc) {
        let mut zstencil = self.zstencil;
        zstencil.depth_func = func;
        self.set_zstencil_state(zstencil);
    }

    pub fn enable_stencil_test(&mut self, enable: bool) {
        let mut zstencil = self.zstencil;
        zstencil.stencil_enabled = enable;
        self.set_zstencil_state(zstencil);
    }

    pub fn enable_stencil_write(&mut self, enable: bool) {
        let mut zstencil = self.zstencil;
        zstencil.stencil_write_enabled = enable;
        self.set_zstencil_state(zstencil);
    }

    pub fn set_stencil_function(&mut self, face: StencilFace, test: CompareFunc) {
        let mut zstencil = self.zstencil;
        if face != StencilFace::Back {
            zstencil.stencil_front.test = test;
        }
        if face != StencilFace::Front {
            zstencil.stencil_back.test = test;
        }
        self.set_zstencil_state(zstencil);
    }

    pub fn set_stencil_op(&mut self, face: StencilFace, fail: StencilOp, zfail: StencilOp, zpass: StencilOp) {
        let mut zstencil = self.zstencil;
        if face != StencilFace::Back {
            zstencil.stencil_front.fail = fail;
            zstencil.stencil_front.zfail = zfail;
            zstencil.stencil_front.zpass = zpass;
        }
        if face != StencilFace::Front {
            zstencil.stencil_back.fail = fail;
            zstencil.stencil_back.zfail = zfail;
            zstencil.stencil_back.zpass = zpass;
        }
        self.set_zstencil_state(zstencil);
    }

    pub fn set_cull_mode(&mut self, mode: CullMode) {
        let mut raster = self.raster;
        raster.cull_mode = mode;
        self.set_raster(raster);
    }

    pub fn enable_scissor(&mut self, enable: bool) {
        let mut raster = self.raster;
        raster.scissor_enabled = enable;
        self.set_raster(raster);
    }

    pub fn set_viewport(&mut self, viewport: Rect) {
        if self.viewport != viewport {
            self.viewport = viewport;
            self.viewport_dirty = true;
        }
    }

    pub fn viewport(&self) -> Rect {
        self.viewport
    }

    /// Distinct native state objects created so far, per category
    /// (blend, depth/stencil, rasterizer)
    #[cfg(test)]
    pub(crate) fn state_pool_sizes(&self) -> (usize, usize, usize) {
        (self.blend_pool.len(), self.zstencil_pool.len(), self.raster_pool.len())
    }

    // ===== TRANSFORM STATE =====

    pub fn matrix_push(&mut self) {
        let top = self.matrix_top();
        self.matrix_stack.push(top);
    }

    pub fn matrix_pop(&mut self) {
        if self.matrix_stack.len() > 1 {
            self.matrix_stack.pop();
        } else {
            gfx_warn!(SOURCE, "matrix_pop on an empty stack ignored");
        }
    }

    pub fn matrix_identity(&mut self) {
        self.matrix_set(Mat4::IDENTITY);
    }

    pub fn matrix_set(&mut self, matrix: Mat4) {
        if let Some(top) = self.matrix_stack.last_mut() {
            *top = matrix;
        }
    }

    /// Pre-multiply the current matrix
    pub fn matrix_mul(&mut self, matrix: Mat4) {
        if let Some(top) = self.matrix_stack.last_mut() {
            *top = matrix * *top;
        }
    }

    pub fn matrix_top(&self) -> Mat4 {
        self.matrix_stack.last().copied().unwrap_or(Mat4::IDENTITY)
    }

    pub fn set_projection(&mut self, projection: Mat4) {
        self.projection = projection;
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    // ===== CLEARS =====

    /// Clear aspects of the current render target and depth/stencil buffer
    pub fn clear(&mut self, flags: ClearFlags, color: [f32; 4], depth: f32, stencil: u8) -> Result<()> {
        if flags.contains(ClearFlags::COLOR) {
            if let Some(handle) = self.cur_render_target {
                let view = Self::tex_ref(&self.resources, handle)?.render_target(self.cur_render_face)?;
                self.native.clear_render_target(view, color)?;
            }
        }
        let clear_depth = flags.contains(ClearFlags::DEPTH);
        let clear_stencil = flags.contains(ClearFlags::STENCIL);
        if clear_depth || clear_stencil {
            if let Some(handle) = self.cur_zstencil {
                let view = Self::zs_ref(&self.resources, handle)?.view()?;
                self.native.clear_depth_stencil(
                    view,
                    clear_depth.then_some(depth),
                    clear_stencil.then_some(stencil),
                )?;
            }
        }
        Ok(())
    }

    // ===== DRAW =====

    /// Submit a draw with the current bindings. `num` of 0 draws the whole
    /// bound index buffer (or vertex buffer for non-indexed draws).
    pub fn draw(&mut self, topology: Topology, start: u32, num: u32) -> Result<()> {
        if self.device_lost {
            return Err(Error::DeviceLost);
        }
        let vs_handle = self
            .cur_vertex_shader
            .ok_or_else(|| Error::InvalidResource("draw without a vertex shader loaded".to_string()))?;
        let vb_handle = self
            .cur_vertex_buffer
            .ok_or_else(|| Error::InvalidResource("draw without a vertex buffer loaded".to_string()))?;

        self.flush_render_target()?;
        self.flush_pipeline_states()?;
        self.flush_shaders(vs_handle)?;
        self.flush_vertex_bindings(vs_handle, vb_handle)?;
        self.flush_textures_and_samplers()?;

        if self.viewport_dirty {
            self.native.set_viewport(self.viewport)?;
            self.viewport_dirty = false;
        }

        let indexed = self.cur_index_buffer.is_some();
        let count = if num > 0 {
            num
        } else if let Some(ib) = self.cur_index_buffer {
            Self::ib_ref(&self.resources, ib)?.len() as u32
        } else {
            Self::vb_ref(&self.resources, vb_handle)?.len() as u32
        };

        match self.native.draw(topology, start, count, indexed) {
            Err(Error::DeviceLost) => {
                self.device_lost = true;
                Err(Error::DeviceLost)
            }
            other => other,
        }
    }

    fn flush_render_target(&mut self) -> Result<()> {
        if !self.render_target_dirty {
            return Ok(());
        }
        let color = match self.cur_render_target {
            Some(handle) => Some(Self::tex_ref(&self.resources, handle)?.render_target(self.cur_render_face)?),
            None => None,
        };
        let depth = match self.cur_zstencil {
            Some(handle) => Some(Self::zs_ref(&self.resources, handle)?.view()?),
            None => None,
        };
        self.native.bind_render_target(color, depth)?;
        self.render_target_dirty = false;
        Ok(())
    }

    fn flush_pipeline_states(&mut self) -> Result<()> {
        if self.raster_dirty {
            let native = self.native.as_mut();
            let idx = self.raster_pool.find_or_create(&self.raster, |d| native.create_raster_state(d))?;
            self.native.bind_raster_state(self.raster_pool.handle(idx))?;
            self.raster_dirty = false;
        }
        if self.zstencil_dirty {
            let native = self.native.as_mut();
            let idx = self
                .zstencil_pool
                .find_or_create(&self.zstencil, |d| native.create_depth_stencil_state(d))?;
            self.native.bind_depth_stencil_state(self.zstencil_pool.handle(idx))?;
            self.zstencil_dirty = false;
        }
        if self.blend_dirty {
            let native = self.native.as_mut();
            let idx = self.blend_pool.find_or_create(&self.blend, |d| native.create_blend_state(d))?;
            self.native.bind_blend_state(self.blend_pool.handle(idx))?;
            self.blend_dirty = false;
        }
        Ok(())
    }

    fn flush_shaders(&mut self, vs_handle: VertexShaderHandle) -> Result<()> {
        // built-in matrices feed the vertex shader's change detection like
        // any other parameter write
        let world = self.matrix_top();
        let view_proj = self.projection * world;
        {
            let vs = Self::vs_mut(&mut self.resources, vs_handle)?;
            vs.set_builtin_matrices(&world, &view_proj)?;
            vs.upload_params(self.native.as_mut())?;
        }

        if let Some(ps_handle) = self.cur_pixel_shader {
            // texture-typed parameters claim their assigned units
            let mut loads: Vec<(u32, Option<TextureHandle>, Option<SamplerHandle>)> = Vec::new();
            {
                let ps = Self::ps_ref(&self.resources, ps_handle)?;
                for param in ps.texture_params() {
                    if let Some(unit) = param.texture_unit {
                        if param.texture.is_some() || param.next_sampler.is_some() {
                            loads.push((unit, param.texture, param.next_sampler));
                        }
                    }
                }
            }
            for (unit, texture, sampler) in loads {
                if let Some(texture) = texture {
                    self.load_texture(unit, Some(texture))?;
                }
                if let Some(sampler) = sampler {
                    self.load_sampler(unit, Some(sampler))?;
                }
            }
            Self::ps_mut(&mut self.resources, ps_handle)?.upload_params(self.native.as_mut())?;
        }

        if self.shaders_dirty {
            {
                let vs = Self::vs_ref(&self.resources, vs_handle)?;
                let natives = vs.natives()?;
                self.native
                    .bind_vertex_shader(&natives.shader, &natives.input_layout, vs.constants())?;
            }
            if let Some(ps_handle) = self.cur_pixel_shader {
                let ps = Self::ps_ref(&self.resources, ps_handle)?;
                self.native.bind_pixel_shader(ps.native()?, ps.constants())?;
            }
            self.shaders_dirty = false;
        }
        Ok(())
    }

    fn flush_vertex_bindings(&mut self, vs_handle: VertexShaderHandle, vb_handle: VertexBufferHandle) -> Result<()> {
        if !self.vertex_bindings_dirty {
            return Ok(());
        }
        let expect = Self::vs_ref(&self.resources, vs_handle)?.expectation();
        {
            let vb = Self::vb_ref(&self.resources, vb_handle)?;
            let mut buffers = Vec::new();
            let mut strides = Vec::new();
            vb.buffer_list(&expect, &mut buffers, &mut strides)?;
            self.native.bind_vertex_buffers(&buffers, &strides)?;
        }
        if let Some(ib_handle) = self.cur_index_buffer {
            let ib = Self::ib_ref(&self.resources, ib_handle)?;
            self.native.bind_index_buffer(ib.native()?, ib.index_type())?;
        }
        self.vertex_bindings_dirty = false;
        Ok(())
    }

    fn flush_textures_and_samplers(&mut self) -> Result<()> {
        if self.textures_dirty {
            for slot in 0..MAX_TEXTURE_SLOTS {
                let view = match self.cur_textures[slot] {
                    Some(handle) => Some(Self::tex_ref(&self.resources, handle)?.shader_resource()?),
                    None => None,
                };
                self.native.bind_texture(slot as u32, view)?;
            }
            self.textures_dirty = false;
        }
        if self.samplers_dirty {
            let mut natives: Vec<Option<&NativeHandle>> = Vec::with_capacity(MAX_TEXTURE_SLOTS);
            for slot in 0..MAX_TEXTURE_SLOTS {
                natives.push(match self.cur_samplers[slot] {
                    Some(handle) => Some(Self::sampler_ref(&self.resources, handle)?.native()?),
                    None => None,
                });
            }
            self.native.bind_samplers(&natives)?;
            self.samplers_dirty = false;
        }
        Ok(())
    }

    // ===== PRESENT AND RESIZE =====

    /// Present the current swap chain. On device removal the device enters
    /// the lost state and only [`rebuild_device`](Self::rebuild_device) can clear it.
    pub fn present(&mut self) -> Result<()> {
        if self.device_lost {
            return Err(Error::DeviceLost);
        }
        let handle = self
            .cur_swap_chain
            .ok_or_else(|| Error::InvalidResource("present without a swap chain loaded".to_string()))?;
        let swap = Self::swap_ref(&self.resources, handle)?;
        match self.native.present(swap.native()?) {
            Err(Error::DeviceLost) => {
                self.device_lost = true;
                Err(Error::DeviceLost)
            }
            other => other,
        }
    }

    /// Resize a swap chain's buffers. The back buffer (and depth buffer)
    /// are re-derived; stale references to the old back buffer are the
    /// caller's to drop.
    pub fn resize_swap_chain(&mut self, handle: SwapChainHandle, width: u32, height: u32) -> Result<()> {
        let (target, zstencil, format, depth_format) = {
            let swap = Self::swap_ref(&self.resources, handle)?;
            (swap.target(), swap.zstencil(), swap.init().format, swap.init().depth_format)
        };

        // back-buffer views must be released before the native resize
        Self::tex_mut(&mut self.resources, target)?.replace_natives(None);
        {
            let swap = Self::swap_ref(&self.resources, handle)?;
            self.native.resize_swap_chain(swap.native()?, width, height, format)?;
        }
        Self::swap_mut(&mut self.resources, handle)?.set_size(width, height);

        let target_set = {
            let swap = Self::swap_ref(&self.resources, handle)?;
            self.native.swap_chain_target(swap.native()?, swap.init())?
        };
        let target_desc = TextureDesc {
            width,
            height,
            format,
            levels: 1,
            flags: TextureFlags::RENDER_TARGET,
        };
        if let Some(entry) = self.resources.get_mut(target.into()) {
            *entry = Resource::Texture2d(Texture2d::from_owned_natives(
                target_desc,
                target_set,
                TextureBacking::SwapChain,
            ));
        }

        if let Some(zstencil) = zstencil {
            let buffer = DepthStencilBuffer::new(self.native.as_mut(), width, height, depth_format)?;
            if let Some(entry) = self.resources.get_mut(zstencil.into()) {
                *entry = Resource::DepthStencil(buffer);
            }
        }

        // views bound from the old back buffer are gone
        self.render_target_dirty = true;
        Ok(())
    }

    // ===== SCREEN DUPLICATION =====

    /// Copy the next duplicated frame into the duplicator's output texture.
    /// Returns `false` when no new frame was available. The output texture
    /// is allocated on first use.
    pub fn acquire_duplicator_frame(&mut self, handle: DuplicatorHandle) -> Result<bool> {
        let (width, height, format, output) = {
            let dup = Self::dup_ref(&self.resources, handle)?;
            (dup.width(), dup.height(), dup.format(), dup.output())
        };
        let output = match output {
            Some(texture) => texture,
            None => {
                let desc = TextureDesc {
                    width,
                    height,
                    format,
                    levels: 1,
                    flags: TextureFlags::empty(),
                };
                let natives = self.native.create_texture_2d(&desc, &[])?;
                let texture = TextureHandle(self.resources.insert(Resource::Texture2d(
                    Texture2d::from_owned_natives(desc, natives, TextureBacking::Duplicator),
                )));
                Self::dup_mut(&mut self.resources, handle)?.set_output(texture);
                texture
            }
        };

        let dup = Self::dup_ref(&self.resources, handle)?;
        let target = Self::tex_ref(&self.resources, output)?;
        self.native.duplicate_frame(dup.session()?, &target.natives()?.texture)
    }

    // ===== DEVICE-LOSS RECOVERY =====

    /// Recover from device loss: reset the native device, then rebuild
    /// every registered resource from its CPU-retained description.
    ///
    /// Swap chains re-derive their back buffers after the generic pass.
    /// Duplication sessions cannot be restored and stay invalid until the
    /// caller recreates them. Pipeline-state pools are dropped and refill
    /// lazily on the next draws.
    pub fn rebuild_device(&mut self) -> Result<()> {
        gfx_info!(SOURCE, "rebuilding device after loss ({} resources)", self.resources.len());

        self.blend_pool.clear();
        self.raster_pool.clear();
        self.zstencil_pool.clear();

        self.native.reset()?;

        let keys: Vec<ResourceKey> = self.resources.keys().collect();
        let mut swap_chains: Vec<SwapChainHandle> = Vec::new();
        for key in keys {
            let Some(resource) = self.resources.get_mut(key) else {
                continue;
            };
            match resource {
                Resource::VertexBuffer(vb) => vb.rebuild(self.native.as_mut())?,
                Resource::IndexBuffer(ib) => ib.rebuild(self.native.as_mut())?,
                Resource::Texture2d(tex) => tex.rebuild(self.native.as_mut())?,
                Resource::DepthStencil(zs) => zs.rebuild(self.native.as_mut())?,
                Resource::StageSurface(surface) => surface.rebuild(self.native.as_mut())?,
                Resource::Sampler(sampler) => sampler.rebuild(self.native.as_mut())?,
                Resource::VertexShader(vs) => vs.rebuild(self.native.as_mut())?,
                Resource::PixelShader(ps) => ps.rebuild(self.native.as_mut())?,
                Resource::SwapChain(_) => swap_chains.push(SwapChainHandle(key)),
                Resource::Duplicator(dup) => {
                    gfx_warn!(SOURCE, "duplication session on monitor {} lost; recreate it", dup.monitor());
                    dup.invalidate();
                }
            }
        }

        for handle in swap_chains {
            self.rebuild_swap_chain(handle)?;
        }

        // every native binding is stale
        self.blend_dirty = true;
        self.raster_dirty = true;
        self.zstencil_dirty = true;
        self.vertex_bindings_dirty = true;
        self.shaders_dirty = true;
        self.textures_dirty = true;
        self.samplers_dirty = true;
        self.render_target_dirty = true;
        self.viewport_dirty = true;

        self.device_lost = false;
        gfx_info!(SOURCE, "device rebuild complete");
        Ok(())
    }

    fn rebuild_swap_chain(&mut self, handle: SwapChainHandle) -> Result<()> {
        let (init, target) = {
            let swap = Self::swap_mut(&mut self.resources, handle)?;
            swap.take_native();
            (swap.init().clone(), swap.target())
        };
        Self::tex_mut(&mut self.resources, target)?.replace_natives(None);

        let native_swap = self.native.create_swap_chain(&init)?;
        let target_set = self.native.swap_chain_target(&native_swap, &init)?;

        Self::swap_mut(&mut self.resources, handle)?.set_native(native_swap);
        Self::tex_mut(&mut self.resources, target)?.replace_natives(Some(target_set));
        Ok(())
    }
}
