//! Mock native backend for headless unit tests
//!
//! Implements [`NativeDevice`] with no GPU: every created object is a
//! [`MockObject`] carrying a unique id and the device generation it was
//! created under. Binding calls reject objects from an older generation, so
//! tests catch any resource that survives a device reset without being
//! rebuilt. A shared [`MockState`] tracker records creation counts, binding
//! activity, and a tiny color store that lets clear → stage → map readback
//! scenarios flow real bytes.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::device::state::{BlendState, DepthStencilState, RasterState, Topology};
use crate::device::Rect;
use crate::error::{Error, Result};
use crate::format::{ColorFormat, DepthStencilFormat};
use crate::native::{
    BufferDesc, MappedSurface, NativeDepthStencil, NativeDevice, NativeHandle, NativeObject,
    NativeTextureSet, NativeVertexShader,
};
use crate::resource::index_buffer::IndexType;
use crate::resource::sampler::SamplerDesc;
use crate::resource::shader::VertexAttribute;
use crate::resource::swap_chain::SwapChainInit;
use crate::resource::texture::{TextureDesc, TextureFlags};

// ===== MOCK OBJECTS =====

/// A fake native object: an id plus the generation it belongs to
pub(crate) struct MockObject {
    pub id: u64,
    pub generation: u64,
}

impl NativeObject for MockObject {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) fn mock_id(handle: &NativeHandle) -> u64 {
    handle
        .as_any()
        .downcast_ref::<MockObject>()
        .map(|obj| obj.id)
        .unwrap_or(0)
}

// ===== PROBE STATE =====

/// Recorded backend activity, shared between the mock and the test body
#[derive(Default)]
pub(crate) struct MockState {
    /// Bumped on every `reset`; objects from older generations are stale
    pub generation: u64,
    next_id: u64,

    // creation counters
    pub buffers_created: usize,
    pub textures_created: usize,
    pub samplers_created: usize,
    pub vertex_shaders_created: usize,
    pub pixel_shaders_created: usize,
    pub blend_states_created: usize,
    pub raster_states_created: usize,
    pub zstencil_states_created: usize,
    pub swap_chains_created: usize,
    pub duplicators_created: usize,

    // activity counters
    pub buffer_updates: usize,
    pub texture_updates: usize,
    pub last_update_len: usize,
    pub draws: usize,
    pub presents: usize,
    pub frames_duplicated: usize,
    pub blend_binds: usize,
    pub raster_binds: usize,
    pub zstencil_binds: usize,

    // last-seen bindings
    pub last_vertex_buffers: Vec<Option<u64>>,
    pub last_strides: Vec<u32>,
    pub last_index_buffer: Option<u64>,
    pub last_render_target: Option<u64>,
    pub last_textures: HashMap<u32, Option<u64>>,
    pub last_sampler_slots: Vec<bool>,
    pub last_viewport: Option<Rect>,
    pub last_draw: Option<(Topology, u32, u32, bool)>,

    // failure injection
    pub fail_create: bool,
    pub fail_shared_open: bool,
    pub fail_next_present: bool,
    pub fail_next_draw: bool,

    // minimal pixel flow: texture id -> (w, h, format, last clear color)
    textures: HashMap<u64, (u32, u32, ColorFormat, [f32; 4])>,
    rtv_to_texture: HashMap<u64, u64>,
    stages: HashMap<u64, (u32, u32, ColorFormat)>,
    stage_contents: HashMap<u64, Vec<u8>>,
}

impl MockState {
    fn alloc(&mut self) -> NativeHandle {
        self.next_id += 1;
        Box::new(MockObject {
            id: self.next_id,
            generation: self.generation,
        })
    }

    fn check_create(&self) -> Result<()> {
        if self.fail_create {
            return Err(Error::ResourceCreation("mock creation failure injected".to_string()));
        }
        Ok(())
    }

    /// Reject handles created before the last reset
    fn check_live(&self, handle: &NativeHandle) -> Result<u64> {
        let obj = handle
            .as_any()
            .downcast_ref::<MockObject>()
            .ok_or_else(|| Error::BackendError("foreign native object".to_string()))?;
        if obj.generation != self.generation {
            return Err(Error::BackendError(format!(
                "stale native object {} (generation {} != {})",
                obj.id, obj.generation, self.generation
            )));
        }
        Ok(obj.id)
    }

    fn texture_set(&mut self, desc: &TextureDesc) -> NativeTextureSet {
        let texture = self.alloc();
        let tex_id = mock_id(&texture);
        self.textures
            .insert(tex_id, (desc.width, desc.height, desc.format, [0.0; 4]));
        self.textures_created += 1;

        let mut render_targets = Vec::new();
        for _ in 0..desc.render_target_count() {
            let rtv = self.alloc();
            self.rtv_to_texture.insert(mock_id(&rtv), tex_id);
            render_targets.push(rtv);
        }
        let gdi_surface = desc.flags.contains(TextureFlags::GDI_COMPATIBLE).then(|| self.alloc());
        let shared_handle = desc.flags.contains(TextureFlags::SHARED).then_some(tex_id as u32);
        let shader_resource = Some(self.alloc());
        NativeTextureSet {
            texture,
            render_targets,
            shader_resource,
            gdi_surface,
            shared_handle,
        }
    }
}

// solid-color pixels for the readback flow; non-32-bit formats read as zeros
fn solid_pixels(width: u32, height: u32, format: ColorFormat, color: [f32; 4]) -> Vec<u8> {
    let pitch = width as usize * 4;
    let mut data = vec![0u8; pitch * height as usize];
    let texel: [u8; 4] = match format {
        ColorFormat::Rgba => [
            (color[0] * 255.0) as u8,
            (color[1] * 255.0) as u8,
            (color[2] * 255.0) as u8,
            (color[3] * 255.0) as u8,
        ],
        ColorFormat::Bgra | ColorFormat::Bgrx => [
            (color[2] * 255.0) as u8,
            (color[1] * 255.0) as u8,
            (color[0] * 255.0) as u8,
            (color[3] * 255.0) as u8,
        ],
        _ => [0; 4],
    };
    for pixel in data.chunks_exact_mut(4) {
        pixel.copy_from_slice(&texel);
    }
    data
}

// ===== THE MOCK BACKEND =====

/// Headless [`NativeDevice`] implementation
pub(crate) struct MockNative {
    state: Arc<Mutex<MockState>>,
}

impl MockNative {
    /// Create the mock plus the state handle tests inspect
    pub(crate) fn new() -> (Self, Arc<Mutex<MockState>>) {
        let state = Arc::new(Mutex::new(MockState {
            generation: 1,
            ..MockState::default()
        }));
        (Self { state: state.clone() }, state)
    }
}

impl NativeDevice for MockNative {
    fn description(&self) -> String {
        "mock adapter".to_string()
    }

    fn reset(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.generation += 1;
        state.rtv_to_texture.clear();
        state.textures.clear();
        state.stages.clear();
        state.stage_contents.clear();
        Ok(())
    }

    fn create_buffer(&mut self, _desc: &BufferDesc, _initial: Option<&[u8]>) -> Result<NativeHandle> {
        let mut state = self.state.lock().unwrap();
        state.check_create()?;
        state.buffers_created += 1;
        Ok(state.alloc())
    }

    fn update_buffer(&mut self, buffer: &NativeHandle, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check_live(buffer)?;
        state.buffer_updates += 1;
        state.last_update_len = data.len();
        Ok(())
    }

    fn create_texture_2d(&mut self, desc: &TextureDesc, _initial: &[Vec<u8>]) -> Result<NativeTextureSet> {
        let mut state = self.state.lock().unwrap();
        state.check_create()?;
        Ok(state.texture_set(desc))
    }

    fn open_shared_texture(&mut self, handle: u32) -> Result<(NativeTextureSet, TextureDesc)> {
        let mut state = self.state.lock().unwrap();
        state.check_create()?;
        if handle == 0 || state.fail_shared_open {
            return Err(Error::ResourceCreation(format!("shared handle {:#x} cannot be opened", handle)));
        }
        let desc = TextureDesc {
            width: 64,
            height: 64,
            format: ColorFormat::Bgra,
            levels: 1,
            flags: TextureFlags::SHARED,
        };
        let set = state.texture_set(&desc);
        Ok((set, desc))
    }

    fn update_texture(&mut self, texture: &NativeHandle, data: &[u8], _row_pitch: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let tex_id = state.check_live(texture)?;
        state.texture_updates += 1;
        // adopt the first texel as the texture's color for readback checks
        if let Some((_, _, format, color)) = state.textures.get_mut(&tex_id) {
            if data.len() >= 4 {
                *color = match format {
                    ColorFormat::Rgba => [
                        data[0] as f32 / 255.0,
                        data[1] as f32 / 255.0,
                        data[2] as f32 / 255.0,
                        data[3] as f32 / 255.0,
                    ],
                    ColorFormat::Bgra | ColorFormat::Bgrx => [
                        data[2] as f32 / 255.0,
                        data[1] as f32 / 255.0,
                        data[0] as f32 / 255.0,
                        data[3] as f32 / 255.0,
                    ],
                    _ => *color,
                };
            }
        }
        Ok(())
    }

    fn create_depth_stencil(
        &mut self,
        _width: u32,
        _height: u32,
        _format: DepthStencilFormat,
    ) -> Result<NativeDepthStencil> {
        let mut state = self.state.lock().unwrap();
        state.check_create()?;
        state.textures_created += 1;
        Ok(NativeDepthStencil {
            texture: state.alloc(),
            view: state.alloc(),
        })
    }

    fn create_stage_surface(&mut self, width: u32, height: u32, format: ColorFormat) -> Result<NativeHandle> {
        let mut state = self.state.lock().unwrap();
        state.check_create()?;
        let surface = state.alloc();
        state.stages.insert(mock_id(&surface), (width, height, format));
        Ok(surface)
    }

    fn stage_texture(&mut self, dst_stage: &NativeHandle, src_texture: &NativeHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let stage_id = state.check_live(dst_stage)?;
        let tex_id = state.check_live(src_texture)?;
        let (w, h, format, color) = *state
            .textures
            .get(&tex_id)
            .ok_or_else(|| Error::BackendError("staging from an unknown texture".to_string()))?;
        let pixels = solid_pixels(w, h, format, color);
        state.stage_contents.insert(stage_id, pixels);
        Ok(())
    }

    fn map_stage_surface(&mut self, surface: &NativeHandle) -> Result<MappedSurface> {
        let mut state = self.state.lock().unwrap();
        let stage_id = state.check_live(surface)?;
        let (w, h, _) = *state
            .stages
            .get(&stage_id)
            .ok_or_else(|| Error::BackendError("mapping an unknown stage surface".to_string()))?;
        let data = state
            .stage_contents
            .remove(&stage_id)
            .unwrap_or_else(|| vec![0u8; (w * h * 4) as usize]);
        Ok(MappedSurface { data, row_pitch: w * 4 })
    }

    fn copy_texture_region(
        &mut self,
        dst: &NativeHandle,
        _dst_x: u32,
        _dst_y: u32,
        src: &NativeHandle,
        _src_x: u32,
        _src_y: u32,
        _width: u32,
        _height: u32,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let dst_id = state.check_live(dst)?;
        let src_id = state.check_live(src)?;
        if let Some(&(_, _, _, color)) = state.textures.get(&src_id) {
            if let Some(entry) = state.textures.get_mut(&dst_id) {
                entry.3 = color;
            }
        }
        Ok(())
    }

    fn create_sampler(&mut self, _desc: &SamplerDesc) -> Result<NativeHandle> {
        let mut state = self.state.lock().unwrap();
        state.check_create()?;
        state.samplers_created += 1;
        Ok(state.alloc())
    }

    fn create_vertex_shader(
        &mut self,
        source: &str,
        file: &str,
        _attributes: &[VertexAttribute],
    ) -> Result<NativeVertexShader> {
        let mut state = self.state.lock().unwrap();
        state.check_create()?;
        if source.contains("#error") {
            return Err(Error::ShaderCompile {
                file: file.to_string(),
                message: "mock compile error".to_string(),
            });
        }
        state.vertex_shaders_created += 1;
        Ok(NativeVertexShader {
            shader: state.alloc(),
            input_layout: state.alloc(),
        })
    }

    fn create_pixel_shader(&mut self, source: &str, file: &str) -> Result<NativeHandle> {
        let mut state = self.state.lock().unwrap();
        state.check_create()?;
        if source.contains("#error") {
            return Err(Error::ShaderCompile {
                file: file.to_string(),
                message: "mock compile error".to_string(),
            });
        }
        state.pixel_shaders_created += 1;
        Ok(state.alloc())
    }

    fn create_blend_state(&mut self, _desc: &BlendState) -> Result<NativeHandle> {
        let mut state = self.state.lock().unwrap();
        state.check_create()?;
        state.blend_states_created += 1;
        Ok(state.alloc())
    }

    fn create_raster_state(&mut self, _desc: &RasterState) -> Result<NativeHandle> {
        let mut state = self.state.lock().unwrap();
        state.check_create()?;
        state.raster_states_created += 1;
        Ok(state.alloc())
    }

    fn create_depth_stencil_state(&mut self, _desc: &DepthStencilState) -> Result<NativeHandle> {
        let mut state = self.state.lock().unwrap();
        state.check_create()?;
        state.zstencil_states_created += 1;
        Ok(state.alloc())
    }

    fn create_swap_chain(&mut self, _init: &SwapChainInit) -> Result<NativeHandle> {
        let mut state = self.state.lock().unwrap();
        state.check_create()?;
        state.swap_chains_created += 1;
        Ok(state.alloc())
    }

    fn swap_chain_target(&mut self, swap: &NativeHandle, init: &SwapChainInit) -> Result<NativeTextureSet> {
        let mut state = self.state.lock().unwrap();
        state.check_live(swap)?;
        let desc = TextureDesc {
            width: init.width,
            height: init.height,
            format: init.format,
            levels: 1,
            flags: TextureFlags::RENDER_TARGET,
        };
        Ok(state.texture_set(&desc))
    }

    fn resize_swap_chain(&mut self, swap: &NativeHandle, _width: u32, _height: u32, _format: ColorFormat) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check_live(swap)?;
        Ok(())
    }

    fn present(&mut self, swap: &NativeHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check_live(swap)?;
        if state.fail_next_present {
            state.fail_next_present = false;
            return Err(Error::DeviceLost);
        }
        state.presents += 1;
        Ok(())
    }

    fn create_duplicator(&mut self, monitor: u32) -> Result<(NativeHandle, u32, u32, ColorFormat)> {
        let mut state = self.state.lock().unwrap();
        state.check_create()?;
        if monitor > 3 {
            return Err(Error::ResourceCreation(format!("monitor {} does not exist", monitor)));
        }
        state.duplicators_created += 1;
        Ok((state.alloc(), 1920, 1080, ColorFormat::Bgra))
    }

    fn duplicate_frame(&mut self, duplicator: &NativeHandle, target: &NativeHandle) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.check_live(duplicator)?;
        state.check_live(target)?;
        state.frames_duplicated += 1;
        Ok(true)
    }

    fn bind_render_target(&mut self, color: Option<&NativeHandle>, depth: Option<&NativeHandle>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(handle) = color {
            state.check_live(handle)?;
        }
        if let Some(handle) = depth {
            state.check_live(handle)?;
        }
        state.last_render_target = color.map(mock_id);
        Ok(())
    }

    fn clear_render_target(&mut self, color_view: &NativeHandle, rgba: [f32; 4]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let rtv_id = state.check_live(color_view)?;
        let tex_id = *state
            .rtv_to_texture
            .get(&rtv_id)
            .ok_or_else(|| Error::BackendError("clearing an unknown render-target view".to_string()))?;
        if let Some(entry) = state.textures.get_mut(&tex_id) {
            entry.3 = rgba;
        }
        Ok(())
    }

    fn clear_depth_stencil(&mut self, view: &NativeHandle, _depth: Option<f32>, _stencil: Option<u8>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check_live(view)?;
        Ok(())
    }

    fn bind_vertex_buffers(&mut self, buffers: &[Option<&NativeHandle>], strides: &[u32]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let mut ids = Vec::with_capacity(buffers.len());
        for buffer in buffers {
            ids.push(match buffer {
                Some(handle) => Some(state.check_live(handle)?),
                None => None,
            });
        }
        state.last_vertex_buffers = ids;
        state.last_strides = strides.to_vec();
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: &NativeHandle, _index_type: IndexType) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let id = state.check_live(buffer)?;
        state.last_index_buffer = Some(id);
        Ok(())
    }

    fn bind_vertex_shader(
        &mut self,
        shader: &NativeHandle,
        layout: &NativeHandle,
        constants: Option<&NativeHandle>,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check_live(shader)?;
        state.check_live(layout)?;
        if let Some(handle) = constants {
            state.check_live(handle)?;
        }
        Ok(())
    }

    fn bind_pixel_shader(&mut self, shader: &NativeHandle, constants: Option<&NativeHandle>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check_live(shader)?;
        if let Some(handle) = constants {
            state.check_live(handle)?;
        }
        Ok(())
    }

    fn bind_texture(&mut self, slot: u32, view: Option<&NativeHandle>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let id = match view {
            Some(handle) => Some(state.check_live(handle)?),
            None => None,
        };
        state.last_textures.insert(slot, id);
        Ok(())
    }

    fn bind_samplers(&mut self, samplers: &[Option<&NativeHandle>]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for sampler in samplers.iter().flatten() {
            state.check_live(sampler)?;
        }
        state.last_sampler_slots = samplers.iter().map(|s| s.is_some()).collect();
        Ok(())
    }

    fn bind_blend_state(&mut self, state_obj: &NativeHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check_live(state_obj)?;
        state.blend_binds += 1;
        Ok(())
    }

    fn bind_raster_state(&mut self, state_obj: &NativeHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check_live(state_obj)?;
        state.raster_binds += 1;
        Ok(())
    }

    fn bind_depth_stencil_state(&mut self, state_obj: &NativeHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check_live(state_obj)?;
        state.zstencil_binds += 1;
        Ok(())
    }

    fn set_viewport(&mut self, rect: Rect) -> Result<()> {
        self.state.lock().unwrap().last_viewport = Some(rect);
        Ok(())
    }

    fn draw(&mut self, topology: Topology, start_vertex: u32, count: u32, indexed: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_draw {
            state.fail_next_draw = false;
            return Err(Error::DeviceLost);
        }
        state.draws += 1;
        state.last_draw = Some((topology, start_vertex, count, indexed));
        Ok(())
    }
}
