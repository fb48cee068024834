//! Vertex and pixel shaders with constant-buffer parameter management
//!
//! A shader retains its source text (for device-loss recompilation) and an
//! ordered list of declared parameters. Parameters are laid out into one
//! packed native constant buffer at creation: 4-byte scalar elements,
//! 16-byte array element stride, and a parameter never straddles a 16-byte
//! register boundary. `upload_params` performs at most one native buffer
//! update per draw, containing the full packed region, and only when some
//! parameter changed since the last upload.

use glam::{Mat4, Vec2, Vec3, Vec4};
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::native::{BufferDesc, BufferKind, NativeDevice, NativeHandle, NativeVertexShader};
use crate::resource::{SamplerHandle, TextureHandle};

// ===== VERTEX ATTRIBUTES =====

/// A per-vertex input attribute declared by a vertex shader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexAttribute {
    /// Position stream (mandatory, always slot 0)
    Position,
    Normal,
    /// Packed 8-bit RGBA color
    Color,
    Tangent,
    /// Texture coordinates: unit index and component count (1..=4)
    TexCoord { unit: u32, width: u32 },
}

/// What a vertex shader's input layout expects from a bound vertex buffer
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LayoutExpectation {
    pub normals: bool,
    pub colors: bool,
    pub tangents: bool,
    pub tex_units: u32,
}

impl LayoutExpectation {
    fn from_attributes(attributes: &[VertexAttribute]) -> Self {
        let mut expect = Self::default();
        for attr in attributes {
            match attr {
                VertexAttribute::Position => {}
                VertexAttribute::Normal => expect.normals = true,
                VertexAttribute::Color => expect.colors = true,
                VertexAttribute::Tangent => expect.tangents = true,
                VertexAttribute::TexCoord { .. } => expect.tex_units += 1,
            }
        }
        expect
    }

    /// Total buffer slots a draw must supply
    pub(crate) fn buffers_expected(&self) -> u32 {
        1 + self.tex_units
            + u32::from(self.normals)
            + u32::from(self.colors)
            + u32::from(self.tangents)
    }
}

// ===== SHADER PARAMETERS =====

/// Declared type of a shader parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderParamType {
    Unknown,
    Bool,
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int2,
    Int3,
    Int4,
    Mat4,
    /// Bound through a texture slot, occupies no constant space
    Texture,
}

impl ShaderParamType {
    /// Packed byte size of one element of this type
    pub fn size(self) -> usize {
        match self {
            ShaderParamType::Unknown | ShaderParamType::Texture => 0,
            ShaderParamType::Bool | ShaderParamType::Int | ShaderParamType::Float => 4,
            ShaderParamType::Vec2 | ShaderParamType::Int2 => 8,
            ShaderParamType::Vec3 | ShaderParamType::Int3 => 12,
            ShaderParamType::Vec4 | ShaderParamType::Int4 => 16,
            ShaderParamType::Mat4 => 64,
        }
    }
}

/// Declaration of one shader parameter
#[derive(Debug, Clone)]
pub struct ShaderParamDesc {
    pub name: String,
    pub ty: ShaderParamType,
    /// 0 or 1 for a scalar; >1 for an array
    pub array_count: u32,
    /// Initial value bytes; zeroed when absent
    pub default: Option<Vec<u8>>,
}

/// A laid-out shader parameter with its current value
pub struct ShaderParam {
    pub name: String,
    pub ty: ShaderParamType,
    pub array_count: u32,
    /// Byte offset into the packed constant buffer
    pub pos: usize,
    pub cur_value: Vec<u8>,
    pub default_value: Vec<u8>,
    /// Set when application code writes a new value; cleared on upload
    pub changed: bool,
    /// Texture-typed params: the bound texture
    pub texture: Option<TextureHandle>,
    /// Texture-typed params: sampler pushed into the pixel-shader sampler
    /// array at draw time
    pub next_sampler: Option<SamplerHandle>,
    /// Texture-typed params: assigned texture slot
    pub texture_unit: Option<u32>,
}

impl ShaderParam {
    /// Full packed byte size (array elements on 16-byte strides)
    fn byte_size(&self) -> usize {
        let base = self.ty.size();
        if base == 0 {
            return 0;
        }
        let count = self.array_count.max(1) as usize;
        let stride = base.div_ceil(16) * 16;
        stride * (count - 1) + base
    }
}

/// A typed value written to a shader parameter
#[derive(Debug, Clone)]
pub enum ParamValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Int2([i32; 2]),
    Int3([i32; 3]),
    Int4([i32; 4]),
    Mat4(Mat4),
    Texture(TextureHandle),
    /// Pre-packed bytes (arrays and other bulk data)
    Raw(Vec<u8>),
}

impl ParamValue {
    fn matches(&self, ty: ShaderParamType) -> bool {
        match self {
            ParamValue::Bool(_) => ty == ShaderParamType::Bool,
            ParamValue::Int(_) => ty == ShaderParamType::Int,
            ParamValue::Float(_) => ty == ShaderParamType::Float,
            ParamValue::Vec2(_) => ty == ShaderParamType::Vec2,
            ParamValue::Vec3(_) => ty == ShaderParamType::Vec3,
            ParamValue::Vec4(_) => ty == ShaderParamType::Vec4,
            ParamValue::Int2(_) => ty == ShaderParamType::Int2,
            ParamValue::Int3(_) => ty == ShaderParamType::Int3,
            ParamValue::Int4(_) => ty == ShaderParamType::Int4,
            ParamValue::Mat4(_) => ty == ShaderParamType::Mat4,
            ParamValue::Texture(_) => ty == ShaderParamType::Texture,
            ParamValue::Raw(_) => ty != ShaderParamType::Texture,
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        match self {
            ParamValue::Bool(v) => bytemuck::bytes_of(&(*v as u32)).to_vec(),
            ParamValue::Int(v) => bytemuck::bytes_of(v).to_vec(),
            ParamValue::Float(v) => bytemuck::bytes_of(v).to_vec(),
            ParamValue::Vec2(v) => bytemuck::bytes_of(v).to_vec(),
            ParamValue::Vec3(v) => bytemuck::bytes_of(v).to_vec(),
            ParamValue::Vec4(v) => bytemuck::bytes_of(v).to_vec(),
            ParamValue::Int2(v) => bytemuck::cast_slice(v).to_vec(),
            ParamValue::Int3(v) => bytemuck::cast_slice(v).to_vec(),
            ParamValue::Int4(v) => bytemuck::cast_slice(v).to_vec(),
            ParamValue::Mat4(v) => bytemuck::cast_slice(&v.to_cols_array()).to_vec(),
            ParamValue::Texture(_) => Vec::new(),
            ParamValue::Raw(bytes) => bytes.clone(),
        }
    }
}

// ===== SHARED PARAMETER CORE =====

/// Parameter list + packed constant buffer shared by both shader stages
pub(crate) struct ShaderCore {
    params: Vec<ShaderParam>,
    name_lookup: FxHashMap<String, usize>,
    constants: Option<NativeHandle>,
    constant_size: usize,
}

impl ShaderCore {
    /// Lay out the declared parameters and allocate the constant buffer
    fn new(native: &mut dyn NativeDevice, descs: &[ShaderParamDesc]) -> Result<Self> {
        let mut params = Vec::with_capacity(descs.len());
        let mut name_lookup = FxHashMap::default();
        let mut pos = 0usize;
        let mut tex_counter = 0u32;

        for desc in descs {
            let mut param = ShaderParam {
                name: desc.name.clone(),
                ty: desc.ty,
                array_count: desc.array_count,
                pos: 0,
                cur_value: Vec::new(),
                default_value: Vec::new(),
                changed: false,
                texture: None,
                next_sampler: None,
                texture_unit: None,
            };

            if desc.ty == ShaderParamType::Texture {
                param.texture_unit = Some(tex_counter);
                tex_counter += 1;
            } else {
                let size = param.byte_size();
                // a parameter never straddles a 16-byte register
                if size > 0 && pos % 16 != 0 && pos % 16 + size > 16 {
                    pos = pos.div_ceil(16) * 16;
                }
                param.pos = pos;
                pos += size;

                let mut value = vec![0u8; size];
                if let Some(default) = &desc.default {
                    let n = default.len().min(size);
                    value[..n].copy_from_slice(&default[..n]);
                }
                param.default_value = value.clone();
                param.cur_value = value;
                param.changed = size > 0;
            }

            name_lookup.insert(desc.name.clone(), params.len());
            params.push(param);
        }

        let constant_size = pos.div_ceil(16) * 16;
        let mut core = Self {
            params,
            name_lookup,
            constants: None,
            constant_size,
        };
        core.build_constants(native)?;
        Ok(core)
    }

    fn build_constants(&mut self, native: &mut dyn NativeDevice) -> Result<()> {
        self.constants = if self.constant_size > 0 {
            Some(native.create_buffer(
                &BufferDesc {
                    kind: BufferKind::Constant,
                    size: self.constant_size,
                    dynamic: false,
                },
                None,
            )?)
        } else {
            None
        };
        Ok(())
    }

    /// Recreate the constant buffer after loss; every parameter re-uploads
    fn rebuild(&mut self, native: &mut dyn NativeDevice) -> Result<()> {
        self.constants = None;
        self.build_constants(native)?;
        for param in &mut self.params {
            if param.ty.size() > 0 {
                param.changed = true;
            }
        }
        Ok(())
    }

    fn param_index(&self, name: &str) -> Option<usize> {
        self.name_lookup.get(name).copied()
    }

    fn set_param(&mut self, index: usize, value: &ParamValue) -> Result<()> {
        let param = self
            .params
            .get_mut(index)
            .ok_or_else(|| Error::InvalidResource(format!("shader parameter index {} out of range", index)))?;
        if !value.matches(param.ty) {
            return Err(Error::InvalidResource(format!(
                "value type mismatch for parameter '{}' ({:?})",
                param.name, param.ty
            )));
        }

        if let ParamValue::Texture(handle) = value {
            param.texture = Some(*handle);
            return Ok(());
        }

        let bytes = value.to_bytes();
        if bytes.len() > param.cur_value.len() {
            return Err(Error::InvalidResource(format!(
                "value for parameter '{}' is {} bytes, layout holds {}",
                param.name,
                bytes.len(),
                param.cur_value.len()
            )));
        }
        if param.cur_value[..bytes.len()] != bytes[..] {
            param.cur_value[..bytes.len()].copy_from_slice(&bytes);
            param.changed = true;
        }
        Ok(())
    }

    /// Reset a parameter to its declared default
    fn reset_to_default(&mut self, index: usize) -> Result<()> {
        let param = self
            .params
            .get_mut(index)
            .ok_or_else(|| Error::InvalidResource(format!("shader parameter index {} out of range", index)))?;
        if param.cur_value != param.default_value {
            param.cur_value = param.default_value.clone();
            param.changed = true;
        }
        Ok(())
    }

    /// Upload the packed parameter block if any parameter changed.
    ///
    /// Always a single full-region native update, never per-parameter
    /// writes, so upload count stays O(1) per draw regardless of parameter
    /// count. Returns whether an upload happened.
    fn upload_params(&mut self, native: &mut dyn NativeDevice) -> Result<bool> {
        if !self.params.iter().any(|p| p.changed) {
            return Ok(false);
        }
        let constants = match &self.constants {
            Some(handle) => handle,
            None => return Ok(false),
        };

        let mut packed = vec![0u8; self.constant_size];
        for param in &mut self.params {
            let size = param.cur_value.len();
            if size > 0 {
                packed[param.pos..param.pos + size].copy_from_slice(&param.cur_value);
            }
            param.changed = false;
        }
        native.update_buffer(constants, &packed)?;
        Ok(true)
    }

    fn constants(&self) -> Option<&NativeHandle> {
        self.constants.as_ref()
    }
}

// ===== VERTEX SHADER =====

/// Description of a vertex shader
#[derive(Debug, Clone)]
pub struct VertexShaderDesc {
    /// HLSL source text (retained for recompilation after device loss)
    pub source: String,
    /// Source file name for compiler diagnostics
    pub file: String,
    pub params: Vec<ShaderParamDesc>,
    /// Declared input attributes; must include `Position`
    pub attributes: Vec<VertexAttribute>,
}

/// Built-in parameter names resolved at creation
const WORLD_PARAM: &str = "World";
const VIEW_PROJ_PARAM: &str = "ViewProj";

/// A compiled vertex shader resource
pub struct VertexShader {
    source: String,
    file: String,
    attributes: Vec<VertexAttribute>,
    expect: LayoutExpectation,
    core: ShaderCore,
    natives: Option<NativeVertexShader>,
    /// Cached indices of the built-in matrix parameters
    world: Option<usize>,
    view_proj: Option<usize>,
}

impl VertexShader {
    pub(crate) fn new(native: &mut dyn NativeDevice, desc: VertexShaderDesc) -> Result<Self> {
        if !desc.attributes.contains(&VertexAttribute::Position) {
            return Err(Error::InvalidResource(
                "vertex shader must declare a position attribute".to_string(),
            ));
        }
        let natives = native.create_vertex_shader(&desc.source, &desc.file, &desc.attributes)?;
        let core = ShaderCore::new(native, &desc.params)?;
        let world = core.param_index(WORLD_PARAM);
        let view_proj = core.param_index(VIEW_PROJ_PARAM);
        let expect = LayoutExpectation::from_attributes(&desc.attributes);
        Ok(Self {
            source: desc.source,
            file: desc.file,
            attributes: desc.attributes,
            expect,
            core,
            natives: Some(natives),
            world,
            view_proj,
        })
    }

    /// Declared input attributes
    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    /// Number of vertex buffer slots a draw with this shader binds
    pub fn buffers_expected(&self) -> u32 {
        self.expect.buffers_expected()
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.core.param_index(name)
    }

    pub fn param_count(&self) -> usize {
        self.core.params.len()
    }

    pub fn param(&self, index: usize) -> Option<&ShaderParam> {
        self.core.params.get(index)
    }

    pub(crate) fn expectation(&self) -> LayoutExpectation {
        self.expect
    }

    pub(crate) fn set_param(&mut self, index: usize, value: &ParamValue) -> Result<()> {
        self.core.set_param(index, value)
    }

    pub(crate) fn reset_to_default(&mut self, index: usize) -> Result<()> {
        self.core.reset_to_default(index)
    }

    /// Write the built-in world/view-projection matrices (no-op for ones
    /// the shader does not declare)
    pub(crate) fn set_builtin_matrices(&mut self, world: &Mat4, view_proj: &Mat4) -> Result<()> {
        if let Some(idx) = self.world {
            self.core.set_param(idx, &ParamValue::Mat4(*world))?;
        }
        if let Some(idx) = self.view_proj {
            self.core.set_param(idx, &ParamValue::Mat4(*view_proj))?;
        }
        Ok(())
    }

    pub(crate) fn upload_params(&mut self, native: &mut dyn NativeDevice) -> Result<bool> {
        self.core.upload_params(native)
    }

    pub(crate) fn natives(&self) -> Result<&NativeVertexShader> {
        self.natives
            .as_ref()
            .ok_or_else(|| Error::InvalidResource("vertex shader released pending rebuild".to_string()))
    }

    pub(crate) fn constants(&self) -> Option<&NativeHandle> {
        self.core.constants()
    }

    /// Recompile the shader and recreate its constant buffer after loss
    pub(crate) fn rebuild(&mut self, native: &mut dyn NativeDevice) -> Result<()> {
        self.natives = None;
        self.natives = Some(native.create_vertex_shader(&self.source, &self.file, &self.attributes)?);
        self.core.rebuild(native)
    }
}

// ===== PIXEL SHADER =====

/// A named sampler declared by a pixel shader
#[derive(Debug, Clone)]
pub struct SamplerBindingDesc {
    pub name: String,
    pub desc: crate::resource::sampler::SamplerDesc,
}

/// Description of a pixel shader
#[derive(Debug, Clone)]
pub struct PixelShaderDesc {
    pub source: String,
    pub file: String,
    pub params: Vec<ShaderParamDesc>,
    /// Named samplers, bound in order to the first sampler slots
    pub samplers: Vec<SamplerBindingDesc>,
}

/// A sampler binding resolved to a device sampler resource
pub struct ShaderSampler {
    pub name: String,
    pub sampler: SamplerHandle,
}

/// A compiled pixel shader resource
pub struct PixelShader {
    source: String,
    file: String,
    core: ShaderCore,
    native: Option<NativeHandle>,
    samplers: Vec<ShaderSampler>,
}

impl PixelShader {
    /// `samplers` are the device-created sampler resources matching the
    /// description's sampler list, in order (owned by this shader).
    pub(crate) fn new(
        native: &mut dyn NativeDevice,
        desc: PixelShaderDesc,
        samplers: Vec<ShaderSampler>,
    ) -> Result<Self> {
        let shader = native.create_pixel_shader(&desc.source, &desc.file)?;
        let core = ShaderCore::new(native, &desc.params)?;
        Ok(Self {
            source: desc.source,
            file: desc.file,
            core,
            native: Some(shader),
            samplers,
        })
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.core.param_index(name)
    }

    pub fn param_count(&self) -> usize {
        self.core.params.len()
    }

    pub fn param(&self, index: usize) -> Option<&ShaderParam> {
        self.core.params.get(index)
    }

    /// Sampler bindings in slot order
    pub fn samplers(&self) -> &[ShaderSampler] {
        &self.samplers
    }

    pub(crate) fn set_param(&mut self, index: usize, value: &ParamValue) -> Result<()> {
        self.core.set_param(index, value)
    }

    pub(crate) fn reset_to_default(&mut self, index: usize) -> Result<()> {
        self.core.reset_to_default(index)
    }

    /// Pair a texture-typed parameter with the sampler pushed alongside it
    pub(crate) fn set_param_sampler(&mut self, index: usize, sampler: SamplerHandle) -> Result<()> {
        let param = self
            .core
            .params
            .get_mut(index)
            .ok_or_else(|| Error::InvalidResource(format!("shader parameter index {} out of range", index)))?;
        if param.ty != ShaderParamType::Texture {
            return Err(Error::InvalidResource(format!(
                "parameter '{}' is not texture-typed",
                param.name
            )));
        }
        param.next_sampler = Some(sampler);
        Ok(())
    }

    /// Texture-typed params with their assigned units, in declaration order
    pub(crate) fn texture_params(&self) -> impl Iterator<Item = &ShaderParam> {
        self.core
            .params
            .iter()
            .filter(|p| p.ty == ShaderParamType::Texture)
    }

    pub(crate) fn upload_params(&mut self, native: &mut dyn NativeDevice) -> Result<bool> {
        self.core.upload_params(native)
    }

    pub(crate) fn native(&self) -> Result<&NativeHandle> {
        self.native
            .as_ref()
            .ok_or_else(|| Error::InvalidResource("pixel shader released pending rebuild".to_string()))
    }

    pub(crate) fn constants(&self) -> Option<&NativeHandle> {
        self.core.constants()
    }

    /// Recompile the shader and recreate its constant buffer after loss
    /// (owned samplers rebuild through their own registry entries)
    pub(crate) fn rebuild(&mut self, native: &mut dyn NativeDevice) -> Result<()> {
        self.native = None;
        self.native = Some(native.create_pixel_shader(&self.source, &self.file)?);
        self.core.rebuild(native)
    }
}
