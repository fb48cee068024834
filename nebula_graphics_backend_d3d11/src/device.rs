//! Direct3D 11 implementation of the native device seam
//!
//! One `ID3D11Device` + immediate `ID3D11DeviceContext` pair per
//! [`D3d11Device`]. Creation calls hand opaque wrappers back to the
//! abstraction layer; binding calls downcast them to the concrete COM
//! interfaces. Device removal surfaces as `Error::DeviceLost` from
//! `present`, after which `reset` tears the pair down and recreates it on
//! the same adapter.

use std::any::Any;
use std::ffi::{c_void, CString};

use nebula_graphics::gfx_info;
use nebula_graphics::nebula::format::{ColorFormat, DepthStencilFormat};
use nebula_graphics::nebula::native::{
    BufferDesc, BufferKind, MappedSurface, NativeDepthStencil, NativeDevice, NativeHandle,
    NativeObject, NativeTextureSet, NativeVertexShader,
};
use nebula_graphics::nebula::resource::index_buffer::IndexType;
use nebula_graphics::nebula::resource::sampler::SamplerDesc;
use nebula_graphics::nebula::resource::shader::VertexAttribute;
use nebula_graphics::nebula::resource::swap_chain::SwapChainInit;
use nebula_graphics::nebula::resource::texture::{TextureDesc, TextureFlags};
use nebula_graphics::nebula::state::{BlendState, DepthStencilState, RasterState, Topology};
use nebula_graphics::nebula::{Error, Rect, Result};
use raw_window_handle::RawWindowHandle;

use windows::core::{Interface, PCSTR};
use windows::Win32::Foundation::{HANDLE, HMODULE, HWND};
use windows::Win32::Graphics::Direct3D::Fxc::{D3DCompile, D3DCOMPILE_OPTIMIZATION_LEVEL1};
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;

use crate::convert::*;

const SOURCE: &str = "nebula::D3d11Device";

const FEATURE_LEVELS: [D3D_FEATURE_LEVEL; 4] = [
    D3D_FEATURE_LEVEL_11_1,
    D3D_FEATURE_LEVEL_11_0,
    D3D_FEATURE_LEVEL_10_1,
    D3D_FEATURE_LEVEL_10_0,
];

// ===== OPAQUE WRAPPERS =====

macro_rules! native_wrappers {
    ($($name:ident($inner:ty)),+ $(,)?) => {$(
        struct $name($inner);

        // the abstraction layer confines all graphics calls to one thread
        unsafe impl Send for $name {}

        impl NativeObject for $name {
            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    )+};
}

native_wrappers!(
    D3dBuffer(ID3D11Buffer),
    D3dTexture(ID3D11Texture2D),
    D3dRenderTargetView(ID3D11RenderTargetView),
    D3dShaderResourceView(ID3D11ShaderResourceView),
    D3dDepthStencilView(ID3D11DepthStencilView),
    D3dGdiSurface(IDXGISurface1),
    D3dSampler(ID3D11SamplerState),
    D3dVertexShader(ID3D11VertexShader),
    D3dInputLayout(ID3D11InputLayout),
    D3dPixelShader(ID3D11PixelShader),
    D3dBlendState(ID3D11BlendState),
    D3dRasterState(ID3D11RasterizerState),
    D3dZStencilState(ID3D11DepthStencilState),
    D3dSwapChain(IDXGISwapChain),
    D3dDuplicator(IDXGIOutputDuplication),
);

fn downcast<'a, T: NativeObject>(handle: &'a NativeHandle, what: &str) -> Result<&'a T> {
    handle
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| Error::InvalidResource(format!("native handle is not a D3D11 {what}")))
}

/// Bytes between consecutive rows of initial texture data (block rows for
/// the compressed formats)
fn row_pitch(format: ColorFormat, width: u32) -> u32 {
    if format.is_compressed() {
        format.byte_size(width, 4) as u32
    } else {
        format.byte_size(width, 1) as u32
    }
}

fn creation_error(what: &str, err: windows::core::Error) -> Error {
    if err.code() == windows::Win32::Graphics::Dxgi::DXGI_ERROR_DEVICE_REMOVED
        || err.code() == windows::Win32::Graphics::Dxgi::DXGI_ERROR_DEVICE_RESET
    {
        return Error::DeviceLost;
    }
    Error::ResourceCreation(format!("{what}: {err}"))
}

fn backend_error(what: &str, err: windows::core::Error) -> Error {
    if err.code() == windows::Win32::Graphics::Dxgi::DXGI_ERROR_DEVICE_REMOVED
        || err.code() == windows::Win32::Graphics::Dxgi::DXGI_ERROR_DEVICE_RESET
    {
        return Error::DeviceLost;
    }
    Error::BackendError(format!("{what}: {err}"))
}

// ===== THE DEVICE =====

/// D3D11 device + immediate context on one DXGI adapter
pub struct D3d11Device {
    adapter_index: u32,
    factory: IDXGIFactory1,
    adapter: IDXGIAdapter1,
    device: ID3D11Device,
    context: ID3D11DeviceContext,
    description: String,
}

// single rendering thread, enforced by the abstraction layer
unsafe impl Send for D3d11Device {}

impl D3d11Device {
    /// Create the device on the adapter at `adapter_index` (0 = default)
    pub fn new(adapter_index: u32) -> Result<Self> {
        let factory: IDXGIFactory1 = unsafe { CreateDXGIFactory1() }
            .map_err(|e| Error::InitializationFailed(format!("CreateDXGIFactory1: {e}")))?;
        let adapter = unsafe { factory.EnumAdapters1(adapter_index) }
            .map_err(|e| Error::InitializationFailed(format!("adapter {adapter_index}: {e}")))?;

        let (device, context, feature_level) = Self::create_device_on(&adapter)?;
        let description = Self::adapter_description(&adapter, feature_level);
        gfx_info!(SOURCE, "initialized D3D11 on {}", description);

        Ok(Self {
            adapter_index,
            factory,
            adapter,
            device,
            context,
            description,
        })
    }

    fn create_device_on(
        adapter: &IDXGIAdapter1,
    ) -> Result<(ID3D11Device, ID3D11DeviceContext, D3D_FEATURE_LEVEL)> {
        let mut device = None;
        let mut context = None;
        let mut level = D3D_FEATURE_LEVEL_10_0;
        unsafe {
            D3D11CreateDevice(
                adapter,
                D3D_DRIVER_TYPE_UNKNOWN,
                HMODULE::default(),
                D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                Some(&FEATURE_LEVELS),
                D3D11_SDK_VERSION,
                Some(&mut device),
                Some(&mut level),
                Some(&mut context),
            )
        }
        .map_err(|e| Error::InitializationFailed(format!("D3D11CreateDevice: {e}")))?;

        let device =
            device.ok_or_else(|| Error::InitializationFailed("no device returned".to_string()))?;
        let context =
            context.ok_or_else(|| Error::InitializationFailed("no context returned".to_string()))?;
        Ok((device, context, level))
    }

    fn adapter_description(adapter: &IDXGIAdapter1, level: D3D_FEATURE_LEVEL) -> String {
        let name = unsafe { adapter.GetDesc1() }
            .map(|desc| {
                let len = desc.Description.iter().position(|&c| c == 0).unwrap_or(128);
                String::from_utf16_lossy(&desc.Description[..len])
            })
            .unwrap_or_else(|_| "unknown adapter".to_string());
        format!("{} (feature level {:#x})", name, level.0)
    }

    fn texture_set_from(
        &mut self,
        texture: ID3D11Texture2D,
        desc: &TextureDesc,
    ) -> Result<NativeTextureSet> {
        let format = color_format_to_dxgi(desc.format);

        let mut render_targets = Vec::new();
        for face in 0..desc.render_target_count() {
            let rtv_desc = if desc.flags.contains(TextureFlags::CUBEMAP) {
                D3D11_RENDER_TARGET_VIEW_DESC {
                    Format: format,
                    ViewDimension: D3D11_RTV_DIMENSION_TEXTURE2DARRAY,
                    Anonymous: D3D11_RENDER_TARGET_VIEW_DESC_0 {
                        Texture2DArray: D3D11_TEX2D_ARRAY_RTV {
                            MipSlice: 0,
                            FirstArraySlice: face,
                            ArraySize: 1,
                        },
                    },
                }
            } else {
                D3D11_RENDER_TARGET_VIEW_DESC {
                    Format: format,
                    ViewDimension: D3D11_RTV_DIMENSION_TEXTURE2D,
                    Anonymous: D3D11_RENDER_TARGET_VIEW_DESC_0 {
                        Texture2D: D3D11_TEX2D_RTV { MipSlice: 0 },
                    },
                }
            };
            let mut rtv = None;
            unsafe {
                self.device
                    .CreateRenderTargetView(&texture, Some(&rtv_desc), Some(&mut rtv))
            }
            .map_err(|e| creation_error("CreateRenderTargetView", e))?;
            let rtv = rtv.ok_or_else(|| {
                Error::ResourceCreation("no render-target view returned".to_string())
            })?;
            render_targets.push(Box::new(D3dRenderTargetView(rtv)) as NativeHandle);
        }

        let mut srv = None;
        unsafe {
            self.device
                .CreateShaderResourceView(&texture, None, Some(&mut srv))
        }
        .map_err(|e| creation_error("CreateShaderResourceView", e))?;
        let shader_resource = srv.map(|v| Box::new(D3dShaderResourceView(v)) as NativeHandle);

        let gdi_surface = if desc.flags.contains(TextureFlags::GDI_COMPATIBLE) {
            let surface: IDXGISurface1 = texture
                .cast()
                .map_err(|e| creation_error("IDXGISurface1 cast", e))?;
            Some(Box::new(D3dGdiSurface(surface)) as NativeHandle)
        } else {
            None
        };

        let shared_handle = if desc.flags.contains(TextureFlags::SHARED) {
            let resource: IDXGIResource = texture
                .cast()
                .map_err(|e| creation_error("IDXGIResource cast", e))?;
            let handle = unsafe { resource.GetSharedHandle() }
                .map_err(|e| creation_error("GetSharedHandle", e))?;
            Some(handle.0 as usize as u32)
        } else {
            None
        };

        Ok(NativeTextureSet {
            texture: Box::new(D3dTexture(texture)),
            render_targets,
            shader_resource,
            gdi_surface,
            shared_handle,
        })
    }

    fn compile_shader(&self, source: &str, file: &str, target: &[u8]) -> Result<ID3DBlob> {
        let file_name = CString::new(file).unwrap_or_default();
        let entry = PCSTR(b"main\0".as_ptr());
        let mut code = None;
        let mut errors: Option<ID3DBlob> = None;
        let result = unsafe {
            D3DCompile(
                source.as_ptr() as *const c_void,
                source.len(),
                PCSTR(file_name.as_ptr() as *const u8),
                None,
                None,
                entry,
                PCSTR(target.as_ptr()),
                D3DCOMPILE_OPTIMIZATION_LEVEL1,
                0,
                &mut code,
                Some(&mut errors),
            )
        };
        if let Err(err) = result {
            let message = errors
                .map(|blob| unsafe {
                    let bytes = std::slice::from_raw_parts(
                        blob.GetBufferPointer() as *const u8,
                        blob.GetBufferSize(),
                    );
                    String::from_utf8_lossy(bytes).into_owned()
                })
                .unwrap_or_else(|| err.to_string());
            return Err(Error::ShaderCompile {
                file: file.to_string(),
                message,
            });
        }
        code.ok_or_else(|| Error::ShaderCompile {
            file: file.to_string(),
            message: "compiler returned no bytecode".to_string(),
        })
    }

    fn input_layout_from(
        &self,
        attributes: &[VertexAttribute],
        bytecode: &ID3DBlob,
    ) -> Result<ID3D11InputLayout> {
        // one input slot per attribute, matching the per-stream buffer list
        let mut elements = Vec::with_capacity(attributes.len());
        for (slot, attribute) in attributes.iter().enumerate() {
            let (semantic, index, format): (&[u8], u32, DXGI_FORMAT) = match attribute {
                VertexAttribute::Position => {
                    (b"POSITION\0", 0, DXGI_FORMAT_R32G32B32A32_FLOAT)
                }
                VertexAttribute::Normal => (b"NORMAL\0", 0, DXGI_FORMAT_R32G32B32A32_FLOAT),
                VertexAttribute::Tangent => (b"TANGENT\0", 0, DXGI_FORMAT_R32G32B32A32_FLOAT),
                VertexAttribute::Color => (b"COLOR\0", 0, DXGI_FORMAT_R8G8B8A8_UNORM),
                VertexAttribute::TexCoord { unit, width } => {
                    let format = match width {
                        1 => DXGI_FORMAT_R32_FLOAT,
                        2 => DXGI_FORMAT_R32G32_FLOAT,
                        3 => DXGI_FORMAT_R32G32B32_FLOAT,
                        _ => DXGI_FORMAT_R32G32B32A32_FLOAT,
                    };
                    (b"TEXCOORD\0", *unit, format)
                }
            };
            elements.push(D3D11_INPUT_ELEMENT_DESC {
                SemanticName: PCSTR(semantic.as_ptr()),
                SemanticIndex: index,
                Format: format,
                InputSlot: slot as u32,
                AlignedByteOffset: 0,
                InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
                InstanceDataStepRate: 0,
            });
        }

        let bytes = unsafe {
            std::slice::from_raw_parts(
                bytecode.GetBufferPointer() as *const u8,
                bytecode.GetBufferSize(),
            )
        };
        let mut layout = None;
        unsafe {
            self.device
                .CreateInputLayout(&elements, bytes, Some(&mut layout))
        }
        .map_err(|e| creation_error("CreateInputLayout", e))?;
        layout.ok_or_else(|| Error::ResourceCreation("no input layout returned".to_string()))
    }

    fn output_for_monitor(&self, monitor: u32) -> Result<IDXGIOutput1> {
        let output = unsafe { self.adapter.EnumOutputs(monitor) }
            .map_err(|e| Error::ResourceCreation(format!("monitor {monitor}: {e}")))?;
        output
            .cast()
            .map_err(|e| creation_error("IDXGIOutput1 cast", e))
    }
}

impl NativeDevice for D3d11Device {
    fn description(&self) -> String {
        self.description.clone()
    }

    fn reset(&mut self) -> Result<()> {
        unsafe { self.context.ClearState() };
        // re-resolve the adapter in case the old one disappeared with the device
        self.adapter = unsafe { self.factory.EnumAdapters1(self.adapter_index) }
            .map_err(|e| Error::InitializationFailed(format!("adapter {}: {e}", self.adapter_index)))?;
        let (device, context, level) = Self::create_device_on(&self.adapter)?;
        self.device = device;
        self.context = context;
        self.description = Self::adapter_description(&self.adapter, level);
        gfx_info!(SOURCE, "device recreated on {}", self.description);
        Ok(())
    }

    // --- buffers ---

    fn create_buffer(&mut self, desc: &BufferDesc, initial: Option<&[u8]>) -> Result<NativeHandle> {
        // constant buffers are always rewritten in full, keep them mappable
        let dynamic = desc.dynamic || desc.kind == BufferKind::Constant;
        let bind = match desc.kind {
            BufferKind::Vertex => D3D11_BIND_VERTEX_BUFFER,
            BufferKind::Index => D3D11_BIND_INDEX_BUFFER,
            BufferKind::Constant => D3D11_BIND_CONSTANT_BUFFER,
        };
        let buffer_desc = D3D11_BUFFER_DESC {
            ByteWidth: desc.size as u32,
            Usage: if dynamic { D3D11_USAGE_DYNAMIC } else { D3D11_USAGE_DEFAULT },
            BindFlags: bind.0 as u32,
            CPUAccessFlags: if dynamic { D3D11_CPU_ACCESS_WRITE.0 as u32 } else { 0 },
            MiscFlags: 0,
            StructureByteStride: 0,
        };
        let subresource = initial.map(|data| D3D11_SUBRESOURCE_DATA {
            pSysMem: data.as_ptr() as *const c_void,
            SysMemPitch: 0,
            SysMemSlicePitch: 0,
        });

        let mut buffer = None;
        unsafe {
            self.device.CreateBuffer(
                &buffer_desc,
                subresource.as_ref().map(|s| s as *const _),
                Some(&mut buffer),
            )
        }
        .map_err(|e| creation_error("CreateBuffer", e))?;
        let buffer =
            buffer.ok_or_else(|| Error::ResourceCreation("no buffer returned".to_string()))?;
        Ok(Box::new(D3dBuffer(buffer)))
    }

    fn update_buffer(&mut self, buffer: &NativeHandle, data: &[u8]) -> Result<()> {
        let buffer = &downcast::<D3dBuffer>(buffer, "buffer")?.0;
        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            self.context
                .Map(buffer, 0, D3D11_MAP_WRITE_DISCARD, 0, Some(&mut mapped))
        }
        .map_err(|e| backend_error("Map buffer", e))?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.pData as *mut u8, data.len());
            self.context.Unmap(buffer, 0);
        }
        Ok(())
    }

    // --- textures and surfaces ---

    fn create_texture_2d(
        &mut self,
        desc: &TextureDesc,
        initial: &[Vec<u8>],
    ) -> Result<NativeTextureSet> {
        let gen_mips = desc.flags.contains(TextureFlags::GEN_MIPMAPS) && desc.levels > 1;
        let cube = desc.flags.contains(TextureFlags::CUBEMAP);

        let mut bind = D3D11_BIND_SHADER_RESOURCE.0 as u32;
        if desc.flags.contains(TextureFlags::RENDER_TARGET) || gen_mips {
            bind |= D3D11_BIND_RENDER_TARGET.0 as u32;
        }
        let mut misc = 0u32;
        if cube {
            misc |= D3D11_RESOURCE_MISC_TEXTURECUBE.0 as u32;
        }
        if gen_mips {
            misc |= D3D11_RESOURCE_MISC_GENERATE_MIPS.0 as u32;
        }
        if desc.flags.contains(TextureFlags::SHARED) {
            misc |= D3D11_RESOURCE_MISC_SHARED.0 as u32;
        }
        if desc.flags.contains(TextureFlags::GDI_COMPATIBLE) {
            misc |= D3D11_RESOURCE_MISC_GDI_COMPATIBLE.0 as u32;
        }

        let dynamic = desc.flags.contains(TextureFlags::DYNAMIC);
        let texture_desc = D3D11_TEXTURE2D_DESC {
            Width: desc.width,
            Height: desc.height,
            MipLevels: desc.levels,
            ArraySize: if cube { 6 } else { 1 },
            Format: color_format_to_dxgi(desc.format),
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Usage: if dynamic { D3D11_USAGE_DYNAMIC } else { D3D11_USAGE_DEFAULT },
            BindFlags: bind,
            CPUAccessFlags: if dynamic { D3D11_CPU_ACCESS_WRITE.0 as u32 } else { 0 },
            MiscFlags: misc,
        };

        // hardware-generated mips get their level 0 uploaded after creation
        let subresources: Vec<D3D11_SUBRESOURCE_DATA> = if gen_mips {
            Vec::new()
        } else {
            initial
                .iter()
                .enumerate()
                .map(|(i, image)| {
                    let level = (i as u32) % desc.levels;
                    let (w, _) = nebula_graphics::nebula::format::mip_dimensions(
                        desc.width,
                        desc.height,
                        level,
                    );
                    D3D11_SUBRESOURCE_DATA {
                        pSysMem: image.as_ptr() as *const c_void,
                        SysMemPitch: row_pitch(desc.format, w),
                        SysMemSlicePitch: 0,
                    }
                })
                .collect()
        };

        let mut texture = None;
        unsafe {
            self.device.CreateTexture2D(
                &texture_desc,
                if subresources.is_empty() { None } else { Some(subresources.as_ptr()) },
                Some(&mut texture),
            )
        }
        .map_err(|e| creation_error("CreateTexture2D", e))?;
        let texture =
            texture.ok_or_else(|| Error::ResourceCreation("no texture returned".to_string()))?;

        let set = self.texture_set_from(texture, desc)?;

        if gen_mips {
            let texture = &downcast::<D3dTexture>(&set.texture, "texture")?.0;
            for (face, image) in initial.iter().enumerate() {
                let subresource = (face as u32) * desc.levels;
                unsafe {
                    self.context.UpdateSubresource(
                        texture,
                        subresource,
                        None,
                        image.as_ptr() as *const c_void,
                        row_pitch(desc.format, desc.width),
                        0,
                    );
                }
            }
            if let Some(srv) = &set.shader_resource {
                let srv = &downcast::<D3dShaderResourceView>(srv, "shader-resource view")?.0;
                unsafe { self.context.GenerateMips(srv) };
            }
        }
        Ok(set)
    }

    fn open_shared_texture(&mut self, handle: u32) -> Result<(NativeTextureSet, TextureDesc)> {
        let texture: ID3D11Texture2D = unsafe {
            self.device
                .OpenSharedResource(HANDLE(handle as usize as *mut c_void))
        }
        .map_err(|e| creation_error("OpenSharedResource", e))?;

        let mut native_desc = D3D11_TEXTURE2D_DESC::default();
        unsafe { texture.GetDesc(&mut native_desc) };
        let desc = TextureDesc {
            width: native_desc.Width,
            height: native_desc.Height,
            format: dxgi_to_color_format(native_desc.Format),
            levels: native_desc.MipLevels.max(1),
            flags: TextureFlags::SHARED,
        };

        let mut srv = None;
        unsafe {
            self.device
                .CreateShaderResourceView(&texture, None, Some(&mut srv))
        }
        .map_err(|e| creation_error("CreateShaderResourceView", e))?;

        let set = NativeTextureSet {
            texture: Box::new(D3dTexture(texture)),
            render_targets: Vec::new(),
            shader_resource: srv.map(|v| Box::new(D3dShaderResourceView(v)) as NativeHandle),
            gdi_surface: None,
            shared_handle: Some(handle),
        };
        Ok((set, desc))
    }

    fn update_texture(&mut self, texture: &NativeHandle, data: &[u8], row_pitch: u32) -> Result<()> {
        let texture = &downcast::<D3dTexture>(texture, "texture")?.0;
        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            self.context
                .Map(texture, 0, D3D11_MAP_WRITE_DISCARD, 0, Some(&mut mapped))
        }
        .map_err(|e| backend_error("Map texture", e))?;

        // driver pitch can exceed the packed pitch; copy row by row
        let rows = data.len() / row_pitch.max(1) as usize;
        let copy = (row_pitch as usize).min(mapped.RowPitch as usize);
        unsafe {
            for row in 0..rows {
                std::ptr::copy_nonoverlapping(
                    data.as_ptr().add(row * row_pitch as usize),
                    (mapped.pData as *mut u8).add(row * mapped.RowPitch as usize),
                    copy,
                );
            }
            self.context.Unmap(texture, 0);
        }
        Ok(())
    }

    fn create_depth_stencil(
        &mut self,
        width: u32,
        height: u32,
        format: DepthStencilFormat,
    ) -> Result<NativeDepthStencil> {
        let texture_desc = D3D11_TEXTURE2D_DESC {
            Width: width,
            Height: height,
            MipLevels: 1,
            ArraySize: 1,
            Format: depth_format_to_dxgi(format),
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Usage: D3D11_USAGE_DEFAULT,
            BindFlags: D3D11_BIND_DEPTH_STENCIL.0 as u32,
            CPUAccessFlags: 0,
            MiscFlags: 0,
        };
        let mut texture = None;
        unsafe {
            self.device
                .CreateTexture2D(&texture_desc, None, Some(&mut texture))
        }
        .map_err(|e| creation_error("CreateTexture2D (depth)", e))?;
        let texture =
            texture.ok_or_else(|| Error::ResourceCreation("no texture returned".to_string()))?;

        let mut view = None;
        unsafe {
            self.device
                .CreateDepthStencilView(&texture, None, Some(&mut view))
        }
        .map_err(|e| creation_error("CreateDepthStencilView", e))?;
        let view =
            view.ok_or_else(|| Error::ResourceCreation("no depth view returned".to_string()))?;

        Ok(NativeDepthStencil {
            texture: Box::new(D3dTexture(texture)),
            view: Box::new(D3dDepthStencilView(view)),
        })
    }

    fn create_stage_surface(
        &mut self,
        width: u32,
        height: u32,
        format: ColorFormat,
    ) -> Result<NativeHandle> {
        let texture_desc = D3D11_TEXTURE2D_DESC {
            Width: width,
            Height: height,
            MipLevels: 1,
            ArraySize: 1,
            Format: color_format_to_dxgi(format),
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Usage: D3D11_USAGE_STAGING,
            BindFlags: 0,
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            MiscFlags: 0,
        };
        let mut texture = None;
        unsafe {
            self.device
                .CreateTexture2D(&texture_desc, None, Some(&mut texture))
        }
        .map_err(|e| creation_error("CreateTexture2D (staging)", e))?;
        let texture =
            texture.ok_or_else(|| Error::ResourceCreation("no texture returned".to_string()))?;
        Ok(Box::new(D3dTexture(texture)))
    }

    fn stage_texture(&mut self, dst_stage: &NativeHandle, src_texture: &NativeHandle) -> Result<()> {
        let dst = &downcast::<D3dTexture>(dst_stage, "staging surface")?.0;
        let src = &downcast::<D3dTexture>(src_texture, "texture")?.0;
        unsafe { self.context.CopyResource(dst, src) };
        Ok(())
    }

    fn map_stage_surface(&mut self, surface: &NativeHandle) -> Result<MappedSurface> {
        let texture = &downcast::<D3dTexture>(surface, "staging surface")?.0;
        let mut desc = D3D11_TEXTURE2D_DESC::default();
        unsafe { texture.GetDesc(&mut desc) };

        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            self.context
                .Map(texture, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
        }
        .map_err(|e| backend_error("Map staging surface", e))?;

        let size = (mapped.RowPitch as usize) * (desc.Height as usize);
        let data = unsafe { std::slice::from_raw_parts(mapped.pData as *const u8, size).to_vec() };
        unsafe { self.context.Unmap(texture, 0) };

        Ok(MappedSurface {
            data,
            row_pitch: mapped.RowPitch,
        })
    }

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
    ) -> Result<()> {
        let dst = &downcast::<D3dTexture>(dst, "texture")?.0;
        let src = &downcast::<D3dTexture>(src, "texture")?.0;
        let src_box = D3D11_BOX {
            left: src_x,
            top: src_y,
            front: 0,
            right: src_x + width,
            bottom: src_y + height,
            back: 1,
        };
        unsafe {
            self.context
                .CopySubresourceRegion(dst, 0, dst_x, dst_y, 0, src, 0, Some(&src_box))
        };
        Ok(())
    }

    // --- samplers and shaders ---

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<NativeHandle> {
        let border = [
            ((desc.border_color >> 24) & 0xff) as f32 / 255.0,
            ((desc.border_color >> 16) & 0xff) as f32 / 255.0,
            ((desc.border_color >> 8) & 0xff) as f32 / 255.0,
            (desc.border_color & 0xff) as f32 / 255.0,
        ];
        let sampler_desc = D3D11_SAMPLER_DESC {
            Filter: filter_to_d3d11(desc.filter, desc.comparison.is_some()),
            AddressU: address_mode_to_d3d11(desc.address_u),
            AddressV: address_mode_to_d3d11(desc.address_v),
            AddressW: address_mode_to_d3d11(desc.address_w),
            MipLODBias: 0.0,
            MaxAnisotropy: desc.max_anisotropy.max(1),
            ComparisonFunc: desc
                .comparison
                .map(compare_func_to_d3d11)
                .unwrap_or(D3D11_COMPARISON_NEVER),
            BorderColor: border,
            MinLOD: f32::MIN,
            MaxLOD: f32::MAX,
        };
        let mut sampler = None;
        unsafe {
            self.device
                .CreateSamplerState(&sampler_desc, Some(&mut sampler))
        }
        .map_err(|e| creation_error("CreateSamplerState", e))?;
        let sampler =
            sampler.ok_or_else(|| Error::ResourceCreation("no sampler returned".to_string()))?;
        Ok(Box::new(D3dSampler(sampler)))
    }

    fn create_vertex_shader(
        &mut self,
        source: &str,
        file: &str,
        attributes: &[VertexAttribute],
    ) -> Result<NativeVertexShader> {
        let bytecode = self.compile_shader(source, file, b"vs_4_0\0")?;
        let bytes = unsafe {
            std::slice::from_raw_parts(
                bytecode.GetBufferPointer() as *const u8,
                bytecode.GetBufferSize(),
            )
        };
        let mut shader = None;
        unsafe {
            self.device
                .CreateVertexShader(bytes, None, Some(&mut shader))
        }
        .map_err(|e| creation_error("CreateVertexShader", e))?;
        let shader =
            shader.ok_or_else(|| Error::ResourceCreation("no shader returned".to_string()))?;

        let layout = self.input_layout_from(attributes, &bytecode)?;
        Ok(NativeVertexShader {
            shader: Box::new(D3dVertexShader(shader)),
            input_layout: Box::new(D3dInputLayout(layout)),
        })
    }

    fn create_pixel_shader(&mut self, source: &str, file: &str) -> Result<NativeHandle> {
        let bytecode = self.compile_shader(source, file, b"ps_4_0\0")?;
        let bytes = unsafe {
            std::slice::from_raw_parts(
                bytecode.GetBufferPointer() as *const u8,
                bytecode.GetBufferSize(),
            )
        };
        let mut shader = None;
        unsafe {
            self.device
                .CreatePixelShader(bytes, None, Some(&mut shader))
        }
        .map_err(|e| creation_error("CreatePixelShader", e))?;
        let shader =
            shader.ok_or_else(|| Error::ResourceCreation("no shader returned".to_string()))?;
        Ok(Box::new(D3dPixelShader(shader)))
    }

    // --- pipeline state objects ---

    fn create_blend_state(&mut self, desc: &BlendState) -> Result<NativeHandle> {
        let mut write_mask = 0u8;
        if desc.red_enabled {
            write_mask |= D3D11_COLOR_WRITE_ENABLE_RED.0 as u8;
        }
        if desc.green_enabled {
            write_mask |= D3D11_COLOR_WRITE_ENABLE_GREEN.0 as u8;
        }
        if desc.blue_enabled {
            write_mask |= D3D11_COLOR_WRITE_ENABLE_BLUE.0 as u8;
        }
        if desc.alpha_enabled {
            write_mask |= D3D11_COLOR_WRITE_ENABLE_ALPHA.0 as u8;
        }

        let target = D3D11_RENDER_TARGET_BLEND_DESC {
            BlendEnable: desc.blend_enabled.into(),
            SrcBlend: blend_factor_to_d3d11(desc.src_factor_c),
            DestBlend: blend_factor_to_d3d11(desc.dst_factor_c),
            BlendOp: D3D11_BLEND_OP_ADD,
            SrcBlendAlpha: blend_factor_to_d3d11(desc.src_factor_a),
            DestBlendAlpha: blend_factor_to_d3d11(desc.dst_factor_a),
            BlendOpAlpha: D3D11_BLEND_OP_ADD,
            RenderTargetWriteMask: write_mask,
        };
        let blend_desc = D3D11_BLEND_DESC {
            AlphaToCoverageEnable: false.into(),
            IndependentBlendEnable: false.into(),
            RenderTarget: [target; 8],
        };

        let mut state = None;
        unsafe { self.device.CreateBlendState(&blend_desc, Some(&mut state)) }
            .map_err(|e| creation_error("CreateBlendState", e))?;
        let state =
            state.ok_or_else(|| Error::ResourceCreation("no blend state returned".to_string()))?;
        Ok(Box::new(D3dBlendState(state)))
    }

    fn create_raster_state(&mut self, desc: &RasterState) -> Result<NativeHandle> {
        let raster_desc = D3D11_RASTERIZER_DESC {
            FillMode: D3D11_FILL_SOLID,
            CullMode: cull_mode_to_d3d11(desc.cull_mode),
            FrontCounterClockwise: false.into(),
            DepthBias: 0,
            DepthBiasClamp: 0.0,
            SlopeScaledDepthBias: 0.0,
            DepthClipEnable: true.into(),
            ScissorEnable: desc.scissor_enabled.into(),
            MultisampleEnable: false.into(),
            AntialiasedLineEnable: false.into(),
        };
        let mut state = None;
        unsafe {
            self.device
                .CreateRasterizerState(&raster_desc, Some(&mut state))
        }
        .map_err(|e| creation_error("CreateRasterizerState", e))?;
        let state = state
            .ok_or_else(|| Error::ResourceCreation("no rasterizer state returned".to_string()))?;
        Ok(Box::new(D3dRasterState(state)))
    }

    fn create_depth_stencil_state(&mut self, desc: &DepthStencilState) -> Result<NativeHandle> {
        let face = |side: &nebula_graphics::nebula::state::StencilSide| D3D11_DEPTH_STENCILOP_DESC {
            StencilFailOp: stencil_op_to_d3d11(side.fail),
            StencilDepthFailOp: stencil_op_to_d3d11(side.zfail),
            StencilPassOp: stencil_op_to_d3d11(side.zpass),
            StencilFunc: compare_func_to_d3d11(side.test),
        };
        let zstencil_desc = D3D11_DEPTH_STENCIL_DESC {
            DepthEnable: desc.depth_enabled.into(),
            DepthWriteMask: if desc.depth_write_enabled {
                D3D11_DEPTH_WRITE_MASK_ALL
            } else {
                D3D11_DEPTH_WRITE_MASK_ZERO
            },
            DepthFunc: compare_func_to_d3d11(desc.depth_func),
            StencilEnable: desc.stencil_enabled.into(),
            StencilReadMask: 0xff,
            StencilWriteMask: if desc.stencil_write_enabled { 0xff } else { 0 },
            FrontFace: face(&desc.stencil_front),
            BackFace: face(&desc.stencil_back),
        };
        let mut state = None;
        unsafe {
            self.device
                .CreateDepthStencilState(&zstencil_desc, Some(&mut state))
        }
        .map_err(|e| creation_error("CreateDepthStencilState", e))?;
        let state = state
            .ok_or_else(|| Error::ResourceCreation("no depth-stencil state returned".to_string()))?;
        Ok(Box::new(D3dZStencilState(state)))
    }

    // --- swap chain ---

    fn create_swap_chain(&mut self, init: &SwapChainInit) -> Result<NativeHandle> {
        let hwnd = match init.window {
            RawWindowHandle::Win32(handle) => HWND(handle.hwnd.get() as *mut c_void),
            _ => {
                return Err(Error::ResourceCreation(
                    "swap chain requires a Win32 window handle".to_string(),
                ))
            }
        };

        let desc = DXGI_SWAP_CHAIN_DESC {
            BufferDesc: DXGI_MODE_DESC {
                Width: init.width,
                Height: init.height,
                RefreshRate: DXGI_RATIONAL { Numerator: 0, Denominator: 0 },
                Format: color_format_to_dxgi(init.format),
                ScanlineOrdering: DXGI_MODE_SCANLINE_ORDER_UNSPECIFIED,
                Scaling: DXGI_MODE_SCALING_UNSPECIFIED,
            },
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: init.num_buffers,
            OutputWindow: hwnd,
            Windowed: true.into(),
            SwapEffect: DXGI_SWAP_EFFECT_DISCARD,
            Flags: 0,
        };

        let mut swap = None;
        unsafe { self.factory.CreateSwapChain(&self.device, &desc, &mut swap) }
            .ok()
            .map_err(|e| creation_error("CreateSwapChain", e))?;
        let swap =
            swap.ok_or_else(|| Error::ResourceCreation("no swap chain returned".to_string()))?;
        Ok(Box::new(D3dSwapChain(swap)))
    }

    fn swap_chain_target(
        &mut self,
        swap: &NativeHandle,
        _init: &SwapChainInit,
    ) -> Result<NativeTextureSet> {
        let swap = &downcast::<D3dSwapChain>(swap, "swap chain")?.0;
        let back_buffer: ID3D11Texture2D = unsafe { swap.GetBuffer(0) }
            .map_err(|e| creation_error("GetBuffer", e))?;

        let mut rtv = None;
        unsafe {
            self.device
                .CreateRenderTargetView(&back_buffer, None, Some(&mut rtv))
        }
        .map_err(|e| creation_error("CreateRenderTargetView", e))?;
        let rtv = rtv.ok_or_else(|| {
            Error::ResourceCreation("no render-target view returned".to_string())
        })?;

        Ok(NativeTextureSet {
            texture: Box::new(D3dTexture(back_buffer)),
            render_targets: vec![Box::new(D3dRenderTargetView(rtv))],
            shader_resource: None,
            gdi_surface: None,
            shared_handle: None,
        })
    }

    fn resize_swap_chain(
        &mut self,
        swap: &NativeHandle,
        width: u32,
        height: u32,
        format: ColorFormat,
    ) -> Result<()> {
        let swap = &downcast::<D3dSwapChain>(swap, "swap chain")?.0;
        unsafe {
            swap.ResizeBuffers(
                0,
                width,
                height,
                color_format_to_dxgi(format),
                DXGI_SWAP_CHAIN_FLAG(0),
            )
        }
        .map_err(|e| backend_error("ResizeBuffers", e))
    }

    fn present(&mut self, swap: &NativeHandle) -> Result<()> {
        let swap = &downcast::<D3dSwapChain>(swap, "swap chain")?.0;
        let hr = unsafe { swap.Present(0, DXGI_PRESENT(0)) };
        if hr == DXGI_ERROR_DEVICE_REMOVED || hr == DXGI_ERROR_DEVICE_RESET {
            return Err(Error::DeviceLost);
        }
        hr.ok().map_err(|e| backend_error("Present", e))
    }

    // --- screen duplication ---

    fn create_duplicator(&mut self, monitor: u32) -> Result<(NativeHandle, u32, u32, ColorFormat)> {
        let output = self.output_for_monitor(monitor)?;
        let duplication = unsafe { output.DuplicateOutput(&self.device) }
            .map_err(|e| creation_error("DuplicateOutput", e))?;

        let mut desc = DXGI_OUTDUPL_DESC::default();
        unsafe { duplication.GetDesc(&mut desc) };
        let width = desc.ModeDesc.Width;
        let height = desc.ModeDesc.Height;
        let format = dxgi_to_color_format(desc.ModeDesc.Format);

        Ok((Box::new(D3dDuplicator(duplication)), width, height, format))
    }

    fn duplicate_frame(&mut self, duplicator: &NativeHandle, target: &NativeHandle) -> Result<bool> {
        let duplication = &downcast::<D3dDuplicator>(duplicator, "duplicator")?.0;
        let target = &downcast::<D3dTexture>(target, "texture")?.0;

        let mut info = DXGI_OUTDUPL_FRAME_INFO::default();
        let mut resource = None;
        let acquired = unsafe { duplication.AcquireNextFrame(0, &mut info, &mut resource) };
        if let Err(err) = acquired {
            if err.code() == DXGI_ERROR_WAIT_TIMEOUT {
                return Ok(false);
            }
            return Err(backend_error("AcquireNextFrame", err));
        }

        let result = resource
            .ok_or_else(|| Error::BackendError("no duplication frame resource".to_string()))
            .and_then(|resource: IDXGIResource| {
                let frame: ID3D11Texture2D = resource
                    .cast()
                    .map_err(|e| backend_error("frame texture cast", e))?;
                unsafe { self.context.CopyResource(target, &frame) };
                Ok(true)
            });
        unsafe { duplication.ReleaseFrame() }
            .map_err(|e| backend_error("ReleaseFrame", e))?;
        result
    }

    // --- immediate-context binding and drawing ---

    fn bind_render_target(
        &mut self,
        color: Option<&NativeHandle>,
        depth: Option<&NativeHandle>,
    ) -> Result<()> {
        let rtv = match color {
            Some(handle) => {
                Some(downcast::<D3dRenderTargetView>(handle, "render-target view")?.0.clone())
            }
            None => None,
        };
        let dsv = match depth {
            Some(handle) => {
                Some(downcast::<D3dDepthStencilView>(handle, "depth-stencil view")?.0.clone())
            }
            None => None,
        };
        unsafe {
            self.context
                .OMSetRenderTargets(Some(&[rtv]), dsv.as_ref())
        };
        Ok(())
    }

    fn clear_render_target(&mut self, color_view: &NativeHandle, rgba: [f32; 4]) -> Result<()> {
        let rtv = &downcast::<D3dRenderTargetView>(color_view, "render-target view")?.0;
        unsafe { self.context.ClearRenderTargetView(rtv, &rgba) };
        Ok(())
    }

    fn clear_depth_stencil(
        &mut self,
        view: &NativeHandle,
        depth: Option<f32>,
        stencil: Option<u8>,
    ) -> Result<()> {
        let dsv = &downcast::<D3dDepthStencilView>(view, "depth-stencil view")?.0;
        let mut flags = 0u32;
        if depth.is_some() {
            flags |= D3D11_CLEAR_DEPTH.0 as u32;
        }
        if stencil.is_some() {
            flags |= D3D11_CLEAR_STENCIL.0 as u32;
        }
        if flags == 0 {
            return Ok(());
        }
        unsafe {
            self.context.ClearDepthStencilView(
                dsv,
                flags,
                depth.unwrap_or(1.0),
                stencil.unwrap_or(0),
            )
        };
        Ok(())
    }

    fn bind_vertex_buffers(
        &mut self,
        buffers: &[Option<&NativeHandle>],
        strides: &[u32],
    ) -> Result<()> {
        let mut native: Vec<Option<ID3D11Buffer>> = Vec::with_capacity(buffers.len());
        for buffer in buffers {
            native.push(match buffer {
                Some(handle) => Some(downcast::<D3dBuffer>(handle, "buffer")?.0.clone()),
                None => None,
            });
        }
        let offsets = vec![0u32; buffers.len()];
        unsafe {
            self.context.IASetVertexBuffers(
                0,
                native.len() as u32,
                Some(native.as_ptr()),
                Some(strides.as_ptr()),
                Some(offsets.as_ptr()),
            )
        };
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: &NativeHandle, index_type: IndexType) -> Result<()> {
        let buffer = &downcast::<D3dBuffer>(buffer, "buffer")?.0;
        let format = match index_type {
            IndexType::U16 => DXGI_FORMAT_R16_UINT,
            IndexType::U32 => DXGI_FORMAT_R32_UINT,
        };
        unsafe { self.context.IASetIndexBuffer(buffer, format, 0) };
        Ok(())
    }

    fn bind_vertex_shader(
        &mut self,
        shader: &NativeHandle,
        layout: &NativeHandle,
        constants: Option<&NativeHandle>,
    ) -> Result<()> {
        let shader = &downcast::<D3dVertexShader>(shader, "vertex shader")?.0;
        let layout = &downcast::<D3dInputLayout>(layout, "input layout")?.0;
        let constants = match constants {
            Some(handle) => Some(downcast::<D3dBuffer>(handle, "constant buffer")?.0.clone()),
            None => None,
        };
        unsafe {
            self.context.IASetInputLayout(layout);
            self.context.VSSetShader(shader, None);
            self.context.VSSetConstantBuffers(0, Some(&[constants]));
        }
        Ok(())
    }

    fn bind_pixel_shader(
        &mut self,
        shader: &NativeHandle,
        constants: Option<&NativeHandle>,
    ) -> Result<()> {
        let shader = &downcast::<D3dPixelShader>(shader, "pixel shader")?.0;
        let constants = match constants {
            Some(handle) => Some(downcast::<D3dBuffer>(handle, "constant buffer")?.0.clone()),
            None => None,
        };
        unsafe {
            self.context.PSSetShader(shader, None);
            self.context.PSSetConstantBuffers(0, Some(&[constants]));
        }
        Ok(())
    }

    fn bind_texture(&mut self, slot: u32, view: Option<&NativeHandle>) -> Result<()> {
        let srv = match view {
            Some(handle) => {
                Some(downcast::<D3dShaderResourceView>(handle, "shader-resource view")?.0.clone())
            }
            None => None,
        };
        unsafe { self.context.PSSetShaderResources(slot, Some(&[srv])) };
        Ok(())
    }

    fn bind_samplers(&mut self, samplers: &[Option<&NativeHandle>]) -> Result<()> {
        let mut native: Vec<Option<ID3D11SamplerState>> = Vec::with_capacity(samplers.len());
        for sampler in samplers {
            native.push(match sampler {
                Some(handle) => Some(downcast::<D3dSampler>(handle, "sampler")?.0.clone()),
                None => None,
            });
        }
        unsafe { self.context.PSSetSamplers(0, Some(&native)) };
        Ok(())
    }

    fn bind_blend_state(&mut self, state: &NativeHandle) -> Result<()> {
        let state = &downcast::<D3dBlendState>(state, "blend state")?.0;
        unsafe { self.context.OMSetBlendState(state, None, u32::MAX) };
        Ok(())
    }

    fn bind_raster_state(&mut self, state: &NativeHandle) -> Result<()> {
        let state = &downcast::<D3dRasterState>(state, "rasterizer state")?.0;
        unsafe { self.context.RSSetState(state) };
        Ok(())
    }

    fn bind_depth_stencil_state(&mut self, state: &NativeHandle) -> Result<()> {
        let state = &downcast::<D3dZStencilState>(state, "depth-stencil state")?.0;
        unsafe { self.context.OMSetDepthStencilState(state, 0) };
        Ok(())
    }

    fn set_viewport(&mut self, rect: Rect) -> Result<()> {
        let viewport = D3D11_VIEWPORT {
            TopLeftX: rect.x as f32,
            TopLeftY: rect.y as f32,
            Width: rect.width as f32,
            Height: rect.height as f32,
            MinDepth: 0.0,
            MaxDepth: 1.0,
        };
        unsafe { self.context.RSSetViewports(Some(&[viewport])) };
        Ok(())
    }

    fn draw(&mut self, topology: Topology, start_vertex: u32, count: u32, indexed: bool) -> Result<()> {
        unsafe {
            self.context
                .IASetPrimitiveTopology(topology_to_d3d11(topology));
            if indexed {
                self.context.DrawIndexed(count, start_vertex, 0);
            } else {
                self.context.Draw(count, start_vertex);
            }
        }
        Ok(())
    }
}
