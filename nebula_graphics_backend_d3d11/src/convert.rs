//! Enum mapping between the abstraction layer and D3D11/DXGI
//!
//! Pure total functions; unmapped DXGI formats come back as
//! `ColorFormat::Unknown` rather than panicking so that duplicated desktop
//! and shared-texture descriptions degrade gracefully.

use nebula_graphics::nebula::format::{ColorFormat, DepthStencilFormat};
use nebula_graphics::nebula::resource::sampler::{AddressMode, SampleFilter};
use nebula_graphics::nebula::state::{BlendFactor, CompareFunc, CullMode, StencilOp, Topology};
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::Common::*;

// ===== COLOR FORMATS =====

pub fn color_format_to_dxgi(format: ColorFormat) -> DXGI_FORMAT {
    match format {
        ColorFormat::Unknown => DXGI_FORMAT_UNKNOWN,
        ColorFormat::A8 => DXGI_FORMAT_A8_UNORM,
        ColorFormat::R8 => DXGI_FORMAT_R8_UNORM,
        ColorFormat::Rgba => DXGI_FORMAT_R8G8B8A8_UNORM,
        ColorFormat::Bgrx => DXGI_FORMAT_B8G8R8X8_UNORM,
        ColorFormat::Bgra => DXGI_FORMAT_B8G8R8A8_UNORM,
        ColorFormat::R10G10B10A2 => DXGI_FORMAT_R10G10B10A2_UNORM,
        ColorFormat::Rgba16 => DXGI_FORMAT_R16G16B16A16_UNORM,
        ColorFormat::R16 => DXGI_FORMAT_R16_UNORM,
        ColorFormat::Rgba16F => DXGI_FORMAT_R16G16B16A16_FLOAT,
        ColorFormat::Rgba32F => DXGI_FORMAT_R32G32B32A32_FLOAT,
        ColorFormat::Rg16F => DXGI_FORMAT_R16G16_FLOAT,
        ColorFormat::Rg32F => DXGI_FORMAT_R32G32_FLOAT,
        ColorFormat::R16F => DXGI_FORMAT_R16_FLOAT,
        ColorFormat::R32F => DXGI_FORMAT_R32_FLOAT,
        ColorFormat::Dxt1 => DXGI_FORMAT_BC1_UNORM,
        ColorFormat::Dxt3 => DXGI_FORMAT_BC2_UNORM,
        ColorFormat::Dxt5 => DXGI_FORMAT_BC3_UNORM,
    }
}

pub fn dxgi_to_color_format(format: DXGI_FORMAT) -> ColorFormat {
    match format {
        DXGI_FORMAT_A8_UNORM => ColorFormat::A8,
        DXGI_FORMAT_R8_UNORM => ColorFormat::R8,
        DXGI_FORMAT_R8G8B8A8_UNORM => ColorFormat::Rgba,
        DXGI_FORMAT_B8G8R8X8_UNORM => ColorFormat::Bgrx,
        DXGI_FORMAT_B8G8R8A8_UNORM => ColorFormat::Bgra,
        DXGI_FORMAT_R10G10B10A2_UNORM => ColorFormat::R10G10B10A2,
        DXGI_FORMAT_R16G16B16A16_UNORM => ColorFormat::Rgba16,
        DXGI_FORMAT_R16_UNORM => ColorFormat::R16,
        DXGI_FORMAT_R16G16B16A16_FLOAT => ColorFormat::Rgba16F,
        DXGI_FORMAT_R32G32B32A32_FLOAT => ColorFormat::Rgba32F,
        DXGI_FORMAT_R16G16_FLOAT => ColorFormat::Rg16F,
        DXGI_FORMAT_R32G32_FLOAT => ColorFormat::Rg32F,
        DXGI_FORMAT_R16_FLOAT => ColorFormat::R16F,
        DXGI_FORMAT_R32_FLOAT => ColorFormat::R32F,
        DXGI_FORMAT_BC1_UNORM => ColorFormat::Dxt1,
        DXGI_FORMAT_BC2_UNORM => ColorFormat::Dxt3,
        DXGI_FORMAT_BC3_UNORM => ColorFormat::Dxt5,
        _ => ColorFormat::Unknown,
    }
}

pub fn depth_format_to_dxgi(format: DepthStencilFormat) -> DXGI_FORMAT {
    match format {
        DepthStencilFormat::None => DXGI_FORMAT_UNKNOWN,
        DepthStencilFormat::Z16 => DXGI_FORMAT_D16_UNORM,
        DepthStencilFormat::Z24S8 => DXGI_FORMAT_D24_UNORM_S8_UINT,
        DepthStencilFormat::Z32F => DXGI_FORMAT_D32_FLOAT,
        DepthStencilFormat::Z32FS8X24 => DXGI_FORMAT_D32_FLOAT_S8X24_UINT,
    }
}

// ===== PIPELINE STATE ENUMS =====

pub fn compare_func_to_d3d11(func: CompareFunc) -> D3D11_COMPARISON_FUNC {
    match func {
        CompareFunc::Never => D3D11_COMPARISON_NEVER,
        CompareFunc::Less => D3D11_COMPARISON_LESS,
        CompareFunc::LessEqual => D3D11_COMPARISON_LESS_EQUAL,
        CompareFunc::Equal => D3D11_COMPARISON_EQUAL,
        CompareFunc::GreaterEqual => D3D11_COMPARISON_GREATER_EQUAL,
        CompareFunc::Greater => D3D11_COMPARISON_GREATER,
        CompareFunc::NotEqual => D3D11_COMPARISON_NOT_EQUAL,
        CompareFunc::Always => D3D11_COMPARISON_ALWAYS,
    }
}

pub fn stencil_op_to_d3d11(op: StencilOp) -> D3D11_STENCIL_OP {
    match op {
        StencilOp::Keep => D3D11_STENCIL_OP_KEEP,
        StencilOp::Zero => D3D11_STENCIL_OP_ZERO,
        StencilOp::Replace => D3D11_STENCIL_OP_REPLACE,
        StencilOp::Increment => D3D11_STENCIL_OP_INCR,
        StencilOp::Decrement => D3D11_STENCIL_OP_DECR,
        StencilOp::Invert => D3D11_STENCIL_OP_INVERT,
    }
}

pub fn blend_factor_to_d3d11(factor: BlendFactor) -> D3D11_BLEND {
    match factor {
        BlendFactor::Zero => D3D11_BLEND_ZERO,
        BlendFactor::One => D3D11_BLEND_ONE,
        BlendFactor::SrcColor => D3D11_BLEND_SRC_COLOR,
        BlendFactor::InvSrcColor => D3D11_BLEND_INV_SRC_COLOR,
        BlendFactor::SrcAlpha => D3D11_BLEND_SRC_ALPHA,
        BlendFactor::InvSrcAlpha => D3D11_BLEND_INV_SRC_ALPHA,
        BlendFactor::DstColor => D3D11_BLEND_DEST_COLOR,
        BlendFactor::InvDstColor => D3D11_BLEND_INV_DEST_COLOR,
        BlendFactor::DstAlpha => D3D11_BLEND_DEST_ALPHA,
        BlendFactor::InvDstAlpha => D3D11_BLEND_INV_DEST_ALPHA,
        BlendFactor::SrcAlphaSat => D3D11_BLEND_SRC_ALPHA_SAT,
    }
}

pub fn cull_mode_to_d3d11(mode: CullMode) -> D3D11_CULL_MODE {
    match mode {
        CullMode::Back => D3D11_CULL_BACK,
        CullMode::Front => D3D11_CULL_FRONT,
        CullMode::Neither => D3D11_CULL_NONE,
    }
}

pub fn topology_to_d3d11(topology: Topology) -> D3D_PRIMITIVE_TOPOLOGY {
    match topology {
        Topology::Points => D3D_PRIMITIVE_TOPOLOGY_POINTLIST,
        Topology::Lines => D3D_PRIMITIVE_TOPOLOGY_LINELIST,
        Topology::LineStrip => D3D_PRIMITIVE_TOPOLOGY_LINESTRIP,
        Topology::Triangles => D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST,
        Topology::TriangleStrip => D3D_PRIMITIVE_TOPOLOGY_TRIANGLESTRIP,
    }
}

// ===== SAMPLERS =====

pub fn filter_to_d3d11(filter: SampleFilter, comparison: bool) -> D3D11_FILTER {
    if comparison {
        return match filter {
            SampleFilter::Point => D3D11_FILTER_COMPARISON_MIN_MAG_MIP_POINT,
            SampleFilter::Linear => D3D11_FILTER_COMPARISON_MIN_MAG_MIP_LINEAR,
            SampleFilter::Anisotropic => D3D11_FILTER_COMPARISON_ANISOTROPIC,
            SampleFilter::MinMagPointMipLinear => D3D11_FILTER_COMPARISON_MIN_MAG_POINT_MIP_LINEAR,
            SampleFilter::MinPointMagLinearMipPoint => {
                D3D11_FILTER_COMPARISON_MIN_POINT_MAG_LINEAR_MIP_POINT
            }
            SampleFilter::MinLinearMagMipPoint => D3D11_FILTER_COMPARISON_MIN_LINEAR_MAG_MIP_POINT,
        };
    }
    match filter {
        SampleFilter::Point => D3D11_FILTER_MIN_MAG_MIP_POINT,
        SampleFilter::Linear => D3D11_FILTER_MIN_MAG_MIP_LINEAR,
        SampleFilter::Anisotropic => D3D11_FILTER_ANISOTROPIC,
        SampleFilter::MinMagPointMipLinear => D3D11_FILTER_MIN_MAG_POINT_MIP_LINEAR,
        SampleFilter::MinPointMagLinearMipPoint => D3D11_FILTER_MIN_POINT_MAG_LINEAR_MIP_POINT,
        SampleFilter::MinLinearMagMipPoint => D3D11_FILTER_MIN_LINEAR_MAG_MIP_POINT,
    }
}

pub fn address_mode_to_d3d11(mode: AddressMode) -> D3D11_TEXTURE_ADDRESS_MODE {
    match mode {
        AddressMode::Wrap => D3D11_TEXTURE_ADDRESS_WRAP,
        AddressMode::Clamp => D3D11_TEXTURE_ADDRESS_CLAMP,
        AddressMode::Mirror => D3D11_TEXTURE_ADDRESS_MIRROR,
        AddressMode::Border => D3D11_TEXTURE_ADDRESS_BORDER,
        AddressMode::MirrorOnce => D3D11_TEXTURE_ADDRESS_MIRROR_ONCE,
    }
}
