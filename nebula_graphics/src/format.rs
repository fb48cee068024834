//! Color and depth/stencil pixel formats
//!
//! These are the abstraction-side enums; the backend translates them to the
//! native pixel formats (DXGI) through its total conversion tables. `Unknown`
//! is the defined sentinel for values with no native equivalent.

/// Color format of a texture, staging surface, or swap chain back buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorFormat {
    /// Sentinel for unmapped/unsupported native formats
    Unknown,
    /// 8-bit alpha only
    A8,
    /// 8-bit red only
    R8,
    /// 8-bit RGBA
    Rgba,
    /// 8-bit BGR, padding byte
    Bgrx,
    /// 8-bit BGRA
    Bgra,
    /// 10-bit RGB, 2-bit alpha
    R10G10B10A2,
    /// 16-bit RGBA (unsigned normalized)
    Rgba16,
    /// 16-bit red only (unsigned normalized)
    R16,
    /// 16-bit float RGBA
    Rgba16F,
    /// 32-bit float RGBA
    Rgba32F,
    /// 16-bit float RG
    Rg16F,
    /// 32-bit float RG
    Rg32F,
    /// 16-bit float red only
    R16F,
    /// 32-bit float red only
    R32F,
    /// BC1 block compression
    Dxt1,
    /// BC2 block compression
    Dxt3,
    /// BC3 block compression
    Dxt5,
}

impl ColorFormat {
    /// Bits per pixel (block-compressed formats return their amortized rate)
    pub fn bits_per_pixel(self) -> u32 {
        match self {
            ColorFormat::Unknown => 0,
            ColorFormat::A8 | ColorFormat::R8 => 8,
            ColorFormat::R16 | ColorFormat::R16F => 16,
            ColorFormat::Rgba | ColorFormat::Bgrx | ColorFormat::Bgra => 32,
            ColorFormat::R10G10B10A2 => 32,
            ColorFormat::Rg16F | ColorFormat::R32F => 32,
            ColorFormat::Rgba16 | ColorFormat::Rgba16F | ColorFormat::Rg32F => 64,
            ColorFormat::Rgba32F => 128,
            ColorFormat::Dxt1 => 4,
            ColorFormat::Dxt3 | ColorFormat::Dxt5 => 8,
        }
    }

    /// Whether this is a BC block-compressed format (4x4 texel blocks)
    pub fn is_compressed(self) -> bool {
        matches!(self, ColorFormat::Dxt1 | ColorFormat::Dxt3 | ColorFormat::Dxt5)
    }

    /// Byte size of one image of the given dimensions in this format.
    ///
    /// Compressed formats round dimensions up to whole 4x4 blocks.
    pub fn byte_size(self, width: u32, height: u32) -> usize {
        if self.is_compressed() {
            let blocks_w = width.div_ceil(4) as usize;
            let blocks_h = height.div_ceil(4) as usize;
            let block_bytes = match self {
                ColorFormat::Dxt1 => 8,
                _ => 16,
            };
            blocks_w * blocks_h * block_bytes
        } else {
            (width as usize) * (height as usize) * (self.bits_per_pixel() as usize) / 8
        }
    }
}

/// Depth/stencil buffer format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthStencilFormat {
    /// No depth/stencil buffer
    None,
    /// 16-bit depth
    Z16,
    /// 24-bit depth, 8-bit stencil
    Z24S8,
    /// 32-bit float depth
    Z32F,
    /// 32-bit float depth, 8-bit stencil (24 bits unused)
    Z32FS8X24,
}

impl DepthStencilFormat {
    /// Whether the format carries a stencil component
    pub fn has_stencil(self) -> bool {
        matches!(self, DepthStencilFormat::Z24S8 | DepthStencilFormat::Z32FS8X24)
    }
}

/// Dimensions of one mip level of a `base_width` x `base_height` image
pub fn mip_dimensions(base_width: u32, base_height: u32, level: u32) -> (u32, u32) {
    ((base_width >> level).max(1), (base_height >> level).max(1))
}
