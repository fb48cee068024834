//! Sampler states

use crate::device::state::CompareFunc;
use crate::error::{Error, Result};
use crate::native::{NativeDevice, NativeHandle};

/// Texture filtering mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFilter {
    Point,
    Linear,
    Anisotropic,
    MinMagPointMipLinear,
    MinPointMagLinearMipPoint,
    MinLinearMagMipPoint,
}

/// Texture addressing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Wrap,
    Clamp,
    Mirror,
    Border,
    MirrorOnce,
}

/// Immutable sampler description
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub filter: SampleFilter,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    /// Comparison sampling (shadow maps); `None` disables comparison
    pub comparison: Option<CompareFunc>,
    pub max_anisotropy: u32,
    /// Border color for `AddressMode::Border`, packed RGBA
    pub border_color: u32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: SampleFilter::Linear,
            address_u: AddressMode::Clamp,
            address_v: AddressMode::Clamp,
            address_w: AddressMode::Clamp,
            comparison: None,
            max_anisotropy: 1,
            border_color: 0,
        }
    }
}

/// A sampler state resource
pub struct SamplerState {
    desc: SamplerDesc,
    native: Option<NativeHandle>,
}

impl SamplerState {
    pub(crate) fn new(native: &mut dyn NativeDevice, desc: SamplerDesc) -> Result<Self> {
        let handle = native.create_sampler(&desc)?;
        Ok(Self {
            desc,
            native: Some(handle),
        })
    }

    /// Immutable description
    pub fn desc(&self) -> &SamplerDesc {
        &self.desc
    }

    pub(crate) fn native(&self) -> Result<&NativeHandle> {
        self.native
            .as_ref()
            .ok_or_else(|| Error::InvalidResource("sampler released pending rebuild".to_string()))
    }

    pub(crate) fn rebuild(&mut self, native: &mut dyn NativeDevice) -> Result<()> {
        self.native = None;
        self.native = Some(native.create_sampler(&self.desc)?);
        Ok(())
    }
}
