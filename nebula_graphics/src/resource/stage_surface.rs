//! Staging (readback) surfaces
//!
//! CPU-readable copy targets: a texture is copied into a staging surface on
//! the GPU, then mapped to read the bytes back on the CPU.

use crate::error::{Error, Result};
use crate::format::ColorFormat;
use crate::native::{MappedSurface, NativeDevice, NativeHandle};

/// A CPU-readable staging surface
pub struct StageSurface {
    width: u32,
    height: u32,
    format: ColorFormat,
    native: Option<NativeHandle>,
}

impl StageSurface {
    pub(crate) fn new(
        native: &mut dyn NativeDevice,
        width: u32,
        height: u32,
        format: ColorFormat,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidResource(format!(
                "staging surface dimensions {}x{} are invalid",
                width, height
            )));
        }
        let handle = native.create_stage_surface(width, height, format)?;
        Ok(Self {
            width,
            height,
            format,
            native: Some(handle),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> ColorFormat {
        self.format
    }

    pub(crate) fn native(&self) -> Result<&NativeHandle> {
        self.native
            .as_ref()
            .ok_or_else(|| Error::InvalidResource("staging surface released pending rebuild".to_string()))
    }

    /// Map the surface and copy its contents to the CPU
    pub(crate) fn map(&self, native: &mut dyn NativeDevice) -> Result<MappedSurface> {
        native.map_stage_surface(self.native()?)
    }

    pub(crate) fn rebuild(&mut self, native: &mut dyn NativeDevice) -> Result<()> {
        self.native = None;
        self.native = Some(native.create_stage_surface(self.width, self.height, self.format)?);
        Ok(())
    }
}
