//! Depth/stencil buffers

use crate::error::{Error, Result};
use crate::format::DepthStencilFormat;
use crate::native::{NativeDepthStencil, NativeDevice, NativeHandle};

/// A depth/stencil buffer resource
pub struct DepthStencilBuffer {
    width: u32,
    height: u32,
    format: DepthStencilFormat,
    natives: Option<NativeDepthStencil>,
}

impl DepthStencilBuffer {
    pub(crate) fn new(
        native: &mut dyn NativeDevice,
        width: u32,
        height: u32,
        format: DepthStencilFormat,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidResource(format!(
                "depth/stencil dimensions {}x{} are invalid",
                width, height
            )));
        }
        if format == DepthStencilFormat::None {
            return Err(Error::InvalidResource(
                "depth/stencil buffer requires a depth format".to_string(),
            ));
        }
        let natives = native.create_depth_stencil(width, height, format)?;
        Ok(Self {
            width,
            height,
            format,
            natives: Some(natives),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> DepthStencilFormat {
        self.format
    }

    /// Depth/stencil view for output-merger binding
    pub(crate) fn view(&self) -> Result<&NativeHandle> {
        self.natives
            .as_ref()
            .map(|n| &n.view)
            .ok_or_else(|| Error::InvalidResource("depth/stencil released pending rebuild".to_string()))
    }

    pub(crate) fn rebuild(&mut self, native: &mut dyn NativeDevice) -> Result<()> {
        self.natives = None;
        self.natives = Some(native.create_depth_stencil(self.width, self.height, self.format)?);
        Ok(())
    }
}
