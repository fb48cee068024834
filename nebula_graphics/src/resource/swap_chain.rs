//! Window swap chains
//!
//! A swap chain owns its back-buffer texture and optional depth/stencil
//! buffer as registry entries. Those sub-resources are derived from the
//! native swap chain, so the generic rebuild pass skips them and the swap
//! chain re-derives them itself after resize or device loss.

use raw_window_handle::RawWindowHandle;

use crate::error::{Error, Result};
use crate::format::{ColorFormat, DepthStencilFormat};
use crate::native::NativeHandle;
use crate::resource::{DepthStencilHandle, TextureHandle};

/// Creation parameters for a swap chain
#[derive(Debug, Clone)]
pub struct SwapChainInit {
    pub window: RawWindowHandle,
    pub width: u32,
    pub height: u32,
    pub format: ColorFormat,
    /// `DepthStencilFormat::None` for no depth buffer
    pub depth_format: DepthStencilFormat,
    pub num_buffers: u32,
}

/// A window swap chain resource
pub struct SwapChain {
    init: SwapChainInit,
    native: Option<NativeHandle>,
    /// Back-buffer texture (registry entry owned by this swap chain)
    target: TextureHandle,
    /// Depth/stencil buffer matching the back buffer, when requested
    zstencil: Option<DepthStencilHandle>,
}

impl SwapChain {
    pub(crate) fn from_parts(
        init: SwapChainInit,
        native: NativeHandle,
        target: TextureHandle,
        zstencil: Option<DepthStencilHandle>,
    ) -> Self {
        Self {
            init,
            native: Some(native),
            target,
            zstencil,
        }
    }

    pub fn init(&self) -> &SwapChainInit {
        &self.init
    }

    pub fn width(&self) -> u32 {
        self.init.width
    }

    pub fn height(&self) -> u32 {
        self.init.height
    }

    /// Back-buffer texture handle
    pub fn target(&self) -> TextureHandle {
        self.target
    }

    /// Depth/stencil handle, when the swap chain was created with one
    pub fn zstencil(&self) -> Option<DepthStencilHandle> {
        self.zstencil
    }

    pub(crate) fn native(&self) -> Result<&NativeHandle> {
        self.native
            .as_ref()
            .ok_or_else(|| Error::InvalidResource("swap chain released pending rebuild".to_string()))
    }

    /// Record new logical dimensions (the device performs the native resize
    /// and re-derives the back buffer)
    pub(crate) fn set_size(&mut self, width: u32, height: u32) {
        self.init.width = width;
        self.init.height = height;
    }

    pub(crate) fn take_native(&mut self) -> Option<NativeHandle> {
        self.native.take()
    }

    pub(crate) fn set_native(&mut self, native: NativeHandle) {
        self.native = Some(native);
    }
}
