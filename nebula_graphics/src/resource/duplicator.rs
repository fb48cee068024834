//! Screen duplication sessions
//!
//! A duplicator wraps an OS screen-capture session on one monitor. Frames
//! are copied into an owned output texture on demand; the session cannot be
//! rebuilt from retained state after device loss, so the rebuild pass drops
//! it and the caller recreates the duplicator.

use crate::error::{Error, Result};
use crate::format::ColorFormat;
use crate::native::NativeHandle;
use crate::resource::TextureHandle;

/// A screen-duplication session resource
pub struct Duplicator {
    monitor: u32,
    width: u32,
    height: u32,
    format: ColorFormat,
    session: Option<NativeHandle>,
    /// Texture the latest frame is copied into (registry entry owned by
    /// this duplicator); allocated lazily on the first acquired frame
    output: Option<TextureHandle>,
}

impl Duplicator {
    pub(crate) fn from_parts(monitor: u32, width: u32, height: u32, format: ColorFormat, session: NativeHandle) -> Self {
        Self {
            monitor,
            width,
            height,
            format,
            session: Some(session),
            output: None,
        }
    }

    pub fn monitor(&self) -> u32 {
        self.monitor
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

    /// Output texture holding the most recent frame; `None` before the
    /// first frame is acquired
    pub fn output(&self) -> Option<TextureHandle> {
        self.output
    }

    pub(crate) fn set_output(&mut self, texture: TextureHandle) {
        self.output = Some(texture);
    }

    pub(crate) fn session(&self) -> Result<&NativeHandle> {
        self.session
            .as_ref()
            .ok_or_else(|| Error::InvalidResource("duplication session lost; recreate the duplicator".to_string()))
    }

    /// Drop the native session after device loss; the duplicator stays in
    /// the registry but every frame call fails until recreated
    pub(crate) fn invalidate(&mut self) {
        self.session = None;
    }
}
