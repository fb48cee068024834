//! The graphics device: resource factory, binding state, and draw submission

use bitflags::bitflags;

pub mod state;

#[allow(clippy::module_inception)]
mod device;


pub use device::{Device, MAX_TEXTURE_SLOTS};

/// A viewport/scissor rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

bitflags! {
    /// Which aspects of the current render target a clear touches
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClearFlags: u32 {
        const COLOR   = 1 << 0;
        const DEPTH   = 1 << 1;
        const STENCIL = 1 << 2;
    }
}
