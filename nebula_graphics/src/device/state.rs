//! Fixed-function pipeline state: descriptors and deduplicating pools
//!
//! Blend, rasterizer, and depth/stencil configurations are immutable,
//! reference-counted objects in the native backend, and expensive to churn.
//! The device keeps one logical descriptor per category plus a pool of
//! already-created native objects keyed by memberwise descriptor equality.
//! Pools only grow; a renderer uses a handful of distinct configurations
//! over its lifetime.

use crate::error::Result;
use crate::native::NativeHandle;

// ===== STATE ENUMS =====

/// Depth/stencil comparison function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareFunc {
    Never,
    Less,
    LessEqual,
    Equal,
    GreaterEqual,
    Greater,
    NotEqual,
    Always,
}

/// Stencil operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    Increment,
    Decrement,
    Invert,
}

/// Blend factor for source/destination color and alpha
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    SrcAlpha,
    InvSrcAlpha,
    DstColor,
    InvDstColor,
    DstAlpha,
    InvDstAlpha,
    SrcAlphaSat,
}

/// Triangle face culling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    Back,
    Front,
    /// Cull nothing
    Neither,
}

/// Primitive topology for draw calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
}

/// Which stencil face a state change applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StencilFace {
    Front,
    Back,
    Both,
}

// ===== STATE DESCRIPTORS =====

/// Blend configuration (one render target, separate color/alpha factors)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendState {
    pub blend_enabled: bool,
    pub src_factor_c: BlendFactor,
    pub dst_factor_c: BlendFactor,
    pub src_factor_a: BlendFactor,
    pub dst_factor_a: BlendFactor,

    pub red_enabled: bool,
    pub green_enabled: bool,
    pub blue_enabled: bool,
    pub alpha_enabled: bool,
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            blend_enabled: true,
            src_factor_c: BlendFactor::SrcAlpha,
            dst_factor_c: BlendFactor::InvSrcAlpha,
            src_factor_a: BlendFactor::One,
            dst_factor_a: BlendFactor::One,
            red_enabled: true,
            green_enabled: true,
            blue_enabled: true,
            alpha_enabled: true,
        }
    }
}

/// Per-face stencil configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StencilSide {
    pub test: CompareFunc,
    pub fail: StencilOp,
    pub zfail: StencilOp,
    pub zpass: StencilOp,
}

impl Default for StencilSide {
    fn default() -> Self {
        Self {
            test: CompareFunc::Always,
            fail: StencilOp::Keep,
            zfail: StencilOp::Keep,
            zpass: StencilOp::Keep,
        }
    }
}

/// Depth/stencil test configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilState {
    pub depth_enabled: bool,
    pub depth_write_enabled: bool,
    pub depth_func: CompareFunc,

    pub stencil_enabled: bool,
    pub stencil_write_enabled: bool,
    pub stencil_front: StencilSide,
    pub stencil_back: StencilSide,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_enabled: true,
            depth_write_enabled: true,
            depth_func: CompareFunc::Less,
            stencil_enabled: false,
            stencil_write_enabled: true,
            stencil_front: StencilSide::default(),
            stencil_back: StencilSide::default(),
        }
    }
}

/// Rasterizer configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterState {
    pub cull_mode: CullMode,
    pub scissor_enabled: bool,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::Back,
            scissor_enabled: false,
        }
    }
}

// ===== STATE POOL =====

/// Deduplicating pool of native pipeline-state objects.
///
/// Linear scan keyed by memberwise descriptor equality; the distinct
/// configuration count in practice is small enough that a scan beats
/// hashing. Cleared wholesale on device rebuild (native members are
/// invalid after loss; descriptors are re-created lazily on next use).
pub(crate) struct StatePool<D: PartialEq + Copy> {
    entries: Vec<(D, NativeHandle)>,
}

impl<D: PartialEq + Copy> StatePool<D> {
    pub(crate) fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Find the native object matching `desc`, creating and caching it on
    /// miss. Returns the pool index, stable until `clear`.
    pub(crate) fn find_or_create(
        &mut self,
        desc: &D,
        create: impl FnOnce(&D) -> Result<NativeHandle>,
    ) -> Result<usize> {
        if let Some(idx) = self.entries.iter().position(|(d, _)| d == desc) {
            return Ok(idx);
        }
        let native = create(desc)?;
        self.entries.push((*desc, native));
        Ok(self.entries.len() - 1)
    }

    /// Native object at a pool index previously returned by `find_or_create`
    pub(crate) fn handle(&self, idx: usize) -> &NativeHandle {
        &self.entries[idx].1
    }

    /// Number of distinct descriptors in the pool
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Drop every cached native object (device rebuild)
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
