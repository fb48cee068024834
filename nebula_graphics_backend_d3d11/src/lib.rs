/*!
# Nebula Graphics - Direct3D 11 Backend

Direct3D 11 implementation of the nebula_graphics native device seam.

This crate provides the production backend that the graphics abstraction
layer drives on Windows: resource creation, the immediate-context binding
calls, DXGI swap chains and screen duplication. It builds on the `windows`
crate bindings and compiles to nothing on other platforms.
*/

#[cfg(windows)]
mod convert;
#[cfg(windows)]
mod device;


#[cfg(windows)]
pub use device::D3d11Device;

#[cfg(windows)]
use nebula_graphics::nebula::{native::NativeDevice, Result};

/// Create the Direct3D 11 backend on the given adapter index and wrap it
/// for the abstraction layer's [`Device`](nebula_graphics::nebula::Device).
#[cfg(windows)]
pub fn create_device(adapter: u32) -> Result<Box<dyn NativeDevice>> {
    Ok(Box::new(D3d11Device::new(adapter)?))
}
