//! 2D textures
//!
//! A texture is created either from initial per-mip CPU pixel data (or a
//! single level with `GEN_MIPMAPS` requesting hardware generation), as an
//! uninitialized render target, or by opening an externally shared native
//! handle. The [`TextureBacking`] records how the native objects are
//! re-derived after device loss: a CPU mip copy is retained only where
//! native re-derivation is impossible or the source data was supplied.

use bitflags::bitflags;

use crate::error::{Error, Result};
use crate::format::{mip_dimensions, ColorFormat};
use crate::gfx_warn;
use crate::native::{NativeDevice, NativeHandle, NativeTextureSet};

bitflags! {
    /// Texture creation flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TextureFlags: u32 {
        /// CPU map/update without recreation
        const DYNAMIC        = 1 << 0;
        /// Allocate render-target views (1, or 6 with `CUBEMAP`)
        const RENDER_TARGET  = 1 << 1;
        /// Expose a GDI-interop surface view
        const GDI_COMPATIBLE = 1 << 2;
        /// Share the native texture across devices/processes
        const SHARED         = 1 << 3;
        /// Generate the mip chain in hardware from level 0
        const GEN_MIPMAPS    = 1 << 4;
        /// Six faces, six render-target views
        const CUBEMAP        = 1 << 5;
    }
}

/// Description of a 2D texture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: ColorFormat,
    /// Mip level count (>= 1)
    pub levels: u32,
    pub flags: TextureFlags,
}

impl TextureDesc {
    /// Number of render-target views this description allocates
    pub fn render_target_count(&self) -> u32 {
        if !self.flags.contains(TextureFlags::RENDER_TARGET) {
            0
        } else if self.flags.contains(TextureFlags::CUBEMAP) {
            6
        } else {
            1
        }
    }

    /// Number of initial data images expected (mips, times six for cube maps)
    pub fn image_count(&self) -> usize {
        let faces = if self.flags.contains(TextureFlags::CUBEMAP) { 6 } else { 1 };
        (self.levels as usize) * faces
    }
}

/// How a texture's native objects are re-derived on device rebuild
pub enum TextureBacking {
    /// Static texture recreated from the retained per-mip CPU copies
    Data(Vec<Vec<u8>>),
    /// Render-target or GDI-interop texture with no regenerable source:
    /// recreated empty, contents redrawn by the caller
    Transient,
    /// Imported shared texture: reopened from the OS handle
    Shared(u32),
    /// Swap-chain back buffer: refreshed by the owning swap chain
    SwapChain,
    /// Screen-duplication output: refreshed by the owning duplicator
    Duplicator,
}

/// A 2D texture resource
pub struct Texture2d {
    desc: TextureDesc,
    backing: TextureBacking,
    natives: Option<NativeTextureSet>,
}

impl Texture2d {
    /// Create from a description plus initial per-mip data (may be empty for
    /// render targets). Validates the image count and per-level byte sizes.
    pub(crate) fn new(
        native: &mut dyn NativeDevice,
        desc: TextureDesc,
        data: Vec<Vec<u8>>,
    ) -> Result<Self> {
        if desc.width == 0 || desc.height == 0 {
            return Err(Error::InvalidResource(format!(
                "texture dimensions {}x{} are invalid",
                desc.width, desc.height
            )));
        }
        if desc.levels == 0 {
            return Err(Error::InvalidResource("texture must have at least one mip level".to_string()));
        }
        if !data.is_empty() {
            Self::validate_images(&desc, &data)?;
        }

        let natives = native.create_texture_2d(&desc, &data)?;
        let backing = if !data.is_empty() {
            TextureBacking::Data(data)
        } else if let Some(handle) = natives.shared_handle {
            TextureBacking::Shared(handle)
        } else {
            TextureBacking::Transient
        };
        Ok(Self {
            desc,
            backing,
            natives: Some(natives),
        })
    }

    /// Open an externally shared texture by OS handle
    pub(crate) fn open_shared(native: &mut dyn NativeDevice, handle: u32) -> Result<Self> {
        let (natives, desc) = native.open_shared_texture(handle)?;
        Ok(Self {
            desc,
            backing: TextureBacking::Shared(handle),
            natives: Some(natives),
        })
    }

    /// Wrap a native texture set owned by a swap chain or duplicator
    pub(crate) fn from_owned_natives(
        desc: TextureDesc,
        natives: NativeTextureSet,
        backing: TextureBacking,
    ) -> Self {
        Self {
            desc,
            backing,
            natives: Some(natives),
        }
    }

    fn validate_images(desc: &TextureDesc, data: &[Vec<u8>]) -> Result<()> {
        let expected = if desc.flags.contains(TextureFlags::GEN_MIPMAPS) {
            // only level 0 supplied, hardware fills the chain
            desc.image_count() / desc.levels as usize
        } else {
            desc.image_count()
        };
        if data.len() != expected {
            return Err(Error::InvalidResource(format!(
                "texture initial data has {} images, expected {}",
                data.len(),
                expected
            )));
        }
        let levels_supplied = if desc.flags.contains(TextureFlags::GEN_MIPMAPS) { 1 } else { desc.levels };
        for (i, image) in data.iter().enumerate() {
            let level = (i as u32) % levels_supplied;
            let (w, h) = mip_dimensions(desc.width, desc.height, level);
            let expected_bytes = desc.format.byte_size(w, h);
            if image.len() != expected_bytes {
                return Err(Error::InvalidResource(format!(
                    "texture image {} has {} bytes, expected {} ({}x{})",
                    i,
                    image.len(),
                    expected_bytes,
                    w,
                    h
                )));
            }
        }
        Ok(())
    }

    /// Public description (unchanged across rebuilds)
    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn format(&self) -> ColorFormat {
        self.desc.format
    }

    /// OS shared handle, when this texture is shared or imported
    pub fn shared_handle(&self) -> Option<u32> {
        match self.backing {
            TextureBacking::Shared(handle) => Some(handle),
            _ => self.natives.as_ref().and_then(|n| n.shared_handle),
        }
    }

    /// Native DC-compatible surface view, when this texture was created
    /// with [`TextureFlags::GDI_COMPATIBLE`]
    pub fn gdi_surface(&self) -> Option<&NativeHandle> {
        self.natives.as_ref().and_then(|n| n.gdi_surface.as_ref())
    }

    pub(crate) fn backing(&self) -> &TextureBacking {
        &self.backing
    }

    pub(crate) fn natives(&self) -> Result<&NativeTextureSet> {
        self.natives
            .as_ref()
            .ok_or_else(|| Error::InvalidResource("texture released pending rebuild".to_string()))
    }

    /// Render-target view for a face (0 for 2D, 0..6 for cube maps)
    pub(crate) fn render_target(&self, face: u32) -> Result<&NativeHandle> {
        let natives = self.natives()?;
        natives.render_targets.get(face as usize).ok_or_else(|| {
            Error::InvalidResource(format!(
                "texture has {} render-target views, face {} requested",
                natives.render_targets.len(),
                face
            ))
        })
    }

    /// Shader-resource view, if the texture is sampleable
    pub(crate) fn shader_resource(&self) -> Result<&NativeHandle> {
        self.natives()?
            .shader_resource
            .as_ref()
            .ok_or_else(|| Error::InvalidResource("texture has no shader-resource view".to_string()))
    }

    /// Replace natives wholesale (swap-chain resize / owner-driven rebuild)
    pub(crate) fn replace_natives(&mut self, natives: Option<NativeTextureSet>) {
        self.natives = natives;
    }

    /// Rewrite level-0 pixel data. Only textures created with
    /// [`TextureFlags::DYNAMIC`] accept uploads after creation.
    pub(crate) fn update(&mut self, native: &mut dyn NativeDevice, data: Vec<u8>) -> Result<()> {
        if !self.desc.flags.contains(TextureFlags::DYNAMIC) {
            return Err(Error::InvalidResource(
                "texture is not dynamic; recreate it to change its contents".to_string(),
            ));
        }
        let expected = self.desc.format.byte_size(self.desc.width, self.desc.height);
        if data.len() != expected {
            return Err(Error::InvalidResource(format!(
                "texture update has {} bytes, expected {} ({}x{})",
                data.len(),
                expected,
                self.desc.width,
                self.desc.height
            )));
        }

        let pitch = if self.desc.format.is_compressed() {
            self.desc.format.byte_size(self.desc.width, 4)
        } else {
            self.desc.format.byte_size(self.desc.width, 1)
        };
        let natives = self.natives()?;
        native.update_texture(&natives.texture, &data, pitch as u32)?;

        // keep the rebuild copy in sync with what the GPU now holds
        if let TextureBacking::Data(images) = &mut self.backing {
            images[0] = data;
        }
        Ok(())
    }

    /// Recreate native objects after device loss.
    ///
    /// Swap-chain and duplicator outputs are refreshed by their owner and
    /// are a no-op here; shared imports reopen the OS handle and degrade to
    /// an empty texture of the same description if the handle no longer
    /// resolves on the new device.
    pub(crate) fn rebuild(&mut self, native: &mut dyn NativeDevice) -> Result<()> {
        match &self.backing {
            TextureBacking::SwapChain | TextureBacking::Duplicator => Ok(()),
            TextureBacking::Data(images) => {
                self.natives = None;
                self.natives = Some(native.create_texture_2d(&self.desc, images)?);
                Ok(())
            }
            TextureBacking::Transient => {
                self.natives = None;
                self.natives = Some(native.create_texture_2d(&self.desc, &[])?);
                Ok(())
            }
            TextureBacking::Shared(handle) => {
                let handle = *handle;
                self.natives = None;
                match native.open_shared_texture(handle) {
                    Ok((natives, _)) => {
                        self.natives = Some(natives);
                        Ok(())
                    }
                    Err(err) => {
                        gfx_warn!(
                            "nebula::Texture2d",
                            "shared handle {:#x} no longer resolves after rebuild ({}), \
                             falling back to an empty texture",
                            handle,
                            err
                        );
                        let mut desc = self.desc.clone();
                        desc.flags.remove(TextureFlags::SHARED);
                        self.natives = Some(native.create_texture_2d(&desc, &[])?);
                        Ok(())
                    }
                }
            }
        }
    }
}
