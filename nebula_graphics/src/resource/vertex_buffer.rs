//! Vertex buffers: independent native buffer per attribute stream
//!
//! A vertex buffer carries one native buffer per attribute kind it was
//! given (position mandatory; normal, color, tangent, and any number of
//! texcoord streams optional). The CPU copy of the source data is retained
//! for dynamic updates and device-loss rebuild. `buffer_list` reconciles
//! the present streams against a vertex shader's declared expectations.

use glam::Vec4;

use crate::error::{Error, Result};
use crate::gfx_bail;
use crate::native::{BufferDesc, BufferKind, NativeDevice, NativeHandle};
use crate::resource::shader::LayoutExpectation;

/// One texture-coordinate stream
#[derive(Debug, Clone)]
pub struct TexCoords {
    /// Components per vertex (1..=4)
    pub width: u32,
    /// `width * vertex_count` floats
    pub data: Vec<f32>,
}

/// CPU-side vertex streams
///
/// All present streams must describe the same number of vertices.
#[derive(Debug, Clone, Default)]
pub struct VertexData {
    /// Positions (mandatory, xyz + padding lane)
    pub points: Vec<Vec4>,
    pub normals: Option<Vec<Vec4>>,
    pub tangents: Option<Vec<Vec4>>,
    /// Packed 8-bit RGBA
    pub colors: Option<Vec<u32>>,
    pub tex_coords: Vec<TexCoords>,
}

impl VertexData {
    /// Vertex count (length of the position stream)
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn validate(&self) -> Result<()> {
        let n = self.points.len();
        if n == 0 {
            return Err(Error::InvalidResource(
                "vertex data has no position stream".to_string(),
            ));
        }
        let stream_ok = |len: usize| len == n;
        if let Some(normals) = &self.normals {
            if !stream_ok(normals.len()) {
                return Err(Error::InvalidResource(format!(
                    "normal stream has {} vertices, expected {}",
                    normals.len(),
                    n
                )));
            }
        }
        if let Some(tangents) = &self.tangents {
            if !stream_ok(tangents.len()) {
                return Err(Error::InvalidResource(format!(
                    "tangent stream has {} vertices, expected {}",
                    tangents.len(),
                    n
                )));
            }
        }
        if let Some(colors) = &self.colors {
            if !stream_ok(colors.len()) {
                return Err(Error::InvalidResource(format!(
                    "color stream has {} vertices, expected {}",
                    colors.len(),
                    n
                )));
            }
        }
        for (i, tv) in self.tex_coords.iter().enumerate() {
            if tv.width == 0 || tv.width > 4 {
                return Err(Error::InvalidResource(format!(
                    "texcoord stream {} has invalid width {}",
                    i, tv.width
                )));
            }
            if tv.data.len() != n * tv.width as usize {
                return Err(Error::InvalidResource(format!(
                    "texcoord stream {} has {} floats, expected {}",
                    i,
                    tv.data.len(),
                    n * tv.width as usize
                )));
            }
        }
        Ok(())
    }
}

/// Native buffers for the streams present in the source data
struct NativeStreams {
    points: NativeHandle,
    normals: Option<NativeHandle>,
    tangents: Option<NativeHandle>,
    colors: Option<NativeHandle>,
    tex_coords: Vec<NativeHandle>,
}

/// A vertex buffer resource
pub struct VertexBuffer {
    dynamic: bool,
    data: VertexData,
    natives: Option<NativeStreams>,
}

/// Byte stride of position/normal/tangent streams (one `Vec4`)
const VEC4_STRIDE: u32 = 16;
/// Byte stride of the packed color stream
const COLOR_STRIDE: u32 = 4;

impl VertexBuffer {
    pub(crate) fn new(native: &mut dyn NativeDevice, data: VertexData, dynamic: bool) -> Result<Self> {
        data.validate()?;
        let mut vb = Self {
            dynamic,
            data,
            natives: None,
        };
        vb.build(native)?;
        Ok(vb)
    }

    /// Number of vertices
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether CPU updates without recreation are permitted
    pub fn dynamic(&self) -> bool {
        self.dynamic
    }

    /// Retained CPU streams
    pub fn data(&self) -> &VertexData {
        &self.data
    }

    fn build(&mut self, native: &mut dyn NativeDevice) -> Result<()> {
        let dynamic = self.dynamic;
        let make = |native: &mut dyn NativeDevice, bytes: &[u8]| {
            native.create_buffer(
                &BufferDesc {
                    kind: BufferKind::Vertex,
                    size: bytes.len(),
                    dynamic,
                },
                Some(bytes),
            )
        };

        let points = make(native, bytemuck::cast_slice(&self.data.points))?;
        let normals = match &self.data.normals {
            Some(stream) => Some(make(native, bytemuck::cast_slice(stream))?),
            None => None,
        };
        let tangents = match &self.data.tangents {
            Some(stream) => Some(make(native, bytemuck::cast_slice(stream))?),
            None => None,
        };
        let colors = match &self.data.colors {
            Some(stream) => Some(make(native, bytemuck::cast_slice(stream))?),
            None => None,
        };
        let mut tex_coords = Vec::with_capacity(self.data.tex_coords.len());
        for tv in &self.data.tex_coords {
            tex_coords.push(make(native, bytemuck::cast_slice(&tv.data))?);
        }

        self.natives = Some(NativeStreams {
            points,
            normals,
            tangents,
            colors,
            tex_coords,
        });
        Ok(())
    }

    /// Replace the vertex data of a dynamic buffer and flush every stream
    pub(crate) fn update(&mut self, native: &mut dyn NativeDevice, data: VertexData) -> Result<()> {
        if !self.dynamic {
            gfx_bail!("nebula::VertexBuffer", "update called on a non-dynamic vertex buffer");
        }
        data.validate()?;
        if data.len() != self.data.len() {
            return Err(Error::InvalidResource(format!(
                "dynamic update changes vertex count from {} to {}",
                self.data.len(),
                data.len()
            )));
        }
        self.data = data;

        let natives = self
            .natives
            .as_ref()
            .ok_or_else(|| Error::InvalidResource("vertex buffer released pending rebuild".to_string()))?;
        native.update_buffer(&natives.points, bytemuck::cast_slice(&self.data.points))?;
        if let (Some(buf), Some(stream)) = (&natives.normals, &self.data.normals) {
            native.update_buffer(buf, bytemuck::cast_slice(stream))?;
        }
        if let (Some(buf), Some(stream)) = (&natives.tangents, &self.data.tangents) {
            native.update_buffer(buf, bytemuck::cast_slice(stream))?;
        }
        if let (Some(buf), Some(stream)) = (&natives.colors, &self.data.colors) {
            native.update_buffer(buf, bytemuck::cast_slice(stream))?;
        }
        for (buf, tv) in natives.tex_coords.iter().zip(&self.data.tex_coords) {
            native.update_buffer(buf, bytemuck::cast_slice(&tv.data))?;
        }
        Ok(())
    }

    /// Drop invalidated natives and recreate them from the retained streams
    pub(crate) fn rebuild(&mut self, native: &mut dyn NativeDevice) -> Result<()> {
        self.natives = None;
        self.build(native)
    }

    /// Produce the ordered (buffer, stride) list a vertex shader's input
    /// layout expects: position, then normal/color/tangent when declared,
    /// then each declared texcoord unit.
    ///
    /// A stream the shader expects but the buffer lacks binds as a `None`
    /// placeholder with zero stride; the draw proceeds with undefined
    /// content for that attribute.
    pub(crate) fn buffer_list<'a>(
        &'a self,
        expect: &LayoutExpectation,
        buffers: &mut Vec<Option<&'a NativeHandle>>,
        strides: &mut Vec<u32>,
    ) -> Result<()> {
        let natives = self
            .natives
            .as_ref()
            .ok_or_else(|| Error::InvalidResource("vertex buffer released pending rebuild".to_string()))?;

        buffers.clear();
        strides.clear();

        buffers.push(Some(&natives.points));
        strides.push(VEC4_STRIDE);

        if expect.normals {
            buffers.push(natives.normals.as_ref());
            strides.push(if natives.normals.is_some() { VEC4_STRIDE } else { 0 });
        }
        if expect.colors {
            buffers.push(natives.colors.as_ref());
            strides.push(if natives.colors.is_some() { COLOR_STRIDE } else { 0 });
        }
        if expect.tangents {
            buffers.push(natives.tangents.as_ref());
            strides.push(if natives.tangents.is_some() { VEC4_STRIDE } else { 0 });
        }
        for unit in 0..expect.tex_units as usize {
            match (natives.tex_coords.get(unit), self.data.tex_coords.get(unit)) {
                (Some(buf), Some(tv)) => {
                    buffers.push(Some(buf));
                    strides.push(tv.width * 4);
                }
                _ => {
                    buffers.push(None);
                    strides.push(0);
                }
            }
        }
        Ok(())
    }
}
