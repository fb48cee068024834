//! Index buffers (16- or 32-bit)

use crate::error::{Error, Result};
use crate::gfx_bail;
use crate::native::{BufferDesc, BufferKind, NativeDevice, NativeHandle};

/// Index element width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    /// Bytes per index
    pub fn size(self) -> usize {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

/// CPU-side index array
#[derive(Debug, Clone)]
pub enum IndexData {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexData {
    /// Element width of this array
    pub fn index_type(&self) -> IndexType {
        match self {
            IndexData::U16(_) => IndexType::U16,
            IndexData::U32(_) => IndexType::U32,
        }
    }

    /// Number of indices
    pub fn len(&self) -> usize {
        match self {
            IndexData::U16(v) => v.len(),
            IndexData::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bytes(&self) -> &[u8] {
        match self {
            IndexData::U16(v) => bytemuck::cast_slice(v),
            IndexData::U32(v) => bytemuck::cast_slice(v),
        }
    }
}

/// An index buffer resource
pub struct IndexBuffer {
    dynamic: bool,
    data: IndexData,
    native: Option<NativeHandle>,
}

impl IndexBuffer {
    pub(crate) fn new(native: &mut dyn NativeDevice, data: IndexData, dynamic: bool) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::InvalidResource("index data is empty".to_string()));
        }
        let mut ib = Self {
            dynamic,
            data,
            native: None,
        };
        ib.build(native)?;
        Ok(ib)
    }

    /// Number of indices
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Element width
    pub fn index_type(&self) -> IndexType {
        self.data.index_type()
    }

    pub fn dynamic(&self) -> bool {
        self.dynamic
    }

    fn build(&mut self, native: &mut dyn NativeDevice) -> Result<()> {
        let bytes = self.data.bytes();
        self.native = Some(native.create_buffer(
            &BufferDesc {
                kind: BufferKind::Index,
                size: bytes.len(),
                dynamic: self.dynamic,
            },
            Some(bytes),
        )?);
        Ok(())
    }

    pub(crate) fn native(&self) -> Result<&NativeHandle> {
        self.native
            .as_ref()
            .ok_or_else(|| Error::InvalidResource("index buffer released pending rebuild".to_string()))
    }

    /// Replace the contents of a dynamic index buffer
    pub(crate) fn update(&mut self, native: &mut dyn NativeDevice, data: IndexData) -> Result<()> {
        if !self.dynamic {
            gfx_bail!("nebula::IndexBuffer", "update called on a non-dynamic index buffer");
        }
        if data.index_type() != self.data.index_type() || data.len() != self.data.len() {
            return Err(Error::InvalidResource(
                "dynamic update changes index type or count".to_string(),
            ));
        }
        self.data = data;
        native.update_buffer(self.native()?, self.data.bytes())
    }

    /// Drop the invalidated native buffer and recreate it from retained indices
    pub(crate) fn rebuild(&mut self, native: &mut dyn NativeDevice) -> Result<()> {
        self.native = None;
        self.build(native)
    }
}
