//! Error types for the Nebula graphics layer
//!
//! This module defines the error taxonomy used throughout the layer:
//! fatal device construction failures, per-resource creation failures,
//! device loss, and shader compilation diagnostics.

use std::fmt;

/// Result type for Nebula graphics operations
pub type Result<T> = std::result::Result<T, Error>;

/// Nebula graphics errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Native device/adapter creation failed (unrecoverable)
    InitializationFailed(String),

    /// A resource factory call failed; the resource was not created
    ResourceCreation(String),

    /// A per-frame native operation reported a removed/reset device.
    /// Drawing is suspended until `Device::rebuild_device` succeeds.
    DeviceLost,

    /// The native shader compiler rejected the source
    ShaderCompile {
        /// Source file name supplied at creation
        file: String,
        /// Compiler diagnostic text
        message: String,
    },

    /// Stale handle, kind mismatch, or otherwise invalid argument
    InvalidResource(String),

    /// Backend-specific error (D3D11, DXGI, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::ResourceCreation(msg) => write!(f, "Resource creation failed: {}", msg),
            Error::DeviceLost => write!(f, "Device lost (rebuild required)"),
            Error::ShaderCompile { file, message } => {
                write!(f, "Shader compile failed in {}: {}", file, message)
            }
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
        }
    }
}

impl std::error::Error for Error {}
