//! Error types for the engine core and its backends.

use std::fmt;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine errors.
///
/// Loader-time errors (`AssetParse`, `UnsupportedFormat`,
/// `CapacityExhausted`, `ShaderLoad`) abort the load and put the engine into
/// `ShutdownAfterLoad`. Frame-time errors are classified: `DeviceLost` is
/// fatal, `DrawBufferOverflow` is recovered by clamping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A resource table capacity was hit; the insert was refused
    CapacityExhausted { what: &'static str, capacity: usize },

    /// Malformed OBJ/glTF/DDS input
    AssetParse(String),

    /// Input the engine deliberately refuses (cubemap/volume DDS,
    /// non-triangle glTF primitive)
    UnsupportedFormat(String),

    /// Missing or malformed shader bytecode
    ShaderLoad(String),

    /// Device/queue/swapchain/pipeline creation failure
    ApiObjectCreate(String),

    /// Staging map or copy failure
    UploadFailed(String),

    /// The indirect-draw buffer would overflow; the count was clamped
    DrawBufferOverflow,

    /// The device was lost mid-frame; no further submissions are possible
    DeviceLost,

    /// API misuse caught at runtime (wrong state, bad handle)
    InvalidResource(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::CapacityExhausted { what, capacity } => {
                write!(f, "capacity exhausted: {} (limit {})", what, capacity)
            }
            EngineError::AssetParse(msg) => write!(f, "asset parse error: {}", msg),
            EngineError::UnsupportedFormat(msg) => write!(f, "unsupported format: {}", msg),
            EngineError::ShaderLoad(msg) => write!(f, "shader load error: {}", msg),
            EngineError::ApiObjectCreate(msg) => write!(f, "API object creation failed: {}", msg),
            EngineError::UploadFailed(msg) => write!(f, "upload failed: {}", msg),
            EngineError::DrawBufferOverflow => write!(f, "indirect draw buffer overflow"),
            EngineError::DeviceLost => write!(f, "device lost"),
            EngineError::InvalidResource(msg) => write!(f, "invalid resource: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
