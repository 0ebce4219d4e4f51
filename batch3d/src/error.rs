use core::fmt;
use std::error;

/// Everything that can go wrong inside the render core.
///
/// Setup-time variants (adapter/device acquisition, shader compile and
/// link) are fatal: there is no fallback renderer, so callers are expected
/// to surface them and terminate. Per-frame variants degrade gracefully and
/// keep the frame loop alive.
#[derive(Debug, Clone)]
pub enum RenderError {
    /// No usable GPU adapter was found.
    NoAdapter,
    /// The adapter refused to hand out a device.
    DeviceRequest(String),
    /// A shader stage failed to compile.
    ShaderCompile { name: String, detail: String },
    /// A compiled program failed pipeline creation.
    ProgramLink { name: String, detail: String },
    /// A program is missing an expected attribute or uniform binding.
    /// Logged as a warning; the affected feature silently no-ops.
    BindingNotFound { program: String, name: String },
    /// A fixed-capacity table or list cannot take another entry.
    CapacityExceeded { what: &'static str, capacity: usize },
    /// The GPU rejected a texture upload (out of memory).
    TextureUpload { width: u32, height: u32, detail: String },
    /// An offscreen target could not be created as requested.
    /// Logged at creation time, not escalated.
    TargetIncomplete { width: u32, height: u32 },
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::NoAdapter => {
                write!(f, "no valid adapter found for GPU requirements")
            }
            RenderError::DeviceRequest(detail) => {
                write!(f, "device request failed: {}", detail)
            }
            RenderError::ShaderCompile { name, detail } => {
                write!(f, "shader {} failed to compile: {}", name, detail)
            }
            RenderError::ProgramLink { name, detail } => {
                write!(f, "program {} failed to link: {}", name, detail)
            }
            RenderError::BindingNotFound { program, name } => {
                write!(f, "could not bind {} in program {}", name, program)
            }
            RenderError::CapacityExceeded { what, capacity } => {
                write!(f, "{} is full ({} entries)", what, capacity)
            }
            RenderError::TextureUpload {
                width,
                height,
                detail,
            } => {
                write!(f, "upload of {}x{} texture failed: {}", width, height, detail)
            }
            RenderError::TargetIncomplete { width, height } => {
                write!(f, "render target {}x{} is incomplete", width, height)
            }
        }
    }
}

impl error::Error for RenderError {}
