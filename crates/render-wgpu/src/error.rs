use glam::UVec2;
use veil_render::{Program, TargetId};

/// Errors from the wgpu backend.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    #[error("failed to acquire a device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("target {0:?} is not allocated")]
    MissingTarget(TargetId),

    #[error("program {0:?} was not created")]
    MissingProgram(Program),

    #[error("pass {pass} cannot run from {src:?} to {dst:?}")]
    InvalidBlit {
        pass: &'static str,
        src: TargetId,
        dst: TargetId,
    },

    #[error("colour buffers differ in size: {from} vs {to}")]
    SizeMismatch { from: UVec2, to: UVec2 },

    #[error("readback failed: {0}")]
    Readback(String),
}
