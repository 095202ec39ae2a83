//! wgpu backend for the fog-of-war compositor.
//!
//! Executes recorded command lists with one render pipeline per pass,
//! R16Float visibility targets and a size-keyed scratch pool.
//!
//! # Invariants
//! - Visibility buffers and scratch textures are owned here, never by the host.
//! - The published binding resolves to a real texture at all times: the
//!   primary buffer while active, a 1x1 fully visible texture otherwise.

mod device;
mod error;
mod gizmo;
mod gpu;
mod pool;
mod shaders;

pub use device::{COLOR_FORMAT, ColorTarget, Headless, Target, VISIBILITY_FORMAT, headless};
pub use error::GpuError;
pub use gizmo::OutlineRenderer;
pub use gpu::WgpuBackend;
pub use pool::TexturePool;
pub use shaders::{BLIT_SHADER, DRAW_SHADER, LINE_SHADER, NOISE_WGSL, blit_source};
