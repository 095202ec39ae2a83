//! Fog-of-war visibility compositor.
//!
//! Each frame every vision source is stamped into a ground-plane visibility
//! buffer, blended with the previous frame, blurred through a small pyramid
//! and composited onto the host's colour buffer.
//!
//! # Invariants
//! - The compositor records commands; a [`RenderBackend`] owns every texture
//!   and executes them.
//! - Every scratch target a frame allocates is released in the same frame,
//!   in reverse allocation order.
//! - After deactivation the published binding is the neutral placeholder.

mod backend;
mod command;
mod composite;
mod config;
pub mod cpu;
mod error;
mod fog;
mod gizmo;
mod mapping;
pub mod noise;
pub mod pipeline;
mod projection;
pub mod shading;
mod targets;

pub use backend::{Program, RenderBackend, VISIBILITY_BINDING};
pub use command::{
    Command, CommandList, OccluderParams, OverlayParams, Pass, Published, SourceParams,
    TemporalParams, bounds_vector,
};
pub use composite::Compositor;
pub use config::{ConfigError, FogConfig, MAX_BLUR_ITERATIONS, Mode, ResolutionTier};
pub use error::FogError;
pub use fog::{FogOfWar, FrameContext, FrameStats};
pub use gizmo::{LineSegment, area_outline};
pub use mapping::VisibilityMapping;
pub use projection::{MainCamera, TopDownCamera, VISION_NEAR, top_down_projection, top_down_view, vision_quad};
pub use targets::{SCRATCH_CAPACITY, ScratchHandle, ScratchStack, TargetError, TargetId, VisibilityBuffer};
