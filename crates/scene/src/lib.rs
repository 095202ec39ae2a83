//! Scene input for the fog compositor: vision sources and occluders.
//!
//! # Invariants
//! - The compositor only ever reads the scene; hosts own and mutate it.
//! - Iteration order is insertion order. Culling preserves it.

mod cull;
pub mod scene;

pub use cull::{cull, influence_volume};
pub use scene::{Occluder, OccluderId, Scene, SourceId, VisionSource};
