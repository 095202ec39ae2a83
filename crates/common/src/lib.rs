//! Shared geometric types for the veil workspace.
//!
//! Ground-plane conventions: world Y is up, the visibility field lives on the
//! X/Z plane, and a [`Rect`] stores world X in `x` and world Z in `y`.

mod types;

pub use types::{Aabb, Rect, Transform};
